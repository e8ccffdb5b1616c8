//! HTTP dispatcher demo server.
//!
//! # Architecture Overview
//!
//! ```text
//!     Client Request
//!     ─────────────▶ axum (timeout, request id, trace)
//!                        │ drain body, build Context
//!                        ▼
//!                    Dispatcher ─── global middleware
//!                        │          group tree → ungrouped table
//!                        │          before → handler → after
//!                        ▼
//!     ◀───────────── StreamWriter (buffered or streamed body)
//! ```

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use axum::http::StatusCode;
use clap::Parser;
use serde::Serialize;
use tokio::net::TcpListener;

use http_dispatcher::config::{load_config, DispatcherConfig};
use http_dispatcher::lifecycle::signals;
use http_dispatcher::observability::{logging, metrics};
use http_dispatcher::storage::{DirectoryStorage, KeyArchive};
use http_dispatcher::{HttpServer, RouteError, Router, Shutdown};

#[derive(Debug, Parser)]
#[command(name = "http-dispatcher", version, about = "Pattern-routed HTTP dispatcher")]
struct Args {
    /// Path to a TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override `listener.bind_address`.
    #[arg(long)]
    bind: Option<String>,
}

#[derive(Serialize)]
struct User {
    id: u64,
}

#[derive(Serialize)]
struct Whoami {
    ip: String,
    user_agent: String,
    site: String,
    protocol: String,
}

#[derive(Serialize)]
struct NotFound<'a> {
    error: &'static str,
    path: &'a str,
}

fn register_routes(router: &mut Router, config: &DispatcherConfig) -> Result<(), RouteError> {
    router.method_mismatch(config.routing.method_mismatch);

    router.use_midware(|ctx| {
        ctx.header("Server", "http-dispatcher");
        true
    });

    router.get("/ping", |ctx| {
        let _ = ctx.write_string("pong");
    })?;

    router.get("/users/:id([0-9]+)", |ctx| {
        let id = ctx.get("id").parse().unwrap_or_default();
        if ctx.accepts_xml() {
            let _ = ctx.xml(&User { id }, true);
        } else {
            let _ = ctx.json(&User { id }, false);
        }
    })?;

    router.group_with("/api", [], |api| {
        api.before(|ctx| {
            if ctx.get("Authorization").is_empty() {
                ctx.intercept(b"401 unauthorized\n", StatusCode::UNAUTHORIZED, "missing credentials");
            }
            true
        });
        api.after(|ctx| {
            tracing::debug!(path = %ctx.path(), status = %ctx.status(), "API request served");
            true
        });

        api.get("/whoami", |ctx| {
            let whoami = Whoami {
                ip: ctx.ip(),
                user_agent: ctx.user_agent().to_string(),
                site: ctx.site(),
                protocol: ctx.protocol(),
            };
            if let Err(e) = ctx.json(&whoami, true) {
                tracing::error!(error = %e, "whoami not encodable");
            }
        })?;

        // Streams one line per tick until the client goes away.
        api.get("/ticks/:count([0-9]{1,2})", |ctx| {
            let count: u32 = ctx.get("count").parse().unwrap_or(0);
            let notify = ctx.close_notify().ok();
            for tick in 0..count {
                if notify.as_ref().is_some_and(|n| n.is_closed()) {
                    tracing::debug!(tick, "Client left");
                    return;
                }
                let _ = ctx.write_string(&format!("tick {}\n", tick));
                if ctx.flush().is_err() {
                    return;
                }
                std::thread::sleep(Duration::from_millis(100));
            }
        })?;
        Ok(())
    })?;

    if let Some(storage) = &config.storage {
        let mut directory = DirectoryStorage::new(storage.root.clone());
        if let Some(key) = &storage.archive_key {
            directory = directory.with_archive(KeyArchive::new(key.clone()));
        }
        router.storage(&storage.pattern, Arc::new(directory))?;
    }

    router.not_found(|ctx| {
        if ctx.accepts_json() {
            ctx.write_header(StatusCode::NOT_FOUND);
            let path = ctx.path().to_string();
            let _ = ctx.json(
                &NotFound {
                    error: "not found",
                    path: &path,
                },
                false,
            );
        } else {
            ctx.not_found();
        }
    });

    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => load_config(path)?,
        None => DispatcherConfig::default(),
    };
    if let Some(bind) = args.bind {
        config.listener.bind_address = bind;
    }

    logging::init_logging(&config.observability);
    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        config = ?args.config,
        bind_address = %config.listener.bind_address,
        request_timeout_secs = config.timeouts.request_secs,
        max_body_size = config.limits.max_body_size,
        "http-dispatcher starting"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let mut router = Router::new();
    register_routes(&mut router, &config)?;
    let server = HttpServer::new(config.clone(), router.build());

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    let shutdown = Shutdown::new();
    let server_shutdown = shutdown.subscribe();
    tokio::spawn({
        let shutdown = shutdown.clone();
        async move { signals::forward_signals(&shutdown).await }
    });

    server.run(listener, server_shutdown).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
