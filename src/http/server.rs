//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create the Axum Router that funnels every request into the dispatcher
//! - Wire up middleware (timeout, request ID, tracing)
//! - Drain request bodies up to the configured limit
//! - Run synchronous handlers off the async workers
//! - Bind server to listener and shut down gracefully

use std::net::SocketAddr;
use std::time::Duration;

use axum::{
    body::Body,
    extract::State,
    http::{Request, StatusCode},
    response::{IntoResponse, Response},
    Router,
};
use hyper::upgrade::OnUpgrade;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower_http::{
    request_id::{PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::config::DispatcherConfig;
use crate::context::{Context, StreamWriter};
use crate::dispatch::RouteTable;
use crate::http::request::{request_id, MakeRequestUuid, X_REQUEST_ID};

/// Application state injected into the fallback handler.
#[derive(Clone)]
struct AppState {
    routes: RouteTable,
    max_body_size: usize,
}

/// HTTP front end for a [`RouteTable`].
pub struct HttpServer {
    router: Router,
    config: DispatcherConfig,
    routes: RouteTable,
}

impl HttpServer {
    /// Create a new HTTP server serving `routes`.
    pub fn new(config: DispatcherConfig, routes: impl Into<RouteTable>) -> Self {
        let routes = routes.into();
        let state = AppState {
            routes: routes.clone(),
            max_body_size: config.limits.max_body_size,
        };

        let router = Self::build_router(&config, state);
        Self {
            router,
            config,
            routes,
        }
    }

    /// Build the Axum router with all middleware layers.
    #[allow(deprecated)]
    fn build_router(config: &DispatcherConfig, state: AppState) -> Router {
        Router::new()
            .fallback(dispatch_handler)
            .with_state(state)
            .layer(TimeoutLayer::new(Duration::from_secs(config.timeouts.request_secs)))
            .layer(TraceLayer::new_for_http().make_span_with(|request: &Request<Body>| {
                tracing::info_span!(
                    "request",
                    method = %request.method(),
                    uri = %request.uri(),
                    request_id = %request_id(request.headers()),
                )
            }))
            .layer(PropagateRequestIdLayer::new(X_REQUEST_ID))
            .layer(SetRequestIdLayer::new(X_REQUEST_ID, MakeRequestUuid))
    }

    /// Run the server, accepting connections on the given listener until
    /// `shutdown` fires.
    pub async fn run(
        self,
        listener: TcpListener,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(
            address = %addr,
            routes = self.routes.load().route_count(),
            "HTTP server starting"
        );

        let app = self.router.into_make_service_with_connect_info::<SocketAddr>();

        // Serve with graceful shutdown
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
                tracing::info!("Shutdown signal received, draining connections");
            })
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }

    /// Handle for replacing routes while serving.
    pub fn routes(&self) -> &RouteTable {
        &self.routes
    }

    /// The fully layered Axum router, e.g. for `tower::ServiceExt::oneshot`.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// Get a reference to the config.
    pub fn config(&self) -> &DispatcherConfig {
        &self.config
    }
}

/// Every request lands here.
/// Drains the body, then runs the dispatcher on a blocking worker while
/// waiting for the response head.
async fn dispatch_handler(State(state): State<AppState>, request: Request<Body>) -> Response {
    let (mut parts, body) = request.into_parts();

    // A read failure means the client is gone; only the limit case can
    // still be answered.
    let body = match axum::body::to_bytes(body, state.max_body_size).await {
        Ok(bytes) => bytes,
        Err(e) => {
            tracing::warn!(
                limit = state.max_body_size,
                error = %e,
                "Request body rejected"
            );
            return (StatusCode::PAYLOAD_TOO_LARGE, "413 request body too large\n").into_response();
        }
    };

    let upgrade = parts.extensions.remove::<OnUpgrade>();
    let (writer, pending) = StreamWriter::new(upgrade);
    let ctx = Context::new(parts, body, Box::new(writer));
    let dispatcher = state.routes.load();

    let span = tracing::Span::current();
    tokio::task::spawn_blocking(move || {
        let _guard = span.enter();
        let mut ctx = ctx;
        dispatcher.dispatch(&mut ctx);
    });

    match pending.recv().await {
        Some(response) => response,
        None => {
            tracing::error!("Dispatcher produced no response");
            (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error\n").into_response()
        }
    }
}
