//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::time::Duration;

use axum::body::Bytes;
use axum::http::{Method, Request};
use http_dispatcher::context::{BufferWriter, Recording};
use http_dispatcher::{Context, Dispatcher, DispatcherConfig, HttpServer, Outcome, Router, Shutdown};
use tokio::net::TcpListener;

/// Dispatch an in-memory request, returning the outcome and what was written.
pub fn dispatch(dispatcher: &Dispatcher, request: Request<Bytes>) -> (Outcome, Recording) {
    let (writer, recording) = BufferWriter::new();
    let mut ctx = Context::from_request(request, Box::new(writer));
    let outcome = dispatcher.dispatch(&mut ctx);
    (outcome, recording)
}

pub fn request(method: Method, uri: &str) -> Request<Bytes> {
    Request::builder()
        .method(method)
        .uri(uri)
        .body(Bytes::new())
        .unwrap()
}

pub fn get(uri: &str) -> Request<Bytes> {
    request(Method::GET, uri)
}

/// Serve `router` on an ephemeral local port.
pub async fn start_server(router: Router, config: DispatcherConfig) -> (SocketAddr, Shutdown) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let server = HttpServer::new(config, router.build());

    let shutdown = Shutdown::new();
    let server_shutdown = shutdown.subscribe();
    tokio::spawn(async move {
        let _ = server.run(listener, server_shutdown).await;
    });

    // Give the accept loop a moment to start.
    tokio::time::sleep(Duration::from_millis(50)).await;
    (addr, shutdown)
}

pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .pool_max_idle_per_host(0)
        .no_proxy()
        .build()
        .unwrap()
}
