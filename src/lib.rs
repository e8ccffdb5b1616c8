//! HTTP request dispatcher.
//!
//! Routes requests by URL pattern and method through global and per-group
//! middleware to synchronous handlers, each working on a per-request
//! [`Context`].

// Core subsystems
pub mod context;
pub mod dispatch;
pub mod routing;
pub mod storage;

// Host stack
pub mod config;
pub mod http;

// Cross-cutting concerns
pub mod lifecycle;
pub mod observability;

pub use config::DispatcherConfig;
pub use context::Context;
pub use dispatch::{Dispatcher, MethodMismatch, Outcome, RouteTable, Stage};
pub use http::HttpServer;
pub use lifecycle::Shutdown;
pub use routing::{GroupRef, Handler, Midware, RouteError, Router};
