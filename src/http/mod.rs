//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, timeout, tracing)
//!     → request.rs (add request ID)
//!     → server.rs drains the body, builds the Context
//!     → Dispatcher runs on a blocking worker
//!     → StreamWriter hands the response back to Axum
//!     → Send to client
//! ```

pub mod request;
pub mod server;

pub use request::{request_id, MakeRequestUuid, X_REQUEST_ID};
pub use server::HttpServer;
