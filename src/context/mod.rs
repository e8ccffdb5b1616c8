//! Per-request context subsystem.
//!
//! # Data Flow
//! ```text
//! http::server drains the body, creates a StreamWriter
//!     → Context::new (headers, form, body into the data map)
//!     → dispatcher adds path captures and storage keys
//!     → middleware / handler read data, write through the ResponseWriter
//!     → Context::finish hands the last bytes to the client
//! ```

pub mod encode;
pub mod request_context;
pub mod writer;

pub use encode::SerializationError;
pub use request_context::{canonical_header_key, Context};
pub use writer::{
    upgraded, BufferWriter, Capability, CloseNotify, HijackedIo, PendingResponse, Recording,
    ResponseWriter, StreamWriter, WriterError,
};
