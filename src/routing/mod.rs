//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! Registration (at startup):
//!     Router::get/post/.../group/storage
//!     → pattern.rs (normalize + compile, InvalidPattern on error)
//!     → group.rs (insert into the flat table or the group tree)
//!     → Router::build() freezes everything into a Dispatcher
//!
//! Lookup (per request):
//!     request path
//!     → group tree (longest prefix first, then most specific pattern)
//!     → flat ungrouped table if the tree has no match
//!     → RouteMatch { route, owning group, captures } or no match
//! ```
//!
//! # Design Decisions
//! - Routes compiled at startup, immutable at runtime
//! - Segment-wise matching; regex only inside capture segments
//! - Deterministic: same input always matches same route
//! - Duplicate (pattern, method) registrations fail instead of overwriting

pub mod group;
pub mod handler;
pub mod pattern;
pub mod router;

use thiserror::Error;

pub use group::{Group, Route, RouteMatch};
pub use handler::{Handler, MethodKey, Midware};
pub use pattern::{Params, Pattern};
pub use router::{GroupRef, Router};

/// Errors raised while registering routes. All of them are fatal to startup.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RouteError {
    /// The pattern (or group prefix) cannot be compiled.
    #[error("invalid pattern '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: String },

    /// The same method was registered twice for one pattern.
    #[error("duplicate route: {method} {pattern} is already registered")]
    DuplicateRoute { pattern: String, method: String },
}
