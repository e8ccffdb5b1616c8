//! Request dispatch subsystem.
//!
//! # Data Flow
//! ```text
//! Context
//!     → global middleware            (false / intercept → Halted(Global))
//!     → resolve: group tree, then ungrouped table
//!         no match                   → not-found handler or 404
//!     → captures into Context
//!     → method lookup (exact, then ANY)
//!         miss                       → MethodMismatch policy
//!     → owning group's before chain  (false / intercept → Halted(Before))
//!     → storage keys into Context
//!     → handler                      (intercept → Halted(Handler))
//!     → owning group's after chain   (false / intercept → Halted(After))
//!     → Handled
//! ```
//!
//! # Design Decisions
//! - The whole pipeline runs inside one panic boundary; a fault is logged,
//!   answered with 500 when possible, and never reaches the caller
//! - Halting is ordinary control flow, not a fault
//! - The dispatcher is immutable; swapping in a new one is the only way to
//!   change routes while serving

mod dispatcher;
mod table;

use std::fmt;

use serde::{Deserialize, Serialize};

pub use dispatcher::Dispatcher;
pub use table::RouteTable;

/// What to do when a path matches but no action exists for the method.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MethodMismatch {
    /// Treat it like an unmatched path.
    #[default]
    NotFound,
    /// Call the not-allowed handler, or answer 405 with an `Allow` header.
    NotAllowed,
}

/// Pipeline step at which a request was halted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Global,
    Before,
    Handler,
    After,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Stage::Global => "global",
            Stage::Before => "before",
            Stage::Handler => "handler",
            Stage::After => "after",
        })
    }
}

/// How a dispatched request ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// The handler ran and every after-middleware passed.
    Handled,
    /// A middleware returned false or something intercepted.
    Halted(Stage),
    /// No route matched, or the method was missing under `MethodMismatch::NotFound`.
    NotFound,
    /// The method was missing under `MethodMismatch::NotAllowed`.
    MethodNotAllowed,
    /// A middleware or handler panicked.
    Faulted,
}

impl Outcome {
    /// Stable label for logs and metrics.
    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::Handled => "handled",
            Outcome::Halted(_) => "halted",
            Outcome::NotFound => "not_found",
            Outcome::MethodNotAllowed => "method_not_allowed",
            Outcome::Faulted => "faulted",
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Halted(stage) => write!(f, "halted at {}", stage),
            other => f.write_str(other.as_str()),
        }
    }
}
