//! Handler and middleware function types.

use std::fmt;
use std::sync::Arc;

use axum::http::Method;

use crate::context::Context;

/// A request handler with full control over the response.
#[derive(Clone)]
pub struct Handler(Arc<dyn Fn(&mut Context) + Send + Sync>);

impl Handler {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&mut Context) + Send + Sync + 'static,
    {
        Self(Arc::new(f))
    }

    pub fn call(&self, ctx: &mut Context) {
        (self.0)(ctx)
    }
}

impl fmt::Debug for Handler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Handler")
    }
}

/// A pre/post hook. Returning `false` stops the pipeline at that point.
#[derive(Clone)]
pub struct Midware(Arc<dyn Fn(&mut Context) -> bool + Send + Sync>);

impl Midware {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&mut Context) -> bool + Send + Sync + 'static,
    {
        Self(Arc::new(f))
    }

    pub fn call(&self, ctx: &mut Context) -> bool {
        (self.0)(ctx)
    }
}

impl fmt::Debug for Midware {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Midware")
    }
}

/// Key of a route's action table: an exact method, or the `ANY` wildcard
/// used when no exact entry exists.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum MethodKey {
    Exact(Method),
    Any,
}

impl From<Method> for MethodKey {
    fn from(method: Method) -> Self {
        MethodKey::Exact(method)
    }
}

impl fmt::Display for MethodKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MethodKey::Exact(method) => f.write_str(method.as_str()),
            MethodKey::Any => f.write_str("ANY"),
        }
    }
}
