//! Hot-swappable handle to the active dispatcher.

use std::sync::Arc;

use arc_swap::ArcSwap;

use crate::context::Context;
use crate::dispatch::{Dispatcher, Outcome};

/// Shared, atomically replaceable [`Dispatcher`].
///
/// Cloning is cheap; every clone observes the same table. A replacement is
/// built off to the side and swapped in whole, so a request always sees
/// one consistent set of routes.
#[derive(Clone)]
pub struct RouteTable {
    current: Arc<ArcSwap<Dispatcher>>,
}

impl RouteTable {
    pub fn new(dispatcher: Dispatcher) -> Self {
        Self {
            current: Arc::new(ArcSwap::from_pointee(dispatcher)),
        }
    }

    /// The dispatcher serving new requests right now.
    pub fn load(&self) -> Arc<Dispatcher> {
        self.current.load_full()
    }

    /// Install `dispatcher` for all subsequent requests. In-flight requests
    /// finish on the table they started with.
    pub fn replace(&self, dispatcher: Dispatcher) {
        let routes = dispatcher.route_count();
        self.current.store(Arc::new(dispatcher));
        tracing::info!(routes, "Routing table replaced");
    }

    /// Dispatch `ctx` against the current table.
    pub fn dispatch(&self, ctx: &mut Context) -> Outcome {
        self.load().dispatch(ctx)
    }
}

impl From<Dispatcher> for RouteTable {
    fn from(dispatcher: Dispatcher) -> Self {
        Self::new(dispatcher)
    }
}
