//! The per-request pipeline.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::time::Instant;

use axum::http::StatusCode;

use crate::context::writer::write_error;
use crate::context::Context;
use crate::dispatch::{MethodMismatch, Outcome, Stage};
use crate::observability::metrics;
use crate::routing::{Group, Handler, MethodKey, Midware, Route, RouteMatch};
use crate::storage::{ARCHIVE_PATH_KEY, ROOT_KEY};

/// Frozen routing state shared by every in-flight request.
///
/// Built by [`crate::routing::Router::build`]. Immutable, `Send + Sync`.
pub struct Dispatcher {
    grouped: Group,
    ungrouped: Group,
    midwares: Vec<Midware>,
    not_found: Option<Handler>,
    not_allowed: Option<Handler>,
    method_mismatch: MethodMismatch,
}

impl Dispatcher {
    pub(crate) fn new(
        grouped: Group,
        ungrouped: Group,
        midwares: Vec<Midware>,
        not_found: Option<Handler>,
        not_allowed: Option<Handler>,
        method_mismatch: MethodMismatch,
    ) -> Self {
        Self {
            grouped,
            ungrouped,
            midwares,
            not_found,
            not_allowed,
            method_mismatch,
        }
    }

    /// Route for `path`: the group tree wins over the ungrouped table.
    pub fn resolve(&self, path: &str) -> Option<RouteMatch<'_>> {
        self.grouped
            .resolve(path)
            .or_else(|| self.ungrouped.resolve(path))
    }

    pub fn route_count(&self) -> usize {
        self.grouped.route_count() + self.ungrouped.route_count()
    }

    pub fn method_mismatch(&self) -> MethodMismatch {
        self.method_mismatch
    }

    /// `METHOD /pattern` for every registered action, grouped routes first.
    pub fn describe(&self) -> Vec<String> {
        let mut routes = self.grouped.describe();
        routes.extend(self.ungrouped.describe());
        routes
    }

    /// Run the full pipeline for one request.
    ///
    /// Never panics: faults raised by middleware or handlers are contained
    /// here. The response is always finished before this returns.
    pub fn dispatch(&self, ctx: &mut Context) -> Outcome {
        let start = Instant::now();
        let method = ctx.method().clone();
        let span = tracing::debug_span!("dispatch", method = %method, path = %ctx.path());
        let _guard = span.enter();

        let outcome = match panic::catch_unwind(AssertUnwindSafe(|| self.run(ctx))) {
            Ok(outcome) => outcome,
            Err(payload) => {
                let committed = ctx.is_committed();
                tracing::error!(
                    panic = %panic_message(payload.as_ref()),
                    committed,
                    "Handler fault contained"
                );
                // Replace whatever was buffered; a committed response can
                // only be cut short.
                if ctx.writer_mut().reset() {
                    write_error(
                        ctx.writer_mut(),
                        StatusCode::INTERNAL_SERVER_ERROR,
                        "Internal Server Error",
                    );
                }
                Outcome::Faulted
            }
        };

        ctx.finish();
        metrics::record_dispatch(&method, outcome, start);
        tracing::debug!(
            outcome = %outcome,
            status = %ctx.status(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Request dispatched"
        );
        outcome
    }

    fn run(&self, ctx: &mut Context) -> Outcome {
        if !run_chain(&self.midwares, ctx) {
            return halted(ctx, Stage::Global);
        }

        let path = ctx.path().to_string();
        let Some(found) = self.resolve(&path) else {
            tracing::debug!("No route matched");
            self.respond_not_found(ctx);
            return Outcome::NotFound;
        };

        // Captures go in last so they win over headers and form fields.
        for (name, value) in found.params.iter() {
            ctx.set(name, value);
        }

        let Some(handler) = found.route.action(ctx.method()) else {
            return self.respond_method_mismatch(ctx, found.route);
        };

        let group = found.group;
        if !run_chain(group.before(), ctx) {
            return halted(ctx, Stage::Before);
        }

        // Both keys are always overwritten so request data cannot supply them.
        if let Some(storage) = found.route.storage() {
            ctx.set(ROOT_KEY, storage.root());
            let archive_path = storage
                .archive()
                .map(|archive| archive.path(ctx))
                .unwrap_or_default();
            ctx.set(ARCHIVE_PATH_KEY, archive_path);
        }

        handler.call(ctx);
        if ctx.is_intercepted() {
            return halted(ctx, Stage::Handler);
        }

        if !run_chain(group.after(), ctx) {
            return halted(ctx, Stage::After);
        }

        Outcome::Handled
    }

    fn respond_not_found(&self, ctx: &mut Context) {
        match &self.not_found {
            Some(handler) => handler.call(ctx),
            None => ctx.not_found(),
        }
    }

    fn respond_method_mismatch(&self, ctx: &mut Context, route: &Route) -> Outcome {
        let allowed: Vec<String> = route
            .methods()
            .iter()
            .filter_map(|key| match key {
                MethodKey::Exact(method) => Some(method.to_string()),
                MethodKey::Any => None,
            })
            .collect();
        tracing::debug!(
            pattern = %route.pattern(),
            allowed = ?allowed,
            policy = ?self.method_mismatch,
            "Method not registered for route"
        );

        match self.method_mismatch {
            MethodMismatch::NotFound => {
                self.respond_not_found(ctx);
                Outcome::NotFound
            }
            MethodMismatch::NotAllowed => {
                match &self.not_allowed {
                    Some(handler) => handler.call(ctx),
                    None => {
                        ctx.header("Allow", &allowed.join(", "));
                        write_error(
                            ctx.writer_mut(),
                            StatusCode::METHOD_NOT_ALLOWED,
                            "405 method not allowed",
                        );
                    }
                }
                Outcome::MethodNotAllowed
            }
        }
    }
}

/// Run `chain` in order. False as soon as one middleware says stop or
/// anything intercepted.
fn run_chain(chain: &[Midware], ctx: &mut Context) -> bool {
    chain
        .iter()
        .all(|midware| midware.call(ctx) && !ctx.is_intercepted())
}

fn halted(ctx: &Context, stage: Stage) -> Outcome {
    tracing::debug!(
        stage = %stage,
        reason = ctx.interrupt_reason().unwrap_or("middleware returned false"),
        "Pipeline halted"
    );
    Outcome::Halted(stage)
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
