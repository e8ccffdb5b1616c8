//! Registration surface.
//!
//! # Responsibilities
//! - Collect global middleware, routes, groups, and fallback handlers
//! - Fail registration on invalid patterns or duplicate routes
//! - Freeze the result into an immutable `Dispatcher`
//!
//! # Design Decisions
//! - Registration is single-threaded and strictly precedes serving; the
//!   `Router` is consumed by `build()`, so nothing can be registered late
//! - Routes added directly on the `Router` go to the flat ungrouped table;
//!   routes added through a `GroupRef` go to the group tree

use std::sync::Arc;

use axum::http::Method;

use crate::context::Context;
use crate::dispatch::{Dispatcher, MethodMismatch};
use crate::routing::group::Group;
use crate::routing::handler::{Handler, MethodKey, Midware};
use crate::routing::RouteError;
use crate::storage::Storage;

macro_rules! method_shortcuts {
    ($($(#[$doc:meta])* $name:ident => $key:expr;)*) => {
        $(
            $(#[$doc])*
            pub fn $name<F>(&mut self, pattern: &str, handler: F) -> Result<&mut Self, RouteError>
            where
                F: Fn(&mut Context) + Send + Sync + 'static,
            {
                self.handle($key, pattern, Handler::new(handler))
            }
        )*
    };
}

/// Mutable route registry. Build it once at startup, then call
/// [`Router::build`] to obtain the shareable [`Dispatcher`].
pub struct Router {
    grouped: Group,
    ungrouped: Group,
    midwares: Vec<Midware>,
    not_found: Option<Handler>,
    not_allowed: Option<Handler>,
    method_mismatch: MethodMismatch,
}

impl Default for Router {
    fn default() -> Self {
        Self::new()
    }
}

impl Router {
    pub fn new() -> Self {
        Self {
            grouped: Group::root(),
            ungrouped: Group::root(),
            midwares: Vec::new(),
            not_found: None,
            not_allowed: None,
            method_mismatch: MethodMismatch::default(),
        }
    }

    /// Choose what happens when a path matches but the method does not.
    pub fn method_mismatch(&mut self, policy: MethodMismatch) -> &mut Self {
        self.method_mismatch = policy;
        self
    }

    /// Add a global middleware. Global middleware runs before route
    /// resolution, in registration order.
    pub fn use_midware<F>(&mut self, midware: F) -> &mut Self
    where
        F: Fn(&mut Context) -> bool + Send + Sync + 'static,
    {
        self.midwares.push(Midware::new(midware));
        self
    }

    /// Open (or reopen) the group for `prefix`, appending `midwares` to its
    /// before-list.
    pub fn group(
        &mut self,
        prefix: &str,
        midwares: impl IntoIterator<Item = Midware>,
    ) -> Result<GroupRef<'_>, RouteError> {
        let group = self.grouped.group(prefix)?;
        for midware in midwares {
            group.push_before(midware);
        }
        Ok(GroupRef { group })
    }

    /// Like [`Router::group`], then runs `register` against the group.
    pub fn group_with<F>(
        &mut self,
        prefix: &str,
        midwares: impl IntoIterator<Item = Midware>,
        register: F,
    ) -> Result<&mut Self, RouteError>
    where
        F: FnOnce(&mut GroupRef<'_>) -> Result<(), RouteError>,
    {
        register(&mut self.group(prefix, midwares)?)?;
        Ok(self)
    }

    /// Register `handler` for `method` on an ungrouped pattern.
    pub fn handle(
        &mut self,
        method: MethodKey,
        pattern: &str,
        handler: Handler,
    ) -> Result<&mut Self, RouteError> {
        self.ungrouped.insert(method, pattern, handler)?;
        Ok(self)
    }

    method_shortcuts! {
        /// Register a GET route.
        get => MethodKey::Exact(Method::GET);
        /// Register a PUT route.
        put => MethodKey::Exact(Method::PUT);
        /// Register a POST route.
        post => MethodKey::Exact(Method::POST);
        /// Register a PATCH route.
        patch => MethodKey::Exact(Method::PATCH);
        /// Register a DELETE route.
        delete => MethodKey::Exact(Method::DELETE);
        /// Register a HEAD route.
        head => MethodKey::Exact(Method::HEAD);
        /// Register an OPTIONS route.
        options => MethodKey::Exact(Method::OPTIONS);
        /// Register a route for any method without a more specific entry.
        any => MethodKey::Any;
    }

    /// Serve an object storage: GET downloads, POST uploads.
    pub fn storage(&mut self, pattern: &str, storage: Arc<dyn Storage>) -> Result<&mut Self, RouteError> {
        bind_storage(&mut self.ungrouped, pattern, storage)?;
        Ok(self)
    }

    /// Handler for requests no route matches. Defaults to a plain 404.
    pub fn not_found<F>(&mut self, handler: F) -> &mut Self
    where
        F: Fn(&mut Context) + Send + Sync + 'static,
    {
        self.not_found = Some(Handler::new(handler));
        self
    }

    /// Handler for a matched path with an unregistered method. Only used
    /// with [`MethodMismatch::NotAllowed`].
    pub fn not_allowed<F>(&mut self, handler: F) -> &mut Self
    where
        F: Fn(&mut Context) + Send + Sync + 'static,
    {
        self.not_allowed = Some(Handler::new(handler));
        self
    }

    /// Freeze the registry.
    pub fn build(self) -> Dispatcher {
        let mut summary = self.grouped.describe();
        summary.extend(self.ungrouped.describe());

        tracing::info!(
            grouped_routes = self.grouped.route_count(),
            ungrouped_routes = self.ungrouped.route_count(),
            global_midwares = self.midwares.len(),
            method_mismatch = ?self.method_mismatch,
            routes_summary = ?summary.iter().take(10).collect::<Vec<_>>(),
            "Routing table built"
        );

        Dispatcher::new(
            self.grouped,
            self.ungrouped,
            self.midwares,
            self.not_found,
            self.not_allowed,
            self.method_mismatch,
        )
    }
}

/// Registration handle for one group of the tree.
pub struct GroupRef<'r> {
    group: &'r mut Group,
}

impl GroupRef<'_> {
    /// Absolute prefix of this group.
    pub fn prefix(&self) -> &str {
        self.group.prefix()
    }

    /// Append a middleware that runs before this group's handlers.
    pub fn before<F>(&mut self, midware: F) -> &mut Self
    where
        F: Fn(&mut Context) -> bool + Send + Sync + 'static,
    {
        self.group.push_before(Midware::new(midware));
        self
    }

    /// Append a middleware that runs after this group's handlers.
    pub fn after<F>(&mut self, midware: F) -> &mut Self
    where
        F: Fn(&mut Context) -> bool + Send + Sync + 'static,
    {
        self.group.push_after(Midware::new(midware));
        self
    }

    /// Open a nested group; its prefix is appended to this one.
    pub fn group(
        &mut self,
        prefix: &str,
        midwares: impl IntoIterator<Item = Midware>,
    ) -> Result<GroupRef<'_>, RouteError> {
        let group = self.group.group(prefix)?;
        for midware in midwares {
            group.push_before(midware);
        }
        Ok(GroupRef { group })
    }

    pub fn group_with<F>(
        &mut self,
        prefix: &str,
        midwares: impl IntoIterator<Item = Midware>,
        register: F,
    ) -> Result<&mut Self, RouteError>
    where
        F: FnOnce(&mut GroupRef<'_>) -> Result<(), RouteError>,
    {
        register(&mut self.group(prefix, midwares)?)?;
        Ok(self)
    }

    /// Register `handler` for `method` on a pattern relative to this group.
    pub fn handle(
        &mut self,
        method: MethodKey,
        pattern: &str,
        handler: Handler,
    ) -> Result<&mut Self, RouteError> {
        self.group.insert(method, pattern, handler)?;
        Ok(self)
    }

    method_shortcuts! {
        get => MethodKey::Exact(Method::GET);
        put => MethodKey::Exact(Method::PUT);
        post => MethodKey::Exact(Method::POST);
        patch => MethodKey::Exact(Method::PATCH);
        delete => MethodKey::Exact(Method::DELETE);
        head => MethodKey::Exact(Method::HEAD);
        options => MethodKey::Exact(Method::OPTIONS);
        any => MethodKey::Any;
    }

    pub fn storage(&mut self, pattern: &str, storage: Arc<dyn Storage>) -> Result<&mut Self, RouteError> {
        bind_storage(self.group, pattern, storage)?;
        Ok(self)
    }
}

fn bind_storage(group: &mut Group, pattern: &str, storage: Arc<dyn Storage>) -> Result<(), RouteError> {
    let download = Arc::clone(&storage);
    group
        .insert(Method::GET.into(), pattern, Handler::new(move |ctx| download.download(ctx)))?
        .bind_storage(Arc::clone(&storage));

    let upload = Arc::clone(&storage);
    group
        .insert(Method::POST.into(), pattern, Handler::new(move |ctx| upload.upload(ctx)))?
        .bind_storage(storage);

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_pattern_fails_registration() {
        let mut router = Router::new();
        let result = router.get("/users/:id([0-9]+", |_| {});
        assert!(matches!(result, Err(RouteError::InvalidPattern { .. })));
    }

    #[test]
    fn test_duplicate_fails_registration() {
        let mut router = Router::new();
        router.get("/ping", |_| {}).unwrap();
        assert!(router.get("/ping/", |_| {}).is_err());
        // A different method on the same pattern is fine
        router.head("/ping", |_| {}).unwrap();
    }

    #[test]
    fn test_group_registration() {
        let mut router = Router::new();
        {
            let mut api = router.group("/api", [Midware::new(|_| true)]).unwrap();
            api.before(|_| true).after(|_| true);
            api.get("/users", |_| {}).unwrap().post("/users", |_| {}).unwrap();
            api.group("/v1", []).unwrap().get("/ping", |_| {}).unwrap();
            assert_eq!(api.prefix(), "/api");
        }

        let api = &router.grouped.groups()[0];
        assert_eq!(api.before().len(), 2);
        assert_eq!(api.after().len(), 1);
        assert_eq!(router.grouped.route_count(), 2);
        assert_eq!(router.ungrouped.route_count(), 0);
    }

    #[test]
    fn test_group_with_callback() {
        let mut router = Router::new();
        router
            .group_with("/admin", [], |admin| {
                admin.get("/stats", |_| {})?;
                admin.group_with("/users", [], |users| {
                    users.delete("/:id", |_| {})?;
                    Ok(())
                })?;
                Ok(())
            })
            .unwrap();

        let mut described = router.grouped.describe();
        described.sort();
        assert_eq!(described, vec!["DELETE /admin/users/:id", "GET /admin/stats"]);
    }

    #[test]
    fn test_group_with_propagates_errors() {
        let mut router = Router::new();
        let result = router.group_with("/admin", [], |admin| {
            admin.get("/:", |_| {})?;
            Ok(())
        });
        assert!(matches!(result, Err(RouteError::InvalidPattern { .. })));
    }
}
