//! Route table and group tree.
//!
//! # Responsibilities
//! - Hold routes (pattern → method → handler) under a URL prefix
//! - Hold nested groups and their scoped before/after middleware
//! - Resolve a path to a route plus the group that owns it
//!
//! # Design Decisions
//! - Topology is fixed once the owning `Router` is built
//! - Sibling groups are unique by prefix; re-registering returns the same group
//! - Most specific wins: longer prefixes first, then literal > regex > any
//! - A subgroup that matches the prefix but holds no matching route falls
//!   back to the parent's own routes

use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Arc;

use axum::http::Method;

use crate::routing::handler::{Handler, Midware, MethodKey};
use crate::routing::pattern::{normalize, split_path, Params, Pattern};
use crate::routing::RouteError;
use crate::storage::Storage;

/// One compiled pattern and its method → handler table.
pub struct Route {
    pattern: Pattern,
    actions: HashMap<MethodKey, Handler>,
    storage: Option<Arc<dyn Storage>>,
}

impl Route {
    fn new(pattern: Pattern) -> Self {
        Self {
            pattern,
            actions: HashMap::new(),
            storage: None,
        }
    }

    pub fn pattern(&self) -> &Pattern {
        &self.pattern
    }

    /// Handler for `method`, falling back to the `ANY` entry.
    pub fn action(&self, method: &Method) -> Option<&Handler> {
        self.actions
            .get(&MethodKey::Exact(method.clone()))
            .or_else(|| self.actions.get(&MethodKey::Any))
    }

    /// Registered method keys, sorted for stable `Allow` headers.
    pub fn methods(&self) -> Vec<MethodKey> {
        let mut methods: Vec<MethodKey> = self.actions.keys().cloned().collect();
        methods.sort_by(|a, b| a.to_string().cmp(&b.to_string()));
        methods
    }

    /// Object-storage binding, if this route serves a storage.
    pub fn storage(&self) -> Option<&Arc<dyn Storage>> {
        self.storage.as_ref()
    }

    pub(crate) fn bind_storage(&mut self, storage: Arc<dyn Storage>) {
        self.storage = Some(storage);
    }
}

/// A URL-prefix subtree with its own routes, subgroups, and middleware.
pub struct Group {
    /// Absolute, normalized prefix ("/" for a root group).
    prefix: String,
    /// Prefix relative to the parent group.
    pattern: Pattern,
    routes: Vec<Route>,
    groups: Vec<Group>,
    before: Vec<Midware>,
    after: Vec<Midware>,
}

/// Result of resolving a path: the route, the group owning it, and every
/// capture collected along the way (group prefixes first).
pub struct RouteMatch<'a> {
    pub route: &'a Route,
    pub group: &'a Group,
    pub params: Params,
}

impl Group {
    /// An empty root group with prefix "/".
    pub fn root() -> Self {
        Self {
            prefix: "/".to_string(),
            pattern: Pattern::root(),
            routes: Vec::new(),
            groups: Vec::new(),
            before: Vec::new(),
            after: Vec::new(),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn before(&self) -> &[Midware] {
        &self.before
    }

    pub fn after(&self) -> &[Midware] {
        &self.after
    }

    pub fn routes(&self) -> &[Route] {
        &self.routes
    }

    pub fn groups(&self) -> &[Group] {
        &self.groups
    }

    pub(crate) fn push_before(&mut self, midware: Midware) {
        self.before.push(midware);
    }

    pub(crate) fn push_after(&mut self, midware: Midware) {
        self.after.push(midware);
    }

    /// Add `method → handler` for `pattern`, creating the route if needed.
    ///
    /// Registering the same method twice for one pattern is an error.
    pub fn insert(
        &mut self,
        method: MethodKey,
        pattern: &str,
        handler: Handler,
    ) -> Result<&mut Route, RouteError> {
        let source = normalize(pattern);

        let index = match self.routes.iter().position(|r| r.pattern.source() == source) {
            Some(index) => index,
            None => {
                let compiled = Pattern::compile(&source)?;
                // A differently named twin could never be reached.
                if let Some(twin) = self.routes.iter().find(|r| r.pattern.same_shape(&compiled)) {
                    return Err(if twin.actions.contains_key(&method) {
                        RouteError::DuplicateRoute {
                            pattern: self.join(&source),
                            method: method.to_string(),
                        }
                    } else {
                        RouteError::InvalidPattern {
                            pattern: self.join(&source),
                            reason: format!(
                                "shadowed by '{}'; reuse its capture names",
                                self.join(twin.pattern.source())
                            ),
                        }
                    });
                }
                // Insert after every route of equal precedence: registration
                // order breaks ties.
                let index = self
                    .routes
                    .iter()
                    .position(|r| compiled.precedence(&r.pattern) == Ordering::Less)
                    .unwrap_or(self.routes.len());
                self.routes.insert(index, Route::new(compiled));
                index
            }
        };

        if self.routes[index].actions.contains_key(&method) {
            return Err(RouteError::DuplicateRoute {
                pattern: self.join(&source),
                method: method.to_string(),
            });
        }

        tracing::debug!(
            group = %self.prefix,
            pattern = %source,
            method = %method,
            "Route registered"
        );

        let route = &mut self.routes[index];
        route.actions.insert(method, handler);
        Ok(route)
    }

    /// Return the subgroup for `prefix`, creating it if needed.
    pub fn group(&mut self, prefix: &str) -> Result<&mut Group, RouteError> {
        let source = normalize(prefix);
        if source == "/" {
            return Err(RouteError::InvalidPattern {
                pattern: prefix.to_string(),
                reason: "group prefix must not be empty".to_string(),
            });
        }

        let index = match self.groups.iter().position(|g| g.pattern.source() == source) {
            Some(index) => index,
            None => {
                let compiled = Pattern::compile(&source)?;
                let absolute = self.join(&source);
                tracing::debug!(prefix = %absolute, "Group created");
                let index = self
                    .groups
                    .iter()
                    .position(|g| compiled.precedence(&g.pattern) == Ordering::Less)
                    .unwrap_or(self.groups.len());
                self.groups.insert(
                    index,
                    Group {
                        prefix: absolute,
                        pattern: compiled,
                        routes: Vec::new(),
                        groups: Vec::new(),
                        before: Vec::new(),
                        after: Vec::new(),
                    },
                );
                index
            }
        };

        Ok(&mut self.groups[index])
    }

    /// Resolve a request path against this group and everything below it.
    pub fn resolve(&self, path: &str) -> Option<RouteMatch<'_>> {
        let segments: Vec<&str> = split_path(path).collect();
        self.resolve_segments(&segments)
    }

    fn resolve_segments<'a>(&'a self, segments: &[&str]) -> Option<RouteMatch<'a>> {
        for child in &self.groups {
            let Some(prefix_params) = child.pattern.match_prefix(segments) else {
                continue;
            };
            let rest = &segments[child.pattern.len()..];
            if let Some(mut found) = child.resolve_segments(rest) {
                let mut params = prefix_params;
                params.extend(found.params);
                found.params = params;
                return Some(found);
            }
        }

        self.routes.iter().find_map(|route| {
            route.pattern.match_segments(segments).map(|params| RouteMatch {
                route,
                group: self,
                params,
            })
        })
    }

    /// Total number of routes in this subtree.
    pub fn route_count(&self) -> usize {
        self.routes.len() + self.groups.iter().map(Group::route_count).sum::<usize>()
    }

    /// `(method, absolute pattern)` pairs for every route in this subtree.
    pub fn describe(&self) -> Vec<String> {
        let mut out = Vec::new();
        for route in &self.routes {
            for method in route.methods() {
                out.push(format!("{} {}", method, self.join(route.pattern.source())));
            }
        }
        for group in &self.groups {
            out.extend(group.describe());
        }
        out
    }

    fn join(&self, relative: &str) -> String {
        match (self.prefix.as_str(), relative) {
            ("/", rel) => rel.to_string(),
            (prefix, "/") => prefix.to_string(),
            (prefix, rel) => format!("{}{}", prefix, rel),
        }
    }
}
