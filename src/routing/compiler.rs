//! Route-tree compilation.
//!
//! # Responsibilities
//! - Walk a route tree and flatten it into `(method, path)` entries, each
//!   carrying the ordered hook chain for that leaf
//! - Accumulate inherited hooks asymmetrically: before-hooks append going
//!   down, after-hooks prepend, so a leaf's chain unwinds in stack order
//! - Refuse duplicate `(method, path)` registrations across every tree
//!   compiled into one table
//!
//! # Design Decisions
//! - One table accumulates the root tree and every plugin tree, so duplicate
//!   detection spans all of them
//! - Chains hold the leaf's own view only; the registry-wide hooks are
//!   attached when the table is installed against the dispatcher

use std::collections::HashSet;

use axum::http::Method;

use crate::errors::SetupError;
use crate::pipeline::hook::SharedHook;
use crate::routing::key::{join_paths, parse_key};
use crate::routing::spec::{RouteGroup, RouteSpec};

/// One flattened leaf: a method, a full path, and the ordered hook chain
/// ending at (and unwinding from) its handler.
#[derive(Clone)]
pub struct CompiledRoute {
    pub method: Method,
    pub path: String,
    /// Inherited before-hooks, local before-hooks, the handler, local
    /// after-hooks, inherited after-hooks, in execution order.
    pub chain: Vec<SharedHook>,
}

/// The shared registry every compiled tree lands in.
#[derive(Default)]
pub struct RouteTable {
    routes: Vec<CompiledRoute>,
    seen: HashSet<(Method, String)>,
}

impl RouteTable {
    pub fn new() -> Self {
        RouteTable::default()
    }

    /// Compile a route tree into the table, rooted at `GET /`.
    pub fn install(&mut self, root: &RouteGroup) -> Result<(), SetupError> {
        self.walk(root, &Method::GET, "/", &[], &[])
    }

    fn walk(
        &mut self,
        group: &RouteGroup,
        method: &Method,
        base: &str,
        inherited_before: &[SharedHook],
        inherited_after: &[SharedHook],
    ) -> Result<(), SetupError> {
        // TODO apply node-level plugin fields; the tree shapes carry them
        // but they are not yet merged into compiled pipelines
        let before: Vec<SharedHook> = inherited_before
            .iter()
            .chain(&group.before)
            .cloned()
            .collect();
        let after: Vec<SharedHook> = group.after.iter().chain(inherited_after).cloned().collect();

        for (key, node) in &group.children {
            let (child_method, fragment) = parse_key(key, method)?;
            let path = join_paths(base, &fragment);
            match node {
                RouteSpec::Group(child) => {
                    self.walk(child, &child_method, &path, &before, &after)?;
                }
                RouteSpec::Handler(handler) => {
                    self.register(child_method, path, &before, &[], handler, &[], &after)?;
                }
                RouteSpec::Extended {
                    handler,
                    before: local_before,
                    after: local_after,
                    plugins: _,
                } => {
                    self.register(
                        child_method,
                        path,
                        &before,
                        local_before,
                        handler,
                        local_after,
                        &after,
                    )?;
                }
            }
        }
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    fn register(
        &mut self,
        method: Method,
        path: String,
        inherited_before: &[SharedHook],
        local_before: &[SharedHook],
        handler: &SharedHook,
        local_after: &[SharedHook],
        inherited_after: &[SharedHook],
    ) -> Result<(), SetupError> {
        if !self.seen.insert((method.clone(), path.clone())) {
            return Err(SetupError::DuplicateRoute { method, path });
        }
        let mut chain = Vec::with_capacity(
            inherited_before.len()
                + local_before.len()
                + 1
                + local_after.len()
                + inherited_after.len(),
        );
        chain.extend(inherited_before.iter().cloned());
        chain.extend(local_before.iter().cloned());
        chain.push(handler.clone());
        chain.extend(local_after.iter().cloned());
        chain.extend(inherited_after.iter().cloned());

        tracing::debug!(method = %method, path = %path, steps = chain.len(), "route compiled");
        self.routes.push(CompiledRoute { method, path, chain });
        Ok(())
    }

    pub fn routes(&self) -> &[CompiledRoute] {
        &self.routes
    }

    pub fn into_routes(self) -> Vec<CompiledRoute> {
        self.routes
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}
