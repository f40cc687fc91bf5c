//! Installable bundles of routes, hooks and middleware.
//!
//! # Responsibilities
//! - Define the plugin descriptor: the routes, hook lists, middleware
//!   factories, host callbacks and dependencies one installation carries
//! - Define the reference shapes a plugin can be supplied as, from a ready
//!   descriptor to a parameterized factory or a registry name
//! - Hold the name registry that `Named` references resolve through
//!
//! # Design Decisions
//! - References are an explicit variant set resolved by a pure function with
//!   a depth limit, not an open-ended dynamic lookup
//! - Plugin parameters are a JSON map; factories read them, literal
//!   descriptors are already built and ignore them
//! - Middleware entries are factories invoked once at application time, and
//!   the produced middleware runs around every request

pub mod resolver;

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use axum::extract::Request;
use axum::middleware::Next;
use axum::response::Response;
use axum::Router;
use futures_util::future::BoxFuture;

use crate::app::AppConfig;
use crate::errors::taxonomy::Taxonomy;
use crate::pipeline::hook::{SharedHook, SharedRawHook};
use crate::routing::spec::RouteGroup;

pub use resolver::{resolve, resolve_with, MAX_RESOLVE_DEPTH};

/// Parameters accumulated while resolving a plugin reference.
pub type Params = serde_json::Map<String, serde_json::Value>;

/// Produces a plugin reference from the accumulated parameters.
pub type PluginFactory = Arc<dyn Fn(&Params) -> PluginRef + Send + Sync>;

/// A function run around every request once applied to the dispatcher.
pub type Middleware = Arc<dyn Fn(Request, Next) -> BoxFuture<'static, Response> + Send + Sync>;

/// Builds a middleware at plugin-application time.
pub type MiddlewareFactory = Arc<dyn Fn() -> Middleware + Send + Sync>;

/// Mutates host setup state while the plugin applies.
pub type HostCallback = Arc<dyn Fn(&mut AppConfig, &mut Taxonomy) + Send + Sync>;

/// Transforms the built dispatcher once routes are installed.
pub type AppCallback = Arc<dyn Fn(Router) -> Router + Send + Sync>;

/// Wrap an async closure as a [`Middleware`].
pub fn middleware_fn<F, Fut>(f: F) -> Middleware
where
    F: Fn(Request, Next) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Response> + Send + 'static,
{
    Arc::new(move |req: Request, next: Next| -> BoxFuture<'static, Response> {
        Box::pin(f(req, next))
    })
}

/// A resolved plugin: everything one installation contributes to the host.
#[derive(Clone, Default)]
pub struct Plugin {
    /// Middleware factories, each invoked once at application time.
    pub middleware: Vec<MiddlewareFactory>,
    /// Callbacks over the host's mutable setup state.
    pub on_host: Vec<HostCallback>,
    /// Callbacks over the built dispatcher.
    pub on_app: Vec<AppCallback>,
    /// Raw hooks prepended to the registry's `before_acc` phase.
    pub before_acc: Vec<SharedRawHook>,
    /// Context hooks prepended to the registry's `before` phase.
    pub before: Vec<SharedHook>,
    /// Context hooks prepended to the registry's `after` phase.
    pub after: Vec<SharedHook>,
    /// Raw hooks prepended to the registry's `after_acc` phase.
    pub after_acc: Vec<SharedRawHook>,
    /// Plugins this one depends on; their hooks end up running first.
    pub requires: Vec<PluginRef>,
    /// Routes merged into the shared route table.
    pub routes: RouteGroup,
}

impl Plugin {
    pub fn new() -> Self {
        Plugin::default()
    }

    pub fn routes(mut self, routes: RouteGroup) -> Self {
        self.routes = routes;
        self
    }

    pub fn before(mut self, hook: SharedHook) -> Self {
        self.before.push(hook);
        self
    }

    pub fn after(mut self, hook: SharedHook) -> Self {
        self.after.push(hook);
        self
    }

    pub fn before_acc(mut self, hook: SharedRawHook) -> Self {
        self.before_acc.push(hook);
        self
    }

    pub fn after_acc(mut self, hook: SharedRawHook) -> Self {
        self.after_acc.push(hook);
        self
    }

    pub fn middleware<F>(mut self, factory: F) -> Self
    where
        F: Fn() -> Middleware + Send + Sync + 'static,
    {
        self.middleware.push(Arc::new(factory));
        self
    }

    pub fn on_host<F>(mut self, callback: F) -> Self
    where
        F: Fn(&mut AppConfig, &mut Taxonomy) + Send + Sync + 'static,
    {
        self.on_host.push(Arc::new(callback));
        self
    }

    pub fn on_app<F>(mut self, callback: F) -> Self
    where
        F: Fn(Router) -> Router + Send + Sync + 'static,
    {
        self.on_app.push(Arc::new(callback));
        self
    }

    pub fn requires(mut self, reference: PluginRef) -> Self {
        self.requires.push(reference);
        self
    }
}

/// How a plugin is supplied before resolution.
#[derive(Clone)]
pub enum PluginRef {
    /// Looked up in the [`PluginRegistry`] by name.
    Named(String),
    /// Already a descriptor.
    Literal(Plugin),
    /// Built from the accumulated parameters.
    Factory(PluginFactory),
    /// Wraps another reference with extra parameters; its own parameters
    /// win over ones accumulated so far.
    Package { inner: Box<PluginRef>, params: Params },
    /// Invokes a builder with its own parameters; parameters accumulated so
    /// far win for the nested resolution.
    Redirect { make: PluginFactory, params: Params },
}

impl PluginRef {
    pub fn named(name: impl Into<String>) -> Self {
        PluginRef::Named(name.into())
    }

    pub fn literal(plugin: Plugin) -> Self {
        PluginRef::Literal(plugin)
    }

    pub fn factory<F>(make: F) -> Self
    where
        F: Fn(&Params) -> PluginRef + Send + Sync + 'static,
    {
        PluginRef::Factory(Arc::new(make))
    }

    pub fn package(inner: PluginRef, params: Params) -> Self {
        PluginRef::Package {
            inner: Box::new(inner),
            params,
        }
    }

    pub fn redirect<F>(make: F, params: Params) -> Self
    where
        F: Fn(&Params) -> PluginRef + Send + Sync + 'static,
    {
        PluginRef::Redirect {
            make: Arc::new(make),
            params,
        }
    }
}

impl From<Plugin> for PluginRef {
    fn from(plugin: Plugin) -> Self {
        PluginRef::Literal(plugin)
    }
}

/// Name lookup for [`PluginRef::Named`] references.
#[derive(Clone, Default)]
pub struct PluginRegistry {
    entries: HashMap<String, PluginRef>,
}

impl PluginRegistry {
    pub fn new() -> Self {
        PluginRegistry::default()
    }

    pub fn register(&mut self, name: impl Into<String>, reference: PluginRef) {
        self.entries.insert(name.into(), reference);
    }

    pub fn get(&self, name: &str) -> Option<&PluginRef> {
        self.entries.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }
}
