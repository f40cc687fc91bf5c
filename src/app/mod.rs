//! Application assembly and serving.
//!
//! # Responsibilities
//! - Apply plugins in order, then compile the route trees into one table
//! - Install the table against the dispatcher: snapshot the registry-wide
//!   hooks per route, wire middleware layers and dispatcher callbacks
//! - Bind the listener and serve, firing lifecycle callbacks at each
//!   milestone
//!
//! # Design Decisions
//! - Assembly is fallible and fatal: a malformed tree or plugin set refuses
//!   to construct, it never degrades into request-time behavior
//! - Registry hooks are read once per route at install time; the registry is
//!   not consulted again while serving
//! - Dependency plugins apply after their dependent's own hook prepends, so
//!   dependency hooks land in front and run first

use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::{Path, Request};
use axum::middleware::{from_fn, Next};
use axum::routing::{on, MethodFilter};
use axum::Router;
use serde::Deserialize;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

use crate::errors::taxonomy::Taxonomy;
use crate::errors::{SetupError, StartError};
use crate::events::Events;
use crate::pipeline::context::DEFAULT_BODY_LIMIT;
use crate::pipeline::executor::{dispatch, Dispatcher, RoutePipeline};
use crate::pipeline::hook::SharedHook;
use crate::plugin::{
    resolve, AppCallback, Middleware, PluginRef, PluginRegistry, MAX_RESOLVE_DEPTH,
};
use crate::routing::compiler::RouteTable;
use crate::routing::spec::RouteGroup;

/// Host and dispatch configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Interface to bind.
    pub host: String,
    /// Port used when `listen` is not handed one explicitly.
    pub port: u16,
    /// Upper bound on accepted request body size, in bytes.
    pub body_limit: usize,
}

impl Default for AppConfig {
    fn default() -> Self {
        AppConfig {
            host: "0.0.0.0".to_string(),
            port: 8080,
            body_limit: DEFAULT_BODY_LIMIT,
        }
    }
}

/// Everything [`App::new`] consumes. Every field defaults.
#[derive(Default)]
pub struct AppOptions {
    /// The root route tree.
    pub routes: RouteGroup,
    /// Plugins applied, in order, before the root tree compiles.
    pub plugins: Vec<PluginRef>,
    /// Seed registry state: lifecycle callbacks and cross-cutting hooks.
    pub events: Events,
    /// The declared validation taxonomy.
    pub errors: Taxonomy,
    pub config: AppConfig,
    /// Name lookup for [`PluginRef::Named`] references.
    pub registry: PluginRegistry,
}

/// A fully assembled application, ready to serve.
pub struct App {
    router: Router,
    events: Events,
    config: AppConfig,
}

/// Mutable state accumulated across plugin application and compilation.
struct Setup {
    table: RouteTable,
    middleware: Vec<Middleware>,
    app_callbacks: Vec<AppCallback>,
    events: Events,
    errors: Taxonomy,
    config: AppConfig,
}

impl Setup {
    fn apply_plugin(
        &mut self,
        reference: &PluginRef,
        registry: &PluginRegistry,
        depth: usize,
    ) -> Result<(), SetupError> {
        if depth == 0 {
            return Err(SetupError::PluginDepth {
                limit: MAX_RESOLVE_DEPTH,
            });
        }
        let plugin = resolve(reference, registry)?;

        self.table.install(&plugin.routes)?;
        for factory in &plugin.middleware {
            self.middleware.push(factory());
        }
        for callback in &plugin.on_host {
            callback(&mut self.config, &mut self.errors);
        }
        self.app_callbacks.extend(plugin.on_app.iter().cloned());

        self.events.before_acc.prepend(plugin.before_acc.iter().cloned());
        self.events.before.prepend(plugin.before.iter().cloned());
        self.events.after.prepend(plugin.after.iter().cloned());
        self.events.after_acc.prepend(plugin.after_acc.iter().cloned());

        // Dependencies apply after the prepends above, landing their hooks
        // in front of this plugin's
        for dependency in &plugin.requires {
            self.apply_plugin(dependency, registry, depth - 1)?;
        }
        Ok(())
    }

    fn into_app(self) -> Result<App, SetupError> {
        let Setup {
            table,
            middleware,
            app_callbacks,
            events,
            errors,
            config,
        } = self;

        let shared = Arc::new(Dispatcher {
            taxonomy: errors,
            observers: events.error.snapshot(),
            body_limit: config.body_limit,
        });
        let global_before = events.before.snapshot();
        let global_after = events.after.snapshot();
        let before_acc = events.before_acc.snapshot();
        let after_acc = events.after_acc.snapshot();

        let route_count = table.len();
        let mut router = Router::new();
        for route in table.into_routes() {
            let filter = MethodFilter::try_from(route.method.clone()).map_err(|_| {
                SetupError::InvalidMethod {
                    key: format!("{} {}", route.method, route.path),
                    method: route.method.to_string(),
                }
            })?;

            let chain: Vec<SharedHook> = global_before
                .iter()
                .cloned()
                .chain(route.chain.iter().cloned())
                .chain(global_after.iter().cloned())
                .collect();
            let pipeline = Arc::new(RoutePipeline {
                method: route.method,
                path: route.path.clone(),
                before_acc: before_acc.clone(),
                chain,
                after_acc: after_acc.clone(),
            });
            let shared = Arc::clone(&shared);
            let handler = move |Path(params): Path<HashMap<String, String>>, req: Request| {
                let pipeline = Arc::clone(&pipeline);
                let shared = Arc::clone(&shared);
                async move { dispatch(&pipeline, &shared, params, req).await }
            };
            router = router.route(&route.path, on(filter, handler));
        }

        for middleware in middleware {
            router = router.layer(from_fn(move |req: Request, next: Next| {
                let middleware = Arc::clone(&middleware);
                async move { middleware(req, next).await }
            }));
        }
        for callback in app_callbacks {
            router = callback(router);
        }
        let router = router.layer(TraceLayer::new_for_http());

        tracing::info!(routes = route_count, "application assembled");
        Ok(App {
            router,
            events,
            config,
        })
    }
}

impl App {
    /// Apply plugins, compile routes, and build the dispatcher.
    pub fn new(options: AppOptions) -> Result<Self, SetupError> {
        let AppOptions {
            routes,
            plugins,
            events,
            errors,
            config,
            registry,
        } = options;
        let mut setup = Setup {
            table: RouteTable::new(),
            middleware: Vec::new(),
            app_callbacks: Vec::new(),
            events,
            errors,
            config,
        };

        for reference in &plugins {
            setup.apply_plugin(reference, &registry, MAX_RESOLVE_DEPTH)?;
        }
        setup.events.emit_plugin_done();

        setup.table.install(&routes)?;
        setup.events.emit_routes_done();

        setup.into_app()
    }

    /// Construct and listen in one step.
    pub async fn start(options: AppOptions) -> Result<(), StartError> {
        App::new(options)?.listen(None).await
    }

    /// Bind and serve. `port` overrides the configured one.
    pub async fn listen(self, port: Option<u16>) -> Result<(), StartError> {
        let port = port.unwrap_or(self.config.port);
        let addr = format!("{}:{}", self.config.host, port);
        let listener = TcpListener::bind(&addr).await?;
        self.serve_on(listener).await
    }

    /// Serve on an already-bound listener.
    ///
    /// Fires the listen callbacks with the local address, then serves until
    /// a shutdown signal arrives.
    pub async fn serve_on(self, listener: TcpListener) -> Result<(), StartError> {
        let addr = listener.local_addr()?;
        self.events.emit_listen(addr);

        axum::serve(listener, self.router)
            .with_graceful_shutdown(shutdown_signal())
            .await?;

        tracing::info!("server stopped");
        Ok(())
    }

    /// The built dispatcher, for embedding or test harnesses.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// The registry as frozen at install time.
    pub fn events(&self) -> &Events {
        &self.events
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }
}

/// Wait for Ctrl+C.
async fn shutdown_signal() {
    tokio::signal::ctrl_c()
        .await
        .expect("ctrl-c handler installation failed");
    tracing::info!("shutdown signal received");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::context::Acc;
    use crate::pipeline::hook::{hook, proceed, reply, HookFuture};
    use crate::plugin::Plugin;
    use crate::routing::spec::RouteSpec;

    fn noop(_acc: &mut Acc) -> HookFuture<'_> {
        Box::pin(async move { proceed() })
    }

    fn done(_acc: &mut Acc) -> HookFuture<'_> {
        Box::pin(async move { reply(true) })
    }

    #[test]
    fn test_duplicate_between_plugin_and_root_is_fatal() {
        let plugin = Plugin::new()
            .routes(RouteGroup::new().route("get /x", RouteSpec::handler(done)));
        let options = AppOptions {
            routes: RouteGroup::new().route("get /x", RouteSpec::handler(done)),
            plugins: vec![PluginRef::literal(plugin)],
            ..Default::default()
        };
        assert!(matches!(
            App::new(options),
            Err(SetupError::DuplicateRoute { .. })
        ));
    }

    #[test]
    fn test_unknown_plugin_is_fatal() {
        let options = AppOptions {
            plugins: vec![PluginRef::named("nope")],
            ..Default::default()
        };
        match App::new(options) {
            Err(SetupError::UnknownPlugin { name }) => assert_eq!(name, "nope"),
            other => panic!("unexpected {:?}", other.err()),
        }
    }

    #[test]
    fn test_requires_cycle_is_fatal() {
        let mut registry = PluginRegistry::new();
        registry.register(
            "a",
            PluginRef::literal(Plugin::new().requires(PluginRef::named("a"))),
        );
        let options = AppOptions {
            plugins: vec![PluginRef::named("a")],
            registry,
            ..Default::default()
        };
        assert!(matches!(
            App::new(options),
            Err(SetupError::PluginDepth { .. })
        ));
    }

    #[test]
    fn test_on_host_callback_mutates_setup_state() {
        let plugin = Plugin::new().on_host(|config: &mut AppConfig, errors: &mut Taxonomy| {
            config.port = 9;
            errors.declare("plugin fault");
        });
        let options = AppOptions {
            plugins: vec![PluginRef::literal(plugin)],
            ..Default::default()
        };
        let app = App::new(options).unwrap();
        assert_eq!(app.config().port, 9);
    }

    #[test]
    fn test_later_plugin_hooks_land_in_front() {
        let h1 = hook(noop);
        let h2 = hook(noop);
        let options = AppOptions {
            plugins: vec![
                PluginRef::literal(Plugin::new().before(h1.clone())),
                PluginRef::literal(Plugin::new().before(h2.clone())),
            ],
            ..Default::default()
        };
        let app = App::new(options).unwrap();

        let before = app.events().before.snapshot();
        assert_eq!(before.len(), 2);
        assert!(Arc::ptr_eq(&before[0], &h2));
        assert!(Arc::ptr_eq(&before[1], &h1));
    }

    #[test]
    fn test_dependency_hooks_run_before_dependent() {
        let dep_hook = hook(noop);
        let own_hook = hook(noop);
        let mut registry = PluginRegistry::new();
        registry.register(
            "dep",
            PluginRef::literal(Plugin::new().before(dep_hook.clone())),
        );
        let dependent = Plugin::new()
            .before(own_hook.clone())
            .requires(PluginRef::named("dep"));
        let options = AppOptions {
            plugins: vec![PluginRef::literal(dependent)],
            registry,
            ..Default::default()
        };
        let app = App::new(options).unwrap();

        let before = app.events().before.snapshot();
        assert!(Arc::ptr_eq(&before[0], &dep_hook));
        assert!(Arc::ptr_eq(&before[1], &own_hook));
    }
}
