//! Declarative Routing and Pipeline Composition Library

pub mod app;
pub mod errors;
pub mod events;
pub mod pipeline;
pub mod plugin;
pub mod routing;

pub use app::{App, AppConfig, AppOptions};
pub use errors::affirm::{affirm, fail};
pub use errors::taxonomy::Taxonomy;
pub use errors::{ErrorEntry, Fault, SetupError, StartError};
pub use events::Events;
pub use pipeline::hook::{
    hook, proceed, raw_hook, reply, reply_raw, Flow, Hook, HookFuture, HookResult, RawHook, Reply,
    SharedHook, SharedRawHook,
};
pub use plugin::{Plugin, PluginRef, PluginRegistry};
pub use routing::{RouteGroup, RouteSpec};
