//! Declarative route tree nodes.
//!
//! # Responsibilities
//! - Model the three node shapes: a bare handler, a handler with local
//!   hooks, and a nested group
//! - Keep children in insertion order under their route keys
//! - Promote a bare handler to the hooked shape when local hooks are added
//!
//! # Design Decisions
//! - The shapes are an explicit tagged union built by constructors, so a
//!   malformed node is unrepresentable rather than detected during traversal
//! - Hooks are held behind `Arc` and cloned by reference into every compiled
//!   route that uses them

use crate::pipeline::hook::{Hook, SharedHook};
use crate::plugin::PluginRef;

/// One node of the declarative route tree.
#[derive(Clone)]
pub enum RouteSpec {
    /// A bare handler.
    Handler(SharedHook),
    /// A handler with hooks of its own.
    Extended {
        handler: SharedHook,
        before: Vec<SharedHook>,
        after: Vec<SharedHook>,
        plugins: Vec<PluginRef>,
    },
    /// A nested subtree.
    Group(RouteGroup),
}

impl RouteSpec {
    pub fn handler(h: impl Hook + 'static) -> Self {
        RouteSpec::Handler(std::sync::Arc::new(h))
    }

    /// Add a local before-hook, promoting a bare handler if needed.
    pub fn before(self, hook: SharedHook) -> Self {
        match self {
            RouteSpec::Handler(handler) => RouteSpec::Extended {
                handler,
                before: vec![hook],
                after: Vec::new(),
                plugins: Vec::new(),
            },
            RouteSpec::Extended {
                handler,
                mut before,
                after,
                plugins,
            } => {
                before.push(hook);
                RouteSpec::Extended {
                    handler,
                    before,
                    after,
                    plugins,
                }
            }
            RouteSpec::Group(mut group) => {
                group.before.push(hook);
                RouteSpec::Group(group)
            }
        }
    }

    /// Add a local after-hook, promoting a bare handler if needed.
    pub fn after(self, hook: SharedHook) -> Self {
        match self {
            RouteSpec::Handler(handler) => RouteSpec::Extended {
                handler,
                before: Vec::new(),
                after: vec![hook],
                plugins: Vec::new(),
            },
            RouteSpec::Extended {
                handler,
                before,
                mut after,
                plugins,
            } => {
                after.push(hook);
                RouteSpec::Extended {
                    handler,
                    before,
                    after,
                    plugins,
                }
            }
            RouteSpec::Group(mut group) => {
                group.after.push(hook);
                RouteSpec::Group(group)
            }
        }
    }

    /// Attach a plugin reference to this node.
    pub fn plugin(self, reference: PluginRef) -> Self {
        match self {
            RouteSpec::Handler(handler) => RouteSpec::Extended {
                handler,
                before: Vec::new(),
                after: Vec::new(),
                plugins: vec![reference],
            },
            RouteSpec::Extended {
                handler,
                before,
                after,
                mut plugins,
            } => {
                plugins.push(reference);
                RouteSpec::Extended {
                    handler,
                    before,
                    after,
                    plugins,
                }
            }
            RouteSpec::Group(mut group) => {
                group.plugins.push(reference);
                RouteSpec::Group(group)
            }
        }
    }
}

impl From<RouteGroup> for RouteSpec {
    fn from(group: RouteGroup) -> Self {
        RouteSpec::Group(group)
    }
}

impl From<SharedHook> for RouteSpec {
    fn from(handler: SharedHook) -> Self {
        RouteSpec::Handler(handler)
    }
}

/// A subtree of routes sharing hooks and an inherited method.
#[derive(Clone, Default)]
pub struct RouteGroup {
    pub before: Vec<SharedHook>,
    pub after: Vec<SharedHook>,
    pub plugins: Vec<PluginRef>,
    /// Children under their route keys, in insertion order.
    pub children: Vec<(String, RouteSpec)>,
}

impl RouteGroup {
    pub fn new() -> Self {
        RouteGroup::default()
    }

    /// Add a child under a route key.
    pub fn route(mut self, key: impl Into<String>, node: impl Into<RouteSpec>) -> Self {
        self.children.push((key.into(), node.into()));
        self
    }

    /// Add a before-hook shared by every route in this subtree.
    pub fn before(mut self, hook: SharedHook) -> Self {
        self.before.push(hook);
        self
    }

    /// Add an after-hook shared by every route in this subtree.
    pub fn after(mut self, hook: SharedHook) -> Self {
        self.after.push(hook);
        self
    }

    /// Attach a plugin reference to this subtree.
    pub fn plugin(mut self, reference: PluginRef) -> Self {
        self.plugins.push(reference);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::context::Acc;
    use crate::pipeline::hook::{hook, proceed, reply, HookFuture};

    fn noop(_acc: &mut Acc) -> HookFuture<'_> {
        Box::pin(async move { proceed() })
    }

    fn done(_acc: &mut Acc) -> HookFuture<'_> {
        Box::pin(async move { reply(true) })
    }

    #[test]
    fn test_handler_promotes_to_extended() {
        let node = RouteSpec::handler(done).before(hook(noop)).after(hook(noop));
        match node {
            RouteSpec::Extended { before, after, .. } => {
                assert_eq!(before.len(), 1);
                assert_eq!(after.len(), 1);
            }
            _ => panic!("expected promotion to the hooked shape"),
        }
    }

    #[test]
    fn test_group_keeps_insertion_order() {
        let group = RouteGroup::new()
            .route("get /b", RouteSpec::handler(done))
            .route("get /a", RouteSpec::handler(done))
            .before(hook(noop));
        let keys: Vec<&str> = group.children.iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(keys, vec!["get /b", "get /a"]);
        assert_eq!(group.before.len(), 1);
        assert!(!group.is_empty());
    }

    #[test]
    fn test_hooks_on_group_nodes_attach_to_the_group() {
        let node = RouteSpec::from(RouteGroup::new()).before(hook(noop));
        match node {
            RouteSpec::Group(group) => assert_eq!(group.before.len(), 1),
            _ => panic!("group shape must be preserved"),
        }
    }
}
