//! Lifecycle and cross-cutting hook registry.
//!
//! # Responsibilities
//! - Hold the hook lists that apply to every route: the context hooks that
//!   bracket each pipeline and the raw hooks that bracket context assembly
//! - Hold the setup-progress callbacks (`plugin_done`, `routes_done`), the
//!   listen callbacks fired when the socket binds, and the error observers
//!   consulted before a fault is translated
//! - Give plugins front-insertion that preserves the order of the inserted
//!   slice
//!
//! # Design Decisions
//! - Later installations land in front, so a plugin installed after another
//!   runs its hooks first; within one installation the declared order is kept
//! - Lifecycle callbacks are synchronous; anything slow belongs in a hook,
//!   not a lifecycle observer
//! - The listen list starts with a logging callback so a bare registry still
//!   reports its bound address

use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::Arc;

use crate::errors::Fault;
use crate::pipeline::hook::{SharedHook, SharedRawHook};

/// Fired at a setup milestone, after plugins apply or after routes compile.
pub type SetupCallback = Arc<dyn Fn() + Send + Sync>;
/// Fired once the listener is bound, with the local address.
pub type ListenCallback = Arc<dyn Fn(SocketAddr) + Send + Sync>;
/// Observes every pipeline fault before it is translated into a response.
pub type ErrorCallback = Arc<dyn Fn(&Fault) + Send + Sync>;

/// An ordered hook list with front insertion.
#[derive(Clone)]
pub struct HookList<T> {
    items: VecDeque<T>,
}

impl<T> HookList<T> {
    pub fn new() -> Self {
        HookList {
            items: VecDeque::new(),
        }
    }

    /// Append at the back.
    pub fn push(&mut self, item: T) {
        self.items.push_back(item);
    }

    /// Insert at the front, keeping the order of `items` intact.
    ///
    /// Prepending `[a, b]` onto `[x]` yields `[a, b, x]`.
    pub fn prepend<I>(&mut self, items: I)
    where
        I: IntoIterator<Item = T>,
        I::IntoIter: DoubleEndedIterator,
    {
        for item in items.into_iter().rev() {
            self.items.push_front(item);
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.items.iter()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Clone the current contents into an owned sequence.
    pub fn snapshot(&self) -> Vec<T>
    where
        T: Clone,
    {
        self.items.iter().cloned().collect()
    }
}

impl<T> Default for HookList<T> {
    fn default() -> Self {
        HookList::new()
    }
}

impl<T> FromIterator<T> for HookList<T> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        HookList {
            items: iter.into_iter().collect(),
        }
    }
}

impl<'a, T> IntoIterator for &'a HookList<T> {
    type Item = &'a T;
    type IntoIter = std::collections::vec_deque::Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}

/// The eight-phase registry consulted outside any single route's own chain.
///
/// Mutable while plugins apply; read-only once serving starts.
#[derive(Clone)]
pub struct Events {
    /// Raw hooks running before the request context is assembled.
    pub before_acc: HookList<SharedRawHook>,
    /// Context hooks running before every route's own chain.
    pub before: HookList<SharedHook>,
    /// Context hooks running after every route's own chain.
    pub after: HookList<SharedHook>,
    /// Raw hooks running after the pipeline completes.
    pub after_acc: HookList<SharedRawHook>,
    /// Fired once plugin application finishes.
    pub plugin_done: HookList<SetupCallback>,
    /// Fired once route compilation finishes.
    pub routes_done: HookList<SetupCallback>,
    /// Fired when the listener binds.
    pub listen: HookList<ListenCallback>,
    /// Error observers, invoked before any fault is translated.
    pub error: HookList<ErrorCallback>,
}

fn log_listen(addr: SocketAddr) {
    tracing::info!(address = %addr, "listening");
}

impl Default for Events {
    fn default() -> Self {
        let default_listen: ListenCallback = Arc::new(log_listen);
        Events {
            before_acc: HookList::new(),
            before: HookList::new(),
            after: HookList::new(),
            after_acc: HookList::new(),
            plugin_done: HookList::new(),
            routes_done: HookList::new(),
            listen: HookList::from_iter([default_listen]),
            error: HookList::new(),
        }
    }
}

impl Events {
    pub fn new() -> Self {
        Events::default()
    }

    pub fn emit_plugin_done(&self) {
        for callback in &self.plugin_done {
            callback();
        }
    }

    pub fn emit_routes_done(&self) {
        for callback in &self.routes_done {
            callback();
        }
    }

    pub fn emit_listen(&self, addr: SocketAddr) {
        for callback in &self.listen {
            callback(addr);
        }
    }

    pub fn emit_error(&self, fault: &Fault) {
        for callback in &self.error {
            callback(fault);
        }
    }
}
