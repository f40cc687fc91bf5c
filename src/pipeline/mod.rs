//! The per-request hook pipeline: context, hook traits, and execution.

pub mod context;
pub mod executor;
pub mod hook;

pub use context::{Acc, BodyRejection};
pub use executor::{dispatch, Dispatcher, RoutePipeline};
pub use hook::{
    hook, proceed, raw_hook, reply, reply_raw, Flow, Hook, HookFuture, HookResult, RawHook, Reply,
    SharedHook, SharedRawHook,
};
