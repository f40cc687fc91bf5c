//! Hook traits and the pipeline step result.
//!
//! # Responsibilities
//! - Define the two hook shapes: context hooks ([`Hook`]) and raw hooks
//!   ([`RawHook`]) that run against the bare request parts
//! - Define the step result: continue the pipeline, or complete it with a
//!   reply (the short-circuit signal)
//! - Accept both struct hooks and plain `fn` items
//!
//! # Design Decisions
//! - Short-circuiting is an explicit sum type, not control flow by panic or
//!   sentinel errors; the executor matches on it
//! - Hooks are trait objects behind `Arc` so many compiled routes can share
//!   one hook instance
//! - A blanket impl covers `fn(&mut Acc) -> HookFuture<'_>` items, which is
//!   the lightest way to write a hook; stateful hooks implement the trait on
//!   a struct

use std::sync::Arc;

use async_trait::async_trait;
use axum::http::request::Parts;
use futures_util::future::BoxFuture;
use serde::Serialize;

use crate::errors::Fault;
use crate::pipeline::context::Acc;

/// What a completed pipeline sends back.
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    /// Serialized as `{"success": true, "data": <value>}`.
    Data(serde_json::Value),
    /// Sent verbatim as markup, with no envelope.
    Raw(String),
}

/// Whether the pipeline advances past a step.
#[derive(Debug, Clone, PartialEq)]
pub enum Flow {
    /// Pass control to the next step.
    Continue,
    /// Stop here; no later step runs, and `Reply` is sent.
    Done(Reply),
}

/// Result of one pipeline step.
pub type HookResult = Result<Flow, Fault>;

/// The boxed future a function-shaped hook returns.
pub type HookFuture<'a> = BoxFuture<'a, HookResult>;

/// Advance to the next pipeline step.
pub fn proceed() -> HookResult {
    Ok(Flow::Continue)
}

/// Complete the pipeline with a serializable value.
pub fn reply<T: Serialize>(value: T) -> HookResult {
    let value = serde_json::to_value(value)?;
    Ok(Flow::Done(Reply::Data(value)))
}

/// Complete the pipeline with verbatim markup.
pub fn reply_raw(body: impl Into<String>) -> HookResult {
    Ok(Flow::Done(Reply::Raw(body.into())))
}

/// A pipeline step running against the per-request context.
///
/// Handlers and before/after hooks are all `Hook`s; a handler is simply the
/// step expected to produce `Flow::Done`.
#[async_trait]
pub trait Hook: Send + Sync {
    async fn run(&self, acc: &mut Acc) -> HookResult;
}

/// A pipeline step running against the bare request parts, outside the
/// per-request context. Used for the raw phases that bracket the pipeline.
#[async_trait]
pub trait RawHook: Send + Sync {
    async fn run(&self, parts: &mut Parts) -> HookResult;
}

/// A shareable context hook.
pub type SharedHook = Arc<dyn Hook>;

/// A shareable raw hook.
pub type SharedRawHook = Arc<dyn RawHook>;

#[async_trait]
impl<F> Hook for F
where
    F: for<'a> Fn(&'a mut Acc) -> HookFuture<'a> + Send + Sync,
{
    async fn run(&self, acc: &mut Acc) -> HookResult {
        self(acc).await
    }
}

#[async_trait]
impl<F> RawHook for F
where
    F: for<'a> Fn(&'a mut Parts) -> HookFuture<'a> + Send + Sync,
{
    async fn run(&self, parts: &mut Parts) -> HookResult {
        self(parts).await
    }
}

/// Wrap a hook for sharing across routes.
pub fn hook(h: impl Hook + 'static) -> SharedHook {
    Arc::new(h)
}

/// Wrap a raw hook for sharing across routes.
pub fn raw_hook(h: impl RawHook + 'static) -> SharedRawHook {
    Arc::new(h)
}
