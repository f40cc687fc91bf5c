//! Per-request pipeline execution.
//!
//! # Responsibilities
//! - Run one compiled route's hook chain strictly in sequence, honoring the
//!   short-circuit signal from any step
//! - Bracket the chain with the raw phases: `before_acc` against the bare
//!   request parts before the context exists, `after_acc` once the chain has
//!   finished without replying
//! - Turn replies into wire responses and faults into taxonomy-translated
//!   status/body pairs, notifying error observers first
//!
//! # Design Decisions
//! - A pipeline that completes without any step replying is an internal
//!   error, never a silent empty success
//! - Success replies ride the dispatcher's default status; only the error
//!   paths set a status explicitly

use std::collections::HashMap;

use axum::extract::Request;
use axum::http::Method;
use axum::response::{Html, IntoResponse, Json, Response};
use serde::Serialize;

use crate::errors::taxonomy::{translate, Taxonomy};
use crate::errors::Fault;
use crate::events::ErrorCallback;
use crate::pipeline::context::{decode_body, Acc, BodyRejection};
use crate::pipeline::hook::{Flow, Reply, SharedHook, SharedRawHook};

/// Request-time state shared by every route.
pub struct Dispatcher {
    pub taxonomy: Taxonomy,
    /// Error observers, snapshotted from the registry at install time.
    pub observers: Vec<ErrorCallback>,
    pub body_limit: usize,
}

/// One route's frozen pipeline, captured when the dispatcher was built.
pub struct RoutePipeline {
    pub method: Method,
    pub path: String,
    /// Raw hooks running before the context is assembled.
    pub before_acc: Vec<SharedRawHook>,
    /// Registry-wide before-hooks, the route's own chain, registry-wide
    /// after-hooks, in execution order.
    pub chain: Vec<SharedHook>,
    /// Raw hooks running once the chain finishes without a reply.
    pub after_acc: Vec<SharedRawHook>,
}

#[derive(Serialize)]
struct Envelope {
    success: bool,
    data: serde_json::Value,
}

/// Run one request through a route's pipeline and produce its response.
pub async fn dispatch(
    pipeline: &RoutePipeline,
    shared: &Dispatcher,
    params: HashMap<String, String>,
    req: Request,
) -> Response {
    let (mut parts, body) = req.into_parts();

    let body = match decode_body(&parts.headers, body, shared.body_limit).await {
        Ok(map) => map,
        Err(rejection) => return refuse_body(rejection),
    };

    for hook in &pipeline.before_acc {
        match hook.run(&mut parts).await {
            Ok(Flow::Continue) => {}
            Ok(Flow::Done(reply)) => return respond(reply),
            Err(fault) => return fail(shared, fault),
        }
    }

    let mut acc = Acc::new(
        parts,
        params,
        body,
        pipeline.method.clone(),
        pipeline.path.clone(),
    );

    for step in &pipeline.chain {
        match step.run(&mut acc).await {
            Ok(Flow::Continue) => {}
            Ok(Flow::Done(reply)) => return respond(reply),
            Err(fault) => return fail(shared, fault),
        }
    }

    for hook in &pipeline.after_acc {
        match hook.run(&mut acc.raw.parts).await {
            Ok(Flow::Continue) => {}
            Ok(Flow::Done(reply)) => return respond(reply),
            Err(fault) => return fail(shared, fault),
        }
    }

    fail(shared, Fault::NothingSent)
}

fn respond(reply: Reply) -> Response {
    match reply {
        Reply::Data(data) => Json(Envelope {
            success: true,
            data,
        })
        .into_response(),
        Reply::Raw(markup) => Html(markup).into_response(),
    }
}

fn fail(shared: &Dispatcher, fault: Fault) -> Response {
    for observer in &shared.observers {
        observer(&fault);
    }
    let (status, body) = translate(&shared.taxonomy, &fault);
    (status, body).into_response()
}

fn refuse_body(rejection: BodyRejection) -> Response {
    tracing::debug!(error = %rejection, "request body refused");
    (rejection.status(), rejection.to_string()).into_response()
}
