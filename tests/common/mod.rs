//! Shared utilities for integration testing.

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::http::request::Parts;
use serde_json::Value;
use tokio::net::TcpListener;

use bough::pipeline::context::Acc;
use bough::{
    hook, proceed, raw_hook, reply, App, AppOptions, ErrorEntry, Fault, Hook, HookResult, RawHook,
    SharedHook, SharedRawHook,
};

/// Build the app and serve it on an ephemeral port. Returns the base URL.
pub async fn spawn_app(options: AppOptions) -> String {
    let app = App::new(options).unwrap();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr: SocketAddr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        let _ = app.serve_on(listener).await;
    });

    format!("http://{}", addr)
}

/// Execution trace shared between recording hooks and assertions.
pub type Trace = Arc<Mutex<Vec<String>>>;

pub fn trace() -> Trace {
    Arc::new(Mutex::new(Vec::new()))
}

pub fn trace_entries(trace: &Trace) -> Vec<String> {
    trace.lock().unwrap().clone()
}

struct Recorder {
    label: &'static str,
    trace: Trace,
}

#[async_trait]
impl Hook for Recorder {
    async fn run(&self, _acc: &mut Acc) -> HookResult {
        self.trace.lock().unwrap().push(self.label.to_string());
        proceed()
    }
}

/// A pass-through hook recording its label into `trace`.
pub fn recording(label: &'static str, trace: &Trace) -> SharedHook {
    hook(Recorder {
        label,
        trace: Arc::clone(trace),
    })
}

struct RawRecorder {
    label: &'static str,
    trace: Trace,
}

#[async_trait]
impl RawHook for RawRecorder {
    async fn run(&self, _parts: &mut Parts) -> HookResult {
        self.trace.lock().unwrap().push(self.label.to_string());
        proceed()
    }
}

/// A pass-through raw hook recording its label into `trace`.
#[allow(dead_code)]
pub fn raw_recording(label: &'static str, trace: &Trace) -> SharedRawHook {
    raw_hook(RawRecorder {
        label,
        trace: Arc::clone(trace),
    })
}

struct Respond {
    value: Value,
}

#[async_trait]
impl Hook for Respond {
    async fn run(&self, _acc: &mut Acc) -> HookResult {
        reply(self.value.clone())
    }
}

/// A terminal hook completing the pipeline with a fixed value.
pub fn responding(value: Value) -> SharedHook {
    hook(Respond { value })
}

struct Failing {
    entries: Vec<ErrorEntry>,
}

#[async_trait]
impl Hook for Failing {
    async fn run(&self, _acc: &mut Acc) -> HookResult {
        Err(Fault::Validation(self.entries.clone()))
    }
}

/// A hook raising the given validation entries.
#[allow(dead_code)]
pub fn failing(entries: Vec<ErrorEntry>) -> SharedHook {
    hook(Failing { entries })
}

struct EchoData;

#[async_trait]
impl Hook for EchoData {
    async fn run(&self, acc: &mut Acc) -> HookResult {
        reply(acc.data.clone())
    }
}

/// A handler replying with the merged request data.
#[allow(dead_code)]
pub fn echoing() -> SharedHook {
    hook(EchoData)
}
