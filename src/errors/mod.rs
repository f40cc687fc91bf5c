//! Error types and the validation-error taxonomy.
//!
//! # Responsibilities
//! - Distinguish authoring errors (fatal at setup) from request-time faults
//! - Carry structured validation errors (`ErrorEntry`) through pipelines
//! - Keep client-visible detail limited to taxonomized validation failures
//!
//! # Design Decisions
//! - Setup errors abort `App::new`; they are never surfaced per-request
//! - Request-time faults are a single enum so every hook has one error path
//! - Unknown/unexpected failures stay opaque to clients (logged server-side)

pub mod affirm;
pub mod taxonomy;

use axum::http::Method;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

/// A boxed error type for opaque hook failures.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// One named, data-carrying validation error.
///
/// `msg` must be declared in the app's [`taxonomy::Taxonomy`] for the error
/// to reach clients; `data` carries structured context (field names, expected
/// types, ...).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorEntry {
    pub msg: String,
    #[serde(default)]
    pub data: Map<String, Value>,
}

impl ErrorEntry {
    /// Create an entry with no attached data.
    pub fn new(msg: impl Into<String>) -> Self {
        Self {
            msg: msg.into(),
            data: Map::new(),
        }
    }

    /// Attach a data field to the entry.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.data.insert(key.into(), value.into());
        self
    }
}

impl From<&str> for ErrorEntry {
    fn from(msg: &str) -> Self {
        Self::new(msg)
    }
}

impl From<String> for ErrorEntry {
    fn from(msg: String) -> Self {
        Self::new(msg)
    }
}

/// A request-time failure raised by a hook or handler.
#[derive(Debug, Error)]
pub enum Fault {
    /// One or more deliberate validation errors.
    #[error("validation failed ({} error(s))", .0.len())]
    Validation(Vec<ErrorEntry>),

    /// The pipeline ran to completion without any step producing a reply.
    #[error("pipeline completed without producing a reply")]
    NothingSent,

    /// Any other failure; opaque to clients.
    #[error(transparent)]
    Internal(BoxError),
}

impl Fault {
    /// Wrap an arbitrary error as an internal fault.
    pub fn internal(err: impl Into<BoxError>) -> Self {
        Fault::Internal(err.into())
    }
}

impl From<BoxError> for Fault {
    fn from(err: BoxError) -> Self {
        Fault::Internal(err)
    }
}

impl From<serde_json::Error> for Fault {
    fn from(err: serde_json::Error) -> Self {
        Fault::Internal(Box::new(err))
    }
}

/// An authoring error, fatal at route registration / plugin application.
///
/// These abort `App::new`; a misdeclared route tree or plugin set must never
/// degrade into per-request behavior.
#[derive(Debug, Error)]
pub enum SetupError {
    /// A route key was not `"path"` or `"METHOD path"`.
    #[error("invalid route key {key:?}: expected \"path\" or \"METHOD path\"")]
    InvalidRouteKey { key: String },

    /// The method token of a route key is not a routable HTTP method.
    #[error("invalid method {method:?} in route key {key:?}")]
    InvalidMethod { key: String, method: String },

    /// Two leaves compiled to the same method and path.
    #[error("duplicate route {method} {path}")]
    DuplicateRoute { method: Method, path: String },

    /// A named plugin reference was not present in the plugin registry.
    #[error("unknown plugin {name:?}: not present in the plugin registry")]
    UnknownPlugin { name: String },

    /// Plugin resolution or application recursed past the depth limit.
    #[error("plugin nesting exceeded depth {limit}; indirection or `requires` cycle?")]
    PluginDepth { limit: usize },
}

/// Errors from the one-shot construct-and-listen path.
#[derive(Debug, Error)]
pub enum StartError {
    /// The route tree or plugin set was rejected.
    #[error(transparent)]
    Setup(#[from] SetupError),

    /// Binding or serving failed.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_entry_builder() {
        let entry = ErrorEntry::new("field missing").with("field", "name");
        assert_eq!(entry.msg, "field missing");
        assert_eq!(entry.data.get("field"), Some(&Value::String("name".into())));
    }

    #[test]
    fn test_error_entry_roundtrip() {
        let entry = ErrorEntry::new("field bad type")
            .with("field", "password")
            .with("type", "string");
        let json = serde_json::to_string(&entry).unwrap();
        let back: ErrorEntry = serde_json::from_str(&json).unwrap();
        assert_eq!(back, entry);
    }

    #[test]
    fn test_entry_without_data_deserializes() {
        let back: ErrorEntry = serde_json::from_str(r#"{"msg":"name too short"}"#).unwrap();
        assert_eq!(back, ErrorEntry::new("name too short"));
    }

    #[test]
    fn test_fault_display() {
        let fault = Fault::Validation(vec![ErrorEntry::new("a"), ErrorEntry::new("b")]);
        assert_eq!(fault.to_string(), "validation failed (2 error(s))");
        assert_eq!(
            Fault::NothingSent.to_string(),
            "pipeline completed without producing a reply"
        );
    }

    #[test]
    fn test_setup_error_display() {
        let err = SetupError::DuplicateRoute {
            method: Method::POST,
            path: "/user/create".into(),
        };
        assert_eq!(err.to_string(), "duplicate route POST /user/create");
    }
}
