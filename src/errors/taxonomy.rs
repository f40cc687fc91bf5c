//! The declared set of recognized validation messages, and fault translation.
//!
//! # Responsibilities
//! - Hold the fixed set of validation messages an app declares at construction
//! - Map any request-time fault to an HTTP status and body
//! - Fail closed: a single undeclared message degrades the whole response
//!
//! # Design Decisions
//! - Declared validation errors answer 400 with the full structured list
//! - Everything else answers 500 with a fixed generic message; detail goes to
//!   the server log only

use std::collections::HashSet;

use axum::http::StatusCode;

use crate::errors::Fault;

/// Body sent for any failure that is not a fully taxonomized validation list.
pub const GENERIC_ERROR_BODY: &str = "internal server error";

/// The declared set of recognized validation message strings.
///
/// Built once at construction; any [`Fault::Validation`] entry whose `msg` is
/// not in this set is treated as an internal failure rather than a client
/// error.
#[derive(Debug, Clone, Default)]
pub struct Taxonomy {
    messages: HashSet<String>,
}

impl Taxonomy {
    /// An empty taxonomy; every validation failure degrades to 500.
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare one recognized message.
    pub fn declare(&mut self, msg: impl Into<String>) {
        self.messages.insert(msg.into());
    }

    /// Whether `msg` is a declared validation message.
    pub fn contains(&self, msg: &str) -> bool {
        self.messages.contains(msg)
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

impl<S: Into<String>> FromIterator<S> for Taxonomy {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self {
            messages: iter.into_iter().map(Into::into).collect(),
        }
    }
}

/// Translate a request-time fault into an HTTP status and body.
///
/// Validation lists whose every message is declared answer 400 with the
/// serialized list; anything else answers 500 with [`GENERIC_ERROR_BODY`]
/// and full detail goes to the server log only.
pub fn translate(taxonomy: &Taxonomy, fault: &Fault) -> (StatusCode, String) {
    match fault {
        Fault::Validation(entries) => {
            for entry in entries {
                if !taxonomy.contains(&entry.msg) {
                    tracing::error!(
                        msg = %entry.msg,
                        data = %serde_json::Value::Object(entry.data.clone()),
                        "validation error not declared in taxonomy"
                    );
                    return (StatusCode::INTERNAL_SERVER_ERROR, GENERIC_ERROR_BODY.into());
                }
            }
            match serde_json::to_string(entries) {
                Ok(body) => (StatusCode::BAD_REQUEST, body),
                Err(err) => {
                    tracing::error!(error = %err, "failed to serialize validation errors");
                    (StatusCode::INTERNAL_SERVER_ERROR, GENERIC_ERROR_BODY.into())
                }
            }
        }
        Fault::NothingSent => {
            tracing::error!("pipeline completed without producing a reply");
            (StatusCode::INTERNAL_SERVER_ERROR, GENERIC_ERROR_BODY.into())
        }
        Fault::Internal(err) => {
            tracing::error!(error = %err, "unexpected failure in pipeline");
            (StatusCode::INTERNAL_SERVER_ERROR, GENERIC_ERROR_BODY.into())
        }
    }
}
