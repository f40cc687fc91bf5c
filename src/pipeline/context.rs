//! Per-request context threaded through the pipeline.
//!
//! # Responsibilities
//! - Carry the decoded request (parts, path parameters, body) through every
//!   pipeline step
//! - Merge path parameters and body fields into one lookup table
//! - Offer a typed side-channel for hooks to hand values to later steps
//! - Decode JSON request bodies before the pipeline starts
//!
//! # Design Decisions
//! - The typed side-channel delegates to the request extensions, so values
//!   attached by middleware before dispatch are visible to hooks through the
//!   same accessors
//! - Body decoding happens once, up front; a refused body never reaches any
//!   hook

use std::collections::HashMap;

use axum::body::Body;
use axum::http::header::{CONTENT_LENGTH, CONTENT_TYPE};
use axum::http::request::Parts;
use axum::http::{HeaderMap, Method, StatusCode};
use serde_json::{Map, Value};
use thiserror::Error;

/// Default upper bound on accepted request body size.
pub const DEFAULT_BODY_LIMIT: usize = 1024 * 1024;

/// The bare request pieces a pipeline runs against.
#[derive(Debug)]
pub struct RawRequest {
    /// Method, URI, headers and extensions of the inbound request.
    pub parts: Parts,
    /// Path parameters captured by the route pattern.
    pub params: HashMap<String, String>,
    /// Decoded request body. Empty when the request carried none.
    pub body: Map<String, Value>,
}

/// Where the request landed, resolved against the route table.
#[derive(Debug, Clone)]
pub struct Meta {
    /// Declared method of the matched route.
    pub method: Method,
    /// Pattern path of the matched route, not the concrete URI.
    pub path: String,
}

/// Per-request state handed to every context hook.
pub struct Acc {
    pub raw: RawRequest,
    pub meta: Meta,
    /// Path parameters merged with body fields. Body wins on collision.
    pub data: Map<String, Value>,
}

impl Acc {
    pub fn new(
        parts: Parts,
        params: HashMap<String, String>,
        body: Map<String, Value>,
        method: Method,
        path: String,
    ) -> Self {
        let mut data = Map::new();
        for (name, value) in &params {
            data.insert(name.clone(), Value::String(value.clone()));
        }
        for (name, value) in &body {
            data.insert(name.clone(), value.clone());
        }
        Acc {
            raw: RawRequest { parts, params, body },
            meta: Meta { method, path },
            data,
        }
    }

    /// Attach a typed value for later pipeline steps.
    pub fn insert<T: Clone + Send + Sync + 'static>(&mut self, value: T) {
        self.raw.parts.extensions.insert(value);
    }

    /// Fetch a value attached earlier in the pipeline, or by middleware
    /// before dispatch.
    pub fn get<T: Clone + Send + Sync + 'static>(&self) -> Option<&T> {
        self.raw.parts.extensions.get::<T>()
    }

    pub fn get_mut<T: Clone + Send + Sync + 'static>(&mut self) -> Option<&mut T> {
        self.raw.parts.extensions.get_mut::<T>()
    }

    pub fn remove<T: Clone + Send + Sync + 'static>(&mut self) -> Option<T> {
        self.raw.parts.extensions.remove::<T>()
    }

    /// Look up a captured path parameter.
    pub fn param(&self, name: &str) -> Option<&str> {
        self.raw.params.get(name).map(String::as_str)
    }

    /// Look up a merged data field.
    pub fn field(&self, name: &str) -> Option<&Value> {
        self.data.get(name)
    }

    /// Look up a merged data field expected to hold a string.
    pub fn str_field(&self, name: &str) -> Option<&str> {
        self.data.get(name).and_then(Value::as_str)
    }
}

/// Why a request body was refused before the pipeline ran.
#[derive(Debug, Error)]
pub enum BodyRejection {
    /// Declared or actual size exceeds the configured limit.
    #[error("request body exceeds {limit} bytes")]
    TooLarge { limit: usize },
    /// The body claimed to be JSON but did not decode to an object.
    #[error("request body is not a JSON object: {0}")]
    Malformed(String),
    /// The body could not be read off the wire.
    #[error("request body could not be read: {0}")]
    Unreadable(crate::errors::BoxError),
}

impl BodyRejection {
    pub fn status(&self) -> StatusCode {
        match self {
            BodyRejection::TooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            BodyRejection::Malformed(_) | BodyRejection::Unreadable(_) => {
                StatusCode::BAD_REQUEST
            }
        }
    }
}

fn is_json(headers: &HeaderMap) -> bool {
    headers
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .map(|value| {
            let mime = value.split(';').next().unwrap_or("").trim();
            mime.eq_ignore_ascii_case("application/json")
                || mime
                    .rsplit_once('+')
                    .is_some_and(|(_, suffix)| suffix.eq_ignore_ascii_case("json"))
        })
        .unwrap_or(false)
}

fn declared_length(headers: &HeaderMap) -> Option<u64> {
    headers
        .get(CONTENT_LENGTH)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.parse().ok())
}

/// Decode a JSON request body into the field table the pipeline merges from.
///
/// Bodies without a JSON content type are ignored. Oversized bodies are
/// refused by declared length when one is present, and by counted bytes
/// otherwise.
pub async fn decode_body(
    headers: &HeaderMap,
    body: Body,
    limit: usize,
) -> Result<Map<String, Value>, BodyRejection> {
    if !is_json(headers) {
        return Ok(Map::new());
    }
    if declared_length(headers).is_some_and(|len| len > limit as u64) {
        return Err(BodyRejection::TooLarge { limit });
    }
    let bytes = axum::body::to_bytes(body, limit).await.map_err(|err| {
        let err = err.into_inner();
        if err.downcast_ref::<http_body_util::LengthLimitError>().is_some() {
            BodyRejection::TooLarge { limit }
        } else {
            BodyRejection::Unreadable(err)
        }
    })?;
    if bytes.is_empty() {
        return Ok(Map::new());
    }
    match serde_json::from_slice::<Value>(&bytes) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(other) => Err(BodyRejection::Malformed(format!(
            "expected a top-level object, got {}",
            json_kind(&other)
        ))),
        Err(err) => Err(BodyRejection::Malformed(err.to_string())),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::{HeaderValue, Request};
    use serde_json::json;

    fn acc_with(params: &[(&str, &str)], body: Value) -> Acc {
        let (parts, _) = Request::builder()
            .method(Method::POST)
            .uri("/users/7")
            .body(())
            .unwrap()
            .into_parts();
        let params: HashMap<String, String> = params
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        let body = match body {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        Acc::new(parts, params, body, Method::POST, "/users/{id}".into())
    }

    fn json_headers() -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers
    }

    #[test]
    fn test_body_wins_over_params() {
        let acc = acc_with(&[("id", "7")], json!({"id": "override", "name": "ada"}));
        assert_eq!(acc.param("id"), Some("7"));
        assert_eq!(acc.str_field("id"), Some("override"));
        assert_eq!(acc.str_field("name"), Some("ada"));
        assert_eq!(acc.field("missing"), None);
    }

    #[test]
    fn test_typed_side_channel() {
        #[derive(Clone, Debug, PartialEq)]
        struct Tag(u32);

        let mut acc = acc_with(&[], json!({}));
        assert_eq!(acc.get::<Tag>(), None);
        acc.insert(Tag(9));
        assert_eq!(acc.get::<Tag>(), Some(&Tag(9)));
        acc.get_mut::<Tag>().unwrap().0 += 1;
        assert_eq!(acc.remove::<Tag>(), Some(Tag(10)));
        assert_eq!(acc.get::<Tag>(), None);
    }

    #[tokio::test]
    async fn test_decodes_json_object() {
        let body = Body::from(r#"{"a": 1, "b": "two"}"#);
        let map = decode_body(&json_headers(), body, DEFAULT_BODY_LIMIT)
            .await
            .unwrap();
        assert_eq!(map.get("a"), Some(&json!(1)));
        assert_eq!(map.get("b"), Some(&json!("two")));
    }

    #[tokio::test]
    async fn test_ignores_non_json_content() {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("text/plain"));
        let map = decode_body(&headers, Body::from("not json"), DEFAULT_BODY_LIMIT)
            .await
            .unwrap();
        assert!(map.is_empty());

        let map = decode_body(&HeaderMap::new(), Body::from("{}"), DEFAULT_BODY_LIMIT)
            .await
            .unwrap();
        assert!(map.is_empty());
    }

    #[tokio::test]
    async fn test_empty_json_body_is_empty_table() {
        let map = decode_body(&json_headers(), Body::empty(), DEFAULT_BODY_LIMIT)
            .await
            .unwrap();
        assert!(map.is_empty());
    }

    #[tokio::test]
    async fn test_malformed_json_is_refused() {
        let err = decode_body(&json_headers(), Body::from("{nope"), DEFAULT_BODY_LIMIT)
            .await
            .unwrap_err();
        assert!(matches!(err, BodyRejection::Malformed(_)));
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_non_object_json_is_refused() {
        let err = decode_body(&json_headers(), Body::from("[1, 2]"), DEFAULT_BODY_LIMIT)
            .await
            .unwrap_err();
        match err {
            BodyRejection::Malformed(msg) => assert!(msg.contains("an array")),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_declared_oversize_is_refused() {
        let mut headers = json_headers();
        headers.insert(CONTENT_LENGTH, HeaderValue::from_static("2000000"));
        let err = decode_body(&headers, Body::from("{}"), DEFAULT_BODY_LIMIT)
            .await
            .unwrap_err();
        assert!(matches!(err, BodyRejection::TooLarge { .. }));
        assert_eq!(err.status(), StatusCode::PAYLOAD_TOO_LARGE);
    }

    #[tokio::test]
    async fn test_counted_oversize_is_refused() {
        let body = Body::from(format!(r#"{{"blob": "{}"}}"#, "x".repeat(64)));
        let err = decode_body(&json_headers(), body, 32).await.unwrap_err();
        assert!(matches!(err, BodyRejection::TooLarge { limit: 32 }));
    }

    #[test]
    fn test_json_suffix_content_types_count() {
        let mut headers = HeaderMap::new();
        headers.insert(
            CONTENT_TYPE,
            HeaderValue::from_static("application/merge-patch+json; charset=utf-8"),
        );
        assert!(is_json(&headers));
    }
}
