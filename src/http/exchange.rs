//! Per-request state threaded through hooks and handlers.
//!
//! # Responsibilities
//! - Carry the parsed request (params, query, headers, body)
//! - Carry the pending reply and any error raised along the way
//! - Convert a finished reply into an axum response
//!
//! # Design Decisions
//! - Owned and `Clone`: hooks take the exchange by value and hand it back,
//!   which keeps boxed hook futures `'static`
//! - A hook that sets `reply` short-circuits the request phases

use axum::body::{Body, Bytes};
use axum::http::{header, HeaderMap, HeaderName, HeaderValue, Method, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use serde_json::{json, Map, Value};
use thiserror::Error;

/// Error raised by a hook, a handler, or the lifecycle itself.
///
/// Rendered to the client as `{ statusCode, error, message }`.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{status}: {message}")]
pub struct RequestError {
    pub status: StatusCode,
    pub message: String,
}

impl RequestError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message)
    }

    /// The JSON error reply sent when no onError hook replaced it.
    pub fn to_reply(&self) -> Reply {
        Reply::json(
            self.status,
            json!({
                "statusCode": self.status.as_u16(),
                "error": self.status.canonical_reason().unwrap_or("Unknown"),
                "message": self.message,
            }),
        )
    }
}

/// Body of a pending reply.
#[derive(Debug, Clone, PartialEq)]
pub enum ReplyBody {
    Empty,
    Json(Value),
    Text(String),
    Bytes(Bytes),
}

/// A response under construction.
#[derive(Debug, Clone)]
pub struct Reply {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: ReplyBody,
}

impl Reply {
    pub fn new(status: StatusCode, body: ReplyBody) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            body,
        }
    }

    pub fn json(status: StatusCode, value: Value) -> Self {
        Self::new(status, ReplyBody::Json(value))
    }

    pub fn text(status: StatusCode, text: impl Into<String>) -> Self {
        Self::new(status, ReplyBody::Text(text.into()))
    }

    pub fn empty(status: StatusCode) -> Self {
        Self::new(status, ReplyBody::Empty)
    }

    /// Add a header, ignoring values that are not valid header text.
    pub fn header(mut self, name: HeaderName, value: &str) -> Self {
        if let Ok(value) = HeaderValue::from_str(value) {
            self.headers.insert(name, value);
        }
        self
    }

    /// Serialize the body into bytes and set a content type if missing.
    ///
    /// After this call the body is always `Bytes` or `Empty`.
    pub fn serialize(&mut self) -> Result<(), RequestError> {
        let (bytes, content_type) = match std::mem::replace(&mut self.body, ReplyBody::Empty) {
            ReplyBody::Empty => return Ok(()),
            ReplyBody::Json(value) => {
                let bytes = serde_json::to_vec(&value)
                    .map_err(|e| RequestError::internal(format!("failed to serialize reply: {}", e)))?;
                (Bytes::from(bytes), "application/json; charset=utf-8")
            }
            ReplyBody::Text(text) => (Bytes::from(text), "text/plain; charset=utf-8"),
            ReplyBody::Bytes(bytes) => (bytes, "application/octet-stream"),
        };
        if !self.headers.contains_key(header::CONTENT_TYPE) {
            self.headers
                .insert(header::CONTENT_TYPE, HeaderValue::from_static(content_type));
        }
        self.body = ReplyBody::Bytes(bytes);
        Ok(())
    }
}

impl IntoResponse for Reply {
    fn into_response(mut self) -> Response {
        if let Err(e) = self.serialize() {
            return e.to_reply().into_response();
        }
        let body = match self.body {
            ReplyBody::Bytes(bytes) => Body::from(bytes),
            _ => Body::empty(),
        };
        let mut response = Response::new(body);
        *response.status_mut() = self.status;
        *response.headers_mut() = self.headers;
        response
    }
}

/// Request context passed to every hook and handler.
#[derive(Debug, Clone)]
pub struct Exchange {
    /// Value of the `x-request-id` header, or "unknown".
    pub request_id: String,
    pub method: Method,
    pub uri: Uri,
    /// Route pattern this request matched, e.g. `/users/:id`.
    pub route: String,
    pub headers: HeaderMap,
    pub params: Map<String, Value>,
    pub query: Map<String, Value>,
    /// Raw request body; preParsing hooks may rewrite it.
    pub raw_body: Bytes,
    /// Parsed body, available from preValidation on.
    pub body: Option<Value>,
    /// Free-form per-request state shared between hooks.
    pub extensions: axum::http::Extensions,
    pub reply: Option<Reply>,
    pub error: Option<RequestError>,
}

impl Exchange {
    pub fn new(method: Method, uri: Uri, route: impl Into<String>) -> Self {
        let query = uri.query().map(parse_query).unwrap_or_default();
        Self {
            request_id: "unknown".to_string(),
            method,
            uri,
            route: route.into(),
            headers: HeaderMap::new(),
            params: Map::new(),
            query,
            raw_body: Bytes::new(),
            body: None,
            extensions: axum::http::Extensions::new(),
            reply: None,
            error: None,
        }
    }

    /// Reply now; remaining request phases are skipped.
    pub fn send(&mut self, reply: Reply) {
        self.reply = Some(reply);
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Headers as a JSON object with lowercase names, for schema validation.
    pub fn headers_object(&self) -> Map<String, Value> {
        let mut object = Map::new();
        for (name, value) in &self.headers {
            if let Ok(text) = value.to_str() {
                object.insert(name.as_str().to_string(), Value::String(text.to_string()));
            }
        }
        object
    }
}

/// Parse a query string into a JSON object; repeated keys become arrays.
pub fn parse_query(query: &str) -> Map<String, Value> {
    let mut object = Map::new();
    for pair in query.split('&').filter(|p| !p.is_empty()) {
        let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
        let key = percent_decode(key);
        let value = Value::String(percent_decode(value));
        match object.get_mut(&key) {
            Some(Value::Array(items)) => items.push(value),
            Some(existing) => {
                let first = existing.take();
                *existing = Value::Array(vec![first, value]);
            }
            None => {
                object.insert(key, value);
            }
        }
    }
    object
}

/// Decode `%XX` escapes and `+` as space; invalid escapes are kept verbatim.
pub fn percent_decode(input: &str) -> String {
    let bytes = input.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'+' => out.push(b' '),
            b'%' if i + 2 < bytes.len() => {
                let hex = std::str::from_utf8(&bytes[i + 1..i + 3])
                    .ok()
                    .and_then(|h| u8::from_str_radix(h, 16).ok());
                match hex {
                    Some(b) => {
                        out.push(b);
                        i += 2;
                    }
                    None => out.push(b'%'),
                }
            }
            b => out.push(b),
        }
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}
