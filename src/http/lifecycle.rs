//! Request lifecycle for one matched route.
//!
//! # Data Flow
//! ```text
//! axum request
//!     → onRequest → read body → preParsing → parse JSON → preValidation
//!     → schema validation → preHandler → handler
//!     → preSerialization (JSON replies) → serialize → onSend
//!     → axum response
//!     → onResponse (detached)
//!
//! errors at any request phase:
//!     → onError → error reply → send phase
//! ```
//!
//! # Design Decisions
//! - A hook that sets a reply skips the remaining request phases
//! - A failing hook's changes to the exchange are discarded
//! - onTimeout / onRequestAbort / onResponse errors are logged, never sent
//! - The whole request phase runs under the route's request timeout

use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::response::{IntoResponse, Response};
use serde_json::Value;

use crate::http::exchange::{Exchange, ReplyBody, RequestError};
use crate::http::handler::{Handler, Hook};
use crate::http::validation::validate_exchange;
use crate::observability::metrics;
use crate::routing::hooks::{HookName, HookSet};
use crate::routing::method::HttpMethod;
use crate::routing::schema::RouteSchema;
use crate::routing::table::RoutePrefix;

/// A route with its effective hooks, ready to serve.
#[derive(Debug, Clone)]
pub struct CompiledRoute {
    pub method: HttpMethod,
    pub prefix: RoutePrefix,
    pub handler: Handler,
    pub hooks: HookSet,
    pub schema: Option<RouteSchema>,
}

/// Per-request limits applied by the lifecycle.
#[derive(Debug, Clone, Copy)]
pub struct Limits {
    pub request_timeout: Duration,
    pub max_body_bytes: usize,
}

type PhaseResult = Result<Exchange, (Exchange, RequestError)>;

/// Serve one request on `route`.
pub async fn run(route: Arc<CompiledRoute>, limits: Limits, request: Request<Body>) -> Response {
    let start = Instant::now();
    let (parts, body) = request.into_parts();

    let mut exchange = Exchange::new(parts.method, parts.uri, route.prefix.to_string());
    exchange.request_id = parts
        .headers
        .get("x-request-id")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("unknown")
        .to_string();
    exchange.headers = parts.headers;
    exchange.params = route.prefix.extract_params(exchange.uri.path());

    let snapshot = exchange.clone();
    let mut abort = AbortGuard::new(route.clone(), snapshot.clone());

    let outcome = tokio::time::timeout(
        limits.request_timeout,
        process(&route, exchange, body, limits.max_body_bytes),
    )
    .await;
    abort.disarm();

    let exchange = match outcome {
        Ok(exchange) => exchange,
        Err(_) => {
            tracing::warn!(
                request_id = %snapshot.request_id,
                route = %route.prefix,
                timeout_ms = limits.request_timeout.as_millis() as u64,
                "Request timed out"
            );
            let mut exchange = run_detached(route.hooks.get(HookName::OnTimeout), snapshot).await;
            exchange.reply = Some(RequestError::new(StatusCode::REQUEST_TIMEOUT, "request timed out").to_reply());
            exchange
        }
    };

    let reply = exchange
        .reply
        .clone()
        .unwrap_or_else(|| RequestError::internal("no reply was produced").to_reply());
    let status = reply.status;
    let response = reply.into_response();

    metrics::record_request(route.method.as_str(), &route.prefix.to_string(), status.as_u16(), start);

    let on_response = route.hooks.get(HookName::OnResponse);
    if !on_response.is_empty() {
        let hooks = on_response.to_vec();
        tokio::spawn(async move {
            run_detached(&hooks, exchange).await;
        });
    }
    response
}

async fn process(route: &CompiledRoute, exchange: Exchange, body: Body, limit: usize) -> Exchange {
    let exchange = match request_phase(route, exchange, body, limit).await {
        Ok(exchange) => exchange,
        Err((exchange, error)) => error_phase(route, exchange, error).await,
    };
    send_phase(route, exchange).await
}

async fn request_phase(route: &CompiledRoute, exchange: Exchange, body: Body, limit: usize) -> PhaseResult {
    let mut exchange = run_hooks(route.hooks.get(HookName::OnRequest), exchange, true).await?;
    if exchange.reply.is_some() {
        return Ok(exchange);
    }

    exchange.raw_body = match axum::body::to_bytes(body, limit).await {
        Ok(bytes) => bytes,
        Err(e) => {
            let error = RequestError::bad_request(format!("failed to read request body: {}", e));
            return Err((exchange, error));
        }
    };

    let mut exchange = run_hooks(route.hooks.get(HookName::PreParsing), exchange, true).await?;
    if exchange.reply.is_some() {
        return Ok(exchange);
    }

    match parse_body(&exchange) {
        Ok(body) => exchange.body = body,
        Err(error) => return Err((exchange, error)),
    }

    let mut exchange = run_hooks(route.hooks.get(HookName::PreValidation), exchange, true).await?;
    if exchange.reply.is_some() {
        return Ok(exchange);
    }

    if let Some(schema) = &route.schema {
        if let Err(error) = validate_exchange(schema, &mut exchange) {
            return Err((exchange, error));
        }
    }

    let mut exchange = run_hooks(route.hooks.get(HookName::PreHandler), exchange, true).await?;
    if exchange.reply.is_some() {
        return Ok(exchange);
    }

    match route.handler.call(exchange.clone()).await {
        Ok(reply) => {
            exchange.reply = Some(reply);
            Ok(exchange)
        }
        Err(error) => Err((exchange, error)),
    }
}

async fn error_phase(route: &CompiledRoute, mut exchange: Exchange, error: RequestError) -> Exchange {
    if error.status.is_server_error() {
        tracing::error!(request_id = %exchange.request_id, route = %route.prefix, error = %error, "Request failed");
    } else {
        tracing::debug!(request_id = %exchange.request_id, route = %route.prefix, error = %error, "Request rejected");
    }

    exchange.reply = None;
    exchange.error = Some(error.clone());
    let mut exchange = run_detached(route.hooks.get(HookName::OnError), exchange).await;
    if exchange.reply.is_none() {
        exchange.reply = Some(error.to_reply());
    }
    exchange
}

async fn send_phase(route: &CompiledRoute, mut exchange: Exchange) -> Exchange {
    let is_json = matches!(
        exchange.reply.as_ref().map(|r| &r.body),
        Some(ReplyBody::Json(_))
    );
    if is_json {
        exchange = match run_hooks(route.hooks.get(HookName::PreSerialization), exchange, false).await {
            Ok(exchange) => exchange,
            Err((exchange, error)) => return failed_send(exchange, error),
        };
    }

    if let Some(reply) = exchange.reply.as_mut() {
        if let Err(error) = reply.serialize() {
            return failed_send(exchange, error);
        }
    }

    match run_hooks(route.hooks.get(HookName::OnSend), exchange, false).await {
        Ok(exchange) => exchange,
        Err((exchange, error)) => failed_send(exchange, error),
    }
}

fn failed_send(mut exchange: Exchange, error: RequestError) -> Exchange {
    tracing::error!(request_id = %exchange.request_id, error = %error, "Reply could not be sent");
    exchange.error = Some(error.clone());
    exchange.reply = Some(error.to_reply());
    exchange
}

/// Run hooks in order; stops at the first error, or at the first reply
/// when `stop_on_reply` is set.
async fn run_hooks(hooks: &[Hook], mut exchange: Exchange, stop_on_reply: bool) -> PhaseResult {
    for hook in hooks {
        let before = exchange.clone();
        match hook.call(exchange).await {
            Ok(next) => exchange = next,
            Err(error) => {
                tracing::debug!(hook = hook.name(), error = %error, "Hook failed");
                return Err((before, error));
            }
        }
        if stop_on_reply && exchange.reply.is_some() {
            break;
        }
    }
    Ok(exchange)
}

/// Run every hook; failures are logged and the previous exchange kept.
async fn run_detached(hooks: &[Hook], mut exchange: Exchange) -> Exchange {
    for hook in hooks {
        let before = exchange.clone();
        exchange = match hook.call(exchange).await {
            Ok(next) => next,
            Err(error) => {
                tracing::warn!(hook = hook.name(), error = %error, "Hook failed");
                before
            }
        };
    }
    exchange
}

fn parse_body(exchange: &Exchange) -> Result<Option<Value>, RequestError> {
    if exchange.raw_body.is_empty() {
        return Ok(None);
    }
    let content_type = exchange.header(header::CONTENT_TYPE.as_str()).unwrap_or("");
    let mime = content_type.split(';').next().unwrap_or("").trim();
    if mime == "application/json" || mime.ends_with("+json") {
        serde_json::from_slice(&exchange.raw_body)
            .map(Some)
            .map_err(|e| RequestError::bad_request(format!("body is not valid JSON: {}", e)))
    } else if mime.starts_with("text/") {
        Ok(Some(Value::String(String::from_utf8_lossy(&exchange.raw_body).into_owned())))
    } else {
        Ok(None)
    }
}

/// Runs onRequestAbort hooks if the request future is dropped before completion.
struct AbortGuard {
    pending: Option<(Arc<CompiledRoute>, Exchange)>,
}

impl AbortGuard {
    fn new(route: Arc<CompiledRoute>, exchange: Exchange) -> Self {
        Self {
            pending: Some((route, exchange)),
        }
    }

    fn disarm(&mut self) {
        self.pending = None;
    }
}

impl Drop for AbortGuard {
    fn drop(&mut self) {
        let Some((route, exchange)) = self.pending.take() else {
            return;
        };
        tracing::debug!(request_id = %exchange.request_id, route = %route.prefix, "Request aborted by client");
        let hooks = route.hooks.get(HookName::OnRequestAbort).to_vec();
        if hooks.is_empty() {
            return;
        }
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            handle.spawn(async move {
                run_detached(&hooks, exchange).await;
            });
        }
    }
}

/// Reply for a known path without a route for the request method.
pub fn method_not_allowed(allowed: &[HttpMethod]) -> Response {
    let names: Vec<&str> = allowed.iter().map(HttpMethod::as_str).collect();
    RequestError::new(StatusCode::METHOD_NOT_ALLOWED, "method not allowed")
        .to_reply()
        .header(header::ALLOW, &names.join(", "))
        .into_response()
}

/// Reply for a path no route matched.
pub fn not_found(method: &str, path: &str) -> Response {
    RequestError::new(StatusCode::NOT_FOUND, format!("Route {}:{} not found", method, path))
        .to_reply()
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::exchange::Reply;
    use axum::http::Method;
    use serde_json::json;
    use std::sync::Mutex;

    fn limits() -> Limits {
        Limits {
            request_timeout: Duration::from_secs(5),
            max_body_bytes: 1024,
        }
    }

    fn route(handler: Handler, hooks: HookSet, schema: Option<RouteSchema>) -> Arc<CompiledRoute> {
        Arc::new(CompiledRoute {
            method: HttpMethod::Post,
            prefix: RoutePrefix::parse("/items/:id"),
            handler,
            hooks,
            schema,
        })
    }

    fn echo() -> Handler {
        Handler::new("echo", |exchange| async move {
            Ok(Reply::json(
                StatusCode::OK,
                json!({"params": exchange.params, "body": exchange.body}),
            ))
        })
    }

    fn tracer(log: Arc<Mutex<Vec<String>>>, label: &'static str) -> Hook {
        Hook::new(label, move |exchange| {
            let log = log.clone();
            async move {
                log.lock().unwrap().push(label.to_string());
                Ok(exchange)
            }
        })
    }

    fn post(body: &'static str) -> Request<Body> {
        Request::builder()
            .method(Method::POST)
            .uri("/items/7")
            .header("content-type", "application/json")
            .body(Body::from(body))
            .unwrap()
    }

    async fn body_json(response: Response) -> Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_phases_run_in_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut hooks = HookSet::new();
        for (name, label) in [
            (HookName::OnSend, "onSend"),
            (HookName::PreHandler, "preHandler"),
            (HookName::OnRequest, "onRequest"),
            (HookName::PreSerialization, "preSerialization"),
            (HookName::PreValidation, "preValidation"),
            (HookName::PreParsing, "preParsing"),
        ] {
            hooks.push(name, tracer(log.clone(), label));
        }

        let response = run(route(echo(), hooks, None), limits(), post(r#"{"a":1}"#)).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await, json!({"params": {"id": "7"}, "body": {"a": 1}}));
        assert_eq!(
            *log.lock().unwrap(),
            vec!["onRequest", "preParsing", "preValidation", "preHandler", "preSerialization", "onSend"]
        );
    }

    #[tokio::test]
    async fn test_hook_reply_short_circuits() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut hooks = HookSet::new();
        hooks.push(
            HookName::OnRequest,
            Hook::new("deny", |mut exchange| async move {
                exchange.send(Reply::text(StatusCode::FORBIDDEN, "no"));
                Ok(exchange)
            }),
        );
        hooks.push(HookName::PreHandler, tracer(log.clone(), "preHandler"));
        hooks.push(HookName::OnSend, tracer(log.clone(), "onSend"));

        let response = run(route(echo(), hooks, None), limits(), post("{}")).await;
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert_eq!(*log.lock().unwrap(), vec!["onSend"]);
    }

    #[tokio::test]
    async fn test_validation_error_runs_on_error() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut hooks = HookSet::new();
        hooks.push(HookName::OnError, tracer(log.clone(), "onError"));
        let schema = RouteSchema::new().with(
            crate::routing::schema::SchemaTarget::Body,
            json!({"type": "object", "required": ["name"]}),
        );

        let response = run(route(echo(), hooks, Some(schema)), limits(), post("{}")).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            body_json(response).await,
            json!({"statusCode": 400, "error": "Bad Request", "message": "body must have required property 'name'"})
        );
        assert_eq!(*log.lock().unwrap(), vec!["onError"]);
    }

    #[tokio::test]
    async fn test_on_error_can_replace_reply() {
        let failing = Handler::new("fail", |_| async { Err(RequestError::internal("boom")) });
        let mut hooks = HookSet::new();
        hooks.push(
            HookName::OnError,
            Hook::new("mask", |mut exchange| async move {
                let status = exchange.error.as_ref().map(|e| e.status).unwrap_or(StatusCode::OK);
                exchange.send(Reply::json(status, json!({"masked": true})));
                Ok(exchange)
            }),
        );

        let response = run(route(failing, hooks, None), limits(), post("{}")).await;
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body_json(response).await, json!({"masked": true}));
    }

    #[tokio::test]
    async fn test_invalid_json_is_bad_request() {
        let response = run(route(echo(), HookSet::new(), None), limits(), post("{nope")).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_timeout_runs_on_timeout() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let slow = Handler::new("slow", |_| async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(Reply::empty(StatusCode::OK))
        });
        let mut hooks = HookSet::new();
        hooks.push(HookName::OnTimeout, tracer(log.clone(), "onTimeout"));
        let limits = Limits {
            request_timeout: Duration::from_millis(20),
            max_body_bytes: 1024,
        };

        let response = run(route(slow, hooks, None), limits, post("{}")).await;
        assert_eq!(response.status(), StatusCode::REQUEST_TIMEOUT);
        assert_eq!(*log.lock().unwrap(), vec!["onTimeout"]);
    }

    #[tokio::test]
    async fn test_dropped_request_runs_on_request_abort() {
        let (tx, rx) = tokio::sync::oneshot::channel::<()>();
        let tx = Arc::new(Mutex::new(Some(tx)));
        let slow = Handler::new("slow", |_| async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(Reply::empty(StatusCode::OK))
        });
        let mut hooks = HookSet::new();
        hooks.push(
            HookName::OnRequestAbort,
            Hook::new("notify", move |exchange| {
                let tx = tx.clone();
                async move {
                    if let Some(tx) = tx.lock().unwrap().take() {
                        let _ = tx.send(());
                    }
                    Ok(exchange)
                }
            }),
        );

        let request = run(route(slow, hooks, None), limits(), post("{}"));
        // Dropping the future mid-flight is what a client disconnect looks like.
        let _ = tokio::time::timeout(Duration::from_millis(20), request).await;
        tokio::time::timeout(Duration::from_secs(1), rx).await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_on_send_can_rewrite_payload() {
        let mut hooks = HookSet::new();
        hooks.push(
            HookName::OnSend,
            Hook::new("wrap", |mut exchange| async move {
                if let Some(reply) = exchange.reply.as_mut() {
                    reply.body = ReplyBody::Bytes("rewritten".into());
                }
                Ok(exchange)
            }),
        );
        let response = run(route(echo(), hooks, None), limits(), post("{}")).await;
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&bytes[..], b"rewritten");
    }
}
