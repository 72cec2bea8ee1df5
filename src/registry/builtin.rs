//! Stock handlers and hooks available to every route tree served by the
//! bundled binary.

use std::time::Instant;

use axum::http::{header, StatusCode};
use serde_json::{json, Value};

use crate::http::exchange::{Reply, RequestError};
use crate::registry::Registry;

/// Start time stored by `timer.start`.
#[derive(Debug, Clone, Copy)]
pub struct RequestStart(pub Instant);

pub fn builtin() -> Registry {
    Registry::new()
        .handler("echo", |exchange| async move {
            Ok(Reply::json(
                StatusCode::OK,
                json!({
                    "method": exchange.method.as_str(),
                    "path": exchange.uri.path(),
                    "route": exchange.route,
                    "params": exchange.params,
                    "query": exchange.query,
                    "body": exchange.body.unwrap_or(Value::Null),
                }),
            ))
        })
        .handler("health", |_| async {
            Ok(Reply::json(StatusCode::OK, json!({ "status": "ok" })))
        })
        .handler("not_implemented", |exchange| async move {
            Err(RequestError::new(
                StatusCode::NOT_IMPLEMENTED,
                format!("{} {} is not implemented", exchange.method, exchange.route),
            ))
        })
        .hook("log_request", |exchange| async move {
            tracing::info!(
                request_id = %exchange.request_id,
                method = %exchange.method,
                path = %exchange.uri.path(),
                "Incoming request"
            );
            Ok(exchange)
        })
        .hook("require_json", |exchange| async move {
            if exchange.raw_body.is_empty() {
                return Ok(exchange);
            }
            let is_json = exchange
                .header(header::CONTENT_TYPE.as_str())
                .map(|ct| ct.starts_with("application/json"))
                .unwrap_or(false);
            if is_json {
                Ok(exchange)
            } else {
                Err(RequestError::new(
                    StatusCode::UNSUPPORTED_MEDIA_TYPE,
                    "expected an application/json body",
                ))
            }
        })
        .hook("no_store", |mut exchange| async move {
            if let Some(reply) = exchange.reply.take() {
                exchange.reply = Some(reply.header(header::CACHE_CONTROL, "no-store"));
            }
            Ok(exchange)
        })
        .hook("timer.start", |mut exchange| async move {
            exchange.extensions.insert(RequestStart(Instant::now()));
            Ok(exchange)
        })
        .hook("timer.log", |exchange| async move {
            if let Some(RequestStart(start)) = exchange.extensions.get::<RequestStart>() {
                tracing::info!(
                    request_id = %exchange.request_id,
                    route = %exchange.route,
                    elapsed_ms = start.elapsed().as_millis() as u64,
                    "Request finished"
                );
            }
            Ok(exchange)
        })
}
