//! HTTP server setup.
//!
//! # Responsibilities
//! - Compile a `RouteTable` into an Axum Router
//! - Dispatch any method, including WebDAV-style extensions, inside a path
//! - Wire up middleware (request ID, tracing, body limit)
//! - Swap the compiled routes atomically on hot reload
//! - Bind the server to a listener and drain on shutdown
//!
//! # Design Decisions
//! - One Axum route per path, with method dispatch done here so methods Axum
//!   has no `MethodFilter` for still work
//! - HEAD falls back to the GET route of the same path
//! - In-flight requests keep the Router they started with during a reload

use std::collections::BTreeMap;
use std::sync::Arc;

use arc_swap::ArcSwap;
use axum::{
    body::Body,
    http::{Method, Request},
    response::Response,
    routing::any,
    Router,
};
use tokio::net::TcpListener;
use tower::ServiceExt;
use tower_http::{limit::RequestBodyLimitLayer, trace::TraceLayer};

use crate::http::lifecycle::{self, CompiledRoute, Limits};
use crate::http::request::{propagate_request_id_layer, set_request_id_layer};
use crate::lifecycle::Shutdown;
use crate::routing::method::HttpMethod;
use crate::routing::table::RouteTable;

type PathRoutes = BTreeMap<HttpMethod, Arc<CompiledRoute>>;

/// Swaps the Router a running server dispatches to.
#[derive(Clone)]
pub struct ReloadHandle {
    current: Arc<ArcSwap<Router>>,
    limits: Limits,
}

impl ReloadHandle {
    /// Replace the served routes with `table`.
    pub fn replace(&self, table: &RouteTable) {
        self.current.store(Arc::new(compile(table, self.limits)));
        tracing::info!(routes = table.len(), "Routes replaced");
    }
}

/// HTTP server for a loaded route table.
pub struct HttpServer {
    current: Arc<ArcSwap<Router>>,
    limits: Limits,
}

impl HttpServer {
    pub fn new(table: &RouteTable, limits: Limits) -> Self {
        Self {
            current: Arc::new(ArcSwap::from_pointee(compile(table, limits))),
            limits,
        }
    }

    pub fn reload_handle(&self) -> ReloadHandle {
        ReloadHandle {
            current: self.current.clone(),
            limits: self.limits,
        }
    }

    /// The full service: middleware around the swappable route Router.
    pub fn router(&self) -> Router {
        let current = self.current.clone();
        Router::new()
            .fallback(move |request: Request<Body>| {
                let router = current.load_full();
                async move {
                    match (*router).clone().oneshot(request).await {
                        Ok(response) => response,
                        Err(never) => match never {},
                    }
                }
            })
            .layer(RequestBodyLimitLayer::new(self.limits.max_body_bytes))
            .layer(TraceLayer::new_for_http())
            .layer(propagate_request_id_layer())
            .layer(set_request_id_layer())
    }

    /// Run the server until `shutdown` fires, then drain in-flight requests.
    pub async fn run(self, listener: TcpListener, shutdown: &Shutdown) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        let mut signal = shutdown.subscribe();
        axum::serve(listener, self.router())
            .with_graceful_shutdown(async move {
                let _ = signal.recv().await;
                tracing::info!("Shutdown signal received");
            })
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

/// Build the per-path Router for `table`.
pub fn compile(table: &RouteTable, limits: Limits) -> Router {
    let mut paths: BTreeMap<String, PathRoutes> = BTreeMap::new();
    for route in table.routes() {
        let compiled = CompiledRoute {
            method: route.method,
            prefix: route.prefix.clone(),
            handler: route.handler.clone(),
            hooks: table.effective_hooks(route),
            schema: route.schema.clone(),
        };
        paths
            .entry(route.prefix.axum_path())
            .or_default()
            .insert(route.method, Arc::new(compiled));
    }

    let mut router = Router::new();
    for (path, routes) in paths {
        let routes = Arc::new(routes);
        router = router.route(
            &path,
            any(move |request: Request<Body>| dispatch(routes.clone(), limits, request)),
        );
    }
    router.fallback(|request: Request<Body>| async move {
        lifecycle::not_found(request.method().as_str(), request.uri().path())
    })
}

async fn dispatch(routes: Arc<PathRoutes>, limits: Limits, request: Request<Body>) -> Response {
    let route = request
        .method()
        .as_str()
        .parse::<HttpMethod>()
        .ok()
        .and_then(|method| routes.get(&method))
        .or_else(|| {
            (request.method() == Method::HEAD)
                .then(|| routes.get(&HttpMethod::Get))
                .flatten()
        });

    match route {
        Some(route) => lifecycle::run(route.clone(), limits, request).await,
        None => {
            let allowed: Vec<HttpMethod> = routes.keys().copied().collect();
            tracing::debug!(method = %request.method(), path = %request.uri().path(), "Method not allowed");
            lifecycle::method_not_allowed(&allowed)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::exchange::Reply;
    use crate::http::handler::Handler;
    use crate::routing::hooks::HookSet;
    use crate::routing::loader::RouteRegistrar;
    use crate::routing::table::{RouteDefinition, RoutePrefix};
    use axum::http::{header, StatusCode};
    use serde_json::json;
    use std::path::PathBuf;
    use std::time::Duration;

    fn limits() -> Limits {
        Limits {
            request_timeout: Duration::from_secs(5),
            max_body_bytes: 64,
        }
    }

    fn named(name: &'static str) -> Handler {
        Handler::new(name, move |exchange| async move {
            Ok(Reply::json(
                StatusCode::OK,
                json!({"handler": name, "params": exchange.params}),
            ))
        })
    }

    fn table(routes: &[(HttpMethod, &str, &'static str)]) -> RouteTable {
        let mut table = RouteTable::new();
        for (method, path, name) in routes {
            table
                .route(RouteDefinition {
                    method: *method,
                    prefix: RoutePrefix::parse(path),
                    handler: named(name),
                    hooks: HookSet::new(),
                    schema: None,
                    source: PathBuf::from("test"),
                })
                .unwrap();
        }
        table
    }

    fn request(method: &str, uri: &str) -> Request<Body> {
        Request::builder()
            .method(Method::from_bytes(method.as_bytes()).unwrap())
            .uri(uri)
            .body(Body::empty())
            .unwrap()
    }

    async fn json_body(response: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_dispatch_by_method_and_params() {
        let server = HttpServer::new(
            &table(&[
                (HttpMethod::Get, "/users", "list"),
                (HttpMethod::Post, "/users", "create"),
                (HttpMethod::Get, "/users/:id", "show"),
            ]),
            limits(),
        );
        let app = server.router();

        let response = app.clone().oneshot(request("POST", "/users")).await.unwrap();
        assert_eq!(json_body(response).await["handler"], "create");

        let response = app.oneshot(request("GET", "/users/42")).await.unwrap();
        assert_eq!(
            json_body(response).await,
            json!({"handler": "show", "params": {"id": "42"}})
        );
    }

    #[tokio::test]
    async fn test_extension_method_routes() {
        let server = HttpServer::new(&table(&[(HttpMethod::Propfind, "/dav", "propfind")]), limits());
        let response = server.router().oneshot(request("PROPFIND", "/dav")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_unknown_path_and_method() {
        let server = HttpServer::new(&table(&[(HttpMethod::Get, "/users", "list")]), limits());
        let app = server.router();

        let response = app.clone().oneshot(request("GET", "/nope")).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(json_body(response).await["message"], "Route GET:/nope not found");

        let response = app.oneshot(request("DELETE", "/users")).await.unwrap();
        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(response.headers()[header::ALLOW], "GET");
    }

    #[tokio::test]
    async fn test_head_falls_back_to_get() {
        let server = HttpServer::new(&table(&[(HttpMethod::Get, "/", "root")]), limits());
        let response = server.router().oneshot(request("HEAD", "/")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_request_id_is_set_and_echoed() {
        let server = HttpServer::new(&table(&[(HttpMethod::Get, "/", "root")]), limits());
        let response = server.router().oneshot(request("GET", "/")).await.unwrap();
        assert!(response.headers().contains_key("x-request-id"));
    }

    #[tokio::test]
    async fn test_oversized_body_rejected() {
        let server = HttpServer::new(&table(&[(HttpMethod::Post, "/", "root")]), limits());
        let request = Request::builder()
            .method(Method::POST)
            .uri("/")
            .header(header::CONTENT_LENGTH, "100")
            .body(Body::from(vec![b'a'; 100]))
            .unwrap();
        let response = server.router().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    }

    #[tokio::test]
    async fn test_reload_replaces_routes() {
        let server = HttpServer::new(&table(&[(HttpMethod::Get, "/old", "old")]), limits());
        let app = server.router();
        server
            .reload_handle()
            .replace(&table(&[(HttpMethod::Get, "/new", "new")]));

        let response = app.clone().oneshot(request("GET", "/old")).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let response = app.oneshot(request("GET", "/new")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
