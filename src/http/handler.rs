//! Callable types registered by name and referenced from route files.

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use futures_util::future::BoxFuture;

use crate::http::exchange::{Exchange, Reply, RequestError};

pub type HookFuture = BoxFuture<'static, Result<Exchange, RequestError>>;
pub type HandlerFuture = BoxFuture<'static, Result<Reply, RequestError>>;

type HookFn = dyn Fn(Exchange) -> HookFuture + Send + Sync;
type HandlerFn = dyn Fn(Exchange) -> HandlerFuture + Send + Sync;

/// A lifecycle hook. Receives the exchange and returns it, possibly modified.
#[derive(Clone)]
pub struct Hook {
    name: Arc<str>,
    f: Arc<HookFn>,
}

impl Hook {
    pub fn new<F, Fut>(name: impl Into<Arc<str>>, f: F) -> Self
    where
        F: Fn(Exchange) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Exchange, RequestError>> + Send + 'static,
    {
        Self {
            name: name.into(),
            f: Arc::new(move |exchange: Exchange| -> HookFuture { Box::pin(f(exchange)) }),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn call(&self, exchange: Exchange) -> HookFuture {
        (self.f)(exchange)
    }
}

impl fmt::Debug for Hook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Hook").field(&self.name).finish()
    }
}

/// A request handler: the `default` export of a route file.
#[derive(Clone)]
pub struct Handler {
    name: Arc<str>,
    f: Arc<HandlerFn>,
}

impl Handler {
    pub fn new<F, Fut>(name: impl Into<Arc<str>>, f: F) -> Self
    where
        F: Fn(Exchange) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Reply, RequestError>> + Send + 'static,
    {
        Self {
            name: name.into(),
            f: Arc::new(move |exchange: Exchange| -> HandlerFuture { Box::pin(f(exchange)) }),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn call(&self, exchange: Exchange) -> HandlerFuture {
        (self.f)(exchange)
    }
}

impl fmt::Debug for Handler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Handler").field(&self.name).finish()
    }
}
