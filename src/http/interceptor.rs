//! Barrier bookkeeping around request handlers.
//!
//! Every handler registered through the [`Router`](crate::routing::Router)
//! is wrapped once, at registration time, by [`HandlerInterceptor`]. Each
//! call then enters the [`RequestBarrier`] before the handler runs and exits
//! it when the response future finishes, fails, panics or is dropped.

use futures_util::future::BoxFuture;
use std::task::{Context, Poll};
use tower::{Layer, Service};

use crate::lifecycle::RequestBarrier;

/// Layer that tracks every call of the wrapped service in a barrier.
#[derive(Debug, Clone)]
pub struct HandlerInterceptor {
    barrier: RequestBarrier,
}

impl HandlerInterceptor {
    pub fn new(barrier: RequestBarrier) -> Self {
        Self { barrier }
    }

    /// Wrap `handler` so its invocations are counted.
    pub fn wrap<S>(&self, handler: S) -> Intercepted<S> {
        Intercepted {
            inner: handler,
            barrier: self.barrier.clone(),
        }
    }
}

impl<S> Layer<S> for HandlerInterceptor {
    type Service = Intercepted<S>;

    fn layer(&self, inner: S) -> Self::Service {
        self.wrap(inner)
    }
}

/// A handler wrapped by [`HandlerInterceptor`].
#[derive(Debug, Clone)]
pub struct Intercepted<S> {
    inner: S,
    barrier: RequestBarrier,
}

impl<S, Req> Service<Req> for Intercepted<S>
where
    S: Service<Req>,
    S::Future: Send + 'static,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = BoxFuture<'static, Result<S::Response, S::Error>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Req) -> Self::Future {
        let guard = self.barrier.track();
        let response = self.inner.call(req);
        Box::pin(async move {
            let _guard = guard;
            response.await
        })
    }
}
