//! Handler registration.
//!
//! # Responsibilities
//! - Store path patterns and their handlers
//! - Wrap every handler with the [`HandlerInterceptor`] at registration time
//! - Reject duplicate, conflicting and malformed patterns
//!
//! # Design Decisions
//! - Matching is axum's job; this type only guards registration
//! - Registration finishes before serving; the result is immutable
//! - Handlers added straight to the axum router bypass shutdown tracking

use axum::handler::Handler;
use axum::routing::{any, MethodRouter};
use std::any::Any;
use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use thiserror::Error;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::trace::TraceLayer;

use crate::http::interceptor::HandlerInterceptor;
use crate::lifecycle::RequestBarrier;

/// Error type for route registration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RouterError {
    #[error("pattern {0:?} is already registered")]
    DuplicatePattern(String),
    #[error("pattern {pattern:?} conflicts with {existing:?}")]
    ConflictingPattern { pattern: String, existing: String },
    #[error("pattern {pattern:?} is invalid: {reason}")]
    InvalidPattern {
        pattern: String,
        reason: &'static str,
    },
    #[error("pattern {pattern:?} was rejected by the router: {message}")]
    Rejected { pattern: String, message: String },
}

/// Registry of path patterns whose handlers are tracked by a barrier.
#[derive(Debug)]
pub struct Router {
    inner: axum::Router,
    interceptor: HandlerInterceptor,
    barrier: RequestBarrier,
    /// Pattern shape (capture names erased) to the pattern that claimed it.
    shapes: HashMap<String, String>,
}

impl Router {
    /// Create a router whose handlers report to `barrier`.
    pub fn new(barrier: RequestBarrier) -> Self {
        Self {
            inner: axum::Router::new(),
            interceptor: HandlerInterceptor::new(barrier.clone()),
            barrier,
            shapes: HashMap::new(),
        }
    }

    /// Register `handler` under `pattern`.
    ///
    /// `pattern` uses axum's syntax (`/users/{id}`, `/files/{*path}`).
    pub fn register(
        &mut self,
        pattern: &str,
        handler: MethodRouter,
    ) -> Result<&mut Self, RouterError> {
        validate_pattern(pattern)?;
        let shape = pattern_shape(pattern);
        if let Some(existing) = self.shapes.get(&shape) {
            if existing == pattern {
                return Err(RouterError::DuplicatePattern(pattern.to_string()));
            }
            return Err(RouterError::ConflictingPattern {
                pattern: pattern.to_string(),
                existing: existing.clone(),
            });
        }

        // axum panics on routes its matcher refuses; keep the registry
        // unchanged and report it instead.
        let handler = handler.layer(self.interceptor.clone());
        let candidate = self.inner.clone();
        let routed = panic::catch_unwind(AssertUnwindSafe(move || candidate.route(pattern, handler)));
        self.inner = routed.map_err(|payload| RouterError::Rejected {
            pattern: pattern.to_string(),
            message: panic_message(payload),
        })?;

        self.shapes.insert(shape, pattern.to_string());
        tracing::debug!(pattern, "Route registered");
        Ok(self)
    }

    /// Register a handler for every method under `pattern`.
    pub fn handle_func<H, T>(&mut self, pattern: &str, handler: H) -> Result<&mut Self, RouterError>
    where
        H: Handler<T, ()>,
        T: 'static,
    {
        self.register(pattern, any(handler))
    }

    pub fn barrier(&self) -> &RequestBarrier {
        &self.barrier
    }

    pub fn patterns(&self) -> impl Iterator<Item = &str> {
        self.shapes.values().map(String::as_str)
    }

    /// Finish registration and produce the service handed to connections.
    pub fn into_app(self) -> axum::Router {
        self.inner
            .layer(CatchPanicLayer::new())
            .layer(TraceLayer::new_for_http())
    }
}

impl Default for Router {
    fn default() -> Self {
        Self::new(RequestBarrier::new())
    }
}

fn validate_pattern(pattern: &str) -> Result<(), RouterError> {
    let invalid = |reason| {
        Err(RouterError::InvalidPattern {
            pattern: pattern.to_string(),
            reason,
        })
    };

    let Some(path) = pattern.strip_prefix('/') else {
        return invalid("must start with '/'");
    };

    let mut segments = path.split('/').peekable();
    while let Some(segment) = segments.next() {
        if segment.starts_with(':') || segment.starts_with('*') {
            return invalid("use {param} or {*rest} captures");
        }
        if !segment.contains(['{', '}']) {
            continue;
        }
        let Some(name) = segment.strip_prefix('{').and_then(|s| s.strip_suffix('}')) else {
            return invalid("a capture must span the whole segment");
        };
        let (name, catch_all) = match name.strip_prefix('*') {
            Some(rest) => (rest, true),
            None => (name, false),
        };
        if name.is_empty() {
            return invalid("capture name is empty");
        }
        if name.contains(['{', '}', '*']) {
            return invalid("capture name contains '{', '}' or '*'");
        }
        if catch_all && segments.peek().is_some() {
            return invalid("{*rest} must be the last segment");
        }
    }
    Ok(())
}

/// `pattern` with every capture name erased, so `/users/{id}` and
/// `/users/{name}` share a shape.
fn pattern_shape(pattern: &str) -> String {
    pattern
        .split('/')
        .map(|segment| match segment.strip_prefix('{') {
            Some(rest) if rest.starts_with('*') => "{*}",
            Some(_) => "{}",
            None => segment,
        })
        .collect::<Vec<_>>()
        .join("/")
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    match payload.downcast::<String>() {
        Ok(message) => *message,
        Err(payload) => payload
            .downcast_ref::<&str>()
            .map(|message| message.to_string())
            .unwrap_or_else(|| "unknown reason".to_string()),
    }
}
