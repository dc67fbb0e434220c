//! HTTP server with graceful shutdown.
//!
//! # Responsibilities
//! - Own the listener and run the accept loop
//! - Hand each connection to hyper with the registered routes
//! - On the shutdown trigger: close the listener, drain in-flight requests,
//!   give up after the configured timeout
//! - Publish lifecycle state for observers
//!
//! # Design Decisions
//! - The listener closes exactly once, through its one-shot closer
//! - "Listener closed" ends the accept loop cleanly; any other fatal accept
//!   error is returned at once and the drain never starts
//! - Graceful and forced exits both return `Ok(())`; the difference is logged
//!   and visible through [`GracefulServer::subscribe`]

use std::future::Future;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::watch;

use crate::config::ServerConfig;
use crate::lifecycle::shutdown::StateMachine;
use crate::lifecycle::{signals, RequestBarrier, ServerState, ShutdownSession};
use crate::net::{is_transient, serve_connection, Acceptor, Listener, ListenerError};
use crate::resilience::AcceptBackoff;
use crate::routing::Router;

/// Fatal server errors.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Binding failed, or the accept loop hit a non-transient error.
    #[error(transparent)]
    Listener(#[from] ListenerError),
    /// Shutdown signal handlers could not be installed.
    #[error("Failed to install signal handlers: {0}")]
    Signal(#[source] std::io::Error),
}

/// HTTP server that drains in-flight requests before returning.
pub struct GracefulServer {
    config: ServerConfig,
    router: Router,
    state: StateMachine,
}

impl GracefulServer {
    /// Create a server for the routes registered on `router`.
    pub fn new(config: ServerConfig, router: Router) -> Self {
        Self {
            config,
            router,
            state: StateMachine::new(),
        }
    }

    /// The barrier every registered handler reports to.
    pub fn barrier(&self) -> &RequestBarrier {
        self.router.barrier()
    }

    /// Watch lifecycle transitions.
    pub fn subscribe(&self) -> watch::Receiver<ServerState> {
        self.state.subscribe()
    }

    /// Effective drain timeout.
    pub fn shutdown_timeout(&self) -> Duration {
        self.config.shutdown.timeout()
    }

    /// Get a reference to the config.
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Bind the configured address and serve until a termination signal.
    pub async fn listen_and_serve(self) -> Result<(), ServerError> {
        let listener = Listener::bind(&self.config.listener).await?;
        self.serve(listener).await
    }

    /// Serve on `listener` until a configured termination signal arrives.
    pub async fn serve<L: Acceptor>(self, listener: L) -> Result<(), ServerError> {
        let signals = signals::listen(&self.config.shutdown.signals).map_err(ServerError::Signal)?;
        self.serve_with_shutdown(listener, async move {
            signals.recv().await;
        })
        .await
    }

    /// Serve on `listener` until `shutdown` completes, then drain.
    pub async fn serve_with_shutdown<L, F>(self, mut listener: L, shutdown: F) -> Result<(), ServerError>
    where
        L: Acceptor,
        F: Future<Output = ()> + Send + 'static,
    {
        let Self {
            config,
            router,
            state,
        } = self;
        let barrier = router.barrier().clone();
        let timeout = config.shutdown.timeout();
        let app = router.into_app();

        let closer = listener.closer();
        let monitor = tokio::spawn(async move {
            shutdown.await;
            tracing::info!("Shutdown triggered, closing listener");
            closer.close();
        });

        tracing::info!(
            address = %listener.local_addr(),
            shutdown_timeout_secs = timeout.as_secs(),
            "HTTP server starting"
        );

        if let Err(e) = accept_loop(&mut listener, app, state.subscribe()).await {
            monitor.abort();
            tracing::error!(error = %e, "Accept loop failed, graceful shutdown skipped");
            return Err(e.into());
        }
        drop(listener);

        state.transition(ServerState::Draining);
        tracing::info!(in_flight = barrier.peek(), "Stopped accepting, draining requests");

        let outcome = ShutdownSession::new(timeout).drain(&barrier).await;
        state.transition(outcome.into());

        tracing::info!("Exited");
        Ok(())
    }
}

/// Accept until the listener is closed. Transient errors are retried with
/// backoff; anything else is returned.
async fn accept_loop<L: Acceptor>(
    listener: &mut L,
    app: axum::Router,
    state: watch::Receiver<ServerState>,
) -> Result<(), ListenerError> {
    let mut backoff = AcceptBackoff::new();
    loop {
        match listener.accept().await {
            Ok((stream, peer_addr, permit)) => {
                backoff.reset();
                tokio::spawn(serve_connection(
                    stream,
                    peer_addr,
                    permit,
                    app.clone(),
                    state.clone(),
                ));
            }
            Err(ListenerError::Closed) => return Ok(()),
            Err(ListenerError::Accept(e)) if is_transient(&e) => {
                let delay = backoff.next_delay();
                tracing::warn!(
                    error = %e,
                    retry_in_ms = delay.as_millis() as u64,
                    failures = backoff.failures(),
                    "Transient accept error"
                );
                tokio::time::sleep(delay).await;
            }
            Err(e) => return Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ListenerConfig;
    use crate::net::{Accepted, ListenerCloser};
    use std::collections::VecDeque;
    use std::io;
    use std::net::SocketAddr;
    use tokio::sync::oneshot;

    /// Real listener that fails the first accepts with queued errors.
    struct FlakyListener {
        inner: Listener,
        failures: VecDeque<io::ErrorKind>,
    }

    impl FlakyListener {
        async fn bind(failures: impl IntoIterator<Item = io::ErrorKind>) -> Self {
            Self {
                inner: Listener::bind(&local_config(3).listener).await.unwrap(),
                failures: failures.into_iter().collect(),
            }
        }
    }

    impl Acceptor for FlakyListener {
        fn local_addr(&self) -> SocketAddr {
            self.inner.local_addr()
        }

        fn closer(&mut self) -> ListenerCloser {
            self.inner.closer()
        }

        async fn accept(&mut self) -> Result<Accepted, ListenerError> {
            match self.failures.pop_front() {
                Some(kind) => Err(ListenerError::Accept(io::Error::from(kind))),
                None => self.inner.accept().await,
            }
        }
    }

    fn local_config(timeout_secs: u64) -> ServerConfig {
        let mut config = ServerConfig::default();
        config.listener = ListenerConfig {
            address: "127.0.0.1:0".into(),
            ..Default::default()
        };
        config.shutdown.timeout_secs = timeout_secs;
        config
    }

    #[test]
    fn zero_timeout_uses_default() {
        let server = GracefulServer::new(local_config(0), Router::default());
        assert_eq!(server.shutdown_timeout(), Duration::from_secs(3));
    }

    #[tokio::test]
    async fn idle_server_exits_gracefully() {
        let server = GracefulServer::new(local_config(3), Router::default());
        let mut state = server.subscribe();
        let listener = Listener::bind(&server.config().listener).await.unwrap();
        let (tx, rx) = oneshot::channel::<()>();

        let running = tokio::spawn(server.serve_with_shutdown(listener, async move {
            let _ = rx.await;
        }));
        assert_eq!(*state.borrow(), ServerState::Running);

        let start = std::time::Instant::now();
        tx.send(()).unwrap();
        running.await.unwrap().unwrap();

        assert!(start.elapsed() < Duration::from_secs(1));
        assert_eq!(*state.borrow_and_update(), ServerState::Exited);
    }

    #[tokio::test]
    async fn bind_failure_is_fatal() {
        let taken = Listener::bind(&local_config(3).listener).await.unwrap();
        let mut config = local_config(3);
        config.listener.address = taken.local_addr().to_string();

        let err = GracefulServer::new(config, Router::default())
            .listen_and_serve()
            .await
            .unwrap_err();
        assert!(matches!(err, ServerError::Listener(ListenerError::Bind { .. })));
    }

    #[tokio::test]
    async fn fatal_accept_error_skips_drain() {
        let listener = FlakyListener::bind([io::ErrorKind::PermissionDenied]).await;
        let server = GracefulServer::new(local_config(3), Router::default());
        let mut state = server.subscribe();

        let err = tokio::time::timeout(
            Duration::from_secs(1),
            server.serve_with_shutdown(listener, std::future::pending()),
        )
        .await
        .expect("fatal error should end serving at once")
        .unwrap_err();

        assert!(matches!(err, ServerError::Listener(ListenerError::Accept(_))));
        assert_eq!(*state.borrow_and_update(), ServerState::Running);
    }

    #[tokio::test]
    async fn transient_accept_errors_are_retried() {
        let listener = FlakyListener::bind([
            io::ErrorKind::ConnectionAborted,
            io::ErrorKind::ConnectionReset,
        ])
        .await;
        let addr = listener.local_addr();
        let mut router = Router::default();
        router.handle_func("/", || async { "ok" }).unwrap();
        let server = GracefulServer::new(local_config(3), router);
        let mut state = server.subscribe();
        let (tx, rx) = oneshot::channel::<()>();

        let running = tokio::spawn(server.serve_with_shutdown(listener, async move {
            let _ = rx.await;
        }));

        let client = reqwest::Client::builder().no_proxy().build().unwrap();
        let res = client.get(format!("http://{}/", addr)).send().await.unwrap();
        assert_eq!(res.status(), 200);
        assert_eq!(*state.borrow(), ServerState::Running);

        tx.send(()).unwrap();
        running.await.unwrap().unwrap();
        assert_eq!(*state.borrow_and_update(), ServerState::Exited);
    }
}
