//! TCP listener with backpressure, keep-alive and an explicit close.
//!
//! # Responsibilities
//! - Bind to the configured address
//! - Accept incoming TCP connections
//! - Enforce max_connections limit via semaphore
//! - Apply TCP keep-alive to accepted sockets
//! - Stop accepting, and release the port, when closed
//!
//! # Design Decisions
//! - Closing goes through a one-shot [`ListenerCloser`]; the pending `accept`
//!   observes it and reports [`ListenerError::Closed`]
//! - The socket is dropped on close so new connection attempts are refused
//! - Transient accept errors are classified here; retrying is up to the caller
//! - The server drives any [`Acceptor`], so other connection sources (and
//!   failing ones in tests) can stand in for the TCP listener

use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use socket2::{SockRef, TcpKeepalive};
use thiserror::Error;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{oneshot, Semaphore};

use crate::config::ListenerConfig;

/// Error type for listener operations.
#[derive(Debug, Error)]
pub enum ListenerError {
    /// Failed to bind to address.
    #[error("Failed to bind {address}: {source}")]
    Bind {
        address: String,
        #[source]
        source: io::Error,
    },
    /// Failed to accept connection.
    #[error("Failed to accept: {0}")]
    Accept(#[source] io::Error),
    /// The listener was closed through its [`ListenerCloser`].
    #[error("Listener closed")]
    Closed,
}

/// An accepted connection and the slot it occupies.
pub type Accepted = (TcpStream, SocketAddr, ConnectionPermit);

/// Source of connections for the accept loop.
pub trait Acceptor: Send {
    /// Address reported in logs.
    fn local_addr(&self) -> SocketAddr;

    /// Handle that makes the pending and every later `accept` return
    /// [`ListenerError::Closed`].
    fn closer(&mut self) -> ListenerCloser;

    /// Wait for the next connection.
    fn accept(&mut self) -> impl Future<Output = Result<Accepted, ListenerError>> + Send;
}

/// A bounded TCP listener that limits concurrent connections.
///
/// Uses a semaphore to enforce `max_connections`. When the limit is reached,
/// new connections will wait until a slot becomes available.
pub struct Listener {
    /// The underlying TCP listener. `None` once closed.
    inner: Option<TcpListener>,
    local_addr: SocketAddr,
    /// Semaphore to limit concurrent connections.
    connection_limit: Arc<Semaphore>,
    keepalive: Option<Duration>,
    close_rx: Option<oneshot::Receiver<()>>,
}

impl Listener {
    /// Bind to the configured address with connection limits.
    pub async fn bind(config: &ListenerConfig) -> Result<Self, ListenerError> {
        let address = config.resolved_address();
        let bind_err = |source| ListenerError::Bind {
            address: address.clone(),
            source,
        };

        let listener = TcpListener::bind(address.as_str()).await.map_err(bind_err)?;
        let local_addr = listener.local_addr().map_err(bind_err)?;

        tracing::info!(
            address = %local_addr,
            max_connections = config.max_connections,
            tcp_keepalive_secs = config.tcp_keepalive_secs,
            "Listener bound"
        );

        Ok(Self {
            inner: Some(listener),
            local_addr,
            connection_limit: Arc::new(Semaphore::new(config.max_connections)),
            keepalive: config.tcp_keepalive(),
            close_rx: None,
        })
    }

    /// Handle that closes this listener. Only the most recently issued
    /// closer is live.
    pub fn closer(&mut self) -> ListenerCloser {
        let (tx, rx) = oneshot::channel();
        self.close_rx = Some(rx);
        ListenerCloser { tx }
    }

    /// Accept a new connection, respecting the connection limit.
    ///
    /// This will wait if the connection limit has been reached. Returns the
    /// stream and a permit that must be held for the connection's lifetime.
    pub async fn accept(&mut self) -> Result<Accepted, ListenerError> {
        loop {
            let Some(inner) = self.inner.as_ref() else {
                return Err(ListenerError::Closed);
            };
            let close_rx = &mut self.close_rx;
            let limit = &self.connection_limit;

            let event = {
                let close = async {
                    match close_rx.as_mut() {
                        Some(rx) => rx.await.is_ok(),
                        None => std::future::pending().await,
                    }
                };
                let next = async {
                    // Acquire permit first (backpressure)
                    let permit = limit
                        .clone()
                        .acquire_owned()
                        .await
                        .map_err(|_| ListenerError::Closed)?;
                    let (stream, addr) = inner.accept().await.map_err(ListenerError::Accept)?;
                    Ok::<_, ListenerError>((stream, addr, permit))
                };

                tokio::select! {
                    biased;
                    closed = close => AcceptEvent::Close(closed),
                    next = next => AcceptEvent::Next(next),
                }
            };

            match event {
                AcceptEvent::Close(true) => {
                    self.inner = None;
                    self.close_rx = None;
                    tracing::info!(address = %self.local_addr, "Listener closed");
                    return Err(ListenerError::Closed);
                }
                AcceptEvent::Close(false) => {
                    // Closer dropped without closing; keep serving.
                    self.close_rx = None;
                }
                AcceptEvent::Next(Err(e)) => return Err(e),
                AcceptEvent::Next(Ok((stream, addr, permit))) => {
                    if let Some(idle) = self.keepalive {
                        if let Err(e) = set_keepalive(&stream, idle) {
                            tracing::warn!(peer_addr = %addr, error = %e, "Failed to enable TCP keep-alive");
                        }
                    }

                    tracing::debug!(
                        peer_addr = %addr,
                        available_permits = self.available_permits(),
                        "Connection accepted"
                    );

                    return Ok((stream, addr, ConnectionPermit { _permit: permit }));
                }
            }
        }
    }

    /// Get the local address this listener is (or was) bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Get current available connection slots.
    pub fn available_permits(&self) -> usize {
        self.connection_limit.available_permits()
    }
}

impl Acceptor for Listener {
    fn local_addr(&self) -> SocketAddr {
        Listener::local_addr(self)
    }

    fn closer(&mut self) -> ListenerCloser {
        Listener::closer(self)
    }

    fn accept(&mut self) -> impl Future<Output = Result<Accepted, ListenerError>> + Send {
        Listener::accept(self)
    }
}

enum AcceptEvent {
    Close(bool),
    Next(Result<(TcpStream, SocketAddr, tokio::sync::OwnedSemaphorePermit), ListenerError>),
}

/// One-shot handle that closes a [`Listener`]. Consumed by [`close`](Self::close).
#[derive(Debug)]
pub struct ListenerCloser {
    tx: oneshot::Sender<()>,
}

impl ListenerCloser {
    pub fn close(self) {
        if self.tx.send(()).is_err() {
            tracing::debug!("Listener already gone, nothing to close");
        }
    }
}

/// A permit representing a connection slot.
///
/// When dropped, the connection slot is released back to the pool.
/// This ensures backpressure is maintained even if the connection handler panics.
#[derive(Debug)]
pub struct ConnectionPermit {
    _permit: tokio::sync::OwnedSemaphorePermit,
}

/// Idle time and probe interval both follow the configured period.
fn keepalive_params(period: Duration) -> TcpKeepalive {
    let keepalive = TcpKeepalive::new().with_time(period);
    #[cfg(any(
        target_os = "android",
        target_os = "freebsd",
        target_os = "ios",
        target_os = "linux",
        target_os = "macos",
        target_os = "netbsd",
        target_os = "windows",
    ))]
    let keepalive = keepalive.with_interval(period);
    keepalive
}

fn set_keepalive(stream: &TcpStream, period: Duration) -> io::Result<()> {
    SockRef::from(stream).set_tcp_keepalive(&keepalive_params(period))
}

/// Whether an accept error is worth retrying instead of failing the server.
pub fn is_transient(err: &io::Error) -> bool {
    use io::ErrorKind::*;

    matches!(
        err.kind(),
        ConnectionAborted | ConnectionReset | ConnectionRefused | Interrupted | WouldBlock | TimedOut
    ) || is_fd_exhaustion(err)
}

// EMFILE / ENFILE share these values on Linux, macOS and the BSDs.
#[cfg(unix)]
fn is_fd_exhaustion(err: &io::Error) -> bool {
    matches!(err.raw_os_error(), Some(23 | 24))
}

#[cfg(not(unix))]
fn is_fd_exhaustion(_err: &io::Error) -> bool {
    false
}
