//! Per-connection serving.
//!
//! # Responsibilities
//! - Generate unique connection IDs for tracing
//! - Drive one accepted socket through hyper (HTTP/1.1 and HTTP/2)
//! - Stop admitting new requests on the connection once the server drains
//!
//! # Design Decisions
//! - Draining asks hyper for a graceful connection shutdown: requests already
//!   dispatched run to completion, keep-alive reuse stops
//! - The connection permit lives exactly as long as the connection task

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto;
use hyper_util::service::TowerToHyperService;
use tokio::net::TcpStream;
use tokio::sync::watch;

use crate::lifecycle::ServerState;
use crate::net::listener::ConnectionPermit;

/// Global atomic counter for connection IDs.
/// Using relaxed ordering is sufficient since we only need uniqueness, not synchronization.
static CONNECTION_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Unique identifier for a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Generate a new unique connection ID.
    pub fn new() -> Self {
        Self(CONNECTION_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value.
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Serve HTTP on one accepted connection until the peer goes away or the
/// server drains it.
pub async fn serve_connection(
    stream: TcpStream,
    peer_addr: SocketAddr,
    permit: ConnectionPermit,
    app: axum::Router,
    state: watch::Receiver<ServerState>,
) {
    let _permit = permit;
    let id = ConnectionId::new();
    tracing::trace!(connection_id = %id, peer_addr = %peer_addr, "Connection opened");

    let builder = auto::Builder::new(TokioExecutor::new());
    let conn = builder.serve_connection(TokioIo::new(stream), TowerToHyperService::new(app));
    tokio::pin!(conn);

    let result = tokio::select! {
        result = conn.as_mut() => result,
        _ = draining(state) => {
            tracing::debug!(connection_id = %id, "Draining connection");
            conn.as_mut().graceful_shutdown();
            conn.await
        }
    };

    if let Err(e) = result {
        tracing::debug!(connection_id = %id, peer_addr = %peer_addr, error = %e, "Connection ended with error");
    }
    tracing::trace!(connection_id = %id, "Connection closed");
}

/// Completes once the server leaves `Running`, or the server is gone.
async fn draining(mut state: watch::Receiver<ServerState>) {
    let _ = state.wait_for(ServerState::is_shutting_down).await;
}
