//! Shared utilities for integration testing.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::extract::{Path, State};
use axum::routing::get;
use grace::config::ListenerConfig;
use grace::net::Listener;
use grace::{GracefulServer, RequestBarrier, Router, ServerConfig, ServerError, ServerState};
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;

/// Number of handler bodies that have started, across all routes.
#[derive(Clone, Default)]
pub struct Entries(Arc<AtomicUsize>);

impl Entries {
    pub fn get(&self) -> usize {
        self.0.load(Ordering::SeqCst)
    }
}

async fn quick(State(entries): State<Entries>) -> &'static str {
    entries.0.fetch_add(1, Ordering::SeqCst);
    "ok"
}

async fn sleep_ms(State(entries): State<Entries>, Path(ms): Path<u64>) -> String {
    entries.0.fetch_add(1, Ordering::SeqCst);
    tokio::time::sleep(Duration::from_millis(ms)).await;
    format!("slept {}ms", ms)
}

async fn explode() -> &'static str {
    panic!("integration test panic")
}

/// Router with `/`, `/sleep/{ms}` and `/panic`.
pub fn demo_router(barrier: RequestBarrier, entries: Entries) -> Router {
    let mut router = Router::new(barrier);
    router
        .register("/", get(quick).with_state(entries.clone()))
        .unwrap()
        .register("/sleep/{ms}", get(sleep_ms).with_state(entries))
        .unwrap()
        .handle_func("/panic", explode)
        .unwrap();
    router
}

pub fn local_config(timeout_secs: u64) -> ServerConfig {
    let mut config = ServerConfig::default();
    config.listener = ListenerConfig {
        address: "127.0.0.1:0".into(),
        ..Default::default()
    };
    config.shutdown.timeout_secs = timeout_secs;
    config
}

/// A server running on an ephemeral port with a manual shutdown trigger.
pub struct TestServer {
    pub addr: SocketAddr,
    pub barrier: RequestBarrier,
    pub entries: Entries,
    pub state: watch::Receiver<ServerState>,
    trigger: Option<oneshot::Sender<()>>,
    handle: JoinHandle<Result<(), ServerError>>,
}

impl TestServer {
    pub async fn start(timeout_secs: u64) -> Self {
        let barrier = RequestBarrier::new();
        let entries = Entries::default();
        let config = local_config(timeout_secs);
        let listener = Listener::bind(&config.listener).await.unwrap();
        let addr = listener.local_addr();

        let server = GracefulServer::new(config, demo_router(barrier.clone(), entries.clone()));
        let state = server.subscribe();
        let (tx, rx) = oneshot::channel::<()>();
        let handle = tokio::spawn(server.serve_with_shutdown(listener, async move {
            let _ = rx.await;
        }));

        Self {
            addr,
            barrier,
            entries,
            state,
            trigger: Some(tx),
            handle,
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    /// Fire the shutdown trigger and return the instant it was fired.
    pub fn shutdown(&mut self) -> Instant {
        let tx = self.trigger.take().expect("shutdown triggered twice");
        let _ = tx.send(());
        Instant::now()
    }

    /// Wait for the serve call to return.
    pub async fn join(self) -> Result<(), ServerError> {
        self.handle.await.expect("server task panicked")
    }

    pub async fn wait_for_state(&mut self, f: impl FnMut(&ServerState) -> bool) -> ServerState {
        tokio::time::timeout(Duration::from_secs(10), self.state.wait_for(f))
            .await
            .expect("state not reached in time")
            .map(|state| *state)
            .expect("server dropped its state")
    }
}

pub fn client() -> reqwest::Client {
    reqwest::Client::builder().no_proxy().build().unwrap()
}

/// Poll until `barrier` reports `expected` in-flight requests.
pub async fn wait_for_in_flight(barrier: &RequestBarrier, expected: i64) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while barrier.peek() != expected {
        assert!(Instant::now() < deadline, "in-flight never reached {}", expected);
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}
