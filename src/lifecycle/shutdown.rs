//! Shutdown state machine.
//!
//! ```text
//! Running ──signal──▶ Draining ──drained──▶ Exited
//!                        │
//!                        └──timeout──▶ ForcedExit { outstanding }
//! ```
//!
//! Transitions only move forward. Both terminal states count as a successful
//! shutdown; they differ in what gets logged.

use std::time::{Duration, Instant};
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::lifecycle::barrier::{RequestBarrier, DRAIN_POLL_INTERVAL};

/// Lifecycle state of a [`GracefulServer`](crate::http::GracefulServer).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerState {
    /// Accept loop active.
    Running,
    /// Listener closed, waiting for in-flight requests.
    Draining,
    /// Every in-flight request finished before the timeout.
    Exited,
    /// The timeout fired with requests still running.
    ForcedExit { outstanding: i64 },
}

impl ServerState {
    fn rank(&self) -> u8 {
        match self {
            ServerState::Running => 0,
            ServerState::Draining => 1,
            ServerState::Exited | ServerState::ForcedExit { .. } => 2,
        }
    }

    /// True once the listener has been closed.
    pub fn is_shutting_down(&self) -> bool {
        self.rank() >= 1
    }

    /// True for `Exited` and `ForcedExit`.
    pub fn is_terminal(&self) -> bool {
        self.rank() == 2
    }

    /// Whether `self → next` is a legal transition.
    pub fn can_transition_to(&self, next: ServerState) -> bool {
        next.rank() == self.rank() + 1
    }
}

impl From<DrainOutcome> for ServerState {
    fn from(outcome: DrainOutcome) -> Self {
        match outcome {
            DrainOutcome::Graceful => ServerState::Exited,
            DrainOutcome::Forced { outstanding } => ServerState::ForcedExit { outstanding },
        }
    }
}

/// Owner of the state channel. Rejects backward or skipping transitions.
#[derive(Debug)]
pub struct StateMachine {
    tx: watch::Sender<ServerState>,
}

impl StateMachine {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(ServerState::Running);
        Self { tx }
    }

    pub fn current(&self) -> ServerState {
        *self.tx.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<ServerState> {
        self.tx.subscribe()
    }

    /// Move to `next`. Returns false (and leaves the state alone) if the
    /// transition is not allowed.
    pub fn transition(&self, next: ServerState) -> bool {
        self.tx.send_if_modified(|state| {
            if !state.can_transition_to(next) {
                tracing::warn!(from = ?*state, to = ?next, "Rejected shutdown transition");
                return false;
            }
            tracing::debug!(from = ?*state, to = ?next, "Server state changed");
            *state = next;
            true
        })
    }
}

impl Default for StateMachine {
    fn default() -> Self {
        Self::new()
    }
}

/// Result of racing the drain against the timeout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrainOutcome {
    Graceful,
    Forced { outstanding: i64 },
}

/// Ephemeral state for one shutdown, created when the signal is observed.
#[derive(Debug)]
pub struct ShutdownSession {
    timeout: Duration,
    started: Instant,
}

impl ShutdownSession {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            started: Instant::now(),
        }
    }

    /// Wait for `barrier` to drain or the timeout to elapse, whichever is
    /// first. Consumes the session.
    ///
    /// In-flight handlers are never cancelled; on timeout they keep running
    /// and we simply stop waiting for them. A drained event that arrives while
    /// the counter is non-zero (left over from an earlier `signal_drained`, or
    /// raced by a late request) is discarded and the race continues.
    pub async fn drain(self, barrier: &RequestBarrier) -> DrainOutcome {
        let mut watcher = spawn_watcher(barrier);
        let deadline = tokio::time::sleep(self.timeout);
        tokio::pin!(deadline);

        let outcome = loop {
            tokio::select! {
                _ = barrier.drained() => {
                    let in_flight = barrier.peek();
                    if in_flight != 0 {
                        tracing::debug!(in_flight, "Discarding stale drained event");
                        if watcher.is_finished() {
                            watcher = spawn_watcher(barrier);
                        }
                        continue;
                    }
                    tracing::info!(
                        elapsed_ms = self.started.elapsed().as_millis() as u64,
                        "Shutdown gracefully, all requests drained"
                    );
                    break DrainOutcome::Graceful;
                }
                _ = &mut deadline => {
                    let outstanding = barrier.peek();
                    tracing::warn!(
                        timeout_secs = self.timeout.as_secs(),
                        outstanding,
                        "Shutdown timeout elapsed with requests still in flight"
                    );
                    break DrainOutcome::Forced { outstanding };
                }
            }
        };

        watcher.abort();
        outcome
    }
}

fn spawn_watcher(barrier: &RequestBarrier) -> JoinHandle<()> {
    let barrier = barrier.clone();
    tokio::spawn(async move { barrier.watch_until_drained(DRAIN_POLL_INTERVAL).await })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transitions_only_move_forward() {
        let machine = StateMachine::new();
        assert_eq!(machine.current(), ServerState::Running);

        assert!(!machine.transition(ServerState::Exited));
        assert!(machine.transition(ServerState::Draining));
        assert!(!machine.transition(ServerState::Draining));
        assert!(!machine.transition(ServerState::Running));
        assert!(machine.transition(ServerState::ForcedExit { outstanding: 2 }));
        assert!(!machine.transition(ServerState::Exited));

        assert_eq!(machine.current(), ServerState::ForcedExit { outstanding: 2 });
    }

    #[test]
    fn state_predicates() {
        assert!(!ServerState::Running.is_shutting_down());
        assert!(ServerState::Draining.is_shutting_down());
        assert!(!ServerState::Draining.is_terminal());
        assert!(ServerState::Exited.is_terminal());
        assert!(ServerState::ForcedExit { outstanding: 1 }.is_terminal());
    }

    #[tokio::test]
    async fn subscribers_see_transitions() {
        let machine = StateMachine::new();
        let mut rx = machine.subscribe();

        machine.transition(ServerState::Draining);
        rx.changed().await.unwrap();
        assert_eq!(*rx.borrow(), ServerState::Draining);
    }

    #[tokio::test(start_paused = true)]
    async fn empty_barrier_drains_immediately() {
        let barrier = RequestBarrier::new();
        let start = tokio::time::Instant::now();

        let outcome = ShutdownSession::new(Duration::from_secs(3)).drain(&barrier).await;

        assert_eq!(outcome, DrainOutcome::Graceful);
        assert!(start.elapsed() < Duration::from_millis(100));
    }

    #[tokio::test(start_paused = true)]
    async fn stuck_request_forces_exit_at_timeout() {
        let barrier = RequestBarrier::new();
        let _stuck = barrier.track();
        let start = tokio::time::Instant::now();

        let outcome = ShutdownSession::new(Duration::from_secs(3)).drain(&barrier).await;

        assert_eq!(outcome, DrainOutcome::Forced { outstanding: 1 });
        assert!(start.elapsed() >= Duration::from_secs(3));
        assert!(start.elapsed() < Duration::from_secs(4));
    }

    #[tokio::test(start_paused = true)]
    async fn short_request_drains_before_timeout() {
        let barrier = RequestBarrier::new();
        let guard = barrier.track();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(1)).await;
            drop(guard);
        });
        let start = tokio::time::Instant::now();

        let outcome = ShutdownSession::new(Duration::from_secs(3)).drain(&barrier).await;

        assert_eq!(outcome, DrainOutcome::Graceful);
        assert!(start.elapsed() >= Duration::from_secs(1));
        assert!(start.elapsed() < Duration::from_secs(2));
        assert_eq!(barrier.peek(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn early_drained_signal_does_not_skip_in_flight_requests() {
        let barrier = RequestBarrier::new();
        barrier.signal_drained();
        let _stuck = barrier.track();

        let outcome = ShutdownSession::new(Duration::from_secs(3)).drain(&barrier).await;

        assert_eq!(outcome, DrainOutcome::Forced { outstanding: 1 });
        assert_eq!(barrier.peek(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn early_drained_signal_still_waits_for_completion() {
        let barrier = RequestBarrier::new();
        barrier.signal_drained();
        let guard = barrier.track();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(1)).await;
            drop(guard);
        });
        let start = tokio::time::Instant::now();

        let outcome = ShutdownSession::new(Duration::from_secs(3)).drain(&barrier).await;

        assert_eq!(outcome, DrainOutcome::Graceful);
        assert!(start.elapsed() >= Duration::from_secs(1));
        assert!(start.elapsed() < Duration::from_secs(2));
    }

    #[test]
    fn outcome_maps_to_terminal_state() {
        assert_eq!(ServerState::from(DrainOutcome::Graceful), ServerState::Exited);
        assert_eq!(
            ServerState::from(DrainOutcome::Forced { outstanding: 3 }),
            ServerState::ForcedExit { outstanding: 3 }
        );
    }
}
