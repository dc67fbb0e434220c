//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Requests (barrier.rs):
//!     Handler entered → counter + 1 → handler body → counter - 1 (guard drop)
//!
//! Signals (signals.rs):
//!     SIGTERM (configurable) → Trigger graceful shutdown
//!
//! Shutdown (shutdown.rs):
//!     Signal received → Stop accepting → Drain in-flight requests → Exit
//!                                              └── or timeout → Forced exit
//! ```
//!
//! # Design Decisions
//! - Barrier is owned by the server instance, never a process global
//! - Shutdown is one-directional: no path back to Running
//! - Shutdown has timeout: forced exit after deadline, handlers not cancelled

pub mod barrier;
pub mod shutdown;
pub mod signals;

pub use barrier::{RequestBarrier, RequestGuard};
pub use shutdown::{DrainOutcome, ServerState, ShutdownSession};
pub use signals::TerminationSignal;
