//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Accept loop:
//!     → accept error classified transient (net::listener::is_transient)
//!     → backoff.rs (sleep 5ms, 10ms, ... capped at 1s)
//!     → accept again; a success resets the delay
//! ```
//!
//! # Design Decisions
//! - Only the accept loop retries; shutdown itself never does
//! - Non-transient accept errors are fatal and surface to the caller

pub mod backoff;

pub use backoff::AcceptBackoff;
