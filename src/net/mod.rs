//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming TCP connection
//!     → listener.rs (accept loop, connection limits, keep-alive)
//!     → connection.rs (hyper connection, drained on shutdown)
//!     → Hand off to the Router
//!
//! Listener States:
//!     Accepting → Closed (by ListenerCloser, exactly once)
//! ```
//!
//! # Design Decisions
//! - Bounded accept queue prevents resource exhaustion
//! - Closing the listener is the only way to stop the accept loop

pub mod connection;
pub mod listener;

pub use connection::{serve_connection, ConnectionId};
pub use listener::{
    is_transient, Accepted, Acceptor, ConnectionPermit, Listener, ListenerCloser, ListenerError,
};
