//! Graceful shutdown for HTTP servers.
//!
//! Handlers registered through [`Router`] are counted while they run. When a
//! termination signal arrives, [`GracefulServer`] closes its listener, waits
//! for the count to reach zero and returns, or gives up after a timeout.

pub mod config;
pub mod http;
pub mod lifecycle;
pub mod net;
pub mod observability;
pub mod resilience;
pub mod routing;

pub use config::ServerConfig;
pub use http::{GracefulServer, ServerError};
pub use lifecycle::{RequestBarrier, ServerState};
pub use routing::Router;
