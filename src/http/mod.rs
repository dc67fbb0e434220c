//! HTTP serving subsystem.
//!
//! # Data Flow
//! ```text
//! Accepted connection
//!     → server.rs (accept loop, shutdown state machine)
//!     → axum dispatch (path matching)
//!     → interceptor.rs (barrier enter → handler → barrier exit)
//!     → Send response to client
//! ```

pub mod interceptor;
pub mod server;

pub use interceptor::{HandlerInterceptor, Intercepted};
pub use server::{GracefulServer, ServerError};
