//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! Startup:
//!     register(pattern, handler)
//!     → HandlerInterceptor::wrap(handler)   (once per registration)
//!     → axum dispatch table
//!
//! Per request:
//!     axum matches the path → Intercepted handler → barrier enter/exit
//! ```
//!
//! # Design Decisions
//! - Routes registered at startup, immutable once serving
//! - Path matching delegated to axum
//! - Every registered path is covered by graceful shutdown

pub mod router;

pub use router::{Router, RouterError};
