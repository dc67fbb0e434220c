//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! All subsystems produce:
//!     → tracing events (structured fields: address, in_flight, outstanding)
//!     → logging.rs (filter + fmt layer, pretty or JSON)
//!     → stdout
//! ```
//!
//! # Design Decisions
//! - Structured logging (JSON) for machine parsing
//! - Shutdown transitions log at info, forced exits at warn

pub mod logging;
