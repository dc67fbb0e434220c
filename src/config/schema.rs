//! Configuration schema definitions.
//!
//! All types derive Serde traits for deserialization from config files, and
//! every field has a default so an empty file is a valid configuration.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::lifecycle::TerminationSignal;

/// Shutdown timeout used when none (or zero) is configured.
pub const DEFAULT_SHUTDOWN_TIMEOUT_SECS: u64 = 3;

/// Port used when the address is empty.
pub const DEFAULT_HTTP_PORT: u16 = 80;

/// Root configuration for the server.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ServerConfig {
    /// Listener configuration (address, keep-alive, limits).
    pub listener: ListenerConfig,

    /// Graceful shutdown settings.
    pub shutdown: ShutdownConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address. Empty means all interfaces on port 80; `":8080"` means
    /// all interfaces on port 8080.
    pub address: String,

    /// TCP keep-alive idle time applied to accepted sockets. 0 disables it.
    pub tcp_keepalive_secs: u64,

    /// Maximum concurrent connections (backpressure).
    pub max_connections: usize,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            address: String::new(),
            tcp_keepalive_secs: 180,
            max_connections: 10_000,
        }
    }
}

impl ListenerConfig {
    /// The address handed to the socket layer.
    pub fn resolved_address(&self) -> String {
        let address = self.address.trim();
        if address.is_empty() {
            format!("0.0.0.0:{}", DEFAULT_HTTP_PORT)
        } else if address.starts_with(':') {
            format!("0.0.0.0{}", address)
        } else {
            address.to_string()
        }
    }

    pub fn tcp_keepalive(&self) -> Option<Duration> {
        (self.tcp_keepalive_secs > 0).then(|| Duration::from_secs(self.tcp_keepalive_secs))
    }
}

/// Graceful shutdown configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ShutdownConfig {
    /// Seconds to wait for in-flight requests. 0 falls back to the default.
    pub timeout_secs: u64,

    /// Signals that start a graceful shutdown.
    pub signals: Vec<TerminationSignal>,
}

impl Default for ShutdownConfig {
    fn default() -> Self {
        Self {
            timeout_secs: DEFAULT_SHUTDOWN_TIMEOUT_SECS,
            signals: vec![TerminationSignal::Terminate],
        }
    }
}

impl ShutdownConfig {
    /// Effective drain timeout. Zero is not "wait forever".
    pub fn timeout(&self) -> Duration {
        let secs = if self.timeout_secs == 0 {
            DEFAULT_SHUTDOWN_TIMEOUT_SECS
        } else {
            self.timeout_secs
        };
        Duration::from_secs(secs)
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error) or a full filter directive.
    pub log_level: String,

    /// Output format.
    pub log_format: LogFormat,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
        }
    }
}
