//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (limits > 0, ports valid, timeout bounded)
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ServerConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use thiserror::Error;

use crate::config::schema::ServerConfig;

/// Longest shutdown timeout we accept.
pub const MAX_SHUTDOWN_TIMEOUT_SECS: u64 = 3600;

/// A single semantic problem in a configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("listener.address {0:?} has no valid port")]
    InvalidAddress(String),
    #[error("listener.max_connections must be greater than 0")]
    ZeroMaxConnections,
    #[error("shutdown.timeout_secs {0} exceeds the {max}s limit", max = MAX_SHUTDOWN_TIMEOUT_SECS)]
    TimeoutTooLong(u64),
    #[error("shutdown.signals must name at least one signal")]
    NoShutdownSignals,
}

/// Check `config` for semantic problems.
pub fn validate_config(config: &ServerConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    let address = config.listener.resolved_address();
    let port_ok = address
        .rsplit_once(':')
        .map(|(host, port)| !host.is_empty() && port.parse::<u16>().is_ok())
        .unwrap_or(false);
    if !port_ok {
        errors.push(ValidationError::InvalidAddress(config.listener.address.clone()));
    }

    if config.listener.max_connections == 0 {
        errors.push(ValidationError::ZeroMaxConnections);
    }

    if config.shutdown.timeout_secs > MAX_SHUTDOWN_TIMEOUT_SECS {
        errors.push(ValidationError::TimeoutTooLong(config.shutdown.timeout_secs));
    }

    if config.shutdown.signals.is_empty() {
        errors.push(ValidationError::NoShutdownSignals);
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert!(validate_config(&ServerConfig::default()).is_ok());
    }

    #[test]
    fn reports_every_problem() {
        let mut config = ServerConfig::default();
        config.listener.address = "localhost".into();
        config.listener.max_connections = 0;
        config.shutdown.timeout_secs = 7200;
        config.shutdown.signals.clear();

        let errors = validate_config(&config).unwrap_err();
        assert_eq!(
            errors,
            vec![
                ValidationError::InvalidAddress("localhost".into()),
                ValidationError::ZeroMaxConnections,
                ValidationError::TimeoutTooLong(7200),
                ValidationError::NoShutdownSignals,
            ]
        );
    }

    #[test]
    fn accepts_hostnames_with_ports() {
        let mut config = ServerConfig::default();
        config.listener.address = "localhost:8080".into();
        assert!(validate_config(&config).is_ok());
    }
}
