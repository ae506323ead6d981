//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Parse the correlation key expression up front
//! - Validate value ranges (status codes, non-zero intervals, addresses)
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: IngressConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::net::SocketAddr;

use crate::config::schema::IngressConfig;
use crate::correlation::key::{KeyExpression, KeyExpressionError};
use crate::exchange::policy::TimeoutPolicy;

/// A single semantic problem with a configuration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("invalid HTTP status {0}")]
    InvalidStatus(u16),

    #[error("{0} must be greater than zero")]
    ZeroDuration(&'static str),

    #[error("invalid correlation key expression: {0}")]
    KeyExpression(#[from] KeyExpressionError),

    #[error("invalid socket address for {field}: '{value}'")]
    InvalidAddress { field: &'static str, value: String },

    #[error("admin.api_key must be set when admin is enabled")]
    MissingApiKey,
}

/// Render a list of errors as one comma-separated line.
pub(crate) fn join_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

fn check_address(field: &'static str, value: &str, errors: &mut Vec<ValidationError>) {
    if value.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::InvalidAddress {
            field,
            value: value.to_string(),
        });
    }
}

/// Validate `config`, collecting every problem found.
pub fn validate_config(config: &IngressConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if let Err(e) = TimeoutPolicy::try_from(&config.wait) {
        errors.push(e);
    }

    if let Err(e) = config.correlation.key_expression.parse::<KeyExpression>() {
        errors.push(e.into());
    }
    if config.correlation.ttl_secs == 0 {
        errors.push(ValidationError::ZeroDuration("correlation.ttl_secs"));
    }
    if config.correlation.reaper_interval_secs == 0 {
        errors.push(ValidationError::ZeroDuration("correlation.reaper_interval_secs"));
    }

    if !(100..600).contains(&config.response.status) {
        errors.push(ValidationError::InvalidStatus(config.response.status));
    }

    check_address("listener.bind_address", &config.listener.bind_address, &mut errors);
    if config.observability.metrics_enabled {
        check_address(
            "observability.metrics_address",
            &config.observability.metrics_address,
            &mut errors,
        );
    }

    if config.admin.enabled && config.admin.api_key.trim().is_empty() {
        errors.push(ValidationError::MissingApiKey);
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
    fn test_default_config_is_valid() {
        assert!(validate_config(&IngressConfig::default()).is_ok());
    }

    #[test]
    fn test_collects_all_errors() {
        let mut config = IngressConfig::default();
        config.wait.on_timeout_status = 1000;
        config.correlation.key_expression = "%message{".to_string();
        config.correlation.ttl_secs = 0;
        config.listener.bind_address = "not-an-address".to_string();
        config.admin.enabled = true;

        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 5);
        assert!(errors.contains(&ValidationError::InvalidStatus(1000)));
        assert!(errors.contains(&ValidationError::ZeroDuration("correlation.ttl_secs")));
        assert!(errors.contains(&ValidationError::MissingApiKey));
    }

    #[test]
    fn test_metrics_address_only_checked_when_enabled() {
        let mut config = IngressConfig::default();
        config.observability.metrics_address = "nope".to_string();
        assert!(validate_config(&config).is_ok());

        config.observability.metrics_enabled = true;
        assert!(validate_config(&config).is_err());
    }
}
