//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (timeouts > 0, addresses parse)
//! - Detect tag name collisions between fragments and handled tags
//! - Keep the default fragment timeout inside the request budget
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: GatewayConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::net::SocketAddr;
use thiserror::Error;
use url::Url;

use crate::config::schema::GatewayConfig;

/// A single semantic problem found in a configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("{field}: invalid socket address {value:?}")]
    InvalidAddress { field: &'static str, value: String },

    #[error("{field}: must be greater than zero")]
    ZeroValue { field: &'static str },

    #[error("fragments.tag: must not be empty")]
    EmptyFragmentTag,

    #[error("fragments.handled_tags: {0:?} collides with the fragment tag")]
    TagCollision(String),

    #[error("context.url: {0}")]
    InvalidContextUrl(String),

    #[error("fragments.timeout_ms: {timeout_ms}ms does not fit in timeouts.request_secs ({request_secs}s)")]
    FragmentTimeoutExceedsRequest { timeout_ms: u64, request_secs: u64 },
}

/// Check a parsed configuration, collecting every problem found.
pub fn validate_config(config: &GatewayConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::InvalidAddress {
            field: "listener.bind_address",
            value: config.listener.bind_address.clone(),
        });
    }

    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::InvalidAddress {
            field: "observability.metrics_address",
            value: config.observability.metrics_address.clone(),
        });
    }

    let tag = config.fragments.tag.trim();
    if tag.is_empty() {
        errors.push(ValidationError::EmptyFragmentTag);
    }

    for handled in &config.fragments.handled_tags {
        if !tag.is_empty() && handled.eq_ignore_ascii_case(tag) {
            errors.push(ValidationError::TagCollision(handled.clone()));
        }
    }

    if config.fragments.timeout_ms == 0 {
        errors.push(ValidationError::ZeroValue { field: "fragments.timeout_ms" });
    }

    if config.context.timeout_ms == 0 {
        errors.push(ValidationError::ZeroValue { field: "context.timeout_ms" });
    }

    if config.timeouts.request_secs == 0 {
        errors.push(ValidationError::ZeroValue { field: "timeouts.request_secs" });
    } else if config.fragments.timeout_ms >= config.timeouts.request_secs.saturating_mul(1000) {
        // the primary must be able to settle before the head deadline
        errors.push(ValidationError::FragmentTimeoutExceedsRequest {
            timeout_ms: config.fragments.timeout_ms,
            request_secs: config.timeouts.request_secs,
        });
    }

    if let Some(url) = &config.context.url {
        if let Err(e) = Url::parse(url) {
            errors.push(ValidationError::InvalidContextUrl(e.to_string()));
        }
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
        assert!(validate_config(&GatewayConfig::default()).is_ok());
    }

    #[test]
    fn collects_every_error() {
        let mut config = GatewayConfig::default();
        config.listener.bind_address = "not-an-address".into();
        config.fragments.handled_tags = vec!["FRAGMENT".into()];
        config.context.url = Some("::nope".into());

        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 3);
        assert!(errors.contains(&ValidationError::TagCollision("FRAGMENT".into())));
    }

    #[test]
    fn fragment_timeout_must_fit_in_request_budget() {
        let mut config = GatewayConfig::default();
        config.timeouts.request_secs = 2;
        config.fragments.timeout_ms = 2_000;

        let errors = validate_config(&config).unwrap_err();
        assert_eq!(
            errors,
            vec![ValidationError::FragmentTimeoutExceedsRequest {
                timeout_ms: 2_000,
                request_secs: 2,
            }]
        );

        config.fragments.timeout_ms = 1_999;
        assert!(validate_config(&config).is_ok());
    }
}
