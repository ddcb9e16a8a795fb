//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (ttl > 0, sweep period > 0)
//! - Check that configured header pairs are valid HTTP headers
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: PipelineConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::net::SocketAddr;

use thiserror::Error;

use crate::config::schema::PipelineConfig;
use crate::http::response::ExtraHeaders;

/// A single semantic problem found in a configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("{field}: invalid socket address `{value}`")]
    InvalidAddress { field: &'static str, value: String },

    #[error("{field} must be greater than zero")]
    Zero { field: &'static str },

    #[error("{field} must not be empty")]
    Empty { field: &'static str },

    #[error("api.path_prefix `{0}` must start and end with `/`")]
    ApiPrefix(String),

    #[error("{field}: {reason}")]
    Header { field: &'static str, reason: String },

    #[error("resources.compression_min_bytes ({min}) exceeds compression_max_bytes ({max})")]
    CompressionBounds { min: u64, max: u64 },
}

/// Validate a configuration, collecting every problem found.
pub fn validate_config(config: &PipelineConfig) -> Result<(), Vec<ValidationError>> {
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

    if config.timeouts.request_secs == 0 {
        errors.push(ValidationError::Zero { field: "timeouts.request_secs" });
    }
    if config.session.id_key.trim().is_empty() {
        errors.push(ValidationError::Empty { field: "session.id_key" });
    }
    if config.session.ttl_secs == 0 {
        errors.push(ValidationError::Zero { field: "session.ttl_secs" });
    }
    if config.session.sweep_period_secs == 0 {
        errors.push(ValidationError::Zero { field: "session.sweep_period_secs" });
    }
    if config.resources.route.trim_matches('/').is_empty() {
        errors.push(ValidationError::Empty { field: "resources.route" });
    }
    if config.resources.default_zone.is_empty() {
        errors.push(ValidationError::Empty { field: "resources.default_zone" });
    }
    if config.resources.resolve_attempts == 0 {
        errors.push(ValidationError::Zero { field: "resources.resolve_attempts" });
    }
    let (min, max) = (config.resources.compression_min_bytes, config.resources.compression_max_bytes);
    if config.resources.enable_compression && min > max {
        errors.push(ValidationError::CompressionBounds { min, max });
    }

    let prefix = &config.api.path_prefix;
    if prefix.len() < 2 || !prefix.starts_with('/') || !prefix.ends_with('/') {
        errors.push(ValidationError::ApiPrefix(prefix.clone()));
    }

    for (field, raw) in [
        ("session.extra_headers", &config.session.extra_headers),
        ("resources.extra_headers", &config.resources.extra_headers),
    ] {
        if let Err(reason) = ExtraHeaders::try_parse(raw) {
            errors.push(ValidationError::Header { field, reason });
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
