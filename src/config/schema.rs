//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the pipeline.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};

use crate::config::loader::ConfigError;

/// Root configuration for the request pipeline.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct PipelineConfig {
    /// Listener configuration (bind address).
    pub listener: ListenerConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Session store settings.
    pub session: SessionConfig,

    /// Resource cache gateway settings.
    pub resources: ResourceConfig,

    /// API dispatch gateway settings.
    pub api: ApiConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

impl PipelineConfig {
    /// Apply a single flat property override.
    ///
    /// Keys are the option names exposed to deployers (`sessionIdKey`,
    /// `apiPathPrefix`, ...). Unknown keys and unparsable values are errors.
    pub fn apply_property(&mut self, key: &str, value: &str) -> Result<(), ConfigError> {
        let invalid = |reason: &str| ConfigError::Property {
            key: key.to_string(),
            reason: reason.to_string(),
        };

        match key {
            "sessionIdKey" => self.session.id_key = value.trim().to_string(),
            "sessionTtlSeconds" => {
                self.session.ttl_secs = value.trim().parse().map_err(|_| invalid("expected seconds"))?;
            }
            "sessionSweepPeriodSeconds" => {
                self.session.sweep_period_secs =
                    value.trim().parse().map_err(|_| invalid("expected seconds"))?;
            }
            "extraHeaders" => self.session.extra_headers = value.to_string(),
            "resourceExpiresSeconds" => {
                self.resources.expires_secs =
                    value.trim().parse().map_err(|_| invalid("expected seconds"))?;
            }
            "useContentHashETag" => {
                self.resources.use_content_hash_etag =
                    value.trim().parse().map_err(|_| invalid("expected true or false"))?;
            }
            "apiPathPrefix" => self.api.path_prefix = value.trim().to_string(),
            "resourceSuffix" => {
                let suffix = value.trim();
                self.resources.suffix = (!suffix.is_empty()).then(|| suffix.to_string());
            }
            "staticFileFolder" => {
                let folder = value.trim();
                self.resources.static_folder = (!folder.is_empty()).then(|| folder.to_string());
            }
            _ => return Err(invalid("unknown property")),
        }
        Ok(())
    }
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
        }
    }
}

/// Timeout configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Request timeout (total time for request/response) in seconds.
    pub request_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self { request_secs: 30 }
    }
}

/// Session store configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Cookie name carrying the session id.
    pub id_key: String,

    /// Sliding expiration in seconds.
    pub ttl_secs: u64,

    /// Interval between expiry sweeps in seconds.
    pub sweep_period_secs: u64,

    /// Extra response headers, `key:value` pairs separated by `;`.
    pub extra_headers: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            id_key: "sid".to_string(),
            ttl_secs: 10 * 60,
            sweep_period_secs: 10,
            extra_headers: String::new(),
        }
    }
}

/// Resource cache gateway configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ResourceConfig {
    /// Path segment marking zone-scoped resources: `/<zone>/<route>/<path>`.
    pub route: String,

    /// Suffix tried after the plain path (e.g. ".html").
    pub suffix: Option<String>,

    /// Folder served by the static file provider.
    pub static_folder: Option<String>,

    /// Zone id used for unscoped lookups.
    pub default_zone: String,

    /// Client cache lifetime in seconds.
    pub expires_secs: u64,

    /// Use a SHA-256 content hash as ETag instead of the timestamp surrogate.
    pub use_content_hash_etag: bool,

    /// Enable gzip negotiation.
    pub enable_compression: bool,

    /// Smallest body worth compressing, in bytes.
    pub compression_min_bytes: u64,

    /// Largest body compressed in memory; bigger ones are streamed as is.
    pub compression_max_bytes: u64,

    /// Extra headers added to resource responses, same format as the session's.
    pub extra_headers: String,

    /// Attempts per lookup when the provider reports a transient error.
    pub resolve_attempts: u32,

    /// Base delay for resolve retries in milliseconds.
    pub retry_base_delay_ms: u64,
}

impl Default for ResourceConfig {
    fn default() -> Self {
        Self {
            route: "resource".to_string(),
            suffix: None,
            static_folder: None,
            default_zone: "0".to_string(),
            expires_secs: 86_400,
            use_content_hash_etag: false,
            enable_compression: true,
            compression_min_bytes: 1024,
            compression_max_bytes: 8 * 1024 * 1024,
            extra_headers: String::new(),
            resolve_attempts: 2,
            retry_base_delay_ms: 20,
        }
    }
}

/// API dispatch gateway configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ApiConfig {
    /// Request path prefix that engages the gateway.
    pub path_prefix: String,

    /// Maximum request body read for a node invocation.
    pub max_body_bytes: usize,

    /// Serializer profile: indented output instead of compact.
    pub pretty_json: bool,

    /// Language used when the request carries no preference.
    pub default_language: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            path_prefix: "/api/".to_string(),
            max_body_bytes: 2 * 1024 * 1024, // 2MB
            pretty_json: false,
            default_language: "en-US".to_string(),
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Log output format ("pretty" or "json").
    pub log_format: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: "pretty".to_string(),
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}
