//! Configuration loading from disk.

use std::fs;
use std::path::Path;

use thiserror::Error;

use crate::config::schema::PipelineConfig;
use crate::config::validation::{validate_config, ValidationError};

/// Error type for configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid property `{key}`: {reason}")]
    Property { key: String, reason: String },

    #[error("Validation failed: {}", join_errors(.0))]
    Validation(Vec<ValidationError>),
}

fn join_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Load and validate configuration from a TOML file.
pub fn load_config(path: &Path) -> Result<PipelineConfig, ConfigError> {
    let content = fs::read_to_string(path)?;
    let config: PipelineConfig = toml::from_str(&content)?;

    validate_config(&config).map_err(ConfigError::Validation)?;

    Ok(config)
}

/// Apply `key=value` overrides, then validate the result.
pub fn apply_overrides<'a, I>(mut config: PipelineConfig, overrides: I) -> Result<PipelineConfig, ConfigError>
where
    I: IntoIterator<Item = &'a str>,
{
    for entry in overrides {
        let (key, value) = entry.split_once('=').ok_or_else(|| ConfigError::Property {
            key: entry.to_string(),
            reason: "expected key=value".to_string(),
        })?;
        config.apply_property(key.trim(), value)?;
    }

    validate_config(&config).map_err(ConfigError::Validation)?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_config_from_file() {
        let path = std::env::temp_dir().join(format!("pipeline-{}.toml", uuid::Uuid::new_v4()));
        fs::write(
            &path,
            r#"
            [listener]
            bind_address = "127.0.0.1:9000"

            [session]
            id_key = "token"
            "#,
        )
        .unwrap();

        let config = load_config(&path).unwrap();
        assert_eq!(config.listener.bind_address, "127.0.0.1:9000");
        assert_eq!(config.session.id_key, "token");

        fs::remove_file(&path).unwrap_or_default();
    }

    #[test]
    fn test_load_config_reports_validation() {
        let path = std::env::temp_dir().join(format!("pipeline-{}.toml", uuid::Uuid::new_v4()));
        fs::write(&path, "[session]\nttl_secs = 0\n").unwrap();

        let err = load_config(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Validation(_)));

        fs::remove_file(&path).unwrap_or_default();
    }

    #[test]
    fn test_apply_overrides() {
        let config = apply_overrides(
            PipelineConfig::default(),
            ["apiPathPrefix=/rpc/", "extraHeaders=X-Frame-Options:DENY"],
        )
        .unwrap();
        assert_eq!(config.api.path_prefix, "/rpc/");
        assert_eq!(config.session.extra_headers, "X-Frame-Options:DENY");

        let err = apply_overrides(PipelineConfig::default(), ["apiPathPrefix"]).unwrap_err();
        assert!(matches!(err, ConfigError::Property { .. }));
    }
}
