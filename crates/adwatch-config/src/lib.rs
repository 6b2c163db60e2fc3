//! Configuration parsing and validation for adwatchd
//!
//! Supports TOML configuration with:
//! - Versioned schema
//! - Service settings (listen address, data directory, session mode)
//! - Watch rules (cooldown, rate limit, session TTL, retry budget)
//! - The ad catalog
//! - Validation with clear error messages

mod policy;
mod schema;
mod validation;

pub use policy::*;
pub use schema::*;
pub use validation::*;

use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {}: {source}", path.display())]
    ReadError {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse TOML: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Validation failed: {errors:?}")]
    ValidationFailed { errors: Vec<ValidationError> },

    #[error("Unsupported config version: {0}")]
    UnsupportedVersion(u32),
}

pub type ConfigResult<T> = Result<T, ConfigError>;

/// Current supported config version
pub const CURRENT_CONFIG_VERSION: u32 = 1;

/// Load and validate configuration from a TOML file
pub fn load_config(path: impl AsRef<Path>) -> ConfigResult<Policy> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::ReadError {
        path: path.to_path_buf(),
        source,
    })?;
    parse_config(&content)
}

/// Parse and validate configuration from a TOML string
pub fn parse_config(content: &str) -> ConfigResult<Policy> {
    let raw: RawConfig = toml::from_str(content)?;

    if raw.config_version != CURRENT_CONFIG_VERSION {
        return Err(ConfigError::UnsupportedVersion(raw.config_version));
    }

    let errors = validate_config(&raw);
    if !errors.is_empty() {
        return Err(ConfigError::ValidationFailed { errors });
    }

    let policy = Policy::from_raw(raw);
    debug!(ad_count = policy.ads.len(), "Configuration parsed");
    Ok(policy)
}

#[cfg(test)]
mod tests {
    use super::*;
    use adwatch_api::SessionMode;
    use adwatch_util::{AdId, Amount};
    use std::io::Write;

    #[test]
    fn parse_minimal_config() {
        let config = r#"
            config_version = 1

            [[ads]]
            id = 1
            title = "Intro video"
            category = "video"
            reward = "0.5000"
            duration_seconds = 30
        "#;

        let policy = parse_config(config).unwrap();
        assert_eq!(policy.ads.len(), 1);
        assert_eq!(policy.service.session_mode, SessionMode::Durable);

        let ad = &policy.ads[0];
        assert_eq!(ad.id, AdId::new(1));
        assert_eq!(ad.reward, Amount::from_units(5000));
    }

    #[test]
    fn reject_wrong_version() {
        let config = r#"
            config_version = 99
        "#;

        let result = parse_config(config);
        assert!(matches!(result, Err(ConfigError::UnsupportedVersion(99))));
    }

    #[test]
    fn reject_invalid_catalog() {
        let config = r#"
            config_version = 1

            [[ads]]
            id = 1
            title = "Free money"
            category = "video"
            reward = "-1"
            duration_seconds = 30
        "#;

        let result = parse_config(config);
        assert!(matches!(result, Err(ConfigError::ValidationFailed { .. })));
    }

    #[test]
    fn reject_unbounded_cooldown() {
        let config = r#"
            config_version = 1

            [watch]
            cooldown_seconds = 9223372036854775807
        "#;

        match parse_config(config) {
            Err(ConfigError::ValidationFailed { errors }) => {
                assert_eq!(errors.len(), 1);
                assert!(errors[0].to_string().contains("cooldown_seconds"));
            }
            other => panic!("expected validation failure, got {:?}", other.map(|p| p.watch)),
        }
    }

    #[test]
    fn load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
            config_version = 1

            [service]
            listen_addr = "0.0.0.0:9090"
            session_mode = "ephemeral"

            [watch]
            cooldown_seconds = 60
            "#
        )
        .unwrap();

        let policy = load_config(file.path()).unwrap();
        assert_eq!(policy.service.listen_addr.port(), 9090);
        assert_eq!(policy.service.session_mode, SessionMode::Ephemeral);
        assert_eq!(policy.watch.cooldown.period.as_secs(), 60);
        assert!(policy.ads.is_empty());
    }

    #[test]
    fn missing_file_names_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.toml");

        match load_config(&path) {
            Err(ConfigError::ReadError { path: reported, .. }) => assert_eq!(reported, path),
            other => panic!("expected read error, got {:?}", other.map(|p| p.ads.len())),
        }
    }
}
