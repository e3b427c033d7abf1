//! Configuration parsing and validation for keeperd
//!
//! Supports TOML configuration with:
//! - Versioned schema
//! - Daemon paths, monitor cadence, enforcement target, focus defaults
//! - Validation that reports every problem at once

mod config;
mod schema;
mod validation;

pub use config::*;
pub use schema::*;
pub use validation::*;

use std::path::Path;
use thiserror::Error;
use tracing::info;

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

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
pub fn load_config(path: impl AsRef<Path>) -> ConfigResult<Config> {
    let content = std::fs::read_to_string(path)?;
    parse_config(&content)
}

/// Like [`load_config`], but a missing file yields the defaults
pub fn load_config_or_default(path: impl AsRef<Path>) -> ConfigResult<Config> {
    let path = path.as_ref();
    if !path.exists() {
        info!(path = %path.display(), "No config file, using defaults");
        return Ok(Config::default());
    }
    load_config(path)
}

/// Parse and validate configuration from a TOML string
pub fn parse_config(content: &str) -> ConfigResult<Config> {
    let raw: RawConfig = toml::from_str(content)?;

    if raw.config_version != CURRENT_CONFIG_VERSION {
        return Err(ConfigError::UnsupportedVersion(raw.config_version));
    }

    let errors = validate_config(&raw);
    if !errors.is_empty() {
        return Err(ConfigError::ValidationFailed { errors });
    }

    Ok(Config::from_raw(raw))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn parse_minimal_config() {
        let config = parse_config("config_version = 1").unwrap();
        assert_eq!(config.monitor.poll_interval, Duration::from_secs(3));
        assert!(config.monitor.auto_kill);
        assert_eq!(config.enforcement.timeout, Duration::from_secs(5));
        assert_eq!(config.focus.default_target_minutes, 25);
    }

    #[test]
    fn parse_full_config() {
        let config = parse_config(
            r#"
            config_version = 1

            [daemon]
            socket_path = "/run/keeper/keeperd.sock"
            data_dir = "/var/lib/keeper"

            [monitor]
            poll_interval_seconds = 2
            auto_kill = false
            start_on_launch = true

            [enforcement]
            hosts_path = "/tmp/hosts"
            redirect_address = "0.0.0.0"
            timeout_seconds = 10

            [focus]
            default_target_minutes = 50
            "#,
        )
        .unwrap();

        assert_eq!(
            config.daemon.socket_path.to_str(),
            Some("/run/keeper/keeperd.sock")
        );
        assert_eq!(config.monitor.poll_interval, Duration::from_secs(2));
        assert!(!config.monitor.auto_kill);
        assert!(config.monitor.start_on_launch);
        assert_eq!(config.enforcement.redirect_address.to_string(), "0.0.0.0");
        assert_eq!(config.enforcement.timeout, Duration::from_secs(10));
        assert_eq!(config.focus.default_target_minutes, 50);
    }

    #[test]
    fn reject_wrong_version() {
        let result = parse_config("config_version = 99");
        assert!(matches!(result, Err(ConfigError::UnsupportedVersion(99))));
    }

    #[test]
    fn reject_unknown_section_key() {
        let result = parse_config(
            r#"
            config_version = 1
            [monitor]
            poll_every = 3
            "#,
        );
        assert!(matches!(result, Err(ConfigError::ParseError(_))));
    }

    #[test]
    fn reject_out_of_range_values() {
        let result = parse_config(
            r#"
            config_version = 1
            [monitor]
            poll_interval_seconds = 3600
            "#,
        );
        match result {
            Err(ConfigError::ValidationFailed { errors }) => assert_eq!(errors.len(), 1),
            other => panic!("expected validation failure, got {:?}", other),
        }
    }

    #[test]
    fn missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = load_config_or_default(dir.path().join("absent.toml")).unwrap();
        assert_eq!(config.focus.default_target_minutes, 25);
    }

    #[test]
    fn load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "config_version = 1\n[focus]\ndefault_target_minutes = 45\n")
            .unwrap();
        let config = load_config(&path).unwrap();
        assert_eq!(config.focus.default_target_minutes, 45);
    }
}
