//! Configuration validation

use crate::schema::RawConfig;
use std::net::IpAddr;
use thiserror::Error;

/// Validation error
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("{field}: {message}")]
    FieldError { field: String, message: String },
}

impl ValidationError {
    fn field(field: &str, message: impl Into<String>) -> Self {
        Self::FieldError {
            field: field.to_string(),
            message: message.into(),
        }
    }
}

pub const POLL_INTERVAL_RANGE: std::ops::RangeInclusive<u64> = 1..=60;
pub const ENFORCEMENT_TIMEOUT_RANGE: std::ops::RangeInclusive<u64> = 1..=120;
pub const TARGET_MINUTES_RANGE: std::ops::RangeInclusive<u32> = 1..=1440;

/// Validate a raw configuration, collecting every error
pub fn validate_config(config: &RawConfig) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    if let Some(secs) = config.monitor.poll_interval_seconds
        && !POLL_INTERVAL_RANGE.contains(&secs)
    {
        errors.push(ValidationError::field(
            "monitor.poll_interval_seconds",
            format!(
                "{} is outside {}..={}",
                secs,
                POLL_INTERVAL_RANGE.start(),
                POLL_INTERVAL_RANGE.end()
            ),
        ));
    }

    if let Some(secs) = config.enforcement.timeout_seconds
        && !ENFORCEMENT_TIMEOUT_RANGE.contains(&secs)
    {
        errors.push(ValidationError::field(
            "enforcement.timeout_seconds",
            format!(
                "{} is outside {}..={}",
                secs,
                ENFORCEMENT_TIMEOUT_RANGE.start(),
                ENFORCEMENT_TIMEOUT_RANGE.end()
            ),
        ));
    }

    if let Some(addr) = &config.enforcement.redirect_address
        && addr.parse::<IpAddr>().is_err()
    {
        errors.push(ValidationError::field(
            "enforcement.redirect_address",
            format!("'{}' is not an IP address", addr),
        ));
    }

    if let Some(path) = &config.enforcement.hosts_path
        && path.as_os_str().is_empty()
    {
        errors.push(ValidationError::field(
            "enforcement.hosts_path",
            "cannot be empty",
        ));
    }

    if let Some(minutes) = config.focus.default_target_minutes
        && !TARGET_MINUTES_RANGE.contains(&minutes)
    {
        errors.push(ValidationError::field(
            "focus.default_target_minutes",
            format!(
                "{} is outside {}..={}",
                minutes,
                TARGET_MINUTES_RANGE.start(),
                TARGET_MINUTES_RANGE.end()
            ),
        ));
    }

    errors
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::*;

    fn base() -> RawConfig {
        RawConfig {
            config_version: 1,
            daemon: RawDaemonConfig::default(),
            monitor: RawMonitorConfig::default(),
            enforcement: RawEnforcementConfig::default(),
            focus: RawFocusConfig::default(),
        }
    }

    #[test]
    fn empty_config_is_valid() {
        assert!(validate_config(&base()).is_empty());
    }

    #[test]
    fn all_errors_are_reported() {
        let mut config = base();
        config.monitor.poll_interval_seconds = Some(0);
        config.enforcement.timeout_seconds = Some(600);
        config.enforcement.redirect_address = Some("localhost".into());
        config.focus.default_target_minutes = Some(0);

        let errors = validate_config(&config);
        assert_eq!(errors.len(), 4);
        assert!(errors[0].to_string().starts_with("monitor.poll_interval_seconds"));
    }

    #[test]
    fn ipv6_redirect_is_accepted() {
        let mut config = base();
        config.enforcement.redirect_address = Some("::1".into());
        assert!(validate_config(&config).is_empty());
    }
}
