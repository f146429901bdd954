//! Transport configuration for a session.
//!
//! [`SessionConfig`] deserializes from the `[session]` table of the CLI config
//! file; every field is optional there and falls back to the defaults below.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default HTTP connect timeout (30 seconds).
pub const CONNECT_TIMEOUT_SECS: u64 = 30;

/// Default HTTP read timeout (5 minutes for large files).
pub const READ_TIMEOUT_SECS: u64 = 300;

/// Default redirect hop limit when redirects are followed.
pub const DEFAULT_MAX_REDIRECTS: usize = 30;

/// Default base delay between connect retries, in milliseconds.
pub const DEFAULT_RETRY_BASE_DELAY_MS: u64 = 100;

/// Default idle connections kept per host.
pub const DEFAULT_POOL_MAX_IDLE_PER_HOST: usize = 32;

/// Invalid configuration value.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A numeric setting is outside its accepted range.
    #[error("invalid config value for `{field}`: {value}. Expected range: {min}..={max}")]
    OutOfRange {
        /// Setting name as written in the config file.
        field: &'static str,
        /// The rejected value.
        value: u64,
        /// Smallest accepted value.
        min: u64,
        /// Largest accepted value.
        max: u64,
    },
}

/// Settings applied to every client a session builds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SessionConfig {
    /// Connect timeout in seconds.
    pub connect_timeout_secs: u64,
    /// Whole-request timeout in seconds (per-call timeouts may shorten it).
    pub read_timeout_secs: u64,
    /// Verify TLS certificates.
    pub verify_tls: bool,
    /// Redirect hop limit for calls that follow redirects.
    pub max_redirects: usize,
    /// Connect-failure retries for both `http` and `https`.
    pub max_retries: u32,
    /// Base backoff between retries in milliseconds.
    pub retry_base_delay_ms: u64,
    /// Idle pooled connections kept per host.
    pub pool_max_idle_per_host: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            connect_timeout_secs: CONNECT_TIMEOUT_SECS,
            read_timeout_secs: READ_TIMEOUT_SECS,
            verify_tls: true,
            max_redirects: DEFAULT_MAX_REDIRECTS,
            max_retries: crate::request::DEFAULT_MAX_RETRIES,
            retry_base_delay_ms: DEFAULT_RETRY_BASE_DELAY_MS,
            pool_max_idle_per_host: DEFAULT_POOL_MAX_IDLE_PER_HOST,
        }
    }
}

impl SessionConfig {
    /// Checks every value against its accepted range.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::OutOfRange`] for the first offending field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        check_range("connect_timeout_secs", self.connect_timeout_secs, 1, 3600)?;
        check_range("read_timeout_secs", self.read_timeout_secs, 1, 3600)?;
        check_range("max_redirects", self.max_redirects as u64, 0, 100)?;
        check_range("max_retries", u64::from(self.max_retries), 0, 10)?;
        check_range("retry_base_delay_ms", self.retry_base_delay_ms, 0, 60_000)?;
        check_range(
            "pool_max_idle_per_host",
            self.pool_max_idle_per_host as u64,
            0,
            1024,
        )?;
        Ok(())
    }

    /// Connect timeout as a [`Duration`].
    #[must_use]
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    /// Read timeout as a [`Duration`].
    #[must_use]
    pub fn read_timeout(&self) -> Duration {
        Duration::from_secs(self.read_timeout_secs)
    }

    /// Retry base delay as a [`Duration`].
    #[must_use]
    pub fn retry_base_delay(&self) -> Duration {
        Duration::from_millis(self.retry_base_delay_ms)
    }
}

fn check_range(field: &'static str, value: u64, min: u64, max: u64) -> Result<(), ConfigError> {
    if (min..=max).contains(&value) {
        Ok(())
    } else {
        Err(ConfigError::OutOfRange {
            field,
            value,
            min,
            max,
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = SessionConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.max_retries, 3);
        assert!(config.verify_tls);
        assert_eq!(config.read_timeout(), Duration::from_secs(300));
    }

    #[test]
    fn test_zero_timeout_rejected() {
        let config = SessionConfig {
            connect_timeout_secs: 0,
            ..SessionConfig::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("connect_timeout_secs"), "got: {err}");
    }

    #[test]
    fn test_too_many_retries_rejected() {
        let config = SessionConfig {
            max_retries: 11,
            ..SessionConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::OutOfRange {
                field: "max_retries",
                ..
            })
        ));
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: SessionConfig = toml::from_str("verify_tls = false\nmax_retries = 1\n").unwrap();
        assert!(!config.verify_tls);
        assert_eq!(config.max_retries, 1);
        assert_eq!(config.connect_timeout_secs, CONNECT_TIMEOUT_SECS);
    }

    #[test]
    fn test_unknown_toml_key_rejected() {
        let result: Result<SessionConfig, _> = toml::from_str("retries = 2\n");
        assert!(result.is_err());
    }
}
