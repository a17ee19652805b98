//! Runtime configuration for the sync entry points.
//!
//! # Responsibility
//! - Hold the retry schedule, freshness-token lifetime and availability.
//! - Parse JSON config with per-field defaults and reject unusable values.
//!
//! # Invariants
//! - A `SyncConfig` returned by `from_json_str` has passed `validate()`.

use crate::availability::Availability;
use crate::retry::RetryPolicy;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::Path;
use std::time::Duration;

const DEFAULT_TOKEN_TTL_SECS: u64 = 12 * 60 * 60;

/// Sync configuration loaded by the host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Backoff used while waiting for a just-submitted contact to appear.
    pub retry: RetryPolicy,
    /// Lifetime of issued freshness tokens.
    pub token_ttl_secs: u64,
    pub availability: Availability,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::default(),
            token_ttl_secs: DEFAULT_TOKEN_TTL_SECS,
            availability: Availability::default(),
        }
    }
}

impl SyncConfig {
    /// Parses and validates JSON config; absent fields take defaults.
    pub fn from_json_str(raw: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(raw).map_err(ConfigError::Parse)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads a JSON config file.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|err| ConfigError::Io {
            path: path.display().to_string(),
            source: err,
        })?;
        Self::from_json_str(&raw)
    }

    pub fn token_ttl(&self) -> Duration {
        Duration::from_secs(self.token_ttl_secs)
    }

    /// Rejects values that would make the retry loop or tokens useless.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let retry = &self.retry;
        if !retry.multiplier.is_finite() || retry.multiplier < 1.0 {
            return Err(ConfigError::Invalid(format!(
                "retry.multiplier must be a finite value >= 1.0, got {}",
                retry.multiplier
            )));
        }
        if retry.max_delay_ms < retry.initial_delay_ms {
            return Err(ConfigError::Invalid(format!(
                "retry.max_delay_ms ({}) must be >= retry.initial_delay_ms ({})",
                retry.max_delay_ms, retry.initial_delay_ms
            )));
        }
        if retry.timeout_ms > 0 && retry.max_delay_ms == 0 {
            return Err(ConfigError::Invalid(
                "retry.max_delay_ms must be > 0 when retry.timeout_ms is set".to_string(),
            ));
        }
        if self.token_ttl_secs == 0 {
            return Err(ConfigError::Invalid(
                "token_ttl_secs must be > 0".to_string(),
            ));
        }
        Ok(())
    }
}

/// Config load/validation errors.
#[derive(Debug)]
pub enum ConfigError {
    Io {
        path: String,
        source: std::io::Error,
    },
    Parse(serde_json::Error),
    Invalid(String),
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io { path, source } => write!(f, "failed to read config `{path}`: {source}"),
            Self::Parse(err) => write!(f, "invalid config JSON: {err}"),
            Self::Invalid(message) => write!(f, "invalid config: {message}"),
        }
    }
}

impl Error for ConfigError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            Self::Parse(err) => Some(err),
            Self::Invalid(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{ConfigError, SyncConfig};

    #[test]
    fn empty_object_yields_defaults() {
        let config = SyncConfig::from_json_str("{}").expect("empty config");
        assert_eq!(config, SyncConfig::default());
        assert_eq!(config.token_ttl().as_secs(), 43_200);
    }

    #[test]
    fn partial_sections_keep_remaining_defaults() {
        let config = SyncConfig::from_json_str(
            r#"{"retry": {"timeout_ms": 800}, "availability": {"platform": false}}"#,
        )
        .expect("partial config");
        assert_eq!(config.retry.timeout_ms, 800);
        assert_eq!(config.retry.initial_delay_ms, 250);
        assert!(config.availability.crm);
        assert!(!config.availability.platform);
    }

    #[test]
    fn rejects_shrinking_multiplier_and_zero_ttl() {
        let err = SyncConfig::from_json_str(r#"{"retry": {"multiplier": 0.5}}"#)
            .expect_err("multiplier < 1 must fail");
        assert!(matches!(err, ConfigError::Invalid(_)));

        let err = SyncConfig::from_json_str(r#"{"token_ttl_secs": 0}"#)
            .expect_err("zero ttl must fail");
        assert!(err.to_string().contains("token_ttl_secs"));
    }

    #[test]
    fn rejects_cap_below_initial_delay() {
        let err = SyncConfig::from_json_str(
            r#"{"retry": {"initial_delay_ms": 500, "max_delay_ms": 100}}"#,
        )
        .expect_err("cap below initial must fail");
        assert!(err.to_string().contains("max_delay_ms"));
    }

    #[test]
    fn malformed_json_is_a_parse_error() {
        let err = SyncConfig::from_json_str("{retry").expect_err("bad json");
        assert!(matches!(err, ConfigError::Parse(_)));
    }
}
