//! Engine configuration.
//!
//! Values come from serde (files, embedding applications) or from the
//! environment. Unset values fall back to defaults; present but invalid values
//! fail fast with a [`ConfigError`].

use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;
use thiserror::Error;

/// Environment variable for the loader worker pool size.
pub const ENV_FETCH_CONCURRENCY: &str = "BIZDESK_FETCH_CONCURRENCY";
/// Environment variable for the scan deadline in seconds.
pub const ENV_SCAN_TIMEOUT_SECS: &str = "BIZDESK_SCAN_TIMEOUT_SECS";
/// Environment variable for the stock reconciliation tolerance.
pub const ENV_STOCK_EPSILON: &str = "BIZDESK_STOCK_EPSILON";

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid value for {var}: {message}")]
    InvalidValue { var: String, message: String },
}

/// Configuration for the integrity engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntegrityConfig {
    /// Maximum number of entity fetches in flight at once.
    #[serde(default = "default_fetch_concurrency")]
    pub fetch_concurrency: usize,
    /// Deadline for a whole scan, in seconds.
    #[serde(default = "default_scan_timeout_secs")]
    pub scan_timeout_secs: u64,
    /// Absolute tolerance for stock reconciliation.
    #[serde(default = "default_stock_epsilon")]
    pub stock_epsilon: f64,
    /// Fields tried, in order, for a record's display label.
    #[serde(default = "default_label_fields")]
    pub label_fields: Vec<String>,
}

fn default_fetch_concurrency() -> usize {
    8
}

fn default_scan_timeout_secs() -> u64 {
    60
}

fn default_stock_epsilon() -> f64 {
    0.01
}

fn default_label_fields() -> Vec<String> {
    ["name", "description", "title", "reference", "code"]
        .iter()
        .map(ToString::to_string)
        .collect()
}

impl Default for IntegrityConfig {
    fn default() -> Self {
        Self {
            fetch_concurrency: default_fetch_concurrency(),
            scan_timeout_secs: default_scan_timeout_secs(),
            stock_epsilon: default_stock_epsilon(),
            label_fields: default_label_fields(),
        }
    }
}

impl IntegrityConfig {
    /// Load configuration from process environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Load configuration from an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(raw) = non_empty(lookup(ENV_FETCH_CONCURRENCY)) {
            config.fetch_concurrency = parse_var(ENV_FETCH_CONCURRENCY, &raw)?;
        }
        if let Some(raw) = non_empty(lookup(ENV_SCAN_TIMEOUT_SECS)) {
            config.scan_timeout_secs = parse_var(ENV_SCAN_TIMEOUT_SECS, &raw)?;
        }
        if let Some(raw) = non_empty(lookup(ENV_STOCK_EPSILON)) {
            config.stock_epsilon = parse_var(ENV_STOCK_EPSILON, &raw)?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Check value ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.fetch_concurrency == 0 {
            return Err(ConfigError::InvalidValue {
                var: ENV_FETCH_CONCURRENCY.to_string(),
                message: "must be at least 1".to_string(),
            });
        }
        if self.scan_timeout_secs == 0 {
            return Err(ConfigError::InvalidValue {
                var: ENV_SCAN_TIMEOUT_SECS.to_string(),
                message: "must be at least 1".to_string(),
            });
        }
        if !self.stock_epsilon.is_finite() || self.stock_epsilon < 0.0 {
            return Err(ConfigError::InvalidValue {
                var: ENV_STOCK_EPSILON.to_string(),
                message: format!("must be a non-negative number, got {}", self.stock_epsilon),
            });
        }
        Ok(())
    }

    /// The scan deadline as a duration.
    #[must_use]
    pub fn scan_timeout(&self) -> Duration {
        Duration::from_secs(self.scan_timeout_secs)
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

fn parse_var<T>(var: &str, raw: &str) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim().parse().map_err(|e: T::Err| ConfigError::InvalidValue {
        var: var.to_string(),
        message: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn test_integrity_config_default() {
        let config = IntegrityConfig::default();
        assert_eq!(config.fetch_concurrency, 8);
        assert_eq!(config.scan_timeout_secs, 60);
        assert!((config.stock_epsilon - 0.01).abs() < f64::EPSILON);
        assert_eq!(config.label_fields[0], "name");
    }

    #[test]
    fn test_from_lookup_overrides() {
        let config = IntegrityConfig::from_lookup(lookup(&[
            (ENV_FETCH_CONCURRENCY, "2"),
            (ENV_SCAN_TIMEOUT_SECS, " 15 "),
            (ENV_STOCK_EPSILON, "0.5"),
        ]))
        .unwrap();
        assert_eq!(config.fetch_concurrency, 2);
        assert_eq!(config.scan_timeout(), Duration::from_secs(15));
        assert!((config.stock_epsilon - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn test_from_lookup_blank_uses_default() {
        let config = IntegrityConfig::from_lookup(lookup(&[(ENV_FETCH_CONCURRENCY, "")])).unwrap();
        assert_eq!(config.fetch_concurrency, 8);
    }

    #[test]
    fn test_from_lookup_rejects_garbage() {
        let err = IntegrityConfig::from_lookup(lookup(&[(ENV_SCAN_TIMEOUT_SECS, "soon")]))
            .unwrap_err();
        assert!(err.to_string().contains(ENV_SCAN_TIMEOUT_SECS));
    }

    #[test]
    fn test_validate_rejects_zero_concurrency() {
        let err = IntegrityConfig::from_lookup(lookup(&[(ENV_FETCH_CONCURRENCY, "0")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { .. }));
    }

    #[test]
    fn test_validate_rejects_negative_epsilon() {
        let config = IntegrityConfig {
            stock_epsilon: -1.0,
            ..IntegrityConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_deserialize_partial() {
        let config: IntegrityConfig =
            serde_json::from_str(r#"{"fetch_concurrency": 3}"#).unwrap();
        assert_eq!(config.fetch_concurrency, 3);
        assert_eq!(config.scan_timeout_secs, 60);
    }
}
