//! Engine configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::RetryPolicy;

/// Configuration errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for {key}: {value}")]
    InvalidValue { key: &'static str, value: String },

    #[error("{0}")]
    Invalid(String),
}

/// Configuration for engine behavior.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Attempts allowed per job before it fails terminally.
    pub max_attempts: u32,
    /// Number of concurrent workers.
    pub workers: u32,
    /// Timeout for a single backend call (milliseconds).
    pub job_timeout_ms: u64,
    /// Backoff base (milliseconds).
    pub retry_base_ms: u64,
    /// Backoff cap (milliseconds).
    pub retry_max_delay_ms: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            workers: 4,
            job_timeout_ms: 300_000,
            retry_base_ms: 1_000,
            retry_max_delay_ms: 60_000,
        }
    }
}

impl EngineConfig {
    /// Defaults overridden by `JOBS_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup (used by `from_env`).
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(v) = lookup("JOBS_MAX_ATTEMPTS") {
            config.max_attempts = parse("JOBS_MAX_ATTEMPTS", &v)?;
        }
        if let Some(v) = lookup("JOBS_WORKERS") {
            config.workers = parse("JOBS_WORKERS", &v)?;
        }
        if let Some(v) = lookup("JOBS_TIMEOUT_MS") {
            config.job_timeout_ms = parse("JOBS_TIMEOUT_MS", &v)?;
        }
        if let Some(v) = lookup("JOBS_RETRY_BASE_MS") {
            config.retry_base_ms = parse("JOBS_RETRY_BASE_MS", &v)?;
        }
        if let Some(v) = lookup("JOBS_RETRY_MAX_DELAY_MS") {
            config.retry_max_delay_ms = parse("JOBS_RETRY_MAX_DELAY_MS", &v)?;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_attempts == 0 {
            return Err(ConfigError::Invalid("max_attempts must be at least 1".into()));
        }
        if self.workers == 0 {
            return Err(ConfigError::Invalid("workers must be at least 1".into()));
        }
        if self.job_timeout_ms == 0 {
            return Err(ConfigError::Invalid("job_timeout_ms must be positive".into()));
        }
        if self.retry_max_delay_ms < self.retry_base_ms {
            return Err(ConfigError::Invalid(
                "retry_max_delay_ms must not be below retry_base_ms".into(),
            ));
        }
        Ok(())
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    pub fn with_workers(mut self, workers: u32) -> Self {
        self.workers = workers;
        self
    }

    pub fn with_job_timeout(mut self, timeout: Duration) -> Self {
        self.job_timeout_ms = (timeout.as_millis() as u64).max(1);
        self
    }

    /// Set backoff base and cap.
    pub fn with_backoff(mut self, base: Duration, max_delay: Duration) -> Self {
        self.retry_base_ms = base.as_millis() as u64;
        self.retry_max_delay_ms = max_delay.as_millis() as u64;
        self
    }

    pub fn job_timeout(&self) -> Duration {
        Duration::from_millis(self.job_timeout_ms)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            Duration::from_millis(self.retry_base_ms),
            Duration::from_millis(self.retry_max_delay_ms),
        )
    }
}

fn parse<T: std::str::FromStr>(key: &'static str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidValue {
        key,
        value: value.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_apply_without_overrides() {
        let config = EngineConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config, EngineConfig::default());
        assert_eq!(config.retry_policy(), RetryPolicy::default());
        assert_eq!(config.job_timeout(), Duration::from_secs(300));
    }

    #[test]
    fn overrides_are_parsed() {
        let config = EngineConfig::from_lookup(lookup(&[
            ("JOBS_MAX_ATTEMPTS", "5"),
            ("JOBS_WORKERS", " 2 "),
            ("JOBS_RETRY_BASE_MS", "10"),
            ("JOBS_RETRY_MAX_DELAY_MS", "100"),
        ]))
        .unwrap();

        assert_eq!(config.max_attempts, 5);
        assert_eq!(config.workers, 2);
        assert_eq!(config.retry_policy().next_delay(10), Duration::from_millis(100));
    }

    #[test]
    fn bad_values_are_rejected() {
        let err = EngineConfig::from_lookup(lookup(&[("JOBS_WORKERS", "many")])).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { key: "JOBS_WORKERS", .. }));

        let err = EngineConfig::from_lookup(lookup(&[("JOBS_MAX_ATTEMPTS", "0")])).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn partial_json_fills_defaults() {
        let config: EngineConfig = serde_json::from_str(r#"{"workers": 1}"#).unwrap();
        assert_eq!(config.workers, 1);
        assert_eq!(config.max_attempts, 3);
    }
}
