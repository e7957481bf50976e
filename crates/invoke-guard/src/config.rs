//! Flat, serde-loadable configuration.
//!
//! [`ServiceConfig`] describes the resilience settings for one remote
//! service. [`InvokerConfig`] adds the shared cache settings and maps
//! service ids to their configs. Both load from JSON and can be overlaid
//! from environment variables named `<PREFIX>_<FIELD>` in upper case, for
//! example `LLM_CACHE_TTL_SECONDS=600`.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use invoke_guard_cache::MAX_TTL;
use invoke_guard_ratelimiter::AcquireMode;
use invoke_guard_retry::RetryPolicy;

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The JSON could not be parsed.
    #[error("invalid configuration: {0}")]
    Parse(#[from] serde_json::Error),

    /// The configuration file could not be read.
    #[error("failed to read configuration: {0}")]
    Io(#[from] std::io::Error),

    /// An environment variable held a value of the wrong type.
    #[error("environment variable {key} has invalid value '{value}'")]
    InvalidEnv {
        /// Variable name.
        key: String,
        /// Offending value.
        value: String,
    },

    /// A field is out of range.
    #[error("invalid value for {field}: {reason}")]
    Invalid {
        /// Field name.
        field: &'static str,
        /// What is wrong with it.
        reason: String,
    },

    /// A service id was registered twice.
    #[error("service '{0}' is already registered")]
    DuplicateService(String),

    /// A configured service has no remote-call collaborator.
    #[error("no remote call provided for service '{0}'")]
    MissingRemote(String),

    /// The persistent cache directory could not be opened.
    #[error("failed to open cache directory: {0}")]
    Cache(#[from] invoke_guard_cache::CacheError),
}

/// How the rate limiter behaves when the bucket is empty.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RateLimitMode {
    /// Reject at once.
    #[default]
    FailFast,
    /// Wait for tokens.
    Block,
}

impl FromStr for RateLimitMode {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "fail_fast" | "failfast" => Ok(RateLimitMode::FailFast),
            "block" => Ok(RateLimitMode::Block),
            _ => Err(()),
        }
    }
}

/// Resilience settings for one remote service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// Default time-to-live for cached responses, in seconds.
    pub cache_ttl_seconds: u64,
    /// Per-operation TTL overrides, in seconds.
    pub cache_ttl_overrides: HashMap<String, u64>,
    /// Bucket capacity.
    pub rate_limit_capacity: u32,
    /// Tokens added per second.
    pub rate_limit_refill_per_second: f64,
    /// Default admission behavior.
    pub rate_limit_mode: RateLimitMode,
    /// Longest wait in block mode, in milliseconds. Unset waits as long as needed.
    pub rate_limit_block_timeout_ms: Option<u64>,
    /// Consecutive failures that open the breaker.
    pub breaker_failure_threshold: u32,
    /// Seconds the breaker stays open before a trial.
    pub breaker_open_timeout_seconds: u64,
    /// Total attempts per call, including the first.
    pub retry_max_attempts: usize,
    /// Delay after the first failure, in milliseconds.
    pub retry_base_delay_ms: u64,
    /// Cap on the backoff delay, in milliseconds.
    pub retry_max_delay_ms: u64,
    /// Jitter as a fraction of the delay.
    pub retry_jitter_fraction: f64,
    /// Overall retry budget, in milliseconds.
    pub retry_max_elapsed_ms: Option<u64>,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            cache_ttl_seconds: 3600,
            cache_ttl_overrides: HashMap::new(),
            rate_limit_capacity: 100,
            rate_limit_refill_per_second: 100.0 / 3600.0,
            rate_limit_mode: RateLimitMode::FailFast,
            rate_limit_block_timeout_ms: None,
            breaker_failure_threshold: 5,
            breaker_open_timeout_seconds: 300,
            retry_max_attempts: 3,
            retry_base_delay_ms: 1000,
            retry_max_delay_ms: 30_000,
            retry_jitter_fraction: 0.1,
            retry_max_elapsed_ms: None,
        }
    }
}

fn parse_env<T: FromStr>(key: &str, value: String) -> Result<T, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::InvalidEnv {
            key: key.to_string(),
            value,
        })
}

impl ServiceConfig {
    /// Parses a config from JSON. Missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Overlays `<PREFIX>_<FIELD>` variables from the process environment.
    pub fn apply_env(&mut self, prefix: &str) -> Result<(), ConfigError> {
        self.apply_env_with(prefix, |key| std::env::var(key).ok())
    }

    /// Overlays variables obtained from `lookup`.
    ///
    /// `cache_ttl_overrides` is not overlaid.
    pub fn apply_env_with<F>(&mut self, prefix: &str, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let prefix = prefix.trim_end_matches('_').to_ascii_uppercase();
        let var = |field: &str| {
            let key = format!("{prefix}_{}", field.to_ascii_uppercase());
            lookup(&key).map(|value| (key, value))
        };

        if let Some((k, v)) = var("cache_ttl_seconds") {
            self.cache_ttl_seconds = parse_env(&k, v)?;
        }
        if let Some((k, v)) = var("rate_limit_capacity") {
            self.rate_limit_capacity = parse_env(&k, v)?;
        }
        if let Some((k, v)) = var("rate_limit_refill_per_second") {
            self.rate_limit_refill_per_second = parse_env(&k, v)?;
        }
        if let Some((k, v)) = var("rate_limit_mode") {
            self.rate_limit_mode = parse_env(&k, v)?;
        }
        if let Some((k, v)) = var("rate_limit_block_timeout_ms") {
            self.rate_limit_block_timeout_ms = Some(parse_env(&k, v)?);
        }
        if let Some((k, v)) = var("breaker_failure_threshold") {
            self.breaker_failure_threshold = parse_env(&k, v)?;
        }
        if let Some((k, v)) = var("breaker_open_timeout_seconds") {
            self.breaker_open_timeout_seconds = parse_env(&k, v)?;
        }
        if let Some((k, v)) = var("retry_max_attempts") {
            self.retry_max_attempts = parse_env(&k, v)?;
        }
        if let Some((k, v)) = var("retry_base_delay_ms") {
            self.retry_base_delay_ms = parse_env(&k, v)?;
        }
        if let Some((k, v)) = var("retry_max_delay_ms") {
            self.retry_max_delay_ms = parse_env(&k, v)?;
        }
        if let Some((k, v)) = var("retry_jitter_fraction") {
            self.retry_jitter_fraction = parse_env(&k, v)?;
        }
        if let Some((k, v)) = var("retry_max_elapsed_ms") {
            self.retry_max_elapsed_ms = Some(parse_env(&k, v)?);
        }

        self.validate()
    }

    /// Checks that every field is in range.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let max_ttl = MAX_TTL.as_secs();
        if self.cache_ttl_seconds > max_ttl {
            return Err(ConfigError::Invalid {
                field: "cache_ttl_seconds",
                reason: format!("{} exceeds the maximum of {max_ttl}", self.cache_ttl_seconds),
            });
        }
        if let Some((op, secs)) = self
            .cache_ttl_overrides
            .iter()
            .find(|(_, secs)| **secs > max_ttl)
        {
            return Err(ConfigError::Invalid {
                field: "cache_ttl_overrides",
                reason: format!("{secs} for '{op}' exceeds the maximum of {max_ttl}"),
            });
        }
        if self.rate_limit_capacity == 0 {
            return Err(ConfigError::Invalid {
                field: "rate_limit_capacity",
                reason: "must be at least 1".to_string(),
            });
        }
        if !self.rate_limit_refill_per_second.is_finite() || self.rate_limit_refill_per_second < 0.0
        {
            return Err(ConfigError::Invalid {
                field: "rate_limit_refill_per_second",
                reason: format!("{} is not a non-negative rate", self.rate_limit_refill_per_second),
            });
        }
        if self.breaker_failure_threshold == 0 {
            return Err(ConfigError::Invalid {
                field: "breaker_failure_threshold",
                reason: "must be at least 1".to_string(),
            });
        }
        if self.retry_max_attempts == 0 {
            return Err(ConfigError::Invalid {
                field: "retry_max_attempts",
                reason: "must be at least 1".to_string(),
            });
        }
        if !(0.0..=1.0).contains(&self.retry_jitter_fraction) {
            return Err(ConfigError::Invalid {
                field: "retry_jitter_fraction",
                reason: format!("{} is outside 0.0..=1.0", self.retry_jitter_fraction),
            });
        }
        if self.retry_max_delay_ms < self.retry_base_delay_ms {
            return Err(ConfigError::Invalid {
                field: "retry_max_delay_ms",
                reason: "must not be below retry_base_delay_ms".to_string(),
            });
        }
        Ok(())
    }

    /// TTL for `operation`, honoring per-operation overrides.
    pub fn ttl_for(&self, operation: &str) -> Duration {
        let secs = self
            .cache_ttl_overrides
            .get(operation)
            .copied()
            .unwrap_or(self.cache_ttl_seconds);
        Duration::from_secs(secs)
    }

    /// Admission mode described by the rate-limit fields.
    pub fn acquire_mode(&self) -> AcquireMode {
        match self.rate_limit_mode {
            RateLimitMode::FailFast => AcquireMode::FailFast,
            RateLimitMode::Block => AcquireMode::Block {
                timeout: self.rate_limit_block_timeout_ms.map(Duration::from_millis),
            },
        }
    }

    /// Retry policy described by the retry fields.
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.retry_max_attempts,
            base_delay: Duration::from_millis(self.retry_base_delay_ms),
            max_delay: Duration::from_millis(self.retry_max_delay_ms),
            jitter_fraction: self.retry_jitter_fraction,
            max_elapsed: self.retry_max_elapsed_ms.map(Duration::from_millis),
        }
    }

    /// How long the breaker stays open.
    pub fn open_timeout(&self) -> Duration {
        Duration::from_secs(self.breaker_open_timeout_seconds)
    }
}

/// Settings for a whole [`Invoker`](crate::Invoker).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InvokerConfig {
    /// In-memory entry limit. Zero means unbounded.
    pub max_entries: usize,
    /// Seconds between background sweeps of expired entries. Zero disables them.
    pub sweep_interval_seconds: u64,
    /// Directory for persisted cache records. Unset keeps the cache in memory only.
    pub persist_dir: Option<PathBuf>,
    /// Per-service settings keyed by service id.
    pub services: BTreeMap<String, ServiceConfig>,
}

impl Default for InvokerConfig {
    fn default() -> Self {
        Self {
            max_entries: 10_000,
            sweep_interval_seconds: 60,
            persist_dir: None,
            services: BTreeMap::new(),
        }
    }
}

impl InvokerConfig {
    /// Parses a config from JSON and validates every service.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        for service in config.services.values() {
            service.validate()?;
        }
        Ok(config)
    }

    /// Reads and parses a JSON file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    /// Overlays each service from variables prefixed with its upper-cased id.
    pub fn apply_env(&mut self) -> Result<(), ConfigError> {
        for (id, service) in self.services.iter_mut() {
            let prefix = id.replace(['-', '.'], "_");
            service.apply_env(&prefix)?;
        }
        Ok(())
    }

    /// Sweep interval, or `None` when sweeping is disabled.
    pub fn sweep_interval(&self) -> Option<Duration> {
        (self.sweep_interval_seconds > 0).then(|| Duration::from_secs(self.sweep_interval_seconds))
    }
}
