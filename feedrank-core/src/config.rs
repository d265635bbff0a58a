use crate::{ConfigError, UserId};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Tuning for the feed engine, loaded from TOML. Every field has a default,
/// so an empty document is a valid configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeedConfig {
    pub cache: CacheConfig,
    pub retry: RetryConfig,
    pub circuit_breaker: CircuitBreakerConfig,
    pub aggregation: AggregationConfig,
    pub candidates: CandidateConfig,
    pub suggestions: SuggestionConfig,
    pub fallback: FallbackConfig,
    pub warmer: WarmerConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub ttl_secs: u64,
    pub max_entries: usize,
    /// Serialize concurrent misses on the same key.
    pub coalesce_misses: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_secs: 300,
            max_entries: 10_000,
            coalesce_misses: false,
        }
    }
}

impl CacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Maximum number of attempts, including the first
    pub max_attempts: u32,
    /// Base delay for exponential backoff (in milliseconds)
    pub base_delay_ms: u64,
    /// Maximum delay between retries (in milliseconds)
    pub max_delay_ms: u64,
    /// Multiplier for exponential backoff
    pub backoff_multiplier: f64,
    /// Maximum jitter factor (0.0 to 1.0)
    pub jitter_factor: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 100,
            max_delay_ms: 2_000,
            backoff_multiplier: 2.0,
            jitter_factor: 0.1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CircuitBreakerConfig {
    /// Failure rate in (0, 1] at which the breaker opens
    pub failure_rate_threshold: f64,
    /// Sliding window over which outcomes are counted
    pub window_secs: u64,
    /// Outcomes required in the window before the rate is trusted
    pub minimum_calls: usize,
    /// How long the breaker stays open before a trial call
    pub open_secs: u64,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_rate_threshold: 0.5,
            window_secs: 60,
            minimum_calls: 5,
            open_secs: 30,
        }
    }
}

impl CircuitBreakerConfig {
    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_secs)
    }

    pub fn open_duration(&self) -> Duration {
        Duration::from_secs(self.open_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AggregationConfig {
    pub deadline_ms: u64,
    pub history_limit: usize,
}

impl Default for AggregationConfig {
    fn default() -> Self {
        Self {
            deadline_ms: 2_000,
            history_limit: 100,
        }
    }
}

impl AggregationConfig {
    pub fn deadline(&self) -> Duration {
        Duration::from_millis(self.deadline_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CandidateConfig {
    pub overfetch_factor: usize,
}

impl Default for CandidateConfig {
    fn default() -> Self {
        Self {
            overfetch_factor: 3,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SuggestionConfig {
    /// At most five accounts are ever suggested.
    pub max_suggestions: usize,
    pub posts_per_community: usize,
    /// Distinct authors looked up per request before ranking.
    pub max_candidates: usize,
    pub max_common_interests: usize,
}

impl Default for SuggestionConfig {
    fn default() -> Self {
        Self {
            max_suggestions: 5,
            posts_per_community: 25,
            max_candidates: 25,
            max_common_interests: 3,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FallbackConfig {
    pub score: f64,
}

impl Default for FallbackConfig {
    fn default() -> Self {
        Self { score: 1.0 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WarmerConfig {
    pub interval_secs: u64,
    pub user_ids: Vec<UserId>,
    pub limit: u32,
}

impl Default for WarmerConfig {
    fn default() -> Self {
        Self {
            interval_secs: 120,
            user_ids: Vec::new(),
            limit: 20,
        }
    }
}

impl WarmerConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

const MAX_SUGGESTIONS: usize = 5;

impl FeedConfig {
    pub fn from_toml_str(source: &str) -> Result<Self, ConfigError> {
        let config: FeedConfig = toml::from_str(source)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path).map_err(|_| ConfigError::FileNotFound {
            path: path.display().to_string(),
        })?;
        Self::from_toml_str(&source)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        fn invalid(field: &str, value: impl ToString) -> ConfigError {
            ConfigError::InvalidValue {
                field: field.to_string(),
                value: value.to_string(),
            }
        }

        if self.cache.max_entries == 0 {
            return Err(invalid("cache.max_entries", self.cache.max_entries));
        }
        if self.retry.max_attempts == 0 {
            return Err(invalid("retry.max_attempts", self.retry.max_attempts));
        }
        if self.retry.backoff_multiplier < 1.0 {
            return Err(invalid(
                "retry.backoff_multiplier",
                self.retry.backoff_multiplier,
            ));
        }
        if !(0.0..=1.0).contains(&self.retry.jitter_factor) {
            return Err(invalid("retry.jitter_factor", self.retry.jitter_factor));
        }
        let threshold = self.circuit_breaker.failure_rate_threshold;
        if !(threshold > 0.0 && threshold <= 1.0) {
            return Err(invalid("circuit_breaker.failure_rate_threshold", threshold));
        }
        if self.circuit_breaker.minimum_calls == 0 {
            return Err(invalid(
                "circuit_breaker.minimum_calls",
                self.circuit_breaker.minimum_calls,
            ));
        }
        if self.aggregation.deadline_ms == 0 {
            return Err(invalid("aggregation.deadline_ms", self.aggregation.deadline_ms));
        }
        if self.candidates.overfetch_factor == 0 {
            return Err(invalid(
                "candidates.overfetch_factor",
                self.candidates.overfetch_factor,
            ));
        }
        if self.suggestions.max_suggestions > MAX_SUGGESTIONS {
            return Err(invalid(
                "suggestions.max_suggestions",
                self.suggestions.max_suggestions,
            ));
        }
        if self.suggestions.max_candidates == 0 {
            return Err(invalid(
                "suggestions.max_candidates",
                self.suggestions.max_candidates,
            ));
        }
        if self.fallback.score <= 0.0 {
            return Err(invalid("fallback.score", self.fallback.score));
        }
        if !(1..=100).contains(&self.warmer.limit) {
            return Err(invalid("warmer.limit", self.warmer.limit));
        }
        Ok(())
    }
}
