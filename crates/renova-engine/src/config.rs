//! Engine configuration.
//!
//! The host process parses whatever configuration format it owns and
//! hands the engine one validated record. Every field has a production
//! default, so `EngineConfig::default()` is a working configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default per-call deadline for reconcile entry points.
pub const DEFAULT_CALL_DEADLINE_MS: u64 = 30_000;

/// Default initial retry backoff for command dispatch.
pub const DEFAULT_INITIAL_BACKOFF_MS: u64 = 100;

/// Default multiplier applied to the backoff after each failed attempt.
pub const DEFAULT_BACKOFF_FACTOR: u32 = 2;

/// Default backoff ceiling.
pub const DEFAULT_MAX_BACKOFF_MS: u64 = 2_000;

/// Default attempt budget per command.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;

/// Default polling period for read-your-write fences.
pub const DEFAULT_FENCE_POLL_MS: u64 = 100;

/// Default total budget for read-your-write fences.
pub const DEFAULT_FENCE_BUDGET_MS: u64 = 5_000;

/// Default billing cycle assigned at contract creation, in months.
pub const DEFAULT_BILLING_CYCLE_MONTHS: u32 = 1;

/// Retry behavior for the command dispatcher.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Backoff before the second attempt.
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,
    /// Backoff multiplier per failed attempt.
    #[serde(default = "default_backoff_factor")]
    pub backoff_factor: u32,
    /// Ceiling the backoff never exceeds.
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
    /// Total attempts, including the first.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            initial_backoff_ms: DEFAULT_INITIAL_BACKOFF_MS,
            backoff_factor: DEFAULT_BACKOFF_FACTOR,
            max_backoff_ms: DEFAULT_MAX_BACKOFF_MS,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }
}

impl RetryConfig {
    /// Backoff to sleep after the given zero-based failed attempt.
    #[must_use]
    pub fn backoff_for_attempt(&self, attempt: u32) -> Duration {
        let factor = u64::from(self.backoff_factor).saturating_pow(attempt);
        let millis = self
            .initial_backoff_ms
            .saturating_mul(factor)
            .min(self.max_backoff_ms);
        Duration::from_millis(millis)
    }
}

/// Read-your-write fence behavior.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FenceConfig {
    /// Polling period.
    #[serde(default = "default_fence_poll_ms")]
    pub poll_ms: u64,
    /// Total budget before the fence gives up.
    #[serde(default = "default_fence_budget_ms")]
    pub budget_ms: u64,
}

impl Default for FenceConfig {
    fn default() -> Self {
        Self {
            poll_ms: DEFAULT_FENCE_POLL_MS,
            budget_ms: DEFAULT_FENCE_BUDGET_MS,
        }
    }
}

/// Top-level engine configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Deadline applied to each public entry point.
    #[serde(default = "default_call_deadline_ms")]
    pub call_deadline_ms: u64,
    /// Command dispatch retry behavior.
    #[serde(default)]
    pub retry: RetryConfig,
    /// Read-your-write fence behavior.
    #[serde(default)]
    pub fence: FenceConfig,
    /// Billing cycle assigned when contract creation omits one.
    #[serde(default = "default_billing_cycle_months")]
    pub default_billing_cycle_months: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            call_deadline_ms: DEFAULT_CALL_DEADLINE_MS,
            retry: RetryConfig::default(),
            fence: FenceConfig::default(),
            default_billing_cycle_months: DEFAULT_BILLING_CYCLE_MONTHS,
        }
    }
}

/// Configuration validation failures.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// A field holds a value the engine cannot run with.
    #[error("invalid config: {reason}")]
    Invalid {
        /// Which field and why.
        reason: String,
    },
}

impl EngineConfig {
    /// Validates field relationships.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when any duration is zero, the retry
    /// budget is empty, or the fence polls slower than its budget.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.call_deadline_ms == 0 {
            return Err(ConfigError::Invalid {
                reason: "call_deadline_ms must be positive".to_string(),
            });
        }
        if self.retry.max_attempts == 0 {
            return Err(ConfigError::Invalid {
                reason: "retry.max_attempts must be positive".to_string(),
            });
        }
        if self.retry.backoff_factor == 0 {
            return Err(ConfigError::Invalid {
                reason: "retry.backoff_factor must be positive".to_string(),
            });
        }
        if self.retry.initial_backoff_ms > self.retry.max_backoff_ms {
            return Err(ConfigError::Invalid {
                reason: "retry.initial_backoff_ms exceeds retry.max_backoff_ms".to_string(),
            });
        }
        if self.fence.poll_ms == 0 || self.fence.budget_ms == 0 {
            return Err(ConfigError::Invalid {
                reason: "fence periods must be positive".to_string(),
            });
        }
        if self.fence.poll_ms > self.fence.budget_ms {
            return Err(ConfigError::Invalid {
                reason: "fence.poll_ms exceeds fence.budget_ms".to_string(),
            });
        }
        Ok(())
    }

    /// The per-call deadline as a [`Duration`].
    #[must_use]
    pub const fn call_deadline(&self) -> Duration {
        Duration::from_millis(self.call_deadline_ms)
    }
}

fn default_call_deadline_ms() -> u64 {
    DEFAULT_CALL_DEADLINE_MS
}

fn default_initial_backoff_ms() -> u64 {
    DEFAULT_INITIAL_BACKOFF_MS
}

fn default_backoff_factor() -> u32 {
    DEFAULT_BACKOFF_FACTOR
}

fn default_max_backoff_ms() -> u64 {
    DEFAULT_MAX_BACKOFF_MS
}

fn default_max_attempts() -> u32 {
    DEFAULT_MAX_ATTEMPTS
}

fn default_fence_poll_ms() -> u64 {
    DEFAULT_FENCE_POLL_MS
}

fn default_fence_budget_ms() -> u64 {
    DEFAULT_FENCE_BUDGET_MS
}

fn default_billing_cycle_months() -> u32 {
    DEFAULT_BILLING_CYCLE_MONTHS
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = EngineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.call_deadline(), Duration::from_secs(30));
    }

    #[test]
    fn backoff_doubles_and_caps() {
        let retry = RetryConfig::default();
        assert_eq!(retry.backoff_for_attempt(0), Duration::from_millis(100));
        assert_eq!(retry.backoff_for_attempt(1), Duration::from_millis(200));
        assert_eq!(retry.backoff_for_attempt(2), Duration::from_millis(400));
        assert_eq!(retry.backoff_for_attempt(3), Duration::from_millis(800));
        assert_eq!(retry.backoff_for_attempt(4), Duration::from_millis(1600));
        assert_eq!(retry.backoff_for_attempt(5), Duration::from_millis(2000));
        assert_eq!(retry.backoff_for_attempt(60), Duration::from_millis(2000));
    }

    #[test]
    fn validation_catches_zero_and_inverted_fields() {
        let mut zero_deadline = EngineConfig::default();
        zero_deadline.call_deadline_ms = 0;
        assert!(matches!(
            zero_deadline.validate(),
            Err(ConfigError::Invalid { .. })
        ));

        let mut no_attempts = EngineConfig::default();
        no_attempts.retry.max_attempts = 0;
        assert!(no_attempts.validate().is_err());

        let mut inverted = EngineConfig::default();
        inverted.retry.initial_backoff_ms = 5_000;
        assert!(inverted.validate().is_err());

        let mut slow_fence = EngineConfig::default();
        slow_fence.fence.poll_ms = 10_000;
        assert!(slow_fence.validate().is_err());
    }

    #[test]
    fn partial_json_fills_defaults() {
        let config: EngineConfig =
            serde_json::from_str(r#"{"retry":{"max_attempts":3}}"#).expect("parse");
        assert_eq!(config.retry.max_attempts, 3);
        assert_eq!(config.retry.initial_backoff_ms, DEFAULT_INITIAL_BACKOFF_MS);
        assert_eq!(config.call_deadline_ms, DEFAULT_CALL_DEADLINE_MS);
    }
}
