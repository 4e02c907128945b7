//! Retry and recovery configuration for revocation sagas.

use serde::Deserialize;

/// Backoff and recovery timing, in seconds.
///
/// Each field can also be set with its legacy environment variable, see
/// `super::MIN_RETRY_DURATION_ENV_VAR` and friends.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    /// Initial backoff delay.
    pub min_retry_duration_seconds: f64,
    /// Backoff cap.
    pub max_retry_duration_seconds: f64,
    /// Backoff growth factor.
    pub retry_multiplier: f64,
    /// Minimum dwell before an unfinished record is recovery-eligible.
    pub recovery_delay_seconds: f64,
    /// Inline retries per step before deferring to recovery.
    pub max_inline_retries: u32,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            min_retry_duration_seconds: 2.0,
            max_retry_duration_seconds: 60.0,
            retry_multiplier: 2.0,
            recovery_delay_seconds: 30.0,
            max_inline_retries: 5,
        }
    }
}

/// What recovery scans re-emit and what completed sagas leave behind.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct RecoverySettings {
    /// Re-emit failures recorded with `should_retry = false`.
    ///
    /// Off by default: a permanent failure waits for an operator.
    pub retry_permanent_failures: bool,
    /// Delete a saga's records once it terminates successfully.
    pub purge_completed: bool,
}
