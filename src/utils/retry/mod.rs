//! Retry and backoff policy for revocation saga steps.
//!
//! Two independent delays govern a step:
//! - the backoff delay, `min(max_delay, min_delay * multiplier^retry_count)`,
//!   used when a step handler retries inline
//! - the recovery delay, the minimum dwell before an unfinished record becomes
//!   eligible for re-emission by a recovery scan

use std::time::Duration;

use backon::ExponentialBuilder;
use chrono::{DateTime, Utc};

use crate::config::RetrySettings;

/// Backoff and expiry configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Delay before the first retry.
    pub min_delay: Duration,
    /// Cap on any single backoff delay.
    pub max_delay: Duration,
    /// Growth factor per retry.
    pub multiplier: f64,
    /// Added to `now` on every `Requested` or `ResponseFailure` transition.
    pub recovery_delay: Duration,
    /// Inline retries a handler attempts before leaving the record to recovery.
    pub max_inline_retries: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            min_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(60),
            multiplier: 2.0,
            recovery_delay: Duration::from_secs(30),
            max_inline_retries: 5,
        }
    }
}

impl From<&RetrySettings> for RetryPolicy {
    fn from(settings: &RetrySettings) -> Self {
        Self {
            min_delay: Duration::from_secs_f64(settings.min_retry_duration_seconds.max(0.0)),
            max_delay: Duration::from_secs_f64(settings.max_retry_duration_seconds.max(0.0)),
            multiplier: settings.retry_multiplier,
            recovery_delay: Duration::from_secs_f64(settings.recovery_delay_seconds.max(0.0)),
            max_inline_retries: settings.max_inline_retries,
        }
    }
}

impl RetryPolicy {
    /// Backoff delay before retry number `retry_count + 1`.
    pub fn delay(&self, retry_count: u32) -> Duration {
        let exponent = i32::try_from(retry_count).unwrap_or(i32::MAX);
        let secs = self.min_delay.as_secs_f64() * self.multiplier.powi(exponent);
        if !secs.is_finite() || secs >= self.max_delay.as_secs_f64() {
            return self.max_delay;
        }
        Duration::try_from_secs_f64(secs).unwrap_or(self.max_delay)
    }

    /// Whether a handler may retry inline after `retry_count` retries.
    pub fn should_retry_inline(&self, retry_count: u32) -> bool {
        retry_count < self.max_inline_retries
    }

    /// Expiry for a record entering `Requested`.
    pub fn request_expiry(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        add(now, self.recovery_delay)
    }

    /// Expiry for a record entering `ResponseFailure` after `retry_count` retries.
    pub fn failure_expiry(&self, now: DateTime<Utc>, retry_count: u32) -> DateTime<Utc> {
        add(add(now, self.recovery_delay), self.delay(retry_count))
    }
}

fn add(at: DateTime<Utc>, delay: Duration) -> DateTime<Utc> {
    chrono::Duration::from_std(delay)
        .ok()
        .and_then(|d| at.checked_add_signed(d))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

/// Backoff for re-reading a record after losing an optimistic-concurrency race.
///
/// - Min delay: 5ms
/// - Max delay: 250ms
/// - Max attempts: 10
/// - Jitter enabled
pub fn storage_conflict_backoff() -> ExponentialBuilder {
    ExponentialBuilder::default()
        .with_min_delay(Duration::from_millis(5))
        .with_max_delay(Duration::from_millis(250))
        .with_max_times(10)
        .with_jitter()
}

/// Backoff for failure notification delivery.
///
/// - Min delay: 100ms
/// - Max delay: 5s
/// - Max attempts: 3
/// - Jitter enabled
pub fn notification_backoff() -> ExponentialBuilder {
    ExponentialBuilder::default()
        .with_min_delay(Duration::from_millis(100))
        .with_max_delay(Duration::from_secs(5))
        .with_max_times(3)
        .with_jitter()
}
