//! Failed-step notifications.
//!
//! Operators learn about stuck sagas from here: every step left in
//! `ResponseFailure` is logged, and optionally forwarded to a webhook.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use backon::Retryable;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::Serialize;
use tracing::{debug, error, warn};

use crate::config::NotificationConfig;
use crate::events::{EventRecord, EventType};
use crate::utils::retry::notification_backoff;

/// A step that stopped retrying inline.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StepFailure {
    pub profile: String,
    pub correlation_id: String,
    pub event_type: EventType,
    pub error_message: String,
    pub retry_count: u32,
    /// False when recovery will not pick the record up on its own.
    pub should_retry: bool,
    pub occurred_at: DateTime<Utc>,
}

impl From<&EventRecord> for StepFailure {
    fn from(record: &EventRecord) -> Self {
        Self {
            profile: record.profile.clone(),
            correlation_id: record.correlation_id.clone(),
            event_type: record.event_type,
            error_message: record.error_message.clone().unwrap_or_default(),
            retry_count: record.retry_count,
            should_retry: record.should_retry.unwrap_or(true),
            occurred_at: record.updated_at,
        }
    }
}

/// Receives failed steps. Delivery problems are the notifier's own to log.
#[async_trait]
pub trait FailureNotifier: Send + Sync {
    async fn notify(&self, failure: &StepFailure);
}

/// Logs every failure at error level.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

#[async_trait]
impl FailureNotifier for LogNotifier {
    async fn notify(&self, failure: &StepFailure) {
        error!(
            profile = %failure.profile,
            correlation_id = %failure.correlation_id,
            event_type = %failure.event_type,
            error_message = %failure.error_message,
            retry_count = failure.retry_count,
            should_retry = failure.should_retry,
            "Revocation step failed"
        );
    }
}

/// Webhook delivery errors.
#[derive(Debug, thiserror::Error)]
pub enum WebhookError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Webhook unavailable: {0}")]
    Unavailable(String),

    #[error("Webhook rejected notification: {0}")]
    Rejected(String),
}

impl WebhookError {
    fn is_retryable(&self) -> bool {
        match self {
            WebhookError::Http(err) => err.is_timeout() || err.is_connect(),
            WebhookError::Unavailable(_) => true,
            WebhookError::Rejected(_) => false,
        }
    }
}

/// POSTs failures as JSON to a webhook, with retry.
pub struct WebhookNotifier {
    client: Client,
    url: String,
}

impl WebhookNotifier {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, WebhookError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }

    async fn post(&self, failure: &StepFailure) -> Result<(), WebhookError> {
        let response = self.client.post(&self.url).json(failure).send().await?;
        let status = response.status();

        if status.is_success() {
            debug!(url = %self.url, correlation_id = %failure.correlation_id, "Failure notification delivered");
            return Ok(());
        }

        let body = response.text().await.unwrap_or_default();
        let message = format!(
            "HTTP {} - {}",
            status,
            body.chars().take(200).collect::<String>()
        );
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
            Err(WebhookError::Unavailable(message))
        } else {
            Err(WebhookError::Rejected(message))
        }
    }
}

#[async_trait]
impl FailureNotifier for WebhookNotifier {
    async fn notify(&self, failure: &StepFailure) {
        let result = (|| async { self.post(failure).await })
            .retry(notification_backoff())
            .when(WebhookError::is_retryable)
            .notify(|err, dur| {
                warn!(url = %self.url, error = %err, "Notification failed, retrying in {:?}", dur)
            })
            .await;

        if let Err(e) = result {
            error!(
                url = %self.url,
                correlation_id = %failure.correlation_id,
                error = %e,
                "Could not deliver failure notification"
            );
        }
    }
}

/// Forwards each failure to every inner notifier, in order.
#[derive(Default, Clone)]
pub struct FanoutNotifier {
    notifiers: Vec<Arc<dyn FailureNotifier>>,
}

impl FanoutNotifier {
    pub fn new(notifiers: Vec<Arc<dyn FailureNotifier>>) -> Self {
        Self { notifiers }
    }

    /// Log notifier, plus a webhook when one is configured.
    pub fn from_config(config: &NotificationConfig) -> Result<Self, WebhookError> {
        let mut notifiers: Vec<Arc<dyn FailureNotifier>> = vec![Arc::new(LogNotifier)];
        if let Some(url) = &config.webhook_url {
            notifiers.push(Arc::new(WebhookNotifier::new(
                url.clone(),
                Duration::from_secs(config.timeout_secs),
            )?));
        }
        Ok(Self::new(notifiers))
    }

    pub fn len(&self) -> usize {
        self.notifiers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.notifiers.is_empty()
    }
}

#[async_trait]
impl FailureNotifier for FanoutNotifier {
    async fn notify(&self, failure: &StepFailure) {
        for notifier in &self.notifiers {
            notifier.notify(failure).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::RecordingNotifier;

    fn failure() -> StepFailure {
        StepFailure {
            profile: "default".to_string(),
            correlation_id: "corr-1".to_string(),
            event_type: EventType::RevRegDefCreate,
            error_message: "Permanent failure: Invalid request: bad schema".to_string(),
            retry_count: 0,
            should_retry: false,
            occurred_at: Utc::now(),
        }
    }

    #[test]
    fn test_failure_serializes_event_type_name() {
        let value = serde_json::to_value(failure()).unwrap();
        assert_eq!(value["event_type"], "rev_reg_def_create");
        assert_eq!(value["should_retry"], false);
    }

    #[test]
    fn test_from_config_without_webhook() {
        let notifier = FanoutNotifier::from_config(&NotificationConfig::default()).unwrap();
        assert_eq!(notifier.len(), 1);
    }

    #[test]
    fn test_from_config_with_webhook() {
        let config = NotificationConfig {
            webhook_url: Some("http://127.0.0.1:9/hook".to_string()),
            timeout_secs: 1,
        };
        let notifier = FanoutNotifier::from_config(&config).unwrap();
        assert_eq!(notifier.len(), 2);
    }

    #[tokio::test]
    async fn test_fanout_reaches_every_notifier() {
        let first = Arc::new(RecordingNotifier::new());
        let second = Arc::new(RecordingNotifier::new());
        let fanout = FanoutNotifier::new(vec![first.clone(), second.clone()]);

        fanout.notify(&failure()).await;

        assert_eq!(first.failures().await.len(), 1);
        assert_eq!(second.failures().await, first.failures().await);
    }

    #[test]
    fn test_rejections_are_not_retried() {
        assert!(!WebhookError::Rejected("HTTP 400".to_string()).is_retryable());
        assert!(WebhookError::Unavailable("HTTP 503".to_string()).is_retryable());
    }
}
