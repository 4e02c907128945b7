//! Operator-facing configuration: failure notifications and the admin hook.

use serde::Deserialize;

/// Default header naming the profile of an admin request.
pub const DEFAULT_PROFILE_HEADER: &str = "x-profile-id";
/// Profile used when an admin request names none.
pub const DEFAULT_PROFILE: &str = "default";

/// Failure notification configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NotificationConfig {
    /// Webhook receiving failed-step alerts. None = log only.
    pub webhook_url: Option<String>,
    /// Request timeout for the webhook.
    pub timeout_secs: u64,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            webhook_url: None,
            timeout_secs: 10,
        }
    }
}

/// Admin surface configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AdminConfig {
    /// Request header carrying the profile/tenant identifier.
    pub profile_header: String,
    /// Profile assumed when the header is absent.
    pub default_profile: String,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            profile_header: DEFAULT_PROFILE_HEADER.to_string(),
            default_profile: DEFAULT_PROFILE.to_string(),
        }
    }
}
