//! Admin Recovery Trigger: first-request recovery for a profile.
//!
//! The first administrative request seen for a profile in this process
//! runs a recovery scan for that profile before it is handled. A scan only
//! re-emits requests, so the wait is short, and its errors never reach the
//! request.

use std::collections::HashSet;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures::future::BoxFuture;
use tokio::sync::Mutex;
use tower::{Layer, Service};
use tracing::{debug, error, info};

use super::EventRecoveryManager;
use crate::config::AdminConfig;

/// Profiles already recovered by this process.
#[derive(Clone, Default)]
pub struct RecoveredProfiles(Arc<Mutex<HashSet<String>>>);

impl RecoveredProfiles {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `profile`. Returns `true` only for the first caller.
    pub async fn mark(&self, profile: &str) -> bool {
        self.0.lock().await.insert(profile.to_string())
    }

    pub async fn contains(&self, profile: &str) -> bool {
        self.0.lock().await.contains(profile)
    }
}

/// Runs a recovery scan the first time a profile is seen.
#[derive(Clone)]
pub struct AdminRecoveryTrigger {
    recovery: Arc<EventRecoveryManager>,
    recovered: RecoveredProfiles,
}

impl AdminRecoveryTrigger {
    pub fn new(recovery: Arc<EventRecoveryManager>, recovered: RecoveredProfiles) -> Self {
        Self {
            recovery,
            recovered,
        }
    }

    pub fn recovered(&self) -> &RecoveredProfiles {
        &self.recovered
    }

    /// Recover `profile` if this is its first admin request.
    ///
    /// The profile is marked before the scan starts so concurrent first
    /// requests run one scan between them. A failed scan is logged and not
    /// retried until the process restarts.
    pub async fn on_admin_request(&self, profile: &str) -> bool {
        if !self.recovered.mark(profile).await {
            return false;
        }

        info!(%profile, "First admin request for profile, recovering in-progress events");
        if let Err(e) = self.recovery.recover_in_progress_events(profile).await {
            error!(%profile, error = %e, "Recovery scan failed");
        }
        true
    }
}

/// Tower layer that fires the recovery trigger for admin requests.
#[derive(Clone)]
pub struct RecoveryLayer {
    trigger: AdminRecoveryTrigger,
    profile_header: http::HeaderName,
    default_profile: String,
}

impl RecoveryLayer {
    pub fn new(trigger: AdminRecoveryTrigger, config: &AdminConfig) -> Self {
        let profile_header = http::HeaderName::from_bytes(config.profile_header.as_bytes())
            .unwrap_or_else(|_| http::HeaderName::from_static(crate::config::DEFAULT_PROFILE_HEADER));
        Self {
            trigger,
            profile_header,
            default_profile: config.default_profile.clone(),
        }
    }
}

impl<S> Layer<S> for RecoveryLayer {
    type Service = RecoveryService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        RecoveryService {
            inner,
            layer: self.clone(),
        }
    }
}

/// Service produced by [`RecoveryLayer`].
#[derive(Clone)]
pub struct RecoveryService<S> {
    inner: S,
    layer: RecoveryLayer,
}

impl<S> RecoveryService<S> {
    fn profile_of<B>(&self, request: &http::Request<B>) -> String {
        request
            .headers()
            .get(&self.layer.profile_header)
            .and_then(|value| value.to_str().ok())
            .filter(|value| !value.is_empty())
            .unwrap_or(&self.layer.default_profile)
            .to_string()
    }
}

impl<S, B> Service<http::Request<B>> for RecoveryService<S>
where
    S: Service<http::Request<B>> + Clone + Send + 'static,
    S::Future: Send + 'static,
    B: Send + 'static,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = BoxFuture<'static, Result<S::Response, S::Error>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, request: http::Request<B>) -> Self::Future {
        let profile = self.profile_of(&request);
        let trigger = self.layer.trigger.clone();

        // The readied service handles this request; keep a fresh clone for the next.
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);

        Box::pin(async move {
            if !trigger.on_admin_request(&profile).await {
                debug!(%profile, "Profile already recovered");
            }
            inner.call(request).await
        })
    }
}
