//! Coordinator configuration.
//!
//! Aggregates the per-concern sections into a single `Config` that can be
//! loaded from YAML files or environment variables.

mod saga;
mod storage;
mod surface;

pub use saga::{RecoverySettings, RetrySettings};
pub use storage::{StorageConfig, StorageType};
pub use surface::{AdminConfig, NotificationConfig, DEFAULT_PROFILE, DEFAULT_PROFILE_HEADER};

use serde::Deserialize;

/// Default configuration file name.
pub const DEFAULT_CONFIG_FILE: &str = "revreg.yaml";
/// Environment variable for configuration file path.
pub const CONFIG_ENV_VAR: &str = "REVREG_CONFIG";
/// Prefix for configuration environment variables.
pub const CONFIG_ENV_PREFIX: &str = "REVREG";
/// Environment variable for logging configuration.
pub const LOG_ENV_VAR: &str = "REVREG_LOG";

/// Legacy variable for `retry.min_retry_duration_seconds`.
pub const MIN_RETRY_DURATION_ENV_VAR: &str = "ANONCREDS_REVOCATION_MIN_RETRY_DURATION_SECONDS";
/// Legacy variable for `retry.max_retry_duration_seconds`.
pub const MAX_RETRY_DURATION_ENV_VAR: &str = "ANONCREDS_REVOCATION_MAX_RETRY_DURATION_SECONDS";
/// Legacy variable for `retry.retry_multiplier`.
pub const RETRY_MULTIPLIER_ENV_VAR: &str = "ANONCREDS_REVOCATION_RETRY_MULTIPLIER";
/// Legacy variable for `retry.recovery_delay_seconds`.
pub const RECOVERY_DELAY_ENV_VAR: &str = "ANONCREDS_REVOCATION_RECOVERY_DELAY_SECONDS";
/// Legacy variable for `retry.max_inline_retries`.
pub const MAX_INLINE_RETRIES_ENV_VAR: &str = "ANONCREDS_REVOCATION_MAX_INLINE_RETRIES";

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    Load(#[from] ::config::ConfigError),

    #[error("Invalid value for {name}: {value}")]
    InvalidEnv { name: &'static str, value: String },

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Main coordinator configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Event record storage.
    pub storage: StorageConfig,
    /// Backoff and recovery timing.
    pub retry: RetrySettings,
    /// Recovery scan behavior.
    pub recovery: RecoverySettings,
    /// Failed-step notifications.
    pub notifications: NotificationConfig,
    /// Admin recovery trigger.
    pub admin: AdminConfig,
}

impl Config {
    /// Load configuration from file and environment.
    ///
    /// Configuration sources (in order of priority, later overrides earlier):
    /// 1. `revreg.yaml` in current directory (if exists)
    /// 2. File specified by `path` argument (if provided)
    /// 3. File specified by `CONFIG_ENV_VAR` environment variable (if set)
    /// 4. Environment variables with `CONFIG_ENV_PREFIX` prefix
    /// 5. Legacy `ANONCREDS_REVOCATION_*` variables
    pub fn load(path: Option<&str>) -> Result<Self, ConfigError> {
        use ::config::{Config as ConfigLib, Environment, File, FileFormat};

        let mut builder = ConfigLib::builder()
            .add_source(File::new(DEFAULT_CONFIG_FILE, FileFormat::Yaml).required(false));

        if let Some(config_path) = path {
            builder = builder.add_source(File::new(config_path, FileFormat::Yaml).required(true));
        }

        if let Ok(config_path) = std::env::var(CONFIG_ENV_VAR) {
            builder = builder.add_source(File::new(&config_path, FileFormat::Yaml).required(true));
        }

        let config = builder
            .add_source(
                Environment::with_prefix(CONFIG_ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .set_override_option(
                "retry.min_retry_duration_seconds",
                legacy_env::<f64>(MIN_RETRY_DURATION_ENV_VAR)?,
            )?
            .set_override_option(
                "retry.max_retry_duration_seconds",
                legacy_env::<f64>(MAX_RETRY_DURATION_ENV_VAR)?,
            )?
            .set_override_option(
                "retry.retry_multiplier",
                legacy_env::<f64>(RETRY_MULTIPLIER_ENV_VAR)?,
            )?
            .set_override_option(
                "retry.recovery_delay_seconds",
                legacy_env::<f64>(RECOVERY_DELAY_ENV_VAR)?,
            )?
            .set_override_option(
                "retry.max_inline_retries",
                legacy_env::<i64>(MAX_INLINE_RETRIES_ENV_VAR)?,
            )?
            .build()?;

        let config: Config = config.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Create config for testing: in-memory storage, no recovery dwell.
    pub fn for_test() -> Self {
        Self {
            storage: StorageConfig::memory(),
            retry: RetrySettings {
                recovery_delay_seconds: 0.0,
                ..Default::default()
            },
            ..Default::default()
        }
    }

    /// Reject settings the retry calculator cannot work with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let retry = &self.retry;
        let durations = [
            ("retry.min_retry_duration_seconds", retry.min_retry_duration_seconds),
            ("retry.max_retry_duration_seconds", retry.max_retry_duration_seconds),
            ("retry.recovery_delay_seconds", retry.recovery_delay_seconds),
        ];
        for (name, value) in durations {
            if !value.is_finite() || value < 0.0 {
                return Err(ConfigError::Invalid(format!(
                    "{name} must be a non-negative number, got {value}"
                )));
            }
        }
        if retry.min_retry_duration_seconds > retry.max_retry_duration_seconds {
            return Err(ConfigError::Invalid(
                "retry.min_retry_duration_seconds exceeds retry.max_retry_duration_seconds"
                    .to_string(),
            ));
        }
        if !retry.retry_multiplier.is_finite() || retry.retry_multiplier < 1.0 {
            return Err(ConfigError::Invalid(format!(
                "retry.retry_multiplier must be at least 1, got {}",
                retry.retry_multiplier
            )));
        }
        if self.storage.storage_type == StorageType::Sqlite && self.storage.path.is_empty() {
            return Err(ConfigError::Invalid(
                "storage.path is required for sqlite storage".to_string(),
            ));
        }
        if self.admin.profile_header.is_empty() {
            return Err(ConfigError::Invalid(
                "admin.profile_header must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

/// Parse a legacy variable if it is set.
fn legacy_env<T: std::str::FromStr>(name: &'static str) -> Result<Option<T>, ConfigError> {
    match std::env::var(name) {
        Ok(value) => value
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| ConfigError::InvalidEnv { name, value }),
        Err(_) => Ok(None),
    }
}
