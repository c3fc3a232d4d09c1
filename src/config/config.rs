use crate::error::ConfigError;
use crate::poller::PollSettings;
use crate::retry::RetryPolicy;
use crate::trend::TrendEstimator;
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variables that override file settings
pub const ENV_SOURCE_URL: &str = "GLUCOWATCH_SOURCE_URL";
pub const ENV_SOURCE_TOKEN: &str = "GLUCOWATCH_SOURCE_TOKEN";
pub const ENV_WEBHOOK_URL: &str = "GLUCOWATCH_WEBHOOK_URL";
pub const ENV_LOG_PATH: &str = "GLUCOWATCH_LOG_PATH";

/// Application configuration
///
/// Every section and field has a default, so a config file only needs the
/// values it changes.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    pub source: SourceConfig,
    pub polling: PollingConfig,
    pub trend: TrendConfig,
    pub alerts: AlertsConfig,
    pub storage: StorageConfig,
    pub display: DisplayConfig,
}

/// Which reading source to poll
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    #[default]
    Http,
    /// Steady synthetic readings, for dry runs
    Mock,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SourceConfig {
    pub kind: SourceKind,
    pub base_url: String,
    pub token: Option<String>,
    pub request_timeout_secs: u64,
    pub history_minutes: u32,
    /// Value reported by the mock source
    pub mock_value: f64,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            kind: SourceKind::Http,
            base_url: "http://localhost:8080".to_string(),
            token: None,
            request_timeout_secs: 30,
            history_minutes: 1440,
            mock_value: 120.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PollingConfig {
    pub interval_secs: u64,
    pub initial_delay_ms: u64,
    pub max_attempts: u32,
    pub retry_delay_secs: u64,
    pub cooldown_secs: u64,
    pub stale_after_minutes: i64,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            interval_secs: 300,
            initial_delay_ms: 600,
            max_attempts: 5,
            retry_delay_secs: 10,
            cooldown_secs: 60,
            stale_after_minutes: 15,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TrendConfig {
    pub window_size: usize,
    pub horizon_minutes: f64,
}

impl Default for TrendConfig {
    fn default() -> Self {
        Self {
            window_size: 6,
            horizon_minutes: 20.0,
        }
    }
}

/// Where alerts are delivered
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum NotifierKind {
    Webhook,
    /// Log the alert instead of sending it
    #[default]
    Mock,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AlertsConfig {
    pub enabled: bool,
    pub notifier: NotifierKind,
    pub webhook_url: Option<String>,
    pub timeout_secs: u64,
}

impl Default for AlertsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            notifier: NotifierKind::Mock,
            webhook_url: None,
            timeout_secs: 10,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct StorageConfig {
    pub enabled: bool,
    pub log_path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            log_path: PathBuf::from("glucose_readings.csv"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DisplayConfig {
    /// IANA zone name for alert times, log timestamps and charts
    pub timezone: String,
    pub show_arrows: bool,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            timezone: "US/Eastern".to_string(),
            show_arrows: false,
        }
    }
}

impl Config {
    /// Load a TOML configuration file
    ///
    /// Values are not range-checked here since environment overrides may
    /// still fill in required fields; call [`Config::validate`] afterwards.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ReadError` if the file cannot be read and
    /// `ConfigError::TomlError` if it is not valid TOML for this schema.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::ReadError(format!("{}: {}", path.display(), e)))?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    /// Check value ranges and cross-field requirements
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.source.kind == SourceKind::Http && self.source.base_url.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "source.base_url must not be empty".to_string(),
            ));
        }
        if self.source.request_timeout_secs == 0 {
            return Err(ConfigError::ValidationError(
                "source.request_timeout_secs must be at least 1".to_string(),
            ));
        }
        if self.polling.interval_secs == 0 {
            return Err(ConfigError::ValidationError(
                "polling.interval_secs must be at least 1".to_string(),
            ));
        }
        if self.polling.max_attempts == 0 {
            return Err(ConfigError::ValidationError(
                "polling.max_attempts must be at least 1".to_string(),
            ));
        }
        if self.polling.stale_after_minutes <= 0 {
            return Err(ConfigError::ValidationError(
                "polling.stale_after_minutes must be positive".to_string(),
            ));
        }
        if self.trend.window_size < 2 {
            return Err(ConfigError::ValidationError(format!(
                "trend.window_size must be at least 2, got {}",
                self.trend.window_size
            )));
        }
        if !self.trend.horizon_minutes.is_finite() || self.trend.horizon_minutes < 0.0 {
            return Err(ConfigError::ValidationError(
                "trend.horizon_minutes must be a non-negative number".to_string(),
            ));
        }
        if self.alerts.enabled
            && self.alerts.notifier == NotifierKind::Webhook
            && self
                .alerts
                .webhook_url
                .as_deref()
                .map_or(true, |url| url.trim().is_empty())
        {
            return Err(ConfigError::ValidationError(
                "alerts.webhook_url is required for the webhook notifier".to_string(),
            ));
        }
        self.timezone()?;
        Ok(())
    }

    /// The display zone
    pub fn timezone(&self) -> Result<Tz, ConfigError> {
        self.display.timezone.parse::<Tz>().map_err(|e| {
            ConfigError::ValidationError(format!(
                "Unknown timezone '{}': {}",
                self.display.timezone, e
            ))
        })
    }

    /// Override settings from the process environment
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Override settings from `lookup`, which maps variable names to values
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup(ENV_SOURCE_URL) {
            self.source.base_url = url;
        }
        if let Some(token) = lookup(ENV_SOURCE_TOKEN) {
            self.source.token = Some(token);
        }
        if let Some(url) = lookup(ENV_WEBHOOK_URL) {
            self.alerts.webhook_url = Some(url);
        }
        if let Some(path) = lookup(ENV_LOG_PATH) {
            self.storage.log_path = PathBuf::from(path);
        }
    }

    pub fn poll_settings(&self) -> PollSettings {
        PollSettings {
            initial_delay: Duration::from_millis(self.polling.initial_delay_ms),
            interval: Duration::from_secs(self.polling.interval_secs),
            cooldown: Duration::from_secs(self.polling.cooldown_secs),
            retry: RetryPolicy::new(
                self.polling.max_attempts,
                Duration::from_secs(self.polling.retry_delay_secs),
            ),
            history_minutes: self.source.history_minutes,
        }
    }

    pub fn estimator(&self) -> TrendEstimator {
        TrendEstimator::new(self.trend.window_size, self.trend.horizon_minutes)
    }

    pub fn stale_after(&self) -> chrono::Duration {
        chrono::Duration::minutes(self.polling.stale_after_minutes)
    }
}
