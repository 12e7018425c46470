use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

use crate::adapters::RetryPolicy;
use crate::services::{collections, notifications, poller};

/// Main configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub store: StoreConfig,
    pub analytics: AnalyticsConfig,
    #[serde(default)]
    pub dashboard: DashboardConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    /// WebSocket endpoint pushing live document snapshots
    pub ws_url: String,
    /// Readiness checks before a subscription reports `NotReady`
    #[serde(default = "default_readiness_attempts")]
    pub readiness_attempts: u32,
    /// Wait between readiness checks in milliseconds
    #[serde(default = "default_readiness_delay_ms")]
    pub readiness_delay_ms: u64,
    /// Base reconnect delay for the WebSocket client
    #[serde(default = "default_reconnect_delay_ms")]
    pub reconnect_delay_ms: u64,
    /// Upper bound for the reconnect delay
    #[serde(default = "default_max_reconnect_delay_ms")]
    pub max_reconnect_delay_ms: u64,
}

fn default_readiness_attempts() -> u32 {
    5
}

fn default_readiness_delay_ms() -> u64 {
    1000
}

fn default_reconnect_delay_ms() -> u64 {
    1000
}

fn default_max_reconnect_delay_ms() -> u64 {
    30_000
}

impl StoreConfig {
    pub fn readiness_policy(&self) -> RetryPolicy {
        RetryPolicy {
            attempts: self.readiness_attempts,
            delay: Duration::from_millis(self.readiness_delay_ms),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AnalyticsConfig {
    /// GET endpoint returning one aggregate report
    pub endpoint: String,
    /// Poll period in seconds
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
    /// HTTP request timeout in seconds
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

fn default_poll_interval_secs() -> u64 {
    poller::DEFAULT_POLL_INTERVAL.as_secs()
}

fn default_request_timeout_secs() -> u64 {
    10
}

impl AnalyticsConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DashboardConfig {
    /// Maximum notifications kept in the merged feed
    #[serde(default = "default_notification_cap")]
    pub notification_cap: usize,
    /// Activity log entries pulled by the live query
    #[serde(default = "default_activity_limit")]
    pub activity_limit: usize,
    /// Platform metric samples pulled by the live query
    #[serde(default = "default_metrics_limit")]
    pub metrics_limit: usize,
}

fn default_notification_cap() -> usize {
    notifications::DEFAULT_NOTIFICATION_CAP
}

fn default_activity_limit() -> usize {
    collections::DEFAULT_ACTIVITY_LIMIT
}

fn default_metrics_limit() -> usize {
    collections::DEFAULT_METRICS_LIMIT
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            notification_cap: default_notification_cap(),
            activity_limit: default_activity_limit(),
            metrics_limit: default_metrics_limit(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Enable JSON formatted logs
    #[serde(default)]
    pub json: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

impl AppConfig {
    /// Load configuration from files and environment
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from("config")
    }

    /// Load configuration from a specific directory
    pub fn load_from<P: AsRef<Path>>(config_dir: P) -> Result<Self, ConfigError> {
        let config_dir = config_dir.as_ref();

        let builder = Config::builder()
            .set_default("store.ws_url", "ws://127.0.0.1:8787/live")?
            .set_default("analytics.endpoint", "http://127.0.0.1:8788/analytics/summary")?
            .set_default("analytics.poll_interval_secs", 30)?
            .set_default("logging.level", "info")?
            .set_default("logging.json", false)?
            .add_source(File::from(config_dir.join("default.toml")).required(false))
            // Environment-specific file (e.g., config/production.toml)
            .add_source(
                File::from(config_dir.join(
                    std::env::var("DEALSYNC_ENV").unwrap_or_else(|_| "development".to_string()),
                ))
                .required(false),
            )
            // DEALSYNC_ANALYTICS__ENDPOINT, DEALSYNC_STORE__WS_URL, ...
            .add_source(
                Environment::with_prefix("DEALSYNC")
                    .separator("__")
                    .try_parsing(true),
            );

        builder.build()?.try_deserialize()
    }

    /// Configuration pointing at local development services
    pub fn default_config() -> Self {
        Self {
            store: StoreConfig {
                ws_url: "ws://127.0.0.1:8787/live".to_string(),
                readiness_attempts: default_readiness_attempts(),
                readiness_delay_ms: default_readiness_delay_ms(),
                reconnect_delay_ms: default_reconnect_delay_ms(),
                max_reconnect_delay_ms: default_max_reconnect_delay_ms(),
            },
            analytics: AnalyticsConfig {
                endpoint: "http://127.0.0.1:8788/analytics/summary".to_string(),
                poll_interval_secs: default_poll_interval_secs(),
                request_timeout_secs: default_request_timeout_secs(),
            },
            dashboard: DashboardConfig::default(),
            logging: LoggingConfig::default(),
        }
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        match url::Url::parse(&self.store.ws_url) {
            Ok(url) if matches!(url.scheme(), "ws" | "wss") => {}
            Ok(url) => errors.push(format!(
                "store.ws_url must use ws:// or wss://, got {}://",
                url.scheme()
            )),
            Err(e) => errors.push(format!("store.ws_url is not a valid URL: {e}")),
        }

        match url::Url::parse(&self.analytics.endpoint) {
            Ok(url) if matches!(url.scheme(), "http" | "https") => {}
            Ok(url) => errors.push(format!(
                "analytics.endpoint must use http:// or https://, got {}://",
                url.scheme()
            )),
            Err(e) => errors.push(format!("analytics.endpoint is not a valid URL: {e}")),
        }

        if self.store.readiness_attempts == 0 {
            errors.push("store.readiness_attempts must be at least 1".to_string());
        }

        if self.store.reconnect_delay_ms > self.store.max_reconnect_delay_ms {
            errors.push(
                "store.reconnect_delay_ms should not exceed store.max_reconnect_delay_ms"
                    .to_string(),
            );
        }

        if self.analytics.poll_interval_secs == 0 {
            errors.push("analytics.poll_interval_secs must be positive".to_string());
        }

        if self.analytics.request_timeout_secs == 0 {
            errors.push("analytics.request_timeout_secs must be positive".to_string());
        }

        if self.dashboard.notification_cap == 0 {
            errors.push("dashboard.notification_cap must be positive".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let cfg = AppConfig::default_config();
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.dashboard.notification_cap, 20);
        assert_eq!(cfg.analytics.poll_interval(), Duration::from_secs(30));
    }

    #[test]
    fn test_logging_defaults_to_info() {
        let logging = LoggingConfig::default();
        assert_eq!(logging.level, "info");
        assert!(!logging.json);

        let from_empty: LoggingConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(from_empty.level, "info");
    }

    #[test]
    fn test_validate_collects_all_errors() {
        let mut cfg = AppConfig::default_config();
        cfg.store.ws_url = "http://example.com/live".to_string();
        cfg.analytics.poll_interval_secs = 0;
        cfg.dashboard.notification_cap = 0;

        let errors = cfg.validate().unwrap_err();
        assert_eq!(errors.len(), 3);
        assert!(errors[0].contains("ws://"));
    }

    #[test]
    fn test_readiness_policy_from_store_config() {
        let cfg = AppConfig::default_config();
        let policy = cfg.store.readiness_policy();
        assert_eq!(policy.attempts, 5);
        assert_eq!(policy.delay, Duration::from_millis(1000));
    }

    #[test]
    fn test_load_from_missing_dir_uses_defaults() {
        let cfg = AppConfig::load_from("/nonexistent/dealsync-config").unwrap();
        assert_eq!(cfg.analytics.poll_interval_secs, 30);
        assert_eq!(cfg.dashboard.activity_limit, 50);
        assert_eq!(cfg.logging.level, "info");
    }
}
