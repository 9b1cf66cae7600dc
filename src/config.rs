use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::path::Path;
use validator::Validate;

const DEFAULT_LOG_LEVEL: &str = "info";
const DEFAULT_ENV: &str = "development";
const DEFAULT_PORT: u16 = 8080;
const CONFIG_DIR: &str = "config";
const DEFAULT_CURRENCY: &str = "usd";
const DEFAULT_WEBHOOK_TOLERANCE_SECS: u64 = 300;
const DEFAULT_EVENT_CHANNEL_CAPACITY: usize = 1024;

/// Application configuration structure with validation
#[derive(Clone, Debug, Deserialize, Validate)]
pub struct AppConfig {
    /// Database connection URL
    pub database_url: String,

    /// Server host
    #[serde(default = "default_host")]
    pub host: String,

    /// Server port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Environment (development, test, production)
    #[serde(default = "default_environment")]
    pub environment: String,

    /// Log level filter
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Settlement currency for payment intents
    #[validate(length(min = 3, max = 3))]
    #[serde(default = "default_currency")]
    pub default_currency: String,

    /// Secret used to verify inbound processor webhook signatures.
    /// Verification is skipped when unset (local development only).
    #[serde(default)]
    pub payment_webhook_secret: Option<String>,

    /// Allowed clock skew for webhook signature timestamps
    #[serde(default = "default_webhook_tolerance_secs")]
    pub payment_webhook_tolerance_secs: u64,

    /// Buffer size of the domain event channel
    #[serde(default = "default_event_channel_capacity")]
    pub event_channel_capacity: usize,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}
fn default_port() -> u16 {
    DEFAULT_PORT
}
fn default_environment() -> String {
    DEFAULT_ENV.to_string()
}
fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}
fn default_currency() -> String {
    DEFAULT_CURRENCY.to_string()
}
fn default_webhook_tolerance_secs() -> u64 {
    DEFAULT_WEBHOOK_TOLERANCE_SECS
}
fn default_event_channel_capacity() -> usize {
    DEFAULT_EVENT_CHANNEL_CAPACITY
}

impl AppConfig {
    /// Gets database URL reference
    pub fn database_url(&self) -> &str {
        &self.database_url
    }

    /// Creates a new configuration with defaults for everything but the
    /// essentials. Used by tests and embedded setups.
    pub fn new(database_url: String, host: String, port: u16, environment: String) -> Self {
        Self {
            database_url,
            host,
            port,
            environment,
            log_level: default_log_level(),
            default_currency: default_currency(),
            payment_webhook_secret: None,
            payment_webhook_tolerance_secs: default_webhook_tolerance_secs(),
            event_channel_capacity: default_event_channel_capacity(),
        }
    }

    /// Loads configuration from layered sources: `config/default.toml`,
    /// an environment-specific file, then `APP_*` environment variables.
    pub fn load() -> Result<Self, ConfigError> {
        let run_env = std::env::var("APP_ENVIRONMENT").unwrap_or_else(|_| DEFAULT_ENV.to_string());

        let mut builder = Config::builder()
            .set_default("environment", run_env.clone())?
            .add_source(File::from(Path::new(CONFIG_DIR).join("default")).required(false))
            .add_source(File::from(Path::new(CONFIG_DIR).join(&run_env)).required(false))
            .add_source(Environment::with_prefix("APP").separator("__"));

        if let Ok(url) = std::env::var("DATABASE_URL") {
            builder = builder.set_override("database_url", url)?;
        }

        let config: AppConfig = builder.build()?.try_deserialize()?;
        config
            .validate()
            .map_err(|e| ConfigError::Message(e.to_string()))?;
        Ok(config)
    }

    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_fills_defaults() {
        let cfg = AppConfig::new(
            "sqlite::memory:".to_string(),
            "127.0.0.1".to_string(),
            8080,
            "test".to_string(),
        );
        assert_eq!(cfg.default_currency, "usd");
        assert_eq!(cfg.payment_webhook_tolerance_secs, 300);
        assert!(cfg.payment_webhook_secret.is_none());
        assert!(!cfg.is_production());
    }

    #[test]
    fn currency_length_is_validated() {
        let mut cfg = AppConfig::new(
            "sqlite::memory:".to_string(),
            "127.0.0.1".to_string(),
            8080,
            "test".to_string(),
        );
        cfg.default_currency = "dollars".to_string();
        assert!(cfg.validate().is_err());
    }
}
