use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::env;
use std::path::Path;
use thiserror::Error;
use tracing::{error, info};
use validator::{Validate, ValidationError};

/// Default values for configuration
const DEFAULT_LOG_LEVEL: &str = "info";
const DEFAULT_ENV: &str = "development";
const DEFAULT_PORT: u16 = 8080;
const CONFIG_DIR: &str = "config";
const DEFAULT_CURRENCY: &str = "USD";
const DEFAULT_PAYMENT_TIMEOUT_SECS: u64 = 15;
const DEFAULT_CARRIER_TIMEOUT_SECS: u64 = 20;
const DEFAULT_WEBHOOK_TOLERANCE_SECS: u64 = 300;

/// How the order commit obtains atomicity.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, strum::Display, strum::EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum TransactionMode {
    /// Check the database at startup and degrade when transactions are unavailable.
    Auto,
    /// Refuse to start without transaction support.
    Required,
    /// Always run the sequential, compensating commit path.
    Degraded,
}

/// Application configuration structure with validation
#[derive(Clone, Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct AppConfig {
    /// Database connection URL
    #[validate(length(min = 1))]
    pub database_url: String,

    /// Server host address
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Application environment
    pub environment: String,

    #[serde(default = "default_log_level")]
    #[validate(custom = "validate_log_level")]
    pub log_level: String,

    /// Log in JSON format (structured logging)
    #[serde(default)]
    pub log_json: bool,

    /// Whether to run database migrations on startup
    #[serde(default)]
    pub auto_migrate: bool,

    /// DB pool: max connections
    #[serde(default = "default_db_max_connections")]
    pub db_max_connections: u32,

    /// DB pool: min connections
    #[serde(default = "default_db_min_connections")]
    pub db_min_connections: u32,

    /// DB timeouts (seconds)
    #[serde(default = "default_db_connect_timeout_secs")]
    pub db_connect_timeout_secs: u64,
    #[serde(default = "default_db_idle_timeout_secs")]
    pub db_idle_timeout_secs: u64,
    #[serde(default = "default_db_acquire_timeout_secs")]
    pub db_acquire_timeout_secs: u64,

    /// Commit atomicity: auto, required or degraded
    #[serde(default = "default_transaction_mode")]
    pub transaction_mode: TransactionMode,

    /// Currency used when a gateway does not configure its own
    #[serde(default = "default_currency")]
    #[validate(custom = "validate_currency")]
    pub default_currency: String,

    // ========== Payment Providers ==========
    /// Upper bound for a single provider call during checkout
    #[serde(default = "default_payment_timeout_secs")]
    #[validate(range(min = 1, max = 120))]
    pub payment_timeout_secs: u64,

    #[serde(default = "default_stripe_api_base")]
    pub stripe_api_base: String,

    #[serde(default = "default_razorpay_api_base")]
    pub razorpay_api_base: String,

    /// Fallback used when the stripe gateway config carries no webhookSecret
    #[serde(default)]
    pub stripe_webhook_secret: Option<String>,

    /// Fallback used when the razorpay gateway config carries no webhookSecret
    #[serde(default)]
    pub razorpay_webhook_secret: Option<String>,

    /// Accepted clock skew for stripe signature timestamps (seconds)
    #[serde(default = "default_webhook_tolerance_secs")]
    pub stripe_webhook_tolerance_secs: u64,

    // ========== Courier ==========
    #[serde(default = "default_carrier_api_base")]
    pub carrier_api_base: String,

    #[serde(default)]
    pub carrier_email: Option<String>,

    #[serde(default)]
    pub carrier_password: Option<String>,

    #[serde(default = "default_carrier_pickup_location")]
    pub carrier_pickup_location: String,

    #[serde(default = "default_carrier_timeout_secs")]
    #[validate(range(min = 1, max = 120))]
    pub carrier_timeout_secs: u64,

    /// Extra courier vocabulary, `CARRIER TEXT:status` comma-separated.
    /// Example: "IN TRANSIT:shipped,RTO DELIVERED:return_to_origin"
    #[serde(default)]
    #[validate(custom = "validate_tracking_overrides")]
    pub tracking_status_overrides: Option<String>,
}

impl AppConfig {
    /// Creates a configuration with defaults for everything but the essentials.
    pub fn new(database_url: String, host: String, port: u16, environment: String) -> Self {
        Self {
            database_url,
            host,
            port,
            environment,
            log_level: default_log_level(),
            log_json: false,
            auto_migrate: false,
            db_max_connections: default_db_max_connections(),
            db_min_connections: default_db_min_connections(),
            db_connect_timeout_secs: default_db_connect_timeout_secs(),
            db_idle_timeout_secs: default_db_idle_timeout_secs(),
            db_acquire_timeout_secs: default_db_acquire_timeout_secs(),
            transaction_mode: default_transaction_mode(),
            default_currency: default_currency(),
            payment_timeout_secs: default_payment_timeout_secs(),
            stripe_api_base: default_stripe_api_base(),
            razorpay_api_base: default_razorpay_api_base(),
            stripe_webhook_secret: None,
            razorpay_webhook_secret: None,
            stripe_webhook_tolerance_secs: default_webhook_tolerance_secs(),
            carrier_api_base: default_carrier_api_base(),
            carrier_email: None,
            carrier_password: None,
            carrier_pickup_location: default_carrier_pickup_location(),
            carrier_timeout_secs: default_carrier_timeout_secs(),
            tracking_status_overrides: None,
        }
    }

    pub fn is_production(&self) -> bool {
        self.environment.eq_ignore_ascii_case("production")
    }

    pub fn log_level(&self) -> &str {
        &self.log_level
    }

    /// Parses `tracking_status_overrides` into (carrier text, status) pairs.
    pub fn tracking_override_pairs(&self) -> Vec<(String, String)> {
        self.tracking_status_overrides
            .as_deref()
            .map(parse_override_pairs)
            .unwrap_or_default()
    }
}

fn parse_override_pairs(raw: &str) -> Vec<(String, String)> {
    raw.split(',')
        .filter(|entry| !entry.trim().is_empty())
        .filter_map(|entry| {
            let (text, status) = entry.rsplit_once(':')?;
            Some((text.trim().to_string(), status.trim().to_string()))
        })
        .collect()
}

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum AppConfigError {
    #[error("Configuration loading failed: {0}")]
    Load(#[from] ConfigError),

    #[error("Configuration validation failed: {0}")]
    Validation(#[from] validator::ValidationErrors),
}

fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_db_max_connections() -> u32 {
    10
}

fn default_db_min_connections() -> u32 {
    1
}

fn default_db_connect_timeout_secs() -> u64 {
    30
}

fn default_db_idle_timeout_secs() -> u64 {
    600
}

fn default_db_acquire_timeout_secs() -> u64 {
    8
}

fn default_transaction_mode() -> TransactionMode {
    TransactionMode::Auto
}

fn default_currency() -> String {
    DEFAULT_CURRENCY.to_string()
}

fn default_payment_timeout_secs() -> u64 {
    DEFAULT_PAYMENT_TIMEOUT_SECS
}

fn default_stripe_api_base() -> String {
    "https://api.stripe.com".to_string()
}

fn default_razorpay_api_base() -> String {
    "https://api.razorpay.com".to_string()
}

fn default_webhook_tolerance_secs() -> u64 {
    DEFAULT_WEBHOOK_TOLERANCE_SECS
}

fn default_carrier_api_base() -> String {
    "https://apiv2.shiprocket.in/v1/external".to_string()
}

fn default_carrier_pickup_location() -> String {
    "Primary".to_string()
}

fn default_carrier_timeout_secs() -> u64 {
    DEFAULT_CARRIER_TIMEOUT_SECS
}

/// Validates log level values
fn validate_log_level(level: &str) -> Result<(), ValidationError> {
    let valid_levels = ["trace", "debug", "info", "warn", "error"];
    if valid_levels.contains(&level.to_lowercase().as_str()) {
        Ok(())
    } else {
        let mut err = ValidationError::new("log_level");
        err.message = Some("Must be one of: trace, debug, info, warn, error".into());
        Err(err)
    }
}

fn validate_currency(code: &str) -> Result<(), ValidationError> {
    if code.len() == 3 && code.chars().all(|c| c.is_ascii_alphabetic()) {
        Ok(())
    } else {
        let mut err = ValidationError::new("default_currency");
        err.message = Some("Must be a three-letter ISO 4217 code".into());
        Err(err)
    }
}

fn validate_tracking_overrides(raw: &str) -> Result<(), ValidationError> {
    for entry in raw.split(',').filter(|e| !e.trim().is_empty()) {
        let valid = entry
            .rsplit_once(':')
            .map(|(text, status)| {
                !text.trim().is_empty()
                    && matches!(
                        status.trim(),
                        "shipped" | "delivered" | "return_to_origin"
                    )
            })
            .unwrap_or(false);
        if !valid {
            let mut err = ValidationError::new("tracking_status_overrides");
            err.message = Some(
                format!(
                    "Invalid entry '{}': expected TEXT:shipped|delivered|return_to_origin",
                    entry
                )
                .into(),
            );
            return Err(err);
        }
    }
    Ok(())
}

/// Initializes the global tracing subscriber.
pub fn init_tracing(level: &str, json: bool) {
    use tracing_subscriber::{fmt, EnvFilter};

    let default_directive = format!("storefront_api={},tower_http=debug", level);
    let filter_directive = env::var("RUST_LOG")
        .ok()
        .filter(|s| !s.trim().is_empty())
        .unwrap_or(default_directive);

    if json {
        let _ = fmt()
            .with_env_filter(EnvFilter::new(filter_directive))
            .json()
            .try_init();
    } else {
        let _ = fmt()
            .with_env_filter(EnvFilter::new(filter_directive))
            .try_init();
    }
}

/// Loads application configuration
///
/// Layers configuration sources in this order:
/// 1. Built-in defaults
/// 2. Default config (config/default.toml)
/// 3. Environment-specific config (config/{env}.toml)
/// 4. Environment variables (APP__*)
pub fn load_config() -> Result<AppConfig, AppConfigError> {
    let run_env = env::var("RUN_ENV")
        .or_else(|_| env::var("APP_ENV"))
        .unwrap_or_else(|_| DEFAULT_ENV.to_string());
    info!("Loading configuration for environment: {}", run_env);

    if !Path::new(CONFIG_DIR).exists() {
        info!(
            "Config directory '{}' not found; relying on built-in defaults and environment variables",
            CONFIG_DIR
        );
    }

    let config = Config::builder()
        .set_default("database_url", "sqlite://storefront.db?mode=rwc")?
        .set_default("host", "0.0.0.0")?
        .set_default("port", DEFAULT_PORT as i64)?
        .set_default("environment", DEFAULT_ENV)?
        .set_default("log_level", DEFAULT_LOG_LEVEL)?
        .set_default("log_json", false)?
        .add_source(File::with_name(&format!("{}/default", CONFIG_DIR)).required(false))
        .add_source(File::with_name(&format!("{}/{}", CONFIG_DIR, run_env)).required(false))
        .add_source(Environment::with_prefix("APP").separator("__"))
        .build()?;

    let app_config: AppConfig = config.try_deserialize()?;

    app_config.validate().map_err(|e| {
        error!("Configuration validation failed: {:?}", e);
        AppConfigError::Validation(e)
    })?;

    info!("Configuration loaded successfully");
    Ok(app_config)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_config() -> AppConfig {
        AppConfig::new(
            "sqlite::memory:".into(),
            "127.0.0.1".into(),
            8080,
            "test".into(),
        )
    }

    #[test]
    fn defaults_validate() {
        assert!(base_config().validate().is_ok());
    }

    #[test]
    fn rejects_bad_currency() {
        let mut cfg = base_config();
        cfg.default_currency = "dollars".into();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn parses_tracking_overrides() {
        let mut cfg = base_config();
        cfg.tracking_status_overrides =
            Some("IN TRANSIT:shipped, RTO DELIVERED:return_to_origin".into());
        assert!(cfg.validate().is_ok());
        assert_eq!(
            cfg.tracking_override_pairs(),
            vec![
                ("IN TRANSIT".to_string(), "shipped".to_string()),
                ("RTO DELIVERED".to_string(), "return_to_origin".to_string()),
            ]
        );
    }

    #[test]
    fn rejects_unknown_override_status() {
        let mut cfg = base_config();
        cfg.tracking_status_overrides = Some("LOST:vanished".into());
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn transaction_mode_parses() {
        assert_eq!(
            "degraded".parse::<TransactionMode>().ok(),
            Some(TransactionMode::Degraded)
        );
    }
}
