use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use validator::Validate;

const DEFAULT_LOG_LEVEL: &str = "info";
const DEFAULT_ENV: &str = "development";
const DEFAULT_HOST: &str = "127.0.0.1";
const DEFAULT_PORT: u16 = 8080;
const DEFAULT_DELIVERY_FEE_CENTS: i64 = 5000;
const DEFAULT_COD_FEE_CENTS: i64 = 1000;
const DEFAULT_PAYMENT_TIMEOUT_SECS: u64 = 15;
const DEV_DEFAULT_JWT_SECRET: &str =
    "this_is_a_development_secret_key_that_is_at_least_64_characters_long_for_testing";

/// Payment gateway configuration
#[derive(Clone, Debug, Deserialize, Validate)]
pub struct PaymentGatewayConfig {
    /// Base URL of the external payment gateway
    pub base_url: String,
    /// API key sent with gateway requests
    #[serde(default)]
    pub api_key: String,
    /// Request timeout; elapsing it surfaces as "payment pending", not failure
    #[serde(default = "default_payment_timeout")]
    pub timeout_secs: u64,
}

impl Default for PaymentGatewayConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:9900".to_string(),
            api_key: String::new(),
            timeout_secs: DEFAULT_PAYMENT_TIMEOUT_SECS,
        }
    }
}

/// Application configuration with validation
#[derive(Clone, Debug, Deserialize, Validate)]
pub struct AppConfig {
    /// Database connection URL
    pub database_url: String,

    /// JWT signing secret for bearer auth
    #[validate(length(min = 32, message = "JWT secret must be at least 32 characters"))]
    pub jwt_secret: String,

    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_env")]
    pub environment: String,

    #[serde(default = "default_log_level")]
    pub log_level: String,

    #[serde(default)]
    pub log_json: bool,

    /// Create tables at startup when they do not exist
    #[serde(default)]
    pub auto_migrate: bool,

    /// Currencies accepted for order creation (3-letter codes)
    #[serde(default = "default_currencies")]
    pub allowed_currencies: Vec<String>,

    /// Flat delivery surcharge, minor currency units
    #[serde(default = "default_delivery_fee")]
    pub delivery_fee_cents: i64,

    /// Flat cash-on-delivery surcharge, minor currency units
    #[serde(default = "default_cod_fee")]
    pub cod_fee_cents: i64,

    #[serde(default)]
    #[validate]
    pub payment: PaymentGatewayConfig,
}

fn default_host() -> String {
    DEFAULT_HOST.to_string()
}
fn default_port() -> u16 {
    DEFAULT_PORT
}
fn default_env() -> String {
    DEFAULT_ENV.to_string()
}
fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}
fn default_currencies() -> Vec<String> {
    vec!["EGP".to_string()]
}
fn default_delivery_fee() -> i64 {
    DEFAULT_DELIVERY_FEE_CENTS
}
fn default_cod_fee() -> i64 {
    DEFAULT_COD_FEE_CENTS
}
fn default_payment_timeout() -> u64 {
    DEFAULT_PAYMENT_TIMEOUT_SECS
}

impl AppConfig {
    pub fn currency_allowed(&self, code: &str) -> bool {
        self.allowed_currencies
            .iter()
            .any(|c| c.eq_ignore_ascii_case(code))
    }

    pub fn is_production(&self) -> bool {
        self.environment.eq_ignore_ascii_case("production")
    }

    /// Minimal configuration for tests and tools.
    pub fn for_tests(database_url: impl Into<String>) -> Self {
        Self {
            database_url: database_url.into(),
            jwt_secret: DEV_DEFAULT_JWT_SECRET.to_string(),
            host: default_host(),
            port: default_port(),
            environment: "test".to_string(),
            log_level: default_log_level(),
            log_json: false,
            auto_migrate: true,
            allowed_currencies: default_currencies(),
            delivery_fee_cents: DEFAULT_DELIVERY_FEE_CENTS,
            cod_fee_cents: DEFAULT_COD_FEE_CENTS,
            payment: PaymentGatewayConfig::default(),
        }
    }
}

/// Loads configuration from `config/default.toml` (optional), an
/// environment-specific file, and `STOREFRONT__`-prefixed variables.
pub fn load_config() -> Result<AppConfig, ConfigError> {
    let environment = std::env::var("ENVIRONMENT").unwrap_or_else(|_| DEFAULT_ENV.to_string());

    let cfg: AppConfig = Config::builder()
        .set_default("jwt_secret", DEV_DEFAULT_JWT_SECRET)?
        .set_default("database_url", "sqlite://storefront.db?mode=rwc")?
        .add_source(File::with_name("config/default").required(false))
        .add_source(File::with_name(&format!("config/{}", environment)).required(false))
        .add_source(Environment::with_prefix("STOREFRONT").separator("__"))
        .build()?
        .try_deserialize()?;

    cfg.validate()
        .map_err(|e| ConfigError::Message(format!("invalid configuration: {}", e)))?;

    if cfg.is_production() && cfg.jwt_secret == DEV_DEFAULT_JWT_SECRET {
        return Err(ConfigError::Message(
            "the development JWT secret must not be used in production".to_string(),
        ));
    }

    Ok(cfg)
}

/// Initializes the global tracing subscriber.
pub fn init_tracing(log_level: &str, json: bool) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(log_level.to_string()));

    if json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}
