//! Environment configuration.

use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_PAYMENT_URL: &str = "https://sandbox.sslcommerz.com/gwprocess/v4/api.php";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    Missing(&'static str),

    #[error("invalid value for {name}: {value}")]
    Invalid { name: &'static str, value: String },
}

/// Service settings, read once at start-up.
#[derive(Clone, Debug)]
pub struct Config {
    pub port: u16,
    pub database_url: Option<String>,
    pub database_max_connections: u32,
    pub nats_url: Option<String>,
    pub gateway: GatewayConfig,
}

/// Everything the payment adapter needs besides the order itself.
#[derive(Clone, Debug)]
pub struct GatewayConfig {
    pub store_id: String,
    pub store_password: String,
    pub payment_url: String,
    /// Absolute base the callback URLs are built on, without trailing slash.
    pub public_base_url: String,
    pub currency: String,
    pub country: String,
    pub timeout: Duration,
}

impl GatewayConfig {
    pub fn callback_url(&self, outcome: &str, order_id: impl std::fmt::Display) -> String {
        format!("{}/payment/{outcome}/{order_id}", self.public_base_url.trim_end_matches('/'))
    }
}

impl Config {
    /// Loads `.env` if present, then reads the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let port = parse_or(&get, "PORT", 8083)?;
        let gateway = GatewayConfig {
            store_id: get("SSLCOMMERZ_STORE_ID").ok_or(ConfigError::Missing("SSLCOMMERZ_STORE_ID"))?,
            store_password: get("SSLCOMMERZ_STORE_PASSWORD").ok_or(ConfigError::Missing("SSLCOMMERZ_STORE_PASSWORD"))?,
            payment_url: get("SSLCOMMERZ_PAYMENT_URL").unwrap_or_else(|| DEFAULT_PAYMENT_URL.to_string()),
            public_base_url: get("PUBLIC_BASE_URL").unwrap_or_else(|| format!("http://localhost:{port}")),
            currency: get("SHOP_CURRENCY").unwrap_or_else(|| "BDT".to_string()),
            country: get("SHOP_COUNTRY").unwrap_or_else(|| "Bangladesh".to_string()),
            timeout: Duration::from_secs(parse_or(&get, "GATEWAY_TIMEOUT_SECS", 30)?),
        };
        Ok(Self {
            port,
            database_url: get("DATABASE_URL"),
            database_max_connections: parse_or(&get, "DATABASE_MAX_CONNECTIONS", 10)?,
            nats_url: get("NATS_URL"),
            gateway,
        })
    }
}

fn parse_or<T: std::str::FromStr>(get: &impl Fn(&str) -> Option<String>, name: &'static str, default: T) -> Result<T, ConfigError> {
    match get(name) {
        Some(value) => value.parse().map_err(|_| ConfigError::Invalid { name, value }),
        None => Ok(default),
    }
}
