//! Application configuration loaded from environment variables.

use std::str::FromStr;
use std::time::Duration;

use rust_decimal::Decimal;

/// Output format of the log subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pretty" | "text" => Ok(LogFormat::Pretty),
            "json" => Ok(LogFormat::Json),
            other => Err(format!("unknown log format '{other}'")),
        }
    }
}

/// Card payment processor the server talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GatewayMode {
    /// No processor: card payments are refused as unavailable.
    #[default]
    Disabled,
    /// In-process sandbox that approves every checkout. Local use only.
    Sandbox,
}

impl FromStr for GatewayMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "disabled" | "none" | "off" => Ok(GatewayMode::Disabled),
            "sandbox" => Ok(GatewayMode::Sandbox),
            other => Err(format!("unknown payment gateway '{other}'")),
        }
    }
}

/// Server configuration with sensible defaults.
///
/// Reads from environment variables:
/// - `HOST`: bind address (default: `"0.0.0.0"`)
/// - `PORT`: listen port (default: `3000`)
/// - `RUST_LOG`: tracing filter directive (default: `"info"`)
/// - `LOG_FORMAT`: `pretty` or `json` (default: `pretty`)
/// - `DATABASE_URL`: PostgreSQL URL; unset runs on the in-memory store
/// - `PAYMENT_GATEWAY`: `disabled` or `sandbox` (default: `disabled`)
/// - `GATEWAY_TIMEOUT_SECS`: budget per payment gateway call (default: `10`)
/// - `DEFAULT_DEPOSIT_PERCENT`: deposit share of a part-payment invoice (default: `30`)
/// - `SETTLEMENT_MAX_RETRIES`: retries after a version conflict (default: `3`)
/// - `ADMIN_ROOM`: real-time room admins listen on (default: `"admins"`)
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    pub log_format: LogFormat,
    pub database_url: Option<String>,
    pub payment_gateway: GatewayMode,
    pub gateway_timeout: Duration,
    pub deposit_percent: Decimal,
    pub settlement_max_retries: u32,
    pub admin_room: String,
}

impl Config {
    /// Loads configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds configuration from an arbitrary key lookup.
    ///
    /// Values that fail to parse fall back to their defaults with a warning.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let parsed = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        Self {
            host: parsed("HOST").unwrap_or(defaults.host),
            port: parse_or("PORT", parsed("PORT"), defaults.port),
            log_level: parsed("RUST_LOG").unwrap_or(defaults.log_level),
            log_format: parse_or("LOG_FORMAT", parsed("LOG_FORMAT"), defaults.log_format),
            database_url: parsed("DATABASE_URL"),
            payment_gateway: parse_or(
                "PAYMENT_GATEWAY",
                parsed("PAYMENT_GATEWAY"),
                defaults.payment_gateway,
            ),
            gateway_timeout: Duration::from_secs(parse_or(
                "GATEWAY_TIMEOUT_SECS",
                parsed("GATEWAY_TIMEOUT_SECS"),
                defaults.gateway_timeout.as_secs(),
            )),
            deposit_percent: parse_or(
                "DEFAULT_DEPOSIT_PERCENT",
                parsed("DEFAULT_DEPOSIT_PERCENT"),
                defaults.deposit_percent,
            ),
            settlement_max_retries: parse_or(
                "SETTLEMENT_MAX_RETRIES",
                parsed("SETTLEMENT_MAX_RETRIES"),
                defaults.settlement_max_retries,
            ),
            admin_room: parsed("ADMIN_ROOM").unwrap_or(defaults.admin_room),
        }
    }

    /// Returns the `"host:port"` bind address string.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn parse_or<T>(key: &str, raw: Option<String>, default: T) -> T
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match raw {
        None => default,
        Some(raw) => raw.trim().parse().unwrap_or_else(|err| {
            tracing::warn!(key, value = %raw, error = %err, "Ignoring invalid configuration value");
            default
        }),
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            database_url: None,
            payment_gateway: GatewayMode::Disabled,
            gateway_timeout: Duration::from_secs(10),
            deposit_percent: Decimal::from(30),
            settlement_max_retries: 3,
            admin_room: "admins".to_string(),
        }
    }
}
