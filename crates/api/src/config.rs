//! Application configuration loaded from environment variables.

use std::time::Duration;

use checkout::CheckoutConfig;

/// Output format of the tracing subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Text,
    Json,
}

/// Server configuration with sensible defaults.
///
/// Reads from environment variables:
/// - `HOST` — bind address (default: `"0.0.0.0"`)
/// - `PORT` — listen port (default: `8080`)
/// - `RUST_LOG` — tracing filter directive (default: `"info"`)
/// - `LOG_FORMAT` — `text` or `json` (default: `text`)
/// - `DATABASE_URL` — PostgreSQL URL; unset runs on the in-memory store
/// - `DATABASE_MAX_CONNECTIONS` — pool size (default: `10`)
/// - `RUN_MIGRATIONS` — apply migrations on startup (default: `true`)
/// - `CHECKOUT_TIMEOUT_MS` — deadline per checkout (default: `5000`)
/// - `REQUIRE_IDEMPOTENCY_KEY` — reject checkouts without a token (default: `true`)
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    pub log_format: LogFormat,
    pub database_url: Option<String>,
    pub database_max_connections: u32,
    pub run_migrations: bool,
    pub checkout_timeout: Duration,
    pub require_idempotency_key: bool,
}

impl Config {
    /// Loads configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds configuration from an arbitrary key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        Self {
            host: lookup("HOST").unwrap_or(defaults.host),
            port: lookup("PORT")
                .and_then(|p| p.parse().ok())
                .unwrap_or(defaults.port),
            log_level: lookup("RUST_LOG").unwrap_or(defaults.log_level),
            log_format: match lookup("LOG_FORMAT").as_deref() {
                Some("json") => LogFormat::Json,
                _ => LogFormat::Text,
            },
            database_url: lookup("DATABASE_URL").filter(|url| !url.is_empty()),
            database_max_connections: lookup("DATABASE_MAX_CONNECTIONS")
                .and_then(|n| n.parse().ok())
                .unwrap_or(defaults.database_max_connections),
            run_migrations: lookup("RUN_MIGRATIONS")
                .and_then(|v| parse_bool(&v))
                .unwrap_or(defaults.run_migrations),
            checkout_timeout: lookup("CHECKOUT_TIMEOUT_MS")
                .and_then(|ms| ms.parse().ok())
                .map(Duration::from_millis)
                .unwrap_or(defaults.checkout_timeout),
            require_idempotency_key: lookup("REQUIRE_IDEMPOTENCY_KEY")
                .and_then(|v| parse_bool(&v))
                .unwrap_or(defaults.require_idempotency_key),
        }
    }

    /// Returns the `"host:port"` bind address string.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn checkout(&self) -> CheckoutConfig {
        CheckoutConfig {
            timeout: self.checkout_timeout,
            require_client_key: self.require_idempotency_key,
            ..CheckoutConfig::default()
        }
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            log_level: "info".to_string(),
            log_format: LogFormat::Text,
            database_url: None,
            database_max_connections: 10,
            run_migrations: true,
            checkout_timeout: Duration::from_millis(5000),
            require_idempotency_key: true,
        }
    }
}
