//! Application configuration management.
//!
//! This module handles loading configuration from environment variables.
//! It uses the `envy` crate to automatically deserialize environment variables into a type-safe struct.

use std::time::Duration;

use serde::Deserialize;

use crate::models::payment::InvoiceMode;

/// Application configuration loaded from environment variables.
///
/// # Environment Variables
///
/// - `PAYMENT_SERVER_KEY` (required): gateway server key, also the webhook signing secret
/// - `SERVER_PORT` (optional): HTTP server port, defaults to 3000
/// - `DATABASE_URL` (optional): PostgreSQL connection string for the order journal
/// - `CATALOG_URL` (optional): CSV export of the product sheet
/// - `STOCK_LEDGER_URL` / `STOCK_LEDGER_SECRET` (optional): remote stock ledger
/// - `MESSENGER_URL` (optional): outbound relay of the chat transport
/// - `ADMIN_API_KEY` (optional): bearer key for operator endpoints
/// - `BRIDGE_API_KEY` (optional): bearer key the chat transport bridge
///   presents on `/api/v1/messages`; without it inbound chat is refused
///
/// The remaining fields tune timeouts and retention and all have defaults.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default = "default_port")]
    pub server_port: u16,

    pub database_url: Option<String>,

    pub catalog_url: Option<String>,

    #[serde(default = "default_catalog_ttl")]
    pub catalog_ttl_secs: u64,

    pub stock_ledger_url: Option<String>,

    #[serde(default)]
    pub stock_ledger_secret: String,

    pub payment_server_key: String,

    #[serde(default)]
    pub payment_is_production: bool,

    #[serde(default)]
    pub payment_mode: InvoiceMode,

    pub public_base_url: Option<String>,

    pub messenger_url: Option<String>,

    /// Upper bound on a single outbound chat message, in characters.
    pub message_max_len: Option<usize>,

    pub admin_api_key: Option<String>,

    pub bridge_api_key: Option<String>,

    /// Comma separated chat ids allowed to run admin chat commands.
    #[serde(default)]
    pub admins: String,

    #[serde(default)]
    pub admin_contact: String,

    #[serde(default = "default_order_prefix")]
    pub order_id_prefix: String,

    #[serde(default = "default_http_timeout")]
    pub http_timeout_secs: u64,

    #[serde(default = "default_reservation_timeout")]
    pub reservation_timeout_secs: u64,

    #[serde(default = "default_terminal_retention")]
    pub terminal_retention_secs: u64,

    #[serde(default = "default_reconcile_interval")]
    pub reconcile_interval_secs: u64,
}

/// Default port if SERVER_PORT environment variable is not set.
fn default_port() -> u16 {
    3000
}

fn default_catalog_ttl() -> u64 {
    300
}

fn default_order_prefix() -> String {
    "ORD".to_string()
}

fn default_http_timeout() -> u64 {
    15
}

fn default_reservation_timeout() -> u64 {
    3600
}

fn default_terminal_retention() -> u64 {
    86_400
}

fn default_reconcile_interval() -> u64 {
    300
}

/// Error raised while loading or validating configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error(transparent)]
    Env(#[from] envy::Error),

    #[error("{name} is not a valid http(s) URL: {value}")]
    InvalidUrl { name: &'static str, value: String },
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// This method first attempts to load a `.env` file (which is optional),
    /// then reads environment variables and deserializes them into a Config struct.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Required environment variables are missing (e.g., PAYMENT_SERVER_KEY)
    /// - Environment variable values cannot be parsed into expected types
    /// - A configured URL is not a parseable http(s) URL
    pub fn from_env() -> Result<Self, ConfigError> {
        // Try to load .env file if it exists (does nothing if not found)
        dotenvy::dotenv().ok();

        // Field names are automatically converted: payment_server_key -> PAYMENT_SERVER_KEY
        let config = envy::from_env::<Config>()?;
        config.validate()?;
        Ok(config)
    }

    /// Check every configured outbound URL.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let urls = [
            ("CATALOG_URL", &self.catalog_url),
            ("STOCK_LEDGER_URL", &self.stock_ledger_url),
            ("PUBLIC_BASE_URL", &self.public_base_url),
            ("MESSENGER_URL", &self.messenger_url),
        ];
        for (name, value) in urls {
            if let Some(value) = value {
                validate_http_url(name, value)?;
            }
        }
        Ok(())
    }

    /// Chat ids listed in `ADMINS`.
    pub fn admin_ids(&self) -> Vec<String> {
        self.admins
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect()
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }

    /// Age after which a settling/releasing claim counts as abandoned.
    ///
    /// Twice the HTTP timeout, so a live remote call always finishes first.
    pub fn claim_timeout(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.http_timeout_secs.saturating_mul(2) as i64)
    }

    pub fn catalog_ttl(&self) -> Duration {
        Duration::from_secs(self.catalog_ttl_secs)
    }

    pub fn reservation_timeout(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.reservation_timeout_secs as i64)
    }

    pub fn terminal_retention(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.terminal_retention_secs as i64)
    }
}

/// Validate a configured URL.
///
/// # Rules
///
/// - Must be a valid URL
/// - Must use HTTP or HTTPS
fn validate_http_url(name: &'static str, value: &str) -> Result<(), ConfigError> {
    let invalid = || ConfigError::InvalidUrl {
        name,
        value: value.to_string(),
    };

    let parsed = url::Url::parse(value).map_err(|_| invalid())?;
    match parsed.scheme() {
        "http" | "https" => Ok(()),
        _ => Err(invalid()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_config() -> Config {
        Config {
            server_port: 3000,
            database_url: None,
            catalog_url: None,
            catalog_ttl_secs: 300,
            stock_ledger_url: None,
            stock_ledger_secret: String::new(),
            payment_server_key: "server-key".to_string(),
            payment_is_production: false,
            payment_mode: InvoiceMode::Redirect,
            public_base_url: None,
            messenger_url: None,
            message_max_len: None,
            admin_api_key: None,
            bridge_api_key: None,
            admins: " 111@c.us, ,222@c.us ".to_string(),
            admin_contact: String::new(),
            order_id_prefix: "ORD".to_string(),
            http_timeout_secs: 15,
            reservation_timeout_secs: 3600,
            terminal_retention_secs: 86_400,
            reconcile_interval_secs: 300,
        }
    }

    #[test]
    fn admin_ids_are_trimmed_and_filtered() {
        let config = base_config();
        assert_eq!(config.admin_ids(), vec!["111@c.us", "222@c.us"]);
    }

    #[test]
    fn claim_timeout_outlasts_the_http_timeout() {
        let config = base_config();
        assert_eq!(config.claim_timeout(), chrono::Duration::seconds(30));
    }

    #[test]
    fn rejects_non_http_urls() {
        let mut config = base_config();
        config.stock_ledger_url = Some("ftp://ledger.example".to_string());
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidUrl {
                name: "STOCK_LEDGER_URL",
                ..
            })
        ));

        config.stock_ledger_url = Some("https://script.example/exec".to_string());
        assert!(config.validate().is_ok());
    }
}
