use serde::Deserialize;
use config::{Config, ConfigError, Environment, File};

#[derive(Debug, Deserialize, Clone)]
pub struct Settings {
    pub database: DatabaseConfig,
    pub billing: BillingConfig,
    #[serde(default)]
    pub notifications: NotificationConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

#[derive(Debug, Deserialize, Clone)]
pub struct BillingConfig {
    /// Seconds between billing-clock sweeps.
    pub sweep_interval_secs: u64,
    /// Wall-clock cap for a single sweep run.
    pub sweep_timeout_secs: u64,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct NotificationConfig {
    pub webhook: Option<WebhookConfig>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct WebhookConfig {
    pub enabled: bool,
    pub url: String,
    pub auth_token: Option<String>,
}

impl Settings {
    pub fn new() -> Result<Self, ConfigError> {
        let config = Config::builder()
            // Start with default values
            .set_default("database.max_connections", 10)?
            .set_default("billing.sweep_interval_secs", 86400)?
            .set_default("billing.sweep_timeout_secs", 600)?

            // Add config file if it exists
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name("config/local").required(false))

            // Add environment variables (with TROUPE__ prefix, double underscore separates levels)
            .add_source(Environment::with_prefix("TROUPE").separator("__"))

            .build()?;

        config.try_deserialize()
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            database: DatabaseConfig {
                url: "sqlite://troupe.db".to_string(),
                max_connections: 10,
            },
            billing: BillingConfig {
                sweep_interval_secs: 86400,
                sweep_timeout_secs: 600,
            },
            notifications: NotificationConfig { webhook: None },
        }
    }
}
