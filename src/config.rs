//! Configuration from the environment.

use secrecy::SecretString;

use crate::error::ConfigError;

const DEFAULT_PORT: u16 = 5001;
const DEFAULT_CUSTOMERS_TABLE: &str = "Customers";

/// Airtable connection settings.
#[derive(Debug, Clone)]
pub struct AirtableConfig {
    pub api_key: SecretString,
    pub base_id: String,
    /// Table holding one row per customer.
    pub table: String,
}

/// Twilio API credentials.
#[derive(Debug, Clone)]
pub struct TwilioConfig {
    pub account_sid: String,
    pub auth_token: SecretString,
}

/// Top-level service configuration.
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    pub port: u16,
    pub airtable: AirtableConfig,
    pub twilio: TwilioConfig,
}

impl BridgeConfig {
    /// Build the configuration from environment variables.
    ///
    /// Credentials are required; `PORT` defaults to 5001 and the customers
    /// table name to `Customers`.
    pub fn from_env() -> Result<Self, ConfigError> {
        let port = match std::env::var("PORT") {
            Ok(raw) => raw.parse().map_err(|_| ConfigError::InvalidValue {
                key: "PORT".to_string(),
                message: format!("not a port number: {raw}"),
            })?,
            Err(_) => DEFAULT_PORT,
        };

        Ok(Self {
            port,
            airtable: AirtableConfig {
                api_key: SecretString::from(require_env("AIRTABLE_API_KEY")?),
                base_id: require_env("AIRTABLE_BASE_ID")?,
                table: std::env::var("AIRTABLE_CUSTOMERS_TABLE")
                    .unwrap_or_else(|_| DEFAULT_CUSTOMERS_TABLE.to_string()),
            },
            twilio: TwilioConfig {
                account_sid: require_env("TWILIO_ACCOUNT_SID")?,
                auth_token: SecretString::from(require_env("TWILIO_AUTH_TOKEN")?),
            },
        })
    }
}

fn require_env(name: &str) -> Result<String, ConfigError> {
    std::env::var(name).map_err(|_| ConfigError::MissingEnvVar(name.to_string()))
}
