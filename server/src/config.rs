//! Configuration management for the server.

use std::env;

/// Server configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Server host address
    pub host: String,
    /// Server port
    pub port: u16,
    /// Value every request must carry in `X-Parse-Application-Id`
    pub application_id: String,
    /// Accepted `X-Parse-Master-Key`, if any
    pub master_key: Option<String>,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        let host = env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string());

        let port = env::var("PORT")
            .unwrap_or_else(|_| "1337".to_string())
            .parse()
            .map_err(|_| ConfigError::InvalidPort)?;

        let application_id =
            env::var("APPLICATION_ID").unwrap_or_else(|_| "tether-dev".to_string());
        if application_id.is_empty() {
            return Err(ConfigError::EmptyApplicationId);
        }

        let master_key = env::var("MASTER_KEY").ok().filter(|key| !key.is_empty());

        Ok(Self {
            host,
            port,
            application_id,
            master_key,
        })
    }

    /// Configuration for tests and embedding: loopback, ephemeral port.
    pub fn local(application_id: impl Into<String>, master_key: Option<String>) -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 0,
            application_id: application_id.into(),
            master_key,
        }
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("APPLICATION_ID must not be empty")]
    EmptyApplicationId,

    #[error("Invalid PORT value")]
    InvalidPort,
}
