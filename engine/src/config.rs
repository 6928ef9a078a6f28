//! Client configuration.
//!
//! Built in code with [`ClientConfig::builder`] or deserialized from JSON
//! with camelCase keys; everything but `applicationId` is optional.

use serde::{Deserialize, Serialize};

/// Which state store a client uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum StoreMode {
    /// One shared state per `(className, id)`.
    #[default]
    SingleInstance,
    /// One state per in-memory instance.
    PerInstance,
}

/// Configuration for a [`crate::Client`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientConfig {
    pub application_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub master_key: Option<String>,
    /// Send the master key with every request.
    #[serde(default)]
    pub use_master_key: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_token: Option<String>,
    #[serde(default = "new_installation_id")]
    pub installation_id: String,
    #[serde(default)]
    pub store_mode: StoreMode,
}

fn new_installation_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

impl ClientConfig {
    pub fn builder(application_id: impl Into<String>) -> ClientConfigBuilder {
        ClientConfigBuilder::new(application_id)
    }
}

/// Builder for client configuration.
pub struct ClientConfigBuilder {
    config: ClientConfig,
}

impl ClientConfigBuilder {
    pub fn new(application_id: impl Into<String>) -> Self {
        Self {
            config: ClientConfig {
                application_id: application_id.into(),
                master_key: None,
                use_master_key: false,
                session_token: None,
                installation_id: new_installation_id(),
                store_mode: StoreMode::default(),
            },
        }
    }

    pub fn master_key(mut self, key: impl Into<String>) -> Self {
        self.config.master_key = Some(key.into());
        self
    }

    pub fn use_master_key(mut self, enabled: bool) -> Self {
        self.config.use_master_key = enabled;
        self
    }

    pub fn session_token(mut self, token: impl Into<String>) -> Self {
        self.config.session_token = Some(token.into());
        self
    }

    pub fn installation_id(mut self, id: impl Into<String>) -> Self {
        self.config.installation_id = id.into();
        self
    }

    pub fn store_mode(mut self, mode: StoreMode) -> Self {
        self.config.store_mode = mode;
        self
    }

    pub fn build(self) -> ClientConfig {
        self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_defaults() {
        let config = ClientConfig::builder("app").build();
        assert_eq!(config.application_id, "app");
        assert_eq!(config.store_mode, StoreMode::SingleInstance);
        assert!(!config.use_master_key);
        assert!(!config.installation_id.is_empty());
    }

    #[test]
    fn builder_overrides() {
        let config = ClientConfig::builder("app")
            .master_key("secret")
            .use_master_key(true)
            .session_token("r:abc")
            .installation_id("install-1")
            .store_mode(StoreMode::PerInstance)
            .build();
        assert_eq!(config.master_key.as_deref(), Some("secret"));
        assert!(config.use_master_key);
        assert_eq!(config.session_token.as_deref(), Some("r:abc"));
        assert_eq!(config.installation_id, "install-1");
        assert_eq!(config.store_mode, StoreMode::PerInstance);
    }

    #[test]
    fn deserialize_from_json() {
        let config: ClientConfig = serde_json::from_value(serde_json::json!({
            "applicationId": "app",
            "masterKey": "secret",
            "storeMode": "perInstance",
        }))
        .unwrap();
        assert_eq!(config.application_id, "app");
        assert_eq!(config.master_key.as_deref(), Some("secret"));
        assert!(!config.use_master_key);
        assert_eq!(config.store_mode, StoreMode::PerInstance);
        assert!(!config.installation_id.is_empty());

        let json = serde_json::to_value(&config).unwrap();
        assert_eq!(json["storeMode"], "perInstance");
        assert!(json.get("sessionToken").is_none());
    }
}
