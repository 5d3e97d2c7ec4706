//! Connection configuration for the downstream system.
//!
//! Stored as a single JSON record under the `config` key. Every successful
//! write or delete invalidates the client cache, so the next request builds a
//! client from the configuration in effect.

use std::fmt;
use std::sync::Arc;

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

use crate::client::ClientCache;
use crate::error::{BrokerError, Result};
use crate::storage::{Storage, StorageEntry};

pub const CONFIG_KEY: &str = "config";

/// The stored connection configuration.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionConfig {
    pub username: String,
    pub password: String,
    pub url: String,
    #[serde(default)]
    pub validate: bool,
}

impl fmt::Debug for ConnectionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionConfig")
            .field("username", &self.username)
            .field("password", &"[REDACTED]")
            .field("url", &self.url)
            .field("validate", &self.validate)
            .finish()
    }
}

impl ConnectionConfig {
    /// Load the stored configuration, `None` if nothing is configured.
    pub async fn load(storage: &dyn Storage) -> Result<Option<Self>> {
        let entry = storage
            .get(CONFIG_KEY)
            .await
            .map_err(|e| BrokerError::storage("read", CONFIG_KEY, e))?;

        entry
            .map(|entry| entry.decode_json())
            .transpose()
            .map_err(|e| BrokerError::storage("decode", CONFIG_KEY, e))
    }

    /// Fails with [`BrokerError::ConfigurationMissing`] naming the first
    /// empty field.
    pub fn ensure_complete(&self) -> Result<()> {
        for (field, value) in [
            ("username", &self.username),
            ("password", &self.password),
            ("url", &self.url),
        ] {
            if value.is_empty() {
                return Err(BrokerError::ConfigurationMissing { field });
            }
        }
        Ok(())
    }

    pub fn view(&self) -> ConfigView {
        ConfigView {
            username: self.username.clone(),
            url: self.url.clone(),
        }
    }
}

/// What a config read returns. The password is never included.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigView {
    pub username: String,
    pub url: String,
}

/// Fields accepted by a config write. Absent fields keep their stored value
/// on update and are required on create.
#[derive(Debug, Default)]
pub struct ConfigWrite {
    pub username: Option<String>,
    pub password: Option<SecretString>,
    pub url: Option<String>,
    /// Probe the downstream system after saving. Defaults to true.
    pub validate: Option<bool>,
}

impl ConfigWrite {
    pub fn new(
        username: impl Into<String>,
        password: impl Into<String>,
        url: impl Into<String>,
    ) -> Self {
        Self {
            username: Some(username.into()),
            password: Some(SecretString::from(password.into())),
            url: Some(url.into()),
            validate: None,
        }
    }

    pub fn with_validate(mut self, validate: bool) -> Self {
        self.validate = Some(validate);
        self
    }
}

/// Reads and writes the `config` record.
pub struct ConfigStore {
    storage: Arc<dyn Storage>,
    cache: Arc<ClientCache>,
}

impl ConfigStore {
    pub fn new(storage: Arc<dyn Storage>, cache: Arc<ClientCache>) -> Self {
        Self { storage, cache }
    }

    pub async fn exists(&self) -> Result<bool> {
        let entry = self
            .storage
            .get(CONFIG_KEY)
            .await
            .map_err(|e| BrokerError::storage("existence check", CONFIG_KEY, e))?;
        Ok(entry.is_some())
    }

    pub async fn read(&self) -> Result<Option<ConfigView>> {
        let config = ConnectionConfig::load(self.storage.as_ref()).await?;
        Ok(config.as_ref().map(ConnectionConfig::view))
    }

    /// Create or update, depending on whether a configuration is stored.
    pub async fn write(&self, params: ConfigWrite) -> Result<()> {
        if self.exists().await? {
            self.update(params).await
        } else {
            self.create(params).await
        }
    }

    /// Create a configuration; username, password and url are required.
    pub async fn create(&self, params: ConfigWrite) -> Result<()> {
        let validate = params.validate.unwrap_or(true);
        let config = ConnectionConfig {
            username: params
                .username
                .ok_or(BrokerError::ConfigurationMissing { field: "username" })?,
            url: params
                .url
                .ok_or(BrokerError::ConfigurationMissing { field: "url" })?,
            password: params
                .password
                .ok_or(BrokerError::ConfigurationMissing { field: "password" })?
                .expose_secret()
                .to_string(),
            validate,
        };
        self.persist(config).await
    }

    /// Merge the given fields onto the stored configuration.
    pub async fn update(&self, params: ConfigWrite) -> Result<()> {
        let mut config = ConnectionConfig::load(self.storage.as_ref())
            .await?
            .ok_or(BrokerError::ConfigurationMissing { field: "config" })?;

        if let Some(username) = params.username {
            config.username = username;
        }
        if let Some(url) = params.url {
            config.url = url;
        }
        if let Some(password) = params.password {
            config.password = password.expose_secret().to_string();
        }
        config.validate = params.validate.unwrap_or(true);

        self.persist(config).await
    }

    async fn persist(&self, config: ConnectionConfig) -> Result<()> {
        let entry = StorageEntry::json(CONFIG_KEY, &config)
            .map_err(|e| BrokerError::storage("encode", CONFIG_KEY, e))?;
        self.storage
            .put(&entry)
            .await
            .map_err(|e| BrokerError::storage("write", CONFIG_KEY, e))?;

        // The record stays saved even if the probe fails.
        if config.validate {
            if let Err(e) = self.probe(&config).await {
                self.cache.invalidate().await;
                tracing::warn!(url = %config.url, error = %e, "Configuration saved but validation failed");
                return Err(e);
            }
        }

        self.cache.invalidate().await;
        tracing::info!(url = %config.url, username = %config.username, "Configuration saved");
        Ok(())
    }

    async fn probe(&self, config: &ConnectionConfig) -> Result<()> {
        let client = self.cache.build_detached(config)?;
        client.validate().await.map_err(BrokerError::Validation)
    }

    /// Remove the configuration. The cache is invalidated whatever storage
    /// reports.
    pub async fn delete(&self) -> Result<()> {
        let result = self.storage.delete(CONFIG_KEY).await;
        self.cache.invalidate().await;
        result.map_err(|e| BrokerError::storage("delete", CONFIG_KEY, e))?;
        tracing::info!("Configuration deleted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debug_redacts_password() {
        let config = ConnectionConfig {
            username: "admin".to_string(),
            password: "hunter2".to_string(),
            url: "http://localhost:8080".to_string(),
            validate: true,
        };
        let debug = format!("{config:?}");
        assert!(!debug.contains("hunter2"));
        assert!(debug.contains("admin"));
    }

    #[test]
    fn ensure_complete_names_first_missing_field() {
        let mut config = ConnectionConfig::default();
        assert!(matches!(
            config.ensure_complete(),
            Err(BrokerError::ConfigurationMissing { field: "username" })
        ));

        config.username = "admin".to_string();
        config.password = "admin".to_string();
        assert!(matches!(
            config.ensure_complete(),
            Err(BrokerError::ConfigurationMissing { field: "url" })
        ));

        config.url = "http://localhost:8080".to_string();
        assert!(config.ensure_complete().is_ok());
    }

    #[test]
    fn stored_record_shape() {
        let config = ConnectionConfig {
            username: "admin".to_string(),
            password: "pw".to_string(),
            url: "http://jenkins".to_string(),
            validate: false,
        };
        let value = serde_json::to_value(&config).unwrap();
        assert_eq!(
            value,
            serde_json::json!({
                "username": "admin",
                "password": "pw",
                "url": "http://jenkins",
                "validate": false,
            })
        );
    }
}
