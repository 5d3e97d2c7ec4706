use std::sync::Arc;

use tokio::sync::RwLock;

use crate::config::ConnectionConfig;
use crate::error::{BrokerError, Result};
use crate::storage::Storage;

use super::{ClientFactory, IdentityProvider};

/// Lazily built, invalidation-aware downstream client.
///
/// Readers share the cached client. Construction and invalidation take the
/// write lock, so concurrent first callers build exactly one client.
pub struct ClientCache {
    factory: Arc<dyn ClientFactory>,
    slot: RwLock<Option<Arc<dyn IdentityProvider>>>,
}

impl ClientCache {
    pub fn new(factory: Arc<dyn ClientFactory>) -> Self {
        Self {
            factory,
            slot: RwLock::new(None),
        }
    }

    /// Return the cached client, building it from the stored configuration
    /// on first use after an invalidation.
    pub async fn get(&self, storage: &dyn Storage) -> Result<Arc<dyn IdentityProvider>> {
        {
            let slot = self.slot.read().await;
            if let Some(client) = slot.as_ref() {
                return Ok(client.clone());
            }
        }

        let mut slot = self.slot.write().await;
        // Another caller may have built it while we waited for the write lock.
        if let Some(client) = slot.as_ref() {
            return Ok(client.clone());
        }

        let config = ConnectionConfig::load(storage)
            .await?
            .ok_or(BrokerError::ConfigurationMissing { field: "config" })?;
        let client = self.build_detached(&config)?;
        *slot = Some(client.clone());
        tracing::debug!(url = %config.url, "Built downstream client");

        Ok(client)
    }

    /// Build a client for `config` without touching the cache.
    pub fn build_detached(&self, config: &ConnectionConfig) -> Result<Arc<dyn IdentityProvider>> {
        config.ensure_complete()?;
        self.factory
            .build(config)
            .map_err(|e| BrokerError::downstream("building client for", config.url.clone(), e))
    }

    /// Drop the cached client; the next [`get`](Self::get) rebuilds it.
    pub async fn invalidate(&self) {
        let mut slot = self.slot.write().await;
        if slot.take().is_some() {
            tracing::debug!("Invalidated downstream client");
        }
    }

    pub async fn is_cached(&self) -> bool {
        self.slot.read().await.is_some()
    }
}
