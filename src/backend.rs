//! The backend a host mounts: one storage, one client cache, and the
//! managers that share them.

use std::sync::Arc;

use crate::client::{ClientCache, ClientFactory};
use crate::clock::{Clock, SystemClock};
use crate::config::{ConfigStore, CONFIG_KEY};
use crate::lease::LeaseCoordinator;
use crate::storage::Storage;
use crate::tokens::TokenManager;
use crate::users::UserManager;

pub struct Backend {
    storage: Arc<dyn Storage>,
    cache: Arc<ClientCache>,
    config: ConfigStore,
    users: Arc<UserManager>,
    tokens: Arc<TokenManager>,
    leases: LeaseCoordinator,
}

impl Backend {
    pub fn new(storage: Arc<dyn Storage>, factory: Arc<dyn ClientFactory>) -> Self {
        Self::with_clock(storage, factory, Arc::new(SystemClock))
    }

    pub fn with_clock(
        storage: Arc<dyn Storage>,
        factory: Arc<dyn ClientFactory>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let cache = Arc::new(ClientCache::new(factory));
        let config = ConfigStore::new(storage.clone(), cache.clone());
        let users = Arc::new(UserManager::new(
            storage.clone(),
            cache.clone(),
            clock.clone(),
        ));
        let tokens = Arc::new(TokenManager::new(
            storage.clone(),
            cache.clone(),
            clock.clone(),
        ));
        let leases = LeaseCoordinator::new(users.clone(), tokens.clone(), clock);

        Self {
            storage,
            cache,
            config,
            users,
            tokens,
            leases,
        }
    }

    pub fn storage(&self) -> &Arc<dyn Storage> {
        &self.storage
    }

    pub fn client_cache(&self) -> &ClientCache {
        &self.cache
    }

    pub fn config(&self) -> &ConfigStore {
        &self.config
    }

    pub fn users(&self) -> &UserManager {
        &self.users
    }

    pub fn tokens(&self) -> &TokenManager {
        &self.tokens
    }

    pub fn leases(&self) -> &LeaseCoordinator {
        &self.leases
    }

    /// Host notification that `key` changed outside this process, e.g. by
    /// replication.
    pub async fn invalidate(&self, key: &str) {
        if key == CONFIG_KEY {
            self.cache.invalidate().await;
        }
    }
}
