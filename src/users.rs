//! Ephemeral downstream users.
//!
//! A `users/<name>` record exists exactly while the downstream user does. The
//! record doubles as the lease internal data and never holds the password.

use std::sync::Arc;
use std::time::Duration;

use secrecy::SecretString;
use serde::{Deserialize, Serialize};

use crate::client::ClientCache;
use crate::clock::Clock;
use crate::error::{BrokerError, Result};
use crate::lease::{InternalData, Lease, SecretResponse, UserInternalData};
use crate::paths::{user_key, validate_name, USERS_PREFIX};
use crate::storage::{Storage, StorageEntry};

/// A user creation request.
#[derive(Debug)]
pub struct NewUser {
    pub username: String,
    pub password: SecretString,
    pub fullname: String,
    pub email: String,
    /// Zero defers to the host default.
    pub ttl: Duration,
    pub max_ttl: Duration,
}

impl NewUser {
    pub fn new(
        username: impl Into<String>,
        password: impl Into<String>,
        fullname: impl Into<String>,
        email: impl Into<String>,
    ) -> Self {
        Self {
            username: username.into(),
            password: SecretString::from(password.into()),
            fullname: fullname.into(),
            email: email.into(),
            ttl: Duration::ZERO,
            max_ttl: Duration::ZERO,
        }
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn with_max_ttl(mut self, max_ttl: Duration) -> Self {
        self.max_ttl = max_ttl;
        self
    }
}

/// Public view of a user, as returned on create and read.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserView {
    pub username: String,
    pub fullname: String,
    pub email: String,
}

impl From<&UserInternalData> for UserView {
    fn from(user: &UserInternalData) -> Self {
        Self {
            username: user.username.clone(),
            fullname: user.fullname.clone(),
            email: user.email.clone(),
        }
    }
}

pub struct UserManager {
    storage: Arc<dyn Storage>,
    cache: Arc<ClientCache>,
    clock: Arc<dyn Clock>,
}

impl UserManager {
    pub fn new(storage: Arc<dyn Storage>, cache: Arc<ClientCache>, clock: Arc<dyn Clock>) -> Self {
        Self {
            storage,
            cache,
            clock,
        }
    }

    /// Existence probe used to reject duplicate creation.
    pub async fn exists(&self, username: &str) -> Result<bool> {
        let key = user_key(username);
        let entry = self
            .storage
            .get(&key)
            .await
            .map_err(|e| BrokerError::storage("existence check", key, e))?;
        Ok(entry.is_some())
    }

    /// Create the downstream user and record it.
    ///
    /// The existence check and the creation are not atomic; two concurrent
    /// creates of a new name both reach the downstream system, which decides.
    pub async fn create(&self, user: NewUser) -> Result<SecretResponse<UserView>> {
        validate_name("user", &user.username)?;
        if self.exists(&user.username).await? {
            return Err(BrokerError::AlreadyExists {
                kind: "user",
                name: user.username,
            });
        }

        let client = self.cache.get(self.storage.as_ref()).await?;
        let created = client
            .create_user(&user.username, &user.password, &user.fullname, &user.email)
            .await
            .map_err(|e| BrokerError::downstream("creating user", user.username.clone(), e))?;

        let record = UserInternalData {
            username: created.username,
            fullname: created.fullname,
            email: created.email,
            ttl: user.ttl,
            max_ttl: user.max_ttl,
        };

        let key = user_key(&user.username);
        let entry = StorageEntry::json(key.clone(), &record)
            .map_err(|e| BrokerError::storage("encode", key.clone(), e))?;
        self.storage
            .put(&entry)
            .await
            .map_err(|e| BrokerError::storage("write", key.clone(), e))?;

        tracing::info!(username = %record.username, "Created user");

        let view = UserView::from(&record);
        let lease = Lease::issue(&key, &InternalData::User(record), self.clock.now());
        Ok(SecretResponse { data: view, lease })
    }

    async fn load(&self, username: &str) -> Result<Option<UserInternalData>> {
        let key = user_key(username);
        let entry = self
            .storage
            .get(&key)
            .await
            .map_err(|e| BrokerError::storage("read", key.clone(), e))?;

        entry
            .map(|entry| entry.decode_json())
            .transpose()
            .map_err(|e| BrokerError::storage("decode", key, e))
    }

    /// `None` when no such user was created. A name that could never have
    /// been created reads as absent.
    pub async fn read(&self, username: &str) -> Result<Option<UserView>> {
        if validate_name("user", username).is_err() {
            return Ok(None);
        }
        Ok(self.load(username).await?.as_ref().map(UserView::from))
    }

    pub async fn list(&self) -> Result<Vec<String>> {
        let prefix = format!("{USERS_PREFIX}/");
        self.storage
            .list(&prefix)
            .await
            .map_err(|e| BrokerError::storage("list", prefix, e))
    }

    /// Delete the downstream user, then its record.
    ///
    /// A downstream failure leaves the record in place so the delete can be
    /// retried. A user already gone downstream counts as deleted.
    pub async fn delete(&self, username: &str) -> Result<()> {
        validate_name("user", username)?;
        let client = self.cache.get(self.storage.as_ref()).await?;

        match client.delete_user(username).await {
            Ok(()) => {}
            Err(e) if e.is_not_found() => {
                tracing::warn!(username = %username, "User already absent downstream");
            }
            Err(e) => return Err(BrokerError::downstream("deleting user", username, e)),
        }

        let key = user_key(username);
        self.storage
            .delete(&key)
            .await
            .map_err(|e| BrokerError::storage("delete", key, e))?;

        tracing::info!(username = %username, "Deleted user");
        Ok(())
    }
}
