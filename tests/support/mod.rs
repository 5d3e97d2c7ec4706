#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex as StdMutex};

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use credbroker::client::{
    ApiToken, ClientFactory, DownstreamError, IdentityProvider, UserRecord,
};
use credbroker::clock::{Clock, ManualClock};
use credbroker::config::{ConfigWrite, ConnectionConfig};
use credbroker::storage::MemoryStorage;
use credbroker::Backend;
use secrecy::{ExposeSecret, SecretString};
use tokio::sync::Mutex;

#[derive(Debug, Default)]
pub struct FakeState {
    /// username -> password
    pub users: HashMap<String, String>,
    /// token id -> token name
    pub tokens: HashMap<String, String>,
    pub next_token: usize,
    pub fail_create_user: bool,
    pub fail_delete_user: bool,
    pub fail_validate: bool,
    pub fail_revoke: bool,
    /// Name reported back for generated tokens, instead of the requested one.
    pub issued_token_name: Option<String>,
}

/// In-memory stand-in for a Jenkins instance.
#[derive(Debug, Default)]
pub struct FakeIdentityProvider {
    pub state: Mutex<FakeState>,
}

impl FakeIdentityProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn has_user(&self, username: &str) -> bool {
        self.state.lock().await.users.contains_key(username)
    }

    pub async fn has_token(&self, token_id: &str) -> bool {
        self.state.lock().await.tokens.contains_key(token_id)
    }

    pub async fn token_count(&self) -> usize {
        self.state.lock().await.tokens.len()
    }
}

fn boom() -> DownstreamError {
    DownstreamError::Status {
        status: 500,
        body: "boom".to_string(),
    }
}

#[async_trait]
impl IdentityProvider for FakeIdentityProvider {
    async fn validate(&self) -> Result<(), DownstreamError> {
        if self.state.lock().await.fail_validate {
            return Err(DownstreamError::Status {
                status: 401,
                body: "unauthorized".to_string(),
            });
        }
        Ok(())
    }

    async fn create_user(
        &self,
        username: &str,
        password: &SecretString,
        fullname: &str,
        email: &str,
    ) -> Result<UserRecord, DownstreamError> {
        let mut state = self.state.lock().await;
        if state.fail_create_user {
            return Err(boom());
        }
        state
            .users
            .insert(username.to_string(), password.expose_secret().to_string());
        Ok(UserRecord {
            username: username.to_string(),
            fullname: fullname.to_string(),
            email: email.to_string(),
        })
    }

    async fn delete_user(&self, username: &str) -> Result<(), DownstreamError> {
        let mut state = self.state.lock().await;
        if state.fail_delete_user {
            return Err(boom());
        }
        match state.users.remove(username) {
            Some(_) => Ok(()),
            None => Err(DownstreamError::NotFound),
        }
    }

    async fn generate_token(&self, name: &str) -> Result<ApiToken, DownstreamError> {
        let mut state = self.state.lock().await;
        state.next_token += 1;
        let id = format!("uuid-{}", state.next_token);
        let issued = state
            .issued_token_name
            .clone()
            .unwrap_or_else(|| name.to_string());
        state.tokens.insert(id.clone(), issued.clone());
        Ok(ApiToken {
            name: issued,
            id,
            value: SecretString::from(format!("value-{}", state.next_token)),
        })
    }

    async fn revoke_token(&self, token_id: &str) -> Result<(), DownstreamError> {
        let mut state = self.state.lock().await;
        if state.fail_revoke {
            return Err(boom());
        }
        match state.tokens.remove(token_id) {
            Some(_) => Ok(()),
            None => Err(DownstreamError::NotFound),
        }
    }
}

/// Hands out one shared fake and records every build.
#[derive(Default)]
pub struct CountingFactory {
    pub fake: Arc<FakeIdentityProvider>,
    builds: AtomicUsize,
    configs: StdMutex<Vec<ConnectionConfig>>,
}

impl CountingFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn builds(&self) -> usize {
        self.builds.load(Ordering::SeqCst)
    }

    pub fn configs(&self) -> Vec<ConnectionConfig> {
        self.configs.lock().unwrap().clone()
    }
}

impl ClientFactory for CountingFactory {
    fn build(
        &self,
        config: &ConnectionConfig,
    ) -> Result<Arc<dyn IdentityProvider>, DownstreamError> {
        self.builds.fetch_add(1, Ordering::SeqCst);
        self.configs.lock().unwrap().push(config.clone());
        Ok(self.fake.clone())
    }
}

pub struct Harness {
    pub backend: Backend,
    pub storage: Arc<MemoryStorage>,
    pub factory: Arc<CountingFactory>,
    pub clock: Arc<ManualClock>,
}

impl Harness {
    pub fn fake(&self) -> &FakeIdentityProvider {
        &self.factory.fake
    }

    pub fn clock_now(&self) -> DateTime<Utc> {
        self.clock.now()
    }
}

pub fn unconfigured() -> Harness {
    let storage = Arc::new(MemoryStorage::new());
    let factory = Arc::new(CountingFactory::new());
    let clock = Arc::new(ManualClock::new(
        Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap(),
    ));
    let backend = Backend::with_clock(storage.clone(), factory.clone(), clock.clone());
    Harness {
        backend,
        storage,
        factory,
        clock,
    }
}

/// A backend with an admin configuration already stored.
pub async fn configured() -> Result<Harness> {
    let harness = unconfigured();
    harness
        .backend
        .config()
        .write(ConfigWrite::new("admin", "admin", "http://jenkins.local:8080").with_validate(false))
        .await?;
    Ok(harness)
}
