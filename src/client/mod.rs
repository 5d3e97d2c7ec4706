//! Downstream identity system.
//!
//! Lifecycle managers only see the [`IdentityProvider`] capabilities. The
//! concrete Jenkins adapter lives in [`jenkins`], and [`ClientCache`] owns
//! the one live client built from the stored configuration.

mod cache;
pub mod jenkins;

pub use cache::ClientCache;
pub use jenkins::{JenkinsClient, JenkinsClientFactory};

use std::sync::Arc;

use async_trait::async_trait;
use secrecy::SecretString;

use crate::config::ConnectionConfig;

/// A user as reported back by the downstream system.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserRecord {
    pub username: String,
    pub fullname: String,
    pub email: String,
}

/// A freshly generated API token. The value is only ever seen once.
#[derive(Debug)]
pub struct ApiToken {
    pub name: String,
    pub id: String,
    pub value: SecretString,
}

#[derive(Debug, thiserror::Error)]
pub enum DownstreamError {
    /// The user or token does not exist downstream.
    #[error("not found")]
    NotFound,

    #[error("unexpected status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("invalid response: {0}")]
    InvalidResponse(String),

    #[error("invalid client configuration: {0}")]
    InvalidConfig(String),
}

impl DownstreamError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound)
    }
}

/// The credential capabilities consumed from the downstream system.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Connectivity and authentication probe.
    async fn validate(&self) -> Result<(), DownstreamError>;

    async fn create_user(
        &self,
        username: &str,
        password: &SecretString,
        fullname: &str,
        email: &str,
    ) -> Result<UserRecord, DownstreamError>;

    /// Returns [`DownstreamError::NotFound`] if the user is already gone.
    async fn delete_user(&self, username: &str) -> Result<(), DownstreamError>;

    async fn generate_token(&self, name: &str) -> Result<ApiToken, DownstreamError>;

    /// Returns [`DownstreamError::NotFound`] if the token is already gone.
    async fn revoke_token(&self, token_id: &str) -> Result<(), DownstreamError>;
}

/// Builds downstream clients from a complete configuration.
///
/// Building must not perform network I/O.
pub trait ClientFactory: Send + Sync {
    fn build(&self, config: &ConnectionConfig) -> Result<Arc<dyn IdentityProvider>, DownstreamError>;
}
