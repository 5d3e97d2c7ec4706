//! API tokens of the configured user.
//!
//! Tokens are never written to storage. The value appears once, in the
//! creation response; the ID needed to revoke it travels in the lease.

use std::sync::Arc;
use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};
use serde::{Serialize, Serializer};

use crate::client::ClientCache;
use crate::clock::Clock;
use crate::error::{BrokerError, Result};
use crate::lease::{InternalData, Lease, SecretResponse, TokenInternalData};
use crate::paths::{token_path, validate_name};
use crate::storage::Storage;

fn expose<S: Serializer>(value: &SecretString, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(value.expose_secret())
}

/// Public data of a freshly generated token.
#[derive(Debug, Serialize)]
pub struct TokenView {
    #[serde(serialize_with = "expose")]
    pub token: SecretString,
    pub token_name: String,
    pub token_id: String,
}

pub struct TokenManager {
    storage: Arc<dyn Storage>,
    cache: Arc<ClientCache>,
    clock: Arc<dyn Clock>,
}

impl TokenManager {
    pub fn new(storage: Arc<dyn Storage>, cache: Arc<ClientCache>, clock: Arc<dyn Clock>) -> Self {
        Self {
            storage,
            cache,
            clock,
        }
    }

    /// Generate a new token. Every call creates a distinct token.
    pub async fn create(
        &self,
        name: &str,
        ttl: Duration,
        max_ttl: Duration,
    ) -> Result<SecretResponse<TokenView>> {
        validate_name("token", name)?;
        let client = self.cache.get(self.storage.as_ref()).await?;
        let token = client
            .generate_token(name)
            .await
            .map_err(|e| BrokerError::downstream("creating token", name, e))?;

        tracing::info!(token_name = %token.name, token_id = %token.id, "Created token");

        let internal = InternalData::Token(TokenInternalData {
            token_id: token.id.clone(),
            token_name: token.name.clone(),
            ttl,
            max_ttl,
        });
        let lease = Lease::issue(&token_path(name), &internal, self.clock.now());

        Ok(SecretResponse {
            data: TokenView {
                token: token.value,
                token_name: token.name,
                token_id: token.id,
            },
            lease,
        })
    }

    /// Revoke a token by ID. A token already gone counts as revoked.
    pub async fn revoke(&self, token_id: &str) -> Result<()> {
        if token_id.is_empty() {
            return Err(BrokerError::InvalidName {
                kind: "token id",
                name: String::new(),
            });
        }
        let client = self.cache.get(self.storage.as_ref()).await?;
        match client.revoke_token(token_id).await {
            Ok(()) => {
                tracing::info!(token_id = %token_id, "Revoked token");
                Ok(())
            }
            Err(e) if e.is_not_found() => {
                tracing::warn!(token_id = %token_id, "Token already absent downstream");
                Ok(())
            }
            Err(e) => Err(BrokerError::downstream("revoking token", token_id, e)),
        }
    }
}
