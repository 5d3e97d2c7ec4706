//! Leases and the internal data attached to them.
//!
//! A lease is the host-side envelope around an issued credential. This crate
//! fills in its TTLs and internal data at creation and reads them back at
//! renew/revoke time. Expiry scheduling belongs to the host.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::clock::Clock;
use crate::duration::{self, positive};
use crate::error::{BrokerError, Result};
use crate::tokens::TokenManager;
use crate::users::UserManager;

/// Secret types registered with the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SecretKind {
    JenkinsUser,
    JenkinsToken,
}

impl SecretKind {
    pub fn as_str(self) -> &'static str {
        match self {
            SecretKind::JenkinsUser => "jenkins_user",
            SecretKind::JenkinsToken => "jenkins_token",
        }
    }
}

/// Internal data of a user lease. Also the shape of the `users/<name>`
/// inventory record; neither ever holds the password.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserInternalData {
    pub username: String,
    pub fullname: String,
    pub email: String,
    #[serde(with = "duration::secs")]
    pub ttl: Duration,
    #[serde(with = "duration::secs")]
    pub max_ttl: Duration,
}

/// Internal data of a token lease. The token value is never part of it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenInternalData {
    pub token_id: String,
    pub token_name: String,
    #[serde(with = "duration::secs")]
    pub ttl: Duration,
    #[serde(with = "duration::secs")]
    pub max_ttl: Duration,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InternalData {
    User(UserInternalData),
    Token(TokenInternalData),
}

impl InternalData {
    pub fn kind(&self) -> SecretKind {
        match self {
            InternalData::User(_) => SecretKind::JenkinsUser,
            InternalData::Token(_) => SecretKind::JenkinsToken,
        }
    }

    pub fn ttl(&self) -> Duration {
        match self {
            InternalData::User(user) => user.ttl,
            InternalData::Token(token) => token.ttl,
        }
    }

    pub fn max_ttl(&self) -> Duration {
        match self {
            InternalData::User(user) => user.max_ttl,
            InternalData::Token(token) => token.max_ttl,
        }
    }

    /// The untyped map the host stores next to the lease.
    pub fn to_map(&self) -> Map<String, Value> {
        let value = match self {
            InternalData::User(user) => serde_json::to_value(user),
            InternalData::Token(token) => serde_json::to_value(token),
        };
        match value {
            Ok(Value::Object(map)) => map,
            // Both structs serialize to objects with plain fields.
            _ => Map::new(),
        }
    }

    /// Read back internal data the host stored for a lease of `kind`.
    pub fn from_map(kind: SecretKind, map: &Map<String, Value>) -> Result<Self> {
        let value = Value::Object(map.clone());
        let data = match kind {
            SecretKind::JenkinsUser => serde_json::from_value(value).map(InternalData::User),
            SecretKind::JenkinsToken => serde_json::from_value(value).map(InternalData::Token),
        }
        .map_err(|e| BrokerError::MalformedInternalData {
            reason: format!("{}: {e}", kind.as_str()),
        })?;

        let (field, identifier) = match &data {
            InternalData::User(user) => ("username", &user.username),
            InternalData::Token(token) => ("token_id", &token.token_id),
        };
        if identifier.is_empty() {
            return Err(BrokerError::MalformedInternalData {
                reason: format!("{}: empty {field}", kind.as_str()),
            });
        }

        Ok(data)
    }
}

/// Host defaults applied when a credential leaves its TTLs unset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LeaseDefaults {
    pub default_ttl: Duration,
    pub max_ttl: Duration,
}

impl Default for LeaseDefaults {
    fn default() -> Self {
        // 32 days, the usual host system default.
        let month = Duration::from_secs(768 * 60 * 60);
        Self {
            default_ttl: month,
            max_ttl: month,
        }
    }
}

/// A lease as returned with a credential and handed back on renew/revoke.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Lease {
    pub lease_id: String,
    pub kind: SecretKind,
    /// `None` defers to the host default.
    #[serde(default, with = "duration::opt_secs")]
    pub ttl: Option<Duration>,
    #[serde(default, with = "duration::opt_secs")]
    pub max_ttl: Option<Duration>,
    pub renewable: bool,
    pub issued_at: DateTime<Utc>,
    #[serde(default)]
    pub last_renewed_at: Option<DateTime<Utc>>,
    pub internal_data: Map<String, Value>,
}

impl Lease {
    /// Issue a lease under `path`. TTLs are only set when positive.
    pub fn issue(path: &str, internal: &InternalData, now: DateTime<Utc>) -> Self {
        Self {
            lease_id: format!("{path}/{}", Uuid::new_v4()),
            kind: internal.kind(),
            ttl: positive(internal.ttl()),
            max_ttl: positive(internal.max_ttl()),
            renewable: true,
            issued_at: now,
            last_renewed_at: None,
            internal_data: internal.to_map(),
        }
    }

    /// The TTL the host will actually apply, capped by the max TTL.
    pub fn effective_ttl(&self, defaults: &LeaseDefaults) -> Duration {
        let ttl = self.ttl.unwrap_or(defaults.default_ttl);
        let max_ttl = self.max_ttl.unwrap_or(defaults.max_ttl);
        ttl.min(max_ttl)
    }
}

/// A credential response: public data plus its lease.
#[derive(Debug, Clone, Serialize)]
pub struct SecretResponse<T> {
    pub data: T,
    pub lease: Lease,
}

fn lease_metadata(lease: &Lease, field: &'static str) -> Result<Duration> {
    let value = lease
        .internal_data
        .get(field)
        .ok_or(BrokerError::MissingLeaseMetadata { field })?;
    duration::secs::deserialize(value).map_err(|e| BrokerError::MalformedInternalData {
        reason: format!("{field}: {e}"),
    })
}

/// Renew and revoke dispatch for both credential kinds.
pub struct LeaseCoordinator {
    users: Arc<UserManager>,
    tokens: Arc<TokenManager>,
    clock: Arc<dyn Clock>,
}

impl LeaseCoordinator {
    pub fn new(users: Arc<UserManager>, tokens: Arc<TokenManager>, clock: Arc<dyn Clock>) -> Self {
        Self {
            users,
            tokens,
            clock,
        }
    }

    /// Reapply the lease's own TTLs. No downstream call is made and `lease`
    /// itself is left untouched.
    pub fn renew(&self, lease: &Lease) -> Result<Lease> {
        let ttl = lease_metadata(lease, "ttl")?;
        let max_ttl = lease_metadata(lease, "max_ttl")?;
        InternalData::from_map(lease.kind, &lease.internal_data)?;

        let mut renewed = lease.clone();
        if let Some(ttl) = positive(ttl) {
            renewed.ttl = Some(ttl);
        }
        if let Some(max_ttl) = positive(max_ttl) {
            renewed.max_ttl = Some(max_ttl);
        }
        renewed.last_renewed_at = Some(self.clock.now());

        tracing::debug!(lease_id = %lease.lease_id, "Renewed lease");
        Ok(renewed)
    }

    /// Destroy the credential behind the lease.
    pub async fn revoke(&self, lease: &Lease) -> Result<()> {
        match InternalData::from_map(lease.kind, &lease.internal_data)? {
            InternalData::User(user) => self.users.delete(&user.username).await,
            InternalData::Token(token) => self.tokens.revoke(&token.token_id).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user_data() -> InternalData {
        InternalData::User(UserInternalData {
            username: "alice".to_string(),
            fullname: "Alice A".to_string(),
            email: "a@x.com".to_string(),
            ttl: Duration::from_secs(60),
            max_ttl: Duration::ZERO,
        })
    }

    #[test]
    fn internal_data_map_shape() {
        let token = InternalData::Token(TokenInternalData {
            token_id: "uuid-1".to_string(),
            token_name: "ci".to_string(),
            ttl: Duration::from_secs(30),
            max_ttl: Duration::from_secs(90),
        });
        assert_eq!(
            Value::Object(token.to_map()),
            serde_json::json!({
                "token_id": "uuid-1",
                "token_name": "ci",
                "ttl": 30,
                "max_ttl": 90,
            })
        );
    }

    #[test]
    fn issue_only_sets_positive_ttls() {
        let now = Utc::now();
        let lease = Lease::issue("users/alice", &user_data(), now);

        assert!(lease.lease_id.starts_with("users/alice/"));
        assert_eq!(lease.kind, SecretKind::JenkinsUser);
        assert_eq!(lease.ttl, Some(Duration::from_secs(60)));
        assert_eq!(lease.max_ttl, None);
        assert_eq!(lease.issued_at, now);
    }

    #[test]
    fn effective_ttl_falls_back_to_defaults_and_caps() {
        let defaults = LeaseDefaults {
            default_ttl: Duration::from_secs(3600),
            max_ttl: Duration::from_secs(7200),
        };
        let mut lease = Lease::issue("tokens/ci", &user_data(), Utc::now());

        lease.ttl = None;
        assert_eq!(lease.effective_ttl(&defaults), Duration::from_secs(3600));

        lease.ttl = Some(Duration::from_secs(10_000));
        assert_eq!(lease.effective_ttl(&defaults), Duration::from_secs(7200));

        lease.max_ttl = Some(Duration::from_secs(100));
        assert_eq!(lease.effective_ttl(&defaults), Duration::from_secs(100));
    }

    #[test]
    fn from_map_rejects_wrong_kind_and_types() {
        let user = user_data().to_map();
        assert!(matches!(
            InternalData::from_map(SecretKind::JenkinsToken, &user),
            Err(BrokerError::MalformedInternalData { .. })
        ));

        let mut mistyped = user.clone();
        mistyped.insert("username".to_string(), Value::from(42));
        assert!(matches!(
            InternalData::from_map(SecretKind::JenkinsUser, &mistyped),
            Err(BrokerError::MalformedInternalData { .. })
        ));

        let mut empty = user;
        empty.insert("username".to_string(), Value::from(""));
        assert!(matches!(
            InternalData::from_map(SecretKind::JenkinsUser, &empty),
            Err(BrokerError::MalformedInternalData { .. })
        ));
    }

    #[test]
    fn lease_serializes_ttls_as_seconds() {
        let lease = Lease::issue("users/alice", &user_data(), Utc::now());
        let value = serde_json::to_value(&lease).unwrap();
        assert_eq!(value["ttl"], Value::from(60));
        assert_eq!(value["max_ttl"], Value::Null);
        assert_eq!(value["kind"], Value::from("jenkins_user"));

        let back: Lease = serde_json::from_value(value).unwrap();
        assert_eq!(back, lease);
    }
}
