use crate::client::DownstreamError;

/// Errors surfaced to the host by backend operations.
#[derive(Debug, thiserror::Error)]
pub enum BrokerError {
    /// No configuration is stored, or a required field is absent.
    #[error("missing {field} in configuration")]
    ConfigurationMissing { field: &'static str },

    #[error("{kind} {name:?} already exists")]
    AlreadyExists { kind: &'static str, name: String },

    #[error("invalid {kind} name {name:?}")]
    InvalidName { kind: &'static str, name: String },

    /// A downstream capability call failed.
    #[error("error {operation} {name:?}: {source}")]
    Downstream {
        operation: &'static str,
        name: String,
        #[source]
        source: DownstreamError,
    },

    /// The configuration was persisted but the connectivity probe failed.
    #[error("configuration saved but validation failed: {0}")]
    Validation(#[source] DownstreamError),

    /// Carries the full storage context chain in its message.
    #[error("storage {operation} failed for {key:?}: {error:#}")]
    Storage {
        operation: &'static str,
        key: String,
        error: anyhow::Error,
    },

    #[error("secret is missing {field} internal data")]
    MissingLeaseMetadata { field: &'static str },

    #[error("malformed secret internal data: {reason}")]
    MalformedInternalData { reason: String },
}

impl BrokerError {
    pub(crate) fn storage(
        operation: &'static str,
        key: impl Into<String>,
        error: anyhow::Error,
    ) -> Self {
        Self::Storage {
            operation,
            key: key.into(),
            error,
        }
    }

    pub(crate) fn downstream(
        operation: &'static str,
        name: impl Into<String>,
        source: DownstreamError,
    ) -> Self {
        Self::Downstream {
            operation,
            name: name.into(),
            source,
        }
    }
}

pub type Result<T, E = BrokerError> = std::result::Result<T, E>;
