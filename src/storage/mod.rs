//! Host-provided key-value storage.
//!
//! Keys are `/`-separated paths (`config`, `users/alice`). Values are opaque
//! bytes; the backend only ever writes JSON documents.

mod json_file;
mod memory;

pub use json_file::JsonFileStorage;
pub use memory::MemoryStorage;

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;

/// A single stored value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageEntry {
    pub key: String,
    pub value: Vec<u8>,
}

impl StorageEntry {
    /// Serialize `value` as JSON under `key`.
    pub fn json<T: Serialize>(key: impl Into<String>, value: &T) -> Result<Self> {
        let key = key.into();
        let value = serde_json::to_vec(value)
            .with_context(|| format!("Failed to encode storage entry {key:?}"))?;
        Ok(Self { key, value })
    }

    pub fn decode_json<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_slice(&self.value)
            .with_context(|| format!("Failed to decode storage entry {:?}", self.key))
    }
}

/// Storage abstraction supplied by the host.
#[async_trait::async_trait]
pub trait Storage: Send + Sync {
    /// Returns `Ok(None)` if the key doesn't exist.
    async fn get(&self, key: &str) -> Result<Option<StorageEntry>>;

    async fn put(&self, entry: &StorageEntry) -> Result<()>;

    /// Deleting a missing key is not an error.
    async fn delete(&self, key: &str) -> Result<()>;

    /// Lists the keys directly below `prefix`, relative to it.
    ///
    /// Nested "directories" are returned once with a trailing `/`. No
    /// ordering is guaranteed.
    async fn list(&self, prefix: &str) -> Result<Vec<String>>;
}
