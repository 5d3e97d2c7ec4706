//! In-memory storage implementation for tests and embedding hosts.

use std::collections::HashMap;

use anyhow::Result;
use tokio::sync::Mutex;

use super::{Storage, StorageEntry};

/// In-memory storage.
#[derive(Default)]
pub struct MemoryStorage {
    entries: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored keys, across all prefixes.
    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.lock().await.is_empty()
    }

    /// All stored keys, in no particular order.
    pub async fn keys(&self) -> Vec<String> {
        self.entries.lock().await.keys().cloned().collect()
    }
}

#[async_trait::async_trait]
impl Storage for MemoryStorage {
    async fn get(&self, key: &str) -> Result<Option<StorageEntry>> {
        let entries = self.entries.lock().await;
        Ok(entries.get(key).map(|value| StorageEntry {
            key: key.to_string(),
            value: value.clone(),
        }))
    }

    async fn put(&self, entry: &StorageEntry) -> Result<()> {
        let mut entries = self.entries.lock().await;
        entries.insert(entry.key.clone(), entry.value.clone());
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let mut entries = self.entries.lock().await;
        entries.remove(key);
        Ok(())
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>> {
        let entries = self.entries.lock().await;

        let mut keys: Vec<String> = Vec::new();
        for key in entries.keys() {
            let Some(rest) = key.strip_prefix(prefix) else {
                continue;
            };
            let child = match rest.find('/') {
                Some(idx) => &rest[..=idx],
                None => rest,
            };
            if !child.is_empty() && !keys.iter().any(|k| k == child) {
                keys.push(child.to_string());
            }
        }

        Ok(keys)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn list_returns_direct_children_once() -> Result<()> {
        let storage = MemoryStorage::new();
        for key in ["users/alice", "users/bob", "users/nested/carol", "config"] {
            storage
                .put(&StorageEntry {
                    key: key.to_string(),
                    value: b"{}".to_vec(),
                })
                .await?;
        }

        let mut keys = storage.list("users/").await?;
        keys.sort();
        assert_eq!(keys, vec!["alice", "bob", "nested/"]);

        let top = storage.list("").await?;
        assert!(top.contains(&"config".to_string()));
        assert!(top.contains(&"users/".to_string()));
        assert_eq!(top.len(), 2);

        Ok(())
    }

    #[tokio::test]
    async fn delete_of_missing_key_is_ok() -> Result<()> {
        let storage = MemoryStorage::new();
        storage.delete("users/ghost").await?;
        assert!(storage.is_empty().await);
        Ok(())
    }
}
