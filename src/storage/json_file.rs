use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tokio::fs;

use super::{Storage, StorageEntry};

/// JSON file-based storage implementation.
///
/// Each key maps to one file below the base directory:
/// ```text
/// data/
///   config.json
///   users/
///     alice.json
///     bob.json
/// ```
pub struct JsonFileStorage {
    base_path: PathBuf,
}

/// Returns true if the string is safe to use as a single path segment.
fn is_path_safe(segment: &str) -> bool {
    if segment.is_empty() || segment == "." || segment == ".." {
        return false;
    }
    !segment.chars().any(|c| c == '\\' || c == '\0')
}

impl JsonFileStorage {
    pub fn new(base_path: impl AsRef<Path>) -> Self {
        Self {
            base_path: base_path.as_ref().to_path_buf(),
        }
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    fn dir_for(&self, prefix: &str) -> Result<PathBuf> {
        let mut path = self.base_path.clone();
        let trimmed = prefix.trim_end_matches('/');
        if trimmed.is_empty() {
            return Ok(path);
        }
        for segment in trimmed.split('/') {
            if !is_path_safe(segment) {
                anyhow::bail!("Invalid key path segment {segment:?} in {prefix:?}");
            }
            path.push(segment);
        }
        Ok(path)
    }

    fn file_for(&self, key: &str) -> Result<PathBuf> {
        let (dir, name) = match key.rsplit_once('/') {
            Some((dir, name)) => (dir, name),
            None => ("", key),
        };
        if !is_path_safe(name) {
            anyhow::bail!("Invalid key path segment {name:?} in {key:?}");
        }
        Ok(self.dir_for(dir)?.join(format!("{name}.json")))
    }
}

#[async_trait::async_trait]
impl Storage for JsonFileStorage {
    async fn get(&self, key: &str) -> Result<Option<StorageEntry>> {
        let path = self.file_for(key)?;
        match fs::read(&path).await {
            Ok(value) => Ok(Some(StorageEntry {
                key: key.to_string(),
                value,
            })),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e).with_context(|| format!("Failed to read file {path:?}")),
        }
    }

    async fn put(&self, entry: &StorageEntry) -> Result<()> {
        let path = self.file_for(&entry.key)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .await
                .context("Failed to create directory")?;
        }
        fs::write(&path, &entry.value)
            .await
            .with_context(|| format!("Failed to write file {path:?}"))?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let path = self.file_for(key)?;
        match fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e).with_context(|| format!("Failed to delete file {path:?}")),
        }
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>> {
        if !prefix.is_empty() && !prefix.ends_with('/') {
            anyhow::bail!("List prefix must end with '/': {prefix:?}");
        }
        let dir = self.dir_for(prefix)?;

        let mut keys = Vec::new();
        let mut entries = match fs::read_dir(&dir).await {
            Ok(e) => e,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(keys),
            Err(e) => return Err(e).context("Failed to read directory"),
        };

        while let Some(entry) = entries.next_entry().await.context("Failed to read entry")? {
            let Some(name) = entry.file_name().to_str().map(str::to_string) else {
                continue;
            };
            let Ok(file_type) = entry.file_type().await else {
                continue;
            };
            if file_type.is_dir() {
                keys.push(format!("{name}/"));
            } else if let Some(stem) = name.strip_suffix(".json") {
                if !stem.is_empty() {
                    keys.push(stem.to_string());
                }
            }
        }

        Ok(keys)
    }
}
