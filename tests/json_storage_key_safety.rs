use std::sync::Arc;

use anyhow::Result;
use credbroker::config::ConfigWrite;
use credbroker::storage::{JsonFileStorage, Storage, StorageEntry};
use credbroker::users::NewUser;
use credbroker::{Backend, BrokerError};
use tempfile::TempDir;

mod support;

#[tokio::test]
async fn dotted_user_names_stay_inside_users_dir() -> Result<()> {
    let dir = TempDir::new()?;
    let storage = Arc::new(JsonFileStorage::new(dir.path()));
    let backend = Backend::new(storage, Arc::new(support::CountingFactory::new()));
    backend
        .config()
        .write(ConfigWrite::new("admin", "admin", "http://jenkins.local").with_validate(false))
        .await?;

    backend
        .users()
        .create(NewUser::new("a..b", "pw", "", ""))
        .await?;
    assert!(dir.path().join("users").join("a..b.json").exists());

    for name in ["..", ".hidden", "a/b"] {
        let err = backend
            .users()
            .create(NewUser::new(name, "pw", "", ""))
            .await
            .err();
        assert!(
            matches!(err, Some(BrokerError::InvalidName { .. })),
            "{name:?} should be rejected"
        );
    }
    Ok(())
}

#[tokio::test]
async fn unsafe_keys_never_touch_disk() -> Result<()> {
    let dir = TempDir::new()?;
    let storage = JsonFileStorage::new(dir.path().join("data"));

    let entry = StorageEntry {
        key: "../outside".to_string(),
        value: b"{}".to_vec(),
    };
    assert!(storage.put(&entry).await.is_err());
    assert!(!dir.path().join("outside.json").exists());

    assert!(storage.get("users/../../outside").await.is_err());
    assert!(storage.list("users").await.is_err());
    Ok(())
}
