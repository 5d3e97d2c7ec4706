use anyhow::Result;
use credbroker::config::{ConfigView, ConfigWrite, ConnectionConfig};
use credbroker::storage::Storage;
use credbroker::BrokerError;

mod support;

async fn stored(storage: &dyn Storage) -> Result<ConnectionConfig> {
    let entry = storage.get("config").await?.expect("config stored");
    entry.decode_json()
}

#[tokio::test]
async fn read_omits_password() -> Result<()> {
    let harness = support::configured().await?;

    let view = harness.backend.config().read().await?;
    assert_eq!(
        view,
        Some(ConfigView {
            username: "admin".to_string(),
            url: "http://jenkins.local:8080".to_string(),
        })
    );

    let json = serde_json::to_value(&view)?;
    assert!(json.get("password").is_none());
    Ok(())
}

#[tokio::test]
async fn read_of_unconfigured_backend_is_none() -> Result<()> {
    let harness = support::unconfigured();
    assert_eq!(harness.backend.config().read().await?, None);
    assert!(!harness.backend.config().exists().await?);
    Ok(())
}

#[tokio::test]
async fn create_requires_all_connection_fields() -> Result<()> {
    let harness = support::unconfigured();

    let err = harness
        .backend
        .config()
        .write(ConfigWrite {
            username: Some("admin".to_string()),
            url: Some("http://jenkins.local".to_string()),
            validate: Some(false),
            ..ConfigWrite::default()
        })
        .await
        .err();

    assert!(matches!(
        err,
        Some(BrokerError::ConfigurationMissing { field: "password" })
    ));
    assert!(harness.storage.is_empty().await);
    Ok(())
}

#[tokio::test]
async fn update_merges_onto_stored_record() -> Result<()> {
    let harness = support::configured().await?;

    harness
        .backend
        .config()
        .write(ConfigWrite {
            password: Some("rotated".to_string().into()),
            validate: Some(false),
            ..ConfigWrite::default()
        })
        .await?;

    let config = stored(harness.storage.as_ref()).await?;
    assert_eq!(config.username, "admin");
    assert_eq!(config.password, "rotated");
    assert_eq!(config.url, "http://jenkins.local:8080");
    assert!(!config.validate);
    Ok(())
}

#[tokio::test]
async fn update_without_stored_record_fails() -> Result<()> {
    let harness = support::unconfigured();

    let err = harness
        .backend
        .config()
        .update(ConfigWrite::default())
        .await
        .err();
    assert!(matches!(
        err,
        Some(BrokerError::ConfigurationMissing { field: "config" })
    ));
    Ok(())
}

#[tokio::test]
async fn validation_probes_with_the_new_settings() -> Result<()> {
    let harness = support::unconfigured();

    harness
        .backend
        .config()
        .write(ConfigWrite::new("admin", "admin", "http://jenkins.local:8080"))
        .await?;

    // The probe builds a detached client; nothing is cached yet.
    assert_eq!(harness.factory.builds(), 1);
    assert!(!harness.backend.client_cache().is_cached().await);
    assert!(stored(harness.storage.as_ref()).await?.validate);
    Ok(())
}

#[tokio::test]
async fn failed_validation_still_persists_record() -> Result<()> {
    let harness = support::unconfigured();
    harness.fake().state.lock().await.fail_validate = true;

    let err = harness
        .backend
        .config()
        .write(ConfigWrite::new("admin", "wrong", "http://jenkins.local:8080"))
        .await
        .err();

    assert!(matches!(err, Some(BrokerError::Validation(_))));
    let config = stored(harness.storage.as_ref()).await?;
    assert_eq!(config.password, "wrong");
    assert!(!harness.backend.client_cache().is_cached().await);
    Ok(())
}

#[tokio::test]
async fn delete_removes_record() -> Result<()> {
    let harness = support::configured().await?;

    harness.backend.config().delete().await?;
    assert_eq!(harness.backend.config().read().await?, None);

    // Deleting again is not an error.
    harness.backend.config().delete().await?;
    Ok(())
}
