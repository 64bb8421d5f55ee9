// crates/rollout-config/tests/builders.rs
// ============================================================================
// Module: Config Builder Tests
// Description: Build runtime components from validated configuration.
// Purpose: Ensure storage, store, and audit wiring follows the config.
// ============================================================================

//! ## Overview
//! Builds each component from an in-memory config. Storage backends use
//! static credentials and skip bucket creation, so nothing leaves the host.

#![allow(
    clippy::panic,
    clippy::print_stdout,
    clippy::print_stderr,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::use_debug,
    clippy::dbg_macro,
    clippy::panic_in_result_fn,
    clippy::unwrap_in_result,
    reason = "Test-only assertions and helpers are permitted."
)]

use std::time::Duration;

use rollout_config::RolloutConfig;
use rollout_core::DataStore;
use rollout_core::DeploymentAuditEvent;
use rollout_core::DeploymentAuditEventParams;
use rollout_core::DeploymentAuditKind;
use rollout_core::DeploymentId;
use rollout_core::ObjectStorage;
use rollout_core::ObjectStorageError;
use rollout_core::RequestContext;
use rollout_core::StorageSettings;
use rollout_core::StorageType;
use tempfile::TempDir;
use time::macros::datetime;
use url::Url;

fn config_with_store(temp: &TempDir, extra: &str) -> RolloutConfig {
    let store_path = temp.path().join("rollout.sqlite");
    RolloutConfig::from_toml(&format!(
        r#"
        [storage]
        proxy_uri = "https://gateway.local/storage"

        [storage.s3]
        bucket = "artifacts"
        region = "us-east-1"
        uri = "http://localhost:9000"
        key = "minio"
        secret = "minio-secret"
        force_path_style = true

        [storage.azure]
        container = "artifacts"

        [store]
        path = {store_path:?}

        {extra}
        "#
    ))
    .unwrap()
}

#[tokio::test]
async fn storage_manager_signs_through_the_proxy() {
    let temp = TempDir::new().unwrap();
    let config = config_with_store(&temp, "");
    let manager = config.build_storage().await.unwrap();
    assert_eq!(manager.default_type(), StorageType::S3);

    let ctx = RequestContext::for_tenant("op", "tenant-a");
    let link = manager
        .get_request(&ctx, "art-1", Some("release-1"), Duration::from_secs(3600))
        .await
        .unwrap();
    let url = Url::parse(&link.uri).unwrap();
    assert_eq!(url.host_str(), Some("gateway.local"));
    assert_eq!(url.path(), "/storage/artifacts/tenant-a/art-1");
    assert!(url.query_pairs().any(|(key, value)| key == "X-Amz-Expires" && value == "3600"));
}

#[tokio::test]
async fn azure_without_default_credentials_requires_request_settings() {
    let temp = TempDir::new().unwrap();
    let config = config_with_store(&temp, "");
    let manager = config.build_storage().await.unwrap();

    let settings = StorageSettings {
        storage_type: StorageType::Azure,
        ..StorageSettings::default()
    };
    let ctx = RequestContext::new().with_storage_settings(settings);
    let err = manager.put_request(&ctx, "art-1", Duration::from_secs(60)).await.unwrap_err();
    assert!(matches!(err, ObjectStorageError::InvalidSettings(_)));
}

#[test]
fn store_opens_at_the_configured_path() {
    let temp = TempDir::new().unwrap();
    let config = config_with_store(&temp, "");
    let store = config.build_store().unwrap();
    store.check_connection().unwrap();
    assert!(temp.path().join("rollout.sqlite").exists());
}

#[tokio::test]
async fn built_store_serves_the_data_store_contract() {
    let temp = TempDir::new().unwrap();
    let store = config_with_store(&temp, "").build_store().unwrap();
    let found = store
        .find_deployment_by_id(&RequestContext::new(), &DeploymentId::new("missing"))
        .await
        .unwrap();
    assert!(found.is_none());
}

#[test]
fn file_audit_sink_appends_json_lines() {
    let temp = TempDir::new().unwrap();
    let audit_path = temp.path().join("audit.jsonl");
    let config =
        config_with_store(&temp, &format!("[audit]\nsink = \"file\"\npath = {audit_path:?}\n"));
    let sink = config.build_audit_sink().unwrap();
    let deployment_id = DeploymentId::new("dep-1");
    let event = DeploymentAuditEvent::new(
        &RequestContext::for_tenant("op", "tenant-a"),
        datetime!(2026-03-01 12:00:00 UTC),
        &DeploymentAuditEventParams::deployment(
            DeploymentAuditKind::DeploymentCreated,
            &deployment_id,
        ),
    );
    sink.record(&event);
    sink.record(&event);

    let contents = std::fs::read_to_string(&audit_path).unwrap();
    assert_eq!(contents.lines().count(), 2);
    assert!(contents.contains("deployment_created"));
    assert!(contents.contains("tenant-a"));
}
