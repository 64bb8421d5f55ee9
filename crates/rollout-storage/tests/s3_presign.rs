// crates/rollout-storage/tests/s3_presign.rs
// ============================================================================
// Module: S3 Presign Tests
// Description: Offline presigning against static credentials.
// Purpose: Pin link shape, expiry clamping, and per-request client selection.
// Dependencies: rollout-storage, rollout-core, tokio, url
// ============================================================================
//! ## Overview
//! Presigning never touches the network, so these tests run against fixed
//! credentials and a fixed clock and inspect the produced URLs.

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
    reason = "Test-only output and panic-based assertions are permitted."
)]

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use rollout_core::FixedClock;
use rollout_core::HttpMethod;
use rollout_core::Link;
use rollout_core::ObjectStorage;
use rollout_core::RequestContext;
use rollout_core::StorageSettings;
use rollout_storage::S3Options;
use rollout_storage::S3Storage;
use rollout_storage::StaticCredentials;
use time::OffsetDateTime;
use time::macros::datetime;
use url::Url;

const NOW: OffsetDateTime = datetime!(2026-03-01 12:00:00 UTC);
const WEEK: Duration = Duration::from_secs(7 * 24 * 60 * 60);

async fn storage() -> S3Storage {
    let mut options = S3Options::new("artifacts");
    options.region = Some("eu-west-1".to_string());
    options.uri = Some("http://minio.internal:9000".to_string());
    options.external_uri = Some("https://files.example.com".to_string());
    options.force_path_style = true;
    options.content_type = Some("application/vnd.rollout.artifact".to_string());
    options.credentials = Some(StaticCredentials {
        key: "AKIDEXAMPLE".to_string(),
        secret: "wJalrXUtnFEMI/K7MDENG+bPxRfiCYEXAMPLEKEY".to_string(),
        token: None,
    });
    S3Storage::from_options(options).await.unwrap().with_clock(Arc::new(FixedClock::new(NOW)))
}

fn query(link: &Link) -> BTreeMap<String, String> {
    Url::parse(&link.uri).unwrap().query_pairs().into_owned().collect()
}

#[tokio::test]
async fn download_links_use_the_external_endpoint_and_name_the_file() {
    let storage = storage().await;
    let ctx = RequestContext::for_tenant("op", "tenant-a");
    let link = storage
        .get_request(&ctx, "art-1", Some("firmware.bin"), Duration::from_secs(30 * 24 * 60 * 60))
        .await
        .unwrap();

    assert_eq!(link.method, HttpMethod::Get);
    assert_eq!(link.expire, NOW + WEEK);
    assert!(link.uri.starts_with("https://files.example.com/artifacts/tenant-a/art-1?"));
    let query = query(&link);
    assert_eq!(query["X-Amz-Expires"], "604800");
    assert_eq!(query["X-Amz-Date"], "20260301T120000Z");
    assert!(query["X-Amz-Credential"].starts_with("AKIDEXAMPLE/20260301/eu-west-1/s3/"));
    assert_eq!(query["response-content-disposition"], "attachment; filename=\"firmware.bin\"");
    assert_eq!(query["response-content-type"], "application/vnd.rollout.artifact");
}

#[tokio::test]
async fn short_lifetimes_are_raised_to_one_minute() {
    let storage = storage().await;
    let link = storage
        .put_request(&RequestContext::new(), "uploads/art-2", Duration::from_millis(1500))
        .await
        .unwrap();
    assert_eq!(link.method, HttpMethod::Put);
    assert_eq!(link.expire, NOW + Duration::from_secs(60));
    assert_eq!(query(&link)["X-Amz-Expires"], "60");
    assert!(link.uri.starts_with("https://files.example.com/artifacts/uploads/art-2?"));
}

#[tokio::test]
async fn lifetimes_past_a_week_are_clamped_for_upload_and_delete_links() {
    let storage = storage().await;
    let ctx = RequestContext::new();
    let eight_days = Duration::from_secs(8 * 24 * 60 * 60);

    let upload = storage.put_request(&ctx, "uploads/art-4", eight_days).await.unwrap();
    assert_eq!(upload.expire, NOW + WEEK);
    assert_eq!(query(&upload)["X-Amz-Expires"], "604800");

    let delete = storage.delete_request(&ctx, "art-4", WEEK + Duration::from_secs(1)).await.unwrap();
    assert_eq!(delete.expire, NOW + WEEK);
    assert_eq!(query(&delete)["X-Amz-Expires"], "604800");
}

#[tokio::test]
async fn request_settings_select_a_transient_client() {
    let storage = storage().await;
    let settings = StorageSettings {
        bucket: "tenant-bucket".to_string(),
        region: Some("us-west-2".to_string()),
        key: Some("AKIDTENANT".to_string()),
        secret: Some("tenant-secret".to_string()),
        uri: Some("http://localhost:9000".to_string()),
        force_path_style: true,
        ..StorageSettings::default()
    };
    let ctx = RequestContext::for_tenant("op", "tenant-b").with_storage_settings(settings);
    let link = storage.delete_request(&ctx, "art-3", Duration::from_secs(600)).await.unwrap();

    assert_eq!(link.method, HttpMethod::Delete);
    assert!(link.uri.starts_with("http://localhost:9000/tenant-bucket/tenant-b/art-3?"));
    assert!(query(&link)["X-Amz-Credential"].starts_with("AKIDTENANT/20260301/us-west-2/s3/"));
}

#[tokio::test]
async fn invalid_request_settings_are_rejected() {
    let storage = storage().await;
    let settings = StorageSettings {
        bucket: "b".to_string(),
        key: Some("AKIDTENANT".to_string()),
        secret: Some("tenant-secret".to_string()),
        ..StorageSettings::default()
    };
    let ctx = RequestContext::new().with_storage_settings(settings);
    let err = storage.put_request(&ctx, "art", Duration::from_secs(60)).await.unwrap_err();
    assert!(err.to_string().starts_with("invalid storage settings"));
}
