// crates/rollout-config/tests/load_validation.rs
// ============================================================================
// Module: Config Load Validation Tests
// Description: Validate config loading guards and section validation.
// Purpose: Ensure config input handling is strict and fail-closed.
// ============================================================================

//! ## Overview
//! Covers path, size, and encoding guards on [`RolloutConfig::load`], plus
//! the per-section validation rules and defaults.

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

use std::io::Write;
use std::path::Path;
use std::time::Duration;

use rollout_config::AuditSinkKind;
use rollout_config::ConfigError;
use rollout_config::RolloutConfig;
use rollout_core::StorageType;
use rollout_store_sqlite::SqliteStoreMode;
use tempfile::NamedTempFile;

type TestResult = Result<(), String>;

const MINIMAL: &str = r#"
[storage.s3]
bucket = "artifacts"
"#;

fn assert_invalid(result: Result<RolloutConfig, ConfigError>, needle: &str) -> TestResult {
    match result {
        Err(error) => {
            let message = error.to_string();
            if message.contains(needle) {
                Ok(())
            } else {
                Err(format!("error {message} did not contain {needle}"))
            }
        }
        Ok(_) => Err("expected invalid config load".to_string()),
    }
}

// ============================================================================
// SECTION: Load Guards
// ============================================================================

#[test]
fn load_rejects_path_too_long() -> TestResult {
    let long_path = "a".repeat(5_000);
    assert_invalid(RolloutConfig::load(Some(Path::new(&long_path))), "config path exceeds max length")
}

#[test]
fn load_rejects_path_component_too_long() -> TestResult {
    let long_component = "a".repeat(300);
    assert_invalid(
        RolloutConfig::load(Some(Path::new(&long_component))),
        "config path component too long",
    )
}

#[test]
fn load_rejects_oversized_file() -> TestResult {
    let mut file = NamedTempFile::new().map_err(|err| err.to_string())?;
    file.write_all(&vec![b'#'; 1_048_577]).map_err(|err| err.to_string())?;
    assert_invalid(RolloutConfig::load(Some(file.path())), "config file exceeds size limit")
}

#[test]
fn load_rejects_non_utf8_file() -> TestResult {
    let mut file = NamedTempFile::new().map_err(|err| err.to_string())?;
    file.write_all(&[0xFF, 0xFE, 0xFF]).map_err(|err| err.to_string())?;
    assert_invalid(RolloutConfig::load(Some(file.path())), "config file must be utf-8")
}

#[test]
fn load_reports_missing_files_as_io() {
    let err = RolloutConfig::load(Some(Path::new("/nonexistent/rollout.toml"))).unwrap_err();
    assert!(matches!(err, ConfigError::Io(_)));
}

#[test]
fn load_reports_malformed_toml_as_parse() {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(b"[storage\nbucket = ").unwrap();
    let err = RolloutConfig::load(Some(file.path())).unwrap_err();
    assert!(matches!(err, ConfigError::Parse(_)));
}

// ============================================================================
// SECTION: Defaults
// ============================================================================

#[test]
fn minimal_config_applies_defaults() {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(MINIMAL.as_bytes()).unwrap();
    let config = RolloutConfig::load(Some(file.path())).unwrap();

    assert_eq!(config.storage.default, StorageType::S3);
    assert_eq!(config.deployments.download_link_expire_secs, 86_400);
    assert_eq!(config.store.path, Path::new("rollout.sqlite"));
    assert_eq!(config.store.journal_mode, SqliteStoreMode::Wal);
    assert_eq!(config.audit.sink, AuditSinkKind::None);

    let engine = config.deployments_config();
    assert_eq!(engine.download_link_expire, Duration::from_secs(86_400));
    assert_eq!(engine.filename_suffix, None);
}

#[test]
fn full_config_round_trips_every_section() {
    let config = RolloutConfig::from_toml(
        r#"
        [deployments]
        download_link_expire_secs = 3600
        filename_suffix = ".mender"
        content_type = "application/vnd.mender-artifact"

        [storage]
        default = "azure"
        proxy_uri = "https://gateway.local/storage"

        [storage.s3]
        bucket = "artifacts"
        region = "eu-west-1"
        uri = "http://localhost:9000"
        external_uri = "https://s3.example.com"
        key = "minio"
        secret = "minio-secret"
        force_path_style = true
        create_bucket = true

        [storage.azure]
        container = "artifacts"
        connection_string = "AccountName=acct;AccountKey=Zm9vYmFy"

        [store]
        path = "/var/lib/rollout/rollout.sqlite"
        journal_mode = "delete"
        sync_mode = "normal"

        [audit]
        sink = "file"
        path = "/var/log/rollout/audit.jsonl"
        "#,
    )
    .unwrap();

    assert_eq!(config.storage.default, StorageType::Azure);
    let s3 = config.storage.s3.as_ref().unwrap();
    assert!(s3.force_path_style);
    assert!(s3.create_bucket);
    assert_eq!(s3.buffer_size, rollout_storage::s3::DEFAULT_BUFFER_SIZE);
    assert_eq!(config.store.journal_mode, SqliteStoreMode::Delete);
    assert_eq!(config.audit.sink, AuditSinkKind::File);
    assert_eq!(config.deployments_config().filename_suffix.as_deref(), Some(".mender"));
}

// ============================================================================
// SECTION: Section Validation
// ============================================================================

#[test]
fn default_backend_must_be_configured() -> TestResult {
    assert_invalid(
        RolloutConfig::from_toml(
            r#"
            [storage]
            default = "azure"

            [storage.s3]
            bucket = "artifacts"
            "#,
        ),
        "[storage.azure] is missing",
    )
}

#[test]
fn link_lifetime_must_fit_expiry_bounds() -> TestResult {
    let toml = format!("[deployments]\ndownload_link_expire_secs = 30\n{MINIMAL}");
    assert_invalid(RolloutConfig::from_toml(&toml), "download_link_expire_secs")?;
    let toml = format!("[deployments]\ndownload_link_expire_secs = 604801\n{MINIMAL}");
    assert_invalid(RolloutConfig::from_toml(&toml), "download_link_expire_secs")
}

#[test]
fn s3_credentials_must_be_paired() -> TestResult {
    assert_invalid(
        RolloutConfig::from_toml("[storage.s3]\nbucket = \"artifacts\"\nkey = \"minio\"\n"),
        "must be set together",
    )?;
    assert_invalid(
        RolloutConfig::from_toml("[storage.s3]\nbucket = \"artifacts\"\ntoken = \"t\"\n"),
        "token requires key and secret",
    )
}

#[test]
fn s3_buffer_size_has_a_floor() -> TestResult {
    assert_invalid(
        RolloutConfig::from_toml("[storage.s3]\nbucket = \"artifacts\"\nbuffer_size = 1024\n"),
        "buffer_size must be at least",
    )
}

#[test]
fn azure_credentials_are_checked_at_load() -> TestResult {
    assert_invalid(
        RolloutConfig::from_toml(
            "[storage]\ndefault = \"azure\"\n[storage.azure]\ncontainer = \"artifacts\"\n\
             connection_string = \"AccountName=acct\"\n",
        ),
        "account key",
    )?;
    assert_invalid(
        RolloutConfig::from_toml(
            "[storage]\ndefault = \"azure\"\n[storage.azure]\ncontainer = \"artifacts\"\n\
             account_name = \"acct\"\n",
        ),
        "must be set together",
    )
}

#[test]
fn proxy_uri_must_be_http() -> TestResult {
    let toml = format!("[storage]\nproxy_uri = \"ftp://proxy.local\"\n{MINIMAL}");
    assert_invalid(RolloutConfig::from_toml(&toml), "storage.proxy_uri must use http or https")
}

#[test]
fn audit_file_sink_requires_path() -> TestResult {
    let toml = format!("[audit]\nsink = \"file\"\n{MINIMAL}");
    assert_invalid(RolloutConfig::from_toml(&toml), "audit.path is required")?;
    let toml = format!("[audit]\nsink = \"stderr\"\npath = \"audit.jsonl\"\n{MINIMAL}");
    assert_invalid(RolloutConfig::from_toml(&toml), "only valid for the file sink")
}

#[test]
fn filename_suffix_rejects_quotes() -> TestResult {
    let toml = format!("[deployments]\nfilename_suffix = 'a\"b'\n{MINIMAL}");
    assert_invalid(RolloutConfig::from_toml(&toml), "reserved character")
}
