// crates/rollout-config/src/config.rs
// ============================================================================
// Module: Rollout Configuration
// Description: Configuration loading, validation, and component builders.
// Purpose: Provide strict, fail-closed config parsing with hard limits.
// Dependencies: rollout-core, rollout-storage, rollout-store-sqlite, serde, toml
// ============================================================================

//! ## Overview
//! Configuration is loaded from a TOML file with strict size and path limits.
//! The file is resolved from an explicit path, then `ROLLOUT_CONFIG`, then
//! `rollout.toml` in the working directory. Missing or invalid configuration
//! fails closed; nothing is built from a config that did not validate.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::env;
use std::fs;
use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use rollout_core::DeploymentAuditSink;
use rollout_core::DeploymentsConfig;
use rollout_core::ExpiryBounds;
use rollout_core::FileAuditSink;
use rollout_core::NoopAuditSink;
use rollout_core::ObjectStorage;
use rollout_core::StderrAuditSink;
use rollout_core::StorageType;
use rollout_storage::AzureCredentials;
use rollout_storage::AzureOptions;
use rollout_storage::AzureStorage;
use rollout_storage::S3Options;
use rollout_storage::S3Storage;
use rollout_storage::StaticCredentials;
use rollout_storage::StorageManager;
use rollout_store_sqlite::SqliteDataStore;
use rollout_store_sqlite::SqliteStoreConfig;
use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;
use url::Url;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Default configuration filename when no path is specified.
const DEFAULT_CONFIG_NAME: &str = "rollout.toml";
/// Environment variable used to override the config path.
pub(crate) const CONFIG_ENV_VAR: &str = "ROLLOUT_CONFIG";
/// Maximum configuration file size in bytes.
pub(crate) const MAX_CONFIG_FILE_SIZE: usize = 1024 * 1024;
/// Maximum length of a single path component.
pub(crate) const MAX_PATH_COMPONENT_LENGTH: usize = 255;
/// Maximum total path length.
pub(crate) const MAX_TOTAL_PATH_LENGTH: usize = 4096;
/// Default lifetime of device download links, in seconds.
const DEFAULT_DOWNLOAD_LINK_EXPIRE_SECS: u64 = 24 * 60 * 60;
/// Default `SQLite` database file.
const DEFAULT_STORE_PATH: &str = "rollout.sqlite";

// ============================================================================
// SECTION: Config Model
// ============================================================================

/// Top-level configuration for the deployments service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RolloutConfig {
    /// Deployment engine settings.
    #[serde(default)]
    pub deployments: DeploymentsSection,
    /// Object storage backends.
    pub storage: StorageConfig,
    /// Data store configuration.
    #[serde(default = "default_store_config")]
    pub store: SqliteStoreConfig,
    /// Audit sink configuration.
    #[serde(default)]
    pub audit: AuditConfig,
}

impl RolloutConfig {
    /// Loads configuration from disk using the default resolution rules.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when loading or validation fails.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let resolved = resolve_path(path)?;
        validate_path(&resolved)?;
        let bytes = fs::read(&resolved).map_err(|err| ConfigError::Io(err.to_string()))?;
        if bytes.len() > MAX_CONFIG_FILE_SIZE {
            return Err(ConfigError::Invalid("config file exceeds size limit".to_string()));
        }
        let content = std::str::from_utf8(&bytes)
            .map_err(|_| ConfigError::Invalid("config file must be utf-8".to_string()))?;
        Self::from_toml(content)
    }

    /// Parses and validates configuration from TOML text.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when parsing or validation fails.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self =
            toml::from_str(content).map_err(|err| ConfigError::Parse(err.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration for internal consistency.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when configuration is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.deployments.validate()?;
        self.storage.validate()?;
        validate_path_string("store.path", &self.store.path.to_string_lossy())?;
        self.audit.validate()?;
        Ok(())
    }

    /// Returns the engine settings.
    #[must_use]
    pub fn deployments_config(&self) -> DeploymentsConfig {
        DeploymentsConfig {
            download_link_expire: Duration::from_secs(self.deployments.download_link_expire_secs),
            filename_suffix: self.deployments.filename_suffix.clone(),
        }
    }

    /// Builds the storage manager for the configured backends.
    ///
    /// S3 buckets are created when `create_bucket` is set; Azure containers
    /// with default credentials are health-checked.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when a backend cannot be initialized.
    pub async fn build_storage(&self) -> Result<StorageManager, ConfigError> {
        let content_type = self.deployments.content_type.as_ref();
        let s3 = match &self.storage.s3 {
            Some(section) => Some(build_s3(section, content_type).await?),
            None => None,
        };
        let azure = match &self.storage.azure {
            Some(section) => Some(
                build_azure(section, content_type, self.deployments.filename_suffix.as_ref())
                    .await?,
            ),
            None => None,
        };

        let mut backends: Vec<(StorageType, Arc<dyn ObjectStorage>)> = Vec::new();
        if let Some(storage) = s3 {
            backends.push((StorageType::S3, Arc::new(storage)));
        }
        if let Some(storage) = azure {
            backends.push((StorageType::Azure, Arc::new(storage)));
        }
        let default_type = self.storage.default;
        let Some(index) = backends.iter().position(|(kind, _)| *kind == default_type) else {
            return Err(ConfigError::Invalid(format!(
                "storage.default is {default_type} but [storage.{default_type}] is missing"
            )));
        };
        let (_, default_backend) = backends.swap_remove(index);
        let mut manager = StorageManager::new(default_type, default_backend);
        for (kind, backend) in backends {
            manager = manager.with_backend(kind, backend);
        }
        if let Some(proxy) = self.storage.proxy_url()? {
            manager = manager.with_proxy(proxy);
        }
        Ok(manager)
    }

    /// Opens the configured data store.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] when the store cannot be opened.
    pub fn build_store(&self) -> Result<SqliteDataStore, ConfigError> {
        SqliteDataStore::new(self.store.clone()).map_err(|err| ConfigError::Io(err.to_string()))
    }

    /// Builds the configured audit sink.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] when the audit file cannot be opened.
    pub fn build_audit_sink(&self) -> Result<Arc<dyn DeploymentAuditSink>, ConfigError> {
        match self.audit.sink {
            AuditSinkKind::None => Ok(Arc::new(NoopAuditSink)),
            AuditSinkKind::Stderr => Ok(Arc::new(StderrAuditSink)),
            AuditSinkKind::File => {
                let path = self.audit.path.as_ref().ok_or_else(|| {
                    ConfigError::Invalid("audit.path is required for the file sink".to_string())
                })?;
                let sink = FileAuditSink::new(path).map_err(|err| ConfigError::Io(err.to_string()))?;
                Ok(Arc::new(sink))
            }
        }
    }
}

/// Returns the default data store configuration.
fn default_store_config() -> SqliteStoreConfig {
    SqliteStoreConfig::new(DEFAULT_STORE_PATH)
}

/// Deployment engine settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentsSection {
    /// Lifetime of device download links, in seconds.
    #[serde(default = "default_download_link_expire_secs")]
    pub download_link_expire_secs: u64,
    /// Suffix appended to artifact names in download filenames.
    #[serde(default)]
    pub filename_suffix: Option<String>,
    /// Content type stored with uploads and served on download.
    #[serde(default)]
    pub content_type: Option<String>,
}

impl Default for DeploymentsSection {
    fn default() -> Self {
        Self {
            download_link_expire_secs: DEFAULT_DOWNLOAD_LINK_EXPIRE_SECS,
            filename_suffix: None,
            content_type: None,
        }
    }
}

impl DeploymentsSection {
    /// Validates engine settings.
    fn validate(&self) -> Result<(), ConfigError> {
        let bounds = ExpiryBounds::default();
        let requested = Duration::from_secs(self.download_link_expire_secs);
        if requested < bounds.min || requested > bounds.max {
            return Err(ConfigError::Invalid(format!(
                "deployments.download_link_expire_secs must be between {} and {}",
                bounds.min.as_secs(),
                bounds.max.as_secs()
            )));
        }
        if let Some(suffix) = &self.filename_suffix
            && suffix.contains(['"', '/', '\\'])
        {
            return Err(ConfigError::Invalid(
                "deployments.filename_suffix contains a reserved character".to_string(),
            ));
        }
        if let Some(content_type) = &self.content_type {
            validate_non_empty("deployments.content_type", content_type)?;
        }
        Ok(())
    }
}

/// Returns the default download link lifetime.
const fn default_download_link_expire_secs() -> u64 {
    DEFAULT_DOWNLOAD_LINK_EXPIRE_SECS
}

// ============================================================================
// SECTION: Storage
// ============================================================================

/// Object storage configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Backend used when a request carries no storage settings.
    #[serde(default)]
    pub default: StorageType,
    /// Origin that signed links are rewritten onto.
    #[serde(default)]
    pub proxy_uri: Option<String>,
    /// S3 backend.
    #[serde(default)]
    pub s3: Option<S3Config>,
    /// Azure Blob backend.
    #[serde(default)]
    pub azure: Option<AzureConfig>,
}

impl StorageConfig {
    /// Validates storage configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        let default_present = match self.default {
            StorageType::S3 => self.s3.is_some(),
            StorageType::Azure => self.azure.is_some(),
        };
        if !default_present {
            return Err(ConfigError::Invalid(format!(
                "storage.default is {} but [storage.{}] is missing",
                self.default, self.default
            )));
        }
        self.proxy_url()?;
        if let Some(s3) = &self.s3 {
            s3.validate()?;
        }
        if let Some(azure) = &self.azure {
            azure.validate()?;
        }
        Ok(())
    }

    /// Parses the proxy origin.
    fn proxy_url(&self) -> Result<Option<Url>, ConfigError> {
        self.proxy_uri.as_deref().map(|uri| parse_http_url("storage.proxy_uri", uri)).transpose()
    }
}

/// S3 backend configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct S3Config {
    /// Bucket holding artifacts.
    pub bucket: String,
    /// Region; the environment is consulted when unset.
    #[serde(default)]
    pub region: Option<String>,
    /// Endpoint for data-plane calls.
    #[serde(default)]
    pub uri: Option<String>,
    /// Public endpoint used in presigned links.
    #[serde(default)]
    pub external_uri: Option<String>,
    /// Access key id.
    #[serde(default)]
    pub key: Option<String>,
    /// Secret access key.
    #[serde(default)]
    pub secret: Option<String>,
    /// Session token.
    #[serde(default)]
    pub token: Option<String>,
    /// Path-style addressing.
    #[serde(default)]
    pub force_path_style: bool,
    /// Transfer acceleration.
    #[serde(default)]
    pub use_accelerate: bool,
    /// Multipart part size in bytes.
    #[serde(default = "default_s3_buffer_size")]
    pub buffer_size: usize,
    /// Create the bucket at startup when missing.
    #[serde(default)]
    pub create_bucket: bool,
}

impl S3Config {
    /// Validates S3 configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        validate_non_empty("storage.s3.bucket", &self.bucket)?;
        if let Some(uri) = &self.uri {
            parse_http_url("storage.s3.uri", uri)?;
        }
        if let Some(uri) = &self.external_uri {
            parse_http_url("storage.s3.external_uri", uri)?;
        }
        match (&self.key, &self.secret) {
            (Some(key), Some(secret)) => {
                validate_non_empty("storage.s3.key", key)?;
                validate_non_empty("storage.s3.secret", secret)?;
            }
            (None, None) => {
                if self.token.is_some() {
                    return Err(ConfigError::Invalid(
                        "storage.s3.token requires key and secret".to_string(),
                    ));
                }
            }
            _ => {
                return Err(ConfigError::Invalid(
                    "storage.s3.key and storage.s3.secret must be set together".to_string(),
                ));
            }
        }
        if self.buffer_size < rollout_storage::s3::MIN_BUFFER_SIZE {
            return Err(ConfigError::Invalid(format!(
                "storage.s3.buffer_size must be at least {}",
                rollout_storage::s3::MIN_BUFFER_SIZE
            )));
        }
        Ok(())
    }

    /// Converts the section into backend options.
    fn options(&self, content_type: Option<&String>) -> S3Options {
        let credentials = match (&self.key, &self.secret) {
            (Some(key), Some(secret)) => Some(StaticCredentials {
                key: key.clone(),
                secret: secret.clone(),
                token: self.token.clone(),
            }),
            _ => None,
        };
        S3Options {
            bucket: self.bucket.clone(),
            region: self.region.clone(),
            uri: self.uri.clone(),
            external_uri: self.external_uri.clone(),
            credentials,
            force_path_style: self.force_path_style,
            use_accelerate: self.use_accelerate,
            buffer_size: self.buffer_size,
            content_type: content_type.cloned(),
            create_bucket: self.create_bucket,
        }
    }
}

/// Returns the default S3 part size.
const fn default_s3_buffer_size() -> usize {
    rollout_storage::s3::DEFAULT_BUFFER_SIZE
}

/// Azure Blob backend configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AzureConfig {
    /// Container holding artifacts.
    pub container: String,
    /// Storage connection string.
    #[serde(default)]
    pub connection_string: Option<String>,
    /// Storage account name.
    #[serde(default)]
    pub account_name: Option<String>,
    /// Base64 account key.
    #[serde(default)]
    pub account_key: Option<String>,
    /// Blob service endpoint override.
    #[serde(default)]
    pub uri: Option<String>,
    /// Block size in bytes.
    #[serde(default = "default_azure_buffer_size")]
    pub buffer_size: usize,
}

impl AzureConfig {
    /// Validates Azure configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        validate_non_empty("storage.azure.container", &self.container)?;
        if let Some(uri) = &self.uri {
            parse_http_url("storage.azure.uri", uri)?;
        }
        if self.connection_string.is_some()
            && (self.account_name.is_some() || self.account_key.is_some())
        {
            return Err(ConfigError::Invalid(
                "storage.azure.connection_string excludes account_name and account_key"
                    .to_string(),
            ));
        }
        if self.account_name.is_some() != self.account_key.is_some() {
            return Err(ConfigError::Invalid(
                "storage.azure.account_name and storage.azure.account_key must be set together"
                    .to_string(),
            ));
        }
        self.credentials()?;
        Ok(())
    }

    /// Resolves default credentials, if any are configured.
    fn credentials(&self) -> Result<Option<AzureCredentials>, ConfigError> {
        let credentials = match (&self.connection_string, &self.account_name, &self.account_key) {
            (Some(connection_string), _, _) => {
                Some(AzureCredentials::from_connection_string(connection_string))
            }
            (None, Some(name), Some(key)) => {
                Some(AzureCredentials::shared_key(name, key, self.uri.as_deref()))
            }
            _ => None,
        };
        credentials
            .transpose()
            .map_err(|err| ConfigError::Invalid(format!("storage.azure credentials: {err}")))
    }

    /// Converts the section into backend options.
    fn options(
        &self,
        content_type: Option<&String>,
        filename_suffix: Option<&String>,
    ) -> Result<AzureOptions, ConfigError> {
        Ok(AzureOptions {
            container: self.container.clone(),
            credentials: self.credentials()?,
            content_type: content_type.cloned(),
            filename_suffix: filename_suffix.cloned(),
            buffer_size: self.buffer_size,
        })
    }
}

/// Returns the default Azure block size.
const fn default_azure_buffer_size() -> usize {
    rollout_storage::azblob::DEFAULT_BUFFER_SIZE
}

/// Initializes the S3 backend.
async fn build_s3(
    section: &S3Config,
    content_type: Option<&String>,
) -> Result<S3Storage, ConfigError> {
    S3Storage::connect(section.options(content_type))
        .await
        .map_err(|err| ConfigError::Io(format!("s3 storage unavailable: {err}")))
}

/// Initializes the Azure backend.
async fn build_azure(
    section: &AzureConfig,
    content_type: Option<&String>,
    filename_suffix: Option<&String>,
) -> Result<AzureStorage, ConfigError> {
    AzureStorage::connect(section.options(content_type, filename_suffix)?)
        .await
        .map_err(|err| ConfigError::Io(format!("azure storage unavailable: {err}")))
}

// ============================================================================
// SECTION: Audit
// ============================================================================

/// Audit sink selector.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditSinkKind {
    /// Discard audit events.
    #[default]
    None,
    /// JSON lines on stderr.
    Stderr,
    /// JSON lines appended to a file.
    File,
}

/// Audit configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditConfig {
    /// Sink kind.
    #[serde(default)]
    pub sink: AuditSinkKind,
    /// Audit log path for the file sink.
    #[serde(default)]
    pub path: Option<PathBuf>,
}

impl AuditConfig {
    /// Validates audit configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        match (self.sink, &self.path) {
            (AuditSinkKind::File, None) => Err(ConfigError::Invalid(
                "audit.path is required for the file sink".to_string(),
            )),
            (AuditSinkKind::File, Some(path)) => {
                validate_path_string("audit.path", &path.to_string_lossy())
            }
            (_, Some(_)) => {
                Err(ConfigError::Invalid("audit.path is only valid for the file sink".to_string()))
            }
            (_, None) => Ok(()),
        }
    }
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Configuration loading or validation errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// I/O failure while reading configuration or building components.
    #[error("config io error: {0}")]
    Io(String),
    /// TOML parsing error.
    #[error("config parse error: {0}")]
    Parse(String),
    /// Invalid configuration data.
    #[error("invalid config: {0}")]
    Invalid(String),
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Resolves the config path from CLI or environment defaults.
fn resolve_path(path: Option<&Path>) -> Result<PathBuf, ConfigError> {
    if let Some(path) = path {
        return Ok(path.to_path_buf());
    }
    if let Ok(env_path) = env::var(CONFIG_ENV_VAR) {
        if env_path.len() > MAX_TOTAL_PATH_LENGTH {
            return Err(ConfigError::Invalid("config path exceeds max length".to_string()));
        }
        return Ok(PathBuf::from(env_path));
    }
    Ok(PathBuf::from(DEFAULT_CONFIG_NAME))
}

/// Validates the resolved path against security limits.
fn validate_path(path: &Path) -> Result<(), ConfigError> {
    let text = path.to_string_lossy();
    if text.len() > MAX_TOTAL_PATH_LENGTH {
        return Err(ConfigError::Invalid("config path exceeds max length".to_string()));
    }
    for component in path.components() {
        let value = component.as_os_str().to_string_lossy();
        if value.len() > MAX_PATH_COMPONENT_LENGTH {
            return Err(ConfigError::Invalid("config path component too long".to_string()));
        }
    }
    Ok(())
}

/// Validates a path string against length constraints.
fn validate_path_string(field: &str, value: &str) -> Result<(), ConfigError> {
    validate_non_empty(field, value)?;
    if value.len() > MAX_TOTAL_PATH_LENGTH {
        return Err(ConfigError::Invalid(format!("{field} exceeds max length")));
    }
    for component in Path::new(value).components() {
        if component.as_os_str().len() > MAX_PATH_COMPONENT_LENGTH {
            return Err(ConfigError::Invalid(format!("{field} component too long")));
        }
    }
    Ok(())
}

/// Rejects empty or whitespace-only values.
fn validate_non_empty(field: &str, value: &str) -> Result<(), ConfigError> {
    if value.trim().is_empty() {
        return Err(ConfigError::Invalid(format!("{field} must be non-empty")));
    }
    Ok(())
}

/// Parses an absolute http(s) URL.
fn parse_http_url(field: &str, value: &str) -> Result<Url, ConfigError> {
    let url = Url::parse(value)
        .map_err(|err| ConfigError::Invalid(format!("{field} is not a valid url: {err}")))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(ConfigError::Invalid(format!("{field} must use http or https")));
    }
    Ok(url)
}
