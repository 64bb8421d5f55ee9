// crates/rollout-core/src/core/storage.rs
// ============================================================================
// Module: Rollout Storage Model
// Description: Signed links, object metadata, and per-tenant storage settings.
// Purpose: Provide the provider-neutral vocabulary of the object-storage layer.
// Dependencies: serde, time
// ============================================================================

//! ## Overview
//! A [`Link`] is a presigned, time-bounded URL constructed per request and
//! never persisted. [`StorageSettings`] is a per-tenant override of the
//! service-wide storage configuration; when absent, backends use the default
//! client built at startup. [`ExpiryBounds`] clamps caller-supplied link
//! durations to what a provider accepts.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use serde::Deserialize;
use serde::Serialize;
use time::OffsetDateTime;

use crate::core::validation::ValidationError;
use crate::core::validation::optional_length;
use crate::core::validation::require_http_uri;
use crate::core::validation::require_length;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Shortest signed-link lifetime accepted by S3 presigning.
pub const MIN_LINK_EXPIRE: Duration = Duration::from_secs(60);
/// Longest signed-link lifetime accepted by S3 presigning.
pub const MAX_LINK_EXPIRE: Duration = Duration::from_secs(7 * 24 * 60 * 60);
/// Maximum accepted URI length in storage settings.
const MAX_URI_LENGTH: usize = 2000;

// ============================================================================
// SECTION: Links
// ============================================================================

/// HTTP method a signed link is valid for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    /// Download.
    Get,
    /// Upload.
    Put,
    /// Removal.
    Delete,
}

impl HttpMethod {
    /// Returns the method token.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Put => "PUT",
            Self::Delete => "DELETE",
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Presigned request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Link {
    /// Fully signed URI.
    pub uri: String,
    /// Method the signature covers.
    pub method: HttpMethod,
    /// Instant after which the signature is rejected.
    #[serde(with = "time::serde::rfc3339")]
    pub expire: OffsetDateTime,
    /// Headers the client must send with the request.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub header: BTreeMap<String, String>,
}

impl Link {
    /// Creates a link without extra headers.
    #[must_use]
    pub fn new(uri: impl Into<String>, method: HttpMethod, expire: OffsetDateTime) -> Self {
        Self {
            uri: uri.into(),
            method,
            expire,
            header: BTreeMap::new(),
        }
    }

    /// Adds a required request header.
    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.header.insert(name.into(), value.into());
        self
    }
}

/// Object metadata returned by stat calls.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectInfo {
    /// Object path relative to the bucket or container.
    pub path: String,
    /// Object size in bytes when reported.
    pub size: Option<u64>,
    /// Last modification time when reported.
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub last_modified: Option<OffsetDateTime>,
}

// ============================================================================
// SECTION: Expiry
// ============================================================================

/// Inclusive bounds on signed-link lifetimes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExpiryBounds {
    /// Shortest lifetime.
    pub min: Duration,
    /// Longest lifetime.
    pub max: Duration,
}

impl Default for ExpiryBounds {
    fn default() -> Self {
        Self {
            min: MIN_LINK_EXPIRE,
            max: MAX_LINK_EXPIRE,
        }
    }
}

impl ExpiryBounds {
    /// Clamps a requested lifetime into the bounds, truncated to whole seconds.
    #[must_use]
    pub fn clamp(&self, requested: Duration) -> Duration {
        let clamped = requested.clamp(self.min, self.max);
        Duration::from_secs(clamped.as_secs())
    }

    /// Returns the expiry instant of a link issued at `now`.
    #[must_use]
    pub fn expire_at(&self, now: OffsetDateTime, requested: Duration) -> OffsetDateTime {
        now + self.clamp(requested)
    }
}

// ============================================================================
// SECTION: Storage Settings
// ============================================================================

/// Storage provider selector.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageType {
    /// Amazon S3 or S3-compatible storage.
    #[default]
    S3,
    /// Azure Blob Storage.
    Azure,
}

impl StorageType {
    /// Returns the configuration token.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::S3 => "s3",
            Self::Azure => "azure",
        }
    }
}

impl fmt::Display for StorageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-tenant storage override resolved at call time.
///
/// For Azure, `bucket` is the container, `key` the account name, and
/// `secret` the base64 account key, unless `connection_string` is set.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageSettings {
    /// Provider selector.
    #[serde(rename = "type", default)]
    pub storage_type: StorageType,
    /// Bucket (S3) or container (Azure).
    pub bucket: String,
    /// S3 region.
    #[serde(default)]
    pub region: Option<String>,
    /// Access key id (S3) or account name (Azure).
    #[serde(default)]
    pub key: Option<String>,
    /// Secret access key (S3) or account key (Azure).
    #[serde(default)]
    pub secret: Option<String>,
    /// S3 session token.
    #[serde(default)]
    pub token: Option<String>,
    /// Service endpoint used for data-plane calls.
    #[serde(default)]
    pub uri: Option<String>,
    /// Public endpoint used when signing links.
    #[serde(default)]
    pub external_uri: Option<String>,
    /// Azure storage connection string.
    #[serde(default)]
    pub connection_string: Option<String>,
    /// Use path-style S3 addressing.
    #[serde(default)]
    pub force_path_style: bool,
    /// Use S3 transfer acceleration.
    #[serde(default)]
    pub use_accelerate: bool,
}

impl fmt::Debug for StorageSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StorageSettings")
            .field("storage_type", &self.storage_type)
            .field("bucket", &self.bucket)
            .field("region", &self.region)
            .field("key", &self.key)
            .field("secret", &self.secret.as_ref().map(|_| "<redacted>"))
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .field("uri", &self.uri)
            .field("external_uri", &self.external_uri)
            .field("connection_string", &self.connection_string.as_ref().map(|_| "<redacted>"))
            .field("force_path_style", &self.force_path_style)
            .field("use_accelerate", &self.use_accelerate)
            .finish()
    }
}

impl StorageSettings {
    /// Validates field lengths and provider-specific credential requirements.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError`] when a field is out of range or required
    /// credentials are missing.
    pub fn validate(&self) -> Result<(), ValidationError> {
        require_length("bucket", &self.bucket, 3, 100)?;
        optional_length("region", self.region.as_deref(), 1, 20)?;
        optional_length("key", self.key.as_deref(), 1, 128)?;
        optional_length("secret", self.secret.as_deref(), 1, 256)?;
        optional_length("token", self.token.as_deref(), 1, 4096)?;
        optional_length("connection_string", self.connection_string.as_deref(), 1, 4096)?;
        if let Some(uri) = &self.uri {
            require_http_uri("uri", uri, MAX_URI_LENGTH)?;
        }
        if let Some(uri) = &self.external_uri {
            require_http_uri("external_uri", uri, MAX_URI_LENGTH)?;
        }
        let has_shared_key = self.key.is_some() && self.secret.is_some();
        match self.storage_type {
            StorageType::S3 => {
                if self.connection_string.is_some() {
                    return Err(ValidationError::new(
                        "connection_string: only supported for azure storage",
                    ));
                }
                if !has_shared_key {
                    return Err(ValidationError::new("key and secret: required for s3 storage"));
                }
            }
            StorageType::Azure => {
                if self.connection_string.is_none() && !has_shared_key {
                    return Err(ValidationError::new(
                        "connection_string or key and secret: required for azure storage",
                    ));
                }
            }
        }
        Ok(())
    }
}
