// crates/rollout-storage/src/azblob/sas.rs
// ============================================================================
// Module: Azure Service SAS
// Description: Shared-access-signature tokens for blobs and containers.
// Purpose: Sign time-bounded Azure Blob URLs with the account key.
// Dependencies: base64, hmac, sha2, time, url
// ============================================================================

//! ## Overview
//! Builds service SAS tokens (version `2020-10-02`). The signature is the
//! base64 HMAC-SHA256, keyed by the decoded account key, of the newline-joined
//! permissions, start, expiry, canonical resource, identifier, IP, protocol,
//! version, resource kind, snapshot time, and the five response-header
//! overrides. Only the download content disposition override is used.

// ============================================================================
// SECTION: Imports
// ============================================================================

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use hmac::Hmac;
use hmac::Mac;
use sha2::Sha256;
use time::OffsetDateTime;
use time::UtcOffset;
use time::format_description::well_known::Rfc3339;
use url::Url;

use crate::azblob::credentials::AzureCredentials;
use crate::azblob::credentials::CredentialsError;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Storage service version used for signing and REST calls.
pub const SERVICE_VERSION: &str = "2020-10-02";

/// HMAC-SHA256 keyed by the account key.
type HmacSha256 = Hmac<Sha256>;

// ============================================================================
// SECTION: Types
// ============================================================================

/// Permission sets granted by a SAS.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SasPermissions {
    /// Read blob content and properties.
    Read,
    /// Create and write a blob.
    CreateWrite,
    /// Delete a blob.
    Delete,
    /// List container blobs.
    List,
}

impl SasPermissions {
    /// Returns the `sp` token in canonical order.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Read => "r",
            Self::CreateWrite => "cw",
            Self::Delete => "d",
            Self::List => "l",
        }
    }
}

/// Signed resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SasResource<'a> {
    /// A single blob.
    Blob {
        /// Container name.
        container: &'a str,
        /// Blob name.
        blob: &'a str,
    },
    /// A whole container.
    Container {
        /// Container name.
        container: &'a str,
    },
}

impl SasResource<'_> {
    /// Returns the `sr` token.
    const fn kind(&self) -> &'static str {
        match self {
            Self::Blob { .. } => "b",
            Self::Container { .. } => "c",
        }
    }

    /// Returns the canonicalized resource for `account`.
    fn canonical(&self, account: &str) -> String {
        match self {
            Self::Blob {
                container,
                blob,
            } => format!("/blob/{account}/{container}/{blob}"),
            Self::Container {
                container,
            } => format!("/blob/{account}/{container}"),
        }
    }
}

/// Parameters of one SAS token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SasRequest<'a> {
    /// Granted permissions.
    pub permissions: SasPermissions,
    /// Signed resource.
    pub resource: SasResource<'a>,
    /// Start of validity.
    pub start: OffsetDateTime,
    /// End of validity.
    pub expiry: OffsetDateTime,
    /// Content disposition returned on download.
    pub content_disposition: Option<&'a str>,
}

// ============================================================================
// SECTION: Signing
// ============================================================================

/// Returns the SAS query parameters for `request`, in emission order.
///
/// # Errors
///
/// Returns [`CredentialsError::Signing`] when timestamps cannot be formatted
/// or the key is unusable.
pub fn sas_query(
    credentials: &AzureCredentials,
    request: &SasRequest<'_>,
) -> Result<Vec<(&'static str, String)>, CredentialsError> {
    let start = format_time(request.start)?;
    let expiry = format_time(request.expiry)?;
    let disposition = request.content_disposition.unwrap_or_default();
    let canonical = request.resource.canonical(credentials.account_name());
    let fields: [&str; 15] = [
        request.permissions.as_str(),
        start.as_str(),
        expiry.as_str(),
        canonical.as_str(),
        "",
        "",
        "",
        SERVICE_VERSION,
        request.resource.kind(),
        "",
        "",
        disposition,
        "",
        "",
        "",
    ];
    let string_to_sign = fields.join("\n");

    let mut mac = HmacSha256::new_from_slice(credentials.account_key())
        .map_err(|err| CredentialsError::Signing(err.to_string()))?;
    mac.update(string_to_sign.as_bytes());
    let signature = STANDARD.encode(mac.finalize().into_bytes());

    let mut query = vec![
        ("sv", SERVICE_VERSION.to_string()),
        ("st", start),
        ("se", expiry),
        ("sr", request.resource.kind().to_string()),
        ("sp", request.permissions.as_str().to_string()),
    ];
    if let Some(disposition) = request.content_disposition {
        query.push(("rscd", disposition.to_string()));
    }
    query.push(("sig", signature));
    Ok(query)
}

/// Appends the SAS for `request` to `url`.
///
/// # Errors
///
/// Returns [`CredentialsError::Signing`] when signing fails.
pub fn sign_url(
    credentials: &AzureCredentials,
    request: &SasRequest<'_>,
    mut url: Url,
) -> Result<Url, CredentialsError> {
    let query = sas_query(credentials, request)?;
    url.query_pairs_mut().extend_pairs(query);
    Ok(url)
}

/// Formats an instant as `YYYY-MM-DDThh:mm:ssZ`.
fn format_time(instant: OffsetDateTime) -> Result<String, CredentialsError> {
    instant
        .to_offset(UtcOffset::UTC)
        .replace_nanosecond(0)
        .map_err(|err| CredentialsError::Signing(err.to_string()))?
        .format(&Rfc3339)
        .map_err(|err| CredentialsError::Signing(err.to_string()))
}
