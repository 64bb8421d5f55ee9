// crates/rollout-storage/src/azblob/credentials.rs
// ============================================================================
// Module: Azure Shared-Key Credentials
// Description: Account name, decoded account key, and blob service endpoint.
// Purpose: Resolve Azure credentials from connection strings or key pairs.
// Dependencies: base64, thiserror, url
// ============================================================================

//! ## Overview
//! Connection strings are `;`-separated `Key=Value` attributes. Attribute
//! names must start the string or follow a `;`, so `NotAccountName=` never
//! matches `AccountName=`. The blob endpoint is taken from `BlobEndpoint`
//! when present, otherwise derived from the account name,
//! `DefaultEndpointsProtocol`, and `EndpointSuffix`.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use thiserror::Error;
use url::Url;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Connection-string attribute holding the account name.
const ATTR_ACCOUNT_NAME: &str = "AccountName=";
/// Connection-string attribute holding the account key.
const ATTR_ACCOUNT_KEY: &str = "AccountKey=";
/// Connection-string attribute holding an explicit blob endpoint.
const ATTR_BLOB_ENDPOINT: &str = "BlobEndpoint=";
/// Connection-string attribute holding the endpoint scheme.
const ATTR_PROTOCOL: &str = "DefaultEndpointsProtocol=";
/// Connection-string attribute holding the endpoint DNS suffix.
const ATTR_ENDPOINT_SUFFIX: &str = "EndpointSuffix=";
/// Public-cloud endpoint suffix.
const DEFAULT_ENDPOINT_SUFFIX: &str = "core.windows.net";

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Credential resolution errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CredentialsError {
    /// Connection string lacks `AccountName`.
    #[error("connection string does not contain an account name")]
    MissingAccountName,
    /// Connection string lacks `AccountKey`.
    #[error("connection string does not contain an account key")]
    MissingAccountKey,
    /// Account key is not valid base64.
    #[error("invalid account key: {0}")]
    InvalidAccountKey(String),
    /// Endpoint is not a usable URL.
    #[error("invalid blob endpoint: {0}")]
    InvalidEndpoint(String),
    /// Signature computation failed.
    #[error("signing failed: {0}")]
    Signing(String),
}

// ============================================================================
// SECTION: Credentials
// ============================================================================

/// Azure storage account credentials.
#[derive(Clone, PartialEq, Eq)]
pub struct AzureCredentials {
    /// Storage account name.
    account_name: String,
    /// Decoded account key.
    account_key: Vec<u8>,
    /// Blob service endpoint, always ending in `/`.
    endpoint: Url,
}

impl fmt::Debug for AzureCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AzureCredentials")
            .field("account_name", &self.account_name)
            .field("account_key", &"<redacted>")
            .field("endpoint", &self.endpoint.as_str())
            .finish()
    }
}

impl AzureCredentials {
    /// Builds credentials from an account name and base64 key.
    ///
    /// Without `uri` the public-cloud endpoint of the account is used.
    ///
    /// # Errors
    ///
    /// Returns [`CredentialsError`] when the key or endpoint is invalid.
    pub fn shared_key(
        account_name: &str,
        account_key: &str,
        uri: Option<&str>,
    ) -> Result<Self, CredentialsError> {
        let endpoint = match uri {
            Some(uri) => uri.to_string(),
            None => format!("https://{account_name}.blob.{DEFAULT_ENDPOINT_SUFFIX}/"),
        };
        Self::build(account_name, account_key, &endpoint)
    }

    /// Parses a storage connection string.
    ///
    /// # Errors
    ///
    /// Returns [`CredentialsError`] when the account name or key is missing,
    /// or when the key or endpoint is invalid.
    pub fn from_connection_string(connection_string: &str) -> Result<Self, CredentialsError> {
        let account_name = connection_string_attr(connection_string, ATTR_ACCOUNT_NAME)
            .ok_or(CredentialsError::MissingAccountName)?;
        let account_key = connection_string_attr(connection_string, ATTR_ACCOUNT_KEY)
            .ok_or(CredentialsError::MissingAccountKey)?;
        let endpoint = match connection_string_attr(connection_string, ATTR_BLOB_ENDPOINT) {
            Some(endpoint) => endpoint.to_string(),
            None => {
                let protocol =
                    connection_string_attr(connection_string, ATTR_PROTOCOL).unwrap_or("https");
                let suffix = connection_string_attr(connection_string, ATTR_ENDPOINT_SUFFIX)
                    .unwrap_or(DEFAULT_ENDPOINT_SUFFIX);
                format!("{protocol}://{account_name}.blob.{suffix}/")
            }
        };
        Self::build(account_name, account_key, &endpoint)
    }

    /// Validates and assembles credentials.
    fn build(
        account_name: &str,
        account_key: &str,
        endpoint: &str,
    ) -> Result<Self, CredentialsError> {
        if account_name.trim().is_empty() {
            return Err(CredentialsError::MissingAccountName);
        }
        let account_key = STANDARD
            .decode(account_key.trim())
            .map_err(|err| CredentialsError::InvalidAccountKey(err.to_string()))?;
        if account_key.is_empty() {
            return Err(CredentialsError::MissingAccountKey);
        }
        let mut endpoint =
            Url::parse(endpoint).map_err(|err| CredentialsError::InvalidEndpoint(err.to_string()))?;
        if !matches!(endpoint.scheme(), "http" | "https") || endpoint.cannot_be_a_base() {
            return Err(CredentialsError::InvalidEndpoint(format!(
                "{endpoint} is not an http(s) url"
            )));
        }
        if !endpoint.path().ends_with('/') {
            let path = format!("{}/", endpoint.path());
            endpoint.set_path(&path);
        }
        endpoint.set_query(None);
        endpoint.set_fragment(None);
        Ok(Self {
            account_name: account_name.to_string(),
            account_key,
            endpoint,
        })
    }

    /// Returns the storage account name.
    #[must_use]
    pub fn account_name(&self) -> &str {
        &self.account_name
    }

    /// Returns the blob service endpoint.
    #[must_use]
    pub const fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    /// Returns the decoded account key.
    pub(crate) fn account_key(&self) -> &[u8] {
        &self.account_key
    }
}

/// Returns the value of `key` (including its trailing `=`) in a connection
/// string. The key must start the string or directly follow a `;`.
fn connection_string_attr<'a>(connection_string: &'a str, key: &str) -> Option<&'a str> {
    let mut search_from = 0;
    let start = loop {
        let found = search_from + connection_string.get(search_from..)?.find(key)?;
        if found == 0 || connection_string.as_bytes().get(found - 1) == Some(&b';') {
            break found + key.len();
        }
        search_from = found + key.len();
    };
    let rest = connection_string.get(start..)?;
    Some(rest.split(';').next().unwrap_or(rest))
}
