// crates/rollout-storage/src/azblob/mod.rs
// ============================================================================
// Module: Azure Blob Object Storage
// Description: Azure Blob backend over the REST API with service SAS links.
// Purpose: Store artifacts in a blob container and sign device links.
// Dependencies: reqwest, url, time, tokio, rollout-core
// ============================================================================

//! ## Overview
//! [`AzureStorage`] talks to the Blob REST API with SAS-signed URLs, so every
//! data-plane call and every handed-out link is authorized the same way.
//! Default credentials are optional: a deployment may rely entirely on
//! per-request settings carrying a connection string or an account key pair.
//! Invariants:
//! - Payloads that fit in one buffer are written with a single Put Blob.
//! - Larger payloads use at most 50000 blocks committed with Put Block List.
//! - `BlobNotFound` responses map to [`ObjectStorageError::NotFound`].
//! - Backend failures render as `azblob <Op>: <message>: <reason>`.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use reqwest::Method;
use reqwest::RequestBuilder;
use reqwest::Response;
use reqwest::StatusCode;
use rollout_core::Clock;
use rollout_core::ExpiryBounds;
use rollout_core::HttpMethod;
use rollout_core::Link;
use rollout_core::ObjectInfo;
use rollout_core::ObjectStorage;
use rollout_core::ObjectStorageError;
use rollout_core::RequestContext;
use rollout_core::StorageOp;
use rollout_core::StorageSettings;
use rollout_core::StorageType;
use rollout_core::SystemClock;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc2822;
use tokio::io::AsyncRead;
use url::Url;

use crate::azblob::sas::SERVICE_VERSION;
use crate::azblob::sas::SasPermissions;
use crate::azblob::sas::SasRequest;
use crate::azblob::sas::SasResource;
use crate::azblob::sas::sign_url;
use crate::buffer::fill_buffer;

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod credentials;
pub mod sas;

pub use credentials::AzureCredentials;
pub use credentials::CredentialsError;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Backend label used in error reports.
const PROVIDER: &str = "azblob";
/// Default block size (32 KiB).
pub const DEFAULT_BUFFER_SIZE: usize = 32 * 1024;
/// Smallest accepted block size (4 KiB).
pub const MIN_BUFFER_SIZE: usize = 4 * 1024;
/// Maximum number of committed blocks per blob.
const MAX_BLOCKS: usize = 50_000;
/// Lifetime of SAS tokens used for the backend's own REST calls.
const INTERNAL_SAS_LIFETIME: Duration = Duration::from_secs(60 * 60);
/// Header selecting the blob type on upload.
const HEADER_BLOB_TYPE: &str = "x-ms-blob-type";
/// Header storing the content disposition on upload.
const HEADER_BLOB_CONTENT_DISPOSITION: &str = "x-ms-blob-content-disposition";
/// Header storing the content type on block list commit.
const HEADER_BLOB_CONTENT_TYPE: &str = "x-ms-blob-content-type";
/// Header carrying the service error code.
const HEADER_ERROR_CODE: &str = "x-ms-error-code";
/// Header pinning the REST API version.
const HEADER_VERSION: &str = "x-ms-version";
/// Blob type written by this backend.
const BLOCK_BLOB: &str = "BlockBlob";

// ============================================================================
// SECTION: Options
// ============================================================================

/// Service-wide Azure Blob configuration.
#[derive(Debug, Clone)]
pub struct AzureOptions {
    /// Container holding artifacts.
    pub container: String,
    /// Default credentials; requests must carry settings when unset.
    pub credentials: Option<AzureCredentials>,
    /// Content type stored with uploads.
    pub content_type: Option<String>,
    /// Suffix appended to the object's base name in upload dispositions.
    pub filename_suffix: Option<String>,
    /// Block size in bytes.
    pub buffer_size: usize,
}

impl AzureOptions {
    /// Creates options for `container` with defaults elsewhere.
    #[must_use]
    pub fn new(container: impl Into<String>) -> Self {
        Self {
            container: container.into(),
            credentials: None,
            content_type: None,
            filename_suffix: None,
            buffer_size: DEFAULT_BUFFER_SIZE,
        }
    }

    /// Returns the effective block size. Sizes below [`MIN_BUFFER_SIZE`] are
    /// ignored in favor of [`DEFAULT_BUFFER_SIZE`].
    #[must_use]
    pub const fn block_size(&self) -> usize {
        if self.buffer_size < MIN_BUFFER_SIZE { DEFAULT_BUFFER_SIZE } else { self.buffer_size }
    }

    /// Returns the upload content disposition for `path`, when a suffix is set.
    fn upload_disposition(&self, path: &str) -> Option<String> {
        self.filename_suffix.as_ref().map(|suffix| {
            let base = path.rsplit('/').next().unwrap_or(path);
            format!("attachment; filename=\"{base}{suffix}\"")
        })
    }
}

// ============================================================================
// SECTION: Storage
// ============================================================================

/// Credentials and container for one request.
#[derive(Debug, Clone)]
struct AzureTarget {
    /// Account credentials.
    credentials: AzureCredentials,
    /// Container name.
    container: String,
}

impl AzureTarget {
    /// Returns the unsigned URL of the container.
    fn container_url(&self) -> Result<Url, ObjectStorageError> {
        let mut url = self.credentials.endpoint().clone();
        url.path_segments_mut()
            .map_err(|()| invalid_endpoint(&self.credentials))?
            .pop_if_empty()
            .push(&self.container);
        Ok(url)
    }

    /// Returns the unsigned URL of a blob.
    fn blob_url(&self, key: &str) -> Result<Url, ObjectStorageError> {
        let mut url = self.container_url()?;
        url.path_segments_mut()
            .map_err(|()| invalid_endpoint(&self.credentials))?
            .extend(key.split('/'));
        Ok(url)
    }
}

/// Azure Blob-backed object storage.
#[derive(Clone)]
pub struct AzureStorage {
    /// HTTP client for REST calls.
    http: reqwest::Client,
    /// Target built from the configured credentials.
    default: Option<AzureTarget>,
    /// Service-wide options.
    options: AzureOptions,
    /// Link lifetime bounds.
    bounds: ExpiryBounds,
    /// Time source for SAS windows.
    clock: Arc<dyn Clock>,
}

impl AzureStorage {
    /// Builds the backend without contacting Azure.
    ///
    /// # Errors
    ///
    /// Returns [`ObjectStorageError`] when the container is blank or the HTTP
    /// client cannot be built.
    pub fn new(options: AzureOptions) -> Result<Self, ObjectStorageError> {
        if options.container.trim().is_empty() {
            return Err(ObjectStorageError::InvalidSettings("container must be set".to_string()));
        }
        let http = reqwest::Client::builder()
            .build()
            .map_err(|err| ObjectStorageError::InvalidSettings(err.to_string()))?;
        let default = options.credentials.clone().map(|credentials| AzureTarget {
            credentials,
            container: options.container.clone(),
        });
        Ok(Self {
            http,
            default,
            options,
            bounds: ExpiryBounds::default(),
            clock: Arc::new(SystemClock),
        })
    }

    /// Builds the backend and checks the default container when credentials
    /// are configured.
    ///
    /// # Errors
    ///
    /// Returns [`ObjectStorageError`] when construction or the health check
    /// fails.
    pub async fn connect(options: AzureOptions) -> Result<Self, ObjectStorageError> {
        let storage = Self::new(options)?;
        if storage.default.is_some() {
            storage.health_check(&RequestContext::new()).await?;
        }
        Ok(storage)
    }

    /// Replaces the time source used for SAS windows.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Resolves credentials and container for a request.
    fn target(&self, ctx: &RequestContext, op: StorageOp) -> Result<AzureTarget, ObjectStorageError> {
        match ctx.storage_settings() {
            Some(settings) => target_from_settings(settings),
            None => self.default.clone().ok_or_else(|| {
                op_error(op, "no default credentials", "storage settings are required")
            }),
        }
    }

    /// Signs `url` for `resource` over `[now, now + lifetime]`.
    fn sign(
        &self,
        target: &AzureTarget,
        url: Url,
        permissions: SasPermissions,
        resource: SasResource<'_>,
        lifetime: Duration,
        content_disposition: Option<&str>,
    ) -> Result<Url, ObjectStorageError> {
        let start = self.clock.now();
        let request = SasRequest {
            permissions,
            resource,
            start,
            expiry: start + lifetime,
            content_disposition,
        };
        sign_url(&target.credentials, &request, url)
            .map_err(|err| ObjectStorageError::InvalidSettings(err.to_string()))
    }

    /// Returns a blob URL signed for the backend's own REST calls.
    fn internal_blob_url(
        &self,
        target: &AzureTarget,
        key: &str,
        permissions: SasPermissions,
    ) -> Result<Url, ObjectStorageError> {
        let url = target.blob_url(key)?;
        let resource = SasResource::Blob {
            container: &target.container,
            blob: key,
        };
        self.sign(target, url, permissions, resource, INTERNAL_SAS_LIFETIME, None)
    }

    /// Sends a REST request and maps failures.
    async fn send(
        &self,
        request: RequestBuilder,
        op: StorageOp,
        message: &str,
    ) -> Result<Response, ObjectStorageError> {
        let response = request
            .header(HEADER_VERSION, SERVICE_VERSION)
            .send()
            .await
            .map_err(|err| op_error(op, message, err))?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let code = response
            .headers()
            .get(HEADER_ERROR_CODE)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);
        if status == StatusCode::NOT_FOUND && code.as_deref().is_none_or(|code| code == "BlobNotFound")
        {
            return Err(ObjectStorageError::NotFound);
        }
        let reason = match code {
            Some(code) => format!("{status} {code}"),
            None => status.to_string(),
        };
        Err(op_error(op, message, reason))
    }

    /// Reads blob properties.
    async fn properties(
        &self,
        target: &AzureTarget,
        key: &str,
        op: StorageOp,
    ) -> Result<ObjectInfo, ObjectStorageError> {
        let url = self.internal_blob_url(target, key, SasPermissions::Read)?;
        let response = self
            .send(self.http.request(Method::HEAD, url), op, "failed to get blob properties")
            .await?;
        let header = |name: &str| {
            response.headers().get(name).and_then(|value| value.to_str().ok()).map(str::to_string)
        };
        Ok(ObjectInfo {
            path: key.to_string(),
            size: header("content-length").and_then(|value| value.parse().ok()),
            last_modified: header("last-modified")
                .and_then(|value| OffsetDateTime::parse(&value, &Rfc2822).ok()),
        })
    }

    /// Writes a payload that fits in one request.
    async fn put_blob(
        &self,
        target: &AzureTarget,
        key: &str,
        disposition: Option<&str>,
        body: Vec<u8>,
    ) -> Result<(), ObjectStorageError> {
        let url = self.internal_blob_url(target, key, SasPermissions::CreateWrite)?;
        let mut request = self.http.put(url).header(HEADER_BLOB_TYPE, BLOCK_BLOB).body(body);
        if let Some(content_type) = &self.options.content_type {
            request = request.header(reqwest::header::CONTENT_TYPE, content_type);
        }
        if let Some(disposition) = disposition {
            request = request.header(HEADER_BLOB_CONTENT_DISPOSITION, disposition);
        }
        self.send(request, StorageOp::PutObject, "failed to upload blob").await?;
        Ok(())
    }

    /// Stages blocks from the payload and commits them.
    async fn put_blocks(
        &self,
        target: &AzureTarget,
        key: &str,
        disposition: Option<&str>,
        first: Vec<u8>,
        reader: &mut (dyn AsyncRead + Send + Unpin),
    ) -> Result<(), ObjectStorageError> {
        let base_url = self.internal_blob_url(target, key, SasPermissions::CreateWrite)?;
        let mut block_ids = Vec::new();
        let mut buffer = first;
        let mut eof = false;
        while !buffer.is_empty() {
            check_block_limit(block_ids.len())?;
            let block_id = STANDARD.encode(format!("{:05}", block_ids.len()));
            let mut url = base_url.clone();
            url.query_pairs_mut().append_pair("comp", "block").append_pair("blockid", &block_id);
            self.send(self.http.put(url).body(buffer), StorageOp::PutObject, "failed to stage block")
                .await?;
            block_ids.push(block_id);
            if eof {
                break;
            }
            let chunk = fill_buffer(reader, self.options.block_size()).await?;
            buffer = chunk.data;
            eof = chunk.eof;
        }

        let mut url = base_url;
        url.query_pairs_mut().append_pair("comp", "blocklist");
        let mut request = self.http.put(url).body(block_list_xml(&block_ids));
        if let Some(content_type) = &self.options.content_type {
            request = request.header(HEADER_BLOB_CONTENT_TYPE, content_type);
        }
        if let Some(disposition) = disposition {
            request = request.header(HEADER_BLOB_CONTENT_DISPOSITION, disposition);
        }
        self.send(request, StorageOp::PutObject, "failed to commit block list").await?;
        Ok(())
    }

    /// Signs a link for a blob.
    fn blob_link(
        &self,
        target: &AzureTarget,
        key: &str,
        method: HttpMethod,
        duration: Duration,
        content_disposition: Option<&str>,
    ) -> Result<Link, ObjectStorageError> {
        let permissions = match method {
            HttpMethod::Get => SasPermissions::Read,
            HttpMethod::Put => SasPermissions::CreateWrite,
            HttpMethod::Delete => SasPermissions::Delete,
        };
        let lifetime = self.bounds.clamp(duration);
        let start = self.clock.now();
        let request = SasRequest {
            permissions,
            resource: SasResource::Blob {
                container: &target.container,
                blob: key,
            },
            start,
            expiry: start + lifetime,
            content_disposition,
        };
        let url = sign_url(&target.credentials, &request, target.blob_url(key)?)
            .map_err(|err| ObjectStorageError::InvalidSettings(err.to_string()))?;
        Ok(Link::new(url.as_str(), method, request.expiry))
    }
}

#[async_trait]
impl ObjectStorage for AzureStorage {
    async fn health_check(&self, ctx: &RequestContext) -> Result<(), ObjectStorageError> {
        let op = StorageOp::HealthCheck;
        let target = self.target(ctx, op)?;
        let mut url = target.container_url()?;
        url.query_pairs_mut()
            .append_pair("restype", "container")
            .append_pair("comp", "list")
            .append_pair("maxresults", "1");
        let resource = SasResource::Container {
            container: &target.container,
        };
        let url = self.sign(&target, url, SasPermissions::List, resource, self.bounds.min, None)?;
        self.send(self.http.get(url), op, "failed to list blobs").await?;
        Ok(())
    }

    async fn put_object(
        &self,
        ctx: &RequestContext,
        path: &str,
        reader: &mut (dyn AsyncRead + Send + Unpin),
    ) -> Result<(), ObjectStorageError> {
        let target = self.target(ctx, StorageOp::PutObject)?;
        let key = ctx.object_key(path);
        let disposition = self.options.upload_disposition(path);
        let first = fill_buffer(reader, self.options.block_size()).await?;
        if first.eof {
            self.put_blob(&target, &key, disposition.as_deref(), first.data).await
        } else {
            self.put_blocks(&target, &key, disposition.as_deref(), first.data, reader).await
        }
    }

    async fn delete_object(
        &self,
        ctx: &RequestContext,
        path: &str,
    ) -> Result<(), ObjectStorageError> {
        let op = StorageOp::DeleteObject;
        let target = self.target(ctx, op)?;
        let url = self.internal_blob_url(&target, &ctx.object_key(path), SasPermissions::Delete)?;
        self.send(self.http.delete(url), op, "failed to delete blob").await?;
        Ok(())
    }

    async fn stat_object(
        &self,
        ctx: &RequestContext,
        path: &str,
    ) -> Result<ObjectInfo, ObjectStorageError> {
        let op = StorageOp::StatObject;
        let target = self.target(ctx, op)?;
        self.properties(&target, &ctx.object_key(path), op).await
    }

    async fn get_request(
        &self,
        ctx: &RequestContext,
        path: &str,
        filename: Option<&str>,
        duration: Duration,
    ) -> Result<Link, ObjectStorageError> {
        let op = StorageOp::GetRequest;
        let target = self.target(ctx, op)?;
        let key = ctx.object_key(path);
        match self.properties(&target, &key, op).await {
            Ok(_) => {}
            Err(ObjectStorageError::Backend {
                message, ..
            }) => return Err(op_error(op, "failed to check preconditions", message)),
            Err(err) => return Err(err),
        }
        let disposition = filename.map(|name| format!("attachment; filename=\"{name}\""));
        self.blob_link(&target, &key, HttpMethod::Get, duration, disposition.as_deref())
    }

    async fn put_request(
        &self,
        ctx: &RequestContext,
        path: &str,
        duration: Duration,
    ) -> Result<Link, ObjectStorageError> {
        let target = self.target(ctx, StorageOp::PutRequest)?;
        let key = ctx.object_key(path);
        let link = self
            .blob_link(&target, &key, HttpMethod::Put, duration, None)?
            .with_header(HEADER_BLOB_TYPE, BLOCK_BLOB);
        Ok(match self.options.upload_disposition(path) {
            Some(disposition) => link.with_header(HEADER_BLOB_CONTENT_DISPOSITION, disposition),
            None => link,
        })
    }

    async fn delete_request(
        &self,
        ctx: &RequestContext,
        path: &str,
        duration: Duration,
    ) -> Result<Link, ObjectStorageError> {
        let target = self.target(ctx, StorageOp::DeleteRequest)?;
        self.blob_link(&target, &ctx.object_key(path), HttpMethod::Delete, duration, None)
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Builds a target from per-request settings.
fn target_from_settings(settings: &StorageSettings) -> Result<AzureTarget, ObjectStorageError> {
    if settings.storage_type != StorageType::Azure {
        return Err(ObjectStorageError::InvalidSettings(format!(
            "settings target {} storage",
            settings.storage_type
        )));
    }
    settings.validate().map_err(|err| ObjectStorageError::InvalidSettings(err.to_string()))?;
    let credentials = match (&settings.connection_string, &settings.key, &settings.secret) {
        (Some(connection_string), _, _) => {
            AzureCredentials::from_connection_string(connection_string)
        }
        (None, Some(key), Some(secret)) => {
            AzureCredentials::shared_key(key, secret, settings.uri.as_deref())
        }
        _ => {
            return Err(ObjectStorageError::InvalidSettings(
                "connection_string or key and secret: required for azure storage".to_string(),
            ));
        }
    }
    .map_err(|err| ObjectStorageError::InvalidSettings(err.to_string()))?;
    Ok(AzureTarget {
        credentials,
        container: settings.bucket.clone(),
    })
}

/// Renders the block list commit body.
fn block_list_xml(block_ids: &[String]) -> String {
    let mut xml = String::from("<?xml version=\"1.0\" encoding=\"utf-8\"?><BlockList>");
    for id in block_ids {
        xml.push_str("<Latest>");
        xml.push_str(id);
        xml.push_str("</Latest>");
    }
    xml.push_str("</BlockList>");
    xml
}

/// Rejects staging another block once [`MAX_BLOCKS`] are staged.
fn check_block_limit(staged: usize) -> Result<(), ObjectStorageError> {
    if staged >= MAX_BLOCKS {
        return Err(op_error(
            StorageOp::PutObject,
            "failed to upload blob",
            format!("payload exceeds {MAX_BLOCKS} blocks"),
        ));
    }
    Ok(())
}

/// Builds an `azblob <Op>: <message>: <reason>` error.
fn op_error(op: StorageOp, message: &str, reason: impl ToString) -> ObjectStorageError {
    ObjectStorageError::Backend {
        provider: PROVIDER,
        op,
        message: format!("{message}: {}", reason.to_string()),
    }
}

/// Reports an endpoint that cannot carry path segments.
fn invalid_endpoint(credentials: &AzureCredentials) -> ObjectStorageError {
    ObjectStorageError::InvalidSettings(format!(
        "blob endpoint {} cannot carry a path",
        credentials.endpoint()
    ))
}

#[cfg(test)]
mod tests {
    #![allow(
        clippy::panic,
        clippy::unwrap_used,
        clippy::expect_used,
        reason = "Test-only assertions are permitted."
    )]

    use rollout_core::FixedClock;
    use time::macros::datetime;

    use super::*;

    const NOW: OffsetDateTime = datetime!(2026-03-01 12:00:00 UTC);

    fn storage(options: AzureOptions) -> AzureStorage {
        AzureStorage::new(options).unwrap().with_clock(Arc::new(FixedClock::new(NOW)))
    }

    fn options() -> AzureOptions {
        let mut options = AzureOptions::new("artifacts");
        options.credentials =
            Some(AzureCredentials::shared_key("acct", "Zm9vYmFy", None).unwrap());
        options
    }

    fn query(link: &Link) -> std::collections::BTreeMap<String, String> {
        Url::parse(&link.uri).unwrap().query_pairs().into_owned().collect()
    }

    #[test]
    fn small_buffer_sizes_fall_back_to_default() {
        let mut options = AzureOptions::new("artifacts");
        options.buffer_size = 1024;
        assert_eq!(options.block_size(), DEFAULT_BUFFER_SIZE);
        options.buffer_size = 64 * 1024;
        assert_eq!(options.block_size(), 64 * 1024);
    }

    #[test]
    fn block_limit_stops_at_fifty_thousand_staged_blocks() {
        assert!(check_block_limit(0).is_ok());
        assert!(check_block_limit(MAX_BLOCKS - 1).is_ok());
        let err = check_block_limit(MAX_BLOCKS).unwrap_err();
        assert_eq!(
            err.to_string(),
            "azblob PutObject: failed to upload blob: payload exceeds 50000 blocks"
        );
    }

    #[test]
    fn op_errors_render_provider_op_message_and_reason() {
        let err = op_error(StorageOp::DeleteObject, "failed to delete blob", "403 Forbidden");
        assert_eq!(err.to_string(), "azblob DeleteObject: failed to delete blob: 403 Forbidden");
    }

    #[tokio::test]
    async fn put_links_carry_blob_type_and_disposition_headers() {
        let mut options = options();
        options.filename_suffix = Some(".mender".to_string());
        let storage = storage(options);
        let ctx = RequestContext::for_tenant("op", "tenant-a");
        let link = storage.put_request(&ctx, "uploads/art-1", Duration::from_secs(600)).await.unwrap();

        assert_eq!(link.method, HttpMethod::Put);
        assert_eq!(link.expire, NOW + Duration::from_secs(600));
        assert!(
            link.uri
                .starts_with("https://acct.blob.core.windows.net/artifacts/tenant-a/uploads/art-1?")
        );
        assert_eq!(link.header[HEADER_BLOB_TYPE], BLOCK_BLOB);
        assert_eq!(
            link.header[HEADER_BLOB_CONTENT_DISPOSITION],
            "attachment; filename=\"art-1.mender\""
        );
        let query = query(&link);
        assert_eq!(query["sp"], "cw");
        assert_eq!(query["sr"], "b");
    }

    #[tokio::test]
    async fn delete_links_are_clamped_to_the_maximum_lifetime() {
        let storage = storage(options());
        let link = storage
            .delete_request(&RequestContext::new(), "art", Duration::from_secs(30 * 24 * 60 * 60))
            .await
            .unwrap();
        assert_eq!(link.expire, NOW + Duration::from_secs(7 * 24 * 60 * 60));
        assert_eq!(query(&link)["sp"], "d");
        assert!(link.header.is_empty());
    }

    #[tokio::test]
    async fn missing_default_credentials_require_settings() {
        let storage = storage(AzureOptions::new("artifacts"));
        let err = storage
            .put_request(&RequestContext::new(), "art", Duration::from_secs(60))
            .await
            .unwrap_err();
        assert!(err.to_string().starts_with("azblob PutRequest: no default credentials"));

        let settings = StorageSettings {
            storage_type: StorageType::Azure,
            bucket: "tenant-bucket".to_string(),
            connection_string: Some(
                "AccountName=other;AccountKey=Zm9vYmFy;BlobEndpoint=http://127.0.0.1:10000/other"
                    .to_string(),
            ),
            ..StorageSettings::default()
        };
        let ctx = RequestContext::new().with_storage_settings(settings);
        let link = storage.put_request(&ctx, "art", Duration::from_secs(60)).await.unwrap();
        assert!(link.uri.starts_with("http://127.0.0.1:10000/other/tenant-bucket/art?"));
    }

    #[test]
    fn block_list_lists_ids_in_order() {
        let xml = block_list_xml(&["MDAwMDA=".to_string(), "MDAwMDE=".to_string()]);
        assert!(xml.ends_with(
            "<BlockList><Latest>MDAwMDA=</Latest><Latest>MDAwMDE=</Latest></BlockList>"
        ));
    }
}
