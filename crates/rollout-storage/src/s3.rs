// crates/rollout-storage/src/s3.rs
// ============================================================================
// Module: S3 Object Storage
// Description: Amazon S3 backend with multipart upload and presigned links.
// Purpose: Store artifacts in S3-compatible buckets and sign device links.
// Dependencies: aws-config, aws-sdk-s3, rollout-core, time, tokio
// ============================================================================

//! ## Overview
//! [`S3Storage`] holds two clients: one for data-plane calls against `uri`
//! and one for presigning against `external_uri` (falling back to `uri`), so
//! links can point at a public endpoint while uploads use a private one.
//! Requests that carry S3 storage settings get transient clients built from
//! those settings with static credentials.
//! Invariants:
//! - Payloads that fit in one buffer are uploaded with a single `PutObject`.
//! - Multipart uploads use at most 10000 parts and are aborted on failure.
//! - Presigned lifetimes are clamped to [`ExpiryBounds`].

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use std::time::SystemTime;

use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_config::Region;
use aws_sdk_s3::Client;
use aws_sdk_s3::config::Credentials;
use aws_sdk_s3::config::http::HttpResponse;
use aws_sdk_s3::error::DisplayErrorContext;
use aws_sdk_s3::error::SdkError;
use aws_sdk_s3::presigning::PresignedRequest;
use aws_sdk_s3::presigning::PresigningConfig;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::BucketLocationConstraint;
use aws_sdk_s3::types::CompletedMultipartUpload;
use aws_sdk_s3::types::CompletedPart;
use aws_sdk_s3::types::CreateBucketConfiguration;
use aws_sdk_s3::types::RequestPayer;
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
use tokio::io::AsyncRead;

use crate::buffer::fill_buffer;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Backend label used in error reports.
const PROVIDER: &str = "s3";
/// Default multipart part size (10 MiB).
pub const DEFAULT_BUFFER_SIZE: usize = 10 * 1024 * 1024;
/// Smallest part size S3 accepts for non-final parts (5 MiB).
pub const MIN_BUFFER_SIZE: usize = 5 * 1024 * 1024;
/// Maximum number of parts in one multipart upload.
const MAX_PARTS: i32 = 10_000;
/// Region used with static credentials when none is configured.
const FALLBACK_REGION: &str = "us-east-1";
/// Provider name attached to static credentials.
const STATIC_PROVIDER_NAME: &str = "rollout-static";

// ============================================================================
// SECTION: Options
// ============================================================================

/// Static S3 credentials.
#[derive(Clone, PartialEq, Eq)]
pub struct StaticCredentials {
    /// Access key id.
    pub key: String,
    /// Secret access key.
    pub secret: String,
    /// Optional session token.
    pub token: Option<String>,
}

impl fmt::Debug for StaticCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StaticCredentials")
            .field("key", &self.key)
            .field("secret", &"<redacted>")
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

impl StaticCredentials {
    /// Converts to SDK credentials.
    fn to_sdk(&self) -> Credentials {
        Credentials::new(
            self.key.clone(),
            self.secret.clone(),
            self.token.clone(),
            None,
            STATIC_PROVIDER_NAME,
        )
    }
}

/// Service-wide S3 configuration.
#[derive(Debug, Clone)]
pub struct S3Options {
    /// Bucket holding artifacts.
    pub bucket: String,
    /// Region; falls back to the environment when unset.
    pub region: Option<String>,
    /// Endpoint for data-plane calls (S3-compatible stores).
    pub uri: Option<String>,
    /// Public endpoint used for presigned links.
    pub external_uri: Option<String>,
    /// Static credentials; the environment chain is used when unset.
    pub credentials: Option<StaticCredentials>,
    /// Path-style addressing.
    pub force_path_style: bool,
    /// Transfer acceleration.
    pub use_accelerate: bool,
    /// Multipart part size in bytes.
    pub buffer_size: usize,
    /// Content type stored with uploads and returned on downloads.
    pub content_type: Option<String>,
    /// Create the bucket at startup when it does not exist.
    pub create_bucket: bool,
}

impl S3Options {
    /// Creates options for `bucket` with defaults elsewhere.
    #[must_use]
    pub fn new(bucket: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            region: None,
            uri: None,
            external_uri: None,
            credentials: None,
            force_path_style: false,
            use_accelerate: false,
            buffer_size: DEFAULT_BUFFER_SIZE,
            content_type: None,
            create_bucket: false,
        }
    }

    /// Returns the effective part size, never below [`MIN_BUFFER_SIZE`].
    #[must_use]
    pub fn part_size(&self) -> usize {
        self.buffer_size.max(MIN_BUFFER_SIZE)
    }
}

// ============================================================================
// SECTION: Clients
// ============================================================================

/// Client pair for one endpoint configuration.
#[derive(Clone)]
struct S3Target {
    /// Client for data-plane calls.
    data: Client,
    /// Client for presigning.
    presign: Client,
    /// Bucket name.
    bucket: String,
}

/// Endpoint parameters shared by configured and per-call clients.
struct Endpoint<'a> {
    /// Region override.
    region: Option<&'a str>,
    /// Data-plane endpoint.
    uri: Option<&'a str>,
    /// Presign endpoint.
    external_uri: Option<&'a str>,
    /// Path-style addressing.
    force_path_style: bool,
    /// Transfer acceleration.
    use_accelerate: bool,
}

/// Builds the client pair from a base SDK builder.
fn build_target(
    base: aws_sdk_s3::config::Builder,
    endpoint: &Endpoint<'_>,
    bucket: &str,
) -> S3Target {
    let mut builder = base.force_path_style(endpoint.force_path_style);
    if endpoint.use_accelerate {
        builder = builder.accelerate(true);
    }
    if let Some(region) = endpoint.region {
        builder = builder.region(Region::new(region.to_string()));
    }
    let data_builder = match endpoint.uri {
        Some(uri) => builder.clone().endpoint_url(uri),
        None => builder.clone(),
    };
    let presign_builder = match endpoint.external_uri.or(endpoint.uri) {
        Some(uri) => builder.endpoint_url(uri),
        None => builder,
    };
    S3Target {
        data: Client::from_conf(data_builder.build()),
        presign: Client::from_conf(presign_builder.build()),
        bucket: bucket.to_string(),
    }
}

/// Returns an SDK builder that uses static credentials and no environment.
fn static_builder(credentials: &StaticCredentials, region: Option<&str>) -> aws_sdk_s3::config::Builder {
    aws_sdk_s3::config::Builder::new()
        .behavior_version(BehaviorVersion::latest())
        .region(Region::new(region.unwrap_or(FALLBACK_REGION).to_string()))
        .credentials_provider(credentials.to_sdk())
}

// ============================================================================
// SECTION: Storage
// ============================================================================

/// S3-backed object storage.
#[derive(Clone)]
pub struct S3Storage {
    /// Clients for the configured bucket.
    default: S3Target,
    /// Service-wide options.
    options: S3Options,
    /// Link lifetime bounds.
    bounds: ExpiryBounds,
    /// Time source for presigning.
    clock: Arc<dyn Clock>,
}

impl S3Storage {
    /// Connects to S3 using the configured options, creating the bucket when
    /// requested.
    ///
    /// # Errors
    ///
    /// Returns [`ObjectStorageError`] when options are invalid or bucket
    /// initialization fails.
    pub async fn connect(options: S3Options) -> Result<Self, ObjectStorageError> {
        let storage = Self::from_options(options).await?;
        if storage.options.create_bucket {
            storage.init().await?;
        }
        Ok(storage)
    }

    /// Builds clients without contacting S3.
    ///
    /// Without static credentials the shared AWS configuration is loaded from
    /// the environment.
    ///
    /// # Errors
    ///
    /// Returns [`ObjectStorageError::InvalidSettings`] when the bucket is blank.
    pub async fn from_options(options: S3Options) -> Result<Self, ObjectStorageError> {
        if options.bucket.trim().is_empty() {
            return Err(ObjectStorageError::InvalidSettings("bucket must be set".to_string()));
        }
        let endpoint = Endpoint {
            region: options.region.as_deref(),
            uri: options.uri.as_deref(),
            external_uri: options.external_uri.as_deref(),
            force_path_style: options.force_path_style,
            use_accelerate: options.use_accelerate,
        };
        let base = match &options.credentials {
            Some(credentials) => static_builder(credentials, options.region.as_deref()),
            None => {
                let shared = aws_config::defaults(BehaviorVersion::latest()).load().await;
                aws_sdk_s3::config::Builder::from(&shared)
            }
        };
        let default = build_target(base, &endpoint, &options.bucket);
        Ok(Self {
            default,
            options,
            bounds: ExpiryBounds::default(),
            clock: Arc::new(SystemClock),
        })
    }

    /// Replaces the time source used for presigning.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Ensures the configured bucket exists, creating it on 404.
    ///
    /// # Errors
    ///
    /// Returns [`ObjectStorageError::Backend`] when the bucket cannot be
    /// checked or created, including missing permissions.
    pub async fn init(&self) -> Result<(), ObjectStorageError> {
        let target = &self.default;
        let err = match target.data.head_bucket().bucket(&target.bucket).send().await {
            Ok(_) => return Ok(()),
            Err(err) => err,
        };
        match status_of(&err) {
            Some(404) => {}
            Some(403) => {
                return Err(backend(
                    StorageOp::HealthCheck,
                    format!("insufficient permissions to access bucket {}", target.bucket),
                ));
            }
            _ => return Err(sdk_error(StorageOp::HealthCheck, &err)),
        }
        let mut request = target.data.create_bucket().bucket(&target.bucket);
        if let Some(region) = self.options.region.as_deref().filter(|region| *region != FALLBACK_REGION) {
            request = request.create_bucket_configuration(
                CreateBucketConfiguration::builder()
                    .location_constraint(BucketLocationConstraint::from(region))
                    .build(),
            );
        }
        request.send().await.map_err(|err| sdk_error(StorageOp::HealthCheck, &err))?;
        Ok(())
    }

    /// Resolves the clients for a request.
    fn target(&self, ctx: &RequestContext) -> Result<S3Target, ObjectStorageError> {
        let Some(settings) = ctx.storage_settings() else {
            return Ok(self.default.clone());
        };
        target_from_settings(settings)
    }

    /// Returns the presigning configuration and resulting expiry.
    fn presigning(
        &self,
        duration: Duration,
    ) -> Result<(PresigningConfig, OffsetDateTime), ObjectStorageError> {
        let now = self.clock.now();
        let expires_in = self.bounds.clamp(duration);
        let config = PresigningConfig::builder()
            .start_time(SystemTime::from(now))
            .expires_in(expires_in)
            .build()
            .map_err(|err| ObjectStorageError::InvalidSettings(err.to_string()))?;
        Ok((config, now + expires_in))
    }

    /// Uploads a payload in parts, returning the completed part list.
    async fn upload_parts(
        &self,
        target: &S3Target,
        key: &str,
        upload_id: &str,
        first: Vec<u8>,
        reader: &mut (dyn AsyncRead + Send + Unpin),
    ) -> Result<Vec<CompletedPart>, ObjectStorageError> {
        let mut parts = Vec::new();
        let mut buffer = first;
        let mut eof = false;
        let mut part_number = 1;
        while !buffer.is_empty() {
            check_part_limit(part_number)?;
            let output = target
                .data
                .upload_part()
                .bucket(&target.bucket)
                .key(key)
                .upload_id(upload_id)
                .part_number(part_number)
                .body(ByteStream::from(buffer))
                .send()
                .await
                .map_err(|err| sdk_error(StorageOp::PutObject, &err))?;
            parts.push(
                CompletedPart::builder()
                    .set_e_tag(output.e_tag().map(str::to_string))
                    .part_number(part_number)
                    .build(),
            );
            if eof {
                break;
            }
            let chunk = fill_buffer(reader, self.options.part_size()).await?;
            buffer = chunk.data;
            eof = chunk.eof;
            part_number += 1;
        }
        Ok(parts)
    }

    /// Runs a multipart upload, aborting it on any failure.
    ///
    /// A failed abort is reported together with the upload error.
    async fn put_multipart(
        &self,
        target: &S3Target,
        key: &str,
        first: Vec<u8>,
        reader: &mut (dyn AsyncRead + Send + Unpin),
    ) -> Result<(), ObjectStorageError> {
        let created = target
            .data
            .create_multipart_upload()
            .bucket(&target.bucket)
            .key(key)
            .set_content_type(self.options.content_type.clone())
            .send()
            .await
            .map_err(|err| sdk_error(StorageOp::PutObject, &err))?;
        let upload_id = created
            .upload_id()
            .ok_or_else(|| backend(StorageOp::PutObject, "multipart upload id missing".to_string()))?
            .to_string();

        let result: Result<(), ObjectStorageError> = async {
            let parts = self.upload_parts(target, key, &upload_id, first, reader).await?;
            target
                .data
                .complete_multipart_upload()
                .bucket(&target.bucket)
                .key(key)
                .upload_id(&upload_id)
                .multipart_upload(CompletedMultipartUpload::builder().set_parts(Some(parts)).build())
                .send()
                .await
                .map_err(|err| sdk_error(StorageOp::PutObject, &err))?;
            Ok(())
        }
        .await;

        let Err(err) = result else {
            return Ok(());
        };
        let aborted = target
            .data
            .abort_multipart_upload()
            .bucket(&target.bucket)
            .key(key)
            .upload_id(&upload_id)
            .send()
            .await;
        match aborted {
            Ok(_) => Err(err),
            Err(abort) => Err(backend(
                StorageOp::PutObject,
                format!(
                    "{err}; aborting multipart upload {upload_id} failed: {}",
                    DisplayErrorContext(&abort)
                ),
            )),
        }
    }
}

#[async_trait]
impl ObjectStorage for S3Storage {
    async fn health_check(&self, ctx: &RequestContext) -> Result<(), ObjectStorageError> {
        let target = self.target(ctx)?;
        target
            .data
            .head_bucket()
            .bucket(&target.bucket)
            .send()
            .await
            .map_err(|err| sdk_error(StorageOp::HealthCheck, &err))?;
        Ok(())
    }

    async fn put_object(
        &self,
        ctx: &RequestContext,
        path: &str,
        reader: &mut (dyn AsyncRead + Send + Unpin),
    ) -> Result<(), ObjectStorageError> {
        let target = self.target(ctx)?;
        let key = ctx.object_key(path);
        let first = fill_buffer(reader, self.options.part_size()).await?;
        if !first.eof {
            return self.put_multipart(&target, &key, first.data, reader).await;
        }
        target
            .data
            .put_object()
            .bucket(&target.bucket)
            .key(&key)
            .set_content_type(self.options.content_type.clone())
            .body(ByteStream::from(first.data))
            .send()
            .await
            .map_err(|err| sdk_error(StorageOp::PutObject, &err))?;
        Ok(())
    }

    async fn delete_object(
        &self,
        ctx: &RequestContext,
        path: &str,
    ) -> Result<(), ObjectStorageError> {
        let target = self.target(ctx)?;
        target
            .data
            .delete_object()
            .bucket(&target.bucket)
            .key(ctx.object_key(path))
            .request_payer(RequestPayer::Requester)
            .send()
            .await
            .map_err(|err| sdk_error(StorageOp::DeleteObject, &err))?;
        Ok(())
    }

    async fn stat_object(
        &self,
        ctx: &RequestContext,
        path: &str,
    ) -> Result<ObjectInfo, ObjectStorageError> {
        let target = self.target(ctx)?;
        let key = ctx.object_key(path);
        let output = target
            .data
            .head_object()
            .bucket(&target.bucket)
            .key(&key)
            .send()
            .await
            .map_err(|err| sdk_error(StorageOp::StatObject, &err))?;
        Ok(ObjectInfo {
            path: key,
            size: output.content_length().and_then(|size| u64::try_from(size).ok()),
            last_modified: output
                .last_modified()
                .and_then(|modified| OffsetDateTime::from_unix_timestamp(modified.secs()).ok()),
        })
    }

    async fn get_request(
        &self,
        ctx: &RequestContext,
        path: &str,
        filename: Option<&str>,
        duration: Duration,
    ) -> Result<Link, ObjectStorageError> {
        let target = self.target(ctx)?;
        let (config, expire) = self.presigning(duration)?;
        let presigned = target
            .presign
            .get_object()
            .bucket(&target.bucket)
            .key(ctx.object_key(path))
            .set_response_content_disposition(filename.map(attachment_disposition))
            .set_response_content_type(self.options.content_type.clone())
            .presigned(config)
            .await
            .map_err(|err| sdk_error(StorageOp::GetRequest, &err))?;
        Ok(link_from(&presigned, HttpMethod::Get, expire))
    }

    async fn put_request(
        &self,
        ctx: &RequestContext,
        path: &str,
        duration: Duration,
    ) -> Result<Link, ObjectStorageError> {
        let target = self.target(ctx)?;
        let (config, expire) = self.presigning(duration)?;
        let presigned = target
            .presign
            .put_object()
            .bucket(&target.bucket)
            .key(ctx.object_key(path))
            .presigned(config)
            .await
            .map_err(|err| sdk_error(StorageOp::PutRequest, &err))?;
        Ok(link_from(&presigned, HttpMethod::Put, expire))
    }

    async fn delete_request(
        &self,
        ctx: &RequestContext,
        path: &str,
        duration: Duration,
    ) -> Result<Link, ObjectStorageError> {
        let target = self.target(ctx)?;
        let (config, expire) = self.presigning(duration)?;
        let presigned = target
            .presign
            .delete_object()
            .bucket(&target.bucket)
            .key(ctx.object_key(path))
            .presigned(config)
            .await
            .map_err(|err| sdk_error(StorageOp::DeleteRequest, &err))?;
        Ok(link_from(&presigned, HttpMethod::Delete, expire))
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Builds transient clients from per-request settings.
fn target_from_settings(settings: &StorageSettings) -> Result<S3Target, ObjectStorageError> {
    if settings.storage_type != StorageType::S3 {
        return Err(ObjectStorageError::InvalidSettings(format!(
            "settings target {} storage",
            settings.storage_type
        )));
    }
    settings.validate().map_err(|err| ObjectStorageError::InvalidSettings(err.to_string()))?;
    let (Some(key), Some(secret)) = (&settings.key, &settings.secret) else {
        return Err(ObjectStorageError::InvalidSettings(
            "key and secret: required for s3 storage".to_string(),
        ));
    };
    let credentials = StaticCredentials {
        key: key.clone(),
        secret: secret.clone(),
        token: settings.token.clone(),
    };
    let endpoint = Endpoint {
        region: settings.region.as_deref(),
        uri: settings.uri.as_deref(),
        external_uri: settings.external_uri.as_deref(),
        force_path_style: settings.force_path_style,
        use_accelerate: settings.use_accelerate,
    };
    Ok(build_target(
        static_builder(&credentials, settings.region.as_deref()),
        &endpoint,
        &settings.bucket,
    ))
}

/// Formats a download content disposition.
fn attachment_disposition(filename: &str) -> String {
    format!("attachment; filename=\"{filename}\"")
}

/// Converts a presigned request into a link.
fn link_from(presigned: &PresignedRequest, method: HttpMethod, expire: OffsetDateTime) -> Link {
    presigned
        .headers()
        .fold(Link::new(presigned.uri(), method, expire), |link, (name, value)| {
            link.with_header(name, value)
        })
}

/// Returns the HTTP status of a failed SDK call, when a response arrived.
fn status_of<E>(err: &SdkError<E, HttpResponse>) -> Option<u16> {
    err.raw_response().map(|response| response.status().as_u16())
}

/// Maps an SDK failure, folding 404 responses into the not-found sentinel.
fn sdk_error<E>(op: StorageOp, err: &SdkError<E, HttpResponse>) -> ObjectStorageError
where
    E: std::error::Error + Send + Sync + 'static,
{
    if status_of(err) == Some(404) {
        return ObjectStorageError::NotFound;
    }
    backend(op, DisplayErrorContext(err).to_string())
}

/// Rejects part numbers past [`MAX_PARTS`].
fn check_part_limit(part_number: i32) -> Result<(), ObjectStorageError> {
    if part_number > MAX_PARTS {
        return Err(backend(
            StorageOp::PutObject,
            format!("payload exceeds {MAX_PARTS} multipart parts"),
        ));
    }
    Ok(())
}

/// Builds a backend error.
fn backend(op: StorageOp, message: String) -> ObjectStorageError {
    ObjectStorageError::Backend {
        provider: PROVIDER,
        op,
        message,
    }
}

#[cfg(test)]
mod tests {
    #![allow(
        clippy::panic,
        clippy::unwrap_used,
        clippy::expect_used,
        reason = "Test-only assertions are permitted."
    )]

    use super::*;

    #[test]
    fn part_size_never_drops_below_minimum() {
        let mut options = S3Options::new("artifacts");
        assert_eq!(options.part_size(), DEFAULT_BUFFER_SIZE);
        options.buffer_size = 1024;
        assert_eq!(options.part_size(), MIN_BUFFER_SIZE);
    }

    #[test]
    fn settings_for_other_providers_are_rejected() {
        let settings = StorageSettings {
            storage_type: StorageType::Azure,
            bucket: "artifacts".to_string(),
            connection_string: Some("AccountName=a;AccountKey=b".to_string()),
            ..StorageSettings::default()
        };
        assert!(matches!(
            target_from_settings(&settings),
            Err(ObjectStorageError::InvalidSettings(_))
        ));
    }

    #[test]
    fn incomplete_settings_are_rejected() {
        let settings = StorageSettings {
            bucket: "artifacts".to_string(),
            key: Some("AKIA".to_string()),
            ..StorageSettings::default()
        };
        assert!(matches!(
            target_from_settings(&settings),
            Err(ObjectStorageError::InvalidSettings(_))
        ));
    }

    #[test]
    fn part_limit_allows_the_last_part_only() {
        assert!(check_part_limit(1).is_ok());
        assert!(check_part_limit(MAX_PARTS).is_ok());
        let err = check_part_limit(MAX_PARTS + 1).unwrap_err();
        assert_eq!(err.to_string(), "s3 PutObject: payload exceeds 10000 multipart parts");
    }

    #[test]
    fn credentials_debug_is_redacted() {
        let credentials = StaticCredentials {
            key: "AKIA".to_string(),
            secret: "s3cr3t-value".to_string(),
            token: Some("session-value".to_string()),
        };
        let rendered = format!("{credentials:?}");
        assert!(rendered.contains("AKIA"));
        assert!(!rendered.contains("s3cr3t-value"));
        assert!(!rendered.contains("session-value"));
    }
}
