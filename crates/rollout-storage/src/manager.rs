// crates/rollout-storage/src/manager.rs
// ============================================================================
// Module: Storage Manager
// Description: Routes object-storage calls to the backend chosen per request.
// Purpose: Serve tenants on different providers behind one storage handle.
// Dependencies: async-trait, url, rollout-core
// ============================================================================

//! ## Overview
//! [`StorageManager`] owns one backend per [`StorageType`] plus a default.
//! Requests without storage settings go to the default backend; requests
//! with settings go to the backend for the settings' type, and fail with
//! [`ObjectStorageError::InvalidProvider`] when none is configured. Signed
//! links are optionally rewritten onto a proxy origin.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rollout_core::Link;
use rollout_core::ObjectInfo;
use rollout_core::ObjectStorage;
use rollout_core::ObjectStorageError;
use rollout_core::RequestContext;
use rollout_core::StorageType;
use tokio::io::AsyncRead;
use url::Url;

use crate::proxy::rewrite_proxy_url;

// ============================================================================
// SECTION: Manager
// ============================================================================

/// Per-request backend dispatcher.
#[derive(Clone)]
pub struct StorageManager {
    /// Backends keyed by provider.
    backends: BTreeMap<StorageType, Arc<dyn ObjectStorage>>,
    /// Provider used when a request carries no settings.
    default_type: StorageType,
    /// Proxy origin for signed links.
    proxy: Option<Url>,
}

impl StorageManager {
    /// Creates a manager with `backend` as the default provider.
    #[must_use]
    pub fn new(default_type: StorageType, backend: Arc<dyn ObjectStorage>) -> Self {
        let mut backends = BTreeMap::new();
        backends.insert(default_type, backend);
        Self {
            backends,
            default_type,
            proxy: None,
        }
    }

    /// Registers an additional provider, replacing any existing one.
    #[must_use]
    pub fn with_backend(mut self, storage_type: StorageType, backend: Arc<dyn ObjectStorage>) -> Self {
        self.backends.insert(storage_type, backend);
        self
    }

    /// Rewrites every signed link onto `proxy`.
    #[must_use]
    pub fn with_proxy(mut self, proxy: Url) -> Self {
        self.proxy = Some(proxy);
        self
    }

    /// Returns the default provider.
    #[must_use]
    pub const fn default_type(&self) -> StorageType {
        self.default_type
    }

    /// Selects the backend for a request.
    fn select(&self, ctx: &RequestContext) -> Result<&Arc<dyn ObjectStorage>, ObjectStorageError> {
        let storage_type =
            ctx.storage_settings().map_or(self.default_type, |settings| settings.storage_type);
        self.backends.get(&storage_type).ok_or_else(|| {
            ObjectStorageError::InvalidProvider(format!("no {storage_type} storage configured"))
        })
    }

    /// Applies the proxy rewrite to a signed link.
    fn proxied(&self, mut link: Link) -> Result<Link, ObjectStorageError> {
        if self.proxy.is_none() {
            return Ok(link);
        }
        let origin = Url::parse(&link.uri).map_err(|err| {
            ObjectStorageError::InvalidPath(format!("signed link is not a url: {err}"))
        })?;
        link.uri = rewrite_proxy_url(&origin, self.proxy.as_ref()).into();
        Ok(link)
    }
}

#[async_trait]
impl ObjectStorage for StorageManager {
    async fn health_check(&self, ctx: &RequestContext) -> Result<(), ObjectStorageError> {
        self.select(ctx)?.health_check(ctx).await
    }

    async fn put_object(
        &self,
        ctx: &RequestContext,
        path: &str,
        reader: &mut (dyn AsyncRead + Send + Unpin),
    ) -> Result<(), ObjectStorageError> {
        self.select(ctx)?.put_object(ctx, path, reader).await
    }

    async fn delete_object(
        &self,
        ctx: &RequestContext,
        path: &str,
    ) -> Result<(), ObjectStorageError> {
        self.select(ctx)?.delete_object(ctx, path).await
    }

    async fn stat_object(
        &self,
        ctx: &RequestContext,
        path: &str,
    ) -> Result<ObjectInfo, ObjectStorageError> {
        self.select(ctx)?.stat_object(ctx, path).await
    }

    async fn get_request(
        &self,
        ctx: &RequestContext,
        path: &str,
        filename: Option<&str>,
        duration: Duration,
    ) -> Result<Link, ObjectStorageError> {
        let link = self.select(ctx)?.get_request(ctx, path, filename, duration).await?;
        self.proxied(link)
    }

    async fn put_request(
        &self,
        ctx: &RequestContext,
        path: &str,
        duration: Duration,
    ) -> Result<Link, ObjectStorageError> {
        let link = self.select(ctx)?.put_request(ctx, path, duration).await?;
        self.proxied(link)
    }

    async fn delete_request(
        &self,
        ctx: &RequestContext,
        path: &str,
        duration: Duration,
    ) -> Result<Link, ObjectStorageError> {
        let link = self.select(ctx)?.delete_request(ctx, path, duration).await?;
        self.proxied(link)
    }
}
