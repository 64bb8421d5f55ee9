// crates/rollout-core/src/runtime/object_store.rs
// ============================================================================
// Module: Rollout In-Memory Object Storage
// Description: Process-local object storage that issues `memory://` links.
// Purpose: Exercise the object-storage contract without a cloud backend.
// Dependencies: crate::{core, interfaces}, async-trait, tokio
// ============================================================================

//! ## Overview
//! [`InMemoryObjectStorage`] keeps object bodies in a map and signs links of
//! the form `memory://{key}?expires={unix}`. It honors the same expiry clamp
//! and tenant prefixing as the cloud backends so engine tests observe
//! realistic links.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::MutexGuard;
use std::time::Duration;

use async_trait::async_trait;
use time::OffsetDateTime;
use tokio::io::AsyncRead;
use tokio::io::AsyncReadExt;

use crate::core::Clock;
use crate::core::ExpiryBounds;
use crate::core::HttpMethod;
use crate::core::Link;
use crate::core::ObjectInfo;
use crate::core::RequestContext;
use crate::core::SystemClock;
use crate::interfaces::ObjectStorage;
use crate::interfaces::ObjectStorageError;
use crate::interfaces::StorageOp;

// ============================================================================
// SECTION: Types
// ============================================================================

/// Stored object body and metadata.
#[derive(Debug, Clone)]
struct StoredObject {
    /// Object body.
    body: Vec<u8>,
    /// Upload time.
    modified: OffsetDateTime,
}

/// In-memory object storage for tests and local demos.
#[derive(Clone)]
pub struct InMemoryObjectStorage {
    /// Objects keyed by backend key.
    objects: Arc<Mutex<BTreeMap<String, StoredObject>>>,
    /// Link lifetime bounds.
    bounds: ExpiryBounds,
    /// Time source used for link expiry.
    clock: Arc<dyn Clock>,
}

impl Default for InMemoryObjectStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryObjectStorage {
    /// Creates empty storage with default bounds and the system clock.
    #[must_use]
    pub fn new() -> Self {
        Self {
            objects: Arc::new(Mutex::new(BTreeMap::new())),
            bounds: ExpiryBounds::default(),
            clock: Arc::new(SystemClock),
        }
    }

    /// Replaces the time source.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Returns a copy of the object body stored under `key`.
    ///
    /// # Errors
    ///
    /// Returns [`ObjectStorageError::NotFound`] when nothing is stored.
    pub fn object_body(&self, key: &str) -> Result<Vec<u8>, ObjectStorageError> {
        let guard = self.lock()?;
        guard.get(key).map(|object| object.body.clone()).ok_or(ObjectStorageError::NotFound)
    }

    /// Locks the object map.
    fn lock(
        &self,
    ) -> Result<MutexGuard<'_, BTreeMap<String, StoredObject>>, ObjectStorageError> {
        self.objects.lock().map_err(|_| ObjectStorageError::Backend {
            provider: "memory",
            op: StorageOp::HealthCheck,
            message: "object map mutex poisoned".to_string(),
        })
    }

    /// Signs a link for `path`.
    fn sign(
        &self,
        ctx: &RequestContext,
        path: &str,
        method: HttpMethod,
        duration: Duration,
    ) -> Result<Link, ObjectStorageError> {
        if path.is_empty() {
            return Err(ObjectStorageError::InvalidPath("object path is empty".to_string()));
        }
        let expire = self.bounds.expire_at(self.clock.now(), duration);
        let uri = format!(
            "memory://{}?method={}&expires={}",
            ctx.object_key(path),
            method,
            expire.unix_timestamp()
        );
        Ok(Link::new(uri, method, expire))
    }
}

#[async_trait]
impl ObjectStorage for InMemoryObjectStorage {
    async fn health_check(&self, _ctx: &RequestContext) -> Result<(), ObjectStorageError> {
        self.lock().map(|_| ())
    }

    async fn put_object(
        &self,
        ctx: &RequestContext,
        path: &str,
        reader: &mut (dyn AsyncRead + Send + Unpin),
    ) -> Result<(), ObjectStorageError> {
        let mut body = Vec::new();
        reader
            .read_to_end(&mut body)
            .await
            .map_err(|err| ObjectStorageError::Io(err.to_string()))?;
        let object = StoredObject {
            body,
            modified: self.clock.now(),
        };
        self.lock()?.insert(ctx.object_key(path), object);
        Ok(())
    }

    async fn delete_object(
        &self,
        ctx: &RequestContext,
        path: &str,
    ) -> Result<(), ObjectStorageError> {
        self.lock()?
            .remove(&ctx.object_key(path))
            .map(|_| ())
            .ok_or(ObjectStorageError::NotFound)
    }

    async fn stat_object(
        &self,
        ctx: &RequestContext,
        path: &str,
    ) -> Result<ObjectInfo, ObjectStorageError> {
        let key = ctx.object_key(path);
        let guard = self.lock()?;
        let object = guard.get(&key).ok_or(ObjectStorageError::NotFound)?;
        Ok(ObjectInfo {
            path: key,
            size: u64::try_from(object.body.len()).ok(),
            last_modified: Some(object.modified),
        })
    }

    async fn get_request(
        &self,
        ctx: &RequestContext,
        path: &str,
        filename: Option<&str>,
        duration: Duration,
    ) -> Result<Link, ObjectStorageError> {
        let mut link = self.sign(ctx, path, HttpMethod::Get, duration)?;
        if let Some(filename) = filename {
            link.uri.push_str("&filename=");
            link.uri.push_str(filename);
        }
        Ok(link)
    }

    async fn put_request(
        &self,
        ctx: &RequestContext,
        path: &str,
        duration: Duration,
    ) -> Result<Link, ObjectStorageError> {
        self.sign(ctx, path, HttpMethod::Put, duration)
    }

    async fn delete_request(
        &self,
        ctx: &RequestContext,
        path: &str,
        duration: Duration,
    ) -> Result<Link, ObjectStorageError> {
        self.sign(ctx, path, HttpMethod::Delete, duration)
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

    use time::macros::datetime;

    use super::*;
    use crate::core::FixedClock;

    const NOW: OffsetDateTime = datetime!(2026-03-01 12:00:00 UTC);

    fn storage() -> InMemoryObjectStorage {
        InMemoryObjectStorage::new().with_clock(Arc::new(FixedClock::new(NOW)))
    }

    #[tokio::test]
    async fn link_lifetimes_are_clamped() {
        let storage = storage();
        let ctx = RequestContext::new();
        let short = storage.put_request(&ctx, "art", Duration::from_secs(1)).await.unwrap();
        assert_eq!(short.expire, NOW + Duration::from_secs(60));
        let long = storage
            .delete_request(&ctx, "art", Duration::from_secs(30 * 24 * 60 * 60))
            .await
            .unwrap();
        assert_eq!(long.expire, NOW + Duration::from_secs(7 * 24 * 60 * 60));
        assert_eq!(long.method, HttpMethod::Delete);
    }

    #[tokio::test]
    async fn objects_are_keyed_by_tenant() {
        let storage = storage();
        let ctx = RequestContext::for_tenant("op", "tenant-a");
        let mut body: &[u8] = b"payload";
        storage.put_object(&ctx, "art", &mut body).await.unwrap();

        assert_eq!(storage.object_body("tenant-a/art").unwrap(), b"payload");
        let info = storage.stat_object(&ctx, "art").await.unwrap();
        assert_eq!(info.size, Some(7));
        assert!(storage.stat_object(&RequestContext::new(), "art").await.unwrap_err().is_not_found());

        storage.delete_object(&ctx, "art").await.unwrap();
        assert!(storage.delete_object(&ctx, "art").await.unwrap_err().is_not_found());
    }
}
