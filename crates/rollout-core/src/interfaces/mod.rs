// crates/rollout-core/src/interfaces/mod.rs
// ============================================================================
// Module: Rollout Interfaces
// Description: Backend-agnostic contracts for persistence, object storage, and catalogs.
// Purpose: Define the collaborator surfaces consumed by the orchestration engine.
// Dependencies: crate::core, async-trait, thiserror, tokio
// ============================================================================

//! ## Overview
//! Interfaces define how Rollout integrates with external systems without
//! embedding backend-specific details. Every call takes the
//! [`RequestContext`] so implementations can scope data by tenant and pick up
//! per-call storage overrides. Each call is treated as atomic on its own;
//! the engine sequences calls and does not expect cross-call transactions.
//! "Nothing there" is reported as `Ok(None)` or an empty collection, never as
//! an error.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use time::OffsetDateTime;
use tokio::io::AsyncRead;

use crate::core::Artifact;
use crate::core::ArtifactId;
use crate::core::Deployment;
use crate::core::DeploymentId;
use crate::core::DeploymentLog;
use crate::core::DeviceDeployment;
use crate::core::DeviceDeploymentState;
use crate::core::DeviceDeploymentStatus;
use crate::core::DeviceId;
use crate::core::Link;
use crate::core::ObjectInfo;
use crate::core::Query;
use crate::core::RequestContext;
use crate::core::Stats;
use crate::core::StatsError;

// ============================================================================
// SECTION: Data Store
// ============================================================================

/// Data store errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// Store I/O error.
    #[error("data store io error: {0}")]
    Io(String),
    /// Stored data is corrupted or breaks an invariant.
    #[error("data store corruption: {0}")]
    Corrupt(String),
    /// Store schema version is incompatible.
    #[error("data store version mismatch: {0}")]
    VersionMismatch(String),
    /// Data rejected by the store.
    #[error("data store invalid data: {0}")]
    Invalid(String),
    /// Write targeted a record that does not exist.
    #[error("data store record not found: {0}")]
    NotFound(String),
    /// Write conflicts with an existing record.
    #[error("data store conflict: {0}")]
    Conflict(String),
    /// Store reported an error.
    #[error("data store error: {0}")]
    Store(String),
}

impl From<StatsError> for StoreError {
    fn from(error: StatsError) -> Self {
        Self::Corrupt(error.to_string())
    }
}

/// Persistence contract for deployments, device-deployments, and logs.
#[async_trait]
pub trait DataStore: Send + Sync {
    /// Inserts a new deployment.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Conflict`] when the identifier already exists.
    async fn insert_deployment(
        &self,
        ctx: &RequestContext,
        deployment: &Deployment,
    ) -> Result<(), StoreError>;

    /// Deletes a deployment; used only to roll back a failed creation.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the delete fails.
    async fn delete_deployment(
        &self,
        ctx: &RequestContext,
        id: &DeploymentId,
    ) -> Result<(), StoreError>;

    /// Finds a deployment by identifier.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the read fails.
    async fn find_deployment_by_id(
        &self,
        ctx: &RequestContext,
        id: &DeploymentId,
    ) -> Result<Option<Deployment>, StoreError>;

    /// Finds a deployment by identifier only if it is not finished.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the read fails.
    async fn find_unfinished_by_id(
        &self,
        ctx: &RequestContext,
        id: &DeploymentId,
    ) -> Result<Option<Deployment>, StoreError>;

    /// Finds deployments matching a query, newest first.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the read fails.
    async fn find_deployments(
        &self,
        ctx: &RequestContext,
        query: &Query,
    ) -> Result<Vec<Deployment>, StoreError>;

    /// Counts the device-deployments stored for a deployment.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the read fails.
    async fn device_count_by_deployment(
        &self,
        ctx: &RequestContext,
        id: &DeploymentId,
    ) -> Result<u64, StoreError>;

    /// Moves one device from the `old` to the `new` stats bucket.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] for unknown deployments and
    /// [`StoreError::Corrupt`] when the move would underflow a counter.
    async fn update_stats(
        &self,
        ctx: &RequestContext,
        id: &DeploymentId,
        old: DeviceDeploymentStatus,
        new: DeviceDeploymentStatus,
    ) -> Result<(), StoreError>;

    /// Replaces the stats with a fresh aggregate and stamps the finish time.
    ///
    /// A finish time already on the deployment is kept.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] for unknown deployments.
    async fn update_stats_and_finish_deployment(
        &self,
        ctx: &RequestContext,
        id: &DeploymentId,
        stats: &Stats,
        finished: OffsetDateTime,
    ) -> Result<(), StoreError>;

    /// Stamps the finish time if it is not set yet.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] for unknown deployments.
    async fn finish_deployment(
        &self,
        ctx: &RequestContext,
        id: &DeploymentId,
        finished: OffsetDateTime,
    ) -> Result<(), StoreError>;

    /// Inserts device-deployments in bulk.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when any record cannot be stored.
    async fn insert_device_deployments(
        &self,
        ctx: &RequestContext,
        records: &[DeviceDeployment],
    ) -> Result<(), StoreError>;

    /// Loads the device-deployment for a `(deployment, device)` pair.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the read fails.
    async fn get_device_deployment(
        &self,
        ctx: &RequestContext,
        deployment_id: &DeploymentId,
        device_id: &DeviceId,
    ) -> Result<Option<DeviceDeployment>, StoreError>;

    /// Finds the oldest device-deployment in an active status for a device.
    ///
    /// Ties on creation time break on deployment identifier ascending.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the read fails.
    async fn find_oldest_active_device_deployment(
        &self,
        ctx: &RequestContext,
        device_id: &DeviceId,
    ) -> Result<Option<DeviceDeployment>, StoreError>;

    /// Lists every device-deployment of a deployment.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the read fails.
    async fn get_device_statuses_for_deployment(
        &self,
        ctx: &RequestContext,
        id: &DeploymentId,
    ) -> Result<Vec<DeviceDeployment>, StoreError>;

    /// Returns true when the device has (or had) the deployment assigned.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the read fails.
    async fn has_deployment_for_device(
        &self,
        ctx: &RequestContext,
        deployment_id: &DeploymentId,
        device_id: &DeviceId,
    ) -> Result<bool, StoreError>;

    /// Writes a status change and returns the status it replaced.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] when the pair has no record.
    async fn update_device_deployment_status(
        &self,
        ctx: &RequestContext,
        deployment_id: &DeploymentId,
        device_id: &DeviceId,
        state: &DeviceDeploymentState,
    ) -> Result<DeviceDeploymentStatus, StoreError>;

    /// Records the artifact resolved for a device-deployment at poll time.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] when the pair has no record.
    async fn assign_artifact(
        &self,
        ctx: &RequestContext,
        deployment_id: &DeploymentId,
        device_id: &DeviceId,
        device_type: &str,
        artifact: &Artifact,
    ) -> Result<(), StoreError>;

    /// Moves every active device-deployment of a deployment to `aborted`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the write fails.
    async fn abort_device_deployments(
        &self,
        ctx: &RequestContext,
        id: &DeploymentId,
        finished: OffsetDateTime,
    ) -> Result<(), StoreError>;

    /// Moves every active device-deployment of a device to `decommissioned`.
    ///
    /// Returns the deployments whose records changed, in identifier order.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the write fails.
    async fn decommission_device_deployments(
        &self,
        ctx: &RequestContext,
        device_id: &DeviceId,
        finished: OffsetDateTime,
    ) -> Result<Vec<DeploymentId>, StoreError>;

    /// Counts a deployment's device-deployments per status from scratch.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the read fails.
    async fn aggregate_device_deployment_by_status(
        &self,
        ctx: &RequestContext,
        id: &DeploymentId,
    ) -> Result<Stats, StoreError>;

    /// Sets the log-availability flag of a device-deployment.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] when the pair has no record.
    async fn update_device_deployment_log_availability(
        &self,
        ctx: &RequestContext,
        deployment_id: &DeploymentId,
        device_id: &DeviceId,
        available: bool,
    ) -> Result<(), StoreError>;

    /// Stores a deployment log, replacing any previous one for the pair.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the write fails.
    async fn save_device_deployment_log(
        &self,
        ctx: &RequestContext,
        log: &DeploymentLog,
    ) -> Result<(), StoreError>;

    /// Loads the deployment log of a device-deployment.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the read fails.
    async fn get_device_deployment_log(
        &self,
        ctx: &RequestContext,
        deployment_id: &DeploymentId,
        device_id: &DeviceId,
    ) -> Result<Option<DeploymentLog>, StoreError>;
}

// ============================================================================
// SECTION: Object Storage
// ============================================================================

/// Object-storage operation labels used in error reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageOp {
    /// Backend reachability probe.
    HealthCheck,
    /// Object upload.
    PutObject,
    /// Object removal.
    DeleteObject,
    /// Object metadata read.
    StatObject,
    /// Signed download link.
    GetRequest,
    /// Signed upload link.
    PutRequest,
    /// Signed removal link.
    DeleteRequest,
}

impl StorageOp {
    /// Returns the operation label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::HealthCheck => "HealthCheck",
            Self::PutObject => "PutObject",
            Self::DeleteObject => "DeleteObject",
            Self::StatObject => "StatObject",
            Self::GetRequest => "GetRequest",
            Self::PutRequest => "PutRequest",
            Self::DeleteRequest => "DeleteRequest",
        }
    }
}

impl fmt::Display for StorageOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Object-storage errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ObjectStorageError {
    /// Object does not exist, whatever the backend's native error shape.
    #[error("object not found")]
    NotFound,
    /// Per-call or configured settings are unusable.
    #[error("invalid storage settings: {0}")]
    InvalidSettings(String),
    /// No backend is configured for the requested storage type.
    #[error("invalid storage provider: {0}")]
    InvalidProvider(String),
    /// Object path is malformed.
    #[error("invalid object path: {0}")]
    InvalidPath(String),
    /// Backend reported a failure.
    #[error("{provider} {op}: {message}")]
    Backend {
        /// Backend label.
        provider: &'static str,
        /// Failed operation.
        op: StorageOp,
        /// Backend message.
        message: String,
    },
    /// Local I/O failure while streaming a payload.
    #[error("object storage io error: {0}")]
    Io(String),
}

impl ObjectStorageError {
    /// Returns true for the not-found sentinel.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound)
    }
}

/// Provider-neutral object storage with presigned request generation.
#[async_trait]
pub trait ObjectStorage: Send + Sync {
    /// Checks that the backend and its bucket are reachable.
    ///
    /// # Errors
    ///
    /// Returns [`ObjectStorageError`] when the backend is unreachable.
    async fn health_check(&self, ctx: &RequestContext) -> Result<(), ObjectStorageError>;

    /// Uploads an object from a reader, switching to multipart for large payloads.
    ///
    /// # Errors
    ///
    /// Returns [`ObjectStorageError`] when reading or uploading fails.
    async fn put_object(
        &self,
        ctx: &RequestContext,
        path: &str,
        reader: &mut (dyn AsyncRead + Send + Unpin),
    ) -> Result<(), ObjectStorageError>;

    /// Deletes an object.
    ///
    /// # Errors
    ///
    /// Returns [`ObjectStorageError::NotFound`] when the backend reports the
    /// object missing.
    async fn delete_object(&self, ctx: &RequestContext, path: &str)
    -> Result<(), ObjectStorageError>;

    /// Reads object metadata.
    ///
    /// # Errors
    ///
    /// Returns [`ObjectStorageError::NotFound`] when the object is missing.
    async fn stat_object(
        &self,
        ctx: &RequestContext,
        path: &str,
    ) -> Result<ObjectInfo, ObjectStorageError>;

    /// Signs a download link, optionally naming the downloaded file.
    ///
    /// # Errors
    ///
    /// Returns [`ObjectStorageError`] when signing fails.
    async fn get_request(
        &self,
        ctx: &RequestContext,
        path: &str,
        filename: Option<&str>,
        duration: Duration,
    ) -> Result<Link, ObjectStorageError>;

    /// Signs an upload link.
    ///
    /// # Errors
    ///
    /// Returns [`ObjectStorageError`] when signing fails.
    async fn put_request(
        &self,
        ctx: &RequestContext,
        path: &str,
        duration: Duration,
    ) -> Result<Link, ObjectStorageError>;

    /// Signs a removal link.
    ///
    /// # Errors
    ///
    /// Returns [`ObjectStorageError`] when signing fails.
    async fn delete_request(
        &self,
        ctx: &RequestContext,
        path: &str,
        duration: Duration,
    ) -> Result<Link, ObjectStorageError>;
}

#[async_trait]
impl<T> ObjectStorage for Arc<T>
where
    T: ObjectStorage + ?Sized,
{
    async fn health_check(&self, ctx: &RequestContext) -> Result<(), ObjectStorageError> {
        (**self).health_check(ctx).await
    }

    async fn put_object(
        &self,
        ctx: &RequestContext,
        path: &str,
        reader: &mut (dyn AsyncRead + Send + Unpin),
    ) -> Result<(), ObjectStorageError> {
        (**self).put_object(ctx, path, reader).await
    }

    async fn delete_object(
        &self,
        ctx: &RequestContext,
        path: &str,
    ) -> Result<(), ObjectStorageError> {
        (**self).delete_object(ctx, path).await
    }

    async fn stat_object(
        &self,
        ctx: &RequestContext,
        path: &str,
    ) -> Result<ObjectInfo, ObjectStorageError> {
        (**self).stat_object(ctx, path).await
    }

    async fn get_request(
        &self,
        ctx: &RequestContext,
        path: &str,
        filename: Option<&str>,
        duration: Duration,
    ) -> Result<Link, ObjectStorageError> {
        (**self).get_request(ctx, path, filename, duration).await
    }

    async fn put_request(
        &self,
        ctx: &RequestContext,
        path: &str,
        duration: Duration,
    ) -> Result<Link, ObjectStorageError> {
        (**self).put_request(ctx, path, duration).await
    }

    async fn delete_request(
        &self,
        ctx: &RequestContext,
        path: &str,
        duration: Duration,
    ) -> Result<Link, ObjectStorageError> {
        (**self).delete_request(ctx, path, duration).await
    }
}

// ============================================================================
// SECTION: Artifact Catalog
// ============================================================================

/// Artifact catalog errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CatalogError {
    /// Catalog reported an error.
    #[error("artifact catalog error: {0}")]
    Catalog(String),
}

/// Read-only artifact metadata catalog.
#[async_trait]
pub trait ArtifactCatalog: Send + Sync {
    /// Finds the artifact among `ids` that is compatible with `device_type`.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError`] when the lookup fails.
    async fn image_by_ids_and_device_type(
        &self,
        ctx: &RequestContext,
        ids: &[ArtifactId],
        device_type: &str,
    ) -> Result<Option<Artifact>, CatalogError>;

    /// Finds the artifact named `name` that is compatible with `device_type`.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError`] when the lookup fails.
    async fn image_by_name_and_device_type(
        &self,
        ctx: &RequestContext,
        name: &str,
        device_type: &str,
    ) -> Result<Option<Artifact>, CatalogError>;

    /// Lists every artifact named `name`.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError`] when the lookup fails.
    async fn images_by_name(
        &self,
        ctx: &RequestContext,
        name: &str,
    ) -> Result<Vec<Artifact>, CatalogError>;
}

// ============================================================================
// SECTION: Device Inventory
// ============================================================================

/// Device inventory errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InventoryError {
    /// Inventory reported an error.
    #[error("device inventory error: {0}")]
    Inventory(String),
}

/// Read-only view of device attributes and groups.
#[async_trait]
pub trait DeviceInventory: Send + Sync {
    /// Returns the device type of a device, if the inventory knows it.
    ///
    /// # Errors
    ///
    /// Returns [`InventoryError`] when the lookup fails.
    async fn device_type(
        &self,
        ctx: &RequestContext,
        device_id: &DeviceId,
    ) -> Result<Option<String>, InventoryError>;

    /// Lists the devices in a group, in inventory order.
    ///
    /// # Errors
    ///
    /// Returns [`InventoryError`] when the lookup fails.
    async fn devices_in_group(
        &self,
        ctx: &RequestContext,
        group: &str,
    ) -> Result<Vec<DeviceId>, InventoryError>;
}
