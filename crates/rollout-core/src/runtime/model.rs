// crates/rollout-core/src/runtime/model.rs
// ============================================================================
// Module: Rollout Deployments Model
// Description: Deployment orchestration engine and device status state machine.
// Purpose: Create deployments, hand out device instructions, and apply status reports.
// Dependencies: crate::{core, interfaces}, thiserror
// ============================================================================

//! ## Overview
//! [`DeploymentsModel`] sequences calls against a [`DataStore`], an
//! [`ObjectStorage`] backend, an [`ArtifactCatalog`], and a
//! [`DeviceInventory`]. It holds no locks: each operation is a sequence of
//! individually atomic store calls.
//!
//! Two operations span several store writes without a transaction:
//! - `create_deployment` inserts the deployment and then its device-deployments.
//!   When the second insert fails it deletes the deployment and reports both
//!   outcomes.
//! - `update_device_deployment_status` writes the device row, then the
//!   deployment stats, then possibly the finish time. A failure part-way
//!   leaves earlier writes in place and is reported to the caller.
//!
//! Two status reports racing on the same device-deployment both read the
//! current status before either writes. Identical reports collapse through
//! the no-op check; different reports are applied in arrival order.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use time::OffsetDateTime;

use crate::core::Artifact;
use crate::core::Clock;
use crate::core::Deployment;
use crate::core::DeploymentConstructor;
use crate::core::DeploymentId;
use crate::core::DeploymentInstructions;
use crate::core::DeploymentLog;
use crate::core::DeploymentTarget;
use crate::core::DeviceDeployment;
use crate::core::DeviceDeploymentState;
use crate::core::DeviceDeploymentStatus;
use crate::core::DeviceId;
use crate::core::InstalledDeviceDeployment;
use crate::core::Query;
use crate::core::RequestContext;
use crate::core::Stats;
use crate::core::StatsError;
use crate::core::StatusReport;
use crate::core::SystemClock;
use crate::core::ValidationError;
use crate::core::device_deployment::ArtifactSource;
use crate::interfaces::ArtifactCatalog;
use crate::interfaces::CatalogError;
use crate::interfaces::DataStore;
use crate::interfaces::DeviceInventory;
use crate::interfaces::InventoryError;
use crate::interfaces::ObjectStorage;
use crate::interfaces::ObjectStorageError;
use crate::interfaces::StoreError;
use crate::runtime::audit::DeploymentAuditEvent;
use crate::runtime::audit::DeploymentAuditEventParams;
use crate::runtime::audit::DeploymentAuditKind;
use crate::runtime::audit::DeploymentAuditSink;
use crate::runtime::audit::NoopAuditSink;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Default lifetime of artifact download links handed to devices.
pub const DEFAULT_DOWNLOAD_LINK_EXPIRE: Duration = Duration::from_secs(24 * 60 * 60);

// ============================================================================
// SECTION: Config
// ============================================================================

/// Engine configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeploymentsConfig {
    /// Lifetime requested for device download links.
    pub download_link_expire: Duration,
    /// Suffix appended to the artifact name to form the download filename.
    pub filename_suffix: Option<String>,
}

impl Default for DeploymentsConfig {
    fn default() -> Self {
        Self {
            download_link_expire: DEFAULT_DOWNLOAD_LINK_EXPIRE,
            filename_suffix: None,
        }
    }
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Caller-facing error classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Malformed input; never reached storage.
    Validation,
    /// Well-formed request that is illegal in the current state.
    Conflict,
    /// Referenced resource does not exist.
    NotFound,
    /// Store, storage, or collaborator failure.
    Internal,
}

/// Deployments model errors.
#[derive(Debug, Error)]
pub enum DeploymentsError {
    /// Structural validation failed.
    #[error("invalid input: {0}")]
    Validation(#[from] ValidationError),
    /// A device reported a status reserved for operators.
    #[error("bad status: {0} cannot be reported by a device")]
    BadStatus(DeviceDeploymentStatus),
    /// The device-deployment was aborted; aborted is sticky.
    #[error("deployment: aborted")]
    DeploymentAborted,
    /// The device was decommissioned.
    #[error("device: decommissioned")]
    DeviceDecommissioned,
    /// The device-deployment is terminal and cannot move again.
    #[error("invalid status transition from {from} to {to}")]
    InvalidTransition {
        /// Stored status.
        from: DeviceDeploymentStatus,
        /// Requested status.
        to: DeviceDeploymentStatus,
    },
    /// The deployment is already finished.
    #[error("deployment: already finished")]
    AlreadyFinished,
    /// The deployment (or device-deployment) does not exist.
    #[error("deployment not found")]
    DeploymentNotFound,
    /// The deployment target resolved to no devices.
    #[error("no devices match the deployment target")]
    NoDevices,
    /// Data store failure.
    #[error("{context}: {source}")]
    Store {
        /// Operation being performed.
        context: &'static str,
        /// Underlying store error.
        source: StoreError,
    },
    /// Object storage failure.
    #[error("{context}: {source}")]
    Storage {
        /// Operation being performed.
        context: &'static str,
        /// Underlying storage error.
        source: ObjectStorageError,
    },
    /// Artifact catalog failure.
    #[error("{context}: {source}")]
    Catalog {
        /// Operation being performed.
        context: &'static str,
        /// Underlying catalog error.
        source: CatalogError,
    },
    /// Device inventory failure.
    #[error("{context}: {source}")]
    Inventory {
        /// Operation being performed.
        context: &'static str,
        /// Underlying inventory error.
        source: InventoryError,
    },
    /// Stats bookkeeping failed.
    #[error("stats bookkeeping: {0}")]
    Stats(#[from] StatsError),
    /// Device-deployment insert failed after the deployment was stored.
    #[error("storing device deployments: {source}; {}", describe_rollback(.rollback.as_ref()))]
    CreateRolledBack {
        /// Insert failure.
        source: StoreError,
        /// Rollback failure, when the deployment could not be deleted.
        rollback: Option<StoreError>,
    },
}

impl DeploymentsError {
    /// Classifies the error for the caller layer.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation(_) | Self::NoDevices => ErrorKind::Validation,
            Self::BadStatus(_)
            | Self::DeploymentAborted
            | Self::DeviceDecommissioned
            | Self::InvalidTransition { .. }
            | Self::AlreadyFinished => ErrorKind::Conflict,
            Self::DeploymentNotFound => ErrorKind::NotFound,
            Self::Store { .. }
            | Self::Storage { .. }
            | Self::Catalog { .. }
            | Self::Inventory { .. }
            | Self::Stats(_)
            | Self::CreateRolledBack { .. } => ErrorKind::Internal,
        }
    }
}

/// Renders the rollback outcome for a failed creation.
fn describe_rollback(rollback: Option<&StoreError>) -> String {
    rollback.map_or_else(
        || "deployment rolled back".to_string(),
        |err| format!("rolling back deployment failed: {err}"),
    )
}

/// Builds a context-wrapping mapper for store errors.
fn store_err(context: &'static str) -> impl FnOnce(StoreError) -> DeploymentsError {
    move |source| DeploymentsError::Store { context, source }
}

/// Builds a context-wrapping mapper for catalog errors.
fn catalog_err(context: &'static str) -> impl FnOnce(CatalogError) -> DeploymentsError {
    move |source| DeploymentsError::Catalog { context, source }
}

/// Builds a context-wrapping mapper for inventory errors.
fn inventory_err(context: &'static str) -> impl FnOnce(InventoryError) -> DeploymentsError {
    move |source| DeploymentsError::Inventory { context, source }
}

// ============================================================================
// SECTION: Model
// ============================================================================

/// Deployment orchestration engine.
pub struct DeploymentsModel<S, O, C, I> {
    /// Persistence backend.
    store: S,
    /// Object storage used to sign artifact links.
    storage: O,
    /// Artifact metadata catalog.
    catalog: C,
    /// Device inventory.
    inventory: I,
    /// Engine configuration.
    config: DeploymentsConfig,
    /// Time source.
    clock: Arc<dyn Clock>,
    /// Audit sink.
    audit: Arc<dyn DeploymentAuditSink>,
}

impl<S, O, C, I> DeploymentsModel<S, O, C, I>
where
    S: DataStore,
    O: ObjectStorage,
    C: ArtifactCatalog,
    I: DeviceInventory,
{
    /// Creates a model using the system clock and no audit sink.
    #[must_use]
    pub fn new(store: S, storage: O, catalog: C, inventory: I, config: DeploymentsConfig) -> Self {
        Self {
            store,
            storage,
            catalog,
            inventory,
            config,
            clock: Arc::new(SystemClock),
            audit: Arc::new(NoopAuditSink),
        }
    }

    /// Replaces the time source.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Replaces the audit sink.
    #[must_use]
    pub fn with_audit(mut self, audit: Arc<dyn DeploymentAuditSink>) -> Self {
        self.audit = audit;
        self
    }

    /// Returns the underlying data store.
    #[must_use]
    pub const fn store(&self) -> &S {
        &self.store
    }

    // ------------------------------------------------------------------------
    // Deployment lifecycle
    // ------------------------------------------------------------------------

    /// Creates a deployment and one device-deployment per target device.
    ///
    /// Devices without a compatible artifact are created as `no-artifact`.
    ///
    /// # Errors
    ///
    /// Returns [`DeploymentsError::Validation`] for malformed constructors,
    /// [`DeploymentsError::NoDevices`] for empty targets, and
    /// [`DeploymentsError::CreateRolledBack`] when the device-deployment
    /// insert fails after the deployment was stored.
    pub async fn create_deployment(
        &self,
        ctx: &RequestContext,
        constructor: DeploymentConstructor,
    ) -> Result<DeploymentId, DeploymentsError> {
        constructor.validate()?;
        let devices = self.resolve_devices(ctx, &constructor).await?;
        let now = self.clock.now();
        let mut deployment = Deployment::new(DeploymentId::generate(), constructor, now);
        deployment.artifacts = self
            .catalog
            .images_by_name(ctx, deployment.artifact_name())
            .await
            .map_err(catalog_err("searching for artifacts by name"))?
            .into_iter()
            .map(|artifact| artifact.id)
            .collect();

        let mut records = Vec::with_capacity(devices.len());
        for device_id in devices {
            records.push(self.assign_device(ctx, &deployment, device_id, now).await?);
        }
        let device_count = u64::try_from(records.len()).unwrap_or(u64::MAX);
        deployment.stats = Stats::from_statuses(records.iter().map(|record| record.status))?;
        deployment.device_count = device_count;
        deployment.max_devices = device_count;
        if deployment.all_devices_terminal() {
            deployment.finished = Some(now);
        }

        self.store
            .insert_deployment(ctx, &deployment)
            .await
            .map_err(store_err("storing deployment data"))?;
        if let Err(source) = self.store.insert_device_deployments(ctx, &records).await {
            let rollback = self.store.delete_deployment(ctx, &deployment.id).await.err();
            return Err(DeploymentsError::CreateRolledBack { source, rollback });
        }

        self.record(
            ctx,
            now,
            &DeploymentAuditEventParams {
                device_count: Some(device_count),
                artifact_name: Some(deployment.artifact_name()),
                ..DeploymentAuditEventParams::deployment(
                    DeploymentAuditKind::DeploymentCreated,
                    &deployment.id,
                )
            },
        );
        if deployment.is_finished() {
            self.record(
                ctx,
                now,
                &DeploymentAuditEventParams::deployment(
                    DeploymentAuditKind::DeploymentFinished,
                    &deployment.id,
                ),
            );
        }
        Ok(deployment.id)
    }

    /// Loads a deployment.
    ///
    /// # Errors
    ///
    /// Returns [`DeploymentsError::Store`] when the read fails.
    pub async fn get_deployment(
        &self,
        ctx: &RequestContext,
        id: &DeploymentId,
    ) -> Result<Option<Deployment>, DeploymentsError> {
        self.store
            .find_deployment_by_id(ctx, id)
            .await
            .map_err(store_err("searching for deployment by ID"))
    }

    /// Returns freshly aggregated stats, or `None` for unknown deployments.
    ///
    /// # Errors
    ///
    /// Returns [`DeploymentsError::Store`] when a read fails.
    pub async fn get_deployment_stats(
        &self,
        ctx: &RequestContext,
        id: &DeploymentId,
    ) -> Result<Option<Stats>, DeploymentsError> {
        if self.get_deployment(ctx, id).await?.is_none() {
            return Ok(None);
        }
        let stats = self
            .store
            .aggregate_device_deployment_by_status(ctx, id)
            .await
            .map_err(store_err("counting device deployments by status"))?;
        Ok(Some(stats))
    }

    /// Returns true unless an unfinished deployment with this id exists.
    ///
    /// # Errors
    ///
    /// Returns [`DeploymentsError::Store`] when the read fails.
    pub async fn is_deployment_finished(
        &self,
        ctx: &RequestContext,
        id: &DeploymentId,
    ) -> Result<bool, DeploymentsError> {
        let unfinished = self
            .store
            .find_unfinished_by_id(ctx, id)
            .await
            .map_err(store_err("searching for unfinished deployment by ID"))?;
        Ok(unfinished.is_none())
    }

    /// Looks up deployments; an unmatched query yields an empty list.
    ///
    /// # Errors
    ///
    /// Returns [`DeploymentsError::Validation`] for malformed queries and
    /// [`DeploymentsError::Store`] when a read fails.
    pub async fn lookup_deployment(
        &self,
        ctx: &RequestContext,
        query: &Query,
    ) -> Result<Vec<Deployment>, DeploymentsError> {
        query.validate()?;
        let mut deployments = self
            .store
            .find_deployments(ctx, query)
            .await
            .map_err(store_err("searching for deployments"))?;
        for deployment in &mut deployments {
            deployment.device_count = self
                .store
                .device_count_by_deployment(ctx, &deployment.id)
                .await
                .map_err(store_err("counting device deployments"))?;
        }
        Ok(deployments)
    }

    /// Aborts a deployment: active devices move to `aborted` and the
    /// deployment is finished with recomputed stats.
    ///
    /// # Errors
    ///
    /// Returns [`DeploymentsError::DeploymentNotFound`],
    /// [`DeploymentsError::AlreadyFinished`], or a store error.
    pub async fn abort_deployment(
        &self,
        ctx: &RequestContext,
        id: &DeploymentId,
    ) -> Result<(), DeploymentsError> {
        let deployment =
            self.get_deployment(ctx, id).await?.ok_or(DeploymentsError::DeploymentNotFound)?;
        if deployment.is_finished() {
            return Err(DeploymentsError::AlreadyFinished);
        }
        let now = self.clock.now();
        self.store
            .abort_device_deployments(ctx, id, now)
            .await
            .map_err(store_err("aborting device deployments"))?;
        let stats = self
            .store
            .aggregate_device_deployment_by_status(ctx, id)
            .await
            .map_err(store_err("counting device deployments by status"))?;
        self.store
            .update_stats_and_finish_deployment(ctx, id, &stats, now)
            .await
            .map_err(store_err("updating deployment stats and finish time"))?;
        self.record(
            ctx,
            now,
            &DeploymentAuditEventParams::deployment(DeploymentAuditKind::DeploymentAborted, id),
        );
        Ok(())
    }

    /// Decommissions a device across every deployment it participates in.
    ///
    /// Each deployment whose records changed gets recomputed stats and is
    /// finished.
    ///
    /// # Errors
    ///
    /// Returns [`DeploymentsError::Store`] when a write fails.
    pub async fn decommission_device(
        &self,
        ctx: &RequestContext,
        device_id: &DeviceId,
    ) -> Result<(), DeploymentsError> {
        let now = self.clock.now();
        let affected = self
            .store
            .decommission_device_deployments(ctx, device_id, now)
            .await
            .map_err(store_err("decommissioning device deployments"))?;
        for deployment_id in &affected {
            let stats = self
                .store
                .aggregate_device_deployment_by_status(ctx, deployment_id)
                .await
                .map_err(store_err("counting device deployments by status"))?;
            self.store
                .update_stats_and_finish_deployment(ctx, deployment_id, &stats, now)
                .await
                .map_err(store_err("updating deployment stats and finish time"))?;
            self.record(
                ctx,
                now,
                &DeploymentAuditEventParams {
                    device_id: Some(device_id),
                    new_status: Some(DeviceDeploymentStatus::Decommissioned),
                    ..DeploymentAuditEventParams::deployment(
                        DeploymentAuditKind::DeviceDecommissioned,
                        deployment_id,
                    )
                },
            );
        }
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Device-facing operations
    // ------------------------------------------------------------------------

    /// Returns download instructions for the device's oldest active
    /// deployment, or `None` when there is nothing to install.
    ///
    /// A device already running the target artifact is moved to
    /// `already-installed` and receives `None`. The artifact is resolved
    /// again when the record has none or the device reports a type other
    /// than the stored one; with no compatible artifact the record moves to
    /// `no-artifact`.
    ///
    /// # Errors
    ///
    /// Returns [`DeploymentsError::Storage`] when the download link cannot be
    /// signed, and store or catalog errors from the lookups.
    pub async fn get_deployment_for_device_with_current(
        &self,
        ctx: &RequestContext,
        device_id: &DeviceId,
        installed: &InstalledDeviceDeployment,
    ) -> Result<Option<DeploymentInstructions>, DeploymentsError> {
        let Some(record) = self
            .store
            .find_oldest_active_device_deployment(ctx, device_id)
            .await
            .map_err(store_err("searching for oldest active deployment for the device"))?
        else {
            return Ok(None);
        };
        let Some(deployment) = self.get_deployment(ctx, &record.deployment_id).await? else {
            return Ok(None);
        };

        if !installed.artifact_name.is_empty()
            && installed.artifact_name == deployment.artifact_name()
        {
            self.update_device_deployment_status(
                ctx,
                &deployment.id,
                device_id,
                StatusReport::new(DeviceDeploymentStatus::AlreadyInstalled),
            )
            .await?;
            return Ok(None);
        }

        let type_changed = !installed.device_type.is_empty()
            && record.device_type.as_deref() != Some(installed.device_type.as_str());
        let artifact = match record.artifact.clone() {
            Some(artifact) if !type_changed => artifact,
            _ => {
                let Some(artifact) =
                    self.resolve_artifact_at_poll(ctx, &deployment, &record, installed).await?
                else {
                    self.update_device_deployment_status(
                        ctx,
                        &deployment.id,
                        device_id,
                        StatusReport::new(DeviceDeploymentStatus::NoArtifact),
                    )
                    .await?;
                    return Ok(None);
                };
                artifact
            }
        };

        let filename = format!(
            "{}{}",
            artifact.name,
            self.config.filename_suffix.as_deref().unwrap_or_default()
        );
        let source = self
            .storage
            .get_request(ctx, artifact.id.as_str(), Some(&filename), self.config.download_link_expire)
            .await
            .map_err(|source| DeploymentsError::Storage {
                context: "generating download link for the device",
                source,
            })?;
        Ok(Some(DeploymentInstructions {
            id: deployment.id,
            artifact: ArtifactSource {
                artifact_name: artifact.name,
                source,
                device_types_compatible: artifact.device_types_compatible,
            },
        }))
    }

    /// Applies a device status report under the transition rules.
    ///
    /// Rules, in order: an aborted record rejects everything; operator-only
    /// statuses are rejected; a decommissioned record rejects everything; a
    /// report equal to the stored status is a no-op with no writes; a
    /// terminal record rejects any change.
    ///
    /// # Errors
    ///
    /// Returns [`DeploymentsError::DeploymentAborted`],
    /// [`DeploymentsError::BadStatus`],
    /// [`DeploymentsError::DeviceDecommissioned`],
    /// [`DeploymentsError::InvalidTransition`],
    /// [`DeploymentsError::DeploymentNotFound`], or store errors.
    pub async fn update_device_deployment_status(
        &self,
        ctx: &RequestContext,
        deployment_id: &DeploymentId,
        device_id: &DeviceId,
        report: StatusReport,
    ) -> Result<(), DeploymentsError> {
        report.validate()?;
        let current = self
            .store
            .get_device_deployment(ctx, deployment_id, device_id)
            .await
            .map_err(store_err("searching for device deployment"))?
            .ok_or(DeploymentsError::DeploymentNotFound)?;
        if current.status == DeviceDeploymentStatus::Aborted {
            return Err(DeploymentsError::DeploymentAborted);
        }
        if !report.status.is_device_reportable() {
            return Err(DeploymentsError::BadStatus(report.status));
        }
        if current.status == DeviceDeploymentStatus::Decommissioned {
            return Err(DeploymentsError::DeviceDecommissioned);
        }
        if current.status == report.status {
            return Ok(());
        }
        if current.status.is_terminal() {
            return Err(DeploymentsError::InvalidTransition {
                from: current.status,
                to: report.status,
            });
        }

        let now = self.clock.now();
        let new_status = report.status;
        let state = DeviceDeploymentState {
            status: new_status,
            substate: report.substate,
            finished: new_status.is_terminal().then_some(now),
        };
        let old_status = self
            .store
            .update_device_deployment_status(ctx, deployment_id, device_id, &state)
            .await
            .map_err(store_err("updating device deployment status"))?;
        self.store
            .update_stats(ctx, deployment_id, old_status, new_status)
            .await
            .map_err(store_err("updating deployment stats"))?;
        self.record(
            ctx,
            now,
            &DeploymentAuditEventParams {
                device_id: Some(device_id),
                old_status: Some(old_status),
                new_status: Some(new_status),
                ..DeploymentAuditEventParams::deployment(
                    DeploymentAuditKind::DeviceStatusChanged,
                    deployment_id,
                )
            },
        );

        let deployment = self
            .get_deployment(ctx, deployment_id)
            .await?
            .ok_or(DeploymentsError::DeploymentNotFound)?;
        if !deployment.is_finished() && deployment.all_devices_terminal() {
            self.store
                .finish_deployment(ctx, deployment_id, now)
                .await
                .map_err(store_err("finishing deployment"))?;
            self.record(
                ctx,
                now,
                &DeploymentAuditEventParams::deployment(
                    DeploymentAuditKind::DeploymentFinished,
                    deployment_id,
                ),
            );
        }
        Ok(())
    }

    /// Lists the device-deployments of a deployment.
    ///
    /// # Errors
    ///
    /// Returns [`DeploymentsError::DeploymentNotFound`] for unknown
    /// deployments and store errors.
    pub async fn get_device_statuses_for_deployment(
        &self,
        ctx: &RequestContext,
        id: &DeploymentId,
    ) -> Result<Vec<DeviceDeployment>, DeploymentsError> {
        if self.get_deployment(ctx, id).await?.is_none() {
            return Err(DeploymentsError::DeploymentNotFound);
        }
        self.store
            .get_device_statuses_for_deployment(ctx, id)
            .await
            .map_err(store_err("searching for device deployments"))
    }

    /// Returns true when the device has (or had) the deployment assigned.
    ///
    /// # Errors
    ///
    /// Returns [`DeploymentsError::Store`] when the read fails.
    pub async fn has_deployment_for_device(
        &self,
        ctx: &RequestContext,
        deployment_id: &DeploymentId,
        device_id: &DeviceId,
    ) -> Result<bool, DeploymentsError> {
        self.store
            .has_deployment_for_device(ctx, deployment_id, device_id)
            .await
            .map_err(store_err("searching for deployment for the device"))
    }

    /// Stores a device's deployment log and flags it as available.
    ///
    /// # Errors
    ///
    /// Returns [`DeploymentsError::Validation`] for malformed logs,
    /// [`DeploymentsError::DeploymentNotFound`] when the device never had
    /// the deployment, and store errors.
    pub async fn save_device_deployment_log(
        &self,
        ctx: &RequestContext,
        log: &DeploymentLog,
    ) -> Result<(), DeploymentsError> {
        log.validate()?;
        if !self.has_deployment_for_device(ctx, &log.deployment_id, &log.device_id).await? {
            return Err(DeploymentsError::DeploymentNotFound);
        }
        self.store
            .save_device_deployment_log(ctx, log)
            .await
            .map_err(store_err("saving deployment log"))?;
        self.store
            .update_device_deployment_log_availability(ctx, &log.deployment_id, &log.device_id, true)
            .await
            .map_err(store_err("updating log availability"))
    }

    /// Loads a device's deployment log.
    ///
    /// # Errors
    ///
    /// Returns [`DeploymentsError::Store`] when the read fails.
    pub async fn get_device_deployment_log(
        &self,
        ctx: &RequestContext,
        deployment_id: &DeploymentId,
        device_id: &DeviceId,
    ) -> Result<Option<DeploymentLog>, DeploymentsError> {
        self.store
            .get_device_deployment_log(ctx, deployment_id, device_id)
            .await
            .map_err(store_err("retrieving deployment log"))
    }

    // ------------------------------------------------------------------------
    // Helpers
    // ------------------------------------------------------------------------

    /// Expands the constructor target into a de-duplicated, capped device list.
    async fn resolve_devices(
        &self,
        ctx: &RequestContext,
        constructor: &DeploymentConstructor,
    ) -> Result<Vec<DeviceId>, DeploymentsError> {
        let candidates = match constructor.target() {
            DeploymentTarget::Devices(devices) => devices.to_vec(),
            DeploymentTarget::Group(group) => self
                .inventory
                .devices_in_group(ctx, group)
                .await
                .map_err(inventory_err("searching for devices in group"))?,
        };
        let mut devices: Vec<DeviceId> = Vec::with_capacity(candidates.len());
        for device in candidates {
            if !devices.contains(&device) {
                devices.push(device);
            }
        }
        if let Some(max) = constructor.max_devices {
            devices.truncate(usize::try_from(max).unwrap_or(usize::MAX));
        }
        if devices.is_empty() {
            return Err(DeploymentsError::NoDevices);
        }
        Ok(devices)
    }

    /// Builds the device-deployment for one target device.
    async fn assign_device(
        &self,
        ctx: &RequestContext,
        deployment: &Deployment,
        device_id: DeviceId,
        now: OffsetDateTime,
    ) -> Result<DeviceDeployment, DeploymentsError> {
        let device_type = self
            .inventory
            .device_type(ctx, &device_id)
            .await
            .map_err(inventory_err("checking device type"))?;
        let mut record = DeviceDeployment::new(deployment.id.clone(), device_id, now);
        let artifact = match device_type.as_deref() {
            Some(device_type) => self
                .catalog
                .image_by_name_and_device_type(ctx, deployment.artifact_name(), device_type)
                .await
                .map_err(catalog_err("assigning artifact to device deployment"))?,
            None => None,
        };
        record.device_type = device_type;
        match artifact {
            Some(artifact) => record.artifact = Some(artifact),
            None => {
                record.status = DeviceDeploymentStatus::NoArtifact;
                record.finished = Some(now);
            }
        }
        Ok(record)
    }

    /// Resolves and stores an artifact for the device's current type.
    async fn resolve_artifact_at_poll(
        &self,
        ctx: &RequestContext,
        deployment: &Deployment,
        record: &DeviceDeployment,
        installed: &InstalledDeviceDeployment,
    ) -> Result<Option<Artifact>, DeploymentsError> {
        let device_type = if installed.device_type.is_empty() {
            record.device_type.clone()
        } else {
            Some(installed.device_type.clone())
        };
        let Some(device_type) = device_type else {
            return Ok(None);
        };
        let mut artifact = self
            .catalog
            .image_by_ids_and_device_type(ctx, &deployment.artifacts, &device_type)
            .await
            .map_err(catalog_err("searching for artifact by ids and device type"))?;
        if artifact.is_none() {
            artifact = self
                .catalog
                .image_by_name_and_device_type(ctx, deployment.artifact_name(), &device_type)
                .await
                .map_err(catalog_err("searching for artifact by name and device type"))?;
        }
        if let Some(artifact) = &artifact {
            self.store
                .assign_artifact(ctx, &deployment.id, &record.device_id, &device_type, artifact)
                .await
                .map_err(store_err("assigning artifact to device deployment"))?;
        }
        Ok(artifact)
    }

    /// Emits an audit event.
    fn record(
        &self,
        ctx: &RequestContext,
        at: OffsetDateTime,
        params: &DeploymentAuditEventParams<'_>,
    ) {
        self.audit.record(&DeploymentAuditEvent::new(ctx, at, params));
    }
}
