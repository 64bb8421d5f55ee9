// crates/rollout-core/tests/common/mod.rs
// ============================================================================
// Module: Common Test Utilities
// Description: Shared harness for rollout-core integration tests.
// Purpose: Wire the deployments model to in-memory collaborators and record audits.
// Dependencies: rollout-core, time
// ============================================================================

//! ## Overview
//! Builds a [`DeploymentsModel`] over in-memory collaborators with a fixed
//! clock, and keeps handles to each collaborator so tests can seed and
//! inspect them.

#![allow(
    dead_code,
    clippy::panic,
    clippy::print_stdout,
    clippy::print_stderr,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::use_debug,
    clippy::dbg_macro,
    clippy::panic_in_result_fn,
    clippy::unwrap_in_result,
    reason = "Test-only output and panic-based assertions are permitted."
)]

use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;

use async_trait::async_trait;
use rollout_core::Artifact;
use rollout_core::DataStore;
use rollout_core::Deployment;
use rollout_core::DeploymentAuditEvent;
use rollout_core::DeploymentAuditKind;
use rollout_core::DeploymentAuditSink;
use rollout_core::DeploymentId;
use rollout_core::DeploymentLog;
use rollout_core::DeploymentsConfig;
use rollout_core::DeploymentsModel;
use rollout_core::DeviceDeployment;
use rollout_core::DeviceDeploymentState;
use rollout_core::DeviceDeploymentStatus;
use rollout_core::DeviceId;
use rollout_core::FixedClock;
use rollout_core::InMemoryArtifactCatalog;
use rollout_core::InMemoryDataStore;
use rollout_core::InMemoryDeviceInventory;
use rollout_core::InMemoryObjectStorage;
use rollout_core::Query;
use rollout_core::RequestContext;
use rollout_core::Stats;
use rollout_core::StoreError;
use time::OffsetDateTime;
use time::macros::datetime;

// ============================================================================
// SECTION: Audit
// ============================================================================

/// Audit sink that keeps every event in memory.
#[derive(Default)]
pub struct RecordingAuditSink {
    /// Recorded events in emission order.
    events: Mutex<Vec<DeploymentAuditEvent>>,
}

impl RecordingAuditSink {
    /// Returns the recorded events.
    pub fn events(&self) -> Vec<DeploymentAuditEvent> {
        self.events.lock().unwrap().clone()
    }

    /// Returns the recorded event kinds.
    pub fn kinds(&self) -> Vec<DeploymentAuditKind> {
        self.events().into_iter().map(|event| event.event).collect()
    }
}

impl DeploymentAuditSink for RecordingAuditSink {
    fn record(&self, event: &DeploymentAuditEvent) {
        self.events.lock().unwrap().push(event.clone());
    }
}

// ============================================================================
// SECTION: Harness
// ============================================================================

/// Model type used by the harness.
pub type Model<S = InMemoryDataStore> =
    DeploymentsModel<S, InMemoryObjectStorage, InMemoryArtifactCatalog, InMemoryDeviceInventory>;

/// Fixed instant every harness clock reports.
pub const NOW: OffsetDateTime = datetime!(2026-03-01 12:00:00 UTC);

/// Model plus handles to its collaborators.
pub struct Harness<S = InMemoryDataStore> {
    /// Model under test.
    pub model: Model<S>,
    /// Artifact catalog handle.
    pub catalog: InMemoryArtifactCatalog,
    /// Device inventory handle.
    pub inventory: InMemoryDeviceInventory,
    /// Object storage handle.
    pub storage: InMemoryObjectStorage,
    /// Audit events.
    pub audit: Arc<RecordingAuditSink>,
}

impl Harness<InMemoryDataStore> {
    /// Builds a harness over a fresh in-memory store.
    pub fn new() -> Self {
        Self::with_store(InMemoryDataStore::new())
    }
}

impl<S: DataStore> Harness<S> {
    /// Builds a harness over the provided store.
    pub fn with_store(store: S) -> Self {
        let clock = Arc::new(FixedClock::new(NOW));
        let catalog = InMemoryArtifactCatalog::new();
        let inventory = InMemoryDeviceInventory::new();
        let storage = InMemoryObjectStorage::new().with_clock(clock.clone());
        let audit = Arc::new(RecordingAuditSink::default());
        let model = DeploymentsModel::new(
            store,
            storage.clone(),
            catalog.clone(),
            inventory.clone(),
            DeploymentsConfig::default(),
        )
        .with_clock(clock)
        .with_audit(audit.clone());
        Self {
            model,
            catalog,
            inventory,
            storage,
            audit,
        }
    }

    /// Registers a device of the given type in the inventory.
    pub fn device(&self, id: &str, device_type: &str) {
        self.inventory.register(id, Some(device_type), &[]).unwrap();
    }

    /// Registers a device in a group.
    pub fn grouped_device(&self, id: &str, device_type: &str, group: &str) {
        self.inventory.register(id, Some(device_type), &[group]).unwrap();
    }

    /// Adds an artifact to the catalog.
    pub fn artifact(&self, id: &str, name: &str, device_types: &[&str]) {
        self.catalog
            .insert(Artifact::new(
                id,
                name,
                device_types.iter().map(|device_type| (*device_type).to_string()).collect(),
            ))
            .unwrap();
    }
}

/// Returns a tenant-scoped request context.
pub fn tenant_ctx() -> RequestContext {
    RequestContext::for_tenant("operator", "tenant-a")
}

// ============================================================================
// SECTION: Faulty Store
// ============================================================================

/// Store wrapper that counts writes and can fail selected calls.
#[derive(Default)]
pub struct FaultyStore {
    /// Wrapped store.
    pub inner: InMemoryDataStore,
    /// Fail `insert_device_deployments`.
    pub fail_device_insert: AtomicBool,
    /// Fail `delete_deployment`.
    pub fail_delete: AtomicBool,
    /// Number of write calls observed.
    pub writes: AtomicUsize,
}

impl FaultyStore {
    /// Returns the number of write calls observed so far.
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    /// Counts one write.
    fn write(&self) {
        self.writes.fetch_add(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl DataStore for FaultyStore {
    async fn insert_deployment(
        &self,
        ctx: &RequestContext,
        deployment: &Deployment,
    ) -> Result<(), StoreError> {
        self.write();
        self.inner.insert_deployment(ctx, deployment).await
    }

    async fn delete_deployment(
        &self,
        ctx: &RequestContext,
        id: &DeploymentId,
    ) -> Result<(), StoreError> {
        self.write();
        if self.fail_delete.load(Ordering::SeqCst) {
            return Err(StoreError::Io("delete refused".to_string()));
        }
        self.inner.delete_deployment(ctx, id).await
    }

    async fn find_deployment_by_id(
        &self,
        ctx: &RequestContext,
        id: &DeploymentId,
    ) -> Result<Option<Deployment>, StoreError> {
        self.inner.find_deployment_by_id(ctx, id).await
    }

    async fn find_unfinished_by_id(
        &self,
        ctx: &RequestContext,
        id: &DeploymentId,
    ) -> Result<Option<Deployment>, StoreError> {
        self.inner.find_unfinished_by_id(ctx, id).await
    }

    async fn find_deployments(
        &self,
        ctx: &RequestContext,
        query: &Query,
    ) -> Result<Vec<Deployment>, StoreError> {
        self.inner.find_deployments(ctx, query).await
    }

    async fn device_count_by_deployment(
        &self,
        ctx: &RequestContext,
        id: &DeploymentId,
    ) -> Result<u64, StoreError> {
        self.inner.device_count_by_deployment(ctx, id).await
    }

    async fn update_stats(
        &self,
        ctx: &RequestContext,
        id: &DeploymentId,
        old: DeviceDeploymentStatus,
        new: DeviceDeploymentStatus,
    ) -> Result<(), StoreError> {
        self.write();
        self.inner.update_stats(ctx, id, old, new).await
    }

    async fn update_stats_and_finish_deployment(
        &self,
        ctx: &RequestContext,
        id: &DeploymentId,
        stats: &Stats,
        finished: OffsetDateTime,
    ) -> Result<(), StoreError> {
        self.write();
        self.inner.update_stats_and_finish_deployment(ctx, id, stats, finished).await
    }

    async fn finish_deployment(
        &self,
        ctx: &RequestContext,
        id: &DeploymentId,
        finished: OffsetDateTime,
    ) -> Result<(), StoreError> {
        self.write();
        self.inner.finish_deployment(ctx, id, finished).await
    }

    async fn insert_device_deployments(
        &self,
        ctx: &RequestContext,
        records: &[DeviceDeployment],
    ) -> Result<(), StoreError> {
        self.write();
        if self.fail_device_insert.load(Ordering::SeqCst) {
            return Err(StoreError::Io("insert refused".to_string()));
        }
        self.inner.insert_device_deployments(ctx, records).await
    }

    async fn get_device_deployment(
        &self,
        ctx: &RequestContext,
        deployment_id: &DeploymentId,
        device_id: &DeviceId,
    ) -> Result<Option<DeviceDeployment>, StoreError> {
        self.inner.get_device_deployment(ctx, deployment_id, device_id).await
    }

    async fn find_oldest_active_device_deployment(
        &self,
        ctx: &RequestContext,
        device_id: &DeviceId,
    ) -> Result<Option<DeviceDeployment>, StoreError> {
        self.inner.find_oldest_active_device_deployment(ctx, device_id).await
    }

    async fn get_device_statuses_for_deployment(
        &self,
        ctx: &RequestContext,
        id: &DeploymentId,
    ) -> Result<Vec<DeviceDeployment>, StoreError> {
        self.inner.get_device_statuses_for_deployment(ctx, id).await
    }

    async fn has_deployment_for_device(
        &self,
        ctx: &RequestContext,
        deployment_id: &DeploymentId,
        device_id: &DeviceId,
    ) -> Result<bool, StoreError> {
        self.inner.has_deployment_for_device(ctx, deployment_id, device_id).await
    }

    async fn update_device_deployment_status(
        &self,
        ctx: &RequestContext,
        deployment_id: &DeploymentId,
        device_id: &DeviceId,
        state: &DeviceDeploymentState,
    ) -> Result<DeviceDeploymentStatus, StoreError> {
        self.write();
        self.inner.update_device_deployment_status(ctx, deployment_id, device_id, state).await
    }

    async fn assign_artifact(
        &self,
        ctx: &RequestContext,
        deployment_id: &DeploymentId,
        device_id: &DeviceId,
        device_type: &str,
        artifact: &Artifact,
    ) -> Result<(), StoreError> {
        self.write();
        self.inner.assign_artifact(ctx, deployment_id, device_id, device_type, artifact).await
    }

    async fn abort_device_deployments(
        &self,
        ctx: &RequestContext,
        id: &DeploymentId,
        finished: OffsetDateTime,
    ) -> Result<(), StoreError> {
        self.write();
        self.inner.abort_device_deployments(ctx, id, finished).await
    }

    async fn decommission_device_deployments(
        &self,
        ctx: &RequestContext,
        device_id: &DeviceId,
        finished: OffsetDateTime,
    ) -> Result<Vec<DeploymentId>, StoreError> {
        self.write();
        self.inner.decommission_device_deployments(ctx, device_id, finished).await
    }

    async fn aggregate_device_deployment_by_status(
        &self,
        ctx: &RequestContext,
        id: &DeploymentId,
    ) -> Result<Stats, StoreError> {
        self.inner.aggregate_device_deployment_by_status(ctx, id).await
    }

    async fn update_device_deployment_log_availability(
        &self,
        ctx: &RequestContext,
        deployment_id: &DeploymentId,
        device_id: &DeviceId,
        available: bool,
    ) -> Result<(), StoreError> {
        self.write();
        self.inner
            .update_device_deployment_log_availability(ctx, deployment_id, device_id, available)
            .await
    }

    async fn save_device_deployment_log(
        &self,
        ctx: &RequestContext,
        log: &DeploymentLog,
    ) -> Result<(), StoreError> {
        self.write();
        self.inner.save_device_deployment_log(ctx, log).await
    }

    async fn get_device_deployment_log(
        &self,
        ctx: &RequestContext,
        deployment_id: &DeploymentId,
        device_id: &DeviceId,
    ) -> Result<Option<DeploymentLog>, StoreError> {
        self.inner.get_device_deployment_log(ctx, deployment_id, device_id).await
    }
}
