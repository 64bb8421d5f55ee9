// crates/rollout-core/src/runtime/store.rs
// ============================================================================
// Module: Rollout In-Memory Collaborators
// Description: In-memory data store, artifact catalog, and device inventory.
// Purpose: Provide deterministic collaborator implementations without external deps.
// Dependencies: crate::{core, interfaces}, async-trait
// ============================================================================

//! ## Overview
//! This module provides simple in-memory implementations of [`DataStore`],
//! [`ArtifactCatalog`], and [`DeviceInventory`] for tests and local demos.
//! Data is partitioned by tenant. Each call holds one mutex for its whole
//! duration, so every call is atomic. Not intended for production use.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::sync::Mutex;

use async_trait::async_trait;
use time::OffsetDateTime;

use crate::core::Artifact;
use crate::core::ArtifactId;
use crate::core::Deployment;
use crate::core::DeploymentId;
use crate::core::DeploymentLog;
use crate::core::DeviceDeployment;
use crate::core::DeviceDeploymentState;
use crate::core::DeviceDeploymentStatus;
use crate::core::DeviceId;
use crate::core::Query;
use crate::core::RequestContext;
use crate::core::Stats;
use crate::interfaces::ArtifactCatalog;
use crate::interfaces::CatalogError;
use crate::interfaces::DataStore;
use crate::interfaces::DeviceInventory;
use crate::interfaces::InventoryError;
use crate::interfaces::StoreError;

// ============================================================================
// SECTION: Data Store
// ============================================================================

/// Key of a device-deployment within a tenant partition.
type PairKey = (DeploymentId, DeviceId);

/// Records belonging to one tenant.
#[derive(Debug, Default)]
struct TenantPartition {
    /// Deployments by identifier.
    deployments: BTreeMap<DeploymentId, Deployment>,
    /// Device-deployments by `(deployment, device)`.
    device_deployments: BTreeMap<PairKey, DeviceDeployment>,
    /// Deployment logs by `(deployment, device)`.
    logs: BTreeMap<PairKey, DeploymentLog>,
}

impl TenantPartition {
    /// Returns a mutable deployment or a not-found error.
    fn deployment_mut(&mut self, id: &DeploymentId) -> Result<&mut Deployment, StoreError> {
        self.deployments
            .get_mut(id)
            .ok_or_else(|| StoreError::NotFound(format!("deployment {id}")))
    }

    /// Returns a mutable device-deployment or a not-found error.
    fn device_deployment_mut(
        &mut self,
        deployment_id: &DeploymentId,
        device_id: &DeviceId,
    ) -> Result<&mut DeviceDeployment, StoreError> {
        self.device_deployments
            .get_mut(&(deployment_id.clone(), device_id.clone()))
            .ok_or_else(|| {
                StoreError::NotFound(format!("device deployment {deployment_id}/{device_id}"))
            })
    }

    /// Iterates over the device-deployments of one deployment.
    fn records_for<'a>(
        &'a self,
        id: &'a DeploymentId,
    ) -> impl Iterator<Item = &'a DeviceDeployment> + 'a {
        self.device_deployments.values().filter(move |record| &record.deployment_id == id)
    }
}

/// In-memory data store for tests and examples.
#[derive(Debug, Default, Clone)]
pub struct InMemoryDataStore {
    /// Tenant partitions protected by a mutex.
    tenants: Arc<Mutex<BTreeMap<String, TenantPartition>>>,
}

impl InMemoryDataStore {
    /// Creates an empty in-memory data store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs `f` against the caller's tenant partition under the store lock.
    fn with_partition<T>(
        &self,
        ctx: &RequestContext,
        f: impl FnOnce(&mut TenantPartition) -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        let mut guard = self
            .tenants
            .lock()
            .map_err(|_| StoreError::Store("in-memory data store mutex poisoned".to_string()))?;
        let key = ctx.tenant().map(ToString::to_string).unwrap_or_default();
        f(guard.entry(key).or_default())
    }
}

#[async_trait]
impl DataStore for InMemoryDataStore {
    async fn insert_deployment(
        &self,
        ctx: &RequestContext,
        deployment: &Deployment,
    ) -> Result<(), StoreError> {
        self.with_partition(ctx, |partition| {
            if partition.deployments.contains_key(&deployment.id) {
                return Err(StoreError::Conflict(format!("deployment {}", deployment.id)));
            }
            partition.deployments.insert(deployment.id.clone(), deployment.clone());
            Ok(())
        })
    }

    async fn delete_deployment(
        &self,
        ctx: &RequestContext,
        id: &DeploymentId,
    ) -> Result<(), StoreError> {
        self.with_partition(ctx, |partition| {
            partition.deployments.remove(id);
            Ok(())
        })
    }

    async fn find_deployment_by_id(
        &self,
        ctx: &RequestContext,
        id: &DeploymentId,
    ) -> Result<Option<Deployment>, StoreError> {
        self.with_partition(ctx, |partition| Ok(partition.deployments.get(id).cloned()))
    }

    async fn find_unfinished_by_id(
        &self,
        ctx: &RequestContext,
        id: &DeploymentId,
    ) -> Result<Option<Deployment>, StoreError> {
        self.with_partition(ctx, |partition| {
            Ok(partition.deployments.get(id).filter(|deployment| !deployment.is_finished()).cloned())
        })
    }

    async fn find_deployments(
        &self,
        ctx: &RequestContext,
        query: &Query,
    ) -> Result<Vec<Deployment>, StoreError> {
        self.with_partition(ctx, |partition| {
            Ok(query.apply(partition.deployments.values().cloned().collect()))
        })
    }

    async fn device_count_by_deployment(
        &self,
        ctx: &RequestContext,
        id: &DeploymentId,
    ) -> Result<u64, StoreError> {
        self.with_partition(ctx, |partition| {
            Ok(u64::try_from(partition.records_for(id).count()).unwrap_or(u64::MAX))
        })
    }

    async fn update_stats(
        &self,
        ctx: &RequestContext,
        id: &DeploymentId,
        old: DeviceDeploymentStatus,
        new: DeviceDeploymentStatus,
    ) -> Result<(), StoreError> {
        self.with_partition(ctx, |partition| {
            partition.deployment_mut(id)?.stats.transition(old, new).map_err(StoreError::from)
        })
    }

    async fn update_stats_and_finish_deployment(
        &self,
        ctx: &RequestContext,
        id: &DeploymentId,
        stats: &Stats,
        finished: OffsetDateTime,
    ) -> Result<(), StoreError> {
        self.with_partition(ctx, |partition| {
            let deployment = partition.deployment_mut(id)?;
            deployment.stats = stats.clone();
            deployment.finished.get_or_insert(finished);
            Ok(())
        })
    }

    async fn finish_deployment(
        &self,
        ctx: &RequestContext,
        id: &DeploymentId,
        finished: OffsetDateTime,
    ) -> Result<(), StoreError> {
        self.with_partition(ctx, |partition| {
            partition.deployment_mut(id)?.finished.get_or_insert(finished);
            Ok(())
        })
    }

    async fn insert_device_deployments(
        &self,
        ctx: &RequestContext,
        records: &[DeviceDeployment],
    ) -> Result<(), StoreError> {
        self.with_partition(ctx, |partition| {
            let mut keys = BTreeSet::new();
            for record in records {
                let key = (record.deployment_id.clone(), record.device_id.clone());
                if partition.device_deployments.contains_key(&key) || !keys.insert(key) {
                    return Err(StoreError::Conflict(format!(
                        "device deployment {}/{}",
                        record.deployment_id, record.device_id
                    )));
                }
            }
            for record in records {
                partition.device_deployments.insert(
                    (record.deployment_id.clone(), record.device_id.clone()),
                    record.clone(),
                );
            }
            Ok(())
        })
    }

    async fn get_device_deployment(
        &self,
        ctx: &RequestContext,
        deployment_id: &DeploymentId,
        device_id: &DeviceId,
    ) -> Result<Option<DeviceDeployment>, StoreError> {
        self.with_partition(ctx, |partition| {
            Ok(partition
                .device_deployments
                .get(&(deployment_id.clone(), device_id.clone()))
                .cloned())
        })
    }

    async fn find_oldest_active_device_deployment(
        &self,
        ctx: &RequestContext,
        device_id: &DeviceId,
    ) -> Result<Option<DeviceDeployment>, StoreError> {
        self.with_partition(ctx, |partition| {
            Ok(partition
                .device_deployments
                .values()
                .filter(|record| &record.device_id == device_id && record.status.is_active())
                .min_by(|left, right| {
                    left.created
                        .cmp(&right.created)
                        .then_with(|| left.deployment_id.cmp(&right.deployment_id))
                })
                .cloned())
        })
    }

    async fn get_device_statuses_for_deployment(
        &self,
        ctx: &RequestContext,
        id: &DeploymentId,
    ) -> Result<Vec<DeviceDeployment>, StoreError> {
        self.with_partition(ctx, |partition| Ok(partition.records_for(id).cloned().collect()))
    }

    async fn has_deployment_for_device(
        &self,
        ctx: &RequestContext,
        deployment_id: &DeploymentId,
        device_id: &DeviceId,
    ) -> Result<bool, StoreError> {
        self.with_partition(ctx, |partition| {
            Ok(partition
                .device_deployments
                .contains_key(&(deployment_id.clone(), device_id.clone())))
        })
    }

    async fn update_device_deployment_status(
        &self,
        ctx: &RequestContext,
        deployment_id: &DeploymentId,
        device_id: &DeviceId,
        state: &DeviceDeploymentState,
    ) -> Result<DeviceDeploymentStatus, StoreError> {
        self.with_partition(ctx, |partition| {
            let record = partition.device_deployment_mut(deployment_id, device_id)?;
            let old = record.status;
            record.status = state.status;
            record.substate.clone_from(&state.substate);
            record.finished = state.finished;
            Ok(old)
        })
    }

    async fn assign_artifact(
        &self,
        ctx: &RequestContext,
        deployment_id: &DeploymentId,
        device_id: &DeviceId,
        device_type: &str,
        artifact: &Artifact,
    ) -> Result<(), StoreError> {
        self.with_partition(ctx, |partition| {
            let record = partition.device_deployment_mut(deployment_id, device_id)?;
            record.device_type = Some(device_type.to_string());
            record.artifact = Some(artifact.clone());
            Ok(())
        })
    }

    async fn abort_device_deployments(
        &self,
        ctx: &RequestContext,
        id: &DeploymentId,
        finished: OffsetDateTime,
    ) -> Result<(), StoreError> {
        self.with_partition(ctx, |partition| {
            for record in partition.device_deployments.values_mut() {
                if &record.deployment_id == id && record.status.is_active() {
                    record.status = DeviceDeploymentStatus::Aborted;
                    record.finished = Some(finished);
                }
            }
            Ok(())
        })
    }

    async fn decommission_device_deployments(
        &self,
        ctx: &RequestContext,
        device_id: &DeviceId,
        finished: OffsetDateTime,
    ) -> Result<Vec<DeploymentId>, StoreError> {
        self.with_partition(ctx, |partition| {
            let mut affected = BTreeSet::new();
            for record in partition.device_deployments.values_mut() {
                if &record.device_id == device_id && record.status.is_active() {
                    record.status = DeviceDeploymentStatus::Decommissioned;
                    record.finished = Some(finished);
                    affected.insert(record.deployment_id.clone());
                }
            }
            Ok(affected.into_iter().collect())
        })
    }

    async fn aggregate_device_deployment_by_status(
        &self,
        ctx: &RequestContext,
        id: &DeploymentId,
    ) -> Result<Stats, StoreError> {
        self.with_partition(ctx, |partition| {
            Stats::from_statuses(partition.records_for(id).map(|record| record.status))
                .map_err(StoreError::from)
        })
    }

    async fn update_device_deployment_log_availability(
        &self,
        ctx: &RequestContext,
        deployment_id: &DeploymentId,
        device_id: &DeviceId,
        available: bool,
    ) -> Result<(), StoreError> {
        self.with_partition(ctx, |partition| {
            partition.device_deployment_mut(deployment_id, device_id)?.is_log_available = available;
            Ok(())
        })
    }

    async fn save_device_deployment_log(
        &self,
        ctx: &RequestContext,
        log: &DeploymentLog,
    ) -> Result<(), StoreError> {
        self.with_partition(ctx, |partition| {
            partition
                .logs
                .insert((log.deployment_id.clone(), log.device_id.clone()), log.clone());
            Ok(())
        })
    }

    async fn get_device_deployment_log(
        &self,
        ctx: &RequestContext,
        deployment_id: &DeploymentId,
        device_id: &DeviceId,
    ) -> Result<Option<DeploymentLog>, StoreError> {
        self.with_partition(ctx, |partition| {
            Ok(partition.logs.get(&(deployment_id.clone(), device_id.clone())).cloned())
        })
    }
}

// ============================================================================
// SECTION: Artifact Catalog
// ============================================================================

/// In-memory artifact catalog shared across tenants.
#[derive(Debug, Default, Clone)]
pub struct InMemoryArtifactCatalog {
    /// Artifacts in insertion order.
    artifacts: Arc<Mutex<Vec<Artifact>>>,
}

impl InMemoryArtifactCatalog {
    /// Creates an empty catalog.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an artifact to the catalog.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError`] when the catalog lock is poisoned.
    pub fn insert(&self, artifact: Artifact) -> Result<(), CatalogError> {
        self.artifacts
            .lock()
            .map_err(|_| CatalogError::Catalog("artifact catalog mutex poisoned".to_string()))?
            .push(artifact);
        Ok(())
    }

    /// Returns the first artifact matching `predicate`.
    fn find(
        &self,
        predicate: impl Fn(&Artifact) -> bool,
    ) -> Result<Option<Artifact>, CatalogError> {
        let guard = self
            .artifacts
            .lock()
            .map_err(|_| CatalogError::Catalog("artifact catalog mutex poisoned".to_string()))?;
        Ok(guard.iter().find(|artifact| predicate(artifact)).cloned())
    }
}

#[async_trait]
impl ArtifactCatalog for InMemoryArtifactCatalog {
    async fn image_by_ids_and_device_type(
        &self,
        _ctx: &RequestContext,
        ids: &[ArtifactId],
        device_type: &str,
    ) -> Result<Option<Artifact>, CatalogError> {
        self.find(|artifact| ids.contains(&artifact.id) && artifact.is_compatible_with(device_type))
    }

    async fn image_by_name_and_device_type(
        &self,
        _ctx: &RequestContext,
        name: &str,
        device_type: &str,
    ) -> Result<Option<Artifact>, CatalogError> {
        self.find(|artifact| artifact.name == name && artifact.is_compatible_with(device_type))
    }

    async fn images_by_name(
        &self,
        _ctx: &RequestContext,
        name: &str,
    ) -> Result<Vec<Artifact>, CatalogError> {
        let guard = self
            .artifacts
            .lock()
            .map_err(|_| CatalogError::Catalog("artifact catalog mutex poisoned".to_string()))?;
        Ok(guard.iter().filter(|artifact| artifact.name == name).cloned().collect())
    }
}

// ============================================================================
// SECTION: Device Inventory
// ============================================================================

/// Device attributes tracked by the in-memory inventory.
#[derive(Debug, Clone, Default)]
struct InventoryEntry {
    /// Device type, if known.
    device_type: Option<String>,
    /// Groups the device belongs to.
    groups: BTreeSet<String>,
}

/// In-memory device inventory shared across tenants.
#[derive(Debug, Default, Clone)]
pub struct InMemoryDeviceInventory {
    /// Devices in registration order.
    devices: Arc<Mutex<Vec<(DeviceId, InventoryEntry)>>>,
}

impl InMemoryDeviceInventory {
    /// Creates an empty inventory.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers (or updates) a device with its type and groups.
    ///
    /// # Errors
    ///
    /// Returns [`InventoryError`] when the inventory lock is poisoned.
    pub fn register(
        &self,
        device_id: impl Into<DeviceId>,
        device_type: Option<&str>,
        groups: &[&str],
    ) -> Result<(), InventoryError> {
        let device_id = device_id.into();
        let entry = InventoryEntry {
            device_type: device_type.map(str::to_string),
            groups: groups.iter().map(|group| (*group).to_string()).collect(),
        };
        let mut guard = self.devices.lock().map_err(|_| {
            InventoryError::Inventory("device inventory mutex poisoned".to_string())
        })?;
        match guard.iter_mut().find(|(id, _)| *id == device_id) {
            Some((_, existing)) => *existing = entry,
            None => guard.push((device_id, entry)),
        }
        Ok(())
    }
}

#[async_trait]
impl DeviceInventory for InMemoryDeviceInventory {
    async fn device_type(
        &self,
        _ctx: &RequestContext,
        device_id: &DeviceId,
    ) -> Result<Option<String>, InventoryError> {
        let guard = self.devices.lock().map_err(|_| {
            InventoryError::Inventory("device inventory mutex poisoned".to_string())
        })?;
        Ok(guard
            .iter()
            .find(|(id, _)| id == device_id)
            .and_then(|(_, entry)| entry.device_type.clone()))
    }

    async fn devices_in_group(
        &self,
        _ctx: &RequestContext,
        group: &str,
    ) -> Result<Vec<DeviceId>, InventoryError> {
        let guard = self.devices.lock().map_err(|_| {
            InventoryError::Inventory("device inventory mutex poisoned".to_string())
        })?;
        Ok(guard
            .iter()
            .filter(|(_, entry)| entry.groups.contains(group))
            .map(|(id, _)| id.clone())
            .collect())
    }
}
