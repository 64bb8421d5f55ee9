// crates/rollout-core/src/lib.rs
// ============================================================================
// Module: Rollout Core Library
// Description: Deployment orchestration engine for fleets of devices.
// Purpose: Plan software deployments, hand out signed artifact links, and track device status.
// Dependencies: async-trait, serde, thiserror, time, tokio, uuid
// ============================================================================

//! ## Overview
//! Rollout Core owns the deployment domain: deployments targeting devices or
//! groups, one device-deployment per target device, the device status state
//! machine, and per-deployment stats. Persistence, object storage, the
//! artifact catalog, and the device inventory are reached through the traits
//! in [`interfaces`].
//! Invariants:
//! - A deployment's stats always sum to its device count.
//! - `aborted` and `decommissioned` device-deployments never change again.
//! - A deployment is finished once every device-deployment is terminal.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod core;
pub mod interfaces;
pub mod runtime;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use crate::core::*;
pub use interfaces::ArtifactCatalog;
pub use interfaces::CatalogError;
pub use interfaces::DataStore;
pub use interfaces::DeviceInventory;
pub use interfaces::InventoryError;
pub use interfaces::ObjectStorage;
pub use interfaces::ObjectStorageError;
pub use interfaces::StorageOp;
pub use interfaces::StoreError;
pub use runtime::*;
