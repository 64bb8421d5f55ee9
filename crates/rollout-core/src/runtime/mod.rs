// crates/rollout-core/src/runtime/mod.rs
// ============================================================================
// Module: Rollout Runtime
// Description: Deployment orchestration engine and in-memory collaborators.
// Purpose: Execute deployment lifecycle operations against pluggable backends.
// Dependencies: crate::{core, interfaces}
// ============================================================================

//! ## Overview
//! The runtime hosts [`DeploymentsModel`], the audit sinks it reports to, and
//! in-memory implementations of every collaborator interface.

// ============================================================================
// SECTION: Submodules
// ============================================================================

pub mod audit;
pub mod model;
pub mod object_store;
pub mod store;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use audit::DeploymentAuditEvent;
pub use audit::DeploymentAuditEventParams;
pub use audit::DeploymentAuditKind;
pub use audit::DeploymentAuditSink;
pub use audit::FileAuditSink;
pub use audit::NoopAuditSink;
pub use audit::StderrAuditSink;
pub use model::DEFAULT_DOWNLOAD_LINK_EXPIRE;
pub use model::DeploymentsConfig;
pub use model::DeploymentsError;
pub use model::DeploymentsModel;
pub use model::ErrorKind;
pub use object_store::InMemoryObjectStorage;
pub use store::InMemoryArtifactCatalog;
pub use store::InMemoryDataStore;
pub use store::InMemoryDeviceInventory;
