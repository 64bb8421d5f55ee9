// crates/rollout-core/src/core/mod.rs
// ============================================================================
// Module: Rollout Core Types
// Description: Canonical deployment, device-deployment, and storage structures.
// Purpose: Provide stable, serializable types shared by every Rollout crate.
// Dependencies: serde, time, uuid
// ============================================================================

//! ## Overview
//! Core types define deployments, per-device participation records, the
//! status state machine, and the provider-neutral object-storage vocabulary.
//! These types are the canonical source of truth for any API surface built
//! on top of the engine.

// ============================================================================
// SECTION: Submodules
// ============================================================================

pub mod artifact;
pub mod clock;
pub mod context;
pub mod deployment;
pub mod device_deployment;
pub mod identifiers;
pub mod status;
pub mod storage;
pub mod validation;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use artifact::Artifact;
pub use clock::Clock;
pub use clock::FixedClock;
pub use clock::SystemClock;
pub use context::Identity;
pub use context::RequestContext;
pub use deployment::Deployment;
pub use deployment::DeploymentConstructor;
pub use deployment::DeploymentTarget;
pub use deployment::Query;
pub use deployment::StatusQuery;
pub use device_deployment::ArtifactSource;
pub use device_deployment::DeploymentInstructions;
pub use device_deployment::DeploymentLog;
pub use device_deployment::DeviceDeployment;
pub use device_deployment::DeviceDeploymentState;
pub use device_deployment::InstalledDeviceDeployment;
pub use device_deployment::LogMessage;
pub use device_deployment::StatusReport;
pub use identifiers::ArtifactId;
pub use identifiers::DeploymentId;
pub use identifiers::DeviceDeploymentId;
pub use identifiers::DeviceId;
pub use identifiers::TenantId;
pub use status::DeploymentStatus;
pub use status::DeviceDeploymentStatus;
pub use status::Stats;
pub use status::StatsError;
pub use storage::ExpiryBounds;
pub use storage::HttpMethod;
pub use storage::Link;
pub use storage::ObjectInfo;
pub use storage::StorageSettings;
pub use storage::StorageType;
pub use validation::ValidationError;
