// crates/rollout-config/src/lib.rs
// ============================================================================
// Module: Rollout Config Library
// Description: Canonical config model, validation, and component builders.
// Purpose: Single source of truth for rollout.toml semantics.
// Dependencies: rollout-core, rollout-storage, rollout-store-sqlite, serde, toml
// ============================================================================

//! ## Overview
//! `rollout-config` defines the configuration model for the deployments
//! service. It validates fail-closed and turns a loaded [`RolloutConfig`]
//! into the storage manager, data store, audit sink, and engine settings.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod config;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use config::*;
