// crates/rollout-store-sqlite/src/lib.rs
// ============================================================================
// Module: Rollout SQLite Store
// Description: SQLite-backed persistence for deployments and device records.
// Purpose: Provide a durable DataStore implementation for Rollout.
// Dependencies: rollout-core, rusqlite, serde, serde_json
// ============================================================================

//! ## Overview
//! This crate provides a durable [`rollout_core::DataStore`] backed by
//! `SQLite`. Records are stored as JSON alongside the indexed key columns
//! queries need, and every multi-row write runs in one transaction.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod store;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use store::SqliteDataStore;
pub use store::SqliteStoreConfig;
pub use store::SqliteStoreError;
pub use store::SqliteStoreMode;
pub use store::SqliteSyncMode;
