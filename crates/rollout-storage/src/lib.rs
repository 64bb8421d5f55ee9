// crates/rollout-storage/src/lib.rs
// ============================================================================
// Module: Rollout Storage Library
// Description: S3 and Azure Blob backends for the object-storage contract.
// Purpose: Upload artifacts and sign time-bounded links on cloud storage.
// Dependencies: aws-config, aws-sdk-s3, reqwest, hmac, sha2, base64, url, rollout-core
// ============================================================================

//! ## Overview
//! Implements [`rollout_core::ObjectStorage`] for Amazon S3 (and S3-compatible
//! stores) and for Azure Blob Storage. [`StorageManager`] routes each call to
//! the backend selected by the request's storage settings and optionally
//! rewrites signed links through a proxy.
//! Invariants:
//! - Link lifetimes are clamped to [`rollout_core::ExpiryBounds`].
//! - Object keys are prefixed with the tenant when the request carries one.
//! - Missing objects surface as [`rollout_core::ObjectStorageError::NotFound`].

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod azblob;
mod buffer;
pub mod manager;
pub mod proxy;
pub mod s3;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use azblob::AzureCredentials;
pub use azblob::AzureOptions;
pub use azblob::AzureStorage;
pub use azblob::CredentialsError;
pub use manager::StorageManager;
pub use proxy::rewrite_proxy_url;
pub use s3::S3Options;
pub use s3::S3Storage;
pub use s3::StaticCredentials;
