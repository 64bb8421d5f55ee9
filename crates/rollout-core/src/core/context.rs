// crates/rollout-core/src/core/context.rs
// ============================================================================
// Module: Rollout Request Context
// Description: Per-request identity and storage override.
// Purpose: Thread tenant scope explicitly through every call.
// Dependencies: serde
// ============================================================================

//! ## Overview
//! The caller layer authenticates requests and builds a [`RequestContext`].
//! The core reads the tenant to scope object keys and store partitions, and
//! hands any [`StorageSettings`] to the object-storage layer. It never parses
//! credentials or tokens itself.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;

use crate::core::identifiers::TenantId;
use crate::core::storage::StorageSettings;

// ============================================================================
// SECTION: Types
// ============================================================================

/// Authenticated identity attached to a request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    /// Authenticated subject (device or user identifier).
    pub subject: String,
    /// Tenant the subject belongs to.
    #[serde(default)]
    pub tenant: Option<TenantId>,
}

impl Identity {
    /// Creates an identity scoped to a tenant.
    #[must_use]
    pub fn new(subject: impl Into<String>, tenant: Option<TenantId>) -> Self {
        Self {
            subject: subject.into(),
            tenant,
        }
    }
}

/// Request-scoped values threaded through model and storage calls.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestContext {
    /// Identity of the caller, when authenticated.
    pub identity: Option<Identity>,
    /// Storage override for this call.
    pub storage_settings: Option<StorageSettings>,
}

impl RequestContext {
    /// Creates an anonymous context using default storage.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a context for a tenant-scoped subject.
    #[must_use]
    pub fn for_tenant(subject: impl Into<String>, tenant: impl Into<TenantId>) -> Self {
        Self {
            identity: Some(Identity::new(subject, Some(tenant.into()))),
            storage_settings: None,
        }
    }

    /// Attaches an identity.
    #[must_use]
    pub fn with_identity(mut self, identity: Identity) -> Self {
        self.identity = Some(identity);
        self
    }

    /// Attaches a storage override.
    #[must_use]
    pub fn with_storage_settings(mut self, settings: StorageSettings) -> Self {
        self.storage_settings = Some(settings);
        self
    }

    /// Returns the tenant when the identity carries one.
    #[must_use]
    pub fn tenant(&self) -> Option<&TenantId> {
        self.identity.as_ref().and_then(|identity| identity.tenant.as_ref())
    }

    /// Returns the storage override, if any.
    #[must_use]
    pub const fn storage_settings(&self) -> Option<&StorageSettings> {
        self.storage_settings.as_ref()
    }

    /// Maps an object path to its backend key, prefixed by `{tenant}/` when
    /// the request is tenant-scoped.
    #[must_use]
    pub fn object_key(&self, path: &str) -> String {
        match self.tenant() {
            Some(tenant) if !tenant.is_blank() => format!("{tenant}/{path}"),
            _ => path.to_string(),
        }
    }
}
