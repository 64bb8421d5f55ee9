// crates/rollout-core/src/core/identifiers.rs
// ============================================================================
// Module: Rollout Identifiers
// Description: Opaque identifiers for deployments, devices, artifacts, and tenants.
// Purpose: Provide strongly typed, serializable identifiers with stable wire forms.
// Dependencies: serde, uuid
// ============================================================================

//! ## Overview
//! Identifiers are opaque UTF-8 strings on the wire. Deployment and
//! device-deployment identifiers are minted as UUID v4 values; device,
//! artifact, and tenant identifiers are supplied by collaborators and are
//! never normalized here.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;

use serde::Deserialize;
use serde::Serialize;
use uuid::Uuid;

// ============================================================================
// SECTION: Macros
// ============================================================================

/// Declares a transparent string identifier with the shared accessor set.
macro_rules! string_identifier {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Creates a new identifier from the provided string.
            #[must_use]
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            /// Returns the identifier as a string slice.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Returns true when the identifier is empty or whitespace.
            #[must_use]
            pub fn is_blank(&self) -> bool {
                self.0.trim().is_empty()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                self.0.fmt(f)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self::new(value)
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self::new(value)
            }
        }
    };
}

// ============================================================================
// SECTION: Identifier Types
// ============================================================================

string_identifier!(
    /// Deployment (rollout campaign) identifier.
    ///
    /// # Invariants
    /// - Minted as a hyphenated UUID v4 by [`DeploymentId::generate`].
    DeploymentId
);

string_identifier!(
    /// Identifier of a single device-deployment record.
    DeviceDeploymentId
);

string_identifier!(
    /// Device identifier assigned by the device inventory.
    DeviceId
);

string_identifier!(
    /// Artifact (update image) identifier assigned by the artifact catalog.
    ArtifactId
);

string_identifier!(
    /// Tenant identifier carried by the request identity.
    ///
    /// # Invariants
    /// - Used verbatim as the object-key prefix and store partition key.
    TenantId
);

impl DeploymentId {
    /// Mints a fresh random deployment identifier.
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

impl DeviceDeploymentId {
    /// Mints a fresh random device-deployment identifier.
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}
