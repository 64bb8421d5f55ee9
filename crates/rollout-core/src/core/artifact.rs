// crates/rollout-core/src/core/artifact.rs
// ============================================================================
// Module: Rollout Artifact Metadata
// Description: Artifact metadata as returned by the artifact catalog.
// Purpose: Carry the fields the orchestration engine needs for compatibility.
// Dependencies: serde, time
// ============================================================================

//! ## Overview
//! The artifact catalog is an external collaborator. Only the fields used to
//! match artifacts to device types and to name downloads are modelled here.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;
use time::OffsetDateTime;

use crate::core::identifiers::ArtifactId;

// ============================================================================
// SECTION: Types
// ============================================================================

/// Artifact (update image) metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Artifact {
    /// Artifact identifier; also the object-storage path of the payload.
    pub id: ArtifactId,
    /// Artifact name shared by all device-type variants of the same release.
    pub name: String,
    /// Device types this artifact can be installed on.
    #[serde(default)]
    pub device_types_compatible: Vec<String>,
    /// Payload size in bytes when known.
    #[serde(default)]
    pub size: Option<u64>,
    /// Last modification time when known.
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub modified: Option<OffsetDateTime>,
}

impl Artifact {
    /// Creates artifact metadata with the provided compatibility list.
    #[must_use]
    pub fn new(
        id: impl Into<ArtifactId>,
        name: impl Into<String>,
        device_types_compatible: Vec<String>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            device_types_compatible,
            size: None,
            modified: None,
        }
    }

    /// Returns true when the artifact can be installed on `device_type`.
    #[must_use]
    pub fn is_compatible_with(&self, device_type: &str) -> bool {
        self.device_types_compatible.iter().any(|candidate| candidate == device_type)
    }
}
