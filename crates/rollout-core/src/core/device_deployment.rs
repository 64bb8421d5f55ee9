// crates/rollout-core/src/core/device_deployment.rs
// ============================================================================
// Module: Rollout Device Deployment Model
// Description: Per-device participation records, status reports, and logs.
// Purpose: Define the unit of status tracking and the device-facing payloads.
// Dependencies: serde, time
// ============================================================================

//! ## Overview
//! A [`DeviceDeployment`] is one device's participation in a deployment. The
//! device polls for [`DeploymentInstructions`], reports progress with a
//! [`StatusReport`], and may upload a [`DeploymentLog`] when it fails.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;
use time::OffsetDateTime;

use crate::core::artifact::Artifact;
use crate::core::identifiers::DeploymentId;
use crate::core::identifiers::DeviceDeploymentId;
use crate::core::identifiers::DeviceId;
use crate::core::status::DeviceDeploymentStatus;
use crate::core::storage::Link;
use crate::core::validation::ValidationError;
use crate::core::validation::optional_length;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Maximum length of a device-reported substate.
pub const MAX_SUBSTATE_LENGTH: usize = 200;
/// Maximum number of messages accepted in one deployment log.
pub const MAX_LOG_MESSAGES: usize = 10_000;

// ============================================================================
// SECTION: Device Deployment
// ============================================================================

/// One device's participation record within a deployment.
///
/// # Invariants
/// - At most one record exists per `(deployment_id, device_id)`.
/// - `artifact` is `None` only while unresolved or when no compatible artifact exists.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceDeployment {
    /// Record identifier.
    pub id: DeviceDeploymentId,
    /// Owning deployment.
    pub deployment_id: DeploymentId,
    /// Target device.
    pub device_id: DeviceId,
    /// Assigned artifact.
    #[serde(default)]
    pub artifact: Option<Artifact>,
    /// Device type observed at assignment time.
    #[serde(default)]
    pub device_type: Option<String>,
    /// Current status.
    pub status: DeviceDeploymentStatus,
    /// Free-text substate reported by the device.
    #[serde(default)]
    pub substate: Option<String>,
    /// Creation time; orders overlapping campaigns for a device.
    #[serde(with = "time::serde::rfc3339")]
    pub created: OffsetDateTime,
    /// Time the record reached a terminal status.
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub finished: Option<OffsetDateTime>,
    /// True once the device uploaded a deployment log.
    #[serde(default)]
    pub is_log_available: bool,
}

impl DeviceDeployment {
    /// Creates a pending record with a fresh identifier.
    #[must_use]
    pub fn new(deployment_id: DeploymentId, device_id: DeviceId, created: OffsetDateTime) -> Self {
        Self {
            id: DeviceDeploymentId::generate(),
            deployment_id,
            device_id,
            artifact: None,
            device_type: None,
            status: DeviceDeploymentStatus::Pending,
            substate: None,
            created,
            finished: None,
            is_log_available: false,
        }
    }

    /// Returns the assigned artifact name when an artifact is assigned.
    #[must_use]
    pub fn artifact_name(&self) -> Option<&str> {
        self.artifact.as_ref().map(|artifact| artifact.name.as_str())
    }
}

// ============================================================================
// SECTION: Status Updates
// ============================================================================

/// Status report submitted by a device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusReport {
    /// Reported status.
    pub status: DeviceDeploymentStatus,
    /// Optional free-text substate.
    #[serde(default)]
    pub substate: Option<String>,
}

impl StatusReport {
    /// Creates a report without a substate.
    #[must_use]
    pub const fn new(status: DeviceDeploymentStatus) -> Self {
        Self { status, substate: None }
    }

    /// Attaches a substate to the report.
    #[must_use]
    pub fn with_substate(mut self, substate: impl Into<String>) -> Self {
        self.substate = Some(substate.into());
        self
    }

    /// Validates the substate length.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError`] when the substate is too long.
    pub fn validate(&self) -> Result<(), ValidationError> {
        optional_length("substate", self.substate.as_deref(), 0, MAX_SUBSTATE_LENGTH)
    }
}

/// Stored status change applied to a device-deployment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceDeploymentState {
    /// New status.
    pub status: DeviceDeploymentStatus,
    /// New substate.
    pub substate: Option<String>,
    /// Finish time, set when `status` is terminal.
    pub finished: Option<OffsetDateTime>,
}

// ============================================================================
// SECTION: Device Poll Payloads
// ============================================================================

/// Artifact the device reports as currently installed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstalledDeviceDeployment {
    /// Installed artifact name.
    #[serde(default)]
    pub artifact_name: String,
    /// Device type reported by the device.
    #[serde(default)]
    pub device_type: String,
}

impl InstalledDeviceDeployment {
    /// Creates the installed-artifact report.
    #[must_use]
    pub fn new(artifact_name: impl Into<String>, device_type: impl Into<String>) -> Self {
        Self {
            artifact_name: artifact_name.into(),
            device_type: device_type.into(),
        }
    }
}

/// Artifact download descriptor handed to a device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactSource {
    /// Artifact name.
    pub artifact_name: String,
    /// Signed download link.
    pub source: Link,
    /// Device types the artifact is compatible with.
    pub device_types_compatible: Vec<String>,
}

/// Instructions returned to a polling device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentInstructions {
    /// Deployment the instructions belong to.
    pub id: DeploymentId,
    /// Artifact to install.
    pub artifact: ArtifactSource,
}

// ============================================================================
// SECTION: Deployment Logs
// ============================================================================

/// Single log line uploaded by a device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogMessage {
    /// Device-side timestamp.
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
    /// Severity label.
    pub level: String,
    /// Message text.
    pub message: String,
}

/// Deployment log uploaded by a device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentLog {
    /// Deployment the log belongs to.
    pub deployment_id: DeploymentId,
    /// Device that produced the log.
    pub device_id: DeviceId,
    /// Log lines in device order.
    pub messages: Vec<LogMessage>,
}

impl DeploymentLog {
    /// Validates the log structure.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError`] when the log is empty, too large, or has
    /// messages without a level or text.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.deployment_id.is_blank() {
            return Err(ValidationError::new("deployment_id: cannot be blank"));
        }
        if self.device_id.is_blank() {
            return Err(ValidationError::new("device_id: cannot be blank"));
        }
        if self.messages.is_empty() {
            return Err(ValidationError::new("messages: non zero value required"));
        }
        if self.messages.len() > MAX_LOG_MESSAGES {
            return Err(ValidationError::new(format!(
                "messages: at most {MAX_LOG_MESSAGES} messages are accepted"
            )));
        }
        for (index, message) in self.messages.iter().enumerate() {
            if message.level.trim().is_empty() {
                return Err(ValidationError::new(format!("messages[{index}].level: cannot be blank")));
            }
            if message.message.trim().is_empty() {
                return Err(ValidationError::new(format!(
                    "messages[{index}].message: cannot be blank"
                )));
            }
        }
        Ok(())
    }
}
