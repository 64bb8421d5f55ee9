// crates/rollout-core/src/core/deployment.rs
// ============================================================================
// Module: Rollout Deployment Model
// Description: Deployment constructor, deployment record, and lookup query.
// Purpose: Define the campaign-level record and its completion rules.
// Dependencies: serde, time
// ============================================================================

//! ## Overview
//! A [`Deployment`] is a rollout campaign targeting a set of devices with one
//! artifact name. Its [`Stats`] track how many device-deployments sit in each
//! status; `finished` is stamped once, when every device-deployment is
//! terminal or when the campaign is force-finished by abort or decommission.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::cmp::Ordering;

use serde::Deserialize;
use serde::Serialize;
use time::OffsetDateTime;

use crate::core::identifiers::ArtifactId;
use crate::core::identifiers::DeploymentId;
use crate::core::identifiers::DeviceId;
use crate::core::status::DeploymentStatus;
use crate::core::status::Stats;
use crate::core::validation::ValidationError;
use crate::core::validation::optional_length;
use crate::core::validation::require_length;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Maximum length of deployment names, artifact names, and group names.
pub const MAX_NAME_LENGTH: usize = 4096;
/// Maximum length of free-text search queries.
pub const MAX_SEARCH_TEXT_LENGTH: usize = 1024;

// ============================================================================
// SECTION: Constructor
// ============================================================================

/// Caller-supplied input for a new deployment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentConstructor {
    /// Human-readable campaign name.
    pub name: String,
    /// Name of the artifact to roll out.
    pub artifact_name: String,
    /// Explicit device targets.
    #[serde(default)]
    pub devices: Vec<DeviceId>,
    /// Device-group filter resolved through the device inventory.
    #[serde(default)]
    pub group: Option<String>,
    /// Number of retries a device is allowed on failure.
    #[serde(default)]
    pub retries: u32,
    /// Upper bound on the number of devices targeted.
    #[serde(default)]
    pub max_devices: Option<u64>,
}

/// Resolved targeting mode of a constructor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeploymentTarget<'a> {
    /// Explicit device list.
    Devices(&'a [DeviceId]),
    /// Device group to expand via the inventory.
    Group(&'a str),
}

impl DeploymentConstructor {
    /// Creates a constructor targeting an explicit device list.
    #[must_use]
    pub fn for_devices(
        name: impl Into<String>,
        artifact_name: impl Into<String>,
        devices: Vec<DeviceId>,
    ) -> Self {
        Self {
            name: name.into(),
            artifact_name: artifact_name.into(),
            devices,
            group: None,
            retries: 0,
            max_devices: None,
        }
    }

    /// Creates a constructor targeting a device group.
    #[must_use]
    pub fn for_group(
        name: impl Into<String>,
        artifact_name: impl Into<String>,
        group: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            artifact_name: artifact_name.into(),
            devices: Vec::new(),
            group: Some(group.into()),
            retries: 0,
            max_devices: None,
        }
    }

    /// Validates required fields and targeting.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError`] when a field is missing or out of range, or
    /// when both or neither of `devices` and `group` are set.
    pub fn validate(&self) -> Result<(), ValidationError> {
        require_length("name", &self.name, 1, MAX_NAME_LENGTH)?;
        require_length("artifact_name", &self.artifact_name, 1, MAX_NAME_LENGTH)?;
        optional_length("group", self.group.as_deref(), 1, MAX_NAME_LENGTH)?;
        match (self.devices.is_empty(), self.group.is_some()) {
            (true, false) => {
                return Err(ValidationError::new("devices: non zero value required"));
            }
            (false, true) => {
                return Err(ValidationError::new("devices and group are mutually exclusive"));
            }
            _ => {}
        }
        if self.devices.iter().any(DeviceId::is_blank) {
            return Err(ValidationError::new("devices: identifiers cannot be blank"));
        }
        if self.max_devices == Some(0) {
            return Err(ValidationError::new("max_devices: must be greater than zero"));
        }
        Ok(())
    }

    /// Returns how the constructor selects its devices.
    #[must_use]
    pub fn target(&self) -> DeploymentTarget<'_> {
        match &self.group {
            Some(group) if self.devices.is_empty() => DeploymentTarget::Group(group),
            _ => DeploymentTarget::Devices(&self.devices),
        }
    }
}

// ============================================================================
// SECTION: Deployment
// ============================================================================

/// Persisted rollout campaign.
///
/// # Invariants
/// - `stats.total() == device_count` once device-deployments are stored.
/// - `finished` transitions from `None` to `Some` at most once.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Deployment {
    /// Deployment identifier.
    pub id: DeploymentId,
    /// Constructor the deployment was created from.
    pub constructor: DeploymentConstructor,
    /// Per-status device-deployment counters.
    pub stats: Stats,
    /// Creation time.
    #[serde(with = "time::serde::rfc3339")]
    pub created: OffsetDateTime,
    /// Finish time, once stamped.
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub finished: Option<OffsetDateTime>,
    /// Number of device-deployments created for this deployment.
    pub device_count: u64,
    /// Number of terminal device-deployments required to finish.
    pub max_devices: u64,
    /// Catalog artifacts sharing the artifact name at creation time.
    #[serde(default)]
    pub artifacts: Vec<ArtifactId>,
}

impl Deployment {
    /// Creates an unfinished deployment with zeroed stats.
    #[must_use]
    pub fn new(id: DeploymentId, constructor: DeploymentConstructor, created: OffsetDateTime) -> Self {
        Self {
            id,
            constructor,
            stats: Stats::new(),
            created,
            finished: None,
            device_count: 0,
            max_devices: 0,
            artifacts: Vec::new(),
        }
    }

    /// Returns the artifact name this deployment rolls out.
    #[must_use]
    pub fn artifact_name(&self) -> &str {
        &self.constructor.artifact_name
    }

    /// Returns true once the finish time is stamped.
    #[must_use]
    pub const fn is_finished(&self) -> bool {
        self.finished.is_some()
    }

    /// Returns true when the terminal count has reached the device target.
    #[must_use]
    pub fn all_devices_terminal(&self) -> bool {
        self.max_devices == 0 || self.stats.terminal_count() >= self.max_devices
    }

    /// Returns the coarse deployment status.
    #[must_use]
    pub fn status(&self) -> DeploymentStatus {
        if self.is_finished() {
            DeploymentStatus::Finished
        } else if self.stats.has_started() {
            DeploymentStatus::InProgress
        } else {
            DeploymentStatus::Pending
        }
    }
}

// ============================================================================
// SECTION: Query
// ============================================================================

/// Status filter for deployment lookup.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatusQuery {
    /// No status filtering.
    #[default]
    Any,
    /// Deployments where no device has started.
    Pending,
    /// Started but not finished deployments.
    #[serde(rename = "inprogress")]
    InProgress,
    /// Finished deployments.
    Finished,
}

impl StatusQuery {
    /// Returns true when the deployment status satisfies the filter.
    #[must_use]
    pub fn accepts(self, status: DeploymentStatus) -> bool {
        match self {
            Self::Any => true,
            Self::Pending => status == DeploymentStatus::Pending,
            Self::InProgress => status == DeploymentStatus::InProgress,
            Self::Finished => status == DeploymentStatus::Finished,
        }
    }
}

/// Deployment lookup query.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Query {
    /// Case-insensitive substring matched against name and artifact name.
    #[serde(default)]
    pub search_text: Option<String>,
    /// Status filter.
    #[serde(default)]
    pub status: StatusQuery,
    /// Inclusive lower creation bound.
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub created_after: Option<OffsetDateTime>,
    /// Inclusive upper creation bound.
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub created_before: Option<OffsetDateTime>,
    /// Number of matching deployments to skip.
    #[serde(default)]
    pub skip: u64,
    /// Maximum number of deployments to return.
    #[serde(default)]
    pub limit: Option<u64>,
}

impl Query {
    /// Validates the query.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError`] for oversized search text or inverted bounds.
    pub fn validate(&self) -> Result<(), ValidationError> {
        optional_length("search_text", self.search_text.as_deref(), 0, MAX_SEARCH_TEXT_LENGTH)?;
        if let (Some(after), Some(before)) = (self.created_after, self.created_before) {
            if after > before {
                return Err(ValidationError::new("created_after must not be later than created_before"));
            }
        }
        Ok(())
    }

    /// Returns true when a deployment satisfies every filter in the query.
    #[must_use]
    pub fn matches(&self, deployment: &Deployment) -> bool {
        if let Some(text) = self.search_text.as_deref().map(str::trim).filter(|text| !text.is_empty()) {
            let needle = text.to_lowercase();
            let in_name = deployment.constructor.name.to_lowercase().contains(&needle);
            let in_artifact = deployment.artifact_name().to_lowercase().contains(&needle);
            if !(in_name || in_artifact) {
                return false;
            }
        }
        if self.created_after.is_some_and(|after| deployment.created < after) {
            return false;
        }
        if self.created_before.is_some_and(|before| deployment.created > before) {
            return false;
        }
        self.status.accepts(deployment.status())
    }

    /// Filters, orders (newest first), and paginates candidate deployments.
    #[must_use]
    pub fn apply(&self, candidates: Vec<Deployment>) -> Vec<Deployment> {
        let mut matched: Vec<Deployment> =
            candidates.into_iter().filter(|deployment| self.matches(deployment)).collect();
        matched.sort_by(newest_first);
        let skip = usize::try_from(self.skip).unwrap_or(usize::MAX);
        let limit = self.limit.map_or(usize::MAX, |limit| usize::try_from(limit).unwrap_or(usize::MAX));
        matched.into_iter().skip(skip).take(limit).collect()
    }
}

/// Orders deployments by creation time descending, then by identifier.
fn newest_first(left: &Deployment, right: &Deployment) -> Ordering {
    right.created.cmp(&left.created).then_with(|| left.id.cmp(&right.id))
}
