// crates/rollout-core/src/core/status.rs
// ============================================================================
// Module: Rollout Status Model
// Description: Device-deployment status state machine and per-deployment counters.
// Purpose: Centralize active/terminal classification and stats bookkeeping.
// Dependencies: serde, thiserror
// ============================================================================

//! ## Overview
//! [`DeviceDeploymentStatus`] is the per-device lifecycle. Statuses are either
//! active (the device still has work to do) or terminal (no further device
//! report is accepted). [`Stats`] counts device-deployments per status for a
//! deployment; its values always sum to the number of device-deployments, so
//! every change goes through [`Stats::transition`] rather than a blind write.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

// ============================================================================
// SECTION: Status
// ============================================================================

/// Lifecycle status of a single device-deployment.
///
/// # Invariants
/// - Wire tokens are lowercase and stable across persistence and APIs.
/// - `noartifact` is accepted on input for records written by older services.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DeviceDeploymentStatus {
    /// Assigned but not yet picked up by the device.
    Pending,
    /// Device is downloading the artifact.
    Downloading,
    /// Device is installing the artifact.
    Installing,
    /// Device is rebooting into the new artifact.
    Rebooting,
    /// Update completed successfully.
    Success,
    /// Update failed.
    Failure,
    /// Device already runs the target artifact.
    AlreadyInstalled,
    /// No artifact compatible with the device type exists.
    #[serde(alias = "noartifact")]
    NoArtifact,
    /// Deployment was aborted by an operator.
    Aborted,
    /// Device was decommissioned while the deployment was in flight.
    Decommissioned,
}

impl DeviceDeploymentStatus {
    /// Every status in declaration order.
    pub const ALL: [Self; 10] = [
        Self::Pending,
        Self::Downloading,
        Self::Installing,
        Self::Rebooting,
        Self::Success,
        Self::Failure,
        Self::AlreadyInstalled,
        Self::NoArtifact,
        Self::Aborted,
        Self::Decommissioned,
    ];

    /// Statuses that still expect progress from the device.
    pub const ACTIVE: [Self; 4] = [Self::Pending, Self::Downloading, Self::Installing, Self::Rebooting];

    /// Returns the stable wire token.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Downloading => "downloading",
            Self::Installing => "installing",
            Self::Rebooting => "rebooting",
            Self::Success => "success",
            Self::Failure => "failure",
            Self::AlreadyInstalled => "already-installed",
            Self::NoArtifact => "no-artifact",
            Self::Aborted => "aborted",
            Self::Decommissioned => "decommissioned",
        }
    }

    /// Returns true when no further device-initiated transition is accepted.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        !self.is_active()
    }

    /// Returns true while the device still has work to do.
    #[must_use]
    pub const fn is_active(self) -> bool {
        matches!(self, Self::Pending | Self::Downloading | Self::Installing | Self::Rebooting)
    }

    /// Returns true for statuses a device may report about itself.
    #[must_use]
    pub const fn is_device_reportable(self) -> bool {
        !matches!(self, Self::Aborted | Self::Decommissioned)
    }
}

impl fmt::Display for DeviceDeploymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when a status token is not recognized.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown device deployment status: {0}")]
pub struct UnknownStatusError(pub String);

impl FromStr for DeviceDeploymentStatus {
    type Err = UnknownStatusError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        if value == "noartifact" {
            return Ok(Self::NoArtifact);
        }
        Self::ALL
            .into_iter()
            .find(|status| status.as_str() == value)
            .ok_or_else(|| UnknownStatusError(value.to_string()))
    }
}

// ============================================================================
// SECTION: Deployment Status
// ============================================================================

/// Coarse deployment status derived from stats and the finish marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeploymentStatus {
    /// No device has started yet.
    Pending,
    /// At least one device has moved past `pending`.
    InProgress,
    /// Every device-deployment is terminal, or the deployment was force-finished.
    Finished,
}

impl DeploymentStatus {
    /// Returns the stable wire token.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InProgress => "inprogress",
            Self::Finished => "finished",
        }
    }
}

impl fmt::Display for DeploymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// SECTION: Stats
// ============================================================================

/// Stats bookkeeping errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StatsError {
    /// A decrement would have taken a counter below zero.
    #[error("stats counter for {0} would drop below zero")]
    Underflow(DeviceDeploymentStatus),
    /// A counter overflowed.
    #[error("stats counter for {0} overflowed")]
    Overflow(DeviceDeploymentStatus),
}

/// Per-status device-deployment counters for one deployment.
///
/// # Invariants
/// - Every status key is present; missing keys deserialize as zero.
/// - The sum of all counters equals the deployment's device-deployment count.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "BTreeMap<DeviceDeploymentStatus, u64>", into = "BTreeMap<DeviceDeploymentStatus, u64>")]
pub struct Stats {
    /// Counter per status.
    counts: BTreeMap<DeviceDeploymentStatus, u64>,
}

impl Default for Stats {
    fn default() -> Self {
        Self::new()
    }
}

impl Stats {
    /// Creates stats with every counter at zero.
    #[must_use]
    pub fn new() -> Self {
        Self {
            counts: DeviceDeploymentStatus::ALL.into_iter().map(|status| (status, 0)).collect(),
        }
    }

    /// Builds stats by counting one entry per device-deployment status.
    ///
    /// # Errors
    ///
    /// Returns [`StatsError::Overflow`] if a counter cannot be represented.
    pub fn from_statuses<I>(statuses: I) -> Result<Self, StatsError>
    where
        I: IntoIterator<Item = DeviceDeploymentStatus>,
    {
        let mut stats = Self::new();
        for status in statuses {
            stats.increment(status)?;
        }
        Ok(stats)
    }

    /// Returns the counter for a status.
    #[must_use]
    pub fn get(&self, status: DeviceDeploymentStatus) -> u64 {
        self.counts.get(&status).copied().unwrap_or(0)
    }

    /// Increments the counter for a status.
    ///
    /// # Errors
    ///
    /// Returns [`StatsError::Overflow`] on counter overflow.
    pub fn increment(&mut self, status: DeviceDeploymentStatus) -> Result<(), StatsError> {
        let counter = self.counts.entry(status).or_insert(0);
        *counter = counter.checked_add(1).ok_or(StatsError::Overflow(status))?;
        Ok(())
    }

    /// Decrements the counter for a status.
    ///
    /// # Errors
    ///
    /// Returns [`StatsError::Underflow`] when the counter is already zero.
    pub fn decrement(&mut self, status: DeviceDeploymentStatus) -> Result<(), StatsError> {
        let counter = self.counts.entry(status).or_insert(0);
        *counter = counter.checked_sub(1).ok_or(StatsError::Underflow(status))?;
        Ok(())
    }

    /// Moves one device-deployment from `old` to `new`.
    ///
    /// Equal statuses leave the counters untouched.
    ///
    /// # Errors
    ///
    /// Returns [`StatsError`] when the move would break the counter invariant;
    /// the counters are left unchanged in that case.
    pub fn transition(
        &mut self,
        old: DeviceDeploymentStatus,
        new: DeviceDeploymentStatus,
    ) -> Result<(), StatsError> {
        if old == new {
            return Ok(());
        }
        let mut next = self.clone();
        next.decrement(old)?;
        next.increment(new)?;
        *self = next;
        Ok(())
    }

    /// Returns the sum of all counters.
    #[must_use]
    pub fn total(&self) -> u64 {
        self.counts.values().sum()
    }

    /// Returns the number of device-deployments in a terminal status.
    #[must_use]
    pub fn terminal_count(&self) -> u64 {
        self.counts.iter().filter(|(status, _)| status.is_terminal()).map(|(_, count)| count).sum()
    }

    /// Returns the number of device-deployments in an active status.
    #[must_use]
    pub fn active_count(&self) -> u64 {
        self.counts.iter().filter(|(status, _)| status.is_active()).map(|(_, count)| count).sum()
    }

    /// Returns true when any counter other than `pending` is non-zero.
    #[must_use]
    pub fn has_started(&self) -> bool {
        self.counts
            .iter()
            .any(|(status, count)| *status != DeviceDeploymentStatus::Pending && *count > 0)
    }

    /// Iterates over `(status, count)` pairs in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = (DeviceDeploymentStatus, u64)> + '_ {
        self.counts.iter().map(|(status, count)| (*status, *count))
    }
}

impl From<BTreeMap<DeviceDeploymentStatus, u64>> for Stats {
    fn from(counts: BTreeMap<DeviceDeploymentStatus, u64>) -> Self {
        let mut stats = Self::new();
        stats.counts.extend(counts);
        stats
    }
}

impl From<Stats> for BTreeMap<DeviceDeploymentStatus, u64> {
    fn from(stats: Stats) -> Self {
        stats.counts
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================
