// crates/rollout-core/src/runtime/audit.rs
// ============================================================================
// Module: Rollout Audit Logging
// Description: Structured audit events for deployment lifecycle changes.
// Purpose: Emit JSON-lines audit records without a logging framework dependency.
// Dependencies: serde, serde_json
// ============================================================================

//! ## Overview
//! The orchestration engine records one audit event per lifecycle change:
//! deployment creation, device status change, finish, abort, and device
//! decommission. Sinks are intentionally lightweight so hosts can route
//! events to their preferred logging pipeline. Recording never fails the
//! calling operation.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fs::OpenOptions;
use std::io;
use std::io::Write;
use std::path::Path;
use std::sync::Mutex;

use serde::Serialize;
use time::OffsetDateTime;

use crate::core::DeploymentId;
use crate::core::DeviceDeploymentStatus;
use crate::core::DeviceId;
use crate::core::RequestContext;
use crate::core::clock::unix_millis;

// ============================================================================
// SECTION: Types
// ============================================================================

/// Audit event classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DeploymentAuditKind {
    /// A deployment and its device-deployments were stored.
    DeploymentCreated,
    /// A device-deployment moved to a new status.
    DeviceStatusChanged,
    /// A deployment was stamped finished after its last device went terminal.
    DeploymentFinished,
    /// An operator aborted a deployment.
    DeploymentAborted,
    /// A device was decommissioned out of an in-flight deployment.
    DeviceDecommissioned,
}

/// Deployment audit event payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeploymentAuditEvent {
    /// Event identifier.
    pub event: DeploymentAuditKind,
    /// Event timestamp (milliseconds since epoch).
    pub timestamp_ms: i64,
    /// Tenant identifier when the request is tenant-scoped.
    pub tenant_id: Option<String>,
    /// Authenticated subject when provided.
    pub subject: Option<String>,
    /// Deployment identifier.
    pub deployment_id: String,
    /// Device identifier for device-scoped events.
    pub device_id: Option<String>,
    /// Status before the change.
    pub old_status: Option<DeviceDeploymentStatus>,
    /// Status after the change.
    pub new_status: Option<DeviceDeploymentStatus>,
    /// Device count for creation events.
    pub device_count: Option<u64>,
    /// Artifact name for creation events.
    pub artifact_name: Option<String>,
}

/// Inputs required to construct a deployment audit event.
pub struct DeploymentAuditEventParams<'a> {
    /// Event identifier.
    pub kind: DeploymentAuditKind,
    /// Deployment identifier.
    pub deployment_id: &'a DeploymentId,
    /// Device identifier for device-scoped events.
    pub device_id: Option<&'a DeviceId>,
    /// Status before the change.
    pub old_status: Option<DeviceDeploymentStatus>,
    /// Status after the change.
    pub new_status: Option<DeviceDeploymentStatus>,
    /// Device count for creation events.
    pub device_count: Option<u64>,
    /// Artifact name for creation events.
    pub artifact_name: Option<&'a str>,
}

impl<'a> DeploymentAuditEventParams<'a> {
    /// Creates params for a deployment-scoped event with no optional fields.
    #[must_use]
    pub const fn deployment(kind: DeploymentAuditKind, deployment_id: &'a DeploymentId) -> Self {
        Self {
            kind,
            deployment_id,
            device_id: None,
            old_status: None,
            new_status: None,
            device_count: None,
            artifact_name: None,
        }
    }
}

impl DeploymentAuditEvent {
    /// Creates an audit event stamped at `at` and scoped by the request identity.
    #[must_use]
    pub fn new(
        ctx: &RequestContext,
        at: OffsetDateTime,
        params: &DeploymentAuditEventParams<'_>,
    ) -> Self {
        Self {
            event: params.kind,
            timestamp_ms: unix_millis(at),
            tenant_id: ctx.tenant().map(ToString::to_string),
            subject: ctx.identity.as_ref().map(|identity| identity.subject.clone()),
            deployment_id: params.deployment_id.to_string(),
            device_id: params.device_id.map(ToString::to_string),
            old_status: params.old_status,
            new_status: params.new_status,
            device_count: params.device_count,
            artifact_name: params.artifact_name.map(str::to_string),
        }
    }
}

// ============================================================================
// SECTION: Sinks
// ============================================================================

/// Audit sink for deployment lifecycle events.
pub trait DeploymentAuditSink: Send + Sync {
    /// Record an audit event.
    fn record(&self, event: &DeploymentAuditEvent);
}

/// Audit sink that logs JSON lines to stderr.
pub struct StderrAuditSink;

impl DeploymentAuditSink for StderrAuditSink {
    fn record(&self, event: &DeploymentAuditEvent) {
        if let Ok(payload) = serde_json::to_string(event) {
            let _ = writeln!(std::io::stderr(), "{payload}");
        }
    }
}

/// Audit sink that logs JSON lines to a file.
pub struct FileAuditSink {
    /// File handle used for append-only logging.
    file: Mutex<std::fs::File>,
}

impl FileAuditSink {
    /// Opens the audit log file in append mode.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened.
    pub fn new(path: &Path) -> io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            file: Mutex::new(file),
        })
    }
}

impl DeploymentAuditSink for FileAuditSink {
    fn record(&self, event: &DeploymentAuditEvent) {
        if let Ok(payload) = serde_json::to_string(event)
            && let Ok(mut file) = self.file.lock()
        {
            let _ = writeln!(file, "{payload}");
            let _ = file.flush();
        }
    }
}

/// No-op audit sink.
pub struct NoopAuditSink;

impl DeploymentAuditSink for NoopAuditSink {
    fn record(&self, _event: &DeploymentAuditEvent) {}
}
