// crates/rollout-store-sqlite/src/store.rs
// ============================================================================
// Module: SQLite Data Store
// Description: Durable DataStore backed by SQLite WAL.
// Purpose: Persist deployments, device-deployments, and logs per tenant.
// Dependencies: rollout-core, rusqlite, serde, serde_json, thiserror, time
// ============================================================================

//! ## Overview
//! [`SqliteDataStore`] keeps each record as a JSON document next to the key
//! columns used for lookups and ordering. Read-modify-write operations run
//! inside a transaction on a single mutex-guarded connection, so each
//! [`DataStore`] call is atomic with respect to the others.
//! Invariants:
//! - Every row carries a tenant column; requests only see their tenant.
//! - A finish time, once stored, is never overwritten.
//! - Bulk device-deployment inserts store all records or none.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeSet;
use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::Mutex;

use async_trait::async_trait;
use rollout_core::Artifact;
use rollout_core::DataStore;
use rollout_core::Deployment;
use rollout_core::DeploymentId;
use rollout_core::DeploymentLog;
use rollout_core::DeviceDeployment;
use rollout_core::DeviceDeploymentState;
use rollout_core::DeviceDeploymentStatus;
use rollout_core::DeviceId;
use rollout_core::Query;
use rollout_core::RequestContext;
use rollout_core::Stats;
use rollout_core::StoreError;
use rusqlite::Connection;
use rusqlite::ErrorCode;
use rusqlite::OpenFlags;
use rusqlite::OptionalExtension;
use rusqlite::ToSql;
use rusqlite::params;
use serde::Deserialize;
use serde::Serialize;
use serde::de::DeserializeOwned;
use thiserror::Error;
use time::OffsetDateTime;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// `SQLite` schema version for the store.
const SCHEMA_VERSION: i64 = 1;
/// Default busy timeout (ms).
const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;
/// Maximum length of a single path component.
const MAX_PATH_COMPONENT_LENGTH: usize = 255;
/// Maximum total path length.
const MAX_TOTAL_PATH_LENGTH: usize = 4096;

// ============================================================================
// SECTION: Config
// ============================================================================

/// `SQLite` journal mode configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SqliteStoreMode {
    /// WAL journal mode (recommended).
    #[default]
    Wal,
    /// Delete journal mode (legacy).
    Delete,
}

impl SqliteStoreMode {
    /// Returns the `SQLite` pragma value.
    #[must_use]
    pub const fn pragma_value(self) -> &'static str {
        match self {
            Self::Wal => "wal",
            Self::Delete => "delete",
        }
    }
}

/// `SQLite` sync mode configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SqliteSyncMode {
    /// Full synchronous mode (safest).
    #[default]
    Full,
    /// Normal synchronous mode (balanced).
    Normal,
}

impl SqliteSyncMode {
    /// Returns the `SQLite` pragma value.
    #[must_use]
    pub const fn pragma_value(self) -> &'static str {
        match self {
            Self::Full => "full",
            Self::Normal => "normal",
        }
    }
}

/// Configuration for the `SQLite` data store.
///
/// # Invariants
/// - `path` must resolve to a file path (not a directory).
/// - `busy_timeout_ms` is interpreted as milliseconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SqliteStoreConfig {
    /// Path to the `SQLite` database file.
    pub path: PathBuf,
    /// Busy timeout in milliseconds.
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
    /// `SQLite` journal mode.
    #[serde(default)]
    pub journal_mode: SqliteStoreMode,
    /// `SQLite` sync mode.
    #[serde(default)]
    pub sync_mode: SqliteSyncMode,
}

impl SqliteStoreConfig {
    /// Creates a configuration for `path` with default pragmas.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            busy_timeout_ms: DEFAULT_BUSY_TIMEOUT_MS,
            journal_mode: SqliteStoreMode::default(),
            sync_mode: SqliteSyncMode::default(),
        }
    }
}

/// Returns the default busy timeout for `SQLite` connections.
const fn default_busy_timeout_ms() -> u64 {
    DEFAULT_BUSY_TIMEOUT_MS
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// `SQLite` store errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SqliteStoreError {
    /// Store I/O error.
    #[error("sqlite store io error: {0}")]
    Io(String),
    /// `SQLite` engine error.
    #[error("sqlite store db error: {0}")]
    Db(String),
    /// Stored record cannot be decoded.
    #[error("sqlite store corruption: {0}")]
    Corrupt(String),
    /// Store schema version mismatch.
    #[error("sqlite store version mismatch: {0}")]
    VersionMismatch(String),
    /// Invalid store data or configuration.
    #[error("sqlite store invalid data: {0}")]
    Invalid(String),
    /// Record targeted by a write does not exist.
    #[error("sqlite store record not found: {0}")]
    NotFound(String),
    /// Insert collided with an existing record.
    #[error("sqlite store conflict: {0}")]
    Conflict(String),
}

impl From<SqliteStoreError> for StoreError {
    fn from(error: SqliteStoreError) -> Self {
        match error {
            SqliteStoreError::Io(message) => Self::Io(message),
            SqliteStoreError::Db(message) => Self::Store(message),
            SqliteStoreError::Corrupt(message) => Self::Corrupt(message),
            SqliteStoreError::VersionMismatch(message) => Self::VersionMismatch(message),
            SqliteStoreError::Invalid(message) => Self::Invalid(message),
            SqliteStoreError::NotFound(message) => Self::NotFound(message),
            SqliteStoreError::Conflict(message) => Self::Conflict(message),
        }
    }
}

/// Maps a `rusqlite` error to a store error.
fn db_error(err: &rusqlite::Error) -> SqliteStoreError {
    SqliteStoreError::Db(err.to_string())
}

/// Maps an insert error, reporting constraint violations as conflicts.
fn insert_error(err: &rusqlite::Error, what: &str) -> SqliteStoreError {
    match err.sqlite_error_code() {
        Some(ErrorCode::ConstraintViolation) => SqliteStoreError::Conflict(what.to_string()),
        _ => db_error(err),
    }
}

// ============================================================================
// SECTION: Store
// ============================================================================

/// `SQLite`-backed data store with WAL support.
///
/// # Invariants
/// - Connection access is serialized through a mutex.
#[derive(Clone)]
pub struct SqliteDataStore {
    /// Store configuration.
    config: SqliteStoreConfig,
    /// Shared connection guarded by a mutex.
    connection: Arc<Mutex<Connection>>,
}

impl SqliteDataStore {
    /// Opens an `SQLite`-backed data store, creating the schema if needed.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError`] when the database cannot be opened or
    /// initialized.
    pub fn new(config: SqliteStoreConfig) -> Result<Self, SqliteStoreError> {
        validate_store_path(&config.path)?;
        ensure_parent_dir(&config.path)?;
        let mut connection = open_connection(&config)?;
        initialize_schema(&mut connection)?;
        Ok(Self {
            config,
            connection: Arc::new(Mutex::new(connection)),
        })
    }

    /// Returns the store configuration.
    #[must_use]
    pub const fn config(&self) -> &SqliteStoreConfig {
        &self.config
    }

    /// Verifies the store can execute a simple SQL statement.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError`] if the mutex is poisoned or the query fails.
    pub fn check_connection(&self) -> Result<(), SqliteStoreError> {
        let guard = self
            .connection
            .lock()
            .map_err(|_| SqliteStoreError::Io("sqlite connection mutex poisoned".to_string()))?;
        guard.query_row("SELECT 1", [], |_| Ok(())).map_err(|err| db_error(&err))
    }

    /// Runs `f` against the connection under the store lock.
    fn with_connection<T>(
        &self,
        f: impl FnOnce(&mut Connection) -> Result<T, SqliteStoreError>,
    ) -> Result<T, StoreError> {
        let mut guard = self
            .connection
            .lock()
            .map_err(|_| StoreError::Io("sqlite connection mutex poisoned".to_string()))?;
        f(&mut guard).map_err(StoreError::from)
    }

    /// Runs `f` inside a transaction, committing on success.
    fn with_transaction<T>(
        &self,
        f: impl FnOnce(&Connection) -> Result<T, SqliteStoreError>,
    ) -> Result<T, StoreError> {
        self.with_connection(|connection| {
            let tx = connection.transaction().map_err(|err| db_error(&err))?;
            let value = f(&tx)?;
            tx.commit().map_err(|err| db_error(&err))?;
            Ok(value)
        })
    }
}

/// Returns the partition key for a request.
fn tenant_key(ctx: &RequestContext) -> String {
    ctx.tenant().map(ToString::to_string).unwrap_or_default()
}

#[async_trait]
impl DataStore for SqliteDataStore {
    async fn insert_deployment(
        &self,
        ctx: &RequestContext,
        deployment: &Deployment,
    ) -> Result<(), StoreError> {
        let tenant = tenant_key(ctx);
        self.with_connection(|connection| {
            connection
                .execute(
                    "INSERT INTO deployments (tenant_id, deployment_id, created_ns, finished, \
                     record_json) VALUES (?1, ?2, ?3, ?4, ?5)",
                    params![
                        tenant,
                        deployment.id.as_str(),
                        unix_nanos(deployment.created)?,
                        deployment.finished.is_some(),
                        encode(deployment)?
                    ],
                )
                .map_err(|err| insert_error(&err, &format!("deployment {}", deployment.id)))?;
            Ok(())
        })
    }

    async fn delete_deployment(
        &self,
        ctx: &RequestContext,
        id: &DeploymentId,
    ) -> Result<(), StoreError> {
        let tenant = tenant_key(ctx);
        self.with_connection(|connection| {
            connection
                .execute(
                    "DELETE FROM deployments WHERE tenant_id = ?1 AND deployment_id = ?2",
                    params![tenant, id.as_str()],
                )
                .map_err(|err| db_error(&err))?;
            Ok(())
        })
    }

    async fn find_deployment_by_id(
        &self,
        ctx: &RequestContext,
        id: &DeploymentId,
    ) -> Result<Option<Deployment>, StoreError> {
        let tenant = tenant_key(ctx);
        self.with_connection(|connection| load_deployment(connection, &tenant, id))
    }

    async fn find_unfinished_by_id(
        &self,
        ctx: &RequestContext,
        id: &DeploymentId,
    ) -> Result<Option<Deployment>, StoreError> {
        let tenant = tenant_key(ctx);
        self.with_connection(|connection| {
            let json: Option<Vec<u8>> = connection
                .query_row(
                    "SELECT record_json FROM deployments WHERE tenant_id = ?1 AND deployment_id \
                     = ?2 AND finished = 0",
                    params![tenant, id.as_str()],
                    |row| row.get(0),
                )
                .optional()
                .map_err(|err| db_error(&err))?;
            json.map(|json| decode(&json)).transpose()
        })
    }

    async fn find_deployments(
        &self,
        ctx: &RequestContext,
        query: &Query,
    ) -> Result<Vec<Deployment>, StoreError> {
        let tenant = tenant_key(ctx);
        let deployments: Vec<Deployment> = self.with_connection(|connection| {
            select_records(
                connection,
                "SELECT record_json FROM deployments WHERE tenant_id = ?1 ORDER BY deployment_id",
                params![tenant],
            )
        })?;
        Ok(query.apply(deployments))
    }

    async fn device_count_by_deployment(
        &self,
        ctx: &RequestContext,
        id: &DeploymentId,
    ) -> Result<u64, StoreError> {
        let tenant = tenant_key(ctx);
        self.with_connection(|connection| {
            let count: i64 = connection
                .query_row(
                    "SELECT COUNT(1) FROM device_deployments WHERE tenant_id = ?1 AND \
                     deployment_id = ?2",
                    params![tenant, id.as_str()],
                    |row| row.get(0),
                )
                .map_err(|err| db_error(&err))?;
            u64::try_from(count).map_err(|_| SqliteStoreError::Corrupt("negative count".to_string()))
        })
    }

    async fn update_stats(
        &self,
        ctx: &RequestContext,
        id: &DeploymentId,
        old: DeviceDeploymentStatus,
        new: DeviceDeploymentStatus,
    ) -> Result<(), StoreError> {
        let tenant = tenant_key(ctx);
        self.with_transaction(|tx| {
            let mut deployment = require_deployment(tx, &tenant, id)?;
            deployment
                .stats
                .transition(old, new)
                .map_err(|err| SqliteStoreError::Corrupt(err.to_string()))?;
            update_deployment(tx, &tenant, &deployment)
        })
    }

    async fn update_stats_and_finish_deployment(
        &self,
        ctx: &RequestContext,
        id: &DeploymentId,
        stats: &Stats,
        finished: OffsetDateTime,
    ) -> Result<(), StoreError> {
        let tenant = tenant_key(ctx);
        self.with_transaction(|tx| {
            let mut deployment = require_deployment(tx, &tenant, id)?;
            deployment.stats = stats.clone();
            deployment.finished.get_or_insert(finished);
            update_deployment(tx, &tenant, &deployment)
        })
    }

    async fn finish_deployment(
        &self,
        ctx: &RequestContext,
        id: &DeploymentId,
        finished: OffsetDateTime,
    ) -> Result<(), StoreError> {
        let tenant = tenant_key(ctx);
        self.with_transaction(|tx| {
            let mut deployment = require_deployment(tx, &tenant, id)?;
            if deployment.finished.is_some() {
                return Ok(());
            }
            deployment.finished = Some(finished);
            update_deployment(tx, &tenant, &deployment)
        })
    }

    async fn insert_device_deployments(
        &self,
        ctx: &RequestContext,
        records: &[DeviceDeployment],
    ) -> Result<(), StoreError> {
        let tenant = tenant_key(ctx);
        self.with_transaction(|tx| {
            let mut statement = tx
                .prepare(
                    "INSERT INTO device_deployments (tenant_id, deployment_id, device_id, status, \
                     created_ns, record_json) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                )
                .map_err(|err| db_error(&err))?;
            for record in records {
                statement
                    .execute(params![
                        tenant,
                        record.deployment_id.as_str(),
                        record.device_id.as_str(),
                        record.status.as_str(),
                        unix_nanos(record.created)?,
                        encode(record)?
                    ])
                    .map_err(|err| {
                        insert_error(
                            &err,
                            &format!(
                                "device deployment {}/{}",
                                record.deployment_id, record.device_id
                            ),
                        )
                    })?;
            }
            Ok(())
        })
    }

    async fn get_device_deployment(
        &self,
        ctx: &RequestContext,
        deployment_id: &DeploymentId,
        device_id: &DeviceId,
    ) -> Result<Option<DeviceDeployment>, StoreError> {
        let tenant = tenant_key(ctx);
        self.with_connection(|connection| {
            load_device_deployment(connection, &tenant, deployment_id, device_id)
        })
    }

    async fn find_oldest_active_device_deployment(
        &self,
        ctx: &RequestContext,
        device_id: &DeviceId,
    ) -> Result<Option<DeviceDeployment>, StoreError> {
        let tenant = tenant_key(ctx);
        let records = self.with_connection(|connection| {
            select_records::<DeviceDeployment>(
                connection,
                "SELECT record_json FROM device_deployments WHERE tenant_id = ?1 AND device_id = \
                 ?2 ORDER BY created_ns, deployment_id",
                params![tenant, device_id.as_str()],
            )
        })?;
        Ok(records.into_iter().find(|record| record.status.is_active()))
    }

    async fn get_device_statuses_for_deployment(
        &self,
        ctx: &RequestContext,
        id: &DeploymentId,
    ) -> Result<Vec<DeviceDeployment>, StoreError> {
        let tenant = tenant_key(ctx);
        self.with_connection(|connection| records_for_deployment(connection, &tenant, id))
    }

    async fn has_deployment_for_device(
        &self,
        ctx: &RequestContext,
        deployment_id: &DeploymentId,
        device_id: &DeviceId,
    ) -> Result<bool, StoreError> {
        let tenant = tenant_key(ctx);
        self.with_connection(|connection| {
            let found: Option<i64> = connection
                .query_row(
                    "SELECT 1 FROM device_deployments WHERE tenant_id = ?1 AND deployment_id = ?2 \
                     AND device_id = ?3",
                    params![tenant, deployment_id.as_str(), device_id.as_str()],
                    |row| row.get(0),
                )
                .optional()
                .map_err(|err| db_error(&err))?;
            Ok(found.is_some())
        })
    }

    async fn update_device_deployment_status(
        &self,
        ctx: &RequestContext,
        deployment_id: &DeploymentId,
        device_id: &DeviceId,
        state: &DeviceDeploymentState,
    ) -> Result<DeviceDeploymentStatus, StoreError> {
        let tenant = tenant_key(ctx);
        self.with_transaction(|tx| {
            let mut record = require_device_deployment(tx, &tenant, deployment_id, device_id)?;
            let old = record.status;
            record.status = state.status;
            record.substate.clone_from(&state.substate);
            record.finished = state.finished;
            update_device_deployment(tx, &tenant, &record)?;
            Ok(old)
        })
    }

    async fn assign_artifact(
        &self,
        ctx: &RequestContext,
        deployment_id: &DeploymentId,
        device_id: &DeviceId,
        device_type: &str,
        artifact: &Artifact,
    ) -> Result<(), StoreError> {
        let tenant = tenant_key(ctx);
        self.with_transaction(|tx| {
            let mut record = require_device_deployment(tx, &tenant, deployment_id, device_id)?;
            record.device_type = Some(device_type.to_string());
            record.artifact = Some(artifact.clone());
            update_device_deployment(tx, &tenant, &record)
        })
    }

    async fn abort_device_deployments(
        &self,
        ctx: &RequestContext,
        id: &DeploymentId,
        finished: OffsetDateTime,
    ) -> Result<(), StoreError> {
        let tenant = tenant_key(ctx);
        self.with_transaction(|tx| {
            for mut record in records_for_deployment(tx, &tenant, id)? {
                if record.status.is_active() {
                    record.status = DeviceDeploymentStatus::Aborted;
                    record.finished = Some(finished);
                    update_device_deployment(tx, &tenant, &record)?;
                }
            }
            Ok(())
        })
    }

    async fn decommission_device_deployments(
        &self,
        ctx: &RequestContext,
        device_id: &DeviceId,
        finished: OffsetDateTime,
    ) -> Result<Vec<DeploymentId>, StoreError> {
        let tenant = tenant_key(ctx);
        self.with_transaction(|tx| {
            let records: Vec<DeviceDeployment> = select_records(
                tx,
                "SELECT record_json FROM device_deployments WHERE tenant_id = ?1 AND device_id = \
                 ?2 ORDER BY deployment_id",
                params![tenant, device_id.as_str()],
            )?;
            let mut affected = BTreeSet::new();
            for mut record in records {
                if record.status.is_active() {
                    record.status = DeviceDeploymentStatus::Decommissioned;
                    record.finished = Some(finished);
                    update_device_deployment(tx, &tenant, &record)?;
                    affected.insert(record.deployment_id);
                }
            }
            Ok(affected.into_iter().collect())
        })
    }

    async fn aggregate_device_deployment_by_status(
        &self,
        ctx: &RequestContext,
        id: &DeploymentId,
    ) -> Result<Stats, StoreError> {
        let tenant = tenant_key(ctx);
        self.with_connection(|connection| {
            let mut statement = connection
                .prepare(
                    "SELECT status FROM device_deployments WHERE tenant_id = ?1 AND deployment_id \
                     = ?2",
                )
                .map_err(|err| db_error(&err))?;
            let rows = statement
                .query_map(params![tenant, id.as_str()], |row| row.get::<_, String>(0))
                .map_err(|err| db_error(&err))?;
            let mut statuses = Vec::new();
            for row in rows {
                let label = row.map_err(|err| db_error(&err))?;
                let status = label
                    .parse::<DeviceDeploymentStatus>()
                    .map_err(|err| SqliteStoreError::Corrupt(err.to_string()))?;
                statuses.push(status);
            }
            Stats::from_statuses(statuses).map_err(|err| SqliteStoreError::Corrupt(err.to_string()))
        })
    }

    async fn update_device_deployment_log_availability(
        &self,
        ctx: &RequestContext,
        deployment_id: &DeploymentId,
        device_id: &DeviceId,
        available: bool,
    ) -> Result<(), StoreError> {
        let tenant = tenant_key(ctx);
        self.with_transaction(|tx| {
            let mut record = require_device_deployment(tx, &tenant, deployment_id, device_id)?;
            record.is_log_available = available;
            update_device_deployment(tx, &tenant, &record)
        })
    }

    async fn save_device_deployment_log(
        &self,
        ctx: &RequestContext,
        log: &DeploymentLog,
    ) -> Result<(), StoreError> {
        let tenant = tenant_key(ctx);
        self.with_connection(|connection| {
            connection
                .execute(
                    "INSERT OR REPLACE INTO deployment_logs (tenant_id, deployment_id, device_id, \
                     log_json) VALUES (?1, ?2, ?3, ?4)",
                    params![
                        tenant,
                        log.deployment_id.as_str(),
                        log.device_id.as_str(),
                        encode(log)?
                    ],
                )
                .map_err(|err| db_error(&err))?;
            Ok(())
        })
    }

    async fn get_device_deployment_log(
        &self,
        ctx: &RequestContext,
        deployment_id: &DeploymentId,
        device_id: &DeviceId,
    ) -> Result<Option<DeploymentLog>, StoreError> {
        let tenant = tenant_key(ctx);
        self.with_connection(|connection| {
            let json: Option<Vec<u8>> = connection
                .query_row(
                    "SELECT log_json FROM deployment_logs WHERE tenant_id = ?1 AND deployment_id \
                     = ?2 AND device_id = ?3",
                    params![tenant, deployment_id.as_str(), device_id.as_str()],
                    |row| row.get(0),
                )
                .optional()
                .map_err(|err| db_error(&err))?;
            json.map(|json| decode(&json)).transpose()
        })
    }
}

// ============================================================================
// SECTION: Record Access
// ============================================================================

/// Loads a deployment.
fn load_deployment(
    connection: &Connection,
    tenant: &str,
    id: &DeploymentId,
) -> Result<Option<Deployment>, SqliteStoreError> {
    let json: Option<Vec<u8>> = connection
        .query_row(
            "SELECT record_json FROM deployments WHERE tenant_id = ?1 AND deployment_id = ?2",
            params![tenant, id.as_str()],
            |row| row.get(0),
        )
        .optional()
        .map_err(|err| db_error(&err))?;
    json.map(|json| decode(&json)).transpose()
}

/// Loads a deployment or reports it missing.
fn require_deployment(
    connection: &Connection,
    tenant: &str,
    id: &DeploymentId,
) -> Result<Deployment, SqliteStoreError> {
    load_deployment(connection, tenant, id)?
        .ok_or_else(|| SqliteStoreError::NotFound(format!("deployment {id}")))
}

/// Writes back a modified deployment.
fn update_deployment(
    connection: &Connection,
    tenant: &str,
    deployment: &Deployment,
) -> Result<(), SqliteStoreError> {
    connection
        .execute(
            "UPDATE deployments SET finished = ?3, record_json = ?4 WHERE tenant_id = ?1 AND \
             deployment_id = ?2",
            params![
                tenant,
                deployment.id.as_str(),
                deployment.finished.is_some(),
                encode(deployment)?
            ],
        )
        .map_err(|err| db_error(&err))?;
    Ok(())
}

/// Loads a device-deployment.
fn load_device_deployment(
    connection: &Connection,
    tenant: &str,
    deployment_id: &DeploymentId,
    device_id: &DeviceId,
) -> Result<Option<DeviceDeployment>, SqliteStoreError> {
    let json: Option<Vec<u8>> = connection
        .query_row(
            "SELECT record_json FROM device_deployments WHERE tenant_id = ?1 AND deployment_id = \
             ?2 AND device_id = ?3",
            params![tenant, deployment_id.as_str(), device_id.as_str()],
            |row| row.get(0),
        )
        .optional()
        .map_err(|err| db_error(&err))?;
    json.map(|json| decode(&json)).transpose()
}

/// Loads a device-deployment or reports it missing.
fn require_device_deployment(
    connection: &Connection,
    tenant: &str,
    deployment_id: &DeploymentId,
    device_id: &DeviceId,
) -> Result<DeviceDeployment, SqliteStoreError> {
    load_device_deployment(connection, tenant, deployment_id, device_id)?.ok_or_else(|| {
        SqliteStoreError::NotFound(format!("device deployment {deployment_id}/{device_id}"))
    })
}

/// Writes back a modified device-deployment.
fn update_device_deployment(
    connection: &Connection,
    tenant: &str,
    record: &DeviceDeployment,
) -> Result<(), SqliteStoreError> {
    connection
        .execute(
            "UPDATE device_deployments SET status = ?4, record_json = ?5 WHERE tenant_id = ?1 \
             AND deployment_id = ?2 AND device_id = ?3",
            params![
                tenant,
                record.deployment_id.as_str(),
                record.device_id.as_str(),
                record.status.as_str(),
                encode(record)?
            ],
        )
        .map_err(|err| db_error(&err))?;
    Ok(())
}

/// Lists the device-deployments of a deployment in device order.
fn records_for_deployment(
    connection: &Connection,
    tenant: &str,
    id: &DeploymentId,
) -> Result<Vec<DeviceDeployment>, SqliteStoreError> {
    select_records(
        connection,
        "SELECT record_json FROM device_deployments WHERE tenant_id = ?1 AND deployment_id = ?2 \
         ORDER BY device_id",
        params![tenant, id.as_str()],
    )
}

/// Runs a record query and decodes each row.
fn select_records<T: DeserializeOwned>(
    connection: &Connection,
    sql: &str,
    parameters: &[&dyn ToSql],
) -> Result<Vec<T>, SqliteStoreError> {
    let mut statement = connection.prepare(sql).map_err(|err| db_error(&err))?;
    let rows = statement
        .query_map(parameters, |row| row.get::<_, Vec<u8>>(0))
        .map_err(|err| db_error(&err))?;
    let mut records = Vec::new();
    for row in rows {
        let json = row.map_err(|err| db_error(&err))?;
        records.push(decode(&json)?);
    }
    Ok(records)
}

/// Serializes a record.
fn encode<T: Serialize>(record: &T) -> Result<Vec<u8>, SqliteStoreError> {
    serde_json::to_vec(record).map_err(|err| SqliteStoreError::Invalid(err.to_string()))
}

/// Deserializes a stored record.
fn decode<T: DeserializeOwned>(json: &[u8]) -> Result<T, SqliteStoreError> {
    serde_json::from_slice(json).map_err(|err| SqliteStoreError::Corrupt(err.to_string()))
}

/// Returns nanoseconds since the Unix epoch for ordering columns.
fn unix_nanos(instant: OffsetDateTime) -> Result<i64, SqliteStoreError> {
    i64::try_from(instant.unix_timestamp_nanos())
        .map_err(|_| SqliteStoreError::Invalid(format!("timestamp out of range: {instant}")))
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Ensures the parent directory for the store exists.
fn ensure_parent_dir(path: &Path) -> Result<(), SqliteStoreError> {
    let Some(parent) = path.parent() else {
        return Err(SqliteStoreError::Io("store path missing parent directory".to_string()));
    };
    if parent.as_os_str().is_empty() {
        return Ok(());
    }
    std::fs::create_dir_all(parent).map_err(|err| SqliteStoreError::Io(err.to_string()))
}

/// Validates store paths for safety limits.
fn validate_store_path(path: &Path) -> Result<(), SqliteStoreError> {
    if path.as_os_str().is_empty() {
        return Err(SqliteStoreError::Invalid("store path must not be empty".to_string()));
    }
    let path_string = path.display().to_string();
    if path_string.len() > MAX_TOTAL_PATH_LENGTH {
        return Err(SqliteStoreError::Invalid("store path exceeds length limit".to_string()));
    }
    for component in path.components() {
        let name = component.as_os_str().to_string_lossy();
        if name.len() > MAX_PATH_COMPONENT_LENGTH {
            return Err(SqliteStoreError::Invalid(
                "store path contains an overlong component".to_string(),
            ));
        }
    }
    if path.is_dir() {
        return Err(SqliteStoreError::Invalid(
            "store path must be a file, not a directory".to_string(),
        ));
    }
    Ok(())
}

/// Opens an `SQLite` connection with durable defaults.
fn open_connection(config: &SqliteStoreConfig) -> Result<Connection, SqliteStoreError> {
    let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
        | OpenFlags::SQLITE_OPEN_CREATE
        | OpenFlags::SQLITE_OPEN_FULL_MUTEX;
    let connection =
        Connection::open_with_flags(&config.path, flags).map_err(|err| db_error(&err))?;
    apply_pragmas(&connection, config)?;
    Ok(connection)
}

/// Applies `SQLite` pragmas required for durability.
fn apply_pragmas(
    connection: &Connection,
    config: &SqliteStoreConfig,
) -> Result<(), SqliteStoreError> {
    connection
        .execute_batch(&format!("PRAGMA journal_mode = {};", config.journal_mode.pragma_value()))
        .map_err(|err| db_error(&err))?;
    connection
        .execute_batch(&format!("PRAGMA synchronous = {};", config.sync_mode.pragma_value()))
        .map_err(|err| db_error(&err))?;
    connection
        .busy_timeout(std::time::Duration::from_millis(config.busy_timeout_ms))
        .map_err(|err| db_error(&err))?;
    Ok(())
}

/// Initializes the `SQLite` schema or validates the existing version.
fn initialize_schema(connection: &mut Connection) -> Result<(), SqliteStoreError> {
    let tx = connection.transaction().map_err(|err| db_error(&err))?;
    tx.execute_batch("CREATE TABLE IF NOT EXISTS store_meta (version INTEGER NOT NULL);")
        .map_err(|err| db_error(&err))?;
    let version: Option<i64> = tx
        .query_row("SELECT version FROM store_meta LIMIT 1", params![], |row| row.get(0))
        .optional()
        .map_err(|err| db_error(&err))?;
    match version {
        None => {
            tx.execute("INSERT INTO store_meta (version) VALUES (?1)", params![SCHEMA_VERSION])
                .map_err(|err| db_error(&err))?;
            tx.execute_batch(
                "CREATE TABLE IF NOT EXISTS deployments (
                    tenant_id TEXT NOT NULL,
                    deployment_id TEXT NOT NULL,
                    created_ns INTEGER NOT NULL,
                    finished INTEGER NOT NULL,
                    record_json BLOB NOT NULL,
                    PRIMARY KEY (tenant_id, deployment_id)
                );
                CREATE TABLE IF NOT EXISTS device_deployments (
                    tenant_id TEXT NOT NULL,
                    deployment_id TEXT NOT NULL,
                    device_id TEXT NOT NULL,
                    status TEXT NOT NULL,
                    created_ns INTEGER NOT NULL,
                    record_json BLOB NOT NULL,
                    PRIMARY KEY (tenant_id, deployment_id, device_id)
                );
                CREATE INDEX IF NOT EXISTS idx_device_deployments_device
                    ON device_deployments (tenant_id, device_id, created_ns);
                CREATE TABLE IF NOT EXISTS deployment_logs (
                    tenant_id TEXT NOT NULL,
                    deployment_id TEXT NOT NULL,
                    device_id TEXT NOT NULL,
                    log_json BLOB NOT NULL,
                    PRIMARY KEY (tenant_id, deployment_id, device_id)
                );",
            )
            .map_err(|err| db_error(&err))?;
        }
        Some(value) if value == SCHEMA_VERSION => {}
        Some(value) => {
            return Err(SqliteStoreError::VersionMismatch(format!(
                "unsupported schema version: {value}"
            )));
        }
    }
    tx.commit().map_err(|err| db_error(&err))?;
    Ok(())
}
