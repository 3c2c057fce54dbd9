// crates/flow-warden-store-sqlite/src/store.rs
// ============================================================================
// Module: SQLite Workflow Store
// Description: Durable WorkflowStore backed by SQLite WAL.
// Purpose: Persist tasks, events, snapshots, workers, intents, and costs.
// Dependencies: flow-warden-core, rusqlite, serde, serde_json, thiserror
// ============================================================================

//! ## Overview
//! This module implements a durable [`WorkflowStore`] using SQLite. The
//! schema is created idempotently at open. All multi-statement writes run
//! in one transaction; conditional flow updates implement the optimistic
//! lock as a `WHERE state_version = ?` predicate. Event payload digests
//! are verified on every read and loads fail closed on mismatch.
//!
//! Concurrency contract: exactly one writer at a time. A mutex serializes
//! access to the single connection; callers fetch everything a transaction
//! needs before invoking a composite write.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::path::PathBuf;
use std::sync::Mutex;
use std::sync::PoisonError;
use std::time::Duration;

use flow_warden_core::AuditRecord;
use flow_warden_core::AuditSeverity;
use flow_warden_core::CostDelta;
use flow_warden_core::EngineError;
use flow_warden_core::ErrorCode;
use flow_warden_core::FlowId;
use flow_warden_core::FlowState;
use flow_warden_core::FlowStatus;
use flow_warden_core::IntentId;
use flow_warden_core::IntentOperation;
use flow_warden_core::IntentRecord;
use flow_warden_core::IntentStatus;
use flow_warden_core::Phase;
use flow_warden_core::PhaseSnapshot;
use flow_warden_core::ScoreCard;
use flow_warden_core::WorkerId;
use flow_warden_core::WorkerRecord;
use flow_warden_core::WorkerState;
use flow_warden_core::WorkflowEvent;
use flow_warden_core::WorkflowStore;
use rusqlite::Connection;
use rusqlite::OpenFlags;
use rusqlite::OptionalExtension;
use rusqlite::Transaction;
use rusqlite::params;
use serde::Deserialize;
use thiserror::Error;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// SQLite schema version for the store.
pub const SCHEMA_VERSION: i64 = 1;
/// Default busy timeout (ms).
const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;

// ============================================================================
// SECTION: Config
// ============================================================================

/// SQLite journal mode configuration.
///
/// # Invariants
/// - Values map 1:1 to SQLite `journal_mode` pragma settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SqliteStoreMode {
    /// WAL journal mode (recommended).
    #[default]
    Wal,
    /// Delete journal mode (legacy).
    Delete,
}

impl SqliteStoreMode {
    /// Returns the SQLite pragma value.
    #[must_use]
    pub const fn pragma_value(self) -> &'static str {
        match self {
            Self::Wal => "wal",
            Self::Delete => "delete",
        }
    }
}

/// SQLite sync mode configuration.
///
/// # Invariants
/// - Values map 1:1 to SQLite `synchronous` pragma settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SqliteSyncMode {
    /// Full synchronous mode (safest).
    #[default]
    Full,
    /// Normal synchronous mode (balanced).
    Normal,
}

impl SqliteSyncMode {
    /// Returns the SQLite pragma value.
    #[must_use]
    pub const fn pragma_value(self) -> &'static str {
        match self {
            Self::Full => "full",
            Self::Normal => "normal",
        }
    }
}

/// Configuration for the SQLite workflow store.
///
/// # Invariants
/// - `path` must resolve to a file path (not a directory).
/// - `busy_timeout_ms` is interpreted as milliseconds.
#[derive(Debug, Clone, Deserialize)]
pub struct SqliteStoreConfig {
    /// Path to the SQLite database file.
    pub path: PathBuf,
    /// Busy timeout in milliseconds.
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
    /// SQLite journal mode.
    #[serde(default)]
    pub journal_mode: SqliteStoreMode,
    /// SQLite sync mode.
    #[serde(default)]
    pub sync_mode: SqliteSyncMode,
}

impl SqliteStoreConfig {
    /// Creates a config with defaults for the given database path.
    #[must_use]
    pub fn for_path(path: PathBuf) -> Self {
        Self {
            path,
            busy_timeout_ms: DEFAULT_BUSY_TIMEOUT_MS,
            journal_mode: SqliteStoreMode::default(),
            sync_mode: SqliteSyncMode::default(),
        }
    }
}

/// Returns the default busy timeout for SQLite connections.
const fn default_busy_timeout_ms() -> u64 {
    DEFAULT_BUSY_TIMEOUT_MS
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// SQLite store errors.
///
/// # Invariants
/// - Error messages avoid embedding raw payload contents.
#[derive(Debug, Error, Clone)]
pub enum SqliteStoreError {
    /// Store I/O error.
    #[error("sqlite store io error: {0}")]
    Io(String),
    /// SQLite engine error.
    #[error("sqlite store db error: {0}")]
    Db(String),
    /// Store corruption or hash mismatch.
    #[error("sqlite store corruption: {0}")]
    Corrupt(String),
    /// Store schema version mismatch.
    #[error("sqlite store version mismatch: {0}")]
    VersionMismatch(String),
    /// Invalid store data.
    #[error("sqlite store invalid data: {0}")]
    Invalid(String),
}

impl From<SqliteStoreError> for EngineError {
    fn from(error: SqliteStoreError) -> Self {
        match &error {
            SqliteStoreError::VersionMismatch(message) => {
                Self::new(ErrorCode::SchemaMigration, message.clone())
            }
            SqliteStoreError::Io(message)
            | SqliteStoreError::Db(message)
            | SqliteStoreError::Corrupt(message)
            | SqliteStoreError::Invalid(message) => {
                Self::new(ErrorCode::StoreWrite, message.clone())
            }
        }
    }
}

/// Maps an arbitrary rusqlite failure to a `store_write` engine error.
fn db_err(err: &rusqlite::Error) -> EngineError {
    EngineError::new(ErrorCode::StoreWrite, format!("sqlite failure: {err}"))
}

/// Returns true when the error is a uniqueness/constraint violation.
fn is_constraint_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(failure, _)
            if failure.code == rusqlite::ErrorCode::ConstraintViolation
    )
}

/// Maps a corrupt stored label to a `store_write` engine error.
fn corrupt(what: &str, label: &str) -> EngineError {
    EngineError::new(ErrorCode::StoreWrite, format!("corrupt stored {what}: {label}"))
}

// ============================================================================
// SECTION: Store
// ============================================================================

/// SQLite-backed workflow store with WAL support.
///
/// # Invariants
/// - Connection access is serialized through a mutex (single writer).
/// - Event payload digests are verified before rows are handed to callers.
pub struct SqliteWorkflowStore {
    /// Shared connection guarded by a mutex.
    connection: Mutex<Connection>,
}

impl SqliteWorkflowStore {
    /// Opens (or creates) the database and applies the schema idempotently.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError`] when the path is unusable, a pragma
    /// fails, or the stored schema version does not match.
    pub fn open(config: &SqliteStoreConfig) -> Result<Self, SqliteStoreError> {
        if config.path.is_dir() {
            return Err(SqliteStoreError::Invalid(format!(
                "database path is a directory: {}",
                config.path.display()
            )));
        }
        let flags = OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_CREATE;
        let connection = Connection::open_with_flags(&config.path, flags)
            .map_err(|err| SqliteStoreError::Io(err.to_string()))?;
        connection
            .busy_timeout(Duration::from_millis(config.busy_timeout_ms))
            .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
        connection
            .pragma_update(None, "journal_mode", config.journal_mode.pragma_value())
            .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
        connection
            .pragma_update(None, "synchronous", config.sync_mode.pragma_value())
            .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
        init_schema(&connection)?;
        Ok(Self { connection: Mutex::new(connection) })
    }

    /// Locks the connection, recovering from poisoned locks.
    fn lock(&self) -> std::sync::MutexGuard<'_, Connection> {
        self.connection.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

// ============================================================================
// SECTION: Schema
// ============================================================================

/// Creates all tables and indexes idempotently and pins the schema version.
fn init_schema(connection: &Connection) -> Result<(), SqliteStoreError> {
    connection
        .execute_batch(
            "CREATE TABLE IF NOT EXISTS schema_version (
                version INTEGER NOT NULL
            );
            CREATE TABLE IF NOT EXISTS tasks (
                task_id TEXT PRIMARY KEY,
                current_phase TEXT NOT NULL,
                status TEXT NOT NULL,
                state_version INTEGER NOT NULL,
                round INTEGER NOT NULL,
                budget_used REAL NOT NULL,
                budget_cap REAL NOT NULL,
                last_event_seq INTEGER NOT NULL,
                updated_at INTEGER NOT NULL
            );
            CREATE TABLE IF NOT EXISTS workflow_events (
                task_id TEXT NOT NULL,
                seq_no INTEGER NOT NULL,
                phase TEXT NOT NULL,
                event_type TEXT NOT NULL,
                payload_json TEXT NOT NULL,
                payload_hash TEXT NOT NULL,
                created_at INTEGER NOT NULL,
                PRIMARY KEY (task_id, seq_no)
            );
            CREATE TABLE IF NOT EXISTS phase_snapshots (
                snapshot_id INTEGER PRIMARY KEY AUTOINCREMENT,
                task_id TEXT NOT NULL,
                phase TEXT NOT NULL,
                round INTEGER NOT NULL,
                payload_json TEXT NOT NULL,
                created_at INTEGER NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_snapshots_task_phase
                ON phase_snapshots (task_id, phase, snapshot_id);
            CREATE TABLE IF NOT EXISTS workers (
                worker_id TEXT PRIMARY KEY,
                task_id TEXT NOT NULL,
                phase TEXT NOT NULL,
                role TEXT NOT NULL,
                state TEXT NOT NULL,
                file_ownership_json TEXT NOT NULL,
                soft_timeout_sec INTEGER NOT NULL,
                hard_timeout_sec INTEGER NOT NULL,
                last_heartbeat INTEGER NOT NULL,
                created_at INTEGER NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_workers_task ON workers (task_id);
            CREATE TABLE IF NOT EXISTS intent_logs (
                intent_id TEXT PRIMARY KEY,
                task_id TEXT NOT NULL,
                worker_id TEXT NOT NULL,
                target_file TEXT NOT NULL,
                operation TEXT NOT NULL,
                status TEXT NOT NULL,
                pre_hash TEXT NOT NULL,
                post_hash TEXT NOT NULL,
                payload_hash TEXT NOT NULL,
                lease_until INTEGER NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_intents_task_file
                ON intent_logs (task_id, target_file, status);
            CREATE TABLE IF NOT EXISTS audit_records (
                audit_id TEXT PRIMARY KEY,
                task_id TEXT NOT NULL,
                kind TEXT NOT NULL,
                severity TEXT NOT NULL,
                detail_json TEXT NOT NULL,
                created_at INTEGER NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_audit_task ON audit_records (task_id);
            CREATE TABLE IF NOT EXISTS score_cards (
                review_id TEXT PRIMARY KEY,
                task_id TEXT NOT NULL,
                reviewer TEXT NOT NULL,
                card_json TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_cards_task ON score_cards (task_id);
            CREATE TABLE IF NOT EXISTS cost_deltas (
                delta_id INTEGER PRIMARY KEY AUTOINCREMENT,
                task_id TEXT NOT NULL,
                input_tokens INTEGER NOT NULL,
                output_tokens INTEGER NOT NULL,
                amount_usd REAL NOT NULL,
                provider TEXT NOT NULL,
                phase TEXT,
                created_at INTEGER NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_deltas_task ON cost_deltas (task_id);",
        )
        .map_err(|err| SqliteStoreError::Db(err.to_string()))?;

    let stored: Option<i64> = connection
        .query_row("SELECT version FROM schema_version LIMIT 1", [], |row| row.get(0))
        .optional()
        .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
    match stored {
        None => {
            connection
                .execute("INSERT INTO schema_version (version) VALUES (?1)", params![
                    SCHEMA_VERSION
                ])
                .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
            Ok(())
        }
        Some(version) if version == SCHEMA_VERSION => Ok(()),
        Some(version) => Err(SqliteStoreError::VersionMismatch(format!(
            "stored schema version {version}, expected {SCHEMA_VERSION}"
        ))),
    }
}

// ============================================================================
// SECTION: Row Mapping
// ============================================================================

/// Raw task row as stored.
struct TaskRow {
    /// Task identifier column.
    task_id: String,
    /// Current phase label.
    current_phase: String,
    /// Status label.
    status: String,
    /// State version column.
    state_version: i64,
    /// Round column.
    round: i64,
    /// Accumulated budget column.
    budget_used: f64,
    /// Budget cap column.
    budget_cap: f64,
    /// Last event sequence column.
    last_event_seq: i64,
    /// Updated-at column.
    updated_at: i64,
}

impl TaskRow {
    /// Converts the raw row into a flow state, validating labels.
    fn into_state(self) -> Result<FlowState, EngineError> {
        Ok(FlowState {
            flow_id: FlowId::new(self.task_id),
            current_phase: Phase::parse(&self.current_phase)
                .ok_or_else(|| corrupt("phase", &self.current_phase))?,
            status: FlowStatus::parse(&self.status)
                .ok_or_else(|| corrupt("status", &self.status))?,
            state_version: u64::try_from(self.state_version)
                .map_err(|_| corrupt("state_version", &self.state_version.to_string()))?,
            round: u32::try_from(self.round)
                .map_err(|_| corrupt("round", &self.round.to_string()))?,
            budget_used: self.budget_used,
            budget_cap: self.budget_cap,
            last_event_seq: u64::try_from(self.last_event_seq)
                .map_err(|_| corrupt("last_event_seq", &self.last_event_seq.to_string()))?,
            updated_at: self.updated_at,
        })
    }
}

/// Binds the mutable columns of a task row from a flow state.
fn state_params(state: &FlowState) -> Result<(i64, i64, i64), EngineError> {
    let state_version = i64::try_from(state.state_version)
        .map_err(|_| corrupt("state_version", &state.state_version.to_string()))?;
    let round = i64::from(state.round);
    let last_event_seq = i64::try_from(state.last_event_seq)
        .map_err(|_| corrupt("last_event_seq", &state.last_event_seq.to_string()))?;
    Ok((state_version, round, last_event_seq))
}

/// Inserts an event inside an open transaction.
fn insert_event_tx(tx: &Transaction<'_>, event: &WorkflowEvent) -> Result<(), EngineError> {
    let seq_no = i64::try_from(event.seq_no)
        .map_err(|_| corrupt("seq_no", &event.seq_no.to_string()))?;
    let payload_json = serde_json::to_string(&event.payload)
        .map_err(|err| EngineError::new(ErrorCode::StoreWrite, err.to_string()))?;
    tx.execute(
        "INSERT INTO workflow_events
            (task_id, seq_no, phase, event_type, payload_json, payload_hash, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            event.flow_id.as_str(),
            seq_no,
            event.phase.as_str(),
            event.event_type,
            payload_json,
            event.payload_hash,
            event.created_at,
        ],
    )
    .map_err(|err| {
        if is_constraint_violation(&err) {
            EngineError::new(
                ErrorCode::DuplicateEvent,
                format!("event seq {} already exists for flow {}", event.seq_no, event.flow_id),
            )
        } else {
            db_err(&err)
        }
    })?;
    Ok(())
}

/// Inserts a snapshot inside an open transaction.
fn insert_snapshot_tx(tx: &Transaction<'_>, snapshot: &PhaseSnapshot) -> Result<(), EngineError> {
    let payload_json = serde_json::to_string(&snapshot.payload)
        .map_err(|err| EngineError::new(ErrorCode::StoreWrite, err.to_string()))?;
    tx.execute(
        "INSERT INTO phase_snapshots (task_id, phase, round, payload_json, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            snapshot.flow_id.as_str(),
            snapshot.phase.as_str(),
            i64::from(snapshot.round),
            payload_json,
            snapshot.created_at,
        ],
    )
    .map_err(|err| db_err(&err))?;
    Ok(())
}

/// Applies the conditional task update inside an open transaction.
fn update_task_tx(
    tx: &Transaction<'_>,
    expected_version: u64,
    state: &FlowState,
) -> Result<(), EngineError> {
    let (state_version, round, last_event_seq) = state_params(state)?;
    let expected = i64::try_from(expected_version)
        .map_err(|_| corrupt("expected_version", &expected_version.to_string()))?;
    let rows = tx
        .execute(
            "UPDATE tasks SET
                current_phase = ?1, status = ?2, state_version = ?3, round = ?4,
                budget_used = ?5, budget_cap = ?6, last_event_seq = ?7, updated_at = ?8
             WHERE task_id = ?9 AND state_version = ?10",
            params![
                state.current_phase.as_str(),
                state.status.as_str(),
                state_version,
                round,
                state.budget_used,
                state.budget_cap,
                last_event_seq,
                state.updated_at,
                state.flow_id.as_str(),
                expected,
            ],
        )
        .map_err(|err| db_err(&err))?;
    if rows == 1 {
        return Ok(());
    }
    let exists: Option<i64> = tx
        .query_row(
            "SELECT 1 FROM tasks WHERE task_id = ?1",
            params![state.flow_id.as_str()],
            |row| row.get(0),
        )
        .optional()
        .map_err(|err| db_err(&err))?;
    if exists.is_some() {
        Err(EngineError::new(
            ErrorCode::OptimisticLock,
            format!("flow {} version does not match expected {expected_version}", state.flow_id),
        ))
    } else {
        Err(EngineError::new(
            ErrorCode::FlowNotFound,
            format!("flow {} not found", state.flow_id),
        ))
    }
}

/// Decodes one event row, verifying the stored payload digest.
fn event_from_row(
    flow_id: &str,
    seq_no: i64,
    phase: String,
    event_type: String,
    payload_json: String,
    payload_hash: String,
    created_at: i64,
) -> Result<WorkflowEvent, EngineError> {
    let payload: serde_json::Value = serde_json::from_str(&payload_json)
        .map_err(|err| EngineError::new(ErrorCode::StoreWrite, err.to_string()))?;
    let event = WorkflowEvent {
        flow_id: FlowId::new(flow_id),
        seq_no: u64::try_from(seq_no).map_err(|_| corrupt("seq_no", &seq_no.to_string()))?,
        phase: Phase::parse(&phase).ok_or_else(|| corrupt("phase", &phase))?,
        event_type,
        payload,
        payload_hash,
        created_at,
    };
    if event.verify_payload_hash() {
        Ok(event)
    } else {
        Err(EngineError::new(
            ErrorCode::StoreWrite,
            format!("payload digest mismatch for event seq {} of flow {flow_id}", event.seq_no),
        ))
    }
}

// ============================================================================
// SECTION: WorkflowStore Implementation
// ============================================================================

impl WorkflowStore for SqliteWorkflowStore {
    fn insert_flow(
        &self,
        state: &FlowState,
        first_event: &WorkflowEvent,
    ) -> Result<(), EngineError> {
        let mut connection = self.lock();
        let tx = connection.transaction().map_err(|err| db_err(&err))?;
        let (state_version, round, last_event_seq) = state_params(state)?;
        tx.execute(
            "INSERT INTO tasks
                (task_id, current_phase, status, state_version, round,
                 budget_used, budget_cap, last_event_seq, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                state.flow_id.as_str(),
                state.current_phase.as_str(),
                state.status.as_str(),
                state_version,
                round,
                state.budget_used,
                state.budget_cap,
                last_event_seq,
                state.updated_at,
            ],
        )
        .map_err(|err| {
            if is_constraint_violation(&err) {
                EngineError::new(
                    ErrorCode::DuplicateTask,
                    format!("flow {} already exists", state.flow_id),
                )
            } else {
                db_err(&err)
            }
        })?;
        insert_event_tx(&tx, first_event)?;
        tx.commit().map_err(|err| db_err(&err))
    }

    fn get_flow(&self, flow_id: &FlowId) -> Result<FlowState, EngineError> {
        let connection = self.lock();
        let row = connection
            .query_row(
                "SELECT task_id, current_phase, status, state_version, round,
                        budget_used, budget_cap, last_event_seq, updated_at
                 FROM tasks WHERE task_id = ?1",
                params![flow_id.as_str()],
                |row| {
                    Ok(TaskRow {
                        task_id: row.get(0)?,
                        current_phase: row.get(1)?,
                        status: row.get(2)?,
                        state_version: row.get(3)?,
                        round: row.get(4)?,
                        budget_used: row.get(5)?,
                        budget_cap: row.get(6)?,
                        last_event_seq: row.get(7)?,
                        updated_at: row.get(8)?,
                    })
                },
            )
            .optional()
            .map_err(|err| db_err(&err))?;
        row.map_or_else(
            || {
                Err(EngineError::new(
                    ErrorCode::FlowNotFound,
                    format!("flow {flow_id} not found"),
                ))
            },
            TaskRow::into_state,
        )
    }

    fn update_flow(&self, expected_version: u64, state: &FlowState) -> Result<(), EngineError> {
        let mut connection = self.lock();
        let tx = connection.transaction().map_err(|err| db_err(&err))?;
        update_task_tx(&tx, expected_version, state)?;
        tx.commit().map_err(|err| db_err(&err))
    }

    fn commit_transition(
        &self,
        expected_version: u64,
        state: &FlowState,
        event: &WorkflowEvent,
        snapshot: &PhaseSnapshot,
    ) -> Result<(), EngineError> {
        let mut connection = self.lock();
        let tx = connection.transaction().map_err(|err| db_err(&err))?;
        update_task_tx(&tx, expected_version, state)?;
        insert_event_tx(&tx, event)?;
        insert_snapshot_tx(&tx, snapshot)?;
        tx.commit().map_err(|err| db_err(&err))
    }

    fn append_event(&self, event: &WorkflowEvent) -> Result<(), EngineError> {
        let mut connection = self.lock();
        let tx = connection.transaction().map_err(|err| db_err(&err))?;
        insert_event_tx(&tx, event)?;
        tx.commit().map_err(|err| db_err(&err))
    }

    fn list_events_since(
        &self,
        flow_id: &FlowId,
        since_seq: u64,
    ) -> Result<Vec<WorkflowEvent>, EngineError> {
        let connection = self.lock();
        let since = i64::try_from(since_seq).unwrap_or(i64::MAX);
        let mut statement = connection
            .prepare(
                "SELECT seq_no, phase, event_type, payload_json, payload_hash, created_at
                 FROM workflow_events
                 WHERE task_id = ?1 AND seq_no > ?2
                 ORDER BY seq_no ASC",
            )
            .map_err(|err| db_err(&err))?;
        let rows = statement
            .query_map(params![flow_id.as_str(), since], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, String>(4)?,
                    row.get::<_, i64>(5)?,
                ))
            })
            .map_err(|err| db_err(&err))?;
        let mut events = Vec::new();
        for row in rows {
            let (seq_no, phase, event_type, payload_json, payload_hash, created_at) =
                row.map_err(|err| db_err(&err))?;
            events.push(event_from_row(
                flow_id.as_str(),
                seq_no,
                phase,
                event_type,
                payload_json,
                payload_hash,
                created_at,
            )?);
        }
        Ok(events)
    }

    fn save_snapshot(&self, snapshot: &PhaseSnapshot) -> Result<(), EngineError> {
        let mut connection = self.lock();
        let tx = connection.transaction().map_err(|err| db_err(&err))?;
        insert_snapshot_tx(&tx, snapshot)?;
        tx.commit().map_err(|err| db_err(&err))
    }

    fn latest_snapshot(
        &self,
        flow_id: &FlowId,
        phase: Phase,
    ) -> Result<Option<PhaseSnapshot>, EngineError> {
        let connection = self.lock();
        let row = connection
            .query_row(
                "SELECT round, payload_json, created_at
                 FROM phase_snapshots
                 WHERE task_id = ?1 AND phase = ?2
                 ORDER BY snapshot_id DESC LIMIT 1",
                params![flow_id.as_str(), phase.as_str()],
                |row| {
                    Ok((
                        row.get::<_, i64>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, i64>(2)?,
                    ))
                },
            )
            .optional()
            .map_err(|err| db_err(&err))?;
        row.map(|(round, payload_json, created_at)| {
            let payload: serde_json::Value = serde_json::from_str(&payload_json)
                .map_err(|err| EngineError::new(ErrorCode::StoreWrite, err.to_string()))?;
            Ok(PhaseSnapshot {
                flow_id: flow_id.clone(),
                phase,
                round: u32::try_from(round).map_err(|_| corrupt("round", &round.to_string()))?,
                payload,
                created_at,
            })
        })
        .transpose()
    }

    fn insert_worker(&self, worker: &WorkerRecord) -> Result<(), EngineError> {
        let connection = self.lock();
        let ownership_json = serde_json::to_string(&worker.file_ownership)
            .map_err(|err| EngineError::new(ErrorCode::StoreWrite, err.to_string()))?;
        connection
            .execute(
                "INSERT INTO workers
                    (worker_id, task_id, phase, role, state, file_ownership_json,
                     soft_timeout_sec, hard_timeout_sec, last_heartbeat, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                params![
                    worker.worker_id.as_str(),
                    worker.flow_id.as_str(),
                    worker.phase.as_str(),
                    worker.role,
                    worker.state.as_str(),
                    ownership_json,
                    worker.soft_timeout_sec,
                    worker.hard_timeout_sec,
                    worker.last_heartbeat,
                    worker.created_at,
                ],
            )
            .map_err(|err| db_err(&err))?;
        Ok(())
    }

    fn get_worker(&self, worker_id: &WorkerId) -> Result<WorkerRecord, EngineError> {
        let connection = self.lock();
        let row = connection
            .query_row(
                "SELECT task_id, phase, role, state, file_ownership_json,
                        soft_timeout_sec, hard_timeout_sec, last_heartbeat, created_at
                 FROM workers WHERE worker_id = ?1",
                params![worker_id.as_str()],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, String>(3)?,
                        row.get::<_, String>(4)?,
                        row.get::<_, i64>(5)?,
                        row.get::<_, i64>(6)?,
                        row.get::<_, i64>(7)?,
                        row.get::<_, i64>(8)?,
                    ))
                },
            )
            .optional()
            .map_err(|err| db_err(&err))?;
        let Some((
            task_id,
            phase,
            role,
            state,
            ownership_json,
            soft_timeout_sec,
            hard_timeout_sec,
            last_heartbeat,
            created_at,
        )) = row
        else {
            return Err(EngineError::new(
                ErrorCode::WorkerNotFound,
                format!("worker {worker_id} not found"),
            ));
        };
        Ok(WorkerRecord {
            worker_id: worker_id.clone(),
            flow_id: FlowId::new(task_id),
            phase: Phase::parse(&phase).ok_or_else(|| corrupt("phase", &phase))?,
            role,
            state: WorkerState::parse(&state).ok_or_else(|| corrupt("worker state", &state))?,
            file_ownership: serde_json::from_str(&ownership_json)
                .map_err(|err| EngineError::new(ErrorCode::StoreWrite, err.to_string()))?,
            soft_timeout_sec,
            hard_timeout_sec,
            last_heartbeat,
            created_at,
        })
    }

    fn update_worker(&self, worker: &WorkerRecord) -> Result<(), EngineError> {
        let connection = self.lock();
        let ownership_json = serde_json::to_string(&worker.file_ownership)
            .map_err(|err| EngineError::new(ErrorCode::StoreWrite, err.to_string()))?;
        let rows = connection
            .execute(
                "UPDATE workers SET
                    task_id = ?1, phase = ?2, role = ?3, state = ?4,
                    file_ownership_json = ?5, soft_timeout_sec = ?6,
                    hard_timeout_sec = ?7, last_heartbeat = ?8, created_at = ?9
                 WHERE worker_id = ?10",
                params![
                    worker.flow_id.as_str(),
                    worker.phase.as_str(),
                    worker.role,
                    worker.state.as_str(),
                    ownership_json,
                    worker.soft_timeout_sec,
                    worker.hard_timeout_sec,
                    worker.last_heartbeat,
                    worker.created_at,
                    worker.worker_id.as_str(),
                ],
            )
            .map_err(|err| db_err(&err))?;
        if rows == 1 {
            Ok(())
        } else {
            Err(EngineError::new(
                ErrorCode::WorkerNotFound,
                format!("worker {} not found", worker.worker_id),
            ))
        }
    }

    fn list_workers(&self, flow_id: &FlowId) -> Result<Vec<WorkerRecord>, EngineError> {
        let connection = self.lock();
        let mut statement = connection
            .prepare(
                "SELECT worker_id, phase, role, state, file_ownership_json,
                        soft_timeout_sec, hard_timeout_sec, last_heartbeat, created_at
                 FROM workers WHERE task_id = ?1 ORDER BY rowid ASC",
            )
            .map_err(|err| db_err(&err))?;
        let rows = statement
            .query_map(params![flow_id.as_str()], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, String>(4)?,
                    row.get::<_, i64>(5)?,
                    row.get::<_, i64>(6)?,
                    row.get::<_, i64>(7)?,
                    row.get::<_, i64>(8)?,
                ))
            })
            .map_err(|err| db_err(&err))?;
        let mut workers = Vec::new();
        for row in rows {
            let (
                worker_id,
                phase,
                role,
                state,
                ownership_json,
                soft_timeout_sec,
                hard_timeout_sec,
                last_heartbeat,
                created_at,
            ) = row.map_err(|err| db_err(&err))?;
            workers.push(WorkerRecord {
                worker_id: WorkerId::new(worker_id),
                flow_id: flow_id.clone(),
                phase: Phase::parse(&phase).ok_or_else(|| corrupt("phase", &phase))?,
                role,
                state: WorkerState::parse(&state)
                    .ok_or_else(|| corrupt("worker state", &state))?,
                file_ownership: serde_json::from_str(&ownership_json)
                    .map_err(|err| EngineError::new(ErrorCode::StoreWrite, err.to_string()))?,
                soft_timeout_sec,
                hard_timeout_sec,
                last_heartbeat,
                created_at,
            });
        }
        Ok(workers)
    }

    fn upsert_intent(&self, intent: &IntentRecord) -> Result<(), EngineError> {
        let mut connection = self.lock();
        let tx = connection.transaction().map_err(|err| db_err(&err))?;
        tx.execute(
            "INSERT INTO intent_logs
                (intent_id, task_id, worker_id, target_file, operation, status,
                 pre_hash, post_hash, payload_hash, lease_until)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
             ON CONFLICT(intent_id) DO UPDATE SET
                task_id = excluded.task_id,
                worker_id = excluded.worker_id,
                target_file = excluded.target_file,
                operation = excluded.operation,
                status = excluded.status,
                pre_hash = excluded.pre_hash,
                post_hash = excluded.post_hash,
                payload_hash = excluded.payload_hash,
                lease_until = excluded.lease_until",
            params![
                intent.intent_id.as_str(),
                intent.flow_id.as_str(),
                intent.worker_id.as_str(),
                intent.target_file,
                intent.operation.as_str(),
                intent.status.as_str(),
                intent.pre_hash,
                intent.post_hash,
                intent.payload_hash,
                intent.lease_until,
            ],
        )
        .map_err(|err| db_err(&err))?;
        tx.commit().map_err(|err| db_err(&err))
    }

    fn get_intent(&self, intent_id: &IntentId) -> Result<IntentRecord, EngineError> {
        let connection = self.lock();
        let row = connection
            .query_row(
                "SELECT task_id, worker_id, target_file, operation, status,
                        pre_hash, post_hash, payload_hash, lease_until
                 FROM intent_logs WHERE intent_id = ?1",
                params![intent_id.as_str()],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, String>(3)?,
                        row.get::<_, String>(4)?,
                        row.get::<_, String>(5)?,
                        row.get::<_, String>(6)?,
                        row.get::<_, String>(7)?,
                        row.get::<_, i64>(8)?,
                    ))
                },
            )
            .optional()
            .map_err(|err| db_err(&err))?;
        let Some((
            task_id,
            worker_id,
            target_file,
            operation,
            status,
            pre_hash,
            post_hash,
            payload_hash,
            lease_until,
        )) = row
        else {
            return Err(EngineError::new(
                ErrorCode::IntentNotFound,
                format!("intent {intent_id} not found"),
            ));
        };
        Ok(IntentRecord {
            intent_id: intent_id.clone(),
            flow_id: FlowId::new(task_id),
            worker_id: WorkerId::new(worker_id),
            target_file,
            operation: IntentOperation::parse(&operation)
                .ok_or_else(|| corrupt("operation", &operation))?,
            status: IntentStatus::parse(&status)
                .ok_or_else(|| corrupt("intent status", &status))?,
            pre_hash,
            post_hash,
            payload_hash,
            lease_until,
        })
    }

    fn find_active_by_file(
        &self,
        flow_id: &FlowId,
        target_file: &str,
    ) -> Result<Vec<IntentRecord>, EngineError> {
        list_intents_where(
            &self.lock(),
            "task_id = ?1 AND target_file = ?2 AND status IN ('pending', 'running')",
            params![flow_id.as_str(), target_file],
        )
    }

    fn list_active_intents(&self, flow_id: &FlowId) -> Result<Vec<IntentRecord>, EngineError> {
        list_intents_where(
            &self.lock(),
            "task_id = ?1 AND status IN ('pending', 'running')",
            params![flow_id.as_str()],
        )
    }

    fn mark_intent_done(&self, intent_id: &IntentId, post_hash: &str) -> Result<(), EngineError> {
        let mut connection = self.lock();
        let tx = connection.transaction().map_err(|err| db_err(&err))?;
        let rows = tx
            .execute(
                "UPDATE intent_logs SET status = 'done', post_hash = ?1 WHERE intent_id = ?2",
                params![post_hash, intent_id.as_str()],
            )
            .map_err(|err| db_err(&err))?;
        if rows != 1 {
            return Err(EngineError::new(
                ErrorCode::IntentNotFound,
                format!("intent {intent_id} not found"),
            ));
        }
        tx.commit().map_err(|err| db_err(&err))
    }

    fn record_audit(&self, record: &AuditRecord) -> Result<(), EngineError> {
        let connection = self.lock();
        let detail_json = serde_json::to_string(&record.detail)
            .map_err(|err| EngineError::new(ErrorCode::StoreWrite, err.to_string()))?;
        connection
            .execute(
                "INSERT INTO audit_records
                    (audit_id, task_id, kind, severity, detail_json, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    record.audit_id,
                    record.flow_id.as_str(),
                    record.kind,
                    record.severity.as_str(),
                    detail_json,
                    record.created_at,
                ],
            )
            .map_err(|err| db_err(&err))?;
        Ok(())
    }

    fn list_audit(&self, flow_id: &FlowId) -> Result<Vec<AuditRecord>, EngineError> {
        let connection = self.lock();
        let mut statement = connection
            .prepare(
                "SELECT audit_id, kind, severity, detail_json, created_at
                 FROM audit_records WHERE task_id = ?1 ORDER BY rowid ASC",
            )
            .map_err(|err| db_err(&err))?;
        let rows = statement
            .query_map(params![flow_id.as_str()], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, i64>(4)?,
                ))
            })
            .map_err(|err| db_err(&err))?;
        let mut records = Vec::new();
        for row in rows {
            let (audit_id, kind, severity, detail_json, created_at) =
                row.map_err(|err| db_err(&err))?;
            records.push(AuditRecord {
                audit_id,
                flow_id: flow_id.clone(),
                kind,
                severity: AuditSeverity::parse(&severity)
                    .ok_or_else(|| corrupt("severity", &severity))?,
                detail: serde_json::from_str(&detail_json)
                    .map_err(|err| EngineError::new(ErrorCode::StoreWrite, err.to_string()))?,
                created_at,
            });
        }
        Ok(records)
    }

    fn insert_score_card(&self, flow_id: &FlowId, card: &ScoreCard) -> Result<(), EngineError> {
        let connection = self.lock();
        let card_json = serde_json::to_string(card)
            .map_err(|err| EngineError::new(ErrorCode::StoreWrite, err.to_string()))?;
        connection
            .execute(
                "INSERT INTO score_cards (review_id, task_id, reviewer, card_json)
                 VALUES (?1, ?2, ?3, ?4)",
                params![card.review_id.as_str(), flow_id.as_str(), card.reviewer, card_json],
            )
            .map_err(|err| db_err(&err))?;
        Ok(())
    }

    fn list_score_cards(&self, flow_id: &FlowId) -> Result<Vec<ScoreCard>, EngineError> {
        let connection = self.lock();
        let mut statement = connection
            .prepare(
                "SELECT card_json FROM score_cards WHERE task_id = ?1 ORDER BY rowid ASC",
            )
            .map_err(|err| db_err(&err))?;
        let rows = statement
            .query_map(params![flow_id.as_str()], |row| row.get::<_, String>(0))
            .map_err(|err| db_err(&err))?;
        let mut cards = Vec::new();
        for row in rows {
            let card_json = row.map_err(|err| db_err(&err))?;
            cards.push(
                serde_json::from_str::<ScoreCard>(&card_json)
                    .map_err(|err| EngineError::new(ErrorCode::StoreWrite, err.to_string()))?,
            );
        }
        Ok(cards)
    }

    fn insert_cost_delta(&self, delta: &CostDelta) -> Result<(), EngineError> {
        let connection = self.lock();
        let input_tokens = i64::try_from(delta.input_tokens)
            .map_err(|_| corrupt("input_tokens", &delta.input_tokens.to_string()))?;
        let output_tokens = i64::try_from(delta.output_tokens)
            .map_err(|_| corrupt("output_tokens", &delta.output_tokens.to_string()))?;
        connection
            .execute(
                "INSERT INTO cost_deltas
                    (task_id, input_tokens, output_tokens, amount_usd, provider, phase,
                     created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    delta.flow_id.as_str(),
                    input_tokens,
                    output_tokens,
                    delta.amount_usd,
                    delta.provider,
                    delta.phase.map(Phase::as_str),
                    delta.created_at,
                ],
            )
            .map_err(|err| db_err(&err))?;
        Ok(())
    }

    fn list_cost_deltas(&self, flow_id: &FlowId) -> Result<Vec<CostDelta>, EngineError> {
        let connection = self.lock();
        let mut statement = connection
            .prepare(
                "SELECT input_tokens, output_tokens, amount_usd, provider, phase, created_at
                 FROM cost_deltas WHERE task_id = ?1 ORDER BY delta_id ASC",
            )
            .map_err(|err| db_err(&err))?;
        let rows = statement
            .query_map(params![flow_id.as_str()], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, i64>(1)?,
                    row.get::<_, f64>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, Option<String>>(4)?,
                    row.get::<_, i64>(5)?,
                ))
            })
            .map_err(|err| db_err(&err))?;
        let mut deltas = Vec::new();
        for row in rows {
            let (input_tokens, output_tokens, amount_usd, provider, phase, created_at) =
                row.map_err(|err| db_err(&err))?;
            let phase = match phase {
                None => None,
                Some(label) => {
                    Some(Phase::parse(&label).ok_or_else(|| corrupt("phase", &label))?)
                }
            };
            deltas.push(CostDelta {
                flow_id: flow_id.clone(),
                input_tokens: u64::try_from(input_tokens)
                    .map_err(|_| corrupt("input_tokens", &input_tokens.to_string()))?,
                output_tokens: u64::try_from(output_tokens)
                    .map_err(|_| corrupt("output_tokens", &output_tokens.to_string()))?,
                amount_usd,
                provider,
                phase,
                created_at,
            });
        }
        Ok(deltas)
    }
}

// ============================================================================
// SECTION: Intent Query Helper
// ============================================================================

/// Lists intents matching a where-clause over the intent columns.
fn list_intents_where(
    connection: &Connection,
    where_clause: &str,
    bindings: &[&dyn rusqlite::ToSql],
) -> Result<Vec<IntentRecord>, EngineError> {
    let sql = format!(
        "SELECT intent_id, task_id, worker_id, target_file, operation, status,
                pre_hash, post_hash, payload_hash, lease_until
         FROM intent_logs WHERE {where_clause} ORDER BY rowid ASC"
    );
    let mut statement = connection.prepare(&sql).map_err(|err| db_err(&err))?;
    let rows = statement
        .query_map(bindings, |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, String>(4)?,
                row.get::<_, String>(5)?,
                row.get::<_, String>(6)?,
                row.get::<_, String>(7)?,
                row.get::<_, String>(8)?,
                row.get::<_, i64>(9)?,
            ))
        })
        .map_err(|err| db_err(&err))?;
    let mut intents = Vec::new();
    for row in rows {
        let (
            intent_id,
            task_id,
            worker_id,
            target_file,
            operation,
            status,
            pre_hash,
            post_hash,
            payload_hash,
            lease_until,
        ) = row.map_err(|err| db_err(&err))?;
        intents.push(IntentRecord {
            intent_id: IntentId::new(intent_id),
            flow_id: FlowId::new(task_id),
            worker_id: WorkerId::new(worker_id),
            target_file,
            operation: IntentOperation::parse(&operation)
                .ok_or_else(|| corrupt("operation", &operation))?,
            status: IntentStatus::parse(&status)
                .ok_or_else(|| corrupt("intent status", &status))?,
            pre_hash,
            post_hash,
            payload_hash,
            lease_until,
        });
    }
    Ok(intents)
}
