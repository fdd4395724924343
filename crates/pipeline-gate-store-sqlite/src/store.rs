// crates/pipeline-gate-store-sqlite/src/store.rs
// ============================================================================
// Module: SQLite Gate Store
// Description: Durable evidence, run, and audit stores backed by SQLite WAL.
// Purpose: Persist gate state with hashed rows and a verifiable audit chain.
// Dependencies: pipeline-gate-core, rusqlite, serde, serde_json, thiserror
// ============================================================================

//! ## Overview
//! This module implements [`EvidenceStore`], [`RunStore`], and [`AuditLog`]
//! over one `SQLite` database. Every row stores canonical JSON alongside its
//! hash; loads recompute the hash and fail closed on mismatch. Audit entries
//! additionally carry the chain hash, so any edit to the table is detected on
//! read and by [`SqliteGateStore::verify_audit_chain`].
//!
//! Writes run inside a transaction on a single mutex-guarded connection,
//! which serializes sequence assignment for evidence and audit entries.
//! Security posture: database contents are untrusted on load.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::MutexGuard;
use std::time::Duration;
use std::time::SystemTime;
use std::time::UNIX_EPOCH;

use pipeline_gate_core::AppendReceipt;
use pipeline_gate_core::AuditEntry;
use pipeline_gate_core::AuditError;
use pipeline_gate_core::AuditLog;
use pipeline_gate_core::AuditRecord;
use pipeline_gate_core::DEFAULT_HASH_ALGORITHM;
use pipeline_gate_core::Evidence;
use pipeline_gate_core::EvidenceDraft;
use pipeline_gate_core::EvidenceId;
use pipeline_gate_core::EvidenceKind;
use pipeline_gate_core::EvidenceSnapshot;
use pipeline_gate_core::EvidenceStore;
use pipeline_gate_core::HashAlgorithm;
use pipeline_gate_core::HashDigest;
use pipeline_gate_core::PipelineRun;
use pipeline_gate_core::RunId;
use pipeline_gate_core::RunStore;
use pipeline_gate_core::StoreError;
use pipeline_gate_core::Timestamp;
use pipeline_gate_core::hashing::canonical_json_bytes;
use pipeline_gate_core::hashing::hash_bytes;
use pipeline_gate_core::runtime::audit::entry_hash;
use pipeline_gate_core::runtime::chain_entry;
use pipeline_gate_core::runtime::verify_chain;
use rusqlite::Connection;
use rusqlite::OpenFlags;
use rusqlite::OptionalExtension;
use rusqlite::Transaction;
use rusqlite::params;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use thiserror::Error;

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
/// Maximum serialized size of any stored row payload.
pub const MAX_RECORD_BYTES: usize = 1024 * 1024;

// ============================================================================
// SECTION: Config
// ============================================================================

/// `SQLite` journal mode configuration.
///
/// # Invariants
/// - Values map 1:1 to `SQLite` `journal_mode` pragma settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SqliteStoreMode {
    /// WAL journal mode (recommended).
    #[default]
    Wal,
    /// Delete journal mode.
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
    /// Returns the `SQLite` pragma value.
    #[must_use]
    pub const fn pragma_value(self) -> &'static str {
        match self {
            Self::Full => "full",
            Self::Normal => "normal",
        }
    }
}

/// Configuration for the `SQLite` gate store.
///
/// # Invariants
/// - `path` must resolve to a file path (not a directory).
/// - `busy_timeout_ms` is interpreted as milliseconds.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
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
    /// Creates a config for `path` with default pragmas.
    #[must_use]
    pub const fn new(path: PathBuf) -> Self {
        Self {
            path,
            busy_timeout_ms: DEFAULT_BUSY_TIMEOUT_MS,
            journal_mode: SqliteStoreMode::Wal,
            sync_mode: SqliteSyncMode::Full,
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
///
/// # Invariants
/// - Error messages avoid embedding raw stored payloads.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SqliteStoreError {
    /// Store I/O error.
    #[error("sqlite store io error: {0}")]
    Io(String),
    /// `SQLite` engine error.
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
    /// Payload exceeded the row size limit.
    #[error("sqlite store payload too large: {actual_bytes} bytes (max {max_bytes})")]
    TooLarge {
        /// Maximum allowed bytes.
        max_bytes: usize,
        /// Actual payload size in bytes.
        actual_bytes: usize,
    },
    /// Write conflicts with an existing row.
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
            SqliteStoreError::TooLarge {
                max_bytes,
                actual_bytes,
            } => Self::Invalid(format!(
                "record exceeds size limit: {actual_bytes} bytes (max {max_bytes})"
            )),
            SqliteStoreError::Conflict(message) => Self::Conflict(message),
        }
    }
}

impl From<SqliteStoreError> for AuditError {
    fn from(error: SqliteStoreError) -> Self {
        Self::Storage(error.to_string())
    }
}

/// Maps a `rusqlite` error into a store error.
#[allow(clippy::needless_pass_by_value, reason = "Used directly as a map_err callback.")]
fn db_error(err: rusqlite::Error) -> SqliteStoreError {
    SqliteStoreError::Db(err.to_string())
}

// ============================================================================
// SECTION: Store
// ============================================================================

/// `SQLite`-backed evidence, run, and audit store.
///
/// Clones share one connection, so a single handle can back every
/// persistence slot of a gate controller.
#[derive(Debug, Clone)]
pub struct SqliteGateStore {
    /// Store configuration.
    config: SqliteStoreConfig,
    /// Shared connection guarded for serialized access.
    connection: Arc<Mutex<Connection>>,
}

impl SqliteGateStore {
    /// Opens (or creates) a store at the configured path.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError`] when the path is invalid, the database
    /// cannot be opened, or its schema version is unsupported.
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

    /// Verifies the full audit chain, returning the number of entries.
    ///
    /// # Errors
    ///
    /// Returns [`AuditError::ChainBroken`] at the first invalid entry, or
    /// [`AuditError::Storage`] when rows cannot be read.
    pub fn verify_audit_chain(&self) -> Result<u64, AuditError> {
        let entries = self.audit_entries(0, None, None)?;
        verify_chain(&entries)?;
        Ok(entries.last().map_or(0, |entry| entry.seq))
    }

    /// Locks the shared connection.
    fn lock(&self) -> Result<MutexGuard<'_, Connection>, SqliteStoreError> {
        self.connection
            .lock()
            .map_err(|_| SqliteStoreError::Db("sqlite connection mutex poisoned".to_string()))
    }

    /// Appends an evidence draft inside one transaction.
    fn append_evidence(&self, draft: EvidenceDraft) -> Result<AppendReceipt, SqliteStoreError> {
        let run_id = draft.subject.run_id.clone();
        let timestamp = to_i64(draft.timestamp.get(), "timestamp")?;
        let mut guard = self.lock()?;
        let tx = guard.transaction().map_err(db_error)?;
        let existing: Option<(i64, String)> = tx
            .query_row(
                "SELECT seq, content_hash FROM evidence WHERE run_id = ?1 AND kind = ?2 AND \
                 source = ?3 AND timestamp = ?4",
                params![run_id.as_str(), draft.kind.as_str(), draft.source.as_str(), timestamp],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()
            .map_err(db_error)?;
        if let Some((seq, content_hash)) = existing {
            let evidence_id = EvidenceId::new(run_id, to_u64(seq, "seq")?);
            if content_hash != draft.content_hash.value {
                return Err(SqliteStoreError::Conflict(format!(
                    "evidence {evidence_id} already recorded with different content"
                )));
            }
            return Ok(AppendReceipt {
                evidence_id,
                duplicate: true,
            });
        }
        let last: i64 = tx
            .query_row(
                "SELECT COALESCE(MAX(seq), 0) FROM evidence WHERE run_id = ?1",
                params![run_id.as_str()],
                |row| row.get(0),
            )
            .map_err(db_error)?;
        let seq = to_u64(last, "seq")?
            .checked_add(1)
            .ok_or_else(|| SqliteStoreError::Invalid("evidence sequence overflow".to_string()))?;
        let record = Evidence::from_draft(draft, seq);
        let (record_json, digest) = encode(&record)?;
        tx.execute(
            "INSERT INTO evidence (run_id, seq, kind, source, timestamp, content_hash, \
             record_json, record_hash, hash_algorithm) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                run_id.as_str(),
                to_i64(seq, "seq")?,
                record.kind.as_str(),
                record.source.as_str(),
                timestamp,
                record.content_hash.value,
                record_json,
                digest.value,
                digest.algorithm.label(),
            ],
        )
        .map_err(db_error)?;
        tx.commit().map_err(db_error)?;
        drop(guard);
        Ok(AppendReceipt {
            evidence_id: record.id,
            duplicate: false,
        })
    }

    /// Loads and verifies every evidence row for a run in sequence order.
    fn load_evidence(&self, run_id: &RunId) -> Result<Vec<Evidence>, SqliteStoreError> {
        let guard = self.lock()?;
        let rows = {
            let mut stmt = guard
                .prepare(
                    "SELECT seq, record_json, record_hash, hash_algorithm FROM evidence WHERE \
                     run_id = ?1 ORDER BY seq",
                )
                .map_err(db_error)?;
            let rows = stmt
                .query_map(params![run_id.as_str()], |row| {
                    Ok((row.get::<_, i64>(0)?, map_stored_row(row, 1)?))
                })
                .map_err(db_error)?;
            rows.collect::<Result<Vec<_>, _>>().map_err(db_error)?
        };
        drop(guard);
        let mut records = Vec::with_capacity(rows.len());
        for (seq, stored) in rows {
            let label = format!("evidence {run_id}#{seq}");
            let record: Evidence = stored.decode(&label)?;
            if record.id.run_id != *run_id || record.seq() != to_u64(seq, "seq")? {
                return Err(SqliteStoreError::Invalid(format!(
                    "{label} key does not match payload"
                )));
            }
            records.push(record);
        }
        Ok(records)
    }

    /// Loads and verifies a run state row.
    fn load_run(&self, run_id: &RunId) -> Result<Option<PipelineRun>, SqliteStoreError> {
        let guard = self.lock()?;
        let stored = guard
            .query_row(
                "SELECT state_json, state_hash, hash_algorithm FROM runs WHERE run_id = ?1",
                params![run_id.as_str()],
                |row| map_stored_row(row, 0),
            )
            .optional()
            .map_err(db_error)?;
        drop(guard);
        let Some(stored) = stored else {
            return Ok(None);
        };
        let run: PipelineRun = stored.decode(&format!("run {run_id}"))?;
        if run.run_id != *run_id {
            return Err(SqliteStoreError::Invalid(
                "run_id mismatch between key and payload".to_string(),
            ));
        }
        Ok(Some(run))
    }

    /// Writes a run state row, optionally refusing to replace an existing run.
    fn write_run(&self, run: &PipelineRun, replace: bool) -> Result<(), SqliteStoreError> {
        let (state_json, digest) = encode(run)?;
        let mut guard = self.lock()?;
        let tx = guard.transaction().map_err(db_error)?;
        if !replace {
            let exists: Option<i64> = tx
                .query_row(
                    "SELECT 1 FROM runs WHERE run_id = ?1",
                    params![run.run_id.as_str()],
                    |row| row.get(0),
                )
                .optional()
                .map_err(db_error)?;
            if exists.is_some() {
                return Err(SqliteStoreError::Conflict(format!(
                    "run {} already exists",
                    run.run_id
                )));
            }
        }
        tx.execute(
            "INSERT INTO runs (run_id, state_json, state_hash, hash_algorithm, saved_at) VALUES \
             (?1, ?2, ?3, ?4, ?5) ON CONFLICT(run_id) DO UPDATE SET state_json = \
             excluded.state_json, state_hash = excluded.state_hash, hash_algorithm = \
             excluded.hash_algorithm, saved_at = excluded.saved_at",
            params![
                run.run_id.as_str(),
                state_json,
                digest.value,
                digest.algorithm.label(),
                unix_millis(),
            ],
        )
        .map_err(db_error)?;
        tx.commit().map_err(db_error)?;
        drop(guard);
        Ok(())
    }

    /// Appends an audit record, chaining it to the current tail.
    fn append_audit(&self, record: AuditRecord) -> Result<AuditEntry, AuditError> {
        let mut guard = self.lock()?;
        let tx = guard.transaction().map_err(db_error)?;
        let tail = audit_tail(&tx)?;
        let (seq, prev_hash) = match tail {
            Some((seq, hash)) => (seq + 1, Some(hash)),
            None => (1, None),
        };
        let entry = chain_entry(seq, prev_hash, record)?;
        let (entry_json, _) = encode(&entry)?;
        tx.execute(
            "INSERT INTO audit_log (seq, run_id, entry_json, entry_hash, hash_algorithm) VALUES \
             (?1, ?2, ?3, ?4, ?5)",
            params![
                to_i64(entry.seq, "seq")?,
                entry.record.run_id().as_str(),
                entry_json,
                entry.entry_hash.value,
                entry.entry_hash.algorithm.label(),
            ],
        )
        .map_err(db_error)?;
        tx.commit().map_err(db_error)?;
        drop(guard);
        Ok(entry)
    }

    /// Loads audit entries with `seq > after`, optionally by run and count.
    fn audit_entries(
        &self,
        after: u64,
        run_id: Option<&RunId>,
        limit: Option<usize>,
    ) -> Result<Vec<AuditEntry>, SqliteStoreError> {
        let after = to_i64(after, "after")?;
        let limit = limit.map_or(-1, |limit| i64::try_from(limit).unwrap_or(i64::MAX));
        let guard = self.lock()?;
        let rows = {
            let mut stmt = guard
                .prepare(
                    "SELECT seq, entry_json, entry_hash, hash_algorithm FROM audit_log WHERE seq \
                     > ?1 AND (?2 IS NULL OR run_id = ?2) ORDER BY seq LIMIT ?3",
                )
                .map_err(db_error)?;
            let rows = stmt
                .query_map(params![after, run_id.map(RunId::as_str), limit], |row| {
                    Ok((row.get::<_, i64>(0)?, row.get::<_, Vec<u8>>(1)?, row.get(2)?, row.get(3)?))
                })
                .map_err(db_error)?;
            rows.collect::<Result<Vec<(i64, Vec<u8>, String, String)>, _>>().map_err(db_error)?
        };
        drop(guard);
        rows.into_iter()
            .map(|(seq, bytes, hash_value, algorithm)| {
                decode_audit_entry(to_u64(seq, "seq")?, &bytes, &hash_value, &algorithm)
            })
            .collect()
    }
}

// ============================================================================
// SECTION: Trait Implementations
// ============================================================================

impl EvidenceStore for SqliteGateStore {
    fn append(&self, draft: EvidenceDraft) -> Result<AppendReceipt, StoreError> {
        Ok(self.append_evidence(draft)?)
    }

    fn query(
        &self,
        run_id: &RunId,
        kind: Option<EvidenceKind>,
        as_of: Option<Timestamp>,
    ) -> Result<Vec<Evidence>, StoreError> {
        let snapshot = self.snapshot(run_id)?;
        Ok(snapshot.query(kind, as_of).into_iter().cloned().collect())
    }

    fn snapshot(&self, run_id: &RunId) -> Result<EvidenceSnapshot, StoreError> {
        let records = self.load_evidence(run_id)?;
        Ok(EvidenceSnapshot::new(run_id.clone(), records))
    }
}

impl RunStore for SqliteGateStore {
    fn load(&self, run_id: &RunId) -> Result<Option<PipelineRun>, StoreError> {
        Ok(self.load_run(run_id)?)
    }

    fn insert(&self, run: &PipelineRun) -> Result<(), StoreError> {
        Ok(self.write_run(run, false)?)
    }

    fn save(&self, run: &PipelineRun) -> Result<(), StoreError> {
        Ok(self.write_run(run, true)?)
    }

    fn list(&self) -> Result<Vec<RunId>, StoreError> {
        let guard = self.lock()?;
        let ids = {
            let mut stmt =
                guard.prepare("SELECT run_id FROM runs ORDER BY run_id").map_err(db_error)?;
            let rows = stmt.query_map(params![], |row| row.get::<_, String>(0)).map_err(db_error)?;
            rows.collect::<Result<Vec<_>, _>>().map_err(db_error)?
        };
        drop(guard);
        Ok(ids.into_iter().map(RunId::new).collect())
    }
}

impl AuditLog for SqliteGateStore {
    fn record(&self, record: AuditRecord) -> Result<AuditEntry, AuditError> {
        self.append_audit(record)
    }

    fn entries_for_run(&self, run_id: &RunId) -> Result<Vec<AuditEntry>, AuditError> {
        Ok(self.audit_entries(0, Some(run_id), None)?)
    }

    fn export(&self, after: u64, limit: usize) -> Result<Vec<AuditEntry>, AuditError> {
        Ok(self.audit_entries(after, None, Some(limit))?)
    }
}

// ============================================================================
// SECTION: Row Helpers
// ============================================================================

/// Stored payload bytes with their recorded hash.
#[derive(Debug)]
struct StoredRow {
    /// Stored canonical JSON bytes.
    bytes: Vec<u8>,
    /// Stored hash value.
    hash_value: String,
    /// Stored hash algorithm label.
    hash_algorithm: String,
}

impl StoredRow {
    /// Verifies the row hash and parses the payload.
    fn decode<T: DeserializeOwned>(&self, label: &str) -> Result<T, SqliteStoreError> {
        check_row_hash(label, &self.bytes, &self.hash_value, &self.hash_algorithm)?;
        parse_json(label, &self.bytes)
    }
}

/// Reads a payload, hash, and algorithm triple starting at column `start`.
fn map_stored_row(row: &rusqlite::Row<'_>, start: usize) -> rusqlite::Result<StoredRow> {
    Ok(StoredRow {
        bytes: row.get(start)?,
        hash_value: row.get(start + 1)?,
        hash_algorithm: row.get(start + 2)?,
    })
}

/// Recomputes a payload hash and compares it with the stored value.
fn check_row_hash(
    label: &str,
    bytes: &[u8],
    hash_value: &str,
    hash_algorithm: &str,
) -> Result<(), SqliteStoreError> {
    if bytes.len() > MAX_RECORD_BYTES {
        return Err(SqliteStoreError::TooLarge {
            max_bytes: MAX_RECORD_BYTES,
            actual_bytes: bytes.len(),
        });
    }
    let algorithm = parse_hash_algorithm(hash_algorithm)?;
    if hash_bytes(algorithm, bytes).value != hash_value {
        return Err(SqliteStoreError::Corrupt(format!("hash mismatch for {label}")));
    }
    Ok(())
}

/// Parses stored JSON bytes.
fn parse_json<T: DeserializeOwned>(label: &str, bytes: &[u8]) -> Result<T, SqliteStoreError> {
    serde_json::from_slice(bytes)
        .map_err(|err| SqliteStoreError::Invalid(format!("{label} is not decodable: {err}")))
}

/// Encodes a value as canonical JSON and hashes it.
fn encode<T: serde::Serialize>(value: &T) -> Result<(Vec<u8>, HashDigest), SqliteStoreError> {
    let bytes =
        canonical_json_bytes(value).map_err(|err| SqliteStoreError::Invalid(err.to_string()))?;
    if bytes.len() > MAX_RECORD_BYTES {
        return Err(SqliteStoreError::TooLarge {
            max_bytes: MAX_RECORD_BYTES,
            actual_bytes: bytes.len(),
        });
    }
    let digest = hash_bytes(DEFAULT_HASH_ALGORITHM, &bytes);
    Ok((bytes, digest))
}

/// Decodes an audit row and checks it against its chain hash.
fn decode_audit_entry(
    seq: u64,
    bytes: &[u8],
    hash_value: &str,
    hash_algorithm: &str,
) -> Result<AuditEntry, SqliteStoreError> {
    let label = format!("audit entry {seq}");
    if bytes.len() > MAX_RECORD_BYTES {
        return Err(SqliteStoreError::TooLarge {
            max_bytes: MAX_RECORD_BYTES,
            actual_bytes: bytes.len(),
        });
    }
    let entry: AuditEntry = parse_json(&label, bytes)?;
    if entry.seq != seq {
        return Err(SqliteStoreError::Invalid(format!("{label} key does not match payload")));
    }
    let algorithm = parse_hash_algorithm(hash_algorithm)?;
    let expected = entry_hash(entry.seq, entry.prev_hash.as_ref(), &entry.record)
        .map_err(|err| SqliteStoreError::Invalid(err.to_string()))?;
    if expected.algorithm != algorithm
        || expected != entry.entry_hash
        || expected.value != hash_value
    {
        return Err(SqliteStoreError::Corrupt(format!("hash mismatch for {label}")));
    }
    Ok(entry)
}

/// Returns the sequence and hash of the last audit entry.
fn audit_tail(tx: &Transaction<'_>) -> Result<Option<(u64, HashDigest)>, SqliteStoreError> {
    let tail: Option<(i64, String, String)> = tx
        .query_row(
            "SELECT seq, entry_hash, hash_algorithm FROM audit_log ORDER BY seq DESC LIMIT 1",
            params![],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
        )
        .optional()
        .map_err(db_error)?;
    tail.map(|(seq, value, label)| {
        Ok((
            to_u64(seq, "seq")?,
            HashDigest {
                algorithm: parse_hash_algorithm(&label)?,
                value,
            },
        ))
    })
    .transpose()
}

/// Converts an unsigned value for storage.
fn to_i64(value: u64, field: &str) -> Result<i64, SqliteStoreError> {
    i64::try_from(value)
        .map_err(|_| SqliteStoreError::Invalid(format!("{field} exceeds sqlite integer range")))
}

/// Converts a stored integer back to unsigned.
fn to_u64(value: i64, field: &str) -> Result<u64, SqliteStoreError> {
    u64::try_from(value).map_err(|_| SqliteStoreError::Corrupt(format!("negative {field} stored")))
}

/// Parses a hash algorithm label.
fn parse_hash_algorithm(label: &str) -> Result<HashAlgorithm, SqliteStoreError> {
    HashAlgorithm::from_label(label)
        .ok_or_else(|| SqliteStoreError::Invalid(format!("unsupported hash algorithm: {label}")))
}

/// Returns the current unix epoch in milliseconds.
fn unix_millis() -> i64 {
    let now = SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default();
    i64::try_from(now.as_millis()).unwrap_or(i64::MAX)
}

// ============================================================================
// SECTION: Startup Helpers
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
    if path.display().to_string().len() > MAX_TOTAL_PATH_LENGTH {
        return Err(SqliteStoreError::Invalid("store path exceeds length limit".to_string()));
    }
    for component in path.components() {
        if component.as_os_str().len() > MAX_PATH_COMPONENT_LENGTH {
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

/// Opens an `SQLite` connection with secure defaults.
fn open_connection(config: &SqliteStoreConfig) -> Result<Connection, SqliteStoreError> {
    let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
        | OpenFlags::SQLITE_OPEN_CREATE
        | OpenFlags::SQLITE_OPEN_FULL_MUTEX;
    let connection = Connection::open_with_flags(&config.path, flags).map_err(db_error)?;
    apply_pragmas(&connection, config)?;
    Ok(connection)
}

/// Applies `SQLite` pragmas required for durability.
fn apply_pragmas(
    connection: &Connection,
    config: &SqliteStoreConfig,
) -> Result<(), SqliteStoreError> {
    connection.execute_batch("PRAGMA foreign_keys = ON;").map_err(db_error)?;
    connection
        .execute_batch(&format!("PRAGMA journal_mode = {};", config.journal_mode.pragma_value()))
        .map_err(db_error)?;
    connection
        .execute_batch(&format!("PRAGMA synchronous = {};", config.sync_mode.pragma_value()))
        .map_err(db_error)?;
    connection.busy_timeout(Duration::from_millis(config.busy_timeout_ms)).map_err(db_error)?;
    Ok(())
}

/// Initializes the `SQLite` schema or validates the existing version.
fn initialize_schema(connection: &mut Connection) -> Result<(), SqliteStoreError> {
    let tx = connection.transaction().map_err(db_error)?;
    tx.execute_batch("CREATE TABLE IF NOT EXISTS store_meta (version INTEGER NOT NULL);")
        .map_err(db_error)?;
    let version: Option<i64> = tx
        .query_row("SELECT version FROM store_meta LIMIT 1", params![], |row| row.get(0))
        .optional()
        .map_err(db_error)?;
    match version {
        None => {
            tx.execute("INSERT INTO store_meta (version) VALUES (?1)", params![SCHEMA_VERSION])
                .map_err(db_error)?;
            tx.execute_batch(
                "CREATE TABLE IF NOT EXISTS evidence (
                    run_id TEXT NOT NULL,
                    seq INTEGER NOT NULL,
                    kind TEXT NOT NULL,
                    source TEXT NOT NULL,
                    timestamp INTEGER NOT NULL,
                    content_hash TEXT NOT NULL,
                    record_json BLOB NOT NULL,
                    record_hash TEXT NOT NULL,
                    hash_algorithm TEXT NOT NULL,
                    PRIMARY KEY (run_id, seq),
                    UNIQUE (run_id, kind, source, timestamp)
                );
                CREATE TABLE IF NOT EXISTS runs (
                    run_id TEXT PRIMARY KEY,
                    state_json BLOB NOT NULL,
                    state_hash TEXT NOT NULL,
                    hash_algorithm TEXT NOT NULL,
                    saved_at INTEGER NOT NULL
                );
                CREATE TABLE IF NOT EXISTS audit_log (
                    seq INTEGER PRIMARY KEY,
                    run_id TEXT NOT NULL,
                    entry_json BLOB NOT NULL,
                    entry_hash TEXT NOT NULL,
                    hash_algorithm TEXT NOT NULL
                );
                CREATE INDEX IF NOT EXISTS idx_audit_log_run_id ON audit_log (run_id, seq);",
            )
            .map_err(db_error)?;
        }
        Some(SCHEMA_VERSION) => {}
        Some(other) => {
            return Err(SqliteStoreError::VersionMismatch(format!(
                "unsupported schema version {other}"
            )));
        }
    }
    tx.commit().map_err(db_error)?;
    Ok(())
}
