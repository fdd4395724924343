// crates/pipeline-gate-core/src/interfaces/mod.rs
// ============================================================================
// Module: Pipeline Gate Interfaces
// Description: Persistence traits for evidence, run state, and the audit log.
// Purpose: Decouple the gate controller from storage backends.
// Dependencies: crate::core, thiserror
// ============================================================================

//! ## Overview
//! Backends implement [`EvidenceStore`], [`RunStore`], and [`AuditLog`]. The
//! in-memory implementations live in `runtime`; durable implementations live
//! in `pipeline-gate-store-sqlite`. All traits are synchronous and must be
//! safe to share across threads; hosts call them from blocking contexts.
//!
//! Security posture: store contents are re-verified on load by durable
//! backends; integrity failures surface as [`StoreError::Corrupt`].

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;

use thiserror::Error;

use crate::core::AppendReceipt;
use crate::core::AuditEntry;
use crate::core::AuditRecord;
use crate::core::Decision;
use crate::core::Evidence;
use crate::core::EvidenceDraft;
use crate::core::EvidenceKind;
use crate::core::EvidenceSnapshot;
use crate::core::PipelineRun;
use crate::core::RecordedPolicy;
use crate::core::RunId;
use crate::core::Timestamp;

// ============================================================================
// SECTION: Store Errors
// ============================================================================

/// Storage errors shared by evidence and run stores.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// Store I/O error.
    #[error("store io error: {0}")]
    Io(String),
    /// Store data is corrupted or fails integrity checks.
    #[error("store corruption: {0}")]
    Corrupt(String),
    /// Store data version is incompatible.
    #[error("store version mismatch: {0}")]
    VersionMismatch(String),
    /// Store data is invalid.
    #[error("store invalid data: {0}")]
    Invalid(String),
    /// Write conflicts with an existing record.
    #[error("store conflict: {0}")]
    Conflict(String),
    /// Store reported an error.
    #[error("store error: {0}")]
    Store(String),
}

// ============================================================================
// SECTION: Evidence Store
// ============================================================================

/// Append-only evidence log keyed by run.
pub trait EvidenceStore: Send + Sync {
    /// Appends a validated draft, assigning the next per-run sequence.
    ///
    /// Re-appending a draft with an existing identity and the same content
    /// hash returns the stored identifier with `duplicate = true`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Conflict`] when the identity exists with
    /// different content, or another [`StoreError`] when the write fails.
    fn append(&self, draft: EvidenceDraft) -> Result<AppendReceipt, StoreError>;

    /// Returns matching records not newer than `as_of`, newest first.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when reading fails.
    fn query(
        &self,
        run_id: &RunId,
        kind: Option<EvidenceKind>,
        as_of: Option<Timestamp>,
    ) -> Result<Vec<Evidence>, StoreError>;

    /// Returns a consistent snapshot of a run's evidence.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when reading fails.
    fn snapshot(&self, run_id: &RunId) -> Result<EvidenceSnapshot, StoreError>;
}

impl<T: EvidenceStore + ?Sized> EvidenceStore for Arc<T> {
    fn append(&self, draft: EvidenceDraft) -> Result<AppendReceipt, StoreError> {
        (**self).append(draft)
    }

    fn query(
        &self,
        run_id: &RunId,
        kind: Option<EvidenceKind>,
        as_of: Option<Timestamp>,
    ) -> Result<Vec<Evidence>, StoreError> {
        (**self).query(run_id, kind, as_of)
    }

    fn snapshot(&self, run_id: &RunId) -> Result<EvidenceSnapshot, StoreError> {
        (**self).snapshot(run_id)
    }
}

// ============================================================================
// SECTION: Run Store
// ============================================================================

/// Run state persistence.
pub trait RunStore: Send + Sync {
    /// Loads run state by run identifier.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when loading fails.
    fn load(&self, run_id: &RunId) -> Result<Option<PipelineRun>, StoreError>;

    /// Inserts a new run.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Conflict`] when the run already exists.
    fn insert(&self, run: &PipelineRun) -> Result<(), StoreError>;

    /// Saves run state, replacing the stored copy.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when saving fails.
    fn save(&self, run: &PipelineRun) -> Result<(), StoreError>;

    /// Lists every stored run identifier.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when reading fails.
    fn list(&self) -> Result<Vec<RunId>, StoreError>;
}

impl<T: RunStore + ?Sized> RunStore for Arc<T> {
    fn load(&self, run_id: &RunId) -> Result<Option<PipelineRun>, StoreError> {
        (**self).load(run_id)
    }

    fn insert(&self, run: &PipelineRun) -> Result<(), StoreError> {
        (**self).insert(run)
    }

    fn save(&self, run: &PipelineRun) -> Result<(), StoreError> {
        (**self).save(run)
    }

    fn list(&self) -> Result<Vec<RunId>, StoreError> {
        (**self).list()
    }
}

// ============================================================================
// SECTION: Audit Log
// ============================================================================

/// Audit log errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuditError {
    /// Backend storage failed.
    #[error("audit log storage error: {0}")]
    Storage(String),
    /// Chain integrity check failed at the given sequence.
    #[error("audit chain broken at seq {seq}: {detail}")]
    ChainBroken {
        /// Sequence of the first invalid entry.
        seq: u64,
        /// Failure detail.
        detail: String,
    },
    /// Entry could not be hashed.
    #[error("audit hashing failed: {0}")]
    Hash(String),
}

/// Page size used when scanning the audit log for policy versions.
const POLICY_SCAN_PAGE: usize = 1_000;

/// Append-only, hash-chained audit log.
///
/// # Invariants
/// - No API edits or removes entries.
/// - `record` returns only after the entry is durable for the backend.
pub trait AuditLog: Send + Sync {
    /// Appends a record, returning the chained entry.
    ///
    /// # Errors
    ///
    /// Returns [`AuditError`] when the append fails.
    fn record(&self, record: AuditRecord) -> Result<AuditEntry, AuditError>;

    /// Returns every entry for a run in append order.
    ///
    /// # Errors
    ///
    /// Returns [`AuditError`] when reading fails.
    fn entries_for_run(&self, run_id: &RunId) -> Result<Vec<AuditEntry>, AuditError>;

    /// Returns up to `limit` entries with `seq > after`, in order.
    ///
    /// # Errors
    ///
    /// Returns [`AuditError`] when reading fails.
    fn export(&self, after: u64, limit: usize) -> Result<Vec<AuditEntry>, AuditError>;

    /// Returns a run's decisions in decision order.
    ///
    /// # Errors
    ///
    /// Returns [`AuditError`] when reading fails.
    fn history(&self, run_id: &RunId) -> Result<Vec<Decision>, AuditError> {
        Ok(self
            .entries_for_run(run_id)?
            .into_iter()
            .filter_map(|entry| match entry.record {
                AuditRecord::Decision {
                    decision,
                } => Some(decision),
                AuditRecord::Cancellation {
                    ..
                } => None,
            })
            .collect())
    }

    /// Returns the highest policy publication any recorded decision used.
    ///
    /// # Errors
    ///
    /// Returns [`AuditError`] when reading fails.
    fn latest_policy(&self) -> Result<Option<RecordedPolicy>, AuditError> {
        let mut latest: Option<RecordedPolicy> = None;
        let mut after = 0;
        loop {
            let page = self.export(after, POLICY_SCAN_PAGE)?;
            let Some(last) = page.last() else {
                return Ok(latest);
            };
            after = last.seq;
            for entry in page {
                if let AuditRecord::Decision {
                    decision,
                } = entry.record
                    && let Some(recorded) = decision.recorded_policy()
                    && latest.as_ref().is_none_or(|current| recorded.version >= current.version)
                {
                    latest = Some(recorded);
                }
            }
        }
    }
}

impl<T: AuditLog + ?Sized> AuditLog for Arc<T> {
    fn record(&self, record: AuditRecord) -> Result<AuditEntry, AuditError> {
        (**self).record(record)
    }

    fn entries_for_run(&self, run_id: &RunId) -> Result<Vec<AuditEntry>, AuditError> {
        (**self).entries_for_run(run_id)
    }

    fn export(&self, after: u64, limit: usize) -> Result<Vec<AuditEntry>, AuditError> {
        (**self).export(after, limit)
    }
}
