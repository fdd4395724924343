// crates/pipeline-gate-core/src/runtime/store.rs
// ============================================================================
// Module: Pipeline Gate In-Memory Stores
// Description: In-memory run and evidence stores for tests and local serving.
// Purpose: Provide deterministic store implementations without external deps.
// Dependencies: crate::core, crate::interfaces
// ============================================================================

//! ## Overview
//! [`InMemoryRunStore`] and [`InMemoryEvidenceStore`] back the controller in
//! tests and in `memory` store mode. Contents are lost on restart.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::MutexGuard;

use crate::core::AppendReceipt;
use crate::core::Evidence;
use crate::core::EvidenceDraft;
use crate::core::EvidenceKind;
use crate::core::EvidenceSnapshot;
use crate::core::PipelineRun;
use crate::core::RunId;
use crate::core::Timestamp;
use crate::interfaces::EvidenceStore;
use crate::interfaces::RunStore;
use crate::interfaces::StoreError;

// ============================================================================
// SECTION: Run Store
// ============================================================================

/// In-memory run store.
#[derive(Debug, Default, Clone)]
pub struct InMemoryRunStore {
    /// Runs keyed by identifier.
    runs: Arc<Mutex<BTreeMap<RunId, PipelineRun>>>,
}

impl InMemoryRunStore {
    /// Creates an empty run store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Locks the run map.
    fn lock(&self) -> Result<MutexGuard<'_, BTreeMap<RunId, PipelineRun>>, StoreError> {
        self.runs.lock().map_err(|_| StoreError::Store("run store mutex poisoned".to_string()))
    }
}

impl RunStore for InMemoryRunStore {
    fn load(&self, run_id: &RunId) -> Result<Option<PipelineRun>, StoreError> {
        let guard = self.lock()?;
        Ok(guard.get(run_id).cloned())
    }

    fn insert(&self, run: &PipelineRun) -> Result<(), StoreError> {
        let mut guard = self.lock()?;
        if guard.contains_key(&run.run_id) {
            return Err(StoreError::Conflict(format!("run {} already exists", run.run_id)));
        }
        guard.insert(run.run_id.clone(), run.clone());
        drop(guard);
        Ok(())
    }

    fn save(&self, run: &PipelineRun) -> Result<(), StoreError> {
        self.lock()?.insert(run.run_id.clone(), run.clone());
        Ok(())
    }

    fn list(&self) -> Result<Vec<RunId>, StoreError> {
        let guard = self.lock()?;
        Ok(guard.keys().cloned().collect())
    }
}

// ============================================================================
// SECTION: Evidence Store
// ============================================================================

/// In-memory append-only evidence store.
///
/// # Invariants
/// - Per-run vectors are ordered by sequence; `seq == index + 1`.
#[derive(Debug, Default, Clone)]
pub struct InMemoryEvidenceStore {
    /// Evidence logs keyed by run.
    logs: Arc<Mutex<BTreeMap<RunId, Vec<Evidence>>>>,
}

impl InMemoryEvidenceStore {
    /// Creates an empty evidence store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl EvidenceStore for InMemoryEvidenceStore {
    fn append(&self, draft: EvidenceDraft) -> Result<AppendReceipt, StoreError> {
        let mut guard = self
            .logs
            .lock()
            .map_err(|_| StoreError::Store("evidence store mutex poisoned".to_string()))?;
        let log = guard.entry(draft.subject.run_id.clone()).or_default();
        let identity = draft.identity();
        if let Some(existing) = log.iter().find(|record| record.identity() == identity) {
            if existing.content_hash != draft.content_hash {
                return Err(StoreError::Conflict(format!(
                    "evidence {} already recorded with different content",
                    existing.id
                )));
            }
            return Ok(AppendReceipt {
                evidence_id: existing.id.clone(),
                duplicate: true,
            });
        }
        let seq = u64::try_from(log.len())
            .map_err(|_| StoreError::Store("evidence sequence overflow".to_string()))?
            + 1;
        let record = Evidence::from_draft(draft, seq);
        let evidence_id = record.id.clone();
        log.push(record);
        drop(guard);
        Ok(AppendReceipt {
            evidence_id,
            duplicate: false,
        })
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
        let guard = self
            .logs
            .lock()
            .map_err(|_| StoreError::Store("evidence store mutex poisoned".to_string()))?;
        let records = guard.get(run_id).cloned().unwrap_or_default();
        drop(guard);
        Ok(EvidenceSnapshot::new(run_id.clone(), records))
    }
}
