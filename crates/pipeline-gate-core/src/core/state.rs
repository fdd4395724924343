// crates/pipeline-gate-core/src/core/state.rs
// ============================================================================
// Module: Pipeline Gate Run State
// Description: Pipeline run status and per-stage admission progress.
// Purpose: Capture the controller-owned state of each pipeline run.
// Dependencies: crate::core::{identifiers, time}, serde
// ============================================================================

//! ## Overview
//! A [`PipelineRun`] is owned by the gate controller and only changes through
//! stage-transition operations. Each applied decision bumps
//! `decisions_applied`; each applied audit entry (decisions and cancellations)
//! bumps `audit_entries_applied`, which lets the controller reconcile a stored
//! run against the audit log after a crash.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;

use crate::core::identifiers::CommitSha;
use crate::core::identifiers::DecisionId;
use crate::core::identifiers::EnvironmentId;
use crate::core::identifiers::RunId;
use crate::core::identifiers::StageId;
use crate::core::time::Timestamp;

// ============================================================================
// SECTION: Run Status
// ============================================================================

/// Lifecycle status for a pipeline run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// Waiting for an advance request on the current stage.
    Pending,
    /// Current stage denied pending more evidence.
    Blocked,
    /// Every stage has been admitted.
    Admitted,
    /// Current stage denied by a failing predicate.
    Rejected,
    /// Cancelled by an operator.
    Cancelled,
}

impl RunStatus {
    /// Returns true when no further automatic evaluation applies.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Admitted | Self::Rejected | Self::Cancelled)
    }

    /// Returns the stable wire label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Blocked => "blocked",
            Self::Admitted => "admitted",
            Self::Rejected => "rejected",
            Self::Cancelled => "cancelled",
        }
    }
}

// ============================================================================
// SECTION: Stage Progress
// ============================================================================

/// Record of an admitted stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageProgress {
    /// Admitted stage.
    pub stage: StageId,
    /// Decision that admitted the stage.
    pub decision_id: DecisionId,
    /// Decision timestamp.
    pub admitted_at: Timestamp,
}

// ============================================================================
// SECTION: Pipeline Run
// ============================================================================

/// Controller-owned pipeline run state.
///
/// # Invariants
/// - `admitted_stages` follows the environment stage order.
/// - `current_stage` is the last admitted stage once status is `Admitted`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineRun {
    /// Run identifier.
    pub run_id: RunId,
    /// Target environment.
    pub environment: EnvironmentId,
    /// Commit SHA under evaluation.
    pub commit_sha: CommitSha,
    /// Stage the run is waiting to enter.
    pub current_stage: StageId,
    /// Lifecycle status.
    pub status: RunStatus,
    /// Creation timestamp.
    pub created_at: Timestamp,
    /// Admitted stages in order.
    pub admitted_stages: Vec<StageProgress>,
    /// Number of decisions applied to this run.
    pub decisions_applied: u64,
    /// Number of audit entries (decisions and cancellations) applied.
    pub audit_entries_applied: u64,
    /// Most recent decision applied to the current stage.
    pub last_decision: Option<DecisionId>,
}

impl PipelineRun {
    /// Creates a pending run at `first_stage`.
    #[must_use]
    pub const fn new(
        run_id: RunId,
        environment: EnvironmentId,
        commit_sha: CommitSha,
        first_stage: StageId,
        created_at: Timestamp,
    ) -> Self {
        Self {
            run_id,
            environment,
            commit_sha,
            current_stage: first_stage,
            status: RunStatus::Pending,
            created_at,
            admitted_stages: Vec::new(),
            decisions_applied: 0,
            audit_entries_applied: 0,
            last_decision: None,
        }
    }

    /// Returns the progress entry for an admitted stage.
    #[must_use]
    pub fn admitted(&self, stage: &StageId) -> Option<&StageProgress> {
        self.admitted_stages.iter().find(|progress| &progress.stage == stage)
    }
}
