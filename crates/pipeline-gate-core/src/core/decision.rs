// crates/pipeline-gate-core/src/core/decision.rs
// ============================================================================
// Module: Pipeline Gate Decisions
// Description: Rule evaluations, admission decisions, and audit records.
// Purpose: Describe the immutable, auditable outcome of every gate check.
// Dependencies: crate::core::{evidence, hashing, identifiers, time}, serde
// ============================================================================

//! ## Overview
//! A [`Decision`] captures everything needed to explain an admission check:
//! the policy version, the evidence high-water mark, every rule evaluation
//! with the evidence it used, and who decided. Decisions and cancellations are
//! wrapped in [`AuditRecord`]s and chained into [`AuditEntry`] values by the
//! audit log.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;

use crate::core::evidence::EvidenceKind;
use crate::core::hashing::HashDigest;
use crate::core::identifiers::CommitSha;
use crate::core::identifiers::DecisionId;
use crate::core::identifiers::EnvironmentId;
use crate::core::identifiers::EvidenceId;
use crate::core::identifiers::PolicyVersion;
use crate::core::identifiers::RuleId;
use crate::core::identifiers::RunId;
use crate::core::identifiers::SourceId;
use crate::core::identifiers::StageId;
use crate::core::time::Timestamp;

// ============================================================================
// SECTION: Rule Evaluations
// ============================================================================

/// Why a rule is not satisfied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum UnsatisfiedReason {
    /// No qualifying evidence exists.
    MissingEvidence,
    /// Qualifying evidence exists but is older than the freshness window.
    StaleEvidence {
        /// Timestamp of the newest qualifying record.
        newest: Timestamp,
        /// Freshness window in ticks.
        window: u64,
    },
    /// Fewer records or sources than the rule requires.
    InsufficientEvidence {
        /// Required count.
        required: u32,
        /// Observed count.
        observed: u32,
    },
    /// Selected evidence reported an unknown outcome.
    IndeterminateOutcome,
    /// Selected evidence lacks a metric referenced by a predicate.
    MissingMetric {
        /// Metric name.
        metric: String,
    },
    /// A predicate evaluated to false.
    PredicateFailed {
        /// Human-readable failure detail.
        detail: String,
    },
}

impl UnsatisfiedReason {
    /// Returns true when the reason actively rejects the stage.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::PredicateFailed { .. })
    }
}

/// Status of a single rule in a decision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RuleStatus {
    /// Evidence satisfied every predicate.
    Satisfied,
    /// Waived by a human override.
    Waived,
    /// Not satisfied.
    Unsatisfied {
        /// Detail of the failure.
        reason: UnsatisfiedReason,
    },
}

impl RuleStatus {
    /// Returns true when the rule does not block admission.
    #[must_use]
    pub const fn is_passing(&self) -> bool {
        matches!(self, Self::Satisfied | Self::Waived)
    }
}

/// Evaluation of one rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleEvaluation {
    /// Evaluated rule.
    pub rule_id: RuleId,
    /// Evidence kind the rule requires.
    pub kind: EvidenceKind,
    /// Evaluation status.
    pub status: RuleStatus,
    /// Evidence records inspected to reach the status.
    #[serde(default)]
    pub evidence_used: Vec<EvidenceId>,
}

// ============================================================================
// SECTION: Decisions
// ============================================================================

/// Overall admission outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionOutcome {
    /// Stage transition admitted.
    Admit,
    /// Stage transition denied.
    Deny,
}

/// Verdict classifying the decision for the run lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GateVerdict {
    /// Every rule satisfied or waived.
    Admitted,
    /// Denied pending more evidence.
    Blocked,
    /// Denied by an actively failing predicate.
    Rejected,
}

/// Identity behind a decision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DecidedBy {
    /// Automatic evaluation.
    System,
    /// Privileged human override.
    Override {
        /// Overriding actor.
        actor: SourceId,
        /// Mandatory justification.
        justification: String,
        /// Rules explicitly waived.
        waived_rules: Vec<RuleId>,
    },
}

/// Reason attached to fail-closed denials that involve no rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DenialReason {
    /// One or more rules were unsatisfied.
    UnsatisfiedRules,
    /// No effective policy exists for the environment and stage.
    NoPolicyDefined,
}

/// Immutable admission decision.
///
/// # Invariants
/// - `rules` reference only evidence with sequence `<= evidence_high_water`
///   and timestamp `<= as_of`.
/// - `outcome == Admit` iff `verdict == Admitted`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Decision {
    /// Decision identifier.
    pub decision_id: DecisionId,
    /// Per-run decision sequence (1-based).
    pub seq: u64,
    /// Run identifier.
    pub run_id: RunId,
    /// Target environment.
    pub environment: EnvironmentId,
    /// Commit under evaluation.
    pub commit_sha: CommitSha,
    /// Stage evaluated.
    pub stage: StageId,
    /// Decision timestamp.
    pub decided_at: Timestamp,
    /// Evidence cutoff.
    pub as_of: Timestamp,
    /// Policy version evaluated (absent when no policy was published).
    pub policy_version: Option<PolicyVersion>,
    /// Canonical hash of the evaluated policy document.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub policy_hash: Option<HashDigest>,
    /// Highest evidence sequence visible in the snapshot.
    pub evidence_high_water: u64,
    /// Overall outcome.
    pub outcome: DecisionOutcome,
    /// Lifecycle verdict.
    pub verdict: GateVerdict,
    /// Per-rule evaluations.
    pub rules: Vec<RuleEvaluation>,
    /// Decision authority.
    pub decided_by: DecidedBy,
    /// Denial classification for deny outcomes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub denial: Option<DenialReason>,
    /// Stage the run moves to when admitted (absent for the final stage).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_stage: Option<StageId>,
}

impl Decision {
    /// Returns the rule evaluations that block admission.
    #[must_use]
    pub fn unsatisfied(&self) -> Vec<&RuleEvaluation> {
        self.rules.iter().filter(|rule| !rule.status.is_passing()).collect()
    }

    /// Returns true when the decision admitted the stage.
    #[must_use]
    pub fn is_admit(&self) -> bool {
        self.outcome == DecisionOutcome::Admit
    }

    /// Returns the policy publication this decision was evaluated under.
    #[must_use]
    pub fn recorded_policy(&self) -> Option<RecordedPolicy> {
        self.policy_version.map(|version| RecordedPolicy {
            version,
            document_hash: self.policy_hash.clone(),
        })
    }
}

/// Policy publication as seen through recorded decisions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedPolicy {
    /// Published version.
    pub version: PolicyVersion,
    /// Document hash, when the decision carried one.
    pub document_hash: Option<HashDigest>,
}

/// Operator cancellation of a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cancellation {
    /// Cancelled run.
    pub run_id: RunId,
    /// Stage the run was at.
    pub stage: StageId,
    /// Cancelling actor.
    pub actor: SourceId,
    /// Cancellation reason.
    pub reason: String,
    /// Cancellation timestamp.
    pub cancelled_at: Timestamp,
}

// ============================================================================
// SECTION: Audit Records
// ============================================================================

/// Record appended to the audit log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AuditRecord {
    /// Admission decision.
    Decision {
        /// Recorded decision.
        decision: Decision,
    },
    /// Run cancellation.
    Cancellation {
        /// Recorded cancellation.
        cancellation: Cancellation,
    },
}

impl AuditRecord {
    /// Returns the run the record belongs to.
    #[must_use]
    pub const fn run_id(&self) -> &RunId {
        match self {
            Self::Decision {
                decision,
            } => &decision.run_id,
            Self::Cancellation {
                cancellation,
            } => &cancellation.run_id,
        }
    }
}

/// Hash-chained audit log entry.
///
/// # Invariants
/// - `entry_hash` covers `seq`, `prev_hash`, and `record`.
/// - `prev_hash` equals the previous entry's `entry_hash` (absent for seq 1).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEntry {
    /// Global append sequence (1-based).
    pub seq: u64,
    /// Hash of the preceding entry.
    pub prev_hash: Option<HashDigest>,
    /// Hash of this entry.
    pub entry_hash: HashDigest,
    /// Audited record.
    pub record: AuditRecord,
}
