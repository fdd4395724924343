// crates/pipeline-gate-core/src/runtime/controller.rs
// ============================================================================
// Module: Pipeline Gate Controller
// Description: Stateful orchestrator advancing runs through gated stages.
// Purpose: Evaluate, record, and apply admission decisions atomically per run.
// Dependencies: crate::{core, interfaces, runtime}
// ============================================================================

//! ## Overview
//! [`GateController`] owns pipeline runs. Every stage transition follows the
//! same sequence:
//!
//! 1. Claim the run (concurrent requests for the same run fail fast with
//!    [`GateError::StaleSnapshotConflict`]).
//! 2. Load the run and replay any audit entries not yet applied to it.
//! 3. Resolve rules from the policy snapshot active now and evaluate them
//!    against one evidence snapshot.
//! 4. Append the decision to the audit log, then apply it to the run and
//!    save. A crash between the two leaves a recorded decision that the next
//!    load reconciles.
//!
//! Re-advancing a stage that is already admitted, or a run that is rejected,
//! returns the recorded decision without appending anything.
//!
//! Security posture: resolution fails closed; a stage with no effective
//! policy produces a recorded deny decision, never an admit.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeSet;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::mpsc;
use std::time::Duration;

use thiserror::Error;

use crate::core::AuditRecord;
use crate::core::Cancellation;
use crate::core::CommitSha;
use crate::core::DecidedBy;
use crate::core::Decision;
use crate::core::DecisionId;
use crate::core::DecisionOutcome;
use crate::core::DenialReason;
use crate::core::EnvironmentId;
use crate::core::GateVerdict;
use crate::core::PipelineRun;
use crate::core::PolicyError;
use crate::core::RuleId;
use crate::core::RunId;
use crate::core::RunStatus;
use crate::core::SourceId;
use crate::core::StageId;
use crate::core::StageProgress;
use crate::core::Timestamp;
use crate::interfaces::AuditError;
use crate::interfaces::AuditLog;
use crate::interfaces::EvidenceStore;
use crate::interfaces::RunStore;
use crate::interfaces::StoreError;
use crate::runtime::evaluator::EvaluationBudget;
use crate::runtime::evaluator::EvaluationContext;
use crate::runtime::evaluator::EvaluationError;
use crate::runtime::evaluator::Evaluator;
use crate::runtime::evidence_store::EvidenceNotice;
use crate::runtime::policy_registry::PolicyRegistry;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Gate controller errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GateError {
    /// Run does not exist.
    #[error("run not found: {0}")]
    RunNotFound(RunId),
    /// Run already exists.
    #[error("run already exists: {0}")]
    RunAlreadyExists(RunId),
    /// Run was cancelled.
    #[error("run is cancelled: {0}")]
    RunCancelled(RunId),
    /// Requested stage is not the run's current stage.
    #[error("stage mismatch: run is at {expected}, request named {requested}")]
    StageMismatch {
        /// Run's current stage.
        expected: StageId,
        /// Stage named by the request.
        requested: StageId,
    },
    /// Run is being evaluated concurrently or the caller's view is stale.
    #[error("stale snapshot conflict for run {0}")]
    StaleSnapshotConflict(RunId),
    /// Evaluation exceeded its time budget; no decision was recorded.
    #[error("evaluation timed out")]
    EvaluationTimeout,
    /// Override request is malformed.
    #[error("invalid override: {0}")]
    InvalidOverride(String),
    /// Actor lacks the privilege for the operation.
    #[error("unauthorized: {0}")]
    Unauthorized(String),
    /// Operation is not valid for the run's status.
    #[error("invalid transition: {0}")]
    InvalidTransition(String),
    /// Request is malformed.
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    /// Policy resolution failed.
    #[error(transparent)]
    Policy(#[from] PolicyError),
    /// Store failure.
    #[error(transparent)]
    Store(#[from] StoreError),
    /// Audit log failure.
    #[error(transparent)]
    Audit(#[from] AuditError),
}

impl GateError {
    /// Returns true when the caller may retry the same request.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::EvaluationTimeout | Self::StaleSnapshotConflict(_))
    }
}

impl From<EvaluationError> for GateError {
    fn from(err: EvaluationError) -> Self {
        match err {
            EvaluationError::Timeout => Self::EvaluationTimeout,
        }
    }
}

// ============================================================================
// SECTION: Configuration and Requests
// ============================================================================

/// Gate controller configuration.
#[derive(Debug, Clone, Default)]
pub struct GateControllerConfig {
    /// Per-evaluation time budget (unbounded when `None`).
    pub evaluation_timeout: Option<Duration>,
    /// Actors allowed to issue overrides.
    pub override_actors: BTreeSet<SourceId>,
}

/// Request to create a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateRunRequest {
    /// Run identifier.
    pub run_id: RunId,
    /// Target environment.
    pub environment: EnvironmentId,
    /// Commit under evaluation.
    pub commit_sha: CommitSha,
    /// Creation timestamp.
    pub created_at: Timestamp,
}

/// Request to advance a run past its current stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdvanceRequest {
    /// Run identifier.
    pub run_id: RunId,
    /// Stage to evaluate (defaults to the current stage).
    pub stage: Option<StageId>,
    /// Request time; both the decision time and the evidence cutoff.
    pub requested_at: Timestamp,
    /// Optimistic check on the number of decisions already applied.
    pub expected_decisions: Option<u64>,
}

/// Privileged request waiving specific rules at the current stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OverrideRequest {
    /// Run identifier.
    pub run_id: RunId,
    /// Stage to override (defaults to the current stage).
    pub stage: Option<StageId>,
    /// Overriding actor.
    pub actor: SourceId,
    /// Mandatory justification.
    pub justification: String,
    /// Rules to waive.
    pub waived_rules: Vec<RuleId>,
    /// Request time; both the decision time and the evidence cutoff.
    pub requested_at: Timestamp,
}

/// Request to cancel a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CancelRequest {
    /// Run identifier.
    pub run_id: RunId,
    /// Cancelling actor.
    pub actor: SourceId,
    /// Cancellation reason.
    pub reason: String,
    /// Request timestamp.
    pub requested_at: Timestamp,
}

/// Result of an advance or override.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdvanceResult {
    /// Decision applied (or replayed).
    pub decision: Decision,
    /// Run state after the decision.
    pub run: PipelineRun,
    /// True when the decision was already recorded and nothing was appended.
    pub replayed: bool,
}

/// Outcome of draining evidence notifications.
#[derive(Debug, Default)]
pub struct DrainReport {
    /// Blocked runs that were re-evaluated.
    pub advanced: Vec<AdvanceResult>,
    /// Runs whose re-evaluation failed.
    pub failed: Vec<(RunId, GateError)>,
}

// ============================================================================
// SECTION: Controller
// ============================================================================

/// Stateful gate controller.
pub struct GateController<E, R, A> {
    /// Evidence store read for snapshots.
    evidence: E,
    /// Run state store.
    runs: R,
    /// Audit log.
    audit: A,
    /// Policy registry read at check time.
    policy: Arc<PolicyRegistry>,
    /// Controller configuration.
    config: GateControllerConfig,
    /// Runs with an evaluation in flight.
    inflight: Mutex<BTreeSet<RunId>>,
    /// Stateless evaluator.
    evaluator: Evaluator,
}

impl<E, R, A> GateController<E, R, A>
where
    E: EvidenceStore,
    R: RunStore,
    A: AuditLog,
{
    /// Creates a controller over the given stores and policy registry.
    #[must_use]
    pub const fn new(
        evidence: E,
        runs: R,
        audit: A,
        policy: Arc<PolicyRegistry>,
        config: GateControllerConfig,
    ) -> Self {
        Self {
            evidence,
            runs,
            audit,
            policy,
            config,
            inflight: Mutex::new(BTreeSet::new()),
            evaluator: Evaluator::new(),
        }
    }

    /// Returns the policy registry.
    #[must_use]
    pub const fn policy(&self) -> &Arc<PolicyRegistry> {
        &self.policy
    }

    /// Returns the audit log.
    #[must_use]
    pub const fn audit(&self) -> &A {
        &self.audit
    }

    /// Creates a run at the first stage of its environment.
    ///
    /// # Errors
    ///
    /// Returns [`GateError::RunAlreadyExists`] for duplicate identifiers and
    /// [`GateError::Policy`] when the environment has no policy.
    pub fn create_run(&self, request: CreateRunRequest) -> Result<PipelineRun, GateError> {
        if request.run_id.as_str().is_empty() {
            return Err(GateError::InvalidRequest("run_id must be non-empty".to_string()));
        }
        let snapshot = self.policy.current().ok_or_else(|| PolicyError::NoPolicyDefined {
            environment: request.environment.clone(),
            stage: None,
        })?;
        let first_stage = snapshot.first_stage(&request.environment)?;
        let run = PipelineRun::new(
            request.run_id,
            request.environment,
            request.commit_sha,
            first_stage,
            request.created_at,
        );
        match self.runs.insert(&run) {
            Ok(()) => Ok(run),
            Err(StoreError::Conflict(_)) => Err(GateError::RunAlreadyExists(run.run_id)),
            Err(err) => Err(err.into()),
        }
    }

    /// Returns the reconciled run state.
    ///
    /// # Errors
    ///
    /// Returns [`GateError::RunNotFound`] when the run does not exist.
    pub fn run(&self, run_id: &RunId) -> Result<PipelineRun, GateError> {
        self.load_reconciled(run_id)
    }

    /// Returns a run's decisions in decision order.
    ///
    /// # Errors
    ///
    /// Returns [`GateError::Audit`] when the audit log cannot be read.
    pub fn history(&self, run_id: &RunId) -> Result<Vec<Decision>, GateError> {
        Ok(self.audit.history(run_id)?)
    }

    /// Evaluates a stage without recording or applying the decision.
    ///
    /// # Errors
    ///
    /// Returns [`GateError`] when the run is missing or cancelled, the stage
    /// does not match, or evaluation times out.
    pub fn evaluate(
        &self,
        run_id: &RunId,
        stage: Option<&StageId>,
        as_of: Timestamp,
        requested_at: Timestamp,
    ) -> Result<Decision, GateError> {
        let run = self.load_reconciled(run_id)?;
        if run.status == RunStatus::Cancelled {
            return Err(GateError::RunCancelled(run.run_id));
        }
        let stage = stage.cloned().unwrap_or_else(|| run.current_stage.clone());
        self.decide(&run, &stage, as_of, requested_at, DecidedBy::System, &BTreeSet::new())
    }

    /// Evaluates, records, and applies a decision for the current stage.
    ///
    /// Evidence is cut off at `requested_at`; a committed decision never
    /// looks at an earlier view of the store.
    ///
    /// # Errors
    ///
    /// Returns [`GateError::StaleSnapshotConflict`] when another request for
    /// the run is in flight or `expected_decisions` is stale, and other
    /// [`GateError`] variants for missing, cancelled, or mismatched runs.
    pub fn request_advance(&self, request: AdvanceRequest) -> Result<AdvanceResult, GateError> {
        let _claim = self.claim(&request.run_id)?;
        let run = self.load_reconciled(&request.run_id)?;

        if let Some(replay) = self.replay(&run, request.stage.as_ref())? {
            return Ok(replay);
        }
        if let Some(expected) = request.expected_decisions
            && expected != run.decisions_applied
        {
            return Err(GateError::StaleSnapshotConflict(run.run_id));
        }
        let stage = target_stage(&run, request.stage.as_ref())?;
        let decision = self.decide(
            &run,
            &stage,
            request.requested_at,
            request.requested_at,
            DecidedBy::System,
            &BTreeSet::new(),
        )?;
        self.commit(run, decision)
    }

    /// Records a privileged override waiving specific rules.
    ///
    /// # Errors
    ///
    /// Returns [`GateError::Unauthorized`] for non-privileged actors and
    /// [`GateError::InvalidOverride`] for empty justifications or unknown rules.
    pub fn override_stage(&self, request: OverrideRequest) -> Result<AdvanceResult, GateError> {
        if !self.config.override_actors.contains(&request.actor) {
            return Err(GateError::Unauthorized(format!(
                "actor {} may not override gates",
                request.actor
            )));
        }
        if request.justification.trim().is_empty() {
            return Err(GateError::InvalidOverride("justification must be non-empty".to_string()));
        }
        if request.waived_rules.is_empty() {
            return Err(GateError::InvalidOverride(
                "at least one rule must be waived".to_string(),
            ));
        }

        let _claim = self.claim(&request.run_id)?;
        let run = self.load_reconciled(&request.run_id)?;
        match run.status {
            RunStatus::Cancelled => return Err(GateError::RunCancelled(run.run_id)),
            RunStatus::Admitted => {
                return Err(GateError::InvalidTransition(format!(
                    "run {} is already admitted",
                    run.run_id
                )));
            }
            RunStatus::Pending | RunStatus::Blocked | RunStatus::Rejected => {}
        }
        let stage = target_stage(&run, request.stage.as_ref())?;
        let waived: BTreeSet<RuleId> = request.waived_rules.into_iter().collect();
        let decided_by = DecidedBy::Override {
            actor: request.actor,
            justification: request.justification,
            waived_rules: waived.iter().cloned().collect(),
        };
        let now = request.requested_at;
        let decision = self.decide(&run, &stage, now, now, decided_by, &waived)?;
        if decision.denial == Some(DenialReason::NoPolicyDefined) {
            return Err(GateError::InvalidOverride(format!(
                "no policy defined for stage {stage}; nothing to waive"
            )));
        }
        self.commit(run, decision)
    }

    /// Cancels a run. Cancelling an already cancelled run is a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`GateError::InvalidTransition`] when the run is fully admitted.
    pub fn cancel(&self, request: CancelRequest) -> Result<PipelineRun, GateError> {
        if request.reason.trim().is_empty() {
            return Err(GateError::InvalidRequest(
                "cancellation reason must be non-empty".to_string(),
            ));
        }
        let _claim = self.claim(&request.run_id)?;
        let run = self.load_reconciled(&request.run_id)?;
        match run.status {
            RunStatus::Cancelled => return Ok(run),
            RunStatus::Admitted => {
                return Err(GateError::InvalidTransition(format!(
                    "run {} is already admitted",
                    run.run_id
                )));
            }
            RunStatus::Pending | RunStatus::Blocked | RunStatus::Rejected => {}
        }
        let cancellation = Cancellation {
            run_id: run.run_id.clone(),
            stage: run.current_stage.clone(),
            actor: request.actor,
            reason: request.reason,
            cancelled_at: request.requested_at,
        };
        self.audit.record(AuditRecord::Cancellation {
            cancellation,
        })?;
        let run = apply_cancellation(run);
        self.runs.save(&run)?;
        Ok(run)
    }

    /// Re-evaluates a run if it is blocked.
    ///
    /// # Errors
    ///
    /// Returns [`GateError`] when the re-evaluation fails.
    pub fn retry_blocked(
        &self,
        run_id: &RunId,
        now: Timestamp,
    ) -> Result<Option<AdvanceResult>, GateError> {
        let run = self.load_reconciled(run_id)?;
        if run.status != RunStatus::Blocked {
            return Ok(None);
        }
        self.request_advance(AdvanceRequest {
            run_id: run.run_id,
            stage: None,
            requested_at: now,
            expected_decisions: Some(run.decisions_applied),
        })
        .map(Some)
    }

    /// Drains pending evidence notices and re-evaluates affected blocked runs.
    ///
    /// Notices for runs that do not exist yet are ignored; the evidence stays
    /// buffered in the store.
    pub fn drain_notifications(
        &self,
        receiver: &mpsc::Receiver<EvidenceNotice>,
        now: Timestamp,
    ) -> DrainReport {
        let mut runs = BTreeSet::new();
        while let Ok(notice) = receiver.try_recv() {
            runs.insert(notice.evidence_id.run_id);
        }
        let mut report = DrainReport::default();
        for run_id in runs {
            match self.retry_blocked(&run_id, now) {
                Ok(Some(result)) => report.advanced.push(result),
                Ok(None) | Err(GateError::RunNotFound(_)) => {}
                Err(err) => report.failed.push((run_id, err)),
            }
        }
        report
    }

    // ------------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------------

    /// Claims a run for exclusive evaluation.
    fn claim(&self, run_id: &RunId) -> Result<RunClaim<'_>, GateError> {
        let mut inflight = self
            .inflight
            .lock()
            .map_err(|_| StoreError::Store("inflight set mutex poisoned".to_string()))?;
        if !inflight.insert(run_id.clone()) {
            return Err(GateError::StaleSnapshotConflict(run_id.clone()));
        }
        drop(inflight);
        Ok(RunClaim {
            inflight: &self.inflight,
            run_id: run_id.clone(),
        })
    }

    /// Loads a run and applies audit entries recorded after its last save.
    fn load_reconciled(&self, run_id: &RunId) -> Result<PipelineRun, GateError> {
        let mut run =
            self.runs.load(run_id)?.ok_or_else(|| GateError::RunNotFound(run_id.clone()))?;
        let entries = self.audit.entries_for_run(run_id)?;
        let applied = usize::try_from(run.audit_entries_applied).unwrap_or(usize::MAX);
        let pending: Vec<_> = entries.into_iter().skip(applied).collect();
        if pending.is_empty() {
            return Ok(run);
        }
        for entry in pending {
            run = match entry.record {
                AuditRecord::Decision {
                    decision,
                } => apply_decision(run, &decision),
                AuditRecord::Cancellation {
                    ..
                } => apply_cancellation(run),
            };
        }
        self.runs.save(&run)?;
        Ok(run)
    }

    /// Returns the recorded decision when the request is a replay.
    fn replay(
        &self,
        run: &PipelineRun,
        stage: Option<&StageId>,
    ) -> Result<Option<AdvanceResult>, GateError> {
        let decision_id = match run.status {
            RunStatus::Cancelled => return Err(GateError::RunCancelled(run.run_id.clone())),
            RunStatus::Admitted => {
                let stage = stage.unwrap_or(&run.current_stage);
                let progress = run.admitted(stage).ok_or_else(|| GateError::StageMismatch {
                    expected: run.current_stage.clone(),
                    requested: stage.clone(),
                })?;
                progress.decision_id.clone()
            }
            RunStatus::Rejected => {
                let stage = stage.unwrap_or(&run.current_stage);
                if let Some(progress) = run.admitted(stage) {
                    progress.decision_id.clone()
                } else if stage == &run.current_stage
                    && let Some(last) = &run.last_decision
                {
                    last.clone()
                } else {
                    return Err(GateError::StageMismatch {
                        expected: run.current_stage.clone(),
                        requested: stage.clone(),
                    });
                }
            }
            RunStatus::Pending | RunStatus::Blocked => {
                match stage.and_then(|stage| run.admitted(stage)) {
                    Some(progress) => progress.decision_id.clone(),
                    None => return Ok(None),
                }
            }
        };
        let decision = self.find_decision(&run.run_id, &decision_id)?;
        Ok(Some(AdvanceResult {
            decision,
            run: run.clone(),
            replayed: true,
        }))
    }

    /// Looks up a recorded decision by identifier.
    fn find_decision(
        &self,
        run_id: &RunId,
        decision_id: &DecisionId,
    ) -> Result<Decision, GateError> {
        self.audit
            .history(run_id)?
            .into_iter()
            .find(|decision| &decision.decision_id == decision_id)
            .ok_or_else(|| {
                GateError::Audit(AuditError::Storage(format!(
                    "decision {decision_id} missing from audit log"
                )))
            })
    }

    /// Builds a decision for `stage` against the policy active now.
    fn decide(
        &self,
        run: &PipelineRun,
        stage: &StageId,
        as_of: Timestamp,
        decided_at: Timestamp,
        decided_by: DecidedBy,
        waived: &BTreeSet<RuleId>,
    ) -> Result<Decision, GateError> {
        let seq = run.decisions_applied + 1;
        let policy = self.policy.current();
        let mut decision = Decision {
            decision_id: DecisionId::for_run(&run.run_id, seq),
            seq,
            run_id: run.run_id.clone(),
            environment: run.environment.clone(),
            commit_sha: run.commit_sha.clone(),
            stage: stage.clone(),
            decided_at,
            as_of,
            policy_version: policy.as_ref().map(|snapshot| snapshot.version),
            policy_hash: policy.as_ref().map(|snapshot| snapshot.document_hash.clone()),
            evidence_high_water: 0,
            outcome: DecisionOutcome::Deny,
            verdict: GateVerdict::Blocked,
            rules: Vec::new(),
            decided_by,
            denial: Some(DenialReason::NoPolicyDefined),
            next_stage: None,
        };

        let Some(policy) = policy else {
            return Ok(decision);
        };
        let rules = match policy.resolve(&run.environment, stage) {
            Ok(rules) => rules,
            Err(PolicyError::NoPolicyDefined {
                ..
            }) => return Ok(decision),
            Err(err) => return Err(err.into()),
        };
        if let Some(unknown) =
            waived.iter().find(|id| !rules.iter().any(|rule| &rule.rule_id == *id))
        {
            return Err(GateError::InvalidOverride(format!(
                "rule {unknown} is not part of stage {stage}"
            )));
        }

        let snapshot = self.evidence.snapshot(&run.run_id)?;
        let budget = self
            .config
            .evaluation_timeout
            .map_or_else(EvaluationBudget::unlimited, EvaluationBudget::within);
        let context = EvaluationContext {
            run_id: &run.run_id,
            commit_sha: &run.commit_sha,
            as_of,
        };
        let evaluation = self.evaluator.evaluate(&context, &rules, &snapshot, waived, &budget)?;

        decision.evidence_high_water = evaluation.evidence_high_water;
        decision.outcome = evaluation.outcome;
        decision.verdict = evaluation.verdict;
        decision.rules = evaluation.rules;
        if evaluation.outcome == DecisionOutcome::Admit {
            decision.denial = None;
            decision.next_stage = policy.next_stage(&run.environment, stage)?;
        } else {
            decision.denial = Some(DenialReason::UnsatisfiedRules);
        }
        Ok(decision)
    }

    /// Records a decision, then applies and saves it.
    fn commit(&self, run: PipelineRun, decision: Decision) -> Result<AdvanceResult, GateError> {
        self.audit.record(AuditRecord::Decision {
            decision: decision.clone(),
        })?;
        let run = apply_decision(run, &decision);
        self.runs.save(&run)?;
        Ok(AdvanceResult {
            decision,
            run,
            replayed: false,
        })
    }
}

// ============================================================================
// SECTION: Run Claims
// ============================================================================

/// Releases a run claim on drop.
struct RunClaim<'a> {
    /// Shared inflight set.
    inflight: &'a Mutex<BTreeSet<RunId>>,
    /// Claimed run.
    run_id: RunId,
}

impl Drop for RunClaim<'_> {
    fn drop(&mut self) {
        if let Ok(mut inflight) = self.inflight.lock() {
            inflight.remove(&self.run_id);
        }
    }
}

// ============================================================================
// SECTION: Transitions
// ============================================================================

/// Resolves the stage a request targets.
fn target_stage(run: &PipelineRun, requested: Option<&StageId>) -> Result<StageId, GateError> {
    match requested {
        Some(stage) if stage != &run.current_stage => Err(GateError::StageMismatch {
            expected: run.current_stage.clone(),
            requested: stage.clone(),
        }),
        _ => Ok(run.current_stage.clone()),
    }
}

/// Applies a recorded decision to run state.
fn apply_decision(mut run: PipelineRun, decision: &Decision) -> PipelineRun {
    run.decisions_applied = decision.seq;
    run.audit_entries_applied += 1;
    run.last_decision = Some(decision.decision_id.clone());
    match decision.verdict {
        GateVerdict::Admitted => {
            run.admitted_stages.push(StageProgress {
                stage: decision.stage.clone(),
                decision_id: decision.decision_id.clone(),
                admitted_at: decision.decided_at,
            });
            match &decision.next_stage {
                Some(next) => {
                    run.current_stage = next.clone();
                    run.status = RunStatus::Pending;
                    run.last_decision = None;
                }
                None => run.status = RunStatus::Admitted,
            }
        }
        GateVerdict::Blocked => run.status = RunStatus::Blocked,
        GateVerdict::Rejected => run.status = RunStatus::Rejected,
    }
    run
}

/// Applies a recorded cancellation to run state.
fn apply_cancellation(mut run: PipelineRun) -> PipelineRun {
    run.audit_entries_applied += 1;
    run.status = RunStatus::Cancelled;
    run
}
