// crates/pipeline-gate-core/src/runtime/evaluator.rs
// ============================================================================
// Module: Pipeline Gate Evaluator
// Description: Deterministic rule evaluation against evidence snapshots.
// Purpose: Turn (evidence, rules, stage, as_of) into an admission verdict.
// Dependencies: crate::core
// ============================================================================

//! ## Overview
//! The evaluator is stateless. Each rule is evaluated against one consistent
//! [`EvidenceSnapshot`]:
//!
//! 1. Filter to the rule's kind, the run, the run's commit, trusted sources,
//!    the minimum trust lane, and timestamps not newer than `as_of`.
//! 2. Drop records older than the freshness window (inclusive bound).
//! 3. Select the most recent record, the last `N`, or the latest record per
//!    distinct source, ordered by sequence number.
//! 4. Apply predicates with exact integer comparison.
//!
//! Absence of evidence is never an implicit pass. Only a failed predicate is
//! terminal; every other unsatisfied reason blocks pending more evidence.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeSet;
use std::time::Duration;
use std::time::Instant;

use thiserror::Error;

use crate::core::Aggregation;
use crate::core::CommitSha;
use crate::core::DecisionOutcome;
use crate::core::Evidence;
use crate::core::EvidenceId;
use crate::core::EvidenceOutcome;
use crate::core::EvidencePredicate;
use crate::core::EvidenceSnapshot;
use crate::core::GateVerdict;
use crate::core::PolicyRule;
use crate::core::RuleEvaluation;
use crate::core::RuleId;
use crate::core::RuleStatus;
use crate::core::RunId;
use crate::core::Timestamp;
use crate::core::UnsatisfiedReason;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Evaluation failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum EvaluationError {
    /// Evaluation exceeded its time budget.
    #[error("evaluation exceeded its time budget")]
    Timeout,
}

// ============================================================================
// SECTION: Inputs and Outputs
// ============================================================================

/// Run-specific inputs to an evaluation.
#[derive(Debug, Clone, Copy)]
pub struct EvaluationContext<'a> {
    /// Run under evaluation.
    pub run_id: &'a RunId,
    /// Commit the run is bound to.
    pub commit_sha: &'a CommitSha,
    /// Evidence cutoff.
    pub as_of: Timestamp,
}

/// Wall-clock budget for a single evaluation.
#[derive(Debug, Clone, Copy, Default)]
pub struct EvaluationBudget {
    /// Deadline after which evaluation fails.
    deadline: Option<Instant>,
}

impl EvaluationBudget {
    /// Returns a budget without a deadline.
    #[must_use]
    pub const fn unlimited() -> Self {
        Self {
            deadline: None,
        }
    }

    /// Returns a budget expiring `timeout` from now.
    #[must_use]
    pub fn within(timeout: Duration) -> Self {
        Self {
            deadline: Instant::now().checked_add(timeout),
        }
    }

    /// Fails when the deadline has passed.
    fn check(&self) -> Result<(), EvaluationError> {
        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => Err(EvaluationError::Timeout),
            _ => Ok(()),
        }
    }
}

/// Result of evaluating a rule set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Evaluation {
    /// Overall outcome.
    pub outcome: DecisionOutcome,
    /// Lifecycle verdict.
    pub verdict: GateVerdict,
    /// Per-rule evaluations in rule order.
    pub rules: Vec<RuleEvaluation>,
    /// High-water sequence of the snapshot evaluated.
    pub evidence_high_water: u64,
}

// ============================================================================
// SECTION: Evaluator
// ============================================================================

/// Stateless rule evaluator.
#[derive(Debug, Clone, Copy, Default)]
pub struct Evaluator;

impl Evaluator {
    /// Creates a new evaluator.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Evaluates every rule and derives the overall verdict.
    ///
    /// Rules named in `waived` are reported as [`RuleStatus::Waived`]; the
    /// evidence they would have used is still recorded.
    ///
    /// # Errors
    ///
    /// Returns [`EvaluationError::Timeout`] when `budget` expires.
    pub fn evaluate(
        &self,
        context: &EvaluationContext<'_>,
        rules: &[PolicyRule],
        snapshot: &EvidenceSnapshot,
        waived: &BTreeSet<RuleId>,
        budget: &EvaluationBudget,
    ) -> Result<Evaluation, EvaluationError> {
        let mut evaluations = Vec::with_capacity(rules.len());
        for rule in rules {
            budget.check()?;
            let mut evaluation = self.evaluate_rule(context, rule, snapshot);
            if waived.contains(&rule.rule_id) {
                evaluation.status = RuleStatus::Waived;
            }
            evaluations.push(evaluation);
        }
        let (outcome, verdict) = verdict_for(&evaluations);
        Ok(Evaluation {
            outcome,
            verdict,
            rules: evaluations,
            evidence_high_water: snapshot.high_water,
        })
    }

    /// Evaluates a single rule.
    #[must_use]
    pub fn evaluate_rule(
        &self,
        context: &EvaluationContext<'_>,
        rule: &PolicyRule,
        snapshot: &EvidenceSnapshot,
    ) -> RuleEvaluation {
        let candidates: Vec<&Evidence> = snapshot
            .records
            .iter()
            .rev()
            .filter(|record| record.kind == rule.kind)
            .filter(|record| &record.subject.run_id == context.run_id)
            .filter(|record| &record.subject.commit_sha == context.commit_sha)
            .filter(|record| record.timestamp <= context.as_of)
            .filter(|record| rule.trusts(&record.source))
            .filter(|record| record.lane.satisfies(rule.min_trust))
            .collect();

        if candidates.is_empty() {
            return unsatisfied(rule, UnsatisfiedReason::MissingEvidence, Vec::new());
        }

        let fresh: Vec<&Evidence> = match rule.freshness_window {
            Some(window) => candidates
                .iter()
                .copied()
                .filter(|record| context.as_of.ticks_since(record.timestamp) <= window)
                .collect(),
            None => candidates.clone(),
        };
        if fresh.is_empty() {
            let newest =
                candidates.iter().map(|record| record.timestamp).max().unwrap_or_default();
            let window = rule.freshness_window.unwrap_or_default();
            return unsatisfied(
                rule,
                UnsatisfiedReason::StaleEvidence {
                    newest,
                    window,
                },
                Vec::new(),
            );
        }

        if let Some(required) = rule.min_distinct_sources {
            return evaluate_distinct_sources(rule, &fresh, required);
        }
        match rule.aggregation {
            Aggregation::Latest => {
                let selected = &fresh[.. 1];
                combine(rule, selected)
            }
            Aggregation::AllOfLast {
                count,
            } => {
                let window = usize::try_from(count).unwrap_or(usize::MAX);
                if fresh.len() < window {
                    return unsatisfied(
                        rule,
                        UnsatisfiedReason::InsufficientEvidence {
                            required: count,
                            observed: saturating_u32(fresh.len()),
                        },
                        evidence_ids(&fresh),
                    );
                }
                combine(rule, &fresh[.. window])
            }
        }
    }
}

// ============================================================================
// SECTION: Selection
// ============================================================================

/// Evaluates the latest record per distinct source against a reviewer count.
fn evaluate_distinct_sources(
    rule: &PolicyRule,
    fresh: &[&Evidence],
    required: u32,
) -> RuleEvaluation {
    let mut seen = BTreeSet::new();
    let latest_per_source: Vec<&Evidence> =
        fresh.iter().copied().filter(|record| seen.insert(&record.source)).collect();

    let mut passing = Vec::new();
    for record in &latest_per_source {
        match check_record(rule, record) {
            Check::Pass => passing.push(*record),
            Check::Unsatisfied(reason) if reason.is_terminal() => {
                return unsatisfied(rule, reason, vec![record.id.clone()]);
            }
            Check::Unsatisfied(_) => {}
        }
    }

    let observed = saturating_u32(passing.len());
    if observed >= required {
        return RuleEvaluation {
            rule_id: rule.rule_id.clone(),
            kind: rule.kind,
            status: RuleStatus::Satisfied,
            evidence_used: evidence_ids(&passing),
        };
    }
    unsatisfied(
        rule,
        UnsatisfiedReason::InsufficientEvidence {
            required,
            observed,
        },
        evidence_ids(&latest_per_source),
    )
}

/// Combines predicate checks over every selected record.
///
/// A failed predicate outranks every other reason; otherwise the first
/// non-passing reason in selection order is reported.
fn combine(rule: &PolicyRule, selected: &[&Evidence]) -> RuleEvaluation {
    let used = evidence_ids(selected);
    let mut first_reason = None;
    for record in selected {
        if let Check::Unsatisfied(reason) = check_record(rule, record) {
            if reason.is_terminal() {
                return unsatisfied(rule, reason, used);
            }
            first_reason.get_or_insert(reason);
        }
    }
    match first_reason {
        Some(reason) => unsatisfied(rule, reason, used),
        None => RuleEvaluation {
            rule_id: rule.rule_id.clone(),
            kind: rule.kind,
            status: RuleStatus::Satisfied,
            evidence_used: used,
        },
    }
}

// ============================================================================
// SECTION: Predicates
// ============================================================================

/// Result of checking one record against a rule's predicates.
enum Check {
    /// Every predicate held.
    Pass,
    /// At least one predicate did not hold.
    Unsatisfied(UnsatisfiedReason),
}

/// Applies every predicate of `rule` to `record`.
fn check_record(rule: &PolicyRule, record: &Evidence) -> Check {
    if record.outcome == EvidenceOutcome::Unknown {
        return Check::Unsatisfied(UnsatisfiedReason::IndeterminateOutcome);
    }
    let mut first_reason = None;
    for predicate in &rule.predicates {
        let reason = match predicate {
            EvidencePredicate::OutcomeIs {
                outcome,
            } => (record.outcome != *outcome).then(|| UnsatisfiedReason::PredicateFailed {
                detail: format!(
                    "outcome was {}, expected {}",
                    record.outcome.as_str(),
                    outcome.as_str()
                ),
            }),
            EvidencePredicate::MetricAtMost {
                metric,
                max,
            } => match record.payload.metrics.get(metric) {
                None => Some(UnsatisfiedReason::MissingMetric {
                    metric: metric.clone(),
                }),
                Some(value) if value > max => Some(UnsatisfiedReason::PredicateFailed {
                    detail: format!("metric {metric} = {value} exceeds maximum {max}"),
                }),
                Some(_) => None,
            },
            EvidencePredicate::MetricAtLeast {
                metric,
                min,
            } => match record.payload.metrics.get(metric) {
                None => Some(UnsatisfiedReason::MissingMetric {
                    metric: metric.clone(),
                }),
                Some(value) if value < min => Some(UnsatisfiedReason::PredicateFailed {
                    detail: format!("metric {metric} = {value} is below minimum {min}"),
                }),
                Some(_) => None,
            },
        };
        if let Some(reason) = reason {
            if reason.is_terminal() {
                return Check::Unsatisfied(reason);
            }
            first_reason.get_or_insert(reason);
        }
    }
    first_reason.map_or(Check::Pass, Check::Unsatisfied)
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Derives the outcome and verdict from rule evaluations.
///
/// An empty rule set never admits.
#[must_use]
pub fn verdict_for(evaluations: &[RuleEvaluation]) -> (DecisionOutcome, GateVerdict) {
    if evaluations.is_empty() {
        return (DecisionOutcome::Deny, GateVerdict::Blocked);
    }
    if evaluations.iter().all(|evaluation| evaluation.status.is_passing()) {
        return (DecisionOutcome::Admit, GateVerdict::Admitted);
    }
    let rejected = evaluations.iter().any(|evaluation| {
        matches!(&evaluation.status, RuleStatus::Unsatisfied { reason } if reason.is_terminal())
    });
    if rejected {
        (DecisionOutcome::Deny, GateVerdict::Rejected)
    } else {
        (DecisionOutcome::Deny, GateVerdict::Blocked)
    }
}

/// Builds an unsatisfied rule evaluation.
fn unsatisfied(
    rule: &PolicyRule,
    reason: UnsatisfiedReason,
    evidence_used: Vec<EvidenceId>,
) -> RuleEvaluation {
    RuleEvaluation {
        rule_id: rule.rule_id.clone(),
        kind: rule.kind,
        status: RuleStatus::Unsatisfied {
            reason,
        },
        evidence_used,
    }
}

/// Collects evidence identifiers in selection order.
fn evidence_ids(records: &[&Evidence]) -> Vec<EvidenceId> {
    records.iter().map(|record| record.id.clone()).collect()
}

/// Converts a count to `u32`, saturating.
fn saturating_u32(value: usize) -> u32 {
    u32::try_from(value).unwrap_or(u32::MAX)
}
