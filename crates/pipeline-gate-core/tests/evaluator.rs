// crates/pipeline-gate-core/tests/evaluator.rs
// ============================================================================
// Module: Evaluator Tests
// Description: Rule selection, freshness, aggregation, and verdict tests.
// ============================================================================
//! ## Overview
//! Exercises the stateless evaluator against snapshots built through the
//! evidence hub so records carry real sequence numbers and trust lanes.

#![allow(
    clippy::panic,
    clippy::print_stdout,
    clippy::print_stderr,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::use_debug,
    clippy::dbg_macro,
    clippy::panic_in_result_fn,
    clippy::unwrap_in_result,
    reason = "Test-only output and panic-based assertions are permitted."
)]

mod common;

use std::collections::BTreeSet;
use std::time::Duration;

use common::submission;
use common::with_metrics;
use pipeline_gate_core::Aggregation;
use pipeline_gate_core::CommitSha;
use pipeline_gate_core::DecisionOutcome;
use pipeline_gate_core::EvidenceHub;
use pipeline_gate_core::EvidenceKind;
use pipeline_gate_core::EvidenceOutcome;
use pipeline_gate_core::EvidencePredicate;
use pipeline_gate_core::EvidenceSnapshot;
use pipeline_gate_core::EvidenceSubmission;
use pipeline_gate_core::GateVerdict;
use pipeline_gate_core::InMemoryEvidenceStore;
use pipeline_gate_core::PolicyRule;
use pipeline_gate_core::ProducerKeyring;
use pipeline_gate_core::RuleId;
use pipeline_gate_core::RuleStatus;
use pipeline_gate_core::RunId;
use pipeline_gate_core::SourceId;
use pipeline_gate_core::Timestamp;
use pipeline_gate_core::TrustLane;
use pipeline_gate_core::UnsatisfiedReason;
use pipeline_gate_core::runtime::Evaluation;
use pipeline_gate_core::runtime::EvaluationBudget;
use pipeline_gate_core::runtime::EvaluationContext;
use pipeline_gate_core::runtime::EvaluationError;
use pipeline_gate_core::runtime::Evaluator;

// ============================================================================
// SECTION: Helpers
// ============================================================================

const RUN: &str = "run-1";

fn snapshot_of(submissions: Vec<EvidenceSubmission>) -> EvidenceSnapshot {
    let hub = EvidenceHub::new(InMemoryEvidenceStore::new(), ProducerKeyring::new());
    for item in submissions {
        hub.submit(item).unwrap();
    }
    hub.snapshot(&RunId::new(RUN)).unwrap()
}

fn evaluate(rules: &[PolicyRule], snapshot: &EvidenceSnapshot, as_of: u64) -> Evaluation {
    let run_id = RunId::new(RUN);
    let commit = CommitSha::new(common::COMMIT);
    let context = EvaluationContext {
        run_id: &run_id,
        commit_sha: &commit,
        as_of: Timestamp::new(as_of),
    };
    Evaluator::new()
        .evaluate(&context, rules, snapshot, &BTreeSet::new(), &EvaluationBudget::unlimited())
        .unwrap()
}

fn pass(kind: EvidenceKind, source: &str, ts: u64) -> EvidenceSubmission {
    submission(RUN, kind, EvidenceOutcome::Pass, source, ts)
}

fn fail(kind: EvidenceKind, source: &str, ts: u64) -> EvidenceSubmission {
    submission(RUN, kind, EvidenceOutcome::Fail, source, ts)
}

fn production_rules() -> Vec<PolicyRule> {
    vec![
        PolicyRule::requires_pass("secret-scan", "deploy", EvidenceKind::SecretScan),
        PolicyRule::requires_pass("signature", "deploy", EvidenceKind::Signature),
    ]
}

fn reason_of(evaluation: &Evaluation, index: usize) -> UnsatisfiedReason {
    match &evaluation.rules[index].status {
        RuleStatus::Unsatisfied {
            reason,
        } => reason.clone(),
        other => panic!("expected unsatisfied rule, got {other:?}"),
    }
}

fn critical_threshold_rule(max: i64) -> PolicyRule {
    let mut rule = PolicyRule::requires_pass("deps", "deploy", EvidenceKind::DependencyScan);
    rule.predicates.push(EvidencePredicate::MetricAtMost {
        metric: "critical".to_string(),
        max,
    });
    rule
}

// ============================================================================
// SECTION: Scenarios
// ============================================================================

/// Missing signature blocks; adding it later admits.
#[test]
fn missing_signature_blocks_then_admits() {
    let rules = production_rules();
    let mut evidence = vec![pass(EvidenceKind::SecretScan, "scanner", 10)];

    let first = evaluate(&rules, &snapshot_of(evidence.clone()), 20);
    assert_eq!(first.outcome, DecisionOutcome::Deny);
    assert_eq!(first.verdict, GateVerdict::Blocked);
    assert_eq!(first.rules[0].status, RuleStatus::Satisfied);
    assert_eq!(reason_of(&first, 1), UnsatisfiedReason::MissingEvidence);

    evidence.push(pass(EvidenceKind::Signature, "signer", 15));
    let second = evaluate(&rules, &snapshot_of(evidence), 20);
    assert_eq!(second.outcome, DecisionOutcome::Admit);
    assert_eq!(second.verdict, GateVerdict::Admitted);
    assert_eq!(second.evidence_high_water, 2);
}

/// Evidence outside the freshness window is treated as absent.
#[test]
fn stale_signature_is_denied() {
    let mut rule = PolicyRule::requires_pass("signature", "deploy", EvidenceKind::Signature);
    rule.freshness_window = Some(10);
    let snapshot = snapshot_of(vec![pass(EvidenceKind::Signature, "signer", 30)]);

    let evaluation = evaluate(&[rule], &snapshot, 50);
    assert_eq!(evaluation.verdict, GateVerdict::Blocked);
    assert_eq!(
        reason_of(&evaluation, 0),
        UnsatisfiedReason::StaleEvidence {
            newest: Timestamp::new(30),
            window: 10,
        }
    );
    assert!(evaluation.rules[0].evidence_used.is_empty());
}

/// The freshness bound is inclusive.
#[test]
fn freshness_boundary_is_inclusive() {
    let mut rule = PolicyRule::requires_pass("signature", "deploy", EvidenceKind::Signature);
    rule.freshness_window = Some(10);
    let snapshot = snapshot_of(vec![pass(EvidenceKind::Signature, "signer", 40)]);

    assert_eq!(evaluate(&[rule.clone()], &snapshot, 50).verdict, GateVerdict::Admitted);
    assert_eq!(evaluate(&[rule], &snapshot, 51).verdict, GateVerdict::Blocked);
}

/// Records newer than `as_of` are invisible.
#[test]
fn evidence_after_as_of_is_ignored() {
    let snapshot = snapshot_of(vec![pass(EvidenceKind::Signature, "signer", 25)]);
    let rules = vec![PolicyRule::requires_pass("signature", "deploy", EvidenceKind::Signature)];
    let evaluation = evaluate(&rules, &snapshot, 20);
    assert_eq!(reason_of(&evaluation, 0), UnsatisfiedReason::MissingEvidence);
}

/// An empty snapshot never passes.
#[test]
fn zero_records_fail_closed() {
    let evaluation = evaluate(&production_rules(), &EvidenceSnapshot::default(), 100);
    assert_eq!(evaluation.outcome, DecisionOutcome::Deny);
    assert!(evaluation.rules.iter().all(|rule| !rule.status.is_passing()));
}

/// An empty rule set never admits.
#[test]
fn empty_rule_set_never_admits() {
    let evaluation = evaluate(&[], &EvidenceSnapshot::default(), 100);
    assert_eq!(evaluation.outcome, DecisionOutcome::Deny);
    assert_eq!(evaluation.verdict, GateVerdict::Blocked);
}

// ============================================================================
// SECTION: Selection
// ============================================================================

/// The highest sequence wins even when its timestamp is older.
#[test]
fn latest_sequence_wins_over_timestamp() {
    let snapshot = snapshot_of(vec![
        pass(EvidenceKind::SecretScan, "scanner", 20),
        fail(EvidenceKind::SecretScan, "scanner", 10),
    ]);
    let rules = vec![PolicyRule::requires_pass("secret-scan", "deploy", EvidenceKind::SecretScan)];
    let evaluation = evaluate(&rules, &snapshot, 30);
    assert_eq!(evaluation.verdict, GateVerdict::Rejected);
    assert_eq!(evaluation.rules[0].evidence_used[0].seq, 2);
}

/// A failing predicate rejects; an unknown outcome only blocks.
#[test]
fn fail_rejects_unknown_blocks() {
    let rules = vec![PolicyRule::requires_pass("sast", "deploy", EvidenceKind::Sast)];

    let failed = evaluate(&rules, &snapshot_of(vec![fail(EvidenceKind::Sast, "sast", 5)]), 10);
    assert_eq!(failed.verdict, GateVerdict::Rejected);
    assert!(matches!(reason_of(&failed, 0), UnsatisfiedReason::PredicateFailed { .. }));

    let unknown = evaluate(
        &rules,
        &snapshot_of(vec![submission(
            RUN,
            EvidenceKind::Sast,
            EvidenceOutcome::Unknown,
            "sast",
            5,
        )]),
        10,
    );
    assert_eq!(unknown.verdict, GateVerdict::Blocked);
    assert_eq!(reason_of(&unknown, 0), UnsatisfiedReason::IndeterminateOutcome);
}

/// Rejection takes priority over blocking across rules.
#[test]
fn any_terminal_failure_rejects_stage() {
    let snapshot = snapshot_of(vec![fail(EvidenceKind::SecretScan, "scanner", 5)]);
    let evaluation = evaluate(&production_rules(), &snapshot, 10);
    assert_eq!(evaluation.verdict, GateVerdict::Rejected);
    assert_eq!(reason_of(&evaluation, 1), UnsatisfiedReason::MissingEvidence);
}

/// Evidence for another commit does not count.
#[test]
fn other_commit_evidence_is_ignored() {
    let mut other = pass(EvidenceKind::Signature, "signer", 5);
    other.subject.commit_sha = CommitSha::new("fffffff");
    let rules = vec![PolicyRule::requires_pass("signature", "deploy", EvidenceKind::Signature)];
    let evaluation = evaluate(&rules, &snapshot_of(vec![other]), 10);
    assert_eq!(reason_of(&evaluation, 0), UnsatisfiedReason::MissingEvidence);
}

/// Untrusted sources are filtered before selection.
#[test]
fn untrusted_sources_are_filtered() {
    let mut rule = PolicyRule::requires_pass("signature", "deploy", EvidenceKind::Signature);
    rule.trusted_sources = vec![SourceId::new("sigstore")];
    let snapshot = snapshot_of(vec![
        pass(EvidenceKind::Signature, "sigstore", 5),
        fail(EvidenceKind::Signature, "random-bot", 6),
    ]);
    let evaluation = evaluate(&[rule], &snapshot, 10);
    assert_eq!(evaluation.verdict, GateVerdict::Admitted);
    assert_eq!(evaluation.rules[0].evidence_used[0].seq, 1);
}

/// Asserted evidence does not satisfy a verified-only rule.
#[test]
fn min_trust_excludes_asserted_evidence() {
    let mut rule = PolicyRule::requires_pass("signature", "deploy", EvidenceKind::Signature);
    rule.min_trust = TrustLane::Verified;
    let snapshot = snapshot_of(vec![pass(EvidenceKind::Signature, "signer", 5)]);
    assert_eq!(snapshot.records[0].lane, TrustLane::Asserted);
    let evaluation = evaluate(&[rule], &snapshot, 10);
    assert_eq!(reason_of(&evaluation, 0), UnsatisfiedReason::MissingEvidence);
}

// ============================================================================
// SECTION: Thresholds
// ============================================================================

/// Metric thresholds compare exact integers inclusively.
#[test]
fn metric_threshold_is_inclusive() {
    let at_bound = snapshot_of(vec![with_metrics(
        pass(EvidenceKind::DependencyScan, "deps", 5),
        &[("critical", 0)],
    )]);
    let admitted = evaluate(&[critical_threshold_rule(0)], &at_bound, 10);
    assert_eq!(admitted.verdict, GateVerdict::Admitted);

    let above = snapshot_of(vec![with_metrics(
        pass(EvidenceKind::DependencyScan, "deps", 5),
        &[("critical", 1)],
    )]);
    let evaluation = evaluate(&[critical_threshold_rule(0)], &above, 10);
    assert_eq!(evaluation.verdict, GateVerdict::Rejected);
    assert_eq!(
        reason_of(&evaluation, 0),
        UnsatisfiedReason::PredicateFailed {
            detail: "metric critical = 1 exceeds maximum 0".to_string(),
        }
    );
}

/// A missing metric blocks instead of passing.
#[test]
fn missing_metric_blocks() {
    let snapshot = snapshot_of(vec![pass(EvidenceKind::DependencyScan, "deps", 5)]);
    let evaluation = evaluate(&[critical_threshold_rule(0)], &snapshot, 10);
    assert_eq!(evaluation.verdict, GateVerdict::Blocked);
    assert_eq!(
        reason_of(&evaluation, 0),
        UnsatisfiedReason::MissingMetric {
            metric: "critical".to_string(),
        }
    );
}

/// Lower bounds apply to approvals-style metrics.
#[test]
fn metric_at_least_enforces_minimum() {
    let mut rule = PolicyRule::requires_pass("coverage", "deploy", EvidenceKind::Sast);
    rule.predicates = vec![EvidencePredicate::MetricAtLeast {
        metric: "coverage".to_string(),
        min: 80,
    }];
    let coverage = |value: i64| {
        snapshot_of(vec![with_metrics(pass(EvidenceKind::Sast, "sast", 1), &[("coverage", value)])])
    };
    let low = coverage(79);
    let ok = coverage(80);
    assert_eq!(evaluate(&[rule.clone()], &low, 5).verdict, GateVerdict::Rejected);
    assert_eq!(evaluate(&[rule], &ok, 5).verdict, GateVerdict::Admitted);
}

// ============================================================================
// SECTION: Aggregation
// ============================================================================

/// All of the last N records must pass.
#[test]
fn all_of_last_requires_every_recent_record() {
    let mut rule = PolicyRule::requires_pass("sast", "deploy", EvidenceKind::Sast);
    rule.aggregation = Aggregation::AllOfLast {
        count: 2,
    };

    let short = evaluate(&[rule.clone()], &snapshot_of(vec![pass(EvidenceKind::Sast, "a", 1)]), 10);
    assert_eq!(
        reason_of(&short, 0),
        UnsatisfiedReason::InsufficientEvidence {
            required: 2,
            observed: 1,
        }
    );

    let mixed = evaluate(
        &[rule.clone()],
        &snapshot_of(vec![
            pass(EvidenceKind::Sast, "a", 1),
            fail(EvidenceKind::Sast, "a", 2),
            pass(EvidenceKind::Sast, "a", 3),
        ]),
        10,
    );
    assert_eq!(mixed.verdict, GateVerdict::Rejected);
    assert_eq!(mixed.rules[0].evidence_used.len(), 2);

    let recovered = evaluate(
        &[rule],
        &snapshot_of(vec![
            fail(EvidenceKind::Sast, "a", 1),
            pass(EvidenceKind::Sast, "a", 2),
            pass(EvidenceKind::Sast, "a", 3),
        ]),
        10,
    );
    assert_eq!(recovered.verdict, GateVerdict::Admitted);
}

/// Reviewer counts use the latest record per distinct source.
#[test]
fn min_distinct_sources_counts_reviewers() {
    let mut rule = PolicyRule::requires_pass("approvals", "deploy", EvidenceKind::Approval);
    rule.min_distinct_sources = Some(2);

    let one_reviewer_twice = evaluate(
        &[rule.clone()],
        &snapshot_of(vec![
            pass(EvidenceKind::Approval, "alice", 1),
            pass(EvidenceKind::Approval, "alice", 2),
        ]),
        10,
    );
    assert_eq!(
        reason_of(&one_reviewer_twice, 0),
        UnsatisfiedReason::InsufficientEvidence {
            required: 2,
            observed: 1,
        }
    );

    let two_reviewers = evaluate(
        &[rule.clone()],
        &snapshot_of(vec![
            pass(EvidenceKind::Approval, "alice", 1),
            pass(EvidenceKind::Approval, "bob", 2),
        ]),
        10,
    );
    assert_eq!(two_reviewers.verdict, GateVerdict::Admitted);
    assert_eq!(two_reviewers.rules[0].evidence_used.len(), 2);

    let changes_requested = evaluate(
        &[rule],
        &snapshot_of(vec![
            pass(EvidenceKind::Approval, "alice", 1),
            pass(EvidenceKind::Approval, "bob", 2),
            fail(EvidenceKind::Approval, "carol", 3),
        ]),
        10,
    );
    assert_eq!(changes_requested.verdict, GateVerdict::Rejected);
}

// ============================================================================
// SECTION: Waivers and Budgets
// ============================================================================

/// Waived rules do not block and are reported as waived.
#[test]
fn waived_rule_is_marked_and_admits() {
    let run_id = RunId::new(RUN);
    let commit = CommitSha::new(common::COMMIT);
    let context = EvaluationContext {
        run_id: &run_id,
        commit_sha: &commit,
        as_of: Timestamp::new(20),
    };
    let snapshot = snapshot_of(vec![pass(EvidenceKind::SecretScan, "scanner", 10)]);
    let waived: BTreeSet<RuleId> = [RuleId::new("signature")].into_iter().collect();
    let evaluation = Evaluator::new()
        .evaluate(&context, &production_rules(), &snapshot, &waived, &EvaluationBudget::unlimited())
        .unwrap();
    assert_eq!(evaluation.verdict, GateVerdict::Admitted);
    assert_eq!(evaluation.rules[1].status, RuleStatus::Waived);
}

/// An exhausted budget fails with a timeout.
#[test]
fn exhausted_budget_times_out() {
    let run_id = RunId::new(RUN);
    let commit = CommitSha::new(common::COMMIT);
    let context = EvaluationContext {
        run_id: &run_id,
        commit_sha: &commit,
        as_of: Timestamp::new(20),
    };
    let result = Evaluator::new().evaluate(
        &context,
        &production_rules(),
        &EvidenceSnapshot::default(),
        &BTreeSet::new(),
        &EvaluationBudget::within(Duration::ZERO),
    );
    assert_eq!(result, Err(EvaluationError::Timeout));
}
