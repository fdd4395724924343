// crates/pipeline-gate-core/tests/proptest_evaluator.rs
// ============================================================================
// Module: Evaluator Property-Based Tests
// Description: Property tests for evaluator determinism and bounds.
// Purpose: Check threshold and freshness invariants across wide input ranges.
// ============================================================================

//! Property-based tests for evaluator invariants.

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
    reason = "Test-only assertions and helpers are permitted."
)]

mod common;

use std::collections::BTreeSet;

use common::submission;
use common::with_metrics;
use pipeline_gate_core::CommitSha;
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
use pipeline_gate_core::RunId;
use pipeline_gate_core::Timestamp;
use pipeline_gate_core::runtime::Evaluation;
use pipeline_gate_core::runtime::EvaluationBudget;
use pipeline_gate_core::runtime::EvaluationContext;
use pipeline_gate_core::runtime::Evaluator;
use proptest::prelude::*;

fn snapshot_of(submissions: Vec<EvidenceSubmission>) -> EvidenceSnapshot {
    let hub = EvidenceHub::new(InMemoryEvidenceStore::new(), ProducerKeyring::new());
    for item in submissions {
        // Random inputs can collide on identity with different content.
        let _ = hub.submit(item);
    }
    hub.snapshot(&RunId::new("run-1")).unwrap()
}

fn evaluate(rules: &[PolicyRule], snapshot: &EvidenceSnapshot, as_of: u64) -> Evaluation {
    let run_id = RunId::new("run-1");
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

fn outcome_strategy() -> impl Strategy<Value = EvidenceOutcome> {
    prop_oneof![
        Just(EvidenceOutcome::Pass),
        Just(EvidenceOutcome::Fail),
        Just(EvidenceOutcome::Unknown),
    ]
}

fn kind_strategy() -> impl Strategy<Value = EvidenceKind> {
    prop::sample::select(EvidenceKind::ALL.to_vec())
}

proptest! {
    #[test]
    fn evaluation_is_deterministic(
        records in prop::collection::vec(
            (kind_strategy(), outcome_strategy(), 0u64 .. 100, 0usize .. 3),
            0 .. 16,
        ),
        as_of in 0u64 .. 120,
    ) {
        let submissions = records
            .into_iter()
            .map(|(kind, outcome, ts, source)| {
                submission("run-1", kind, outcome, &format!("source-{source}"), ts)
            })
            .collect();
        let snapshot = snapshot_of(submissions);
        let rules: Vec<PolicyRule> = EvidenceKind::ALL
            .iter()
            .map(|kind| PolicyRule::requires_pass(kind.as_str(), "deploy", *kind))
            .collect();
        let first = evaluate(&rules, &snapshot, as_of);
        let second = evaluate(&rules, &snapshot, as_of);
        prop_assert_eq!(&first, &second);
        prop_assert_eq!(first.evidence_high_water, snapshot.high_water);
        let admitted = first.verdict == GateVerdict::Admitted;
        prop_assert_eq!(admitted, first.rules.iter().all(|rule| rule.status.is_passing()));
    }

    #[test]
    fn metric_ceiling_is_inclusive(value in -1_000i64 .. 1_000, max in -1_000i64 .. 1_000) {
        let mut rule = PolicyRule::requires_pass("deps", "deploy", EvidenceKind::DependencyScan);
        rule.predicates.push(EvidencePredicate::MetricAtMost {
            metric: "critical".to_string(),
            max,
        });
        let record = with_metrics(
            submission("run-1", EvidenceKind::DependencyScan, EvidenceOutcome::Pass, "deps", 1),
            &[("critical", value)],
        );
        let evaluation = evaluate(&[rule], &snapshot_of(vec![record]), 10);
        let expected = if value <= max { GateVerdict::Admitted } else { GateVerdict::Rejected };
        prop_assert_eq!(evaluation.verdict, expected);
    }

    #[test]
    fn freshness_window_is_inclusive(
        ts in 0u64 .. 1_000,
        age in 0u64 .. 100,
        window in 0u64 .. 100,
    ) {
        let mut rule = PolicyRule::requires_pass("sig", "deploy", EvidenceKind::Signature);
        rule.freshness_window = Some(window);
        let record = submission("run-1", EvidenceKind::Signature, EvidenceOutcome::Pass, "s", ts);
        let evaluation = evaluate(&[rule], &snapshot_of(vec![record]), ts + age);
        let expected = if age <= window { GateVerdict::Admitted } else { GateVerdict::Blocked };
        prop_assert_eq!(evaluation.verdict, expected);
    }
}
