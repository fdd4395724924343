// crates/pipeline-gate-core/tests/evidence_hub.rs
// ============================================================================
// Module: Evidence Hub Tests
// Description: Ingestion validation, deduplication, signatures, notifications.
// ============================================================================
//! ## Overview
//! Covers the ingestion path: sequence assignment, duplicate handling,
//! attestation lanes, input limits, and subscriber notices.

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

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as Base64;
use common::submission;
use ed25519_dalek::Signer;
use ed25519_dalek::SigningKey;
use pipeline_gate_core::AppendReceipt;
use pipeline_gate_core::CommitSha;
use pipeline_gate_core::EvidenceError;
use pipeline_gate_core::EvidenceHub;
use pipeline_gate_core::EvidenceId;
use pipeline_gate_core::EvidenceKind;
use pipeline_gate_core::EvidenceOutcome;
use pipeline_gate_core::EvidenceSignature;
use pipeline_gate_core::EvidenceStore;
use pipeline_gate_core::EvidenceSubmission;
use pipeline_gate_core::InMemoryEvidenceStore;
use pipeline_gate_core::KeyId;
use pipeline_gate_core::ProducerKeyring;
use pipeline_gate_core::RunId;
use pipeline_gate_core::SourceId;
use pipeline_gate_core::Timestamp;
use pipeline_gate_core::TrustLane;
use pipeline_gate_core::runtime::attestation::signature_message;

// ============================================================================
// SECTION: Helpers
// ============================================================================

fn hub() -> EvidenceHub<InMemoryEvidenceStore> {
    EvidenceHub::new(InMemoryEvidenceStore::new(), ProducerKeyring::new())
}

fn scan(ts: u64) -> EvidenceSubmission {
    submission("run-1", EvidenceKind::SecretScan, EvidenceOutcome::Pass, "scanner", ts)
}

fn signing_key() -> SigningKey {
    SigningKey::from_bytes(&[7u8; 32])
}

fn signed_hub() -> EvidenceHub<InMemoryEvidenceStore> {
    let mut keyring = ProducerKeyring::new();
    let verifying_key = signing_key().verifying_key();
    keyring.register(KeyId::new("signer-key"), SourceId::new("signer"), verifying_key);
    EvidenceHub::new(InMemoryEvidenceStore::new(), keyring)
}

fn sign(mut item: EvidenceSubmission, key: &SigningKey, key_id: &str) -> EvidenceSubmission {
    let digest = item.content_digest().unwrap();
    let signature = key.sign(&signature_message(&digest).unwrap());
    item.signature = Some(EvidenceSignature {
        key_id: KeyId::new(key_id),
        signature: Base64.encode(signature.to_bytes()),
    });
    item
}

fn signature_evidence(source: &str) -> EvidenceSubmission {
    submission("run-1", EvidenceKind::Signature, EvidenceOutcome::Pass, source, 10)
}

fn invalid_reason(result: Result<AppendReceipt, EvidenceError>) -> String {
    match result {
        Err(EvidenceError::Invalid(reason)) => reason,
        other => panic!("expected invalid evidence, got {other:?}"),
    }
}

// ============================================================================
// SECTION: Append Semantics
// ============================================================================

/// Sequence numbers are dense per run.
#[test]
fn sequences_are_per_run_and_dense() {
    let hub = hub();
    let first = hub.submit(scan(1)).unwrap();
    let second = hub.submit(scan(2)).unwrap();
    let other = hub
        .submit(submission("run-2", EvidenceKind::Sast, EvidenceOutcome::Pass, "sast", 1))
        .unwrap();
    assert_eq!(first.evidence_id, EvidenceId::new(RunId::new("run-1"), 1));
    assert_eq!(second.evidence_id.seq, 2);
    assert_eq!(other.evidence_id.seq, 1);
    assert!(!first.duplicate);
}

/// Identical resubmission returns the stored identifier.
#[test]
fn duplicate_submission_is_idempotent() {
    let hub = hub();
    let receiver = hub.subscribe().unwrap();
    let first = hub.submit(scan(5)).unwrap();
    let again = hub.submit(scan(5)).unwrap();
    assert!(again.duplicate);
    assert_eq!(again.evidence_id, first.evidence_id);
    assert_eq!(hub.snapshot(&RunId::new("run-1")).unwrap().records.len(), 1);
    assert_eq!(receiver.try_iter().count(), 1);
}

/// Same identity with different content is refused.
#[test]
fn conflicting_duplicate_is_invalid() {
    let hub = hub();
    hub.submit(scan(5)).unwrap();
    let mut conflicting = scan(5);
    conflicting.outcome = EvidenceOutcome::Fail;
    let reason = invalid_reason(hub.submit(conflicting));
    assert!(reason.contains("different content"));
    assert_eq!(hub.snapshot(&RunId::new("run-1")).unwrap().high_water, 1);
}

/// Evidence for runs that do not exist yet is kept.
#[test]
fn evidence_for_unknown_run_is_buffered() {
    let hub = hub();
    hub.submit(submission("later", EvidenceKind::Sbom, EvidenceOutcome::Pass, "sbom", 1)).unwrap();
    let snapshot = hub.snapshot(&RunId::new("later")).unwrap();
    assert_eq!(snapshot.records.len(), 1);
    assert_eq!(snapshot.run_id, Some(RunId::new("later")));
}

/// Queries return newest first and honor the kind and time filters.
#[test]
fn query_orders_newest_first() {
    let hub = hub();
    hub.submit(scan(30)).unwrap();
    hub.submit(scan(10)).unwrap();
    hub.submit(submission("run-1", EvidenceKind::Sast, EvidenceOutcome::Pass, "sast", 5)).unwrap();

    let run = RunId::new("run-1");
    let scans = hub.store().query(&run, Some(EvidenceKind::SecretScan), None).unwrap();
    let seqs: Vec<u64> = scans.iter().map(|record| record.seq()).collect();
    assert_eq!(seqs, vec![2, 1]);

    let early = hub.store().query(&run, None, Some(Timestamp::new(10))).unwrap();
    let seqs: Vec<u64> = early.iter().map(|record| record.seq()).collect();
    assert_eq!(seqs, vec![3, 2]);
}

// ============================================================================
// SECTION: Validation
// ============================================================================

/// Malformed submissions never reach the store.
#[test]
fn malformed_submissions_are_rejected() {
    let hub = hub();

    let mut bad_sha = scan(1);
    bad_sha.subject.commit_sha = CommitSha::new("NOT-HEX");
    assert!(invalid_reason(hub.submit(bad_sha)).contains("commit_sha"));

    let mut empty_source = scan(1);
    empty_source.source = SourceId::new("");
    assert!(invalid_reason(hub.submit(empty_source)).contains("source"));

    let mut control = scan(1);
    control.subject.run_id = RunId::new("run\n1");
    assert!(invalid_reason(hub.submit(control)).contains("control"));

    let mut huge_reference = scan(1);
    huge_reference.payload.reference = Some("x".repeat(4096));
    assert!(invalid_reason(hub.submit(huge_reference)).contains("reference"));

    let mut many_metrics = scan(1);
    for index in 0 .. 65 {
        many_metrics.payload.metrics.insert(format!("m{index}"), 0);
    }
    assert!(invalid_reason(hub.submit(many_metrics)).contains("metrics"));

    assert!(hub.snapshot(&RunId::new("run-1")).unwrap().records.is_empty());
}

// ============================================================================
// SECTION: Attestation
// ============================================================================

/// Unsigned evidence lands in the asserted lane.
#[test]
fn unsigned_evidence_is_asserted() {
    let hub = signed_hub();
    hub.submit(signature_evidence("signer")).unwrap();
    let snapshot = hub.snapshot(&RunId::new("run-1")).unwrap();
    assert_eq!(snapshot.records[0].lane, TrustLane::Asserted);
}

/// A valid signature from the bound source is verified.
#[test]
fn valid_signature_is_verified() {
    let hub = signed_hub();
    let signed = sign(signature_evidence("signer"), &signing_key(), "signer-key");
    hub.submit(signed).unwrap();
    let snapshot = hub.snapshot(&RunId::new("run-1")).unwrap();
    assert_eq!(snapshot.records[0].lane, TrustLane::Verified);
    assert!(snapshot.records[0].signature.is_some());
}

/// Tampering after signing invalidates the signature.
#[test]
fn tampered_evidence_is_rejected() {
    let hub = signed_hub();
    let mut signed = sign(signature_evidence("signer"), &signing_key(), "signer-key");
    signed.outcome = EvidenceOutcome::Fail;
    assert!(invalid_reason(hub.submit(signed)).contains("verification failed"));
}

/// Keys are bound to one source and must be registered.
#[test]
fn key_source_binding_is_enforced() {
    let hub = signed_hub();

    let impostor = sign(signature_evidence("impostor"), &signing_key(), "signer-key");
    assert!(invalid_reason(hub.submit(impostor)).contains("not authorized"));

    let unknown = sign(signature_evidence("signer"), &signing_key(), "other-key");
    assert!(invalid_reason(hub.submit(unknown)).contains("not registered"));

    let other_key = SigningKey::from_bytes(&[9u8; 32]);
    let wrong_key = sign(signature_evidence("signer"), &other_key, "signer-key");
    assert!(invalid_reason(hub.submit(wrong_key)).contains("verification failed"));
}

/// Base64 key registration validates length.
#[test]
fn register_base64_rejects_short_keys() {
    let mut keyring = ProducerKeyring::new();
    let short = Base64.encode([1u8; 16]);
    assert!(keyring.register_base64(KeyId::new("k"), SourceId::new("s"), &short).is_err());
    let valid = Base64.encode(signing_key().verifying_key().to_bytes());
    keyring.register_base64(KeyId::new("k"), SourceId::new("s"), &valid).unwrap();
    assert_eq!(keyring.len(), 1);
}

// ============================================================================
// SECTION: Notifications
// ============================================================================

/// Subscribers receive one notice per new record; closed channels are pruned.
#[test]
fn subscribers_receive_notices() {
    let hub = hub();
    let live = hub.subscribe().unwrap();
    let closed = hub.subscribe().unwrap();
    drop(closed);

    hub.submit(scan(1)).unwrap();
    hub.submit(scan(2)).unwrap();
    let notices: Vec<_> = live.try_iter().collect();
    assert_eq!(notices.len(), 2);
    assert_eq!(notices[1].run_id(), &RunId::new("run-1"));
    assert_eq!(notices[1].kind, EvidenceKind::SecretScan);
    assert_eq!(notices[1].evidence_id.seq, 2);
}
