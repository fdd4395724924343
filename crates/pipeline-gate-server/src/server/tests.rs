// crates/pipeline-gate-server/src/server/tests.rs
// ============================================================================
// Module: HTTP Server Unit Tests
// Description: Error-to-status mapping and audit sink selection.
// ============================================================================

#![allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::use_debug,
    reason = "Test-only assertions."
)]

use axum::http::StatusCode;
use pipeline_gate_config::AuditConfig;
use pipeline_gate_config::AuditSinkKind;
use pipeline_gate_core::EnvironmentId;
use pipeline_gate_core::EvidenceError;
use pipeline_gate_core::GateError;
use pipeline_gate_core::GateVerdict;
use pipeline_gate_core::PolicyError;
use pipeline_gate_core::RunId;
use pipeline_gate_core::StageId;
use pipeline_gate_core::StoreError;

use super::ApiError;
use super::ServerError;
use super::build_audit_sink;
use super::gate_error_status;
use super::verdict_status;
use crate::auth::AuthError;

#[test]
fn verdicts_map_to_distinct_statuses() {
    assert_eq!(verdict_status(GateVerdict::Admitted), StatusCode::OK);
    assert_eq!(verdict_status(GateVerdict::Blocked), StatusCode::ACCEPTED);
    assert_eq!(verdict_status(GateVerdict::Rejected), StatusCode::UNPROCESSABLE_ENTITY);
}

#[test]
fn gate_errors_map_to_http_statuses() {
    let run = RunId::new("run-1");
    let cases = [
        (GateError::RunNotFound(run.clone()), StatusCode::NOT_FOUND, "run_not_found"),
        (GateError::RunCancelled(run.clone()), StatusCode::CONFLICT, "run_cancelled"),
        (
            GateError::StaleSnapshotConflict(run.clone()),
            StatusCode::CONFLICT,
            "stale_snapshot_conflict",
        ),
        (
            GateError::StageMismatch {
                expected: StageId::new("build"),
                requested: StageId::new("deploy"),
            },
            StatusCode::CONFLICT,
            "stage_mismatch",
        ),
        (GateError::EvaluationTimeout, StatusCode::SERVICE_UNAVAILABLE, "evaluation_timeout"),
        (
            GateError::InvalidOverride("empty".to_string()),
            StatusCode::BAD_REQUEST,
            "invalid_override",
        ),
        (GateError::Unauthorized("nope".to_string()), StatusCode::FORBIDDEN, "unauthorized"),
        (
            GateError::Policy(PolicyError::NoPolicyDefined {
                environment: EnvironmentId::new("qa"),
                stage: None,
            }),
            StatusCode::UNPROCESSABLE_ENTITY,
            "no_policy_defined",
        ),
        (
            GateError::Store(StoreError::Conflict("dup".to_string())),
            StatusCode::CONFLICT,
            "store_conflict",
        ),
        (
            GateError::Store(StoreError::Io("disk".to_string())),
            StatusCode::INTERNAL_SERVER_ERROR,
            "store_error",
        ),
    ];
    for (err, status, kind) in cases {
        assert_eq!(gate_error_status(&err), (status, kind), "{err}");
    }
}

#[test]
fn retryable_errors_are_flagged() {
    let timeout = ApiError::from(GateError::EvaluationTimeout);
    assert!(timeout.retryable);
    let missing = ApiError::from(GateError::RunNotFound(RunId::new("run-1")));
    assert!(!missing.retryable);
    assert_eq!(missing.status, StatusCode::NOT_FOUND);
}

#[test]
fn auth_and_evidence_errors_map_to_client_statuses() {
    let unauthenticated = ApiError::from(AuthError::Unauthenticated("missing header"));
    assert_eq!(unauthenticated.status, StatusCode::UNAUTHORIZED);
    let forbidden = ApiError::from(AuthError::Forbidden("no".to_string()));
    assert_eq!(forbidden.status, StatusCode::FORBIDDEN);
    let invalid = ApiError::from(EvidenceError::Invalid("bad signature".to_string()));
    assert_eq!(invalid.status, StatusCode::BAD_REQUEST);
    assert_eq!(invalid.kind, "invalid_evidence");
}

#[test]
fn error_replies_carry_json_bodies() {
    let reply = ApiError::from(GateError::EvaluationTimeout).into_reply();
    assert_eq!(reply.status, StatusCode::SERVICE_UNAVAILABLE);
    let body: serde_json::Value = serde_json::from_slice(&reply.body).unwrap();
    assert_eq!(body["error"], "evaluation_timeout");
    assert_eq!(body["retryable"], true);
}

#[test]
fn file_audit_sink_requires_a_path() {
    let missing = AuditConfig {
        sink: AuditSinkKind::File,
        path: None,
    };
    assert!(matches!(build_audit_sink(&missing), Err(ServerError::Config(_))));

    let dir = tempfile::tempdir().unwrap();
    let config = AuditConfig {
        sink: AuditSinkKind::File,
        path: Some(dir.path().join("requests.jsonl")),
    };
    assert!(build_audit_sink(&config).is_ok());
    assert!(
        build_audit_sink(&AuditConfig {
            sink: AuditSinkKind::None,
            path: None,
        })
        .is_ok()
    );
}
