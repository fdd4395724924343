// crates/pipeline-gate-core/tests/common/mod.rs
// ============================================================================
// Module: Common Test Fixtures
// Description: Shared fixtures for Pipeline Gate core tests.
// Purpose: Build evidence, policies, and wired controllers deterministically.
// Dependencies: pipeline-gate-core
// ============================================================================

//! ## Overview
//! Fixtures wire a [`GateController`] over in-memory stores and an
//! [`EvidenceHub`] sharing the same evidence store, mirroring how hosts
//! assemble the engine.

#![allow(dead_code, reason = "Shared test helpers may be unused in some cases.")]
#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::unwrap_in_result,
    reason = "Test fixtures favor direct unwraps for setup clarity."
)]

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;

use pipeline_gate_core::AdvanceRequest;
use pipeline_gate_core::AdvanceResult;
use pipeline_gate_core::AppendReceipt;
use pipeline_gate_core::CommitSha;
use pipeline_gate_core::CreateRunRequest;
use pipeline_gate_core::EnvironmentId;
use pipeline_gate_core::EnvironmentPolicy;
use pipeline_gate_core::EvidenceHub;
use pipeline_gate_core::EvidenceKind;
use pipeline_gate_core::EvidenceOutcome;
use pipeline_gate_core::EvidencePayload;
use pipeline_gate_core::EvidenceSubject;
use pipeline_gate_core::EvidenceSubmission;
use pipeline_gate_core::GateController;
use pipeline_gate_core::GateControllerConfig;
use pipeline_gate_core::GateError;
use pipeline_gate_core::InMemoryAuditLog;
use pipeline_gate_core::InMemoryEvidenceStore;
use pipeline_gate_core::InMemoryRunStore;
use pipeline_gate_core::PipelineRun;
use pipeline_gate_core::PolicyDocument;
use pipeline_gate_core::PolicyRegistry;
use pipeline_gate_core::PolicyRule;
use pipeline_gate_core::ProducerKeyring;
use pipeline_gate_core::RunId;
use pipeline_gate_core::SourceId;
use pipeline_gate_core::StageId;
use pipeline_gate_core::Timestamp;

// ============================================================================
// SECTION: Evidence Fixtures
// ============================================================================

/// Commit every fixture run is bound to.
pub const COMMIT: &str = "0a1b2c3d4e5f";

/// Builds an unsigned submission for `run`.
pub fn submission(
    run: &str,
    kind: EvidenceKind,
    outcome: EvidenceOutcome,
    source: &str,
    timestamp: u64,
) -> EvidenceSubmission {
    EvidenceSubmission {
        subject: EvidenceSubject {
            run_id: RunId::new(run),
            commit_sha: CommitSha::new(COMMIT),
        },
        kind,
        outcome,
        payload: EvidencePayload::default(),
        source: SourceId::new(source),
        timestamp: Timestamp::new(timestamp),
        signature: None,
    }
}

/// Builds a passing submission carrying integer metrics.
pub fn with_metrics(
    mut submission: EvidenceSubmission,
    metrics: &[(&str, i64)],
) -> EvidenceSubmission {
    for (name, value) in metrics {
        submission.payload.metrics.insert((*name).to_string(), *value);
    }
    submission
}

// ============================================================================
// SECTION: Policy Fixtures
// ============================================================================

/// Single-stage production policy requiring passing secret scan and signature.
pub fn production_policy() -> PolicyDocument {
    PolicyDocument {
        base: Vec::new(),
        environments: vec![EnvironmentPolicy {
            environment: EnvironmentId::new("production"),
            stages: vec![StageId::new("deploy")],
            rules: vec![
                PolicyRule::requires_pass("secret-scan", "deploy", EvidenceKind::SecretScan),
                PolicyRule::requires_pass("signature", "deploy", EvidenceKind::Signature),
            ],
        }],
    }
}

/// Two-stage staging policy: `build` needs SAST, `release` needs an SBOM.
pub fn staging_policy() -> PolicyDocument {
    PolicyDocument {
        base: vec![PolicyRule::requires_pass("base-sast", "build", EvidenceKind::Sast)],
        environments: vec![EnvironmentPolicy {
            environment: EnvironmentId::new("staging"),
            stages: vec![StageId::new("build"), StageId::new("release")],
            rules: vec![PolicyRule::requires_pass("staging-sbom", "release", EvidenceKind::Sbom)],
        }],
    }
}

// ============================================================================
// SECTION: Harness
// ============================================================================

/// Controller type used by fixtures.
pub type TestController =
    GateController<Arc<InMemoryEvidenceStore>, Arc<InMemoryRunStore>, Arc<InMemoryAuditLog>>;

/// Wired engine over in-memory stores.
pub struct Harness {
    /// Shared evidence store.
    pub evidence: Arc<InMemoryEvidenceStore>,
    /// Shared run store.
    pub runs: Arc<InMemoryRunStore>,
    /// Shared audit log.
    pub audit: Arc<InMemoryAuditLog>,
    /// Policy registry.
    pub registry: Arc<PolicyRegistry>,
    /// Evidence ingestion hub.
    pub hub: EvidenceHub<Arc<InMemoryEvidenceStore>>,
    /// Gate controller.
    pub controller: TestController,
}

impl Harness {
    /// Builds a harness with `document` published as version 1.
    pub fn new(document: PolicyDocument) -> Self {
        Self::with_config(document, GateControllerConfig::default(), ProducerKeyring::new())
    }

    /// Builds a harness with explicit controller config and keyring.
    pub fn with_config(
        document: PolicyDocument,
        config: GateControllerConfig,
        keyring: ProducerKeyring,
    ) -> Self {
        let evidence = Arc::new(InMemoryEvidenceStore::new());
        let runs = Arc::new(InMemoryRunStore::new());
        let audit = Arc::new(InMemoryAuditLog::new());
        let registry = Arc::new(PolicyRegistry::with_document(document).unwrap());
        let hub = EvidenceHub::new(Arc::clone(&evidence), keyring);
        let controller = GateController::new(
            Arc::clone(&evidence),
            Arc::clone(&runs),
            Arc::clone(&audit),
            Arc::clone(&registry),
            config,
        );
        Self {
            evidence,
            runs,
            audit,
            registry,
            hub,
            controller,
        }
    }

    /// Creates a run for `environment` at time 0.
    pub fn create_run(&self, run: &str, environment: &str) -> PipelineRun {
        self.controller
            .create_run(CreateRunRequest {
                run_id: RunId::new(run),
                environment: EnvironmentId::new(environment),
                commit_sha: CommitSha::new(COMMIT),
                created_at: Timestamp::new(0),
            })
            .unwrap()
    }

    /// Submits evidence through the hub.
    pub fn submit(&self, submission: EvidenceSubmission) -> AppendReceipt {
        self.hub.submit(submission).unwrap()
    }

    /// Requests an advance of the current stage.
    pub fn advance(&self, run: &str, now: u64) -> Result<AdvanceResult, GateError> {
        self.controller.request_advance(AdvanceRequest {
            run_id: RunId::new(run),
            stage: None,
            requested_at: Timestamp::new(now),
            expected_decisions: None,
        })
    }

    /// Returns the number of audit entries recorded.
    pub fn audit_len(&self) -> usize {
        self.audit.entries().unwrap().len()
    }
}
