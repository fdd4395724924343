// crates/pipeline-gate-server/src/api.rs
// ============================================================================
// Module: HTTP Wire Types
// Description: Request and response bodies for the HTTP API.
// Purpose: Keep the camelCase wire contract separate from core types.
// Dependencies: pipeline-gate-core, serde
// ============================================================================

//! ## Overview
//! Request bodies use camelCase field names and reject unknown fields.
//! Responses embed core types (decisions, runs, audit entries) unchanged so
//! exported records match what the audit log hashes.

use pipeline_gate_core::AdvanceResult;
use pipeline_gate_core::AppendReceipt;
use pipeline_gate_core::CommitSha;
use pipeline_gate_core::Decision;
use pipeline_gate_core::EvidenceKind;
use pipeline_gate_core::EvidenceOutcome;
use pipeline_gate_core::EvidencePayload;
use pipeline_gate_core::EvidenceSignature;
use pipeline_gate_core::EvidenceSubject;
use pipeline_gate_core::EvidenceSubmission;
use pipeline_gate_core::GateVerdict;
use pipeline_gate_core::HashDigest;
use pipeline_gate_core::KeyId;
use pipeline_gate_core::PipelineRun;
use pipeline_gate_core::PolicyVersion;
use pipeline_gate_core::RuleEvaluation;
use pipeline_gate_core::RuleId;
use pipeline_gate_core::RunId;
use pipeline_gate_core::SourceId;
use pipeline_gate_core::StageId;
use pipeline_gate_core::Timestamp;
use serde::Deserialize;
use serde::Serialize;

// ============================================================================
// SECTION: Requests
// ============================================================================

/// Evidence signature on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct SignatureBody {
    /// Registered producer key identifier.
    pub key_id: String,
    /// Base64-encoded Ed25519 signature.
    pub signature: String,
}

/// `POST /v1/evidence` body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct EvidenceRequest {
    /// Pipeline run identifier.
    pub run_id: String,
    /// Evidence kind.
    pub kind: EvidenceKind,
    /// Commit the check ran against.
    pub commit_sha: String,
    /// Reported outcome.
    pub outcome: EvidenceOutcome,
    /// Opaque payload.
    #[serde(default)]
    pub payload: EvidencePayload,
    /// Producing tool or reviewer identity.
    pub source_identity: String,
    /// Producer-reported unix timestamp in milliseconds.
    pub timestamp: u64,
    /// Optional producer signature.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<SignatureBody>,
}

impl EvidenceRequest {
    /// Converts the wire body into a core submission.
    #[must_use]
    pub fn into_submission(self) -> EvidenceSubmission {
        EvidenceSubmission {
            subject: EvidenceSubject {
                run_id: RunId::new(self.run_id),
                commit_sha: CommitSha::new(self.commit_sha),
            },
            kind: self.kind,
            outcome: self.outcome,
            payload: self.payload,
            source: SourceId::new(self.source_identity),
            timestamp: Timestamp::new(self.timestamp),
            signature: self.signature.map(|signature| EvidenceSignature {
                key_id: KeyId::new(signature.key_id),
                signature: signature.signature,
            }),
        }
    }
}

/// `POST /v1/runs` body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct CreateRunBody {
    /// Run identifier.
    pub run_id: String,
    /// Target environment.
    pub environment: String,
    /// Commit under evaluation.
    pub commit_sha: String,
    /// Creation time (defaults to the server clock).
    #[serde(default)]
    pub created_at: Option<u64>,
}

/// `POST /v1/runs/{id}/advance` body (may be empty).
///
/// The evidence cutoff is always the server clock.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct AdvanceBody {
    /// Stage to evaluate (defaults to the current stage).
    #[serde(default)]
    pub stage: Option<String>,
    /// Optimistic check on decisions already applied to the run.
    #[serde(default)]
    pub expected_decisions: Option<u64>,
}

/// `POST /v1/runs/{id}/override` body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct OverrideBody {
    /// Stage to override (defaults to the current stage).
    #[serde(default)]
    pub stage: Option<String>,
    /// Mandatory justification.
    pub justification: String,
    /// Rules to waive.
    pub waived_rules: Vec<String>,
}

impl OverrideBody {
    /// Returns the waived rule identifiers.
    #[must_use]
    pub fn rule_ids(&self) -> Vec<RuleId> {
        self.waived_rules.iter().map(|rule| RuleId::new(rule.as_str())).collect()
    }

    /// Returns the requested stage.
    #[must_use]
    pub fn stage_id(&self) -> Option<StageId> {
        self.stage.as_deref().map(StageId::new)
    }
}

/// `POST /v1/runs/{id}/cancel` body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct CancelBody {
    /// Cancellation reason.
    pub reason: String,
}

/// `GET /v1/audit` query parameters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AuditQuery {
    /// Return entries with sequence greater than this value.
    #[serde(default)]
    pub after: u64,
    /// Maximum number of entries.
    #[serde(default)]
    pub limit: Option<usize>,
}

// ============================================================================
// SECTION: Responses
// ============================================================================

/// Evidence ingestion response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvidenceResponse {
    /// Run the evidence belongs to.
    pub run_id: RunId,
    /// Per-run sequence number.
    pub seq: u64,
    /// True when an identical record already existed.
    pub duplicate: bool,
}

impl From<AppendReceipt> for EvidenceResponse {
    fn from(receipt: AppendReceipt) -> Self {
        Self {
            run_id: receipt.evidence_id.run_id,
            seq: receipt.evidence_id.seq,
            duplicate: receipt.duplicate,
        }
    }
}

/// Advance and override response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdvanceResponse {
    /// Lifecycle verdict.
    pub verdict: GateVerdict,
    /// Recorded decision.
    pub decision: Decision,
    /// Rules that blocked admission, with reasons.
    pub unsatisfied: Vec<RuleEvaluation>,
    /// Run state after the decision.
    pub run: PipelineRun,
    /// True when a previously recorded decision was returned.
    pub replayed: bool,
}

impl From<AdvanceResult> for AdvanceResponse {
    fn from(result: AdvanceResult) -> Self {
        let unsatisfied = result.decision.unsatisfied().into_iter().cloned().collect();
        Self {
            verdict: result.decision.verdict,
            unsatisfied,
            decision: result.decision,
            run: result.run,
            replayed: result.replayed,
        }
    }
}

/// Policy reload response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PolicyReloadResponse {
    /// Newly active policy version.
    pub version: PolicyVersion,
    /// Canonical document hash.
    pub document_hash: HashDigest,
}

/// Error response body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Stable error kind label.
    pub error: String,
    /// Human-readable message.
    pub message: String,
    /// True when the same request may be retried.
    pub retryable: bool,
}
