// crates/pipeline-gate-core/src/core/mod.rs
// ============================================================================
// Module: Pipeline Gate Core Types
// Description: Canonical evidence, policy, run-state, and decision structures.
// Purpose: Provide stable, serializable types shared by every Pipeline Gate crate.
// Dependencies: serde, serde_jcs, sha2
// ============================================================================

//! ## Overview
//! Core types are the canonical source of truth for the HTTP API, the SQLite
//! store, and the CLI. They carry no I/O and never read the wall clock.

// ============================================================================
// SECTION: Submodules
// ============================================================================

pub mod decision;
pub mod evidence;
pub mod hashing;
pub mod identifiers;
pub mod policy;
pub mod state;
pub mod time;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use decision::AuditEntry;
pub use decision::AuditRecord;
pub use decision::Cancellation;
pub use decision::DecidedBy;
pub use decision::Decision;
pub use decision::DecisionOutcome;
pub use decision::DenialReason;
pub use decision::GateVerdict;
pub use decision::RecordedPolicy;
pub use decision::RuleEvaluation;
pub use decision::RuleStatus;
pub use decision::UnsatisfiedReason;
pub use evidence::AppendReceipt;
pub use evidence::Evidence;
pub use evidence::EvidenceDraft;
pub use evidence::EvidenceIdentity;
pub use evidence::EvidenceKind;
pub use evidence::EvidenceOutcome;
pub use evidence::EvidencePayload;
pub use evidence::EvidenceSignature;
pub use evidence::EvidenceSnapshot;
pub use evidence::EvidenceSubject;
pub use evidence::EvidenceSubmission;
pub use evidence::TrustLane;
pub use hashing::DEFAULT_HASH_ALGORITHM;
pub use hashing::HashAlgorithm;
pub use hashing::HashDigest;
pub use hashing::HashError;
pub use identifiers::CommitSha;
pub use identifiers::DecisionId;
pub use identifiers::EnvironmentId;
pub use identifiers::EvidenceId;
pub use identifiers::KeyId;
pub use identifiers::PolicyVersion;
pub use identifiers::RuleId;
pub use identifiers::RunId;
pub use identifiers::SourceId;
pub use identifiers::StageId;
pub use policy::Aggregation;
pub use policy::EnvironmentPolicy;
pub use policy::EvidencePredicate;
pub use policy::PolicyDocument;
pub use policy::PolicyError;
pub use policy::PolicyRule;
pub use policy::PolicySnapshot;
pub use state::PipelineRun;
pub use state::RunStatus;
pub use state::StageProgress;
pub use time::Timestamp;
