// crates/pipeline-gate-core/src/core/evidence.rs
// ============================================================================
// Module: Pipeline Gate Evidence Model
// Description: Evidence kinds, outcomes, payloads, and immutable records.
// Purpose: Represent opaque scanner, signer, and reviewer results as attestations.
// Dependencies: crate::core::{hashing, identifiers, time}, serde
// ============================================================================

//! ## Overview
//! Evidence is produced by external collaborators (secret scanners, SAST
//! engines, signing services, reviewers) and arrives asynchronously. The
//! engine never interprets payloads beyond the integer metrics used by policy
//! thresholds; digests and references are carried through for provenance.
//!
//! Records are immutable once appended. Identity is the tuple
//! (run, kind, source, timestamp); ordering is the store-assigned sequence.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::fmt;

use serde::Deserialize;
use serde::Serialize;

use crate::core::hashing::DEFAULT_HASH_ALGORITHM;
use crate::core::hashing::HashDigest;
use crate::core::hashing::HashError;
use crate::core::hashing::hash_canonical_json;
use crate::core::identifiers::CommitSha;
use crate::core::identifiers::EvidenceId;
use crate::core::identifiers::KeyId;
use crate::core::identifiers::RunId;
use crate::core::identifiers::SourceId;
use crate::core::time::Timestamp;

// ============================================================================
// SECTION: Evidence Kinds
// ============================================================================

/// Kind of check an evidence record attests to.
///
/// # Invariants
/// - Variants are stable for serialization and policy matching.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvidenceKind {
    /// Secret scanning result (e.g. leaked credentials).
    SecretScan,
    /// Static analysis result.
    Sast,
    /// Dependency vulnerability scan result.
    DependencyScan,
    /// Artifact or commit signature verification.
    Signature,
    /// Software bill of materials presence.
    Sbom,
    /// Human review approval.
    Approval,
    /// Branch protection configuration check.
    BranchProtectionCheck,
}

impl EvidenceKind {
    /// All evidence kinds in declaration order.
    pub const ALL: [Self; 7] = [
        Self::SecretScan,
        Self::Sast,
        Self::DependencyScan,
        Self::Signature,
        Self::Sbom,
        Self::Approval,
        Self::BranchProtectionCheck,
    ];

    /// Returns the stable wire label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::SecretScan => "secret_scan",
            Self::Sast => "sast",
            Self::DependencyScan => "dependency_scan",
            Self::Signature => "signature",
            Self::Sbom => "sbom",
            Self::Approval => "approval",
            Self::BranchProtectionCheck => "branch_protection_check",
        }
    }

    /// Parses a wire label.
    #[must_use]
    pub fn from_label(label: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.as_str() == label)
    }
}

impl fmt::Display for EvidenceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome reported by the producing tool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvidenceOutcome {
    /// Check passed.
    Pass,
    /// Check failed.
    Fail,
    /// Check could not determine a result.
    Unknown,
}

impl EvidenceOutcome {
    /// Returns the stable wire label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pass => "pass",
            Self::Fail => "fail",
            Self::Unknown => "unknown",
        }
    }
}

// ============================================================================
// SECTION: Trust Lanes
// ============================================================================

/// Trust classification assigned at ingestion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TrustLane {
    /// Authenticated producer, unsigned content.
    #[default]
    Asserted,
    /// Content signature verified against a registered producer key.
    Verified,
}

impl TrustLane {
    /// Returns true when this lane is at least as strict as `minimum`.
    #[must_use]
    pub const fn satisfies(self, minimum: Self) -> bool {
        self.rank() >= minimum.rank()
    }

    /// Returns the lane ordering (higher is stricter).
    const fn rank(self) -> u8 {
        match self {
            Self::Asserted => 0,
            Self::Verified => 1,
        }
    }
}

// ============================================================================
// SECTION: Payloads and Subjects
// ============================================================================

/// Opaque evidence payload.
///
/// # Invariants
/// - `metrics` are exact integers; thresholds never use floating point.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvidencePayload {
    /// Digest of the external artifact (report, SBOM, signature bundle).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub digest: Option<HashDigest>,
    /// External reference (URI or registry path).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,
    /// Named integer metrics, e.g. `critical = 0`.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metrics: BTreeMap<String, i64>,
}

/// What an evidence record is about.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EvidenceSubject {
    /// Pipeline run identifier.
    pub run_id: RunId,
    /// Commit the check was performed against.
    pub commit_sha: CommitSha,
}

/// Detached Ed25519 signature over the evidence content digest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvidenceSignature {
    /// Registered producer key identifier.
    pub key_id: KeyId,
    /// Base64-encoded signature bytes.
    pub signature: String,
}

// ============================================================================
// SECTION: Submissions
// ============================================================================

/// Evidence as submitted by an external producer.
///
/// # Invariants
/// - Untrusted until validated by the evidence hub.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvidenceSubmission {
    /// Subject of the evidence.
    pub subject: EvidenceSubject,
    /// Evidence kind.
    pub kind: EvidenceKind,
    /// Reported outcome.
    pub outcome: EvidenceOutcome,
    /// Opaque payload.
    #[serde(default)]
    pub payload: EvidencePayload,
    /// Producing tool or reviewer identity.
    pub source: SourceId,
    /// Producer-reported timestamp.
    pub timestamp: Timestamp,
    /// Optional producer signature.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<EvidenceSignature>,
}

/// Signed portion of a submission.
#[derive(Serialize)]
struct EvidenceContent<'a> {
    /// Subject of the evidence.
    subject: &'a EvidenceSubject,
    /// Evidence kind.
    kind: EvidenceKind,
    /// Reported outcome.
    outcome: EvidenceOutcome,
    /// Opaque payload.
    payload: &'a EvidencePayload,
    /// Producing identity.
    source: &'a SourceId,
    /// Producer-reported timestamp.
    timestamp: Timestamp,
}

impl EvidenceSubmission {
    /// Computes the canonical content digest (signature excluded).
    ///
    /// # Errors
    ///
    /// Returns [`HashError`] when canonicalization fails.
    pub fn content_digest(&self) -> Result<HashDigest, HashError> {
        hash_canonical_json(
            DEFAULT_HASH_ALGORITHM,
            &EvidenceContent {
                subject: &self.subject,
                kind: self.kind,
                outcome: self.outcome,
                payload: &self.payload,
                source: &self.source,
                timestamp: self.timestamp,
            },
        )
    }

    /// Returns the uniqueness key for this submission within its run.
    #[must_use]
    pub fn identity(&self) -> EvidenceIdentity {
        EvidenceIdentity {
            kind: self.kind,
            source: self.source.clone(),
            timestamp: self.timestamp,
        }
    }

    /// Converts a validated submission into a store draft.
    #[must_use]
    pub fn into_draft(self, lane: TrustLane, content_hash: HashDigest) -> EvidenceDraft {
        EvidenceDraft {
            subject: self.subject,
            kind: self.kind,
            outcome: self.outcome,
            payload: self.payload,
            source: self.source,
            timestamp: self.timestamp,
            lane,
            content_hash,
            signature: self.signature,
        }
    }
}

/// Uniqueness key of an evidence record within a run.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EvidenceIdentity {
    /// Evidence kind.
    pub kind: EvidenceKind,
    /// Producing identity.
    pub source: SourceId,
    /// Producer-reported timestamp.
    pub timestamp: Timestamp,
}

// ============================================================================
// SECTION: Stored Records
// ============================================================================

/// Validated evidence awaiting a sequence number from the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvidenceDraft {
    /// Subject of the evidence.
    pub subject: EvidenceSubject,
    /// Evidence kind.
    pub kind: EvidenceKind,
    /// Reported outcome.
    pub outcome: EvidenceOutcome,
    /// Opaque payload.
    pub payload: EvidencePayload,
    /// Producing identity.
    pub source: SourceId,
    /// Producer-reported timestamp.
    pub timestamp: Timestamp,
    /// Trust lane assigned at ingestion.
    pub lane: TrustLane,
    /// Canonical content digest.
    pub content_hash: HashDigest,
    /// Producer signature when supplied.
    pub signature: Option<EvidenceSignature>,
}

impl EvidenceDraft {
    /// Returns the uniqueness key for this draft within its run.
    #[must_use]
    pub fn identity(&self) -> EvidenceIdentity {
        EvidenceIdentity {
            kind: self.kind,
            source: self.source.clone(),
            timestamp: self.timestamp,
        }
    }
}

/// Immutable evidence record held by an evidence store.
///
/// # Invariants
/// - `id.run_id == subject.run_id`.
/// - Never mutated after append.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Evidence {
    /// Store-assigned identifier.
    pub id: EvidenceId,
    /// Subject of the evidence.
    pub subject: EvidenceSubject,
    /// Evidence kind.
    pub kind: EvidenceKind,
    /// Reported outcome.
    pub outcome: EvidenceOutcome,
    /// Opaque payload.
    pub payload: EvidencePayload,
    /// Producing identity.
    pub source: SourceId,
    /// Producer-reported timestamp.
    pub timestamp: Timestamp,
    /// Trust lane assigned at ingestion.
    pub lane: TrustLane,
    /// Canonical content digest.
    pub content_hash: HashDigest,
    /// Producer signature when supplied.
    pub signature: Option<EvidenceSignature>,
}

impl Evidence {
    /// Builds a stored record from a draft and its assigned sequence.
    #[must_use]
    pub fn from_draft(draft: EvidenceDraft, seq: u64) -> Self {
        Self {
            id: EvidenceId::new(draft.subject.run_id.clone(), seq),
            subject: draft.subject,
            kind: draft.kind,
            outcome: draft.outcome,
            payload: draft.payload,
            source: draft.source,
            timestamp: draft.timestamp,
            lane: draft.lane,
            content_hash: draft.content_hash,
            signature: draft.signature,
        }
    }

    /// Returns the uniqueness key for this record within its run.
    #[must_use]
    pub fn identity(&self) -> EvidenceIdentity {
        EvidenceIdentity {
            kind: self.kind,
            source: self.source.clone(),
            timestamp: self.timestamp,
        }
    }

    /// Returns the per-run sequence number.
    #[must_use]
    pub const fn seq(&self) -> u64 {
        self.id.seq
    }
}

/// Receipt returned by an evidence append.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppendReceipt {
    /// Identifier of the stored (or previously stored) record.
    pub evidence_id: EvidenceId,
    /// True when the submission matched an existing record.
    pub duplicate: bool,
}

// ============================================================================
// SECTION: Snapshots
// ============================================================================

/// Consistent copy of a run's evidence log.
///
/// # Invariants
/// - `records` are ordered by ascending sequence.
/// - `high_water` is the largest sequence included (0 when empty).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvidenceSnapshot {
    /// Run the snapshot belongs to.
    pub run_id: Option<RunId>,
    /// Highest sequence number included.
    pub high_water: u64,
    /// Evidence records in ascending sequence order.
    pub records: Vec<Evidence>,
}

impl EvidenceSnapshot {
    /// Builds a snapshot from records, sorting by sequence.
    #[must_use]
    pub fn new(run_id: RunId, mut records: Vec<Evidence>) -> Self {
        records.sort_by_key(Evidence::seq);
        let high_water = records.last().map_or(0, Evidence::seq);
        Self {
            run_id: Some(run_id),
            high_water,
            records,
        }
    }

    /// Returns matching records not newer than `as_of`, newest first.
    #[must_use]
    pub fn query(&self, kind: Option<EvidenceKind>, as_of: Option<Timestamp>) -> Vec<&Evidence> {
        self.records
            .iter()
            .rev()
            .filter(|record| kind.is_none_or(|kind| record.kind == kind))
            .filter(|record| as_of.is_none_or(|as_of| record.timestamp <= as_of))
            .collect()
    }
}
