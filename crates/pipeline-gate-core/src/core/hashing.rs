// crates/pipeline-gate-core/src/core/hashing.rs
// ============================================================================
// Module: Pipeline Gate Content Digests
// Description: Canonical JSON encoding and SHA-256 digests.
// Purpose: Fingerprint evidence, policy documents, and audit chain links.
// Dependencies: serde, serde_jcs, sha2
// ============================================================================

//! ## Overview
//! Every digest in the gate is taken over RFC 8785 (JCS) canonical JSON, so
//! an evidence content digest, a policy document hash, or an audit link
//! computed by the in-memory backends matches the one the `SQLite` store
//! recomputes on read. Digests carry their algorithm label so stored rows
//! stay self-describing.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;
use std::fmt::Write as _;

use serde::Deserialize;
use serde::Serialize;
use sha2::Digest;
use sha2::Sha256;
use thiserror::Error;

// ============================================================================
// SECTION: Algorithms
// ============================================================================

/// Digest algorithms understood by the gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HashAlgorithm {
    /// SHA-256.
    Sha256,
}

impl HashAlgorithm {
    /// Label persisted next to digest values.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Sha256 => "sha256",
        }
    }

    /// Reverses [`HashAlgorithm::label`]; unknown labels yield `None`.
    #[must_use]
    pub fn from_label(label: &str) -> Option<Self> {
        (label == Self::Sha256.label()).then_some(Self::Sha256)
    }

    /// Digests `bytes` with this algorithm.
    fn digest(self, bytes: &[u8]) -> Vec<u8> {
        match self {
            Self::Sha256 => Sha256::digest(bytes).to_vec(),
        }
    }
}

/// Algorithm used for every digest the gate produces.
pub const DEFAULT_HASH_ALGORITHM: HashAlgorithm = HashAlgorithm::Sha256;

// ============================================================================
// SECTION: Digests
// ============================================================================

/// Algorithm-tagged digest with a lowercase hex value.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct HashDigest {
    /// Algorithm that produced `value`.
    pub algorithm: HashAlgorithm,
    /// Lowercase hex digest.
    pub value: String,
}

impl HashDigest {
    /// Wraps raw digest output, hex-encoding it.
    #[must_use]
    pub fn new(algorithm: HashAlgorithm, raw: &[u8]) -> Self {
        let value = raw.iter().fold(String::with_capacity(raw.len() * 2), |mut out, byte| {
            let _ = write!(out, "{byte:02x}");
            out
        });
        Self {
            algorithm,
            value,
        }
    }
}

impl fmt::Display for HashDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.algorithm.label(), self.value)
    }
}

/// Canonical encoding failure.
#[derive(Debug, Error)]
pub enum HashError {
    /// The value could not be serialized as canonical JSON.
    #[error("failed to canonicalize json: {0}")]
    Canonicalization(String),
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Encodes `value` as RFC 8785 canonical JSON.
///
/// # Errors
///
/// Returns [`HashError::Canonicalization`] when `value` does not serialize.
pub fn canonical_json_bytes<T: Serialize + ?Sized>(value: &T) -> Result<Vec<u8>, HashError> {
    serde_jcs::to_vec(value).map_err(|err| HashError::Canonicalization(err.to_string()))
}

/// Digests the canonical JSON encoding of `value`.
///
/// # Errors
///
/// Returns [`HashError::Canonicalization`] when `value` does not serialize.
pub fn hash_canonical_json<T: Serialize + ?Sized>(
    algorithm: HashAlgorithm,
    value: &T,
) -> Result<HashDigest, HashError> {
    canonical_json_bytes(value).map(|bytes| hash_bytes(algorithm, &bytes))
}

/// Digests raw bytes.
#[must_use]
pub fn hash_bytes(algorithm: HashAlgorithm, bytes: &[u8]) -> HashDigest {
    HashDigest::new(algorithm, &algorithm.digest(bytes))
}
