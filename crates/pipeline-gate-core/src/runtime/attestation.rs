// crates/pipeline-gate-core/src/runtime/attestation.rs
// ============================================================================
// Module: Pipeline Gate Attestation Verification
// Description: Ed25519 verification of producer-signed evidence.
// Purpose: Assign trust lanes to evidence at ingestion.
// Dependencies: base64, ed25519-dalek, crate::core
// ============================================================================

//! ## Overview
//! Producers may sign the canonical JSON of an evidence content digest with a
//! registered Ed25519 key. A valid signature lifts the record into the
//! [`TrustLane::Verified`] lane; unsigned evidence stays
//! [`TrustLane::Asserted`]. Any signature that is present but does not verify
//! is rejected outright rather than downgraded.
//!
//! Security posture: keys are bound to a single source identity; a producer
//! cannot sign evidence on behalf of another source.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as Base64;
use ed25519_dalek::Signature;
use ed25519_dalek::VerifyingKey;
use thiserror::Error;

use crate::core::EvidenceSignature;
use crate::core::EvidenceSubmission;
use crate::core::HashDigest;
use crate::core::KeyId;
use crate::core::SourceId;
use crate::core::TrustLane;
use crate::core::hashing::canonical_json_bytes;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Attestation verification failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AttestationError {
    /// Signature references an unregistered key.
    #[error("signature key {0} is not registered")]
    UnknownKey(KeyId),
    /// Key is registered to a different source identity.
    #[error("signature key {key_id} is not authorized for source {source_id}")]
    SourceMismatch {
        /// Key identifier.
        key_id: KeyId,
        /// Source claimed by the evidence.
        source_id: SourceId,
    },
    /// Signature bytes are malformed or do not verify.
    #[error("invalid evidence signature: {0}")]
    InvalidSignature(String),
    /// Public key material is malformed.
    #[error("invalid public key: {0}")]
    InvalidKey(String),
}

// ============================================================================
// SECTION: Keyring
// ============================================================================

/// Registered producer key.
#[derive(Debug, Clone)]
struct ProducerKey {
    /// Source identity the key signs for.
    source: SourceId,
    /// Ed25519 verifying key.
    key: VerifyingKey,
}

/// Registry of producer verifying keys.
#[derive(Debug, Clone, Default)]
pub struct ProducerKeyring {
    /// Keys indexed by identifier.
    keys: BTreeMap<KeyId, ProducerKey>,
}

impl ProducerKeyring {
    /// Creates an empty keyring.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a verifying key for a source identity.
    pub fn register(&mut self, key_id: KeyId, source: SourceId, key: VerifyingKey) {
        self.keys.insert(
            key_id,
            ProducerKey {
                source,
                key,
            },
        );
    }

    /// Registers a base64-encoded 32-byte Ed25519 public key.
    ///
    /// # Errors
    ///
    /// Returns [`AttestationError::InvalidKey`] when decoding fails.
    pub fn register_base64(
        &mut self,
        key_id: KeyId,
        source: SourceId,
        public_key: &str,
    ) -> Result<(), AttestationError> {
        let key = parse_public_key(public_key)?;
        self.register(key_id, source, key);
        Ok(())
    }

    /// Returns the number of registered keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    /// Returns true when no keys are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Determines the trust lane for a submission with the given content digest.
    ///
    /// # Errors
    ///
    /// Returns [`AttestationError`] when a supplied signature cannot be
    /// verified.
    pub fn trust_lane(
        &self,
        submission: &EvidenceSubmission,
        content_hash: &HashDigest,
    ) -> Result<TrustLane, AttestationError> {
        let Some(signature) = &submission.signature else {
            return Ok(TrustLane::Asserted);
        };
        let producer = self
            .keys
            .get(&signature.key_id)
            .ok_or_else(|| AttestationError::UnknownKey(signature.key_id.clone()))?;
        if producer.source != submission.source {
            return Err(AttestationError::SourceMismatch {
                key_id: signature.key_id.clone(),
                source_id: submission.source.clone(),
            });
        }
        verify_signature(&producer.key, content_hash, signature)?;
        Ok(TrustLane::Verified)
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Returns the message producers sign: canonical JSON of the content digest.
///
/// # Errors
///
/// Returns [`AttestationError::InvalidSignature`] when canonicalization fails.
pub fn signature_message(content_hash: &HashDigest) -> Result<Vec<u8>, AttestationError> {
    canonical_json_bytes(content_hash).map_err(|_| {
        AttestationError::InvalidSignature("signature hash serialization failed".to_string())
    })
}

/// Parses a base64-encoded Ed25519 public key.
///
/// # Errors
///
/// Returns [`AttestationError::InvalidKey`] when the key is malformed.
pub fn parse_public_key(encoded: &str) -> Result<VerifyingKey, AttestationError> {
    let bytes = Base64
        .decode(encoded.trim())
        .map_err(|_| AttestationError::InvalidKey("invalid base64 public key".to_string()))?;
    let key_bytes: [u8; 32] = bytes.as_slice().try_into().map_err(|_| {
        AttestationError::InvalidKey("ed25519 public key must be 32 bytes".to_string())
    })?;
    VerifyingKey::from_bytes(&key_bytes)
        .map_err(|_| AttestationError::InvalidKey("invalid ed25519 public key".to_string()))
}

/// Verifies a base64 signature against the content digest.
fn verify_signature(
    key: &VerifyingKey,
    content_hash: &HashDigest,
    signature: &EvidenceSignature,
) -> Result<(), AttestationError> {
    let message = signature_message(content_hash)?;
    let bytes = Base64
        .decode(signature.signature.trim())
        .map_err(|_| AttestationError::InvalidSignature("invalid base64 signature".to_string()))?;
    let signature = Signature::try_from(bytes.as_slice())
        .map_err(|_| AttestationError::InvalidSignature("invalid signature bytes".to_string()))?;
    key.verify_strict(&message, &signature).map_err(|_| {
        AttestationError::InvalidSignature("signature verification failed".to_string())
    })
}
