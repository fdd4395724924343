// crates/pipeline-gate-core/src/runtime/evidence_store.rs
// ============================================================================
// Module: Pipeline Gate Evidence Hub
// Description: Validated evidence ingestion with subscriber notification.
// Purpose: Gate untrusted submissions before they reach an evidence store.
// Dependencies: crate::core, crate::interfaces, crate::runtime::attestation
// ============================================================================

//! ## Overview
//! [`EvidenceHub`] is the single ingestion path into an [`EvidenceStore`]. It
//! enforces size and format limits, computes the canonical content digest,
//! verifies producer signatures, appends the record, and notifies subscribers
//! over `std::sync::mpsc` channels. Evidence for runs that do not exist yet is
//! accepted and retained; the controller evaluates it once the run appears.
//!
//! Security posture: submissions are untrusted input; any limit violation or
//! signature failure rejects the submission without storing it.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Mutex;
use std::sync::mpsc;

use thiserror::Error;

use crate::core::AppendReceipt;
use crate::core::EvidenceId;
use crate::core::EvidenceKind;
use crate::core::EvidenceSnapshot;
use crate::core::EvidenceSubmission;
use crate::core::RunId;
use crate::interfaces::EvidenceStore;
use crate::interfaces::StoreError;
use crate::runtime::attestation::ProducerKeyring;

// ============================================================================
// SECTION: Limits
// ============================================================================

/// Maximum length of run, source, and metric identifiers.
pub const MAX_IDENTIFIER_LENGTH: usize = 256;
/// Maximum length of a payload reference.
pub const MAX_REFERENCE_LENGTH: usize = 2048;
/// Maximum number of metrics per payload.
pub const MAX_METRICS: usize = 64;
/// Minimum commit SHA length (abbreviated form).
const MIN_COMMIT_SHA_LENGTH: usize = 7;
/// Maximum commit SHA length (SHA-256 object format).
const MAX_COMMIT_SHA_LENGTH: usize = 64;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Evidence ingestion errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EvidenceError {
    /// Submission is malformed, unverifiable, or conflicts with stored content.
    #[error("invalid evidence: {0}")]
    Invalid(String),
    /// Store failed.
    #[error(transparent)]
    Store(StoreError),
}

impl From<StoreError> for EvidenceError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Conflict(detail) => Self::Invalid(detail),
            other => Self::Store(other),
        }
    }
}

// ============================================================================
// SECTION: Notifications
// ============================================================================

/// Notification emitted after a new record is appended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EvidenceNotice {
    /// Stored evidence identifier.
    pub evidence_id: EvidenceId,
    /// Evidence kind.
    pub kind: EvidenceKind,
}

impl EvidenceNotice {
    /// Returns the run the evidence belongs to.
    #[must_use]
    pub const fn run_id(&self) -> &RunId {
        &self.evidence_id.run_id
    }
}

// ============================================================================
// SECTION: Evidence Hub
// ============================================================================

/// Validating front door for an evidence store.
pub struct EvidenceHub<S> {
    /// Backing store.
    store: S,
    /// Registered producer keys.
    keyring: ProducerKeyring,
    /// Live subscriber channels.
    subscribers: Mutex<Vec<mpsc::Sender<EvidenceNotice>>>,
}

impl<S: EvidenceStore> EvidenceHub<S> {
    /// Creates a hub over `store` using `keyring` for signature checks.
    #[must_use]
    pub const fn new(store: S, keyring: ProducerKeyring) -> Self {
        Self {
            store,
            keyring,
            subscribers: Mutex::new(Vec::new()),
        }
    }

    /// Returns the backing store.
    #[must_use]
    pub const fn store(&self) -> &S {
        &self.store
    }

    /// Registers a subscriber for new-evidence notifications.
    ///
    /// # Errors
    ///
    /// Returns [`EvidenceError::Store`] when the subscriber list is poisoned.
    pub fn subscribe(&self) -> Result<mpsc::Receiver<EvidenceNotice>, EvidenceError> {
        let (sender, receiver) = mpsc::channel();
        let mut subscribers = self.subscribers.lock().map_err(|_| {
            EvidenceError::Store(StoreError::Store("subscriber list mutex poisoned".to_string()))
        })?;
        subscribers.push(sender);
        drop(subscribers);
        Ok(receiver)
    }

    /// Validates, verifies, and appends a submission.
    ///
    /// Duplicate submissions return the existing identifier with
    /// `duplicate = true` and emit no notification.
    ///
    /// # Errors
    ///
    /// Returns [`EvidenceError::Invalid`] for malformed, unverifiable, or
    /// conflicting submissions, and [`EvidenceError::Store`] for store failures.
    pub fn submit(&self, submission: EvidenceSubmission) -> Result<AppendReceipt, EvidenceError> {
        validate_submission(&submission)?;
        let content_hash =
            submission.content_digest().map_err(|err| EvidenceError::Invalid(err.to_string()))?;
        let lane = self
            .keyring
            .trust_lane(&submission, &content_hash)
            .map_err(|err| EvidenceError::Invalid(err.to_string()))?;
        let kind = submission.kind;
        let receipt = self.store.append(submission.into_draft(lane, content_hash))?;
        if !receipt.duplicate {
            self.notify(&EvidenceNotice {
                evidence_id: receipt.evidence_id.clone(),
                kind,
            });
        }
        Ok(receipt)
    }

    /// Returns a consistent snapshot of a run's evidence.
    ///
    /// # Errors
    ///
    /// Returns [`EvidenceError::Store`] when reading fails.
    pub fn snapshot(&self, run_id: &RunId) -> Result<EvidenceSnapshot, EvidenceError> {
        Ok(self.store.snapshot(run_id)?)
    }

    /// Sends a notice to every live subscriber, pruning closed channels.
    fn notify(&self, notice: &EvidenceNotice) {
        if let Ok(mut subscribers) = self.subscribers.lock() {
            subscribers.retain(|sender| sender.send(notice.clone()).is_ok());
        }
    }
}

// ============================================================================
// SECTION: Validation
// ============================================================================

/// Enforces format and size limits on a submission.
fn validate_submission(submission: &EvidenceSubmission) -> Result<(), EvidenceError> {
    validate_identifier("run_id", submission.subject.run_id.as_str())?;
    validate_identifier("source", submission.source.as_str())?;
    let sha = submission.subject.commit_sha.as_str();
    if !(MIN_COMMIT_SHA_LENGTH ..= MAX_COMMIT_SHA_LENGTH).contains(&sha.len())
        || !sha.bytes().all(|byte| matches!(byte, b'0' ..= b'9' | b'a' ..= b'f'))
    {
        return Err(EvidenceError::Invalid(
            "commit_sha must be 7 to 64 lowercase hex characters".to_string(),
        ));
    }
    if let Some(reference) = &submission.payload.reference
        && reference.len() > MAX_REFERENCE_LENGTH
    {
        return Err(EvidenceError::Invalid(format!(
            "payload reference exceeds {MAX_REFERENCE_LENGTH} bytes"
        )));
    }
    if submission.payload.metrics.len() > MAX_METRICS {
        return Err(EvidenceError::Invalid(format!(
            "payload declares more than {MAX_METRICS} metrics"
        )));
    }
    for metric in submission.payload.metrics.keys() {
        validate_identifier("metric", metric)?;
    }
    Ok(())
}

/// Validates a non-empty, bounded identifier without control characters.
fn validate_identifier(field: &str, value: &str) -> Result<(), EvidenceError> {
    if value.is_empty() {
        return Err(EvidenceError::Invalid(format!("{field} must be non-empty")));
    }
    if value.len() > MAX_IDENTIFIER_LENGTH {
        return Err(EvidenceError::Invalid(format!(
            "{field} exceeds {MAX_IDENTIFIER_LENGTH} bytes"
        )));
    }
    if value.chars().any(char::is_control) {
        return Err(EvidenceError::Invalid(format!("{field} contains control characters")));
    }
    Ok(())
}
