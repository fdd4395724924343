// crates/pipeline-gate-core/src/runtime/policy_registry.rs
// ============================================================================
// Module: Pipeline Gate Policy Registry
// Description: Publication point for immutable, versioned policy snapshots.
// Purpose: Let evaluations read the policy active at check time.
// Dependencies: crate::core
// ============================================================================

//! ## Overview
//! The registry holds at most one active [`PolicySnapshot`]. Publishing a
//! document validates it, assigns the next version, and swaps the active
//! `Arc`. Readers clone the `Arc` and evaluate against it without holding a
//! lock, so a publication never changes an evaluation already in progress.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;
use std::sync::RwLock;

use crate::core::PolicyDocument;
use crate::core::PolicyError;
use crate::core::PolicySnapshot;
use crate::core::PolicyVersion;
use crate::core::RecordedPolicy;

// ============================================================================
// SECTION: Registry
// ============================================================================

/// Versioned policy snapshot registry.
///
/// # Invariants
/// - Published versions strictly increase.
/// - Snapshots are never mutated after publication.
#[derive(Debug, Default)]
pub struct PolicyRegistry {
    /// Active snapshot, if any.
    active: RwLock<Option<Arc<PolicySnapshot>>>,
}

impl PolicyRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry with an initial document published as version 1.
    ///
    /// # Errors
    ///
    /// Returns [`PolicyError`] when the document is invalid.
    pub fn with_document(document: PolicyDocument) -> Result<Self, PolicyError> {
        let registry = Self::new();
        registry.publish(document)?;
        Ok(registry)
    }

    /// Creates a registry continuing the version sequence of a previous
    /// process.
    ///
    /// The document keeps `recorded.version` when its hash matches the
    /// recorded one and takes the following version otherwise. Without a
    /// recorded publication it starts at version 1.
    ///
    /// # Errors
    ///
    /// Returns [`PolicyError`] when the document is invalid.
    pub fn resume(
        document: PolicyDocument,
        recorded: Option<&RecordedPolicy>,
    ) -> Result<Self, PolicyError> {
        let mut snapshot = PolicySnapshot::new(PolicyVersion::INITIAL, document)?;
        if let Some(recorded) = recorded {
            snapshot.version = if recorded.document_hash.as_ref() == Some(&snapshot.document_hash)
            {
                recorded.version
            } else {
                recorded.version.next()
            };
        }
        Ok(Self {
            active: RwLock::new(Some(Arc::new(snapshot))),
        })
    }

    /// Validates and publishes a document as the next version.
    ///
    /// # Errors
    ///
    /// Returns [`PolicyError`] when the document is invalid; the active
    /// snapshot is left unchanged.
    pub fn publish(&self, document: PolicyDocument) -> Result<Arc<PolicySnapshot>, PolicyError> {
        let mut guard = self
            .active
            .write()
            .map_err(|_| PolicyError::Invalid("policy registry lock poisoned".to_string()))?;
        let version = guard.as_ref().map_or(PolicyVersion::INITIAL, |active| active.version.next());
        let snapshot = Arc::new(PolicySnapshot::new(version, document)?);
        *guard = Some(Arc::clone(&snapshot));
        drop(guard);
        Ok(snapshot)
    }

    /// Returns the active snapshot, if any.
    #[must_use]
    pub fn current(&self) -> Option<Arc<PolicySnapshot>> {
        self.active.read().ok().and_then(|guard| guard.clone())
    }
}
