// crates/pipeline-gate-core/src/runtime/audit.rs
// ============================================================================
// Module: Pipeline Gate Audit Chain
// Description: Hash-chained audit entries and an in-memory audit log.
// Purpose: Make every decision and cancellation tamper-evident.
// Dependencies: crate::core, crate::interfaces, serde
// ============================================================================

//! ## Overview
//! Each [`AuditEntry`] hashes its global sequence, the previous entry hash,
//! and its record using RFC 8785 canonical JSON. Editing, removing, or
//! reordering any entry breaks the chain and is reported by [`verify_chain`].
//! Durable backends reuse [`chain_entry`] so in-memory and SQLite logs produce
//! identical hashes for identical histories.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Mutex;

use serde::Serialize;

use crate::core::AuditEntry;
use crate::core::AuditRecord;
use crate::core::DEFAULT_HASH_ALGORITHM;
use crate::core::HashDigest;
use crate::core::RunId;
use crate::core::hashing::hash_canonical_json;
use crate::interfaces::AuditError;
use crate::interfaces::AuditLog;

// ============================================================================
// SECTION: Chain Helpers
// ============================================================================

/// Hashed portion of an audit entry.
#[derive(Serialize)]
struct ChainLink<'a> {
    /// Entry sequence.
    seq: u64,
    /// Previous entry hash.
    prev_hash: Option<&'a HashDigest>,
    /// Audited record.
    record: &'a AuditRecord,
}

/// Computes the entry hash for a chain position.
///
/// # Errors
///
/// Returns [`AuditError::Hash`] when canonicalization fails.
pub fn entry_hash(
    seq: u64,
    prev_hash: Option<&HashDigest>,
    record: &AuditRecord,
) -> Result<HashDigest, AuditError> {
    hash_canonical_json(
        DEFAULT_HASH_ALGORITHM,
        &ChainLink {
            seq,
            prev_hash,
            record,
        },
    )
    .map_err(|err| AuditError::Hash(err.to_string()))
}

/// Builds the chained entry following `prev_hash`.
///
/// # Errors
///
/// Returns [`AuditError::Hash`] when canonicalization fails.
pub fn chain_entry(
    seq: u64,
    prev_hash: Option<HashDigest>,
    record: AuditRecord,
) -> Result<AuditEntry, AuditError> {
    let entry_hash = entry_hash(seq, prev_hash.as_ref(), &record)?;
    Ok(AuditEntry {
        seq,
        prev_hash,
        entry_hash,
        record,
    })
}

/// Verifies hashes and links across a contiguous slice of entries.
///
/// A slice starting at sequence 1 must have no previous hash on its first
/// entry; a slice starting later trusts its first `prev_hash` as the anchor.
///
/// # Errors
///
/// Returns [`AuditError::ChainBroken`] at the first invalid entry.
pub fn verify_chain(entries: &[AuditEntry]) -> Result<(), AuditError> {
    let mut previous: Option<&AuditEntry> = None;
    for entry in entries {
        let broken = |detail: &str| AuditError::ChainBroken {
            seq: entry.seq,
            detail: detail.to_string(),
        };
        match previous {
            Some(prev) => {
                if entry.seq != prev.seq + 1 {
                    return Err(broken("sequence gap"));
                }
                if entry.prev_hash.as_ref() != Some(&prev.entry_hash) {
                    return Err(broken("previous hash mismatch"));
                }
            }
            None => {
                if entry.seq == 0 {
                    return Err(broken("sequence must start at 1"));
                }
                if entry.seq == 1 && entry.prev_hash.is_some() {
                    return Err(broken("first entry must not link to a predecessor"));
                }
            }
        }
        let expected = entry_hash(entry.seq, entry.prev_hash.as_ref(), &entry.record)?;
        if expected != entry.entry_hash {
            return Err(broken("entry hash mismatch"));
        }
        previous = Some(entry);
    }
    Ok(())
}

// ============================================================================
// SECTION: In-Memory Audit Log
// ============================================================================

/// In-memory hash-chained audit log.
#[derive(Debug, Default)]
pub struct InMemoryAuditLog {
    /// Entries in append order.
    entries: Mutex<Vec<AuditEntry>>,
}

impl InMemoryAuditLog {
    /// Creates an empty audit log.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a copy of every entry.
    ///
    /// # Errors
    ///
    /// Returns [`AuditError::Storage`] when the log lock is poisoned.
    pub fn entries(&self) -> Result<Vec<AuditEntry>, AuditError> {
        Ok(self.lock()?.clone())
    }

    /// Locks the entry list.
    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Vec<AuditEntry>>, AuditError> {
        self.entries.lock().map_err(|_| AuditError::Storage("audit log mutex poisoned".to_string()))
    }
}

impl AuditLog for InMemoryAuditLog {
    fn record(&self, record: AuditRecord) -> Result<AuditEntry, AuditError> {
        let mut guard = self.lock()?;
        let prev_hash = guard.last().map(|entry| entry.entry_hash.clone());
        let seq = guard.last().map_or(1, |entry| entry.seq + 1);
        let entry = chain_entry(seq, prev_hash, record)?;
        guard.push(entry.clone());
        drop(guard);
        Ok(entry)
    }

    fn entries_for_run(&self, run_id: &RunId) -> Result<Vec<AuditEntry>, AuditError> {
        Ok(self.lock()?.iter().filter(|entry| entry.record.run_id() == run_id).cloned().collect())
    }

    fn export(&self, after: u64, limit: usize) -> Result<Vec<AuditEntry>, AuditError> {
        Ok(self.lock()?.iter().filter(|entry| entry.seq > after).take(limit).cloned().collect())
    }
}
