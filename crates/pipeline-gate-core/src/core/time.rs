// crates/pipeline-gate-core/src/core/time.rs
// ============================================================================
// Module: Pipeline Gate Time Model
// Description: Canonical timestamp representation for evidence and decisions.
// Purpose: Keep evaluation replayable by never reading wall-clock time in core.
// Dependencies: serde
// ============================================================================

//! ## Overview
//! Pipeline Gate uses explicit time values supplied by callers. The core
//! engine never reads the wall clock; hosts decide the unit (the server uses
//! unix milliseconds) and must use it consistently for evidence timestamps,
//! `as_of` cutoffs, and freshness windows.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;

use serde::Deserialize;
use serde::Serialize;

// ============================================================================
// SECTION: Time Values
// ============================================================================

/// Canonical timestamp used for evidence, decisions, and cutoffs.
///
/// # Invariants
/// - Values are provided by callers; ordering across producers is not trusted
///   for sequencing, only for freshness and `as_of` filtering.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Timestamp(u64);

impl Timestamp {
    /// Creates a timestamp from a raw tick value.
    #[must_use]
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    /// Returns the raw tick value.
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }

    /// Returns how many ticks `earlier` precedes `self`, saturating at zero.
    #[must_use]
    pub const fn ticks_since(self, earlier: Self) -> u64 {
        self.0.saturating_sub(earlier.0)
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}
