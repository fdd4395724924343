// crates/pipeline-gate-core/src/core/identifiers.rs
// ============================================================================
// Module: Pipeline Gate Identifiers
// Description: Canonical opaque identifiers for runs, policies, and evidence.
// Purpose: Provide strongly typed, serializable identifiers with stable wire forms.
// Dependencies: serde
// ============================================================================

//! ## Overview
//! This module defines the canonical identifiers used throughout Pipeline
//! Gate. String identifiers are opaque on the wire; validation of length and
//! character set happens at ingestion boundaries, not in these types.
//! Evidence identifiers pair a run with its store-assigned sequence number.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;

use serde::Deserialize;
use serde::Serialize;

// ============================================================================
// SECTION: String Identifiers
// ============================================================================

/// Declares an opaque string identifier newtype.
macro_rules! string_identifier {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Creates a new identifier.
            #[must_use]
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            /// Returns the identifier as a string slice.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                self.0.fmt(f)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self::new(value)
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self::new(value)
            }
        }
    };
}

string_identifier!(
    /// Pipeline run identifier.
    ///
    /// # Invariants
    /// - Opaque UTF-8 string; ingestion enforces length and character limits.
    RunId
);

string_identifier!(
    /// Target environment identifier (for example `staging` or `production`).
    EnvironmentId
);

string_identifier!(
    /// Pipeline stage identifier within an environment.
    StageId
);

string_identifier!(
    /// Policy rule identifier, unique within an effective rule set.
    RuleId
);

string_identifier!(
    /// Identity of the external tool or reviewer that produced evidence.
    SourceId
);

string_identifier!(
    /// Identifier for a registered producer signing key.
    KeyId
);

string_identifier!(
    /// Commit SHA that evidence and runs are bound to.
    ///
    /// # Invariants
    /// - Ingestion accepts only lowercase hex strings of 7 to 64 characters.
    CommitSha
);

// ============================================================================
// SECTION: Decision Identifiers
// ============================================================================

/// Decision identifier derived from the run and its per-run decision sequence.
///
/// # Invariants
/// - Stable for a given (run, sequence) pair so dry runs are reproducible.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DecisionId(String);

impl DecisionId {
    /// Creates a decision identifier from a raw string.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Derives the identifier for the `seq`-th decision of a run.
    #[must_use]
    pub fn for_run(run_id: &RunId, seq: u64) -> Self {
        Self(format!("{run_id}:decision-{seq}"))
    }

    /// Returns the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DecisionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

// ============================================================================
// SECTION: Numeric Identifiers
// ============================================================================

/// Monotonic policy snapshot version.
///
/// # Invariants
/// - Versions start at 1 and increase by one per publication.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PolicyVersion(u64);

impl PolicyVersion {
    /// First version assigned by a registry.
    pub const INITIAL: Self = Self(1);

    /// Creates a policy version from a raw value.
    #[must_use]
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    /// Returns the raw version number.
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }

    /// Returns the following version.
    #[must_use]
    pub const fn next(self) -> Self {
        Self(self.0.saturating_add(1))
    }
}

impl fmt::Display for PolicyVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.0)
    }
}

/// Evidence identifier: the owning run plus the store-assigned sequence.
///
/// # Invariants
/// - `seq` is 1-based and strictly increasing within a run.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EvidenceId {
    /// Run the evidence belongs to.
    pub run_id: RunId,
    /// Per-run append sequence number.
    pub seq: u64,
}

impl EvidenceId {
    /// Creates a new evidence identifier.
    #[must_use]
    pub const fn new(run_id: RunId, seq: u64) -> Self {
        Self {
            run_id,
            seq,
        }
    }
}

impl fmt::Display for EvidenceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.run_id, self.seq)
    }
}
