// crates/pipeline-gate-store-sqlite/src/lib.rs
// ============================================================================
// Module: Pipeline Gate SQLite Store Library
// Description: SQLite-backed evidence, run, and audit persistence.
// Purpose: Provide durable storage for the gate controller.
// Dependencies: pipeline-gate-core, rusqlite
// ============================================================================

//! ## Overview
//! A single `SQLite` database holds the evidence log, run state, and the
//! hash-chained audit log. [`SqliteGateStore`] implements every persistence
//! trait the controller needs, so one handle can be cloned into each slot.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod store;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use store::MAX_RECORD_BYTES;
pub use store::SqliteGateStore;
pub use store::SqliteStoreConfig;
pub use store::SqliteStoreError;
pub use store::SqliteStoreMode;
pub use store::SqliteSyncMode;
