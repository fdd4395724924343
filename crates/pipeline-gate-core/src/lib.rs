// crates/pipeline-gate-core/src/lib.rs
// ============================================================================
// Module: Pipeline Gate Core Library
// Description: Public API surface for the Pipeline Gate core.
// Purpose: Expose core types, persistence interfaces, and runtime components.
// Dependencies: crate::{core, interfaces, runtime}
// ============================================================================

//! ## Overview
//! Pipeline Gate core is a policy and attestation engine for CI/CD. It
//! ingests opaque evidence from scanners, signers, and reviewers, evaluates
//! declarative per-environment policy against evidence snapshots, and records
//! every admission decision in a hash-chained audit log. It is storage- and
//! transport-agnostic; hosts integrate through the traits in [`interfaces`].

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod core;
pub mod interfaces;
pub mod runtime;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use crate::core::*;

pub use interfaces::AuditError;
pub use interfaces::AuditLog;
pub use interfaces::EvidenceStore;
pub use interfaces::RunStore;
pub use interfaces::StoreError;
pub use runtime::AdvanceRequest;
pub use runtime::AdvanceResult;
pub use runtime::CancelRequest;
pub use runtime::CreateRunRequest;
pub use runtime::EvidenceError;
pub use runtime::EvidenceHub;
pub use runtime::EvidenceNotice;
pub use runtime::GateController;
pub use runtime::GateControllerConfig;
pub use runtime::GateError;
pub use runtime::InMemoryAuditLog;
pub use runtime::InMemoryEvidenceStore;
pub use runtime::InMemoryRunStore;
pub use runtime::OverrideRequest;
pub use runtime::PolicyRegistry;
pub use runtime::ProducerKeyring;
