// crates/pipeline-gate-core/src/runtime/mod.rs
// ============================================================================
// Module: Pipeline Gate Runtime
// Description: Evidence ingestion, policy registry, evaluator, and controller.
// Purpose: Execute gate checks against evidence and policy snapshots.
// Dependencies: crate::{core, interfaces}
// ============================================================================

//! ## Overview
//! Runtime modules implement the moving parts of Pipeline Gate. Every host
//! (HTTP server, CLI) drives the same [`GateController`] so admission
//! semantics never diverge between surfaces.

// ============================================================================
// SECTION: Submodules
// ============================================================================

pub mod attestation;
pub mod audit;
pub mod controller;
pub mod evaluator;
pub mod evidence_store;
pub mod policy_registry;
pub mod store;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use attestation::AttestationError;
pub use attestation::ProducerKeyring;
pub use audit::InMemoryAuditLog;
pub use audit::chain_entry;
pub use audit::verify_chain;
pub use controller::AdvanceRequest;
pub use controller::AdvanceResult;
pub use controller::CancelRequest;
pub use controller::CreateRunRequest;
pub use controller::DrainReport;
pub use controller::GateController;
pub use controller::GateControllerConfig;
pub use controller::GateError;
pub use controller::OverrideRequest;
pub use evaluator::Evaluation;
pub use evaluator::EvaluationBudget;
pub use evaluator::EvaluationContext;
pub use evaluator::EvaluationError;
pub use evaluator::Evaluator;
pub use evidence_store::EvidenceError;
pub use evidence_store::EvidenceHub;
pub use evidence_store::EvidenceNotice;
pub use policy_registry::PolicyRegistry;
pub use store::InMemoryEvidenceStore;
pub use store::InMemoryRunStore;
