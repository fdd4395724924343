// crates/pipeline-gate-server/src/lib.rs
// ============================================================================
// Module: Pipeline Gate Server
// Description: HTTP surface for evidence producers and release operators.
// Purpose: Serve the gate engine over authenticated JSON endpoints.
// Dependencies: axum, pipeline-gate-{config, core, store-sqlite}, tokio
// ============================================================================

//! ## Overview
//! Producers post evidence; operators create runs, request advancement,
//! override, cancel, and export the audit log. Each request emits a
//! `gate_request` event through a [`GateAuditSink`].

pub mod api;
pub mod audit;
pub mod auth;
pub mod server;

pub use api::AdvanceResponse;
pub use api::ErrorResponse;
pub use api::EvidenceRequest;
pub use api::EvidenceResponse;
pub use audit::FileAuditSink;
pub use audit::GateAuditEvent;
pub use audit::GateAuditSink;
pub use audit::NoopAuditSink;
pub use audit::StderrAuditSink;
pub use auth::AuthError;
pub use auth::Authenticator;
pub use auth::Principal;
pub use server::GateServer;
pub use server::ServerError;
pub use server::build_audit_sink;
