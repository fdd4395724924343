// crates/pipeline-gate-server/src/audit.rs
// ============================================================================
// Module: Request Audit Sinks
// Description: Structured JSON-line events for HTTP requests and posture.
// Purpose: Record who called which route and what the gate answered.
// Dependencies: serde, serde_json
// ============================================================================

//! ## Overview
//! Every HTTP request produces one `gate_request` event; startup produces one
//! `security_audit` event describing the auth posture; background
//! re-evaluation of blocked runs produces `gate_reevaluation` events. Events
//! are written as single JSON lines through a [`GateAuditSink`].
//!
//! Security posture: events carry principal names and sizes, never bearer
//! tokens or evidence payloads.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fs::File;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;
use std::sync::Mutex;
use std::time::SystemTime;
use std::time::UNIX_EPOCH;

use serde::Serialize;

// ============================================================================
// SECTION: Labels
// ============================================================================

/// Route classification for request events.
///
/// # Invariants
/// - Variants are stable for audit labeling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GateRoute {
    /// `POST /v1/evidence`.
    SubmitEvidence,
    /// `POST /v1/runs`.
    CreateRun,
    /// `GET /v1/runs/{id}`.
    GetRun,
    /// `POST /v1/runs/{id}/advance`.
    Advance,
    /// `POST /v1/runs/{id}/override`.
    Override,
    /// `POST /v1/runs/{id}/cancel`.
    Cancel,
    /// `GET /v1/runs/{id}/decisions`.
    Decisions,
    /// `GET /v1/audit`.
    AuditExport,
    /// `POST /v1/admin/policy/reload`.
    PolicyReload,
}

impl GateRoute {
    /// Returns a stable label for the route.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::SubmitEvidence => "submit_evidence",
            Self::CreateRun => "create_run",
            Self::GetRun => "get_run",
            Self::Advance => "advance",
            Self::Override => "override",
            Self::Cancel => "cancel",
            Self::Decisions => "decisions",
            Self::AuditExport => "audit_export",
            Self::PolicyReload => "policy_reload",
        }
    }
}

// ============================================================================
// SECTION: Events
// ============================================================================

/// Per-request audit event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GateRequestEvent {
    /// Event label (`gate_request`).
    pub event: &'static str,
    /// Unix timestamp in milliseconds.
    pub timestamp_ms: u128,
    /// Route classification.
    pub route: GateRoute,
    /// HTTP status code returned.
    pub status: u16,
    /// Outcome label (`admitted`, `blocked`, error kind, ...).
    pub outcome: String,
    /// Authenticated principal, when authentication succeeded.
    pub principal: Option<String>,
    /// Request body size in bytes.
    pub request_bytes: usize,
    /// Response body size in bytes.
    pub response_bytes: usize,
}

impl GateRequestEvent {
    /// Builds a request event stamped with the current time.
    #[must_use]
    pub fn new(
        route: GateRoute,
        status: u16,
        outcome: impl Into<String>,
        principal: Option<String>,
        request_bytes: usize,
        response_bytes: usize,
    ) -> Self {
        Self {
            event: "gate_request",
            timestamp_ms: now_millis(),
            route,
            status,
            outcome: outcome.into(),
            principal,
            request_bytes,
            response_bytes,
        }
    }
}

/// Startup security posture event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SecurityAuditEvent {
    /// Event label (`security_audit`).
    pub event: &'static str,
    /// Unix timestamp in milliseconds.
    pub timestamp_ms: u128,
    /// Bound socket address.
    pub bind: String,
    /// Authentication mode (`bearer_token` or `local_only`).
    pub auth_mode: &'static str,
    /// Number of configured producers.
    pub producers: usize,
    /// Number of configured operators.
    pub operators: usize,
    /// Number of registered producer signing keys.
    pub signing_keys: usize,
    /// Store backend label.
    pub store: &'static str,
}

/// Background re-evaluation event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReevaluationEvent {
    /// Event label (`gate_reevaluation`).
    pub event: &'static str,
    /// Unix timestamp in milliseconds.
    pub timestamp_ms: u128,
    /// Re-evaluated run.
    pub run_id: String,
    /// Verdict label or error message.
    pub outcome: String,
}

/// Audit event envelope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum GateAuditEvent {
    /// Request event.
    Request(GateRequestEvent),
    /// Startup posture event.
    Security(SecurityAuditEvent),
    /// Background re-evaluation event.
    Reevaluation(ReevaluationEvent),
}

// ============================================================================
// SECTION: Sinks
// ============================================================================

/// Destination for audit events.
pub trait GateAuditSink: Send + Sync {
    /// Records an event. Sinks never fail the request.
    fn record(&self, event: &GateAuditEvent);
}

/// Writes JSON lines to stderr.
pub struct StderrAuditSink;

impl GateAuditSink for StderrAuditSink {
    fn record(&self, event: &GateAuditEvent) {
        if let Ok(line) = serde_json::to_string(event) {
            let mut stderr = std::io::stderr().lock();
            let _ = writeln!(stderr, "{line}");
        }
    }
}

/// Appends JSON lines to a file, flushing per event.
pub struct FileAuditSink {
    /// Open file handle.
    file: Mutex<File>,
}

impl FileAuditSink {
    /// Opens `path` in append mode, creating it when missing.
    ///
    /// # Errors
    ///
    /// Returns [`std::io::Error`] when the file cannot be opened.
    pub fn new(path: &Path) -> std::io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            file: Mutex::new(file),
        })
    }
}

impl GateAuditSink for FileAuditSink {
    fn record(&self, event: &GateAuditEvent) {
        let Ok(line) = serde_json::to_string(event) else {
            return;
        };
        if let Ok(mut file) = self.file.lock() {
            let _ = writeln!(file, "{line}");
            let _ = file.flush();
        }
    }
}

/// Discards events.
pub struct NoopAuditSink;

impl GateAuditSink for NoopAuditSink {
    fn record(&self, _event: &GateAuditEvent) {}
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Returns the current unix time in milliseconds.
pub(crate) fn now_millis() -> u128 {
    SystemTime::now().duration_since(UNIX_EPOCH).map_or(0, |elapsed| elapsed.as_millis())
}
