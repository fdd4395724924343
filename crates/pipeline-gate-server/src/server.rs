// crates/pipeline-gate-server/src/server.rs
// ============================================================================
// Module: Pipeline Gate HTTP Server
// Description: Axum router, handlers, and server assembly.
// Purpose: Expose evidence ingestion, run control, and audit export over HTTP.
// Dependencies: axum, pipeline-gate-{config, core, store-sqlite}, tokio
// ============================================================================

//! ## Overview
//! [`GateServer`] assembles the engine from a validated config: stores
//! (memory or `SQLite`), the policy registry loaded from the policy directory,
//! the evidence hub with the producer keyring, and the gate controller. Core
//! calls are synchronous and run on `spawn_blocking`. A background thread
//! subscribes to the evidence hub and re-evaluates blocked runs when new
//! evidence arrives.
//!
//! Advance responses map verdicts to status codes: `200` admitted, `202`
//! blocked, `422` rejected. Conflicts (`409`), timeouts (`503`), and invalid
//! evidence (`400`) use a JSON [`ErrorResponse`] body.
//!
//! Security posture: every route except `/health` requires authentication;
//! request bodies are size-limited and parsed strictly.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::Weak;
use std::sync::mpsc;

use axum::Router;
use axum::body::Bytes;
use axum::extract::DefaultBodyLimit;
use axum::extract::Path;
use axum::extract::Query;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::http::StatusCode;
use axum::http::Uri;
use axum::http::header::CONTENT_TYPE;
use axum::response::IntoResponse;
use axum::response::Response;
use axum::routing::get;
use axum::routing::post;
use pipeline_gate_config::AuditConfig;
use pipeline_gate_config::AuditSinkKind;
use pipeline_gate_config::ConfigError;
use pipeline_gate_config::OperatorPrivilege;
use pipeline_gate_config::PipelineGateConfig;
use pipeline_gate_config::StoreConfig;
use pipeline_gate_config::load_policy_dir;
use pipeline_gate_core::AdvanceRequest;
use pipeline_gate_core::AdvanceResult;
use pipeline_gate_core::AuditError;
use pipeline_gate_core::AuditLog;
use pipeline_gate_core::CancelRequest;
use pipeline_gate_core::CommitSha;
use pipeline_gate_core::CreateRunRequest;
use pipeline_gate_core::EnvironmentId;
use pipeline_gate_core::EvidenceError;
use pipeline_gate_core::EvidenceHub;
use pipeline_gate_core::EvidenceNotice;
use pipeline_gate_core::EvidenceStore;
use pipeline_gate_core::GateController;
use pipeline_gate_core::GateError;
use pipeline_gate_core::GateVerdict;
use pipeline_gate_core::InMemoryAuditLog;
use pipeline_gate_core::InMemoryEvidenceStore;
use pipeline_gate_core::InMemoryRunStore;
use pipeline_gate_core::OverrideRequest;
use pipeline_gate_core::PolicyError;
use pipeline_gate_core::PolicyRegistry;
use pipeline_gate_core::RunId;
use pipeline_gate_core::RunStore;
use pipeline_gate_core::SourceId;
use pipeline_gate_core::StageId;
use pipeline_gate_core::StoreError;
use pipeline_gate_core::Timestamp;
use pipeline_gate_store_sqlite::SqliteGateStore;
use pipeline_gate_store_sqlite::SqliteStoreError;
use serde::Serialize;
use thiserror::Error;
use tokio::net::TcpListener;

use crate::api::AdvanceBody;
use crate::api::AdvanceResponse;
use crate::api::AuditQuery;
use crate::api::CancelBody;
use crate::api::CreateRunBody;
use crate::api::ErrorResponse;
use crate::api::EvidenceRequest;
use crate::api::EvidenceResponse;
use crate::api::OverrideBody;
use crate::api::PolicyReloadResponse;
use crate::audit::FileAuditSink;
use crate::audit::GateAuditEvent;
use crate::audit::GateAuditSink;
use crate::audit::GateRequestEvent;
use crate::audit::GateRoute;
use crate::audit::NoopAuditSink;
use crate::audit::ReevaluationEvent;
use crate::audit::SecurityAuditEvent;
use crate::audit::StderrAuditSink;
use crate::audit::now_millis;
use crate::auth::AuthError;
use crate::auth::Authenticator;
use crate::auth::LOCAL_PRINCIPAL;
use crate::auth::Principal;

// ============================================================================
// SECTION: Constants and Types
// ============================================================================

/// Default number of audit entries per export page.
const DEFAULT_EXPORT_LIMIT: usize = 100;
/// Maximum number of audit entries per export page.
const MAX_EXPORT_LIMIT: usize = 1_000;
/// JSON content type.
const JSON_CONTENT_TYPE: &str = "application/json";
/// Newline-delimited JSON content type.
const NDJSON_CONTENT_TYPE: &str = "application/x-ndjson";

/// Shared evidence store handle.
pub type SharedEvidenceStore = Arc<dyn EvidenceStore>;
/// Shared run store handle.
pub type SharedRunStore = Arc<dyn RunStore>;
/// Shared audit log handle.
pub type SharedAuditLog = Arc<dyn AuditLog>;
/// Controller over shared store handles.
pub type SharedController = GateController<SharedEvidenceStore, SharedRunStore, SharedAuditLog>;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Server assembly and runtime errors.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Configuration is invalid.
    #[error(transparent)]
    Config(#[from] ConfigError),
    /// Policy could not be published.
    #[error(transparent)]
    Policy(#[from] PolicyError),
    /// Store could not be opened.
    #[error(transparent)]
    Store(#[from] SqliteStoreError),
    /// Evidence hub setup failed.
    #[error(transparent)]
    Evidence(#[from] EvidenceError),
    /// Audit log could not be read at startup.
    #[error(transparent)]
    Audit(#[from] AuditError),
    /// Socket or file failure.
    #[error("server io error: {0}")]
    Io(String),
}

// ============================================================================
// SECTION: Server Assembly
// ============================================================================

/// Stores selected by the config.
struct Stores {
    /// Evidence store.
    evidence: SharedEvidenceStore,
    /// Run store.
    runs: SharedRunStore,
    /// Audit log.
    audit: SharedAuditLog,
    /// Backend label.
    label: &'static str,
}

/// Shared handler state.
pub(crate) struct AppState {
    /// Gate controller.
    controller: SharedController,
    /// Evidence ingestion front door.
    hub: EvidenceHub<SharedEvidenceStore>,
    /// Request authenticator.
    authenticator: Authenticator,
    /// Request audit sink.
    audit: Arc<dyn GateAuditSink>,
    /// Policy directory read on reload.
    policy_dir: PathBuf,
}

/// Assembled HTTP server.
pub struct GateServer {
    /// Handler state.
    state: Arc<AppState>,
    /// Configured bind address.
    bind: SocketAddr,
    /// Request body limit.
    max_body_bytes: usize,
}

impl GateServer {
    /// Builds a server from a validated config using its configured audit sink.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError`] when stores, policy, or keys cannot be loaded.
    pub fn from_config(config: &PipelineGateConfig) -> Result<Self, ServerError> {
        let sink = build_audit_sink(&config.audit)?;
        Self::with_audit_sink(config, sink)
    }

    /// Builds a server from a validated config with an explicit audit sink.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError`] when stores, policy, or keys cannot be loaded.
    pub fn with_audit_sink(
        config: &PipelineGateConfig,
        audit: Arc<dyn GateAuditSink>,
    ) -> Result<Self, ServerError> {
        let bind = config.bind_addr()?;
        let stores = build_stores(&config.store)?;
        let document = load_policy_dir(&config.policy.dir)?;
        let recorded = stores.audit.latest_policy()?;
        let registry = Arc::new(PolicyRegistry::resume(document, recorded.as_ref())?);
        let authenticator = Authenticator::from_config(&config.server);
        let mut controller_config = config.controller_config();
        if authenticator.is_local_only() {
            controller_config.override_actors.insert(SourceId::new(LOCAL_PRINCIPAL));
        }
        let controller = GateController::new(
            Arc::clone(&stores.evidence),
            stores.runs,
            stores.audit,
            registry,
            controller_config,
        );
        let hub = EvidenceHub::new(stores.evidence, config.keyring()?);
        let notices = hub.subscribe()?;

        audit.record(&GateAuditEvent::Security(SecurityAuditEvent {
            event: "security_audit",
            timestamp_ms: now_millis(),
            bind: bind.to_string(),
            auth_mode: authenticator.mode_label(),
            producers: config.server.producers.len(),
            operators: config.server.operators.len(),
            signing_keys: config.server.signing_keys.len(),
            store: stores.label,
        }));

        let state = Arc::new(AppState {
            controller,
            hub,
            authenticator,
            audit,
            policy_dir: config.policy.dir.clone(),
        });
        spawn_reevaluation(Arc::downgrade(&state), notices)?;
        Ok(Self {
            state,
            bind,
            max_body_bytes: config.server.max_body_bytes,
        })
    }

    /// Returns the configured bind address.
    #[must_use]
    pub const fn bind_addr(&self) -> SocketAddr {
        self.bind
    }

    /// Builds the HTTP router.
    #[must_use]
    pub fn router(&self) -> Router {
        Router::new()
            .route("/health", get(handle_health))
            .route("/v1/evidence", post(handle_submit_evidence))
            .route("/v1/runs", post(handle_create_run))
            .route("/v1/runs/{run_id}", get(handle_get_run))
            .route("/v1/runs/{run_id}/advance", post(handle_advance))
            .route("/v1/runs/{run_id}/override", post(handle_override))
            .route("/v1/runs/{run_id}/cancel", post(handle_cancel))
            .route("/v1/runs/{run_id}/decisions", get(handle_decisions))
            .route("/v1/audit", get(handle_audit_export))
            .route("/v1/admin/policy/reload", post(handle_policy_reload))
            .layer(DefaultBodyLimit::max(self.max_body_bytes))
            .with_state(Arc::clone(&self.state))
    }

    /// Binds the configured address and serves until the process exits.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::Io`] when binding or serving fails.
    pub async fn serve(self) -> Result<(), ServerError> {
        let listener = TcpListener::bind(self.bind)
            .await
            .map_err(|err| ServerError::Io(format!("bind {}: {err}", self.bind)))?;
        self.serve_listener(listener).await
    }

    /// Serves on an already bound listener.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::Io`] when serving fails.
    pub async fn serve_listener(self, listener: TcpListener) -> Result<(), ServerError> {
        axum::serve(listener, self.router()).await.map_err(|err| ServerError::Io(err.to_string()))
    }
}

/// Builds the audit sink selected by the config.
///
/// # Errors
///
/// Returns [`ServerError`] when the file sink cannot be opened.
pub fn build_audit_sink(config: &AuditConfig) -> Result<Arc<dyn GateAuditSink>, ServerError> {
    match config.sink {
        AuditSinkKind::Stderr => Ok(Arc::new(StderrAuditSink)),
        AuditSinkKind::None => Ok(Arc::new(NoopAuditSink)),
        AuditSinkKind::File => {
            let path = config.path.as_deref().ok_or_else(|| {
                ConfigError::Invalid("audit.path is required for the file sink".to_string())
            })?;
            let sink = FileAuditSink::new(path)
                .map_err(|err| ServerError::Io(format!("{}: {err}", path.display())))?;
            Ok(Arc::new(sink))
        }
    }
}

/// Opens the configured stores.
fn build_stores(config: &StoreConfig) -> Result<Stores, ServerError> {
    if let Some(sqlite) = config.sqlite_config() {
        let store = Arc::new(SqliteGateStore::new(sqlite)?);
        let evidence: SharedEvidenceStore = store.clone();
        let runs: SharedRunStore = store.clone();
        let audit: SharedAuditLog = store;
        return Ok(Stores {
            evidence,
            runs,
            audit,
            label: "sqlite",
        });
    }
    Ok(Stores {
        evidence: Arc::new(InMemoryEvidenceStore::new()),
        runs: Arc::new(InMemoryRunStore::new()),
        audit: Arc::new(InMemoryAuditLog::new()),
        label: "memory",
    })
}

// ============================================================================
// SECTION: Background Re-evaluation
// ============================================================================

/// Starts the thread that re-evaluates blocked runs on new evidence.
fn spawn_reevaluation(
    state: Weak<AppState>,
    notices: mpsc::Receiver<EvidenceNotice>,
) -> Result<(), ServerError> {
    std::thread::Builder::new()
        .name("pipeline-gate-reevaluate".to_string())
        .spawn(move || reevaluate_loop(&state, &notices))
        .map(|_| ())
        .map_err(|err| ServerError::Io(format!("spawn re-evaluation thread: {err}")))
}

/// Blocks on evidence notices until the hub is dropped.
fn reevaluate_loop(state: &Weak<AppState>, notices: &mpsc::Receiver<EvidenceNotice>) {
    while let Ok(notice) = notices.recv() {
        let Some(state) = state.upgrade() else {
            break;
        };
        let now = now_timestamp();
        match state.controller.retry_blocked(notice.run_id(), now) {
            Ok(Some(result)) => state.record_reevaluation(notice.run_id(), verdict_label(&result)),
            Ok(None) | Err(GateError::RunNotFound(_)) => {}
            Err(err) => state.record_reevaluation(notice.run_id(), &err.to_string()),
        }
        let report = state.controller.drain_notifications(notices, now);
        for result in &report.advanced {
            state.record_reevaluation(&result.run.run_id, verdict_label(result));
        }
        for (run_id, err) in &report.failed {
            state.record_reevaluation(run_id, &err.to_string());
        }
    }
}

// ============================================================================
// SECTION: Replies
// ============================================================================

/// Successful handler reply.
pub(crate) struct ApiReply {
    /// HTTP status.
    status: StatusCode,
    /// Encoded body.
    body: Vec<u8>,
    /// Content type.
    content_type: &'static str,
    /// Outcome label for the audit event.
    outcome: String,
}

impl ApiReply {
    /// Encodes `value` as a JSON reply.
    fn json<T: Serialize>(
        status: StatusCode,
        outcome: impl Into<String>,
        value: &T,
    ) -> Result<Self, ApiError> {
        let body = serde_json::to_vec(value)
            .map_err(|err| ApiError::internal(format!("response encoding failed: {err}")))?;
        Ok(Self {
            status,
            body,
            content_type: JSON_CONTENT_TYPE,
            outcome: outcome.into(),
        })
    }
}

/// Handler failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ApiError {
    /// HTTP status.
    pub(crate) status: StatusCode,
    /// Stable error kind label.
    pub(crate) kind: &'static str,
    /// Human-readable message.
    pub(crate) message: String,
    /// True when the request may be retried unchanged.
    pub(crate) retryable: bool,
}

impl ApiError {
    /// Builds a non-retryable error.
    fn new(status: StatusCode, kind: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            kind,
            message: message.into(),
            retryable: false,
        }
    }

    /// Builds an internal server error.
    fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "internal", message)
    }

    /// Builds a malformed request error.
    fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "invalid_request", message)
    }

    /// Converts the error into a reply.
    fn into_reply(self) -> ApiReply {
        let body = serde_json::to_vec(&ErrorResponse {
            error: self.kind.to_string(),
            message: self.message,
            retryable: self.retryable,
        })
        .unwrap_or_default();
        ApiReply {
            status: self.status,
            body,
            content_type: JSON_CONTENT_TYPE,
            outcome: self.kind.to_string(),
        }
    }
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::Unauthenticated(_) => {
                Self::new(StatusCode::UNAUTHORIZED, "unauthenticated", err.to_string())
            }
            AuthError::Forbidden(_) => {
                Self::new(StatusCode::FORBIDDEN, "forbidden", err.to_string())
            }
        }
    }
}

impl From<EvidenceError> for ApiError {
    fn from(err: EvidenceError) -> Self {
        match err {
            EvidenceError::Invalid(_) => {
                Self::new(StatusCode::BAD_REQUEST, "invalid_evidence", err.to_string())
            }
            EvidenceError::Store(_) => {
                Self::new(StatusCode::INTERNAL_SERVER_ERROR, "store_error", err.to_string())
            }
        }
    }
}

impl From<GateError> for ApiError {
    fn from(err: GateError) -> Self {
        let (status, kind) = gate_error_status(&err);
        Self {
            status,
            kind,
            retryable: err.is_retryable(),
            message: err.to_string(),
        }
    }
}

impl From<AuditError> for ApiError {
    fn from(err: AuditError) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "audit_error", err.to_string())
    }
}

/// Maps a controller error to its status code and kind label.
pub(crate) const fn gate_error_status(err: &GateError) -> (StatusCode, &'static str) {
    match err {
        GateError::RunNotFound(_) => (StatusCode::NOT_FOUND, "run_not_found"),
        GateError::RunAlreadyExists(_) => (StatusCode::CONFLICT, "run_already_exists"),
        GateError::RunCancelled(_) => (StatusCode::CONFLICT, "run_cancelled"),
        GateError::StageMismatch {
            ..
        } => (StatusCode::CONFLICT, "stage_mismatch"),
        GateError::StaleSnapshotConflict(_) => (StatusCode::CONFLICT, "stale_snapshot_conflict"),
        GateError::EvaluationTimeout => (StatusCode::SERVICE_UNAVAILABLE, "evaluation_timeout"),
        GateError::InvalidOverride(_) => (StatusCode::BAD_REQUEST, "invalid_override"),
        GateError::Unauthorized(_) => (StatusCode::FORBIDDEN, "unauthorized"),
        GateError::InvalidTransition(_) => (StatusCode::CONFLICT, "invalid_transition"),
        GateError::InvalidRequest(_) => (StatusCode::BAD_REQUEST, "invalid_request"),
        GateError::Policy(PolicyError::NoPolicyDefined {
            ..
        }) => (StatusCode::UNPROCESSABLE_ENTITY, "no_policy_defined"),
        GateError::Policy(_) => (StatusCode::INTERNAL_SERVER_ERROR, "policy_error"),
        GateError::Store(StoreError::Conflict(_)) => (StatusCode::CONFLICT, "store_conflict"),
        GateError::Store(_) => (StatusCode::INTERNAL_SERVER_ERROR, "store_error"),
        GateError::Audit(_) => (StatusCode::INTERNAL_SERVER_ERROR, "audit_error"),
    }
}

/// Maps a verdict to the advance response status code.
pub(crate) const fn verdict_status(verdict: GateVerdict) -> StatusCode {
    match verdict {
        GateVerdict::Admitted => StatusCode::OK,
        GateVerdict::Blocked => StatusCode::ACCEPTED,
        GateVerdict::Rejected => StatusCode::UNPROCESSABLE_ENTITY,
    }
}

/// Returns the verdict label for an advance result.
const fn verdict_label(result: &AdvanceResult) -> &'static str {
    match result.decision.verdict {
        GateVerdict::Admitted => "admitted",
        GateVerdict::Blocked => "blocked",
        GateVerdict::Rejected => "rejected",
    }
}

// ============================================================================
// SECTION: Dispatch
// ============================================================================

impl AppState {
    /// Records the request event and renders the reply.
    fn respond(
        &self,
        route: GateRoute,
        principal: Option<String>,
        request_bytes: usize,
        result: Result<ApiReply, ApiError>,
    ) -> Response {
        let reply = result.unwrap_or_else(ApiError::into_reply);
        self.audit.record(&GateAuditEvent::Request(GateRequestEvent::new(
            route,
            reply.status.as_u16(),
            reply.outcome,
            principal,
            request_bytes,
            reply.body.len(),
        )));
        (reply.status, [(CONTENT_TYPE, reply.content_type)], reply.body).into_response()
    }

    /// Records a background re-evaluation event.
    fn record_reevaluation(&self, run_id: &RunId, outcome: &str) {
        self.audit.record(&GateAuditEvent::Reevaluation(ReevaluationEvent {
            event: "gate_reevaluation",
            timestamp_ms: now_millis(),
            run_id: run_id.to_string(),
            outcome: outcome.to_string(),
        }));
    }
}

/// Authenticates, runs `handler`, and records the request.
async fn dispatch<F, Fut>(
    state: Arc<AppState>,
    route: GateRoute,
    headers: &HeaderMap,
    request_bytes: usize,
    handler: F,
) -> Response
where
    F: FnOnce(Arc<AppState>, Principal) -> Fut,
    Fut: Future<Output = Result<ApiReply, ApiError>>,
{
    match state.authenticator.authenticate(headers) {
        Ok(principal) => {
            let name = principal.name().to_string();
            let result = handler(Arc::clone(&state), principal).await;
            state.respond(route, Some(name), request_bytes, result)
        }
        Err(err) => state.respond(route, None, request_bytes, Err(err.into())),
    }
}

/// Runs synchronous core work on the blocking pool.
async fn blocking<T, F>(state: Arc<AppState>, work: F) -> Result<T, ApiError>
where
    T: Send + 'static,
    F: FnOnce(&AppState) -> Result<T, ApiError> + Send + 'static,
{
    tokio::task::spawn_blocking(move || work(&state))
        .await
        .map_err(|err| ApiError::internal(format!("worker failed: {err}")))?
}

/// Parses a strict JSON request body.
fn parse_body<T: serde::de::DeserializeOwned>(body: &Bytes) -> Result<T, ApiError> {
    serde_json::from_slice(body)
        .map_err(|err| ApiError::bad_request(format!("malformed body: {err}")))
}

/// Returns the current time as a timestamp.
fn now_timestamp() -> Timestamp {
    Timestamp::new(u64::try_from(now_millis()).unwrap_or(u64::MAX))
}

// ============================================================================
// SECTION: Handlers
// ============================================================================

/// Liveness probe.
async fn handle_health() -> Response {
    (StatusCode::OK, [(CONTENT_TYPE, JSON_CONTENT_TYPE)], r#"{"status":"ok"}"#).into_response()
}

/// `POST /v1/evidence`.
async fn handle_submit_evidence(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let bytes = body.len();
    dispatch(state, GateRoute::SubmitEvidence, &headers, bytes, |state, principal| {
        submit_evidence(state, principal, body)
    })
    .await
}

/// Validates and stores one evidence record.
async fn submit_evidence(
    state: Arc<AppState>,
    principal: Principal,
    body: Bytes,
) -> Result<ApiReply, ApiError> {
    let request: EvidenceRequest = serde_json::from_slice(&body).map_err(|err| {
        let message = format!("malformed evidence: {err}");
        ApiError::new(StatusCode::BAD_REQUEST, "invalid_evidence", message)
    })?;
    let submission = request.into_submission();
    principal.require_source(&submission.source)?;
    let receipt =
        blocking(state, move |state| state.hub.submit(submission).map_err(ApiError::from)).await?;
    let (status, outcome) = if receipt.duplicate {
        (StatusCode::OK, "duplicate")
    } else {
        (StatusCode::CREATED, "accepted")
    };
    ApiReply::json(status, outcome, &EvidenceResponse::from(receipt))
}

/// `POST /v1/runs`.
async fn handle_create_run(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let bytes = body.len();
    dispatch(state, GateRoute::CreateRun, &headers, bytes, |state, principal| async move {
        principal.require(OperatorPrivilege::Advance)?;
        let request: CreateRunBody = parse_body(&body)?;
        let run = blocking(state, move |state| {
            state
                .controller
                .create_run(CreateRunRequest {
                    run_id: RunId::new(request.run_id),
                    environment: EnvironmentId::new(request.environment),
                    commit_sha: CommitSha::new(request.commit_sha),
                    created_at: request.created_at.map_or_else(now_timestamp, Timestamp::new),
                })
                .map_err(ApiError::from)
        })
        .await?;
        ApiReply::json(StatusCode::CREATED, "created", &run)
    })
    .await
}

/// `GET /v1/runs/{run_id}`.
async fn handle_get_run(
    State(state): State<Arc<AppState>>,
    Path(run_id): Path<String>,
    headers: HeaderMap,
) -> Response {
    dispatch(state, GateRoute::GetRun, &headers, 0, |state, principal| async move {
        principal.require_operator()?;
        let run = blocking(state, move |state| {
            state.controller.run(&RunId::new(run_id)).map_err(ApiError::from)
        })
        .await?;
        ApiReply::json(StatusCode::OK, run.status.as_str(), &run)
    })
    .await
}

/// `POST /v1/runs/{run_id}/advance`.
async fn handle_advance(
    State(state): State<Arc<AppState>>,
    Path(run_id): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let bytes = body.len();
    dispatch(state, GateRoute::Advance, &headers, bytes, |state, principal| async move {
        principal.require(OperatorPrivilege::Advance)?;
        let request: AdvanceBody =
            if body.is_empty() { AdvanceBody::default() } else { parse_body(&body)? };
        let result = blocking(state, move |state| {
            state
                .controller
                .request_advance(AdvanceRequest {
                    run_id: RunId::new(run_id),
                    stage: request.stage.map(StageId::new),
                    requested_at: now_timestamp(),
                    expected_decisions: request.expected_decisions,
                })
                .map_err(ApiError::from)
        })
        .await?;
        advance_reply(result)
    })
    .await
}

/// `POST /v1/runs/{run_id}/override`.
async fn handle_override(
    State(state): State<Arc<AppState>>,
    Path(run_id): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let bytes = body.len();
    dispatch(state, GateRoute::Override, &headers, bytes, |state, principal| async move {
        principal.require(OperatorPrivilege::Override)?;
        let request: OverrideBody = parse_body(&body)?;
        let actor = SourceId::new(principal.name());
        let result = blocking(state, move |state| {
            state
                .controller
                .override_stage(OverrideRequest {
                    run_id: RunId::new(run_id),
                    stage: request.stage_id(),
                    actor,
                    waived_rules: request.rule_ids(),
                    justification: request.justification,
                    requested_at: now_timestamp(),
                })
                .map_err(ApiError::from)
        })
        .await?;
        advance_reply(result)
    })
    .await
}

/// Renders an advance or override result.
fn advance_reply(result: AdvanceResult) -> Result<ApiReply, ApiError> {
    let status = verdict_status(result.decision.verdict);
    let outcome = verdict_label(&result);
    ApiReply::json(status, outcome, &AdvanceResponse::from(result))
}

/// `POST /v1/runs/{run_id}/cancel`.
async fn handle_cancel(
    State(state): State<Arc<AppState>>,
    Path(run_id): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let bytes = body.len();
    dispatch(state, GateRoute::Cancel, &headers, bytes, |state, principal| async move {
        principal.require(OperatorPrivilege::Cancel)?;
        let request: CancelBody = parse_body(&body)?;
        let actor = SourceId::new(principal.name());
        let run = blocking(state, move |state| {
            state
                .controller
                .cancel(CancelRequest {
                    run_id: RunId::new(run_id),
                    actor,
                    reason: request.reason,
                    requested_at: now_timestamp(),
                })
                .map_err(ApiError::from)
        })
        .await?;
        ApiReply::json(StatusCode::OK, run.status.as_str(), &run)
    })
    .await
}

/// `GET /v1/runs/{run_id}/decisions`.
async fn handle_decisions(
    State(state): State<Arc<AppState>>,
    Path(run_id): Path<String>,
    headers: HeaderMap,
) -> Response {
    dispatch(state, GateRoute::Decisions, &headers, 0, |state, principal| async move {
        principal.require_operator()?;
        let decisions = blocking(state, move |state| {
            let run_id = RunId::new(run_id);
            state.controller.run(&run_id)?;
            state.controller.history(&run_id).map_err(ApiError::from)
        })
        .await?;
        ApiReply::json(StatusCode::OK, "ok", &decisions)
    })
    .await
}

/// `GET /v1/audit?after=N&limit=M`.
async fn handle_audit_export(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    uri: Uri,
) -> Response {
    dispatch(state, GateRoute::AuditExport, &headers, 0, |state, principal| async move {
        principal.require(OperatorPrivilege::Audit)?;
        let Query(query) = Query::<AuditQuery>::try_from_uri(&uri)
            .map_err(|err| ApiError::bad_request(format!("invalid audit query: {err}")))?;
        let limit = query.limit.unwrap_or(DEFAULT_EXPORT_LIMIT).min(MAX_EXPORT_LIMIT);
        let entries = blocking(state, move |state| {
            state.controller.audit().export(query.after, limit).map_err(ApiError::from)
        })
        .await?;
        let mut body = Vec::new();
        for entry in &entries {
            serde_json::to_writer(&mut body, entry)
                .map_err(|err| ApiError::internal(format!("audit encoding failed: {err}")))?;
            body.push(b'\n');
        }
        Ok(ApiReply {
            status: StatusCode::OK,
            body,
            content_type: NDJSON_CONTENT_TYPE,
            outcome: format!("entries={}", entries.len()),
        })
    })
    .await
}

/// `POST /v1/admin/policy/reload`.
async fn handle_policy_reload(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let bytes = body.len();
    dispatch(state, GateRoute::PolicyReload, &headers, bytes, |state, principal| async move {
        principal.require(OperatorPrivilege::Admin)?;
        let snapshot = blocking(state, move |state| {
            let document = load_policy_dir(&state.policy_dir).map_err(|err| {
                ApiError::new(StatusCode::UNPROCESSABLE_ENTITY, "invalid_policy", err.to_string())
            })?;
            state.controller.policy().publish(document).map_err(|err| {
                ApiError::new(StatusCode::UNPROCESSABLE_ENTITY, "invalid_policy", err.to_string())
            })
        })
        .await?;
        ApiReply::json(
            StatusCode::OK,
            format!("version={}", snapshot.version),
            &PolicyReloadResponse {
                version: snapshot.version,
                document_hash: snapshot.document_hash.clone(),
            },
        )
    })
    .await
}

#[cfg(test)]
mod tests;
