// crates/pipeline-gate-cli/src/main.rs
// ============================================================================
// Module: Pipeline Gate CLI Entry Point
// Description: Command dispatcher for the gate server and offline workflows.
// Purpose: Serve the gate, validate policy, evaluate offline, and audit stores.
// Dependencies: clap, pipeline-gate-{config, core, server, store-sqlite}, tokio
// ============================================================================

//! ## Overview
//! `pipeline-gate` runs the HTTP gate server, validates and renders policy
//! directories, evaluates a run offline against a JSON-lines evidence file,
//! asks a running server to advance a run, and verifies or exports the
//! `SQLite` audit chain.
//!
//! Gate commands map verdicts to exit codes so pipelines can branch on them:
//! `0` admitted, `2` blocked, `3` rejected, `4` cancelled, `1` error.
//!
//! Security posture: evidence and policy files are untrusted; reads are
//! size-limited and parsed strictly.

// ============================================================================
// SECTION: Modules
// ============================================================================


// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::fs::File;
use std::io::Read;
use std::io::Write;
use std::path::Path;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::SystemTime;
use std::time::UNIX_EPOCH;

use clap::ArgAction;
use clap::Args;
use clap::CommandFactory;
use clap::Parser;
use clap::Subcommand;
use pipeline_gate_config::PipelineGateConfig;
use pipeline_gate_config::load_policy_dir;
use pipeline_gate_core::AdvanceRequest;
use pipeline_gate_core::AuditError;
use pipeline_gate_core::AuditLog;
use pipeline_gate_core::CommitSha;
use pipeline_gate_core::CreateRunRequest;
use pipeline_gate_core::EnvironmentId;
use pipeline_gate_core::EvidenceHub;
use pipeline_gate_core::GateController;
use pipeline_gate_core::GateControllerConfig;
use pipeline_gate_core::GateError;
use pipeline_gate_core::GateVerdict;
use pipeline_gate_core::HashDigest;
use pipeline_gate_core::InMemoryAuditLog;
use pipeline_gate_core::InMemoryEvidenceStore;
use pipeline_gate_core::InMemoryRunStore;
use pipeline_gate_core::PolicyRegistry;
use pipeline_gate_core::PolicyRule;
use pipeline_gate_core::PolicySnapshot;
use pipeline_gate_core::PolicyVersion;
use pipeline_gate_core::ProducerKeyring;
use pipeline_gate_core::RunId;
use pipeline_gate_core::RunStatus;
use pipeline_gate_core::StageId;
use pipeline_gate_core::Timestamp;
use pipeline_gate_server::AdvanceResponse;
use pipeline_gate_server::EvidenceRequest;
use pipeline_gate_server::GateServer;
use pipeline_gate_server::api::AdvanceBody;
use pipeline_gate_store_sqlite::SqliteGateStore;
use pipeline_gate_store_sqlite::SqliteStoreConfig;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

// ============================================================================
// SECTION: Limits and Exit Codes
// ============================================================================

/// Maximum size of an offline evidence file.
const MAX_EVIDENCE_FILE_BYTES: usize = 16 * 1024 * 1024;
/// Maximum number of records in an offline evidence file.
const MAX_EVIDENCE_RECORDS: usize = 10_000;
/// Default page size for `audit export`.
const DEFAULT_EXPORT_LIMIT: usize = 1_000;
/// Default server URL for `advance`.
const DEFAULT_SERVER_URL: &str = "http://127.0.0.1:8480";
/// Environment variable holding the bearer token for `advance`.
const TOKEN_ENV: &str = "PIPELINE_GATE_TOKEN";
/// Exit code for a blocked stage.
const EXIT_BLOCKED: u8 = 2;
/// Exit code for a rejected stage.
const EXIT_REJECTED: u8 = 3;
/// Exit code for a cancelled run.
const EXIT_CANCELLED: u8 = 4;
/// Exit code for errors.
const EXIT_ERROR: u8 = 1;

// ============================================================================
// SECTION: CLI Types
// ============================================================================

/// Top-level CLI definition.
#[derive(Parser, Debug)]
#[command(name = "pipeline-gate", disable_help_subcommand = true, disable_version_flag = true)]
struct Cli {
    /// Print version information and exit.
    #[arg(long = "version", action = ArgAction::SetTrue, global = true)]
    show_version: bool,
    /// Selected subcommand to execute.
    #[command(subcommand)]
    command: Option<Commands>,
}

/// Supported CLI subcommands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Start the pipeline gate HTTP server.
    Serve(ServeCommand),
    /// Policy directory utilities.
    Policy {
        /// Selected policy subcommand.
        #[command(subcommand)]
        command: PolicyCommand,
    },
    /// Evaluate a run offline against a JSON-lines evidence file.
    Evaluate(EvaluateCommand),
    /// Ask a running server to advance a run.
    Advance(AdvanceCommand),
    /// `SQLite` audit log utilities.
    Audit {
        /// Selected audit subcommand.
        #[command(subcommand)]
        command: AuditCommand,
    },
}

/// `serve` arguments.
#[derive(Args, Debug)]
struct ServeCommand {
    /// Config file path (defaults to `PIPELINE_GATE_CONFIG` or `pipeline-gate.toml`).
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,
}

/// Policy subcommands.
#[derive(Subcommand, Debug)]
enum PolicyCommand {
    /// Validate a policy directory.
    Validate(PolicyDirArgs),
    /// Print the policy document or the rules effective for a stage.
    Show(PolicyShowCommand),
}

/// Policy directory location.
#[derive(Args, Debug, Clone)]
struct PolicyDirArgs {
    /// Directory holding `base.toml` and per-environment policy files.
    #[arg(long = "policy", value_name = "DIR")]
    dir: PathBuf,
}

/// `policy show` arguments.
#[derive(Args, Debug)]
struct PolicyShowCommand {
    /// Policy directory.
    #[command(flatten)]
    policy: PolicyDirArgs,
    /// Environment whose effective rules should be printed.
    #[arg(long)]
    environment: Option<String>,
    /// Restrict output to one stage.
    #[arg(long, requires = "environment")]
    stage: Option<String>,
}

/// `evaluate` arguments.
#[derive(Args, Debug, Clone)]
struct EvaluateCommand {
    /// Policy directory.
    #[command(flatten)]
    policy: PolicyDirArgs,
    /// Target environment.
    #[arg(long)]
    environment: String,
    /// Run identifier evidence records refer to.
    #[arg(long)]
    run_id: String,
    /// Commit under evaluation.
    #[arg(long)]
    commit_sha: String,
    /// JSON-lines evidence file in the `POST /v1/evidence` format.
    #[arg(long, value_name = "PATH")]
    evidence: PathBuf,
    /// Stop after this stage is admitted (defaults to the final stage).
    #[arg(long)]
    stage: Option<String>,
    /// Evidence cutoff in unix milliseconds (defaults to now).
    #[arg(long, value_name = "UNIX_MS")]
    as_of: Option<u64>,
    /// Service config supplying signing keys and the evaluation timeout.
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,
}

/// `advance` arguments.
#[derive(Args, Debug)]
struct AdvanceCommand {
    /// Gate server base URL.
    #[arg(long, value_name = "URL", default_value = DEFAULT_SERVER_URL)]
    server: String,
    /// Run to advance.
    #[arg(long)]
    run_id: String,
    /// Stage to evaluate (defaults to the current stage).
    #[arg(long)]
    stage: Option<String>,
    /// Optimistic check on decisions already applied to the run.
    #[arg(long)]
    expected_decisions: Option<u64>,
}

/// Audit subcommands.
#[derive(Subcommand, Debug)]
enum AuditCommand {
    /// Verify the audit hash chain.
    Verify(StoreLocationArgs),
    /// Export audit entries as NDJSON.
    Export(AuditExportCommand),
}

/// `SQLite` store location.
#[derive(Args, Debug, Clone)]
struct StoreLocationArgs {
    /// Database file path.
    #[arg(long = "store", value_name = "PATH", conflicts_with = "config")]
    store_path: Option<PathBuf>,
    /// Service config whose `[store]` section selects the database.
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,
}

/// `audit export` arguments.
#[derive(Args, Debug)]
struct AuditExportCommand {
    /// Store location.
    #[command(flatten)]
    location: StoreLocationArgs,
    /// Export entries with sequence greater than this value.
    #[arg(long, default_value_t = 0)]
    after: u64,
    /// Maximum number of entries.
    #[arg(long, default_value_t = DEFAULT_EXPORT_LIMIT)]
    limit: usize,
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// CLI error carrying a user-facing message.
#[derive(Debug, Error)]
#[error("{message}")]
struct CliError {
    /// Human-readable error message.
    message: String,
}

impl CliError {
    /// Constructs a new [`CliError`].
    fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// CLI result alias for fallible operations.
type CliResult<T> = Result<T, CliError>;

// ============================================================================
// SECTION: Entry Point
// ============================================================================

/// CLI entry point returning an exit code.
#[tokio::main(flavor = "multi_thread")]
async fn main() -> ExitCode {
    match run().await {
        Ok(code) => code,
        Err(err) => emit_error(&err.to_string()),
    }
}

/// Executes the CLI command dispatcher.
async fn run() -> CliResult<ExitCode> {
    let cli = Cli::parse();
    if cli.show_version {
        let version = env!("CARGO_PKG_VERSION");
        write_stdout_line(&format!("pipeline-gate {version}"))
            .map_err(|err| CliError::new(output_error("stdout", &err)))?;
        return Ok(ExitCode::SUCCESS);
    }

    let Some(command) = cli.command else {
        show_help()?;
        return Ok(ExitCode::SUCCESS);
    };

    match command {
        Commands::Serve(command) => command_serve(command).await,
        Commands::Policy {
            command,
        } => command_policy(command),
        Commands::Evaluate(command) => command_evaluate(&command),
        Commands::Advance(command) => command_advance(command).await,
        Commands::Audit {
            command,
        } => command_audit(command),
    }
}

/// Prints top-level help.
fn show_help() -> CliResult<()> {
    let help = Cli::command().render_help().to_string();
    write_stdout_line(&help).map_err(|err| CliError::new(output_error("stdout", &err)))
}

// ============================================================================
// SECTION: Serve Command
// ============================================================================

/// Executes the `serve` command.
async fn command_serve(command: ServeCommand) -> CliResult<ExitCode> {
    let config = PipelineGateConfig::load(command.config.as_deref())
        .map_err(|err| CliError::new(format!("failed to load config: {err}")))?;
    if config.server.producers.is_empty() && config.server.operators.is_empty() {
        write_stderr_line(&format!(
            "warning: no auth tokens configured; serving local-only on {}",
            config.server.bind
        ))
        .map_err(|err| CliError::new(output_error("stderr", &err)))?;
    }
    let server = tokio::task::spawn_blocking(move || GateServer::from_config(&config))
        .await
        .map_err(|err| CliError::new(format!("server init join failed: {err}")))?
        .map_err(|err| CliError::new(format!("server init failed: {err}")))?;
    server.serve().await.map_err(|err| CliError::new(format!("server failed: {err}")))?;
    Ok(ExitCode::SUCCESS)
}

// ============================================================================
// SECTION: Policy Commands
// ============================================================================

/// Summary printed by `policy validate`.
#[derive(Debug, Serialize)]
struct PolicySummary {
    /// Canonical document hash.
    document_hash: HashDigest,
    /// Number of base rules.
    base_rules: usize,
    /// Declared environments.
    environments: Vec<EnvironmentSummary>,
}

/// Per-environment summary.
#[derive(Debug, Serialize)]
struct EnvironmentSummary {
    /// Environment identifier.
    environment: EnvironmentId,
    /// Ordered stages.
    stages: Vec<StageId>,
    /// Environment-specific rule count.
    rules: usize,
}

/// Dispatches policy subcommands.
fn command_policy(command: PolicyCommand) -> CliResult<ExitCode> {
    match command {
        PolicyCommand::Validate(args) => command_policy_validate(&args),
        PolicyCommand::Show(command) => command_policy_show(&command),
    }
}

/// Loads a policy directory into an unpublished snapshot.
fn load_snapshot(dir: &Path) -> CliResult<PolicySnapshot> {
    let document = load_policy_dir(dir)
        .map_err(|err| CliError::new(format!("policy {}: {err}", dir.display())))?;
    PolicySnapshot::new(PolicyVersion::new(1), document)
        .map_err(|err| CliError::new(format!("policy {}: {err}", dir.display())))
}

/// Executes `policy validate`.
fn command_policy_validate(args: &PolicyDirArgs) -> CliResult<ExitCode> {
    let snapshot = load_snapshot(&args.dir)?;
    write_json(&policy_summary(&snapshot))?;
    Ok(ExitCode::SUCCESS)
}

/// Builds the validation summary.
fn policy_summary(snapshot: &PolicySnapshot) -> PolicySummary {
    PolicySummary {
        document_hash: snapshot.document_hash.clone(),
        base_rules: snapshot.document.base.len(),
        environments: snapshot
            .document
            .environments
            .iter()
            .map(|env| EnvironmentSummary {
                environment: env.environment.clone(),
                stages: env.stages.clone(),
                rules: env.rules.len(),
            })
            .collect(),
    }
}

/// Executes `policy show`.
fn command_policy_show(command: &PolicyShowCommand) -> CliResult<ExitCode> {
    let snapshot = load_snapshot(&command.policy.dir)?;
    let Some(environment) = command.environment.as_deref() else {
        write_json(&snapshot.document)?;
        return Ok(ExitCode::SUCCESS);
    };
    let effective = effective_rules(&snapshot, environment, command.stage.as_deref())?;
    write_json(&effective)?;
    Ok(ExitCode::SUCCESS)
}

/// Resolves effective rules per stage; stages without rules map to empty lists.
fn effective_rules(
    snapshot: &PolicySnapshot,
    environment: &str,
    stage: Option<&str>,
) -> CliResult<BTreeMap<StageId, Vec<PolicyRule>>> {
    let environment = EnvironmentId::new(environment);
    let env = snapshot
        .environment(&environment)
        .ok_or_else(|| CliError::new(format!("environment {environment} is not declared")))?;
    let stages: Vec<StageId> = match stage {
        Some(stage) => {
            let stage = StageId::new(stage);
            if !env.stages.contains(&stage) {
                return Err(CliError::new(format!(
                    "stage {stage} is not declared by environment {environment}"
                )));
            }
            vec![stage]
        }
        None => env.stages.clone(),
    };
    Ok(stages
        .into_iter()
        .map(|stage| {
            let rules = snapshot.resolve(&environment, &stage).unwrap_or_default();
            (stage, rules)
        })
        .collect())
}

// ============================================================================
// SECTION: Offline Evaluation
// ============================================================================

/// Result of an offline evaluation.
struct OfflineOutcome {
    /// Exit status for the final verdict.
    exit_status: u8,
    /// Decisions in stage order.
    responses: Vec<AdvanceResponse>,
}

/// Executes `evaluate`.
fn command_evaluate(command: &EvaluateCommand) -> CliResult<ExitCode> {
    let outcome = evaluate_offline(command)?;
    for response in &outcome.responses {
        write_json(response)?;
    }
    Ok(ExitCode::from(outcome.exit_status))
}

/// Replays an evidence file into in-memory stores and advances stage by stage.
fn evaluate_offline(command: &EvaluateCommand) -> CliResult<OfflineOutcome> {
    let document = load_policy_dir(&command.policy.dir)
        .map_err(|err| CliError::new(format!("policy {}: {err}", command.policy.dir.display())))?;
    let (keyring, controller_config) = match command.config.as_deref() {
        Some(path) => {
            let config = PipelineGateConfig::load(Some(path))
                .map_err(|err| CliError::new(format!("failed to load config: {err}")))?;
            let keyring = config.keyring().map_err(|err| CliError::new(err.to_string()))?;
            (keyring, config.controller_config())
        }
        None => (ProducerKeyring::new(), GateControllerConfig::default()),
    };
    let records = read_evidence_file(&command.evidence)?;

    let store = Arc::new(InMemoryEvidenceStore::new());
    let registry = PolicyRegistry::with_document(document)
        .map_err(|err| CliError::new(err.to_string()))?;
    let controller = GateController::new(
        Arc::clone(&store),
        InMemoryRunStore::new(),
        InMemoryAuditLog::new(),
        Arc::new(registry),
        controller_config,
    );
    let hub = EvidenceHub::new(store, keyring);
    for (line, request) in records {
        hub.submit(request.into_submission())
            .map_err(|err| CliError::new(format!("evidence line {line}: {err}")))?;
    }

    let as_of = command.as_of.map_or_else(now_timestamp, Timestamp::new);
    let run_id = RunId::new(command.run_id.as_str());
    controller
        .create_run(CreateRunRequest {
            run_id: run_id.clone(),
            environment: EnvironmentId::new(command.environment.as_str()),
            commit_sha: CommitSha::new(command.commit_sha.as_str()),
            created_at: as_of,
        })
        .map_err(|err| CliError::new(err.to_string()))?;

    let mut responses = Vec::new();
    loop {
        let result = match controller.request_advance(AdvanceRequest {
            run_id: run_id.clone(),
            stage: None,
            requested_at: as_of,
            expected_decisions: None,
        }) {
            Ok(result) => result,
            Err(GateError::RunCancelled(_)) => {
                return Ok(OfflineOutcome {
                    exit_status: EXIT_CANCELLED,
                    responses,
                });
            }
            Err(err) => return Err(CliError::new(err.to_string())),
        };
        let verdict = result.decision.verdict;
        let finished = result.run.status == RunStatus::Admitted
            || command.stage.as_deref() == Some(result.decision.stage.as_str());
        responses.push(AdvanceResponse::from(result));
        if verdict != GateVerdict::Admitted || finished {
            return Ok(OfflineOutcome {
                exit_status: verdict_exit_status(verdict),
                responses,
            });
        }
    }
}

/// Reads and parses a JSON-lines evidence file, keeping 1-based line numbers.
fn read_evidence_file(path: &Path) -> CliResult<Vec<(usize, EvidenceRequest)>> {
    let bytes = read_bytes_with_limit(path, MAX_EVIDENCE_FILE_BYTES).map_err(|err| match err {
        ReadLimitError::Io(err) => {
            CliError::new(format!("failed to read evidence {}: {err}", path.display()))
        }
        ReadLimitError::TooLarge {
            size,
            limit,
        } => CliError::new(format!(
            "evidence {} exceeds size limit ({size} > {limit} bytes)",
            path.display()
        )),
    })?;
    let text = String::from_utf8(bytes)
        .map_err(|_| CliError::new(format!("evidence {} must be utf-8", path.display())))?;
    parse_evidence_lines(&text)
}

/// Parses JSON-lines evidence, skipping blank lines.
fn parse_evidence_lines(text: &str) -> CliResult<Vec<(usize, EvidenceRequest)>> {
    let mut records = Vec::new();
    for (index, line) in text.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        if records.len() == MAX_EVIDENCE_RECORDS {
            return Err(CliError::new(format!(
                "evidence file exceeds {MAX_EVIDENCE_RECORDS} records"
            )));
        }
        let line_number = index + 1;
        let request: EvidenceRequest = serde_json::from_str(line)
            .map_err(|err| CliError::new(format!("evidence line {line_number}: {err}")))?;
        records.push((line_number, request));
    }
    Ok(records)
}

/// Maps a verdict to its exit status.
const fn verdict_exit_status(verdict: GateVerdict) -> u8 {
    match verdict {
        GateVerdict::Admitted => 0,
        GateVerdict::Blocked => EXIT_BLOCKED,
        GateVerdict::Rejected => EXIT_REJECTED,
    }
}

/// Returns the current time as a timestamp.
fn now_timestamp() -> Timestamp {
    let millis =
        SystemTime::now().duration_since(UNIX_EPOCH).map_or(0, |elapsed| elapsed.as_millis());
    Timestamp::new(u64::try_from(millis).unwrap_or(u64::MAX))
}

// ============================================================================
// SECTION: Remote Advance
// ============================================================================

/// Executes `advance` against a running server.
async fn command_advance(command: AdvanceCommand) -> CliResult<ExitCode> {
    let base = command.server.trim_end_matches('/');
    let url = format!("{base}/v1/runs/{}/advance", command.run_id);
    let body = AdvanceBody {
        stage: command.stage,
        expected_decisions: command.expected_decisions,
    };
    let mut request = reqwest::Client::new().post(url).json(&body);
    if let Ok(token) = std::env::var(TOKEN_ENV) {
        request = request.bearer_auth(token);
    }
    let response = request
        .send()
        .await
        .map_err(|err| CliError::new(format!("advance request failed: {err}")))?;
    let status = response.status().as_u16();
    let payload: Value = response
        .json()
        .await
        .map_err(|err| CliError::new(format!("invalid response from gate ({status}): {err}")))?;
    let exit_status = advance_exit_status(status, &payload);
    if exit_status == EXIT_ERROR {
        let message =
            payload.get("message").and_then(Value::as_str).unwrap_or("unexpected response");
        return Err(CliError::new(format!("gate returned {status}: {message}")));
    }
    write_json(&payload)?;
    Ok(ExitCode::from(exit_status))
}

/// Maps an advance response to its exit status.
fn advance_exit_status(status: u16, payload: &Value) -> u8 {
    let verdict = payload.get("verdict").and_then(Value::as_str);
    let error = payload.get("error").and_then(Value::as_str);
    match (status, verdict, error) {
        (200, Some("admitted"), _) => 0,
        (202, Some("blocked"), _) => EXIT_BLOCKED,
        (422, Some("rejected"), _) => EXIT_REJECTED,
        (409, _, Some("run_cancelled")) => EXIT_CANCELLED,
        _ => EXIT_ERROR,
    }
}

// ============================================================================
// SECTION: Audit Commands
// ============================================================================

/// Result printed by `audit verify`.
#[derive(Debug, Serialize)]
struct AuditVerifyOutput {
    /// `pass` or `fail`.
    status: &'static str,
    /// Verified entry count (pass only).
    #[serde(skip_serializing_if = "Option::is_none")]
    entries: Option<u64>,
    /// First broken sequence (fail only).
    #[serde(skip_serializing_if = "Option::is_none")]
    broken_at: Option<u64>,
    /// Failure detail.
    #[serde(skip_serializing_if = "Option::is_none")]
    detail: Option<String>,
}

/// Dispatches audit subcommands.
fn command_audit(command: AuditCommand) -> CliResult<ExitCode> {
    match command {
        AuditCommand::Verify(location) => command_audit_verify(&location),
        AuditCommand::Export(command) => command_audit_export(&command),
    }
}

/// Executes `audit verify`.
fn command_audit_verify(location: &StoreLocationArgs) -> CliResult<ExitCode> {
    let store = open_sqlite_store(location)?;
    let (output, code) = match store.verify_audit_chain() {
        Ok(entries) => (
            AuditVerifyOutput {
                status: "pass",
                entries: Some(entries),
                broken_at: None,
                detail: None,
            },
            ExitCode::SUCCESS,
        ),
        Err(AuditError::ChainBroken {
            seq,
            detail,
        }) => (
            AuditVerifyOutput {
                status: "fail",
                entries: None,
                broken_at: Some(seq),
                detail: Some(detail),
            },
            ExitCode::FAILURE,
        ),
        Err(err) => return Err(CliError::new(format!("audit verification failed: {err}"))),
    };
    write_json(&output)?;
    Ok(code)
}

/// Executes `audit export`.
fn command_audit_export(command: &AuditExportCommand) -> CliResult<ExitCode> {
    let store = open_sqlite_store(&command.location)?;
    let entries = store
        .export(command.after, command.limit)
        .map_err(|err| CliError::new(format!("audit export failed: {err}")))?;
    for entry in &entries {
        write_json(entry)?;
    }
    Ok(ExitCode::SUCCESS)
}

/// Resolves the `SQLite` store configuration.
fn resolve_sqlite_store_config(location: &StoreLocationArgs) -> CliResult<SqliteStoreConfig> {
    if let Some(path) = &location.store_path {
        return Ok(SqliteStoreConfig::new(path.clone()));
    }
    let Some(config_path) = location.config.as_deref() else {
        return Err(CliError::new("either --store or --config is required"));
    };
    let config = PipelineGateConfig::load(Some(config_path))
        .map_err(|err| CliError::new(format!("failed to load config: {err}")))?;
    config
        .store
        .sqlite_config()
        .ok_or_else(|| CliError::new("config does not select the sqlite store"))
}

/// Opens the `SQLite` store.
fn open_sqlite_store(location: &StoreLocationArgs) -> CliResult<SqliteGateStore> {
    let config = resolve_sqlite_store_config(location)?;
    SqliteGateStore::new(config)
        .map_err(|err| CliError::new(format!("failed to open store: {err}")))
}

// ============================================================================
// SECTION: File Helpers
// ============================================================================

/// Errors returned by bounded file reads.
#[derive(Debug)]
enum ReadLimitError {
    /// File I/O failure.
    Io(std::io::Error),
    /// File size exceeds the configured limit.
    TooLarge {
        /// Actual size in bytes.
        size: u64,
        /// Allowed limit in bytes.
        limit: usize,
    },
}

/// Reads a file from disk while enforcing a hard size limit.
fn read_bytes_with_limit(path: &Path, max_bytes: usize) -> Result<Vec<u8>, ReadLimitError> {
    let file = File::open(path).map_err(ReadLimitError::Io)?;
    let size = file.metadata().map_err(ReadLimitError::Io)?.len();
    let limit = u64::try_from(max_bytes).map_err(|_| ReadLimitError::TooLarge {
        size,
        limit: max_bytes,
    })?;
    if size > limit {
        return Err(ReadLimitError::TooLarge {
            size,
            limit: max_bytes,
        });
    }
    let mut bytes = Vec::new();
    file.take(limit.saturating_add(1)).read_to_end(&mut bytes).map_err(ReadLimitError::Io)?;
    if bytes.len() > max_bytes {
        return Err(ReadLimitError::TooLarge {
            size: u64::try_from(bytes.len()).unwrap_or(u64::MAX),
            limit: max_bytes,
        });
    }
    Ok(bytes)
}

// ============================================================================
// SECTION: Output Helpers
// ============================================================================

/// Writes canonical JSON followed by a newline to stdout.
fn write_json<T: Serialize>(value: &T) -> CliResult<()> {
    let mut bytes = serde_jcs::to_vec(value)
        .map_err(|err| CliError::new(format!("failed to encode output: {err}")))?;
    bytes.push(b'\n');
    std::io::stdout().write_all(&bytes).map_err(|err| CliError::new(output_error("stdout", &err)))
}

/// Writes a single line to stdout.
fn write_stdout_line(message: &str) -> std::io::Result<()> {
    let mut stdout = std::io::stdout();
    writeln!(&mut stdout, "{message}")
}

/// Writes a single line to stderr.
fn write_stderr_line(message: &str) -> std::io::Result<()> {
    let mut stderr = std::io::stderr();
    writeln!(&mut stderr, "{message}")
}

/// Formats an output error message.
fn output_error(stream: &str, error: &std::io::Error) -> String {
    format!("failed to write {stream}: {error}")
}

/// Emits an error message to stderr and returns a failure exit code.
fn emit_error(message: &str) -> ExitCode {
    let _ = write_stderr_line(message);
    ExitCode::FAILURE
}
