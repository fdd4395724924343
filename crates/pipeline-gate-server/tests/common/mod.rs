//! Shared helpers for pipeline-gate-server HTTP tests.
// crates/pipeline-gate-server/tests/common/mod.rs
// =============================================================================
// Module: HTTP Test Harness
// Description: Ephemeral gate server, policy fixtures, and request helpers.
// =============================================================================

#![allow(dead_code, reason = "Shared test helpers may be unused in some cases.")]

use std::error::Error;
use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::SystemTime;
use std::time::UNIX_EPOCH;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as Base64;
use ed25519_dalek::Signer as _;
use ed25519_dalek::SigningKey;
use pipeline_gate_config::PipelineGateConfig;
use pipeline_gate_core::runtime::attestation::signature_message;
use pipeline_gate_server::EvidenceRequest;
use pipeline_gate_server::FileAuditSink;
use pipeline_gate_server::GateServer;
use pipeline_gate_server::ServerError;
use serde_json::Value;
use serde_json::json;
use tempfile::TempDir;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

/// Boxed test error.
pub type TestError = Box<dyn Error + Send + Sync>;

/// Producer token (sources `ci-runner`, `alice`, `bob`).
pub const PRODUCER_TOKEN: &str = "producer-token-000001";
/// Operator token holding every privilege.
pub const OPERATOR_TOKEN: &str = "operator-token-000001";
/// Operator token holding only the audit privilege.
pub const AUDITOR_TOKEN: &str = "auditor-token-0000001";
/// Registered signing key identifier for `ci-runner`.
pub const CI_KEY_ID: &str = "ci-key";

/// Shared rules.
pub const BASE_POLICY: &str = r#"
[[rules]]
rule_id = "secret-scan-clean"
stage = "build"
kind = "secret_scan"
"#;

/// Staging requires one approval before deploy.
pub const STAGING_POLICY: &str = r#"
environment = "staging"
stages = ["build", "deploy"]

[[rules]]
rule_id = "staging-approval"
stage = "deploy"
kind = "approval"
"#;

/// Production requires a verified signature before deploy.
pub const PRODUCTION_POLICY: &str = r#"
environment = "production"
stages = ["build", "deploy"]

[[rules]]
rule_id = "production-signature"
stage = "deploy"
kind = "signature"
min_trust = "verified"
"#;

/// Running gate server bound to an ephemeral loopback port.
pub struct GateHarness {
    /// Base URL (`http://127.0.0.1:<port>`).
    base_url: String,
    /// HTTP client.
    client: reqwest::Client,
    /// Temporary directory holding policy files and the request log.
    dir: TempDir,
    /// Producer signing key registered as `ci-key`.
    signing_key: SigningKey,
    /// Server task.
    join: JoinHandle<Result<(), ServerError>>,
}

impl Drop for GateHarness {
    fn drop(&mut self) {
        self.join.abort();
    }
}

/// Starts a gate server with the fixture policy and tokens.
pub async fn spawn_gate() -> Result<GateHarness, TestError> {
    let dir = tempfile::tempdir()?;
    let policy_dir = dir.path().join("policy");
    std::fs::create_dir_all(&policy_dir)?;
    std::fs::write(policy_dir.join("base.toml"), BASE_POLICY)?;
    std::fs::write(policy_dir.join("staging.toml"), STAGING_POLICY)?;
    std::fs::write(policy_dir.join("production.toml"), PRODUCTION_POLICY)?;

    let signing_key = SigningKey::from_bytes(&[7_u8; 32]);
    let public_key = Base64.encode(signing_key.verifying_key().as_bytes());
    let mut config = PipelineGateConfig::from_toml(&config_toml(&public_key))?;
    config.policy.dir = policy_dir;

    let sink = Arc::new(FileAuditSink::new(&dir.path().join("requests.jsonl"))?);
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    let server =
        tokio::task::spawn_blocking(move || GateServer::with_audit_sink(&config, sink)).await??;
    let join = tokio::spawn(server.serve_listener(listener));
    Ok(GateHarness {
        base_url: format!("http://{addr}"),
        client: reqwest::Client::new(),
        dir,
        signing_key,
        join,
    })
}

/// Renders the fixture service config.
fn config_toml(public_key: &str) -> String {
    format!(
        r#"
[server]
bind = "127.0.0.1:0"

[[server.producers]]
name = "ci"
token = "{PRODUCER_TOKEN}"
sources = ["ci-runner", "alice", "bob"]

[[server.operators]]
name = "release-manager"
token = "{OPERATOR_TOKEN}"
privileges = ["advance", "override", "cancel", "audit", "admin"]

[[server.operators]]
name = "auditor"
token = "{AUDITOR_TOKEN}"
privileges = ["audit"]

[[server.signing_keys]]
key_id = "{CI_KEY_ID}"
source = "ci-runner"
public_key = "{public_key}"

[store]
type = "memory"
"#
    )
}

/// Returns the current unix time in milliseconds.
pub fn now_ms() -> Result<u64, TestError> {
    let millis = SystemTime::now().duration_since(UNIX_EPOCH)?.as_millis();
    Ok(u64::try_from(millis)?)
}

/// Builds an unsigned evidence body timestamped one second ago.
pub fn evidence(run_id: &str, kind: &str, outcome: &str, source: &str) -> Result<Value, TestError> {
    Ok(json!({
        "runId": run_id,
        "kind": kind,
        "commitSha": "abc1234",
        "outcome": outcome,
        "payload": {},
        "sourceIdentity": source,
        "timestamp": now_ms()? - 1_000,
    }))
}

impl GateHarness {
    /// Returns the absolute URL for `path`.
    pub fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    /// Returns the policy directory.
    pub fn policy_dir(&self) -> PathBuf {
        self.dir.path().join("policy")
    }

    /// Returns the request audit log path.
    pub fn request_log(&self) -> PathBuf {
        self.dir.path().join("requests.jsonl")
    }

    /// Posts a JSON body and returns the status and parsed response.
    pub async fn post(
        &self,
        path: &str,
        token: Option<&str>,
        body: &Value,
    ) -> Result<(u16, Value), TestError> {
        let mut request = self.client.post(self.url(path)).json(body);
        if let Some(token) = token {
            request = request.bearer_auth(token);
        }
        let response = request.send().await?;
        let status = response.status().as_u16();
        Ok((status, response.json().await?))
    }

    /// Issues a GET and returns the status and raw body.
    pub async fn get_text(
        &self,
        path: &str,
        token: Option<&str>,
    ) -> Result<(u16, String), TestError> {
        let mut request = self.client.get(self.url(path));
        if let Some(token) = token {
            request = request.bearer_auth(token);
        }
        let response = request.send().await?;
        let status = response.status().as_u16();
        Ok((status, response.text().await?))
    }

    /// Issues a GET and returns the status and parsed JSON body.
    pub async fn get(&self, path: &str, token: Option<&str>) -> Result<(u16, Value), TestError> {
        let (status, text) = self.get_text(path, token).await?;
        Ok((status, serde_json::from_str(&text)?))
    }

    /// Creates a run as the operator.
    pub async fn create_run(&self, run_id: &str, environment: &str) -> Result<Value, TestError> {
        let body = json!({
            "runId": run_id,
            "environment": environment,
            "commitSha": "abc1234",
        });
        let (status, run) = self.post("/v1/runs", Some(OPERATOR_TOKEN), &body).await?;
        if status != 201 {
            return Err(format!("create run returned {status}: {run}").into());
        }
        Ok(run)
    }

    /// Submits evidence as the producer.
    pub async fn submit(&self, body: &Value) -> Result<(u16, Value), TestError> {
        self.post("/v1/evidence", Some(PRODUCER_TOKEN), body).await
    }

    /// Requests advancement of the current stage as the operator.
    pub async fn advance(&self, run_id: &str) -> Result<(u16, Value), TestError> {
        self.post(&format!("/v1/runs/{run_id}/advance"), Some(OPERATOR_TOKEN), &json!({})).await
    }

    /// Signs an evidence body with the registered `ci-runner` key.
    pub fn sign(&self, mut body: Value) -> Result<Value, TestError> {
        let request: EvidenceRequest = serde_json::from_value(body.clone())?;
        let digest = request.into_submission().content_digest()?;
        let message = signature_message(&digest)?;
        let signature = Base64.encode(self.signing_key.sign(&message).to_bytes());
        body["signature"] = json!({
            "keyId": CI_KEY_ID,
            "signature": signature,
        });
        Ok(body)
    }

    /// Reads every request audit event recorded so far.
    pub fn request_events(&self) -> Result<Vec<Value>, TestError> {
        read_events(&self.request_log())
    }
}

/// Parses a JSON-lines audit file.
fn read_events(path: &Path) -> Result<Vec<Value>, TestError> {
    let contents = std::fs::read_to_string(path)?;
    contents.lines().map(|line| serde_json::from_str(line).map_err(TestError::from)).collect()
}
