//! Shared helpers for pipeline-gate-config tests.
// crates/pipeline-gate-config/tests/common/mod.rs
// =============================================================================
// Module: Config Test Fixtures
// Description: Minimal valid configs, tokens, and signing keys.
// =============================================================================

#![allow(dead_code, reason = "Shared test helpers may be unused in some cases.")]

use std::path::Path;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as Base64;
use ed25519_dalek::SigningKey;
use pipeline_gate_config::OperatorConfig;
use pipeline_gate_config::OperatorPrivilege;
use pipeline_gate_config::PipelineGateConfig;
use pipeline_gate_config::ProducerConfig;
use pipeline_gate_config::SigningKeyConfig;

/// Minimal config text: one producer, one operator, loopback bind.
pub const MINIMAL_TOML: &str = r#"
[server]
bind = "127.0.0.1:8480"

[[server.producers]]
name = "ci"
token = "producer-token-000001"
sources = ["ci-runner"]

[[server.operators]]
name = "release-manager"
token = "operator-token-000001"
privileges = ["advance", "override", "cancel"]
"#;

/// Returns the minimal valid config.
pub fn minimal_config() -> Result<PipelineGateConfig, String> {
    PipelineGateConfig::from_toml(MINIMAL_TOML).map_err(|err| err.to_string())
}

/// Builds a producer entry.
pub fn producer(name: &str, token: &str, sources: &[&str]) -> ProducerConfig {
    ProducerConfig {
        name: name.to_string(),
        token: token.to_string(),
        sources: sources.iter().map(ToString::to_string).collect(),
    }
}

/// Builds an operator entry.
pub fn operator(name: &str, token: &str, privileges: &[OperatorPrivilege]) -> OperatorConfig {
    OperatorConfig {
        name: name.to_string(),
        token: token.to_string(),
        privileges: privileges.to_vec(),
    }
}

/// Returns a base64 Ed25519 public key derived from `seed`.
pub fn public_key(seed: u8) -> String {
    Base64.encode(SigningKey::from_bytes(&[seed; 32]).verifying_key().to_bytes())
}

/// Builds a signing key entry.
pub fn signing_key(key_id: &str, source: &str, seed: u8) -> SigningKeyConfig {
    SigningKeyConfig {
        key_id: key_id.to_string(),
        source: source.to_string(),
        public_key: public_key(seed),
    }
}

/// Writes `contents` to `dir/name`.
pub fn write_file(dir: &Path, name: &str, contents: &str) -> Result<(), String> {
    std::fs::write(dir.join(name), contents).map_err(|err| err.to_string())
}
