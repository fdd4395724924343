// crates/pipeline-gate-config/src/config.rs
// ============================================================================
// Module: Pipeline Gate Configuration
// Description: Service configuration model, loading, and validation.
// Purpose: Turn `pipeline-gate.toml` into a validated, fail-closed config.
// Dependencies: pipeline-gate-core, pipeline-gate-store-sqlite, serde, toml
// ============================================================================

//! ## Overview
//! [`PipelineGateConfig`] is loaded from the path given on the command line,
//! then the `PIPELINE_GATE_CONFIG` environment variable, then
//! `pipeline-gate.toml` in the working directory. Loading enforces path and
//! size limits, requires UTF-8, rejects unknown keys, and validates every
//! section before the config is returned.
//!
//! Security posture: config files carry bearer tokens and producer keys;
//! error messages never echo token values.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeSet;
use std::net::SocketAddr;
use std::path::Path;
use std::path::PathBuf;
use std::time::Duration;

use pipeline_gate_core::GateControllerConfig;
use pipeline_gate_core::KeyId;
use pipeline_gate_core::ProducerKeyring;
use pipeline_gate_core::SourceId;
use pipeline_gate_core::runtime::attestation::parse_public_key;
use pipeline_gate_store_sqlite::SqliteStoreConfig;
use pipeline_gate_store_sqlite::SqliteStoreMode;
use pipeline_gate_store_sqlite::SqliteSyncMode;
use serde::Deserialize;
use thiserror::Error;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Default config file name.
pub const DEFAULT_CONFIG_NAME: &str = "pipeline-gate.toml";
/// Environment variable overriding the config path.
pub const CONFIG_ENV_VAR: &str = "PIPELINE_GATE_CONFIG";
/// Maximum config file size in bytes.
pub const MAX_CONFIG_FILE_SIZE: usize = 1024 * 1024;
/// Maximum total path length.
const MAX_TOTAL_PATH_LENGTH: usize = 4096;
/// Maximum length of a single path component.
const MAX_PATH_COMPONENT_LENGTH: usize = 255;
/// Default bind address.
const DEFAULT_BIND: &str = "127.0.0.1:8480";
/// Default request body limit.
const DEFAULT_MAX_BODY_BYTES: usize = 1024 * 1024;
/// Hard upper bound for `max_body_bytes`.
const MAX_BODY_BYTES_LIMIT: usize = 16 * 1024 * 1024;
/// Maximum number of configured bearer tokens.
const MAX_AUTH_TOKENS: usize = 64;
/// Maximum bearer token length.
const MAX_AUTH_TOKEN_LENGTH: usize = 256;
/// Minimum bearer token length.
const MIN_AUTH_TOKEN_LENGTH: usize = 16;
/// Maximum number of registered producer keys.
const MAX_SIGNING_KEYS: usize = 256;
/// Maximum length of names and source identities.
const MAX_NAME_LENGTH: usize = 256;
/// Default evaluation timeout in milliseconds.
const DEFAULT_EVALUATION_TIMEOUT_MS: u64 = 5_000;
/// Upper bound for the evaluation timeout in milliseconds.
const MAX_EVALUATION_TIMEOUT_MS: u64 = 60_000;
/// Default `SQLite` busy timeout in milliseconds.
const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;
/// Default policy directory.
const DEFAULT_POLICY_DIR: &str = "policy";

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Configuration errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// Config file could not be read.
    #[error("config io error: {0}")]
    Io(String),
    /// Config file could not be parsed.
    #[error("config parse error: {0}")]
    Parse(String),
    /// Config values failed validation.
    #[error("invalid config: {0}")]
    Invalid(String),
}

// ============================================================================
// SECTION: Config Model
// ============================================================================

/// Top-level service configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PipelineGateConfig {
    /// HTTP server and authentication settings.
    pub server: ServerConfig,
    /// Persistence backend.
    pub store: StoreConfig,
    /// Gate controller settings.
    pub gate: GateConfig,
    /// Request audit sink.
    pub audit: AuditConfig,
    /// Policy file location.
    pub policy: PolicyConfig,
}

/// HTTP server configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServerConfig {
    /// Socket address to bind.
    pub bind: String,
    /// Maximum request body size in bytes.
    pub max_body_bytes: usize,
    /// Evidence producers and the sources each may report as.
    pub producers: Vec<ProducerConfig>,
    /// Operators and their privileges.
    pub operators: Vec<OperatorConfig>,
    /// Producer signing keys.
    pub signing_keys: Vec<SigningKeyConfig>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: DEFAULT_BIND.to_string(),
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
            producers: Vec::new(),
            operators: Vec::new(),
            signing_keys: Vec::new(),
        }
    }
}

/// Bearer-authenticated evidence producer.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProducerConfig {
    /// Producer name used in request audit events.
    pub name: String,
    /// Bearer token.
    pub token: String,
    /// Source identities the producer may submit evidence as.
    pub sources: Vec<String>,
}

/// Privilege granted to an operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperatorPrivilege {
    /// Create runs and request stage advances.
    Advance,
    /// Issue human overrides.
    Override,
    /// Cancel runs.
    Cancel,
    /// Read the audit export feed.
    Audit,
    /// Reload policy.
    Admin,
}

impl OperatorPrivilege {
    /// Returns the stable label for the privilege.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Advance => "advance",
            Self::Override => "override",
            Self::Cancel => "cancel",
            Self::Audit => "audit",
            Self::Admin => "admin",
        }
    }
}

/// Bearer-authenticated operator.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OperatorConfig {
    /// Operator identity recorded as the actor of overrides and cancels.
    pub name: String,
    /// Bearer token.
    pub token: String,
    /// Granted privileges.
    pub privileges: Vec<OperatorPrivilege>,
}

impl OperatorConfig {
    /// Returns true when the operator holds `privilege`.
    #[must_use]
    pub fn has(&self, privilege: OperatorPrivilege) -> bool {
        self.privileges.contains(&privilege)
    }
}

/// Registered producer signing key.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SigningKeyConfig {
    /// Key identifier referenced by evidence signatures.
    pub key_id: String,
    /// Source identity the key signs for.
    pub source: String,
    /// Base64-encoded Ed25519 public key.
    pub public_key: String,
}

/// Persistence backend selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreType {
    /// In-memory stores (lost on restart).
    #[default]
    Memory,
    /// `SQLite` database.
    Sqlite,
}

/// Store configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StoreConfig {
    /// Backend type.
    #[serde(rename = "type")]
    pub store_type: StoreType,
    /// Database path (sqlite only).
    pub path: Option<PathBuf>,
    /// Busy timeout in milliseconds (sqlite only).
    pub busy_timeout_ms: u64,
    /// Journal mode (sqlite only).
    pub journal_mode: SqliteStoreMode,
    /// Sync mode (sqlite only).
    pub sync_mode: SqliteSyncMode,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            store_type: StoreType::Memory,
            path: None,
            busy_timeout_ms: DEFAULT_BUSY_TIMEOUT_MS,
            journal_mode: SqliteStoreMode::default(),
            sync_mode: SqliteSyncMode::default(),
        }
    }
}

impl StoreConfig {
    /// Returns the `SQLite` store config when the backend is sqlite.
    #[must_use]
    pub fn sqlite_config(&self) -> Option<SqliteStoreConfig> {
        match (self.store_type, &self.path) {
            (StoreType::Sqlite, Some(path)) => Some(SqliteStoreConfig {
                path: path.clone(),
                busy_timeout_ms: self.busy_timeout_ms,
                journal_mode: self.journal_mode,
                sync_mode: self.sync_mode,
            }),
            _ => None,
        }
    }
}

/// Gate controller configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GateConfig {
    /// Evaluation time budget in milliseconds.
    pub evaluation_timeout_ms: u64,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            evaluation_timeout_ms: DEFAULT_EVALUATION_TIMEOUT_MS,
        }
    }
}

/// Request audit sink selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditSinkKind {
    /// JSON lines on stderr.
    #[default]
    Stderr,
    /// JSON lines appended to a file.
    File,
    /// Events discarded.
    None,
}

/// Request audit configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AuditConfig {
    /// Sink kind.
    pub sink: AuditSinkKind,
    /// File path for the `file` sink.
    pub path: Option<PathBuf>,
}

/// Policy file configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PolicyConfig {
    /// Directory holding `base.toml` and per-environment policy files.
    pub dir: PathBuf,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from(DEFAULT_POLICY_DIR),
        }
    }
}

// ============================================================================
// SECTION: Loading
// ============================================================================

impl PipelineGateConfig {
    /// Loads and validates config from `path`, the env override, or the
    /// default file name.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when the file cannot be read, parsed, or
    /// validated.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let resolved = resolve_path(path);
        validate_path(&resolved)?;
        let bytes = read_with_limit(&resolved, MAX_CONFIG_FILE_SIZE, "config file")?;
        let text = String::from_utf8(bytes)
            .map_err(|_| ConfigError::Invalid("config file must be utf-8".to_string()))?;
        Self::from_toml(&text)
    }

    /// Parses and validates config from TOML text.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when parsing or validation fails.
    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text).map_err(|err| ConfigError::Parse(err.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validates every section.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] describing the first violation.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.validate_server()?;
        self.validate_store()?;
        if self.gate.evaluation_timeout_ms == 0
            || self.gate.evaluation_timeout_ms > MAX_EVALUATION_TIMEOUT_MS
        {
            return Err(ConfigError::Invalid(format!(
                "gate.evaluation_timeout_ms must be between 1 and {MAX_EVALUATION_TIMEOUT_MS}"
            )));
        }
        if self.audit.sink == AuditSinkKind::File
            && self.audit.path.as_ref().is_none_or(|path| path.as_os_str().is_empty())
        {
            return Err(ConfigError::Invalid(
                "audit.path is required for the file sink".to_string(),
            ));
        }
        if self.policy.dir.as_os_str().is_empty() {
            return Err(ConfigError::Invalid("policy.dir must be non-empty".to_string()));
        }
        Ok(())
    }

    /// Returns the parsed bind address.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] when the address is malformed.
    pub fn bind_addr(&self) -> Result<SocketAddr, ConfigError> {
        self.server
            .bind
            .parse()
            .map_err(|_| ConfigError::Invalid(format!("invalid bind address {}", self.server.bind)))
    }

    /// Builds the producer keyring from configured signing keys.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] when a key cannot be decoded.
    pub fn keyring(&self) -> Result<ProducerKeyring, ConfigError> {
        let mut keyring = ProducerKeyring::new();
        for key in &self.server.signing_keys {
            keyring
                .register_base64(
                    KeyId::new(key.key_id.as_str()),
                    SourceId::new(key.source.as_str()),
                    &key.public_key,
                )
                .map_err(|err| ConfigError::Invalid(format!("signing key {}: {err}", key.key_id)))?;
        }
        Ok(keyring)
    }

    /// Returns the controller configuration derived from this config.
    #[must_use]
    pub fn controller_config(&self) -> GateControllerConfig {
        GateControllerConfig {
            evaluation_timeout: Some(Duration::from_millis(self.gate.evaluation_timeout_ms)),
            override_actors: self.override_actors(),
        }
    }

    /// Returns the operators allowed to issue overrides.
    #[must_use]
    pub fn override_actors(&self) -> BTreeSet<SourceId> {
        self.server
            .operators
            .iter()
            .filter(|operator| operator.has(OperatorPrivilege::Override))
            .map(|operator| SourceId::new(operator.name.as_str()))
            .collect()
    }

    /// Validates the server section.
    fn validate_server(&self) -> Result<(), ConfigError> {
        let bind = self.bind_addr()?;
        if self.server.max_body_bytes == 0 || self.server.max_body_bytes > MAX_BODY_BYTES_LIMIT {
            return Err(ConfigError::Invalid(format!(
                "server.max_body_bytes must be between 1 and {MAX_BODY_BYTES_LIMIT}"
            )));
        }
        let server = &self.server;
        let token_count = server.producers.len() + server.operators.len();
        if token_count > MAX_AUTH_TOKENS {
            return Err(ConfigError::Invalid(format!(
                "too many auth tokens: {token_count} (max {MAX_AUTH_TOKENS})"
            )));
        }
        if !bind.ip().is_loopback() && token_count == 0 {
            return Err(ConfigError::Invalid(
                "non-loopback bind disallowed without configured tokens".to_string(),
            ));
        }
        let mut tokens = BTreeSet::new();
        let mut names = BTreeSet::new();
        for producer in &server.producers {
            validate_name("producer name", &producer.name)?;
            validate_token(&producer.token)?;
            if !tokens.insert(producer.token.as_str()) {
                return Err(ConfigError::Invalid("auth tokens must be unique".to_string()));
            }
            if !names.insert(producer.name.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "principal {} declared more than once",
                    producer.name
                )));
            }
            if producer.sources.is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "producer {} must declare at least one source",
                    producer.name
                )));
            }
            for source in &producer.sources {
                validate_name("producer source", source)?;
            }
        }
        for operator in &server.operators {
            validate_name("operator name", &operator.name)?;
            validate_token(&operator.token)?;
            if !tokens.insert(operator.token.as_str()) {
                return Err(ConfigError::Invalid("auth tokens must be unique".to_string()));
            }
            if !names.insert(operator.name.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "principal {} declared more than once",
                    operator.name
                )));
            }
            if operator.privileges.is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "operator {} must hold at least one privilege",
                    operator.name
                )));
            }
        }
        self.validate_signing_keys()
    }

    /// Validates producer signing keys.
    fn validate_signing_keys(&self) -> Result<(), ConfigError> {
        let keys = &self.server.signing_keys;
        if keys.len() > MAX_SIGNING_KEYS {
            return Err(ConfigError::Invalid(format!(
                "too many signing keys: {} (max {MAX_SIGNING_KEYS})",
                keys.len()
            )));
        }
        let mut ids = BTreeSet::new();
        for key in keys {
            validate_name("signing key id", &key.key_id)?;
            validate_name("signing key source", &key.source)?;
            if !ids.insert(key.key_id.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "signing key {} declared more than once",
                    key.key_id
                )));
            }
            parse_public_key(&key.public_key)
                .map_err(|err| ConfigError::Invalid(format!("signing key {}: {err}", key.key_id)))?;
        }
        Ok(())
    }

    /// Validates the store section.
    fn validate_store(&self) -> Result<(), ConfigError> {
        match self.store.store_type {
            StoreType::Memory => {
                if self.store.path.is_some() {
                    return Err(ConfigError::Invalid(
                        "store.path is only valid for the sqlite store".to_string(),
                    ));
                }
            }
            StoreType::Sqlite => {
                let Some(path) = &self.store.path else {
                    return Err(ConfigError::Invalid(
                        "store.path is required for the sqlite store".to_string(),
                    ));
                };
                validate_path(path)?;
                if self.store.busy_timeout_ms == 0 {
                    return Err(ConfigError::Invalid(
                        "store.busy_timeout_ms must be greater than zero".to_string(),
                    ));
                }
            }
        }
        Ok(())
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Resolves the config path from the argument, env override, or default.
fn resolve_path(path: Option<&Path>) -> PathBuf {
    if let Some(path) = path {
        return path.to_path_buf();
    }
    std::env::var_os(CONFIG_ENV_VAR)
        .filter(|value| !value.is_empty())
        .map_or_else(|| PathBuf::from(DEFAULT_CONFIG_NAME), PathBuf::from)
}

/// Validates path length limits.
pub(crate) fn validate_path(path: &Path) -> Result<(), ConfigError> {
    if path.as_os_str().is_empty() {
        return Err(ConfigError::Invalid("config path must be non-empty".to_string()));
    }
    if path.as_os_str().len() > MAX_TOTAL_PATH_LENGTH {
        return Err(ConfigError::Invalid("config path exceeds max length".to_string()));
    }
    if path.components().any(|component| component.as_os_str().len() > MAX_PATH_COMPONENT_LENGTH)
    {
        return Err(ConfigError::Invalid("config path component too long".to_string()));
    }
    Ok(())
}

/// Reads a file, failing when it exceeds `max_bytes`.
pub(crate) fn read_with_limit(
    path: &Path,
    max_bytes: usize,
    label: &str,
) -> Result<Vec<u8>, ConfigError> {
    let metadata = std::fs::metadata(path)
        .map_err(|err| ConfigError::Io(format!("{}: {err}", path.display())))?;
    let limit = u64::try_from(max_bytes).unwrap_or(u64::MAX);
    if metadata.len() > limit {
        return Err(ConfigError::Invalid(format!("{label} exceeds size limit")));
    }
    let bytes =
        std::fs::read(path).map_err(|err| ConfigError::Io(format!("{}: {err}", path.display())))?;
    if bytes.len() > max_bytes {
        return Err(ConfigError::Invalid(format!("{label} exceeds size limit")));
    }
    Ok(bytes)
}

/// Validates a bounded, non-empty name without control characters.
fn validate_name(field: &str, value: &str) -> Result<(), ConfigError> {
    if value.trim().is_empty() {
        return Err(ConfigError::Invalid(format!("{field} must be non-empty")));
    }
    if value.len() > MAX_NAME_LENGTH {
        return Err(ConfigError::Invalid(format!("{field} too long")));
    }
    if value.chars().any(char::is_control) {
        return Err(ConfigError::Invalid(format!("{field} contains control characters")));
    }
    Ok(())
}

/// Validates bearer token shape.
fn validate_token(token: &str) -> Result<(), ConfigError> {
    if token.trim().is_empty() {
        return Err(ConfigError::Invalid("auth token must be non-empty".to_string()));
    }
    if token.chars().any(char::is_whitespace) {
        return Err(ConfigError::Invalid("auth token must not contain whitespace".to_string()));
    }
    if token.len() < MIN_AUTH_TOKEN_LENGTH {
        return Err(ConfigError::Invalid(format!(
            "auth token too short (min {MIN_AUTH_TOKEN_LENGTH} bytes)"
        )));
    }
    if token.len() > MAX_AUTH_TOKEN_LENGTH {
        return Err(ConfigError::Invalid(format!(
            "auth token too long (max {MAX_AUTH_TOKEN_LENGTH} bytes)"
        )));
    }
    Ok(())
}
