// crates/pipeline-gate-config/src/policy_files.rs
// ============================================================================
// Module: Policy Files
// Description: Loads layered policy documents from a directory of TOML files.
// Purpose: Build a validated `PolicyDocument` for publication or reload.
// Dependencies: pipeline-gate-core, serde, toml
// ============================================================================

//! ## Overview
//! A policy directory holds an optional `base.toml` with rules shared by every
//! environment, and one `<environment>.toml` per environment declaring its
//! ordered stages and environment-specific rules. Files are read in name
//! order so the resulting document (and its version hash) does not depend on
//! directory iteration order.

use std::path::Path;
use std::path::PathBuf;

use pipeline_gate_core::EnvironmentPolicy;
use pipeline_gate_core::PolicyDocument;
use pipeline_gate_core::PolicyRule;
use serde::Deserialize;

use crate::config::ConfigError;
use crate::config::read_with_limit;
use crate::config::validate_path;

// ============================================================================
// SECTION: Limits
// ============================================================================

/// Name of the shared base layer file.
pub const BASE_POLICY_FILE: &str = "base.toml";
/// Maximum number of policy files in a directory.
const MAX_POLICY_FILES: usize = 256;
/// Maximum size of a single policy file.
const MAX_POLICY_FILE_SIZE: usize = 1024 * 1024;

// ============================================================================
// SECTION: File Shapes
// ============================================================================

/// Contents of `base.toml`.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct BasePolicyFile {
    /// Shared rules.
    #[serde(default)]
    rules: Vec<PolicyRule>,
}

// ============================================================================
// SECTION: Loading
// ============================================================================

/// Loads and validates the policy document stored in `dir`.
///
/// # Errors
///
/// Returns [`ConfigError`] when the directory cannot be read, a file fails to
/// parse, an environment file is misnamed, or the assembled document is
/// invalid.
pub fn load_policy_dir(dir: &Path) -> Result<PolicyDocument, ConfigError> {
    validate_path(dir)?;
    let files = policy_files(dir)?;
    let mut document = PolicyDocument::default();
    for path in files {
        let bytes = read_with_limit(&path, MAX_POLICY_FILE_SIZE, "policy file")?;
        let text = String::from_utf8(bytes).map_err(|_| {
            ConfigError::Invalid(format!("policy file {} must be utf-8", path.display()))
        })?;
        let name = file_stem(&path)?;
        if path.file_name().is_some_and(|file| file == BASE_POLICY_FILE) {
            let base: BasePolicyFile = toml::from_str(&text)
                .map_err(|err| ConfigError::Parse(format!("{}: {err}", path.display())))?;
            document.base = base.rules;
            continue;
        }
        let environment: EnvironmentPolicy = toml::from_str(&text)
            .map_err(|err| ConfigError::Parse(format!("{}: {err}", path.display())))?;
        if environment.environment.as_str() != name {
            return Err(ConfigError::Invalid(format!(
                "policy file {} declares environment {}",
                path.display(),
                environment.environment
            )));
        }
        document.environments.push(environment);
    }
    document.validate().map_err(|err| ConfigError::Invalid(err.to_string()))?;
    Ok(document)
}

/// Lists `*.toml` files in `dir`, sorted by name.
fn policy_files(dir: &Path) -> Result<Vec<PathBuf>, ConfigError> {
    let entries = std::fs::read_dir(dir)
        .map_err(|err| ConfigError::Io(format!("{}: {err}", dir.display())))?;
    let mut files = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|err| ConfigError::Io(format!("{}: {err}", dir.display())))?;
        let path = entry.path();
        if !path.is_file() || path.extension().is_none_or(|ext| ext != "toml") {
            continue;
        }
        files.push(path);
        if files.len() > MAX_POLICY_FILES {
            return Err(ConfigError::Invalid(format!(
                "policy directory exceeds {MAX_POLICY_FILES} files"
            )));
        }
    }
    if files.is_empty() {
        return Err(ConfigError::Invalid(format!(
            "policy directory {} contains no policy files",
            dir.display()
        )));
    }
    files.sort();
    Ok(files)
}

/// Returns the UTF-8 file stem of `path`.
fn file_stem(path: &Path) -> Result<&str, ConfigError> {
    path.file_stem().and_then(|stem| stem.to_str()).ok_or_else(|| {
        ConfigError::Invalid(format!("policy file name must be utf-8: {}", path.display()))
    })
}
