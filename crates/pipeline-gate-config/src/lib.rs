// crates/pipeline-gate-config/src/lib.rs
// ============================================================================
// Module: Pipeline Gate Config
// Description: Service configuration and policy file loading.
// Purpose: Provide validated inputs for the server and CLI.
// Dependencies: pipeline-gate-core, pipeline-gate-store-sqlite, serde, toml
// ============================================================================

//! ## Overview
//! Configuration is loaded once at startup and validated fail-closed. Policy
//! documents live in a separate directory so they can be reloaded without a
//! restart.

pub mod config;
pub mod policy_files;

pub use config::AuditConfig;
pub use config::AuditSinkKind;
pub use config::CONFIG_ENV_VAR;
pub use config::ConfigError;
pub use config::DEFAULT_CONFIG_NAME;
pub use config::GateConfig;
pub use config::MAX_CONFIG_FILE_SIZE;
pub use config::OperatorConfig;
pub use config::OperatorPrivilege;
pub use config::PipelineGateConfig;
pub use config::PolicyConfig;
pub use config::ProducerConfig;
pub use config::ServerConfig;
pub use config::SigningKeyConfig;
pub use config::StoreConfig;
pub use config::StoreType;
pub use policy_files::BASE_POLICY_FILE;
pub use policy_files::load_policy_dir;
