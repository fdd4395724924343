// crates/pipeline-gate-server/src/auth/tests.rs
// ============================================================================
// Module: Request Authentication Tests
// Description: Token resolution, local-only mode, and privilege checks.
// ============================================================================

#![allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::use_debug,
    reason = "Test-only assertions."
)]

use axum::http::HeaderMap;
use axum::http::HeaderValue;
use axum::http::header::AUTHORIZATION;
use pipeline_gate_config::OperatorConfig;
use pipeline_gate_config::OperatorPrivilege;
use pipeline_gate_config::ProducerConfig;
use pipeline_gate_config::ServerConfig;
use pipeline_gate_core::SourceId;

use super::AuthError;
use super::Authenticator;
use super::Principal;

fn server_config() -> ServerConfig {
    ServerConfig {
        producers: vec![ProducerConfig {
            name: "ci".to_string(),
            token: "producer-token-000001".to_string(),
            sources: vec!["ci-runner".to_string()],
        }],
        operators: vec![OperatorConfig {
            name: "release-manager".to_string(),
            token: "operator-token-000001".to_string(),
            privileges: vec![OperatorPrivilege::Advance, OperatorPrivilege::Override],
        }],
        ..ServerConfig::default()
    }
}

fn bearer(token: &str) -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(AUTHORIZATION, HeaderValue::from_str(&format!("Bearer {token}")).unwrap());
    headers
}

#[test]
fn tokens_resolve_to_principals() {
    let auth = Authenticator::from_config(&server_config());
    assert!(!auth.is_local_only());
    let producer = auth.authenticate(&bearer("producer-token-000001")).unwrap();
    assert_eq!(producer.name(), "ci");
    producer.require_source(&SourceId::new("ci-runner")).unwrap();
    assert!(matches!(
        producer.require_source(&SourceId::new("someone-else")),
        Err(AuthError::Forbidden(_))
    ));
    assert!(producer.require_operator().is_err());

    let operator = auth.authenticate(&bearer("operator-token-000001")).unwrap();
    assert_eq!(operator.name(), "release-manager");
    operator.require(OperatorPrivilege::Override).unwrap();
    assert!(operator.require(OperatorPrivilege::Admin).is_err());
    assert!(operator.require_source(&SourceId::new("ci-runner")).is_err());
}

#[test]
fn missing_or_unknown_tokens_are_unauthenticated() {
    let auth = Authenticator::from_config(&server_config());
    assert_eq!(
        auth.authenticate(&HeaderMap::new()),
        Err(AuthError::Unauthenticated("missing authorization header"))
    );
    assert_eq!(
        auth.authenticate(&bearer("producer-token-000002")),
        Err(AuthError::Unauthenticated("unknown bearer token"))
    );
    let mut basic = HeaderMap::new();
    basic.insert(AUTHORIZATION, HeaderValue::from_static("Basic Y2k6Y2k="));
    assert_eq!(
        auth.authenticate(&basic),
        Err(AuthError::Unauthenticated("expected bearer token"))
    );
}

#[test]
fn local_only_mode_grants_every_privilege() {
    let auth = Authenticator::from_config(&ServerConfig::default());
    assert!(auth.is_local_only());
    assert_eq!(auth.mode_label(), "local_only");
    let principal = auth.authenticate(&HeaderMap::new()).unwrap();
    assert_eq!(principal, Principal::Local);
    principal.require(OperatorPrivilege::Admin).unwrap();
    principal.require_source(&SourceId::new("anything")).unwrap();
}
