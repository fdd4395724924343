// crates/pipeline-gate-server/src/auth.rs
// ============================================================================
// Module: Request Authentication
// Description: Bearer token authentication and privilege checks.
// Purpose: Map bearer tokens to producers and operators fail-closed.
// Dependencies: pipeline-gate-config, pipeline-gate-core, subtle
// ============================================================================

//! ## Overview
//! [`Authenticator`] resolves an `Authorization: Bearer <token>` header to a
//! [`Principal`]. Tokens are compared in constant time against every
//! configured token. When no tokens are configured the server runs in
//! local-only mode (loopback bind enforced by config validation) and every
//! request is treated as the local principal.

use std::collections::BTreeSet;

use axum::http::HeaderMap;
use axum::http::header::AUTHORIZATION;
use pipeline_gate_config::OperatorPrivilege;
use pipeline_gate_config::ServerConfig;
use pipeline_gate_core::SourceId;
use subtle::ConstantTimeEq;
use thiserror::Error;

/// Principal name used in local-only mode.
pub const LOCAL_PRINCIPAL: &str = "local";

/// Authentication and authorization failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    /// Missing or unknown credentials.
    #[error("unauthenticated: {0}")]
    Unauthenticated(&'static str),
    /// Authenticated principal lacks permission.
    #[error("forbidden: {0}")]
    Forbidden(String),
}

/// Authenticated caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Principal {
    /// Evidence producer limited to its source identities.
    Producer {
        /// Producer name.
        name: String,
        /// Source identities the producer may report as.
        sources: BTreeSet<SourceId>,
    },
    /// Operator holding explicit privileges.
    Operator {
        /// Operator name, recorded as the actor of privileged actions.
        name: String,
        /// Granted privileges.
        privileges: BTreeSet<OperatorPrivilege>,
    },
    /// Local-only mode caller holding every privilege.
    Local,
}

impl Principal {
    /// Returns the principal name.
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::Producer {
                name, ..
            }
            | Self::Operator {
                name, ..
            } => name,
            Self::Local => LOCAL_PRINCIPAL,
        }
    }

    /// Requires that the principal may submit evidence as `source`.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Forbidden`] otherwise.
    pub fn require_source(&self, source: &SourceId) -> Result<(), AuthError> {
        match self {
            Self::Local => Ok(()),
            Self::Producer {
                name,
                sources,
            } => {
                if sources.contains(source) {
                    Ok(())
                } else {
                    Err(AuthError::Forbidden(format!(
                        "producer {name} may not submit evidence as {source}"
                    )))
                }
            }
            Self::Operator {
                name, ..
            } => Err(AuthError::Forbidden(format!("operator {name} may not submit evidence"))),
        }
    }

    /// Requires an operator privilege.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Forbidden`] when the privilege is not held.
    pub fn require(&self, privilege: OperatorPrivilege) -> Result<(), AuthError> {
        match self {
            Self::Local => Ok(()),
            Self::Operator {
                privileges, ..
            } if privileges.contains(&privilege) => Ok(()),
            other => Err(AuthError::Forbidden(format!(
                "{} lacks the {} privilege",
                other.name(),
                privilege.as_str()
            ))),
        }
    }

    /// Requires any operator (read access to runs and decisions).
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Forbidden`] for producers.
    pub fn require_operator(&self) -> Result<(), AuthError> {
        match self {
            Self::Local
            | Self::Operator {
                ..
            } => Ok(()),
            Self::Producer {
                name, ..
            } => Err(AuthError::Forbidden(format!("producer {name} may not read run state"))),
        }
    }
}

/// Configured credential.
struct Credential {
    /// Token bytes.
    token: Vec<u8>,
    /// Principal the token maps to.
    principal: Principal,
}

/// Resolves bearer tokens to principals.
pub struct Authenticator {
    /// Configured credentials (empty in local-only mode).
    credentials: Vec<Credential>,
}

impl Authenticator {
    /// Builds an authenticator from the server config.
    #[must_use]
    pub fn from_config(config: &ServerConfig) -> Self {
        let producers = config.producers.iter().map(|producer| Credential {
            token: producer.token.as_bytes().to_vec(),
            principal: Principal::Producer {
                name: producer.name.clone(),
                sources: producer
                    .sources
                    .iter()
                    .map(|source| SourceId::new(source.as_str()))
                    .collect(),
            },
        });
        let operators = config.operators.iter().map(|operator| Credential {
            token: operator.token.as_bytes().to_vec(),
            principal: Principal::Operator {
                name: operator.name.clone(),
                privileges: operator.privileges.iter().copied().collect(),
            },
        });
        Self {
            credentials: producers.chain(operators).collect(),
        }
    }

    /// Returns true when no tokens are configured.
    #[must_use]
    pub const fn is_local_only(&self) -> bool {
        self.credentials.is_empty()
    }

    /// Returns the auth mode label.
    #[must_use]
    pub const fn mode_label(&self) -> &'static str {
        if self.is_local_only() { "local_only" } else { "bearer_token" }
    }

    /// Authenticates a request from its headers.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Unauthenticated`] when the header is missing,
    /// malformed, or carries an unknown token.
    pub fn authenticate(&self, headers: &HeaderMap) -> Result<Principal, AuthError> {
        if self.is_local_only() {
            return Ok(Principal::Local);
        }
        let header = headers
            .get(AUTHORIZATION)
            .ok_or(AuthError::Unauthenticated("missing authorization header"))?;
        let value =
            header.to_str().map_err(|_| AuthError::Unauthenticated("malformed authorization"))?;
        let token = value
            .strip_prefix("Bearer ")
            .map(str::trim)
            .filter(|token| !token.is_empty())
            .ok_or(AuthError::Unauthenticated("expected bearer token"))?;
        let mut matched = None;
        for credential in &self.credentials {
            if bool::from(credential.token.as_slice().ct_eq(token.as_bytes())) {
                matched = Some(&credential.principal);
            }
        }
        matched.cloned().ok_or(AuthError::Unauthenticated("unknown bearer token"))
    }
}

#[cfg(test)]
mod tests;
