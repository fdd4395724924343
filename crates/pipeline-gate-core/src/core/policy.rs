// crates/pipeline-gate-core/src/core/policy.rs
// ============================================================================
// Module: Pipeline Gate Policy Model
// Description: Declarative rules, environment layers, and immutable snapshots.
// Purpose: Resolve the effective rule set for an environment and stage.
// Dependencies: crate::core::{evidence, hashing, identifiers}, serde, thiserror
// ============================================================================

//! ## Overview
//! A policy document is a base layer of rules that apply to every environment
//! plus one override layer per environment. Each environment declares its
//! ordered stage list; rules target a single stage. The effective rule set for
//! (environment, stage) is the base rules for that stage with any override
//! rule of the same evidence kind replacing the base rule, followed by the
//! remaining override rules.
//!
//! Documents are validated and hashed once into a [`PolicySnapshot`]. Snapshots
//! are immutable and versioned; see `runtime::policy_registry` for
//! publication.
//!
//! Security posture: resolution fails closed. An unknown environment, a stage
//! outside the environment's stage list, or an empty effective rule set all
//! yield [`PolicyError::NoPolicyDefined`].

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeSet;

use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

use crate::core::evidence::EvidenceKind;
use crate::core::evidence::EvidenceOutcome;
use crate::core::evidence::TrustLane;
use crate::core::hashing::DEFAULT_HASH_ALGORITHM;
use crate::core::hashing::HashDigest;
use crate::core::hashing::hash_canonical_json;
use crate::core::identifiers::EnvironmentId;
use crate::core::identifiers::PolicyVersion;
use crate::core::identifiers::RuleId;
use crate::core::identifiers::SourceId;
use crate::core::identifiers::StageId;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Policy resolution and validation errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PolicyError {
    /// No effective rules exist for the environment and stage.
    #[error("no policy defined for environment {environment}{}", stage_suffix(.stage.as_ref()))]
    NoPolicyDefined {
        /// Requested environment.
        environment: EnvironmentId,
        /// Requested stage, when one was resolved.
        stage: Option<StageId>,
    },
    /// Policy document failed validation.
    #[error("invalid policy: {0}")]
    Invalid(String),
    /// Policy document could not be hashed.
    #[error("policy hashing failed: {0}")]
    Hash(String),
}

/// Formats the optional stage suffix for [`PolicyError::NoPolicyDefined`].
fn stage_suffix(stage: Option<&StageId>) -> String {
    stage.map_or_else(String::new, |stage| format!(" stage {stage}"))
}

// ============================================================================
// SECTION: Predicates
// ============================================================================

/// Predicate applied to a selected evidence record.
///
/// # Invariants
/// - Metric bounds are inclusive and compared as exact integers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EvidencePredicate {
    /// Outcome must equal the expected value.
    OutcomeIs {
        /// Expected outcome.
        outcome: EvidenceOutcome,
    },
    /// Metric must be at most `max`.
    MetricAtMost {
        /// Metric name.
        metric: String,
        /// Inclusive upper bound.
        max: i64,
    },
    /// Metric must be at least `min`.
    MetricAtLeast {
        /// Metric name.
        metric: String,
        /// Inclusive lower bound.
        min: i64,
    },
}

/// Returns the predicates applied when a rule omits them.
fn default_predicates() -> Vec<EvidencePredicate> {
    vec![EvidencePredicate::OutcomeIs {
        outcome: EvidenceOutcome::Pass,
    }]
}

/// Evidence selection strategy for a rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Aggregation {
    /// Only the most recent qualifying record counts.
    #[default]
    Latest,
    /// The last `count` qualifying records must all pass.
    AllOfLast {
        /// Number of records required.
        count: u32,
    },
}

// ============================================================================
// SECTION: Rules
// ============================================================================

/// Declarative evidence requirement for a stage.
///
/// # Invariants
/// - `predicates` is non-empty after validation.
/// - `aggregation` other than [`Aggregation::Latest`] and
///   `min_distinct_sources` are mutually exclusive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyRule {
    /// Rule identifier, unique across the document.
    pub rule_id: RuleId,
    /// Stage this rule gates.
    pub stage: StageId,
    /// Required evidence kind.
    pub kind: EvidenceKind,
    /// Predicates applied to selected evidence.
    #[serde(default = "default_predicates")]
    pub predicates: Vec<EvidencePredicate>,
    /// Evidence selection strategy.
    #[serde(default)]
    pub aggregation: Aggregation,
    /// Minimum number of distinct sources that must each pass.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_distinct_sources: Option<u32>,
    /// Evidence older than this many ticks before `as_of` is treated as absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub freshness_window: Option<u64>,
    /// Accepted producer identities (empty accepts any).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub trusted_sources: Vec<SourceId>,
    /// Minimum trust lane required for evidence to count.
    #[serde(default)]
    pub min_trust: TrustLane,
}

impl PolicyRule {
    /// Creates a rule requiring a passing record of `kind` for `stage`.
    #[must_use]
    pub fn requires_pass(
        rule_id: impl Into<RuleId>,
        stage: impl Into<StageId>,
        kind: EvidenceKind,
    ) -> Self {
        Self {
            rule_id: rule_id.into(),
            stage: stage.into(),
            kind,
            predicates: default_predicates(),
            aggregation: Aggregation::Latest,
            min_distinct_sources: None,
            freshness_window: None,
            trusted_sources: Vec::new(),
            min_trust: TrustLane::Asserted,
        }
    }

    /// Returns true when `source` is accepted by this rule.
    #[must_use]
    pub fn trusts(&self, source: &SourceId) -> bool {
        self.trusted_sources.is_empty() || self.trusted_sources.contains(source)
    }

    /// Validates rule-local constraints.
    fn validate(&self) -> Result<(), PolicyError> {
        if self.rule_id.as_str().is_empty() {
            return Err(PolicyError::Invalid("rule_id must be non-empty".to_string()));
        }
        if self.predicates.is_empty() {
            return Err(PolicyError::Invalid(format!(
                "rule {} must declare at least one predicate",
                self.rule_id
            )));
        }
        for predicate in &self.predicates {
            match predicate {
                EvidencePredicate::MetricAtMost {
                    metric, ..
                }
                | EvidencePredicate::MetricAtLeast {
                    metric, ..
                } if metric.is_empty() => {
                    return Err(PolicyError::Invalid(format!(
                        "rule {} has a metric predicate without a metric name",
                        self.rule_id
                    )));
                }
                _ => {}
            }
        }
        if let Aggregation::AllOfLast {
            count,
        } = self.aggregation
        {
            if count == 0 {
                return Err(PolicyError::Invalid(format!(
                    "rule {} aggregation count must be greater than zero",
                    self.rule_id
                )));
            }
            if self.min_distinct_sources.is_some() {
                return Err(PolicyError::Invalid(format!(
                    "rule {} cannot combine all_of_last with min_distinct_sources",
                    self.rule_id
                )));
            }
        }
        if self.min_distinct_sources == Some(0) {
            return Err(PolicyError::Invalid(format!(
                "rule {} min_distinct_sources must be greater than zero",
                self.rule_id
            )));
        }
        Ok(())
    }
}

// ============================================================================
// SECTION: Documents
// ============================================================================

/// Environment override layer with its ordered stage list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvironmentPolicy {
    /// Environment identifier.
    pub environment: EnvironmentId,
    /// Ordered stages a run passes through.
    pub stages: Vec<StageId>,
    /// Environment-specific rules.
    #[serde(default)]
    pub rules: Vec<PolicyRule>,
}

/// Full declarative policy: base layer plus environment layers.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyDocument {
    /// Rules applied to every environment declaring the rule's stage.
    #[serde(default)]
    pub base: Vec<PolicyRule>,
    /// Per-environment layers.
    #[serde(default)]
    pub environments: Vec<EnvironmentPolicy>,
}

impl PolicyDocument {
    /// Validates structural constraints.
    ///
    /// # Errors
    ///
    /// Returns [`PolicyError::Invalid`] describing the first violation.
    pub fn validate(&self) -> Result<(), PolicyError> {
        let mut rule_ids = BTreeSet::new();
        let mut environments = BTreeSet::new();
        let mut declared_stages = BTreeSet::new();

        for env in &self.environments {
            if env.environment.as_str().is_empty() {
                return Err(PolicyError::Invalid("environment name must be non-empty".to_string()));
            }
            if !environments.insert(&env.environment) {
                return Err(PolicyError::Invalid(format!(
                    "environment {} declared more than once",
                    env.environment
                )));
            }
            if env.stages.is_empty() {
                return Err(PolicyError::Invalid(format!(
                    "environment {} must declare at least one stage",
                    env.environment
                )));
            }
            let mut stages = BTreeSet::new();
            for stage in &env.stages {
                if stage.as_str().is_empty() {
                    return Err(PolicyError::Invalid(format!(
                        "environment {} has an empty stage name",
                        env.environment
                    )));
                }
                if !stages.insert(stage) {
                    return Err(PolicyError::Invalid(format!(
                        "environment {} lists stage {} more than once",
                        env.environment, stage
                    )));
                }
                declared_stages.insert(stage);
            }
            validate_layer(&env.rules, &mut rule_ids)?;
            if let Some(rule) = env.rules.iter().find(|rule| !stages.contains(&rule.stage)) {
                return Err(PolicyError::Invalid(format!(
                    "rule {} targets stage {} not declared by environment {}",
                    rule.rule_id, rule.stage, env.environment
                )));
            }
        }

        validate_layer(&self.base, &mut rule_ids)?;
        if let Some(rule) = self.base.iter().find(|rule| !declared_stages.contains(&rule.stage)) {
            return Err(PolicyError::Invalid(format!(
                "base rule {} targets stage {} not declared by any environment",
                rule.rule_id, rule.stage
            )));
        }
        Ok(())
    }
}

/// Validates one rule layer and records its rule identifiers.
fn validate_layer<'a>(
    rules: &'a [PolicyRule],
    rule_ids: &mut BTreeSet<&'a RuleId>,
) -> Result<(), PolicyError> {
    let mut slots = BTreeSet::new();
    for rule in rules {
        rule.validate()?;
        if !rule_ids.insert(&rule.rule_id) {
            return Err(PolicyError::Invalid(format!("duplicate rule id {}", rule.rule_id)));
        }
        if !slots.insert((&rule.stage, rule.kind)) {
            return Err(PolicyError::Invalid(format!(
                "rule {} duplicates evidence kind {} for stage {} within one layer",
                rule.rule_id, rule.kind, rule.stage
            )));
        }
    }
    Ok(())
}

// ============================================================================
// SECTION: Snapshots
// ============================================================================

/// Immutable, versioned, validated policy.
///
/// # Invariants
/// - `document` passed [`PolicyDocument::validate`].
/// - `document_hash` is the canonical JSON hash of `document`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicySnapshot {
    /// Snapshot version assigned at publication.
    pub version: PolicyVersion,
    /// Canonical hash of the policy document.
    pub document_hash: HashDigest,
    /// Validated policy document.
    pub document: PolicyDocument,
}

impl PolicySnapshot {
    /// Validates and hashes a document into a snapshot.
    ///
    /// # Errors
    ///
    /// Returns [`PolicyError`] when validation or hashing fails.
    pub fn new(version: PolicyVersion, document: PolicyDocument) -> Result<Self, PolicyError> {
        document.validate()?;
        let document_hash = hash_canonical_json(DEFAULT_HASH_ALGORITHM, &document)
            .map_err(|err| PolicyError::Hash(err.to_string()))?;
        Ok(Self {
            version,
            document_hash,
            document,
        })
    }

    /// Returns the environment layer, if declared.
    #[must_use]
    pub fn environment(&self, environment: &EnvironmentId) -> Option<&EnvironmentPolicy> {
        self.document.environments.iter().find(|env| &env.environment == environment)
    }

    /// Resolves the effective rules for an environment and stage.
    ///
    /// # Errors
    ///
    /// Returns [`PolicyError::NoPolicyDefined`] when the environment is not
    /// declared, the stage is not one of its stages, or no rules apply.
    pub fn resolve(
        &self,
        environment: &EnvironmentId,
        stage: &StageId,
    ) -> Result<Vec<PolicyRule>, PolicyError> {
        let no_policy = || PolicyError::NoPolicyDefined {
            environment: environment.clone(),
            stage: Some(stage.clone()),
        };
        let env = self.environment(environment).ok_or_else(no_policy)?;
        if !env.stages.contains(stage) {
            return Err(no_policy());
        }

        let overrides: Vec<&PolicyRule> =
            env.rules.iter().filter(|rule| &rule.stage == stage).collect();
        let mut used = vec![false; overrides.len()];
        let mut effective = Vec::new();
        for base in self.document.base.iter().filter(|rule| &rule.stage == stage) {
            match overrides.iter().position(|rule| rule.kind == base.kind) {
                Some(index) => {
                    used[index] = true;
                    effective.push(overrides[index].clone());
                }
                None => effective.push(base.clone()),
            }
        }
        for (rule, replaced) in overrides.iter().zip(used) {
            if !replaced {
                effective.push((*rule).clone());
            }
        }

        if effective.is_empty() {
            return Err(no_policy());
        }
        Ok(effective)
    }

    /// Returns the first stage of an environment.
    ///
    /// # Errors
    ///
    /// Returns [`PolicyError::NoPolicyDefined`] when the environment is unknown.
    pub fn first_stage(&self, environment: &EnvironmentId) -> Result<StageId, PolicyError> {
        self.environment(environment).and_then(|env| env.stages.first().cloned()).ok_or_else(
            || PolicyError::NoPolicyDefined {
                environment: environment.clone(),
                stage: None,
            },
        )
    }

    /// Returns the stage following `stage`, or `None` for the final stage.
    ///
    /// # Errors
    ///
    /// Returns [`PolicyError::NoPolicyDefined`] when the environment is unknown
    /// or does not declare `stage`.
    pub fn next_stage(
        &self,
        environment: &EnvironmentId,
        stage: &StageId,
    ) -> Result<Option<StageId>, PolicyError> {
        let no_policy = || PolicyError::NoPolicyDefined {
            environment: environment.clone(),
            stage: Some(stage.clone()),
        };
        let env = self.environment(environment).ok_or_else(no_policy)?;
        let index =
            env.stages.iter().position(|candidate| candidate == stage).ok_or_else(no_policy)?;
        Ok(env.stages.get(index + 1).cloned())
    }
}
