//! Rules engine
//!
//! An immutable, priority-ordered list of rules evaluated against every newly
//! declared primary relation. Rules only describe outcomes: the compiler
//! persists spawned children and similarity links. Relations spawned by a rule
//! are never evaluated, so a declare produces at most one generation of
//! children.

pub mod catalogue;

pub use catalogue::{LinkSimilar, SpawnDocs, SpawnViewer};

use crate::config::RulesConfig;
use crate::error::{ApiError, RuleError};
use crate::index::RelationshipIndex;
use crate::relation::{Relation, RelationProperties};
use crate::types::RelationId;
use serde::Serialize;
use std::panic::{self, AssertUnwindSafe};

/// Read-only state a rule may consult
pub struct RuleContext<'a> {
    pub index: &'a RelationshipIndex,
    pub similarity_threshold: f64,
}

/// A child relation a rule wants created
#[derive(Debug, Clone, PartialEq)]
pub struct RelationDraft {
    pub properties: RelationProperties,
    /// Implementation bytes for the child
    pub content: Option<Vec<u8>>,
}

/// A `similar_to` edge a rule wants recorded
#[derive(Debug, Clone, PartialEq)]
pub struct SimilarityLink {
    pub target: RelationId,
    pub weight: f64,
    pub shared: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RuleOutcome {
    pub spawn: Vec<RelationDraft>,
    pub links: Vec<SimilarityLink>,
}

impl RuleOutcome {
    pub fn is_empty(&self) -> bool {
        self.spawn.is_empty() && self.links.is_empty()
    }
}

/// A declarative rule
pub trait Rule: Send + Sync {
    /// Stable identifier, used in configuration
    fn id(&self) -> &'static str;

    fn name(&self) -> &'static str;

    /// Lower runs first; ties keep registration order
    fn priority(&self) -> u32 {
        100
    }

    fn condition(&self, relation: &Relation) -> bool;

    fn action(&self, relation: &Relation, ctx: &RuleContext<'_>) -> Result<RuleOutcome, RuleError>;
}

/// Non-fatal problem reported alongside a successful declare
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Warning {
    pub source: String,
    pub message: String,
}

impl Warning {
    pub fn new(source: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            message: message.into(),
        }
    }
}

impl From<&ApiError> for Warning {
    fn from(err: &ApiError) -> Self {
        let source = match err {
            ApiError::RuleFailure { rule, .. } => rule.clone(),
            ApiError::Conflict(_) => "conflict".to_string(),
            ApiError::CycleDetected { .. } => "cycle".to_string(),
            ApiError::MaterializationFailure { .. } => "materializer".to_string(),
            _ => "compiler".to_string(),
        };
        Warning::new(source, err.to_string())
    }
}

/// Outcome of one matching rule
#[derive(Debug, Clone)]
pub struct RuleEvaluation {
    pub rule: &'static str,
    pub outcome: RuleOutcome,
}

#[derive(Debug, Clone, Default)]
pub struct RulesReport {
    pub evaluations: Vec<RuleEvaluation>,
    pub warnings: Vec<Warning>,
}

pub struct RulesEngine {
    rules: Vec<Box<dyn Rule>>,
}

impl RulesEngine {
    /// Build an engine from rules, ordered by priority (stable)
    pub fn new(mut rules: Vec<Box<dyn Rule>>) -> Self {
        rules.sort_by_key(|rule| rule.priority());
        Self { rules }
    }

    pub fn empty() -> Self {
        Self { rules: Vec::new() }
    }

    /// Every built-in rule
    pub fn with_default_catalogue() -> Self {
        Self::new(catalogue::builtin())
    }

    /// Built-in rules selected by id
    pub fn from_config(config: &RulesConfig) -> Result<Self, ApiError> {
        let mut available = catalogue::builtin();
        let mut selected: Vec<Box<dyn Rule>> = Vec::with_capacity(config.enabled.len());

        for id in &config.enabled {
            let pos = available
                .iter()
                .position(|rule| rule.id() == id.as_str())
                .ok_or_else(|| ApiError::ConfigError(format!("Unknown rule '{}'", id)))?;
            selected.push(available.remove(pos));
        }

        Ok(Self::new(selected))
    }

    pub fn rule_ids(&self) -> Vec<&'static str> {
        self.rules.iter().map(|rule| rule.id()).collect()
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Evaluate every rule against a relation
    ///
    /// Spawned relations yield an empty report. A rule whose action fails or
    /// panics contributes a warning and the remaining rules still run.
    pub fn apply(&self, relation: &Relation, ctx: &RuleContext<'_>) -> RulesReport {
        let mut report = RulesReport::default();
        if relation.auto_spawned {
            return report;
        }

        for rule in &self.rules {
            if !rule.condition(relation) {
                continue;
            }

            let result = panic::catch_unwind(AssertUnwindSafe(|| rule.action(relation, ctx)))
                .unwrap_or_else(|payload| Err(RuleError::Panicked(panic_message(payload))));

            match result {
                Ok(outcome) => {
                    tracing::debug!(
                        rule = rule.id(),
                        relation = %relation.id,
                        spawn = outcome.spawn.len(),
                        links = outcome.links.len(),
                        "Rule fired"
                    );
                    report.evaluations.push(RuleEvaluation {
                        rule: rule.id(),
                        outcome,
                    });
                }
                Err(e) => {
                    tracing::warn!(rule = rule.id(), relation = %relation.id, error = %e, "Rule failed");
                    let err = ApiError::RuleFailure {
                        rule: rule.id().to_string(),
                        reason: e.to_string(),
                    };
                    report.warnings.push(Warning::from(&err));
                }
            }
        }

        report
    }
}

fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
