//! Error types for the reality compilation pipeline.

use crate::types::{hash_to_hex, Hash, RelationId};
use thiserror::Error;

/// Storage-related errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Object not found: {}", hash_to_hex(.0))]
    ObjectNotFound(Hash),

    #[error("Relation not found: {0}")]
    RelationNotFound(RelationId),

    #[error("Name '{name}' already resolves to live relation {existing}")]
    NameTaken { name: String, existing: RelationId },

    #[error("Hash mismatch: expected {}, got {}", hash_to_hex(.expected), hash_to_hex(.actual))]
    HashMismatch { expected: Hash, actual: Hash },

    #[error("Invalid object hash: {0}")]
    InvalidHash(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Storage I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

/// Errors surfaced to callers of the compiler facade
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Cycle detected: {relation} would appear in its own ancestry via {ancestor}")]
    CycleDetected {
        relation: RelationId,
        ancestor: RelationId,
    },

    #[error("Materialization failed for {relation}: {reason}")]
    MaterializationFailure { relation: RelationId, reason: String },

    #[error("Rule '{rule}' failed: {reason}")]
    RuleFailure { rule: String, reason: String },

    #[error("Invalid relation: {0}")]
    InvalidRelation(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Storage error: {0}")]
    StorageError(StorageError),
}

impl From<StorageError> for ApiError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::ObjectNotFound(hash) => {
                ApiError::NotFound(format!("object {}", hash_to_hex(&hash)))
            }
            StorageError::RelationNotFound(id) => ApiError::NotFound(format!("relation {}", id)),
            StorageError::InvalidHash(value) => ApiError::NotFound(format!("object {}", value)),
            StorageError::NameTaken { name, existing } => ApiError::Conflict(format!(
                "'{}' already resolves to live relation {}",
                name, existing
            )),
            other => ApiError::StorageError(other),
        }
    }
}

impl From<config::ConfigError> for ApiError {
    fn from(err: config::ConfigError) -> Self {
        ApiError::ConfigError(err.to_string())
    }
}

/// Failure of a single rule action. Never fatal to a declare.
#[derive(Debug, Error)]
pub enum RuleError {
    #[error("{0}")]
    Action(String),

    #[error("rule panicked: {0}")]
    Panicked(String),
}
