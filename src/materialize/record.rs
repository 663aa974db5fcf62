//! Materialization records
//!
//! One JSON document per relation at `relations/materialized-{id}.json`,
//! describing the last materialization attempt.

use crate::materialize::MaterializedEntity;
use crate::types::{hex_hash, Hash, RelationId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RecordStatus {
    Materialized,
    Failed,
    Skipped,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MaterializationRecord {
    pub relation_id: RelationId,
    #[serde(default)]
    pub path: Option<PathBuf>,
    #[serde(default, with = "hex_hash::option")]
    pub object: Option<Hash>,
    #[serde(default)]
    pub executable: bool,
    #[serde(default)]
    pub symlink_target: Option<PathBuf>,
    pub status: RecordStatus,
    pub materialized_at: DateTime<Utc>,
    #[serde(default)]
    pub error: Option<String>,
}

impl MaterializationRecord {
    pub fn materialized(entity: &MaterializedEntity) -> Self {
        Self {
            relation_id: entity.relation_id.clone(),
            path: Some(entity.path.clone()),
            object: Some(entity.object),
            executable: entity.is_executable,
            symlink_target: entity.symlink_target.clone(),
            status: RecordStatus::Materialized,
            materialized_at: Utc::now(),
            error: None,
        }
    }

    pub fn failed(relation_id: RelationId, object: Hash, reason: &str) -> Self {
        Self {
            relation_id,
            path: None,
            object: Some(object),
            executable: false,
            symlink_target: None,
            status: RecordStatus::Failed,
            materialized_at: Utc::now(),
            error: Some(reason.to_string()),
        }
    }

    pub fn skipped(relation_id: RelationId) -> Self {
        Self {
            relation_id,
            path: None,
            object: None,
            executable: false,
            symlink_target: None,
            status: RecordStatus::Skipped,
            materialized_at: Utc::now(),
            error: None,
        }
    }
}
