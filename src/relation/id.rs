//! Relation ID computation

use crate::error::StorageError;
use crate::relation::RelationProperties;
use crate::types::RelationId;
use blake3::Hasher;
use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicU64, Ordering};

static SEQUENCE: AtomicU64 = AtomicU64::new(0);

/// Per-creation uniqueness input
///
/// Two declarations with identical properties still get distinct IDs, which
/// keeps a tombstoned relation and its re-declaration apart.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CreationNonce {
    pub timestamp_nanos: i64,
    pub sequence: u64,
}

impl CreationNonce {
    pub fn new(created_at: DateTime<Utc>) -> Self {
        Self {
            timestamp_nanos: created_at
                .timestamp_nanos_opt()
                .unwrap_or_else(|| created_at.timestamp_micros().saturating_mul(1000)),
            sequence: SEQUENCE.fetch_add(1, Ordering::Relaxed),
        }
    }
}

/// RelationID = hash("kind:" || kind || "props:" || canonical props || "parent:" || parent || "nonce:" || nonce)
///
/// Properties are serialized to JSON; struct field order is fixed and the
/// extension map is a BTreeMap, so the encoding is canonical.
pub fn compute_relation_id(
    properties: &RelationProperties,
    parent: Option<&RelationId>,
    nonce: &CreationNonce,
) -> Result<RelationId, StorageError> {
    let props =
        serde_json::to_vec(properties).map_err(|e| StorageError::Serialization(e.to_string()))?;

    let mut hasher = Hasher::new();

    hasher.update(b"kind:");
    hasher.update(properties.kind().as_str().as_bytes());

    hasher.update(b"props:");
    hasher.update(&(props.len() as u64).to_le_bytes());
    hasher.update(&props);

    hasher.update(b"parent:");
    if let Some(parent) = parent {
        hasher.update(parent.as_str().as_bytes());
    }

    hasher.update(b"nonce:");
    hasher.update(&nonce.timestamp_nanos.to_le_bytes());
    hasher.update(&nonce.sequence.to_le_bytes());

    Ok(RelationId::from_digest(hasher.finalize().as_bytes()))
}
