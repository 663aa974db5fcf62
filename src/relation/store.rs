//! Relation persistence
//!
//! Each relation body is serialized to JSON and stored in the object store.
//! A small pointer record at `{root}/relations/relation-{id}.json` maps the ID
//! to that object and carries the tombstone. Records are loaded into memory on
//! open; every write goes to disk before the in-memory state changes.

use crate::error::StorageError;
use crate::object::ObjectStore;
use crate::relation::{compute_relation_id, CreationNonce, Relation, RelationKind, RelationProperties};
use crate::types::{hex_hash, Hash, RelationId};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// On-disk pointer from relation ID to its serialized body
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationRecord {
    pub id: RelationId,
    #[serde(with = "hex_hash")]
    pub object: Hash,
    pub kind: RelationKind,
    pub name: String,
    #[serde(default)]
    pub parent_id: Option<RelationId>,
    #[serde(default)]
    pub auto_spawned: bool,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub tombstoned_at: Option<DateTime<Utc>>,
    #[serde(default, with = "hex_hash::option")]
    pub content: Option<Hash>,
}

impl RelationRecord {
    pub fn is_live(&self) -> bool {
        self.tombstoned_at.is_none()
    }
}

/// Input to [`RelationStore::create`]. Properties must already be normalized.
#[derive(Debug, Clone)]
pub struct NewRelation {
    pub properties: RelationProperties,
    pub parent_id: Option<RelationId>,
    pub auto_spawned: bool,
    pub content: Option<Hash>,
}

impl NewRelation {
    pub fn primary(properties: RelationProperties, content: Option<Hash>) -> Self {
        Self {
            properties,
            parent_id: None,
            auto_spawned: false,
            content,
        }
    }

    pub fn spawned(properties: RelationProperties, parent: RelationId, content: Option<Hash>) -> Self {
        Self {
            properties,
            parent_id: Some(parent),
            auto_spawned: true,
            content,
        }
    }
}

/// Selection over live relations
pub enum RelationFilter {
    All,
    Kind(RelationKind),
    /// Declared directly, not spawned by a rule
    Primary,
    SpawnedBy(RelationId),
    Predicate(Box<dyn Fn(&Relation) -> bool + Send + Sync>),
}

impl RelationFilter {
    pub fn predicate<F>(f: F) -> Self
    where
        F: Fn(&Relation) -> bool + Send + Sync + 'static,
    {
        RelationFilter::Predicate(Box::new(f))
    }

    pub fn matches(&self, relation: &Relation) -> bool {
        match self {
            RelationFilter::All => true,
            RelationFilter::Kind(kind) => relation.kind() == *kind,
            RelationFilter::Primary => relation.is_primary(),
            RelationFilter::SpawnedBy(parent) => relation.parent_id.as_ref() == Some(parent),
            RelationFilter::Predicate(f) => f(relation),
        }
    }
}

#[derive(Default)]
struct StoreState {
    records: HashMap<RelationId, RelationRecord>,
    relations: HashMap<RelationId, Relation>,
    live_names: HashMap<String, RelationId>,
}

/// Persistent relation store
pub struct RelationStore {
    dir: PathBuf,
    objects: Arc<ObjectStore>,
    state: RwLock<StoreState>,
}

impl RelationStore {
    /// Open the store under `{root}/relations`, loading every record
    pub fn open<P: AsRef<Path>>(root: P, objects: Arc<ObjectStore>) -> Result<Self, StorageError> {
        let dir = root.as_ref().join("relations");
        fs::create_dir_all(&dir).map_err(|e| {
            StorageError::IoError(std::io::Error::new(
                std::io::ErrorKind::Other,
                format!("Failed to create relations directory at {:?}: {}", dir, e),
            ))
        })?;

        let store = Self {
            dir,
            objects,
            state: RwLock::new(StoreState::default()),
        };
        store.load()?;
        Ok(store)
    }

    fn load(&self) -> Result<(), StorageError> {
        let mut state = StoreState::default();
        let mut records: Vec<RelationRecord> = Vec::new();

        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            let file_name = match path.file_name().and_then(|n| n.to_str()) {
                Some(name) => name,
                None => continue,
            };
            if !file_name.starts_with("relation-") || !file_name.ends_with(".json") {
                continue;
            }

            let bytes = fs::read(&path)?;
            match serde_json::from_slice::<RelationRecord>(&bytes) {
                Ok(record) => records.push(record),
                Err(e) => {
                    tracing::warn!(path = ?path, error = %e, "Skipping unreadable relation record");
                }
            }
        }

        records.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));

        for record in records {
            let relation = match self.read_body(&record) {
                Ok(relation) => relation,
                Err(e) => {
                    tracing::warn!(relation = %record.id, error = %e, "Skipping relation with unreadable body");
                    continue;
                }
            };
            if record.is_live() {
                state.live_names.insert(record.name.clone(), record.id.clone());
            }
            state.relations.insert(record.id.clone(), relation);
            state.records.insert(record.id.clone(), record);
        }

        tracing::debug!(
            relations = state.records.len(),
            live = state.live_names.len(),
            "Loaded relation store"
        );
        *self.state.write() = state;
        Ok(())
    }

    fn read_body(&self, record: &RelationRecord) -> Result<Relation, StorageError> {
        let bytes = self.objects.get(&record.object)?;
        let relation: Relation =
            serde_json::from_slice(&bytes).map_err(|e| StorageError::Serialization(e.to_string()))?;
        if relation.id != record.id {
            return Err(StorageError::Serialization(format!(
                "record {} points at body of relation {}",
                record.id, relation.id
            )));
        }
        Ok(relation)
    }

    fn record_path(&self, id: &RelationId) -> PathBuf {
        self.dir.join(format!("relation-{}.json", id))
    }

    fn write_record(&self, record: &RelationRecord) -> Result<(), StorageError> {
        let path = self.record_path(&record.id);
        let temp_path = path.with_extension("json.tmp");

        let serialized = serde_json::to_vec_pretty(record)
            .map_err(|e| StorageError::Serialization(e.to_string()))?;

        fs::write(&temp_path, &serialized).map_err(|e| {
            StorageError::IoError(std::io::Error::new(
                std::io::ErrorKind::Other,
                format!("Failed to write relation record to {:?}: {}", temp_path, e),
            ))
        })?;

        fs::rename(&temp_path, &path).map_err(|e| {
            let _ = fs::remove_file(&temp_path);
            StorageError::IoError(std::io::Error::new(
                std::io::ErrorKind::Other,
                format!("Failed to rename temp file to {:?}: {}", path, e),
            ))
        })?;

        Ok(())
    }

    /// Create a relation with a fresh ID
    ///
    /// Fails with `NameTaken` if the name already resolves to a live relation.
    /// The name check and the insert happen under one write lock, so two
    /// concurrent creates of the same name cannot both succeed.
    pub fn create(&self, new: NewRelation) -> Result<Relation, StorageError> {
        let mut state = self.state.write();

        let name = new.properties.name().to_string();
        if let Some(existing) = state.live_names.get(&name) {
            return Err(StorageError::NameTaken {
                name,
                existing: existing.clone(),
            });
        }

        let created_at = Utc::now();
        let nonce = CreationNonce::new(created_at);
        let id = compute_relation_id(&new.properties, new.parent_id.as_ref(), &nonce)?;

        let relation = Relation {
            id: id.clone(),
            properties: new.properties,
            parent_id: new.parent_id,
            auto_spawned: new.auto_spawned,
            created_at,
            content: new.content,
        };

        let body =
            serde_json::to_vec(&relation).map_err(|e| StorageError::Serialization(e.to_string()))?;
        let object = self.objects.put(&body)?;

        let record = RelationRecord {
            id: id.clone(),
            object,
            kind: relation.kind(),
            name: name.clone(),
            parent_id: relation.parent_id.clone(),
            auto_spawned: relation.auto_spawned,
            created_at,
            tombstoned_at: None,
            content: relation.content,
        };
        self.write_record(&record)?;

        state.live_names.insert(name, id.clone());
        state.relations.insert(id.clone(), relation.clone());
        state.records.insert(id.clone(), record);

        tracing::debug!(relation = %id, kind = %relation.kind(), name = relation.name(), "Created relation");
        Ok(relation)
    }

    /// Get a live relation
    pub fn get(&self, id: &RelationId) -> Result<Relation, StorageError> {
        let state = self.state.read();
        match (state.records.get(id), state.relations.get(id)) {
            (Some(record), Some(relation)) if record.is_live() => Ok(relation.clone()),
            _ => Err(StorageError::RelationNotFound(id.clone())),
        }
    }

    /// Record for a relation, tombstoned or not
    pub fn record(&self, id: &RelationId) -> Option<RelationRecord> {
        self.state.read().records.get(id).cloned()
    }

    /// Every relation ever created with its record, ordered by creation
    pub fn entries(&self) -> Vec<(Relation, RelationRecord)> {
        let state = self.state.read();
        let mut entries: Vec<(Relation, RelationRecord)> = state
            .records
            .values()
            .filter_map(|record| {
                state
                    .relations
                    .get(&record.id)
                    .map(|relation| (relation.clone(), record.clone()))
            })
            .collect();
        entries.sort_by(|a, b| {
            a.1.created_at
                .cmp(&b.1.created_at)
                .then_with(|| a.1.id.cmp(&b.1.id))
        });
        entries
    }

    /// Live relation currently holding a name
    pub fn lookup_name(&self, name: &str) -> Option<RelationId> {
        self.state.read().live_names.get(name).cloned()
    }

    /// Live relations matching a filter, ordered by creation time then ID
    pub fn list(&self, filter: &RelationFilter) -> Vec<Relation> {
        self.entries()
            .into_iter()
            .filter(|(relation, record)| record.is_live() && filter.matches(relation))
            .map(|(relation, _)| relation)
            .collect()
    }

    /// Tombstone a relation. Children are left alone.
    pub fn delete(&self, id: &RelationId) -> Result<RelationRecord, StorageError> {
        let mut state = self.state.write();
        let mut record = match state.records.get(id) {
            Some(record) if record.is_live() => record.clone(),
            _ => return Err(StorageError::RelationNotFound(id.clone())),
        };

        record.tombstoned_at = Some(Utc::now());
        self.write_record(&record)?;

        if state.live_names.get(&record.name) == Some(id) {
            state.live_names.remove(&record.name);
        }
        state.records.insert(id.clone(), record.clone());

        tracing::debug!(relation = %id, name = %record.name, "Tombstoned relation");
        Ok(record)
    }

    /// Clear a tombstone, provided the name is still free
    pub fn restore(&self, id: &RelationId) -> Result<Relation, StorageError> {
        let mut state = self.state.write();
        let mut record = match state.records.get(id) {
            Some(record) => record.clone(),
            None => return Err(StorageError::RelationNotFound(id.clone())),
        };
        let relation = match state.relations.get(id) {
            Some(relation) => relation.clone(),
            None => return Err(StorageError::RelationNotFound(id.clone())),
        };

        if record.is_live() {
            return Ok(relation);
        }
        if let Some(existing) = state.live_names.get(&record.name) {
            return Err(StorageError::NameTaken {
                name: record.name.clone(),
                existing: existing.clone(),
            });
        }

        record.tombstoned_at = None;
        self.write_record(&record)?;

        state.live_names.insert(record.name.clone(), id.clone());
        state.records.insert(id.clone(), record);

        tracing::debug!(relation = %id, "Restored relation");
        Ok(relation)
    }

    pub fn len(&self) -> usize {
        self.state.read().live_names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
