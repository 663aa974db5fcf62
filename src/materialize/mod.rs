//! Tool materializer
//!
//! Turns relations into filesystem reality. Tools become an executable object
//! linked from `commands/{name}`; artifacts are written to
//! `artifacts/{subtype}/{name}`; memory links have no filesystem form.
//!
//! Every mutation is write-to-temp then rename, so a reader of the commands
//! or artifacts directory never observes a partial entry.

pub mod record;

pub use record::{MaterializationRecord, RecordStatus};

use crate::error::{ApiError, StorageError};
use crate::object::{compute_object_hash, ObjectStore};
use crate::relation::{Relation, RelationProperties};
use crate::types::{hash_to_hex, hex_hash, Hash, RelationId};
use chrono::Utc;
use serde::Serialize;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Concrete result of materializing a relation
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MaterializedEntity {
    pub relation_id: RelationId,
    pub path: PathBuf,
    #[serde(with = "hex_hash")]
    pub object: Hash,
    pub is_executable: bool,
    pub symlink_target: Option<PathBuf>,
}

/// Per-declare materialization outcome
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MaterializationStatus {
    Materialized(MaterializedEntity),
    /// The relation kind has no filesystem form
    NotRequired,
    /// The relation is stored but not materialized; retry with rematerialize
    Failed { reason: String },
}

impl MaterializationStatus {
    pub fn is_materialized(&self) -> bool {
        matches!(self, MaterializationStatus::Materialized(_))
    }

    pub fn entity(&self) -> Option<&MaterializedEntity> {
        match self {
            MaterializationStatus::Materialized(entity) => Some(entity),
            _ => None,
        }
    }
}

pub struct ToolMaterializer {
    objects: Arc<ObjectStore>,
    commands_dir: PathBuf,
    artifacts_dir: PathBuf,
    records_dir: PathBuf,
    temp_counter: AtomicU64,
}

impl ToolMaterializer {
    pub fn new(
        objects: Arc<ObjectStore>,
        commands_dir: PathBuf,
        artifacts_dir: PathBuf,
        records_dir: PathBuf,
    ) -> Result<Self, StorageError> {
        for dir in [&commands_dir, &artifacts_dir, &records_dir] {
            fs::create_dir_all(dir).map_err(|e| {
                StorageError::IoError(io::Error::new(
                    io::ErrorKind::Other,
                    format!("Failed to create directory {:?}: {}", dir, e),
                ))
            })?;
        }

        Ok(Self {
            objects,
            commands_dir,
            artifacts_dir,
            records_dir,
            temp_counter: AtomicU64::new(0),
        })
    }

    pub fn commands_dir(&self) -> &Path {
        &self.commands_dir
    }

    pub fn artifacts_dir(&self) -> &Path {
        &self.artifacts_dir
    }

    /// Materialize a relation from its stored content object
    pub fn materialize(&self, relation: &Relation) -> Result<MaterializationStatus, ApiError> {
        if let RelationProperties::MemoryLink(_) = relation.properties {
            self.write_record(&MaterializationRecord::skipped(relation.id.clone()))?;
            return Ok(MaterializationStatus::NotRequired);
        }

        let content = relation.content.ok_or_else(|| ApiError::MaterializationFailure {
            relation: relation.id.clone(),
            reason: "relation has no implementation content".to_string(),
        })?;
        let bytes = self.objects.get(&content)?;
        self.materialize_bytes(relation, &bytes)
    }

    /// Materialize a relation from explicit implementation bytes
    ///
    /// Unchanged content is a no-op that reports the same object and link
    /// target. Content that differs from what this relation was declared or
    /// previously materialized with is rejected with `Conflict`.
    pub fn materialize_bytes(
        &self,
        relation: &Relation,
        bytes: &[u8],
    ) -> Result<MaterializationStatus, ApiError> {
        let hash = compute_object_hash(bytes);

        let declared = relation.content.into_iter();
        let recorded = self
            .record(&relation.id)?
            .filter(|record| record.status == RecordStatus::Materialized)
            .and_then(|record| record.object);
        if let Some(previous) = declared.chain(recorded).find(|previous| *previous != hash) {
            return Err(ApiError::Conflict(format!(
                "relation {} is immutable: content {} differs from {}",
                relation.id,
                hash_to_hex(&hash),
                hash_to_hex(&previous)
            )));
        }

        let result = match &relation.properties {
            RelationProperties::Tool(props) => self.materialize_tool(relation, &props.name, bytes),
            RelationProperties::Artifact(props) => {
                self.materialize_artifact(relation, &props.subtype, &props.name, bytes)
            }
            RelationProperties::MemoryLink(_) => {
                self.write_record(&MaterializationRecord::skipped(relation.id.clone()))?;
                return Ok(MaterializationStatus::NotRequired);
            }
        };

        match result {
            Ok(entity) => {
                self.write_record(&MaterializationRecord::materialized(&entity))?;
                tracing::info!(
                    relation = %relation.id,
                    name = relation.name(),
                    path = ?entity.path,
                    "Materialized relation"
                );
                Ok(MaterializationStatus::Materialized(entity))
            }
            Err(e) => {
                let reason = e.to_string();
                tracing::warn!(relation = %relation.id, error = %reason, "Materialization failed");
                self.write_record(&MaterializationRecord::failed(relation.id.clone(), hash, &reason))?;
                Err(ApiError::MaterializationFailure {
                    relation: relation.id.clone(),
                    reason,
                })
            }
        }
    }

    fn materialize_tool(&self, relation: &Relation, name: &str, bytes: &[u8]) -> Result<MaterializedEntity, StorageError> {
        let object = self.objects.put(bytes)?;
        let target = self.objects.path_of(&object);
        set_executable(&target)?;

        let link = self.commands_dir.join(name);
        self.link_command(&link, &target)?;

        Ok(MaterializedEntity {
            relation_id: relation.id.clone(),
            path: link,
            object,
            is_executable: true,
            symlink_target: Some(target),
        })
    }

    fn materialize_artifact(
        &self,
        relation: &Relation,
        subtype: &str,
        name: &str,
        bytes: &[u8],
    ) -> Result<MaterializedEntity, StorageError> {
        let object = self.objects.put(bytes)?;

        let dir = self.artifacts_dir.join(subtype);
        fs::create_dir_all(&dir)?;
        let path = dir.join(name);

        let unchanged = fs::read(&path)
            .map(|existing| compute_object_hash(&existing) == object)
            .unwrap_or(false);
        if !unchanged {
            let temp_path = self.temp_path(&dir, name);
            fs::write(&temp_path, bytes).map_err(|e| {
                StorageError::IoError(io::Error::new(
                    io::ErrorKind::Other,
                    format!("Failed to write artifact to {:?}: {}", temp_path, e),
                ))
            })?;
            fs::rename(&temp_path, &path).map_err(|e| {
                let _ = fs::remove_file(&temp_path);
                StorageError::IoError(io::Error::new(
                    io::ErrorKind::Other,
                    format!("Failed to rename temp file to {:?}: {}", path, e),
                ))
            })?;
        }

        Ok(MaterializedEntity {
            relation_id: relation.id.clone(),
            path,
            object,
            is_executable: false,
            symlink_target: None,
        })
    }

    /// Point `link` at `target`, leaving a correct link untouched
    fn link_command(&self, link: &Path, target: &Path) -> Result<(), StorageError> {
        if let Ok(current) = fs::read_link(link) {
            if current == target {
                return Ok(());
            }
        }

        let name = link
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let temp_link = self.temp_path(&self.commands_dir, &name);
        create_link(target, &temp_link).map_err(|e| {
            StorageError::IoError(io::Error::new(
                io::ErrorKind::Other,
                format!("Failed to create link {:?}: {}", temp_link, e),
            ))
        })?;

        fs::rename(&temp_link, link).map_err(|e| {
            let _ = fs::remove_file(&temp_link);
            StorageError::IoError(io::Error::new(
                io::ErrorKind::Other,
                format!("Failed to move link into place at {:?}: {}", link, e),
            ))
        })?;
        Ok(())
    }

    fn temp_path(&self, dir: &Path, name: &str) -> PathBuf {
        dir.join(format!(
            ".{}.tmp-{}-{}",
            name,
            std::process::id(),
            self.temp_counter.fetch_add(1, Ordering::Relaxed)
        ))
    }

    /// Remove the filesystem form of a tombstoned relation
    ///
    /// Only entries still holding this relation's content are removed; a
    /// command that was since re-pointed at another relation is left alone.
    /// Objects are never removed.
    pub fn dematerialize(&self, relation: &Relation) -> Result<(), StorageError> {
        let content = match relation.content {
            Some(content) => content,
            None => return Ok(()),
        };

        match &relation.properties {
            RelationProperties::Tool(props) => {
                let link = self.commands_dir.join(&props.name);
                if fs::read_link(&link).ok().as_deref() == Some(self.objects.path_of(&content).as_path()) {
                    fs::remove_file(&link)?;
                    tracing::debug!(relation = %relation.id, link = ?link, "Removed command link");
                }
            }
            RelationProperties::Artifact(props) => {
                let path = self.artifacts_dir.join(&props.subtype).join(&props.name);
                let ours = fs::read(&path)
                    .map(|existing| compute_object_hash(&existing) == content)
                    .unwrap_or(false);
                if ours {
                    fs::remove_file(&path)?;
                    tracing::debug!(relation = %relation.id, path = ?path, "Removed artifact");
                }
            }
            RelationProperties::MemoryLink(_) => {}
        }
        Ok(())
    }

    fn record_path(&self, id: &RelationId) -> PathBuf {
        self.records_dir.join(format!("materialized-{}.json", id))
    }

    pub fn record(&self, id: &RelationId) -> Result<Option<MaterializationRecord>, StorageError> {
        let path = self.record_path(id);
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(StorageError::IoError(e)),
        };
        let record = serde_json::from_slice(&bytes).map_err(|e| StorageError::Serialization(e.to_string()))?;
        Ok(Some(record))
    }

    fn write_record(&self, record: &MaterializationRecord) -> Result<(), StorageError> {
        let path = self.record_path(&record.relation_id);
        let temp_path = path.with_extension("json.tmp");
        let serialized =
            serde_json::to_vec_pretty(record).map_err(|e| StorageError::Serialization(e.to_string()))?;

        fs::write(&temp_path, &serialized)?;
        fs::rename(&temp_path, &path).map_err(|e| {
            let _ = fs::remove_file(&temp_path);
            StorageError::IoError(e)
        })?;
        Ok(())
    }
}

#[cfg(unix)]
fn set_executable(path: &Path) -> Result<(), StorageError> {
    use std::os::unix::fs::PermissionsExt;

    let mut perms = fs::metadata(path)?.permissions();
    if perms.mode() & 0o777 != 0o755 {
        perms.set_mode(0o755);
        fs::set_permissions(path, perms)?;
    }
    Ok(())
}

#[cfg(not(unix))]
fn set_executable(_path: &Path) -> Result<(), StorageError> {
    Ok(())
}

#[cfg(unix)]
fn create_link(target: &Path, link: &Path) -> io::Result<()> {
    std::os::unix::fs::symlink(target, link)
}

#[cfg(not(unix))]
fn create_link(target: &Path, link: &Path) -> io::Result<()> {
    fs::copy(target, link).map(|_| ())
}
