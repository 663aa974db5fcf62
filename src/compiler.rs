//! Reality compiler
//!
//! Facade over the stores, the rules engine, the materializer and the virtual
//! filesystem. Declares and deletes are serialized end-to-end by a single
//! write lock; reads work against an immutable index snapshot that writers
//! replace in one pointer swap once a write has fully completed.

use crate::config::{ReifyConfig, StorageConfig};
use crate::error::{ApiError, StorageError};
use crate::index::{EdgeStore, RelationshipIndex, SimilarityEdge, SledEdgeStore};
use crate::materialize::{MaterializationRecord, MaterializationStatus, ToolMaterializer};
use crate::object::{LegacyCatalog, LegacyObjectMeta, ObjectStore};
use crate::relation::{
    NewRelation, Relation, RelationFilter, RelationKind, RelationProperties, RelationStore,
};
use crate::rules::{RelationDraft, RuleContext, RulesEngine, SimilarityLink, Warning};
use crate::types::{parse_hash, Hash, RelationId};
use crate::vfs::{VirtualFs, VirtualNode};
use parking_lot::{Mutex, RwLock};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Everything a declare produced
#[derive(Debug, Clone)]
pub struct DeclareOutcome {
    /// The persisted primary relation
    pub relation: Relation,
    /// Materialization status of the primary relation
    pub status: MaterializationStatus,
    /// Children spawned by rules, in rule priority order
    pub spawned: Vec<Relation>,
    /// Non-fatal problems: failed rules, rejected children, lost links
    pub warnings: Vec<Warning>,
}

pub struct RealityCompiler {
    root: PathBuf,
    objects: Arc<ObjectStore>,
    relations: Arc<RelationStore>,
    edges: Arc<dyn EdgeStore + Send + Sync>,
    materializer: ToolMaterializer,
    rules: RulesEngine,
    vfs: VirtualFs,
    index: RwLock<Arc<RelationshipIndex>>,
    write_lock: Mutex<()>,
    similarity_threshold: f64,
}

impl RealityCompiler {
    /// Open (or create) a store described by `config`, with the built-in
    /// rules it enables
    pub fn open(config: &ReifyConfig) -> Result<Self, ApiError> {
        validate(config)?;
        let rules = RulesEngine::from_config(&config.rules)?;
        Self::build(config, rules)
    }

    /// Open a store with a caller-assembled rules engine
    ///
    /// `config.rules.enabled` is ignored; the similarity threshold still
    /// applies.
    pub fn open_with_rules(config: &ReifyConfig, rules: RulesEngine) -> Result<Self, ApiError> {
        validate(config)?;
        Self::build(config, rules)
    }

    fn build(config: &ReifyConfig, rules: RulesEngine) -> Result<Self, ApiError> {
        let root = absolute(&config.storage.root)?;
        let storage = StorageConfig {
            root: root.clone(),
            commands_dir: config.storage.commands_dir.as_deref().map(absolute).transpose()?,
            artifacts_dir: config.storage.artifacts_dir.as_deref().map(absolute).transpose()?,
        };

        let objects = Arc::new(ObjectStore::new(&root)?);
        let relations = Arc::new(RelationStore::open(&root, Arc::clone(&objects))?);
        let edges: Arc<dyn EdgeStore + Send + Sync> =
            Arc::new(SledEdgeStore::new(storage.edges_path())?);
        let materializer = ToolMaterializer::new(
            Arc::clone(&objects),
            storage.commands_path(),
            storage.artifacts_path(),
            root.join("relations"),
        )?;

        let legacy = LegacyCatalog::new(&root).load_all()?;
        let index = RelationshipIndex::build(
            relations.entries(),
            edges.list_all()?,
            &legacy,
            config.index.ancestry_depth,
        );

        tracing::info!(
            root = ?root,
            relations = relations.len(),
            legacy = legacy.len(),
            rules = rules.len(),
            "Opened reality compiler"
        );

        Ok(Self {
            root,
            objects,
            relations,
            edges,
            materializer,
            rules,
            vfs: VirtualFs::new(),
            index: RwLock::new(Arc::new(index)),
            write_lock: Mutex::new(()),
            similarity_threshold: config.rules.similarity_threshold,
        })
    }

    /// Open a store at `root` with default settings
    pub fn open_at<P: AsRef<Path>>(root: P) -> Result<Self, ApiError> {
        Self::open(&ReifyConfig::at_root(root))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn commands_dir(&self) -> &Path {
        self.materializer.commands_dir()
    }

    pub fn artifacts_dir(&self) -> &Path {
        self.materializer.artifacts_dir()
    }

    pub fn rule_ids(&self) -> Vec<&'static str> {
        self.rules.rule_ids()
    }

    /// Current index snapshot. Never blocks on a writer for longer than a
    /// pointer swap.
    pub fn snapshot(&self) -> Arc<RelationshipIndex> {
        self.index.read().clone()
    }

    /// Declare a new primary relation
    ///
    /// Tools and artifacts require implementation bytes. The relation is
    /// persisted before anything else happens; a materialization failure
    /// leaves it stored with status `Failed`, and rule problems are returned
    /// as warnings. Only store failures on the primary relation are errors.
    pub fn declare_relation(
        &self,
        properties: RelationProperties,
        implementation: Option<Vec<u8>>,
    ) -> Result<DeclareOutcome, ApiError> {
        let properties = properties.normalized()?;
        if implementation.is_none()
            && matches!(properties.kind(), RelationKind::Tool | RelationKind::Artifact)
        {
            return Err(ApiError::InvalidRelation(format!(
                "{} '{}' requires implementation bytes",
                properties.kind(),
                properties.name()
            )));
        }

        let _guard = self.write_lock.lock();

        let content = implementation
            .as_deref()
            .map(|bytes| self.objects.put(bytes))
            .transpose()?;
        let relation = self.relations.create(NewRelation::primary(properties, content))?;

        let mut index = RelationshipIndex::clone(&self.snapshot());
        self.index_relation(&mut index, &relation)?;

        let mut warnings = Vec::new();
        let status = match self.materializer.materialize(&relation) {
            Ok(status) => status,
            Err(e) => {
                tracing::warn!(relation = %relation.id, error = %e, "Primary relation left unmaterialized");
                MaterializationStatus::Failed {
                    reason: e.to_string(),
                }
            }
        };

        let report = self.rules.apply(
            &relation,
            &RuleContext {
                index: &index,
                similarity_threshold: self.similarity_threshold,
            },
        );
        warnings.extend(report.warnings);

        let mut spawned = Vec::new();
        let mut linked = false;
        for evaluation in report.evaluations {
            for draft in evaluation.outcome.spawn {
                match self.spawn_child(&mut index, &relation, draft, &mut warnings) {
                    Ok(child) => spawned.push(child),
                    Err(e) => {
                        tracing::warn!(rule = evaluation.rule, parent = %relation.id, error = %e, "Spawn rejected");
                        warnings.push(Warning::from(&e));
                    }
                }
            }
            for link in evaluation.outcome.links {
                match self.record_link(&mut index, &relation.id, link) {
                    Ok(()) => linked = true,
                    Err(e) => {
                        tracing::warn!(rule = evaluation.rule, relation = %relation.id, error = %e, "Similarity link not recorded");
                        warnings.push(Warning::from(&e));
                    }
                }
            }
        }
        if linked {
            if let Err(e) = self.edges.flush() {
                warnings.push(Warning::from(&ApiError::from(e)));
            }
        }

        *self.index.write() = Arc::new(index);

        tracing::info!(
            relation = %relation.id,
            name = relation.name(),
            kind = %relation.kind(),
            materialized = status.is_materialized(),
            spawned = spawned.len(),
            warnings = warnings.len(),
            "Declared relation"
        );

        Ok(DeclareOutcome {
            relation,
            status,
            spawned,
            warnings,
        })
    }

    /// Persist, index and materialize one rule-spawned child
    ///
    /// The child is returned even when its materialization fails; that
    /// failure is pushed onto `warnings` and can be retried later.
    fn spawn_child(
        &self,
        index: &mut RelationshipIndex,
        parent: &Relation,
        draft: RelationDraft,
        warnings: &mut Vec<Warning>,
    ) -> Result<Relation, ApiError> {
        let properties = draft.properties.normalized()?;
        let content = draft
            .content
            .as_deref()
            .map(|bytes| self.objects.put(bytes))
            .transpose()?;

        let child = self.relations.create(NewRelation::spawned(
            properties,
            parent.id.clone(),
            content,
        ))?;

        if child.id == parent.id || index.ancestry_chain(&parent.id).contains(&child.id) {
            self.relations.delete(&child.id)?;
            return Err(ApiError::CycleDetected {
                relation: child.id,
                ancestor: parent.id.clone(),
            });
        }

        self.index_relation(index, &child)?;

        if let Err(e) = self.materializer.materialize(&child) {
            tracing::warn!(relation = %child.id, error = %e, "Spawned relation left unmaterialized");
            warnings.push(Warning::from(&e));
        }

        tracing::debug!(child = %child.id, parent = %parent.id, name = child.name(), "Spawned relation");
        Ok(child)
    }

    fn record_link(
        &self,
        index: &mut RelationshipIndex,
        from: &RelationId,
        link: SimilarityLink,
    ) -> Result<(), ApiError> {
        let edge = SimilarityEdge::new(from.clone(), link.target, link.weight, link.shared);
        self.edges.put(&edge)?;
        index.add_edge(edge);
        Ok(())
    }

    fn index_relation(&self, index: &mut RelationshipIndex, relation: &Relation) -> Result<(), ApiError> {
        let record = self
            .relations
            .record(&relation.id)
            .ok_or_else(|| StorageError::RelationNotFound(relation.id.clone()))?;
        index.insert(relation.clone(), record.object);
        Ok(())
    }

    /// Tombstone a relation
    ///
    /// Spawned children are left alone. The relation's command link or
    /// artifact file is removed if it still holds this relation's content;
    /// stored objects are never removed.
    pub fn delete_relation(&self, id: &RelationId) -> Result<Relation, ApiError> {
        let _guard = self.write_lock.lock();

        let relation = self.relations.get(id)?;
        self.relations.delete(id)?;

        if let Err(e) = self.materializer.dematerialize(&relation) {
            tracing::warn!(relation = %id, error = %e, "Failed to remove materialized entry");
        }

        let mut index = RelationshipIndex::clone(&self.snapshot());
        index.mark_tombstoned(id);
        *self.index.write() = Arc::new(index);

        tracing::info!(relation = %id, name = relation.name(), "Deleted relation");
        Ok(relation)
    }

    /// Bring a tombstoned relation back and re-materialize it
    ///
    /// Fails with `Conflict` if its name was taken in the meantime.
    pub fn restore_relation(&self, id: &RelationId) -> Result<(Relation, MaterializationStatus), ApiError> {
        let _guard = self.write_lock.lock();

        let relation = self.relations.restore(id)?;

        let mut index = RelationshipIndex::clone(&self.snapshot());
        index.mark_live(id);
        *self.index.write() = Arc::new(index);

        let status = match self.materializer.materialize(&relation) {
            Ok(status) => status,
            Err(e) => MaterializationStatus::Failed {
                reason: e.to_string(),
            },
        };

        tracing::info!(relation = %id, name = relation.name(), "Restored relation");
        Ok((relation, status))
    }

    /// Retry materialization of a stored relation from its content object
    pub fn rematerialize(&self, id: &RelationId) -> Result<MaterializationStatus, ApiError> {
        let _guard = self.write_lock.lock();
        let relation = self.relations.get(id)?;
        self.materializer.materialize(&relation)
    }

    /// Latest materialization record of a relation, if any
    pub fn materialization(&self, id: &RelationId) -> Result<Option<MaterializationRecord>, ApiError> {
        Ok(self.materializer.record(id)?)
    }

    pub fn read_object(&self, hash: &Hash) -> Result<Vec<u8>, ApiError> {
        Ok(self.objects.get(hash)?)
    }

    /// `read_object` for a hex-encoded hash
    pub fn read_object_hex(&self, hex: &str) -> Result<Vec<u8>, ApiError> {
        let hash = parse_hash(hex)?;
        self.read_object(&hash)
    }

    /// Re-hash every stored object, returning the ones whose content no
    /// longer matches their hash. Objects listed in the legacy catalog are
    /// keyed by another digest and are skipped.
    pub fn verify_objects(&self) -> Result<Vec<Hash>, ApiError> {
        let legacy: HashSet<Hash> = LegacyCatalog::new(&self.root)
            .load_all()?
            .iter()
            .filter_map(LegacyObjectMeta::hash)
            .collect();
        Ok(self.objects.verify(&legacy)?)
    }

    pub fn resolve_path(&self, path: &str) -> Result<Vec<VirtualNode>, ApiError> {
        let index = self.snapshot();
        self.vfs.resolve(path, &index)
    }

    /// Live relation by ID or name
    pub fn get_metadata(&self, id_or_name: &str) -> Result<Relation, ApiError> {
        let index = self.snapshot();
        index
            .resolve(id_or_name)
            .map(|entry| entry.relation.clone())
            .ok_or_else(|| ApiError::NotFound(format!("relation {}", id_or_name)))
    }

    pub fn list_relations(&self, filter: &RelationFilter) -> Vec<Relation> {
        self.relations.list(filter)
    }
}

fn validate(config: &ReifyConfig) -> Result<(), ApiError> {
    config.validate().map_err(|errors| {
        ApiError::ConfigError(
            errors
                .iter()
                .map(|e| e.to_string())
                .collect::<Vec<_>>()
                .join("; "),
        )
    })
}

fn absolute(path: &Path) -> Result<PathBuf, ApiError> {
    if path.is_absolute() {
        return Ok(path.to_path_buf());
    }
    let cwd = std::env::current_dir().map_err(StorageError::IoError)?;
    Ok(cwd.join(path))
}
