//! Relationship index
//!
//! Derived views over the relation store: by name, by transform tag, by
//! spawning parent, by ancestry, by creation date and by similarity. The
//! index is updated incrementally on every write and is never authoritative;
//! it can always be rebuilt from the relation store, the persisted similarity
//! edges and the legacy metadata catalog.
//!
//! Consistency is lazy. Tombstoning a relation only flips its entry to
//! not-live; every read path filters entries that are no longer live instead
//! of eagerly unlinking them from each view.

pub mod persistence;

pub use persistence::{EdgeStore, SledEdgeStore};

use crate::object::LegacyObjectMeta;
use crate::relation::{Relation, RelationKind, RelationRecord};
use crate::types::{Hash, RelationId};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};

/// Default bound on stored ancestor chains
pub const DEFAULT_ANCESTRY_DEPTH: usize = 16;

/// A relation as seen by the index
#[derive(Debug, Clone)]
pub struct IndexEntry {
    pub relation: Relation,
    /// Object holding the serialized relation body
    pub object: Hash,
    pub live: bool,
}

impl IndexEntry {
    /// Object every view exposes for this relation: the implementation
    /// bytes when there are any, otherwise the relation body itself
    pub fn view_object(&self) -> Hash {
        self.relation.content.unwrap_or(self.object)
    }

    pub fn id(&self) -> &RelationId {
        &self.relation.id
    }

    pub fn name(&self) -> &str {
        self.relation.name()
    }
}

/// Symmetric `similar_to` edge. Endpoints are stored in ID order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimilarityEdge {
    pub a: RelationId,
    pub b: RelationId,
    pub weight: f64,
    pub shared: Vec<String>,
}

impl SimilarityEdge {
    pub fn new(x: RelationId, y: RelationId, weight: f64, shared: Vec<String>) -> Self {
        let (a, b) = if x <= y { (x, y) } else { (y, x) };
        Self { a, b, weight, shared }
    }

    /// The endpoint opposite `id`, if `id` is an endpoint
    pub fn other(&self, id: &RelationId) -> Option<&RelationId> {
        if &self.a == id {
            Some(&self.b)
        } else if &self.b == id {
            Some(&self.a)
        } else {
            None
        }
    }
}

/// One neighbour in a similarity listing
#[derive(Debug, Clone)]
pub struct Neighbour<'a> {
    pub entry: &'a IndexEntry,
    pub weight: f64,
    pub shared: &'a [String],
}

/// Legacy object listed under its creation date
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LegacyEntry {
    pub name: String,
    pub object: Option<Hash>,
    pub object_type: String,
}

/// One row of a by-date listing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatedItem {
    pub name: String,
    pub relation_id: Option<RelationId>,
    pub object: Option<Hash>,
}

#[derive(Debug, Clone)]
pub struct RelationshipIndex {
    entries: HashMap<RelationId, IndexEntry>,
    by_name: BTreeMap<String, RelationId>,
    by_transform: BTreeMap<String, Vec<RelationId>>,
    spawned_by: HashMap<RelationId, Vec<RelationId>>,
    ancestry: HashMap<RelationId, Vec<RelationId>>,
    by_date: BTreeMap<NaiveDate, Vec<RelationId>>,
    legacy_by_date: BTreeMap<NaiveDate, Vec<LegacyEntry>>,
    similar: HashMap<RelationId, Vec<SimilarityEdge>>,
    ancestry_depth: usize,
}

impl Default for RelationshipIndex {
    fn default() -> Self {
        Self::new(DEFAULT_ANCESTRY_DEPTH)
    }
}

impl RelationshipIndex {
    pub fn new(ancestry_depth: usize) -> Self {
        Self {
            entries: HashMap::new(),
            by_name: BTreeMap::new(),
            by_transform: BTreeMap::new(),
            spawned_by: HashMap::new(),
            ancestry: HashMap::new(),
            by_date: BTreeMap::new(),
            legacy_by_date: BTreeMap::new(),
            similar: HashMap::new(),
            ancestry_depth: ancestry_depth.max(1),
        }
    }

    /// Rebuild from persisted state
    ///
    /// `entries` must be ordered by creation so parents precede children.
    pub fn build(
        entries: impl IntoIterator<Item = (Relation, RelationRecord)>,
        edges: impl IntoIterator<Item = SimilarityEdge>,
        legacy: &[LegacyObjectMeta],
        ancestry_depth: usize,
    ) -> Self {
        let mut index = Self::new(ancestry_depth);
        for (relation, record) in entries {
            let live = record.is_live();
            index.insert_entry(relation, record.object, live);
        }
        for edge in edges {
            index.add_edge(edge);
        }
        for meta in legacy {
            index.add_legacy(meta);
        }
        index
    }

    /// Add a freshly created relation
    pub fn insert(&mut self, relation: Relation, object: Hash) {
        self.insert_entry(relation, object, true);
    }

    fn insert_entry(&mut self, relation: Relation, object: Hash, live: bool) {
        let id = relation.id.clone();

        if live {
            self.by_name.insert(relation.name().to_string(), id.clone());
        }

        for tag in relation.transforms() {
            let ids = self.by_transform.entry(tag.clone()).or_default();
            if !ids.contains(&id) {
                ids.push(id.clone());
            }
        }

        if let Some(parent) = &relation.parent_id {
            let children = self.spawned_by.entry(parent.clone()).or_default();
            if !children.contains(&id) {
                children.push(id.clone());
            }

            let mut chain = vec![parent.clone()];
            if let Some(upstream) = self.ancestry.get(parent) {
                chain.extend(upstream.iter().cloned());
            }
            // A chain that loops back to this relation is cut at the loop
            if let Some(pos) = chain.iter().position(|ancestor| ancestor == &id) {
                chain.truncate(pos);
            }
            chain.truncate(self.ancestry_depth);
            self.ancestry.insert(id.clone(), chain);
        }

        if matches!(relation.kind(), RelationKind::Tool | RelationKind::Artifact) {
            let date = relation.created_at.date_naive();
            let ids = self.by_date.entry(date).or_default();
            if !ids.contains(&id) {
                ids.push(id.clone());
            }
        }

        self.entries.insert(
            id,
            IndexEntry {
                relation,
                object,
                live,
            },
        );
    }

    /// Mark a relation as tombstoned. Views keep their references.
    pub fn mark_tombstoned(&mut self, id: &RelationId) -> bool {
        match self.entries.get_mut(id) {
            Some(entry) if entry.live => {
                entry.live = false;
                true
            }
            _ => false,
        }
    }

    /// Bring a tombstoned relation back
    pub fn mark_live(&mut self, id: &RelationId) -> bool {
        match self.entries.get_mut(id) {
            Some(entry) if !entry.live => {
                entry.live = true;
                let name = entry.relation.name().to_string();
                self.by_name.insert(name, id.clone());
                true
            }
            _ => false,
        }
    }

    pub fn add_edge(&mut self, edge: SimilarityEdge) {
        if edge.a == edge.b {
            return;
        }
        for endpoint in [edge.a.clone(), edge.b.clone()] {
            let edges = self.similar.entry(endpoint).or_default();
            match edges.iter_mut().find(|e| e.a == edge.a && e.b == edge.b) {
                Some(existing) => *existing = edge.clone(),
                None => edges.push(edge.clone()),
            }
        }
    }

    pub fn add_legacy(&mut self, meta: &LegacyObjectMeta) {
        let entry = LegacyEntry {
            name: meta.display_name(),
            object: meta.hash(),
            object_type: meta.object_type.clone(),
        };
        let rows = self.legacy_by_date.entry(meta.created_on()).or_default();
        if !rows.iter().any(|row| row.name == entry.name) {
            rows.push(entry);
        }
    }

    pub fn ancestry_depth(&self) -> usize {
        self.ancestry_depth
    }

    /// Number of live relations
    pub fn len(&self) -> usize {
        self.entries.values().filter(|e| e.live).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn live(&self, id: &RelationId) -> Option<&IndexEntry> {
        self.entries.get(id).filter(|entry| entry.live)
    }

    /// Live entry by ID
    pub fn entry(&self, id: &RelationId) -> Option<&IndexEntry> {
        self.live(id)
    }

    /// Entry by ID, including tombstoned ones
    pub fn entry_any(&self, id: &RelationId) -> Option<&IndexEntry> {
        self.entries.get(id)
    }

    pub fn get(&self, id: &RelationId) -> Option<&Relation> {
        self.live(id).map(|entry| &entry.relation)
    }

    pub fn lookup_name(&self, name: &str) -> Option<&IndexEntry> {
        self.by_name
            .get(name)
            .and_then(|id| self.live(id))
            .filter(|entry| entry.name() == name)
    }

    /// Resolve a path segment holding either a relation ID or a live name
    pub fn resolve(&self, segment: &str) -> Option<&IndexEntry> {
        RelationId::parse(segment)
            .and_then(|id| self.live(&id))
            .or_else(|| self.lookup_name(segment))
    }

    /// Live relations in name order, optionally of one kind
    pub fn by_name(&self, kind: Option<RelationKind>) -> Vec<&IndexEntry> {
        self.by_name
            .iter()
            .filter_map(|(name, id)| self.live(id).filter(|e| e.name() == name))
            .filter(|entry| kind.map_or(true, |k| entry.relation.kind() == k))
            .collect()
    }

    /// Every live tool, in name order
    pub fn live_tools(&self) -> Vec<&Relation> {
        self.by_name(Some(RelationKind::Tool))
            .into_iter()
            .map(|entry| &entry.relation)
            .collect()
    }

    /// Transform tags carried by at least one live relation
    pub fn transforms(&self) -> Vec<&str> {
        self.by_transform
            .iter()
            .filter(|(_, ids)| ids.iter().any(|id| self.live(id).is_some()))
            .map(|(tag, _)| tag.as_str())
            .collect()
    }

    /// Live relations carrying a transform tag, in name order
    pub fn by_transform(&self, tag: &str) -> Vec<&IndexEntry> {
        let tag = tag.trim().to_lowercase();
        let mut entries: Vec<&IndexEntry> = self
            .by_transform
            .get(&tag)
            .map(|ids| ids.iter().filter_map(|id| self.live(id)).collect())
            .unwrap_or_default();
        entries.sort_by(|a, b| a.name().cmp(b.name()));
        entries
    }

    /// Live children of a relation, in spawn order
    pub fn children(&self, id: &RelationId) -> Vec<&IndexEntry> {
        self.spawned_by
            .get(id)
            .map(|ids| ids.iter().filter_map(|child| self.live(child)).collect())
            .unwrap_or_default()
    }

    /// Live relations with at least one live child, in name order
    pub fn spawners(&self) -> Vec<&IndexEntry> {
        let mut parents: Vec<&IndexEntry> = self
            .spawned_by
            .keys()
            .filter_map(|id| self.live(id))
            .filter(|entry| !self.children(entry.id()).is_empty())
            .collect();
        parents.sort_by(|a, b| a.name().cmp(b.name()));
        parents
    }

    /// Ancestors nearest first, stopping at the first one that is no longer
    /// live
    pub fn ancestors(&self, id: &RelationId) -> Vec<&IndexEntry> {
        let mut out = Vec::new();
        if let Some(chain) = self.ancestry.get(id) {
            for ancestor in chain {
                match self.live(ancestor) {
                    Some(entry) => out.push(entry),
                    None => break,
                }
            }
        }
        out
    }

    /// Raw stored chain, tombstones included
    pub fn ancestry_chain(&self, id: &RelationId) -> &[RelationId] {
        self.ancestry.get(id).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Live relations whose direct parent is live, in name order
    pub fn with_live_parent(&self) -> Vec<&IndexEntry> {
        self.by_name(None)
            .into_iter()
            .filter(|entry| {
                entry
                    .relation
                    .parent_id
                    .as_ref()
                    .map_or(false, |parent| self.live(parent).is_some())
            })
            .collect()
    }

    /// Dates with at least one live relation or legacy object, ascending
    pub fn dates(&self) -> Vec<NaiveDate> {
        let mut dates: BTreeSet<NaiveDate> = self
            .by_date
            .iter()
            .filter(|(_, ids)| ids.iter().any(|id| self.live(id).is_some()))
            .map(|(date, _)| *date)
            .collect();
        dates.extend(
            self.legacy_by_date
                .iter()
                .filter(|(_, rows)| !rows.is_empty())
                .map(|(date, _)| *date),
        );
        dates.into_iter().collect()
    }

    /// Relations and legacy objects created on a date, in name order
    ///
    /// A relation shadows a legacy object with the same name.
    pub fn on_date(&self, date: NaiveDate) -> Vec<DatedItem> {
        let mut items: BTreeMap<String, DatedItem> = BTreeMap::new();

        if let Some(ids) = self.by_date.get(&date) {
            for entry in ids.iter().filter_map(|id| self.live(id)) {
                items.insert(
                    entry.name().to_string(),
                    DatedItem {
                        name: entry.name().to_string(),
                        relation_id: Some(entry.id().clone()),
                        object: Some(entry.view_object()),
                    },
                );
            }
        }

        if let Some(rows) = self.legacy_by_date.get(&date) {
            for row in rows {
                items.entry(row.name.clone()).or_insert_with(|| DatedItem {
                    name: row.name.clone(),
                    relation_id: None,
                    object: row.object,
                });
            }
        }

        items.into_values().collect()
    }

    /// Live neighbours by descending weight, then name
    pub fn similar_to(&self, id: &RelationId) -> Vec<Neighbour<'_>> {
        if self.live(id).is_none() {
            return Vec::new();
        }
        let mut neighbours: Vec<Neighbour<'_>> = self
            .similar
            .get(id)
            .map(|edges| {
                edges
                    .iter()
                    .filter_map(|edge| {
                        let other = edge.other(id)?;
                        let entry = self.live(other)?;
                        Some(Neighbour {
                            entry,
                            weight: edge.weight,
                            shared: &edge.shared,
                        })
                    })
                    .collect()
            })
            .unwrap_or_default();

        neighbours.sort_by(|a, b| {
            b.weight
                .partial_cmp(&a.weight)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.entry.name().cmp(b.entry.name()))
        });
        neighbours
    }

    /// Live relations with at least one live neighbour, in name order
    pub fn with_similar(&self) -> Vec<&IndexEntry> {
        let mut entries: Vec<&IndexEntry> = self
            .similar
            .keys()
            .filter_map(|id| self.live(id))
            .filter(|entry| !self.similar_to(entry.id()).is_empty())
            .collect();
        entries.sort_by(|a, b| a.name().cmp(b.name()));
        entries
    }

    /// Subtypes of live artifacts, sorted
    pub fn subtypes(&self) -> Vec<&str> {
        let set: BTreeSet<&str> = self
            .by_name(Some(RelationKind::Artifact))
            .into_iter()
            .filter_map(|entry| match &entry.relation.properties {
                crate::relation::RelationProperties::Artifact(props) => Some(props.subtype.as_str()),
                _ => None,
            })
            .collect();
        set.into_iter().collect()
    }

    /// Live artifacts of a subtype, in name order
    pub fn artifacts(&self, subtype: &str) -> Vec<&IndexEntry> {
        self.by_name(Some(RelationKind::Artifact))
            .into_iter()
            .filter(|entry| match &entry.relation.properties {
                crate::relation::RelationProperties::Artifact(props) => props.subtype == subtype,
                _ => false,
            })
            .collect()
    }
}
