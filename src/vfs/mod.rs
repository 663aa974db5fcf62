//! Virtual filesystem resolver
//!
//! Read-only projections of the relationship index. Every path is resolved
//! against an index snapshot at read time; nothing here touches the disk.
//! Each top-level directory is served by a [`PathHandler`], so new views are
//! added by registering another handler.

pub mod handlers;

pub use handlers::{ArtifactsHandler, ByDateHandler, CommandsHandler, ToolsHandler};

use crate::error::ApiError;
use crate::index::{IndexEntry, RelationshipIndex};
use crate::types::{Hash, RelationId};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum NodeKind {
    Leaf,
    Directory,
}

/// One entry of a resolved path
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VirtualNode {
    pub name: String,
    /// Underlying relation; `None` for pure directory nodes and legacy objects
    pub relation_id: Option<RelationId>,
    /// Canonical object behind a leaf
    #[serde(with = "crate::types::hex_hash::option")]
    pub object: Option<Hash>,
    pub kind: NodeKind,
}

impl VirtualNode {
    pub fn directory(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            relation_id: None,
            object: None,
            kind: NodeKind::Directory,
        }
    }

    /// Directory standing for a relation (e.g. `/tools/{name}/`)
    pub fn relation_directory(entry: &IndexEntry) -> Self {
        Self {
            name: entry.name().to_string(),
            relation_id: Some(entry.id().clone()),
            object: None,
            kind: NodeKind::Directory,
        }
    }

    /// Leaf exposing a relation's canonical object
    pub fn relation_leaf(entry: &IndexEntry) -> Self {
        Self::named_leaf(entry.name(), entry, entry.view_object())
    }

    pub fn named_leaf(name: impl Into<String>, entry: &IndexEntry, object: Hash) -> Self {
        Self {
            name: name.into(),
            relation_id: Some(entry.id().clone()),
            object: Some(object),
            kind: NodeKind::Leaf,
        }
    }

    pub fn is_leaf(&self) -> bool {
        self.kind == NodeKind::Leaf
    }
}

/// Resolver for one top-level directory
pub trait PathHandler: Send + Sync {
    /// First path segment served, e.g. `tools`
    fn prefix(&self) -> &'static str;

    /// Resolve the segments after the prefix
    fn resolve(&self, segments: &[&str], index: &RelationshipIndex) -> Result<Vec<VirtualNode>, ApiError>;
}

pub struct VirtualFs {
    handlers: Vec<Box<dyn PathHandler>>,
}

impl Default for VirtualFs {
    fn default() -> Self {
        Self::new()
    }
}

impl VirtualFs {
    /// Resolver with the built-in views
    pub fn new() -> Self {
        Self::empty()
            .with_handler(Box::new(ToolsHandler))
            .with_handler(Box::new(CommandsHandler))
            .with_handler(Box::new(ArtifactsHandler))
            .with_handler(Box::new(ByDateHandler))
    }

    pub fn empty() -> Self {
        Self { handlers: Vec::new() }
    }

    /// Register a handler; a later handler replaces one with the same prefix
    pub fn with_handler(mut self, handler: Box<dyn PathHandler>) -> Self {
        self.handlers.retain(|h| h.prefix() != handler.prefix());
        self.handlers.push(handler);
        self
    }

    pub fn prefixes(&self) -> Vec<&'static str> {
        self.handlers.iter().map(|h| h.prefix()).collect()
    }

    /// Resolve an absolute virtual path. Trailing slashes are optional.
    pub fn resolve(&self, path: &str, index: &RelationshipIndex) -> Result<Vec<VirtualNode>, ApiError> {
        let segments = split_path(path)?;

        let (head, rest) = match segments.split_first() {
            Some(split) => split,
            None => {
                return Ok(self
                    .handlers
                    .iter()
                    .map(|h| VirtualNode::directory(h.prefix()))
                    .collect())
            }
        };

        let handler = self
            .handlers
            .iter()
            .find(|h| h.prefix() == *head)
            .ok_or_else(|| ApiError::NotFound(format!("path {}", path)))?;

        tracing::trace!(path = %path, handler = handler.prefix(), "Resolving virtual path");
        handler.resolve(rest, index)
    }
}

fn split_path(path: &str) -> Result<Vec<&str>, ApiError> {
    if !path.starts_with('/') {
        return Err(ApiError::NotFound(format!("path {} is not absolute", path)));
    }
    let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
    if segments.iter().any(|s| *s == "." || *s == "..") {
        return Err(ApiError::NotFound(format!("path {}", path)));
    }
    Ok(segments)
}

/// Error for a segment no handler recognizes
pub(crate) fn not_found(prefix: &str, segments: &[&str]) -> ApiError {
    ApiError::NotFound(format!("path /{}/{}", prefix, segments.join("/")))
}
