//! Persistence for similarity edges
//!
//! Every other view in the index is re-derived from relation records on open.
//! Similarity edges are the exception: they are rule outcomes, not relations,
//! so they are kept in a sled database next to the relation store.

use crate::error::StorageError;
use crate::index::SimilarityEdge;
use crate::types::RelationId;
use bincode;
use sled;
use std::path::Path;

const EDGE_PREFIX: &str = "edge:";

/// Storage for `similar_to` edges
pub trait EdgeStore {
    fn put(&self, edge: &SimilarityEdge) -> Result<(), StorageError>;
    fn get(&self, a: &RelationId, b: &RelationId) -> Result<Option<SimilarityEdge>, StorageError>;
    fn list_all(&self) -> Result<Vec<SimilarityEdge>, StorageError>;
    fn flush(&self) -> Result<(), StorageError>;
}

/// Sled-based implementation of EdgeStore
pub struct SledEdgeStore {
    db: sled::Db,
}

impl SledEdgeStore {
    /// Open (or create) the edge database at the given path
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self, StorageError> {
        let db = sled::open(path).map_err(|e| {
            StorageError::IoError(std::io::Error::new(
                std::io::ErrorKind::Other,
                format!("Failed to open sled database: {}", e),
            ))
        })?;
        Ok(Self { db })
    }

    fn key(a: &RelationId, b: &RelationId) -> String {
        let (first, second) = if a <= b { (a, b) } else { (b, a) };
        format!("{}{}:{}", EDGE_PREFIX, first, second)
    }
}

impl EdgeStore for SledEdgeStore {
    fn put(&self, edge: &SimilarityEdge) -> Result<(), StorageError> {
        let key = Self::key(&edge.a, &edge.b);
        let value = bincode::serialize(edge).map_err(|e| {
            StorageError::IoError(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                format!("Failed to serialize similarity edge: {}", e),
            ))
        })?;

        self.db.insert(key.as_bytes(), value).map_err(|e| {
            StorageError::IoError(std::io::Error::new(
                std::io::ErrorKind::Other,
                format!("Failed to put similarity edge: {}", e),
            ))
        })?;

        Ok(())
    }

    fn get(&self, a: &RelationId, b: &RelationId) -> Result<Option<SimilarityEdge>, StorageError> {
        let key = Self::key(a, b);
        match self.db.get(key.as_bytes()).map_err(|e| {
            StorageError::IoError(std::io::Error::new(
                std::io::ErrorKind::Other,
                format!("Failed to get similarity edge: {}", e),
            ))
        })? {
            Some(value) => {
                let edge: SimilarityEdge = bincode::deserialize(&value).map_err(|e| {
                    StorageError::IoError(std::io::Error::new(
                        std::io::ErrorKind::InvalidData,
                        format!("Failed to deserialize similarity edge: {}", e),
                    ))
                })?;
                Ok(Some(edge))
            }
            None => Ok(None),
        }
    }

    fn list_all(&self) -> Result<Vec<SimilarityEdge>, StorageError> {
        let mut edges = Vec::new();
        for item in self.db.scan_prefix(EDGE_PREFIX.as_bytes()) {
            let (_, value) = item.map_err(|e| {
                StorageError::IoError(std::io::Error::new(
                    std::io::ErrorKind::Other,
                    format!("Failed to iterate similarity edges: {}", e),
                ))
            })?;
            let edge: SimilarityEdge = bincode::deserialize(&value).map_err(|e| {
                StorageError::IoError(std::io::Error::new(
                    std::io::ErrorKind::InvalidData,
                    format!("Failed to deserialize similarity edge: {}", e),
                ))
            })?;
            edges.push(edge);
        }
        Ok(edges)
    }

    fn flush(&self) -> Result<(), StorageError> {
        self.db.flush().map_err(|e| {
            StorageError::IoError(std::io::Error::new(
                std::io::ErrorKind::Other,
                format!("Failed to flush edge store: {}", e),
            ))
        })?;
        Ok(())
    }
}
