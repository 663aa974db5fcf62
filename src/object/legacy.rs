//! Read-only access to legacy object metadata
//!
//! Stores created before relations existed kept one JSON document per object
//! at `{root}/metadata/{hash}.json`. The by-date view still lists those
//! objects next to relations, so the catalog is loaded whenever the index is
//! rebuilt. Nothing here ever writes.

use crate::error::StorageError;
use crate::types::{parse_hash, Hash};
use chrono::{DateTime, NaiveDate, Utc};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

/// One legacy metadata document. Unknown fields are ignored.
#[derive(Debug, Clone, Deserialize)]
pub struct LegacyObjectMeta {
    pub id: String,
    #[serde(rename = "type", default)]
    pub object_type: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub paths: Vec<String>,
    pub created: DateTime<Utc>,
}

impl LegacyObjectMeta {
    pub fn created_on(&self) -> NaiveDate {
        self.created.date_naive()
    }

    /// Name under which the object appears in `/by-date/{date}/`
    ///
    /// Prefers the first component of a recorded `/by-date/{date}/...` path,
    /// then the title, then a short form of the ID.
    pub fn display_name(&self) -> String {
        let prefix = format!("/by-date/{}/", self.created_on().format("%Y-%m-%d"));
        let from_path = self.paths.iter().find_map(|path| {
            path.strip_prefix(&prefix)
                .and_then(|rest| rest.split('/').next())
                .filter(|name| !name.is_empty())
                .map(str::to_string)
        });

        from_path
            .or_else(|| self.title.as_deref().and_then(path_segment))
            .unwrap_or_else(|| self.id.chars().take(12).collect())
    }

    /// Object hash, if the recorded ID is a well-formed 64-char hex digest
    pub fn hash(&self) -> Option<Hash> {
        parse_hash(&self.id).ok()
    }
}

/// Turn a free-form title into a single path segment
///
/// Separators become `-`; titles that end up blank or as a dot entry are
/// unusable.
fn path_segment(title: &str) -> Option<String> {
    let segment: String = title
        .trim()
        .chars()
        .map(|c| if c == '/' || c.is_control() { '-' } else { c })
        .collect();
    match segment.as_str() {
        "" | "." | ".." => None,
        _ => Some(segment),
    }
}

/// Loader for `{root}/metadata/*.json`
pub struct LegacyCatalog {
    dir: PathBuf,
}

impl LegacyCatalog {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self {
            dir: root.as_ref().join("metadata"),
        }
    }

    /// Load every readable metadata document, sorted by creation time
    ///
    /// A missing directory yields an empty catalog. Documents that fail to
    /// parse are logged and skipped.
    pub fn load_all(&self) -> Result<Vec<LegacyObjectMeta>, StorageError> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(StorageError::IoError(e)),
        };

        let mut metas = Vec::new();
        for entry in entries {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }

            let bytes = fs::read(&path)?;
            match serde_json::from_slice::<LegacyObjectMeta>(&bytes) {
                Ok(meta) => metas.push(meta),
                Err(e) => {
                    tracing::warn!(path = ?path, error = %e, "Skipping unreadable legacy metadata");
                }
            }
        }

        metas.sort_by(|a, b| a.created.cmp(&b.created).then_with(|| a.id.cmp(&b.id)));
        Ok(metas)
    }
}
