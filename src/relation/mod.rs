//! Relations: typed declarations of intent
//!
//! A relation says "there should be a tool named X with transforms Y" or
//! "there is an artifact Z". Relations are immutable once created; the only
//! lifecycle change is a tombstone.

pub mod id;
pub mod store;

pub use id::{compute_relation_id, CreationNonce};
pub use store::{NewRelation, RelationFilter, RelationRecord, RelationStore};

use crate::error::ApiError;
use crate::types::{hex_hash, Hash, RelationId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use unicode_normalization::UnicodeNormalization;

/// Directory names under `/tools/` that a tool name would otherwise shadow
pub const RESERVED_TOOL_NAMES: [&str; 5] = ["by-name", "by-transform", "spawned-by", "similar", "ancestry"];

/// Closed set of relation kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RelationKind {
    Tool,
    Artifact,
    MemoryLink,
}

impl RelationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RelationKind::Tool => "tool",
            RelationKind::Artifact => "artifact",
            RelationKind::MemoryLink => "memory-link",
        }
    }
}

impl fmt::Display for RelationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolProperties {
    pub name: String,
    #[serde(default)]
    pub transforms: Vec<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extensions: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactProperties {
    pub name: String,
    pub subtype: String,
    #[serde(default)]
    pub format: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extensions: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryLinkProperties {
    pub name: String,
    pub session: String,
    #[serde(default)]
    pub target: Option<RelationId>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extensions: BTreeMap<String, String>,
}

/// Kind-specific properties. The variant determines the kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum RelationProperties {
    Tool(ToolProperties),
    Artifact(ArtifactProperties),
    MemoryLink(MemoryLinkProperties),
}

impl RelationProperties {
    pub fn tool(name: impl Into<String>, transforms: &[&str]) -> Self {
        RelationProperties::Tool(ToolProperties {
            name: name.into(),
            transforms: transforms.iter().map(|t| t.to_string()).collect(),
            extensions: BTreeMap::new(),
        })
    }

    pub fn artifact(
        name: impl Into<String>,
        subtype: impl Into<String>,
        format: impl Into<String>,
    ) -> Self {
        RelationProperties::Artifact(ArtifactProperties {
            name: name.into(),
            subtype: subtype.into(),
            format: format.into(),
            extensions: BTreeMap::new(),
        })
    }

    pub fn memory_link(
        name: impl Into<String>,
        session: impl Into<String>,
        target: Option<RelationId>,
    ) -> Self {
        RelationProperties::MemoryLink(MemoryLinkProperties {
            name: name.into(),
            session: session.into(),
            target,
            extensions: BTreeMap::new(),
        })
    }

    pub fn kind(&self) -> RelationKind {
        match self {
            RelationProperties::Tool(_) => RelationKind::Tool,
            RelationProperties::Artifact(_) => RelationKind::Artifact,
            RelationProperties::MemoryLink(_) => RelationKind::MemoryLink,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            RelationProperties::Tool(p) => &p.name,
            RelationProperties::Artifact(p) => &p.name,
            RelationProperties::MemoryLink(p) => &p.name,
        }
    }

    /// Transform tags; empty for anything but tools
    pub fn transforms(&self) -> &[String] {
        match self {
            RelationProperties::Tool(p) => &p.transforms,
            _ => &[],
        }
    }

    pub fn extensions(&self) -> &BTreeMap<String, String> {
        match self {
            RelationProperties::Tool(p) => &p.extensions,
            RelationProperties::Artifact(p) => &p.extensions,
            RelationProperties::MemoryLink(p) => &p.extensions,
        }
    }

    /// Canonical form: NFC names, trimmed lowercase deduplicated tags
    pub fn normalized(self) -> Result<Self, ApiError> {
        Ok(match self {
            RelationProperties::Tool(p) => {
                let name = normalize_name(&p.name)?;
                if RESERVED_TOOL_NAMES.contains(&name.as_str()) {
                    return Err(ApiError::InvalidRelation(format!(
                        "tool name '{}' is reserved for a /tools view",
                        name
                    )));
                }
                RelationProperties::Tool(ToolProperties {
                    name,
                    transforms: normalize_tags(&p.transforms),
                    extensions: p.extensions,
                })
            }
            RelationProperties::Artifact(p) => {
                let subtype = normalize_name(&p.subtype)
                    .map_err(|_| ApiError::InvalidRelation(format!("invalid subtype '{}'", p.subtype)))?;
                RelationProperties::Artifact(ArtifactProperties {
                    name: normalize_name(&p.name)?,
                    subtype,
                    format: p.format.trim().to_lowercase(),
                    extensions: p.extensions,
                })
            }
            RelationProperties::MemoryLink(p) => {
                RelationProperties::MemoryLink(MemoryLinkProperties {
                    name: normalize_name(&p.name)?,
                    session: p.session.trim().to_string(),
                    target: p.target,
                    extensions: p.extensions,
                })
            }
        })
    }
}

/// A persisted relation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Relation {
    pub id: RelationId,
    pub properties: RelationProperties,
    #[serde(default)]
    pub parent_id: Option<RelationId>,
    #[serde(default)]
    pub auto_spawned: bool,
    pub created_at: DateTime<Utc>,
    /// Implementation bytes (script, document body) in the object store
    #[serde(default, with = "hex_hash::option")]
    pub content: Option<Hash>,
}

impl Relation {
    pub fn kind(&self) -> RelationKind {
        self.properties.kind()
    }

    pub fn name(&self) -> &str {
        self.properties.name()
    }

    pub fn transforms(&self) -> &[String] {
        self.properties.transforms()
    }

    /// Declared directly by a caller rather than spawned by a rule
    pub fn is_primary(&self) -> bool {
        !self.auto_spawned
    }
}

/// Validate and NFC-normalize a relation name
///
/// Names become path segments, so separators, NUL and the dot entries are
/// rejected.
pub fn normalize_name(raw: &str) -> Result<String, ApiError> {
    let name: String = raw.trim().nfc().collect();
    if name.is_empty() {
        return Err(ApiError::InvalidRelation("name must not be empty".to_string()));
    }
    if name == "." || name == ".." {
        return Err(ApiError::InvalidRelation(format!("name '{}' is reserved", name)));
    }
    if name.contains('/') || name.chars().any(char::is_control) {
        return Err(ApiError::InvalidRelation(format!(
            "name '{}' contains a path separator or control character",
            name.escape_default()
        )));
    }
    Ok(name)
}

/// Trim, lowercase and deduplicate tags, keeping first-seen order
pub fn normalize_tags<S: AsRef<str>>(tags: &[S]) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(tags.len());
    for tag in tags {
        let tag: String = tag.as_ref().trim().nfc().collect::<String>().to_lowercase();
        if !tag.is_empty() && !out.contains(&tag) {
            out.push(tag);
        }
    }
    out
}
