//! Configuration System
//!
//! Layered configuration for the compiler: built-in defaults, a global file,
//! workspace files and `REIFY_*` environment variables, merged by the
//! `config` crate and deserialized into [`ReifyConfig`].

use crate::logging::LoggingConfig;
use crate::rules::catalogue::BUILTIN_RULE_IDS;
use crate::similarity::SIMILARITY_THRESHOLD;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

mod facade;
mod merge;
mod sources;

pub use facade::ConfigLoader;
pub use sources::global_file::global_config_path;

/// Platform data directory for the store, or `.reify` when none is known
pub fn default_storage_root() -> PathBuf {
    directories::ProjectDirs::from("", "", "reify")
        .map(|dirs| dirs.data_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from(".reify"))
}

/// Root configuration structure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ReifyConfig {
    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub rules: RulesConfig,

    #[serde(default)]
    pub index: IndexConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Where the store lives on disk
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Data root holding objects/, relations/, index/ and metadata/
    #[serde(default = "default_storage_root")]
    pub root: PathBuf,

    /// Directory of executable command links (default `{root}/commands`)
    #[serde(default)]
    pub commands_dir: Option<PathBuf>,

    /// Directory of materialized artifacts (default `{root}/artifacts`)
    #[serde(default)]
    pub artifacts_dir: Option<PathBuf>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            root: default_storage_root(),
            commands_dir: None,
            artifacts_dir: None,
        }
    }
}

impl StorageConfig {
    pub fn at_root<P: AsRef<Path>>(root: P) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
            commands_dir: None,
            artifacts_dir: None,
        }
    }

    pub fn commands_path(&self) -> PathBuf {
        self.commands_dir
            .clone()
            .unwrap_or_else(|| self.root.join("commands"))
    }

    pub fn artifacts_path(&self) -> PathBuf {
        self.artifacts_dir
            .clone()
            .unwrap_or_else(|| self.root.join("artifacts"))
    }

    pub fn edges_path(&self) -> PathBuf {
        self.root.join("index").join("edges")
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.root.as_os_str().is_empty() {
            return Err("Storage root cannot be empty".to_string());
        }
        for (label, dir) in [("commands_dir", &self.commands_dir), ("artifacts_dir", &self.artifacts_dir)] {
            if dir.as_ref().map_or(false, |d| d.as_os_str().is_empty()) {
                return Err(format!("{} cannot be empty when set", label));
            }
        }
        Ok(())
    }
}

fn default_enabled_rules() -> Vec<String> {
    BUILTIN_RULE_IDS.iter().map(|id| id.to_string()).collect()
}

fn default_similarity_threshold() -> f64 {
    SIMILARITY_THRESHOLD
}

/// Rules engine settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RulesConfig {
    /// Built-in rule ids to enable
    #[serde(default = "default_enabled_rules")]
    pub enabled: Vec<String>,

    /// Minimum Jaccard coefficient for a similarity edge
    #[serde(default = "default_similarity_threshold")]
    pub similarity_threshold: f64,
}

impl Default for RulesConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled_rules(),
            similarity_threshold: default_similarity_threshold(),
        }
    }
}

impl RulesConfig {
    pub fn validate(&self) -> Result<(), String> {
        if !(self.similarity_threshold > 0.0 && self.similarity_threshold <= 1.0) {
            return Err(format!(
                "similarity_threshold must be in (0, 1], got {}",
                self.similarity_threshold
            ));
        }
        for id in &self.enabled {
            if !BUILTIN_RULE_IDS.contains(&id.as_str()) {
                return Err(format!("Unknown rule '{}'", id));
            }
        }
        Ok(())
    }
}

fn default_ancestry_depth() -> usize {
    crate::index::DEFAULT_ANCESTRY_DEPTH
}

/// Relationship index settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexConfig {
    /// Maximum stored ancestors per relation
    #[serde(default = "default_ancestry_depth")]
    pub ancestry_depth: usize,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            ancestry_depth: default_ancestry_depth(),
        }
    }
}

/// Configuration validation errors
#[derive(Debug, Clone, PartialEq)]
pub enum ValidationError {
    Storage(String),
    Rules(String),
    Index(String),
    Logging(String),
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValidationError::Storage(msg) => write!(f, "Storage: {}", msg),
            ValidationError::Rules(msg) => write!(f, "Rules: {}", msg),
            ValidationError::Index(msg) => write!(f, "Index: {}", msg),
            ValidationError::Logging(msg) => write!(f, "Logging: {}", msg),
        }
    }
}

impl std::error::Error for ValidationError {}

impl ReifyConfig {
    /// Defaults with the store rooted at `root`
    pub fn at_root<P: AsRef<Path>>(root: P) -> Self {
        Self {
            storage: StorageConfig::at_root(root),
            ..Self::default()
        }
    }

    /// Validate the entire configuration, collecting every problem
    pub fn validate(&self) -> Result<(), Vec<ValidationError>> {
        let mut errors = Vec::new();

        if let Err(e) = self.storage.validate() {
            errors.push(ValidationError::Storage(e));
        }
        if let Err(e) = self.rules.validate() {
            errors.push(ValidationError::Rules(e));
        }
        if self.index.ancestry_depth == 0 {
            errors.push(ValidationError::Index(
                "ancestry_depth must be at least 1".to_string(),
            ));
        }
        if let Err(e) = self.logging.validate() {
            errors.push(ValidationError::Logging(e));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}
