//! Merge rules: defaults, override order, conflict handling.
//!
//! Later sources override earlier ones key by key:
//! defaults < global file < workspace files < environment.

use crate::config::default_storage_root;
use crate::index::DEFAULT_ANCESTRY_DEPTH;
use crate::similarity::SIMILARITY_THRESHOLD;
use config::Config;
use config::ConfigBuilder;
use config::ConfigError;

/// Create a Config builder with merge policy defaults applied.
pub fn builder_with_defaults() -> Result<ConfigBuilder<config::builder::DefaultState>, ConfigError>
{
    Config::builder()
        .set_default(
            "storage.root",
            default_storage_root().to_string_lossy().into_owned(),
        )?
        .set_default("rules.similarity_threshold", SIMILARITY_THRESHOLD)?
        .set_default("index.ancestry_depth", DEFAULT_ANCESTRY_DEPTH as i64)
}
