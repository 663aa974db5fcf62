//! Configuration loader: assembles sources and deserializes the result.

use crate::config::merge::merge_policy;
use crate::config::sources::{env, global_file, workspace_file};
use crate::config::ReifyConfig;
use config::{ConfigError, File};
use std::path::{Path, PathBuf};

pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration for a workspace
    ///
    /// Order (later wins): defaults, global file, `config/config.toml`,
    /// `config/{REIFY_ENV}.toml`, `REIFY_*` environment variables.
    pub fn load(workspace_root: &Path) -> Result<ReifyConfig, ConfigError> {
        let builder = merge_policy::builder_with_defaults()?;
        let builder = global_file::add_to_builder(builder)?;
        let builder = workspace_file::add_to_builder(builder, workspace_root)?;
        let builder = env::add_to_builder(builder);

        let config: ReifyConfig = builder.build()?.try_deserialize()?;
        tracing::debug!(root = ?config.storage.root, "Loaded configuration");
        Ok(config)
    }

    /// Load configuration from a single TOML file on top of the defaults
    pub fn load_from_file(path: &Path) -> Result<ReifyConfig, ConfigError> {
        merge_policy::builder_with_defaults()?
            .add_source(File::from(path))
            .build()?
            .try_deserialize()
    }

    /// Global config file location, whether or not it exists
    pub fn xdg_config_path() -> Option<PathBuf> {
        global_file::global_config_path()
    }
}
