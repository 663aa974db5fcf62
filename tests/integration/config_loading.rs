//! Layered configuration loading

use reify::config::global_config_path;
use reify::{ConfigLoader, RealityCompiler, RelationProperties};
use std::fs;
use std::path::PathBuf;
use tempfile::TempDir;

use crate::integration::{script, with_isolated_env};

#[test]
fn test_defaults_without_any_files() {
    let test_dir = TempDir::new().unwrap();
    with_isolated_env(&test_dir, || {
        let config = ConfigLoader::load(test_dir.path()).unwrap();
        assert_eq!(config.rules.enabled.len(), 3);
        assert_eq!(config.index.ancestry_depth, 16);
        assert!(config.validate().is_ok());
    });
}

#[test]
fn test_precedence_global_workspace_env() {
    let test_dir = TempDir::new().unwrap();
    with_isolated_env(&test_dir, || {
        let global = global_config_path().unwrap();
        assert!(global.starts_with(test_dir.path()));
        fs::create_dir_all(global.parent().unwrap()).unwrap();
        fs::write(
            &global,
            "[storage]\nroot = \"/from/global\"\n[index]\nancestry_depth = 3\n[rules]\nsimilarity_threshold = 0.9\n",
        )
        .unwrap();

        let workspace = test_dir.path().join("workspace");
        fs::create_dir_all(workspace.join("config")).unwrap();
        fs::write(
            workspace.join("config").join("config.toml"),
            "[index]\nancestry_depth = 5\n[logging]\nlevel = \"debug\"\n",
        )
        .unwrap();
        fs::write(
            workspace.join("config").join("development.toml"),
            "[index]\nancestry_depth = 7\n",
        )
        .unwrap();

        std::env::set_var("REIFY_RULES__SIMILARITY_THRESHOLD", "0.25");
        std::env::set_var("REIFY_RULES__ENABLED", "spawn-viewer,link-similar");

        let config = ConfigLoader::load(&workspace).unwrap();
        assert_eq!(config.storage.root, PathBuf::from("/from/global"));
        assert_eq!(config.index.ancestry_depth, 7);
        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.rules.similarity_threshold, 0.25);
        assert_eq!(config.rules.enabled, vec!["spawn-viewer", "link-similar"]);
    });
}

#[test]
fn test_loaded_config_drives_compiler() {
    let test_dir = TempDir::new().unwrap();
    with_isolated_env(&test_dir, || {
        let workspace = test_dir.path().join("workspace");
        fs::create_dir_all(workspace.join("config")).unwrap();
        let root = test_dir.path().join("data");
        fs::write(
            workspace.join("config").join("config.toml"),
            format!(
                "[storage]\nroot = {:?}\ncommands_dir = {:?}\n[rules]\nenabled = [\"link-similar\"]\n",
                root.to_str().unwrap(),
                test_dir.path().join("bin").to_str().unwrap()
            ),
        )
        .unwrap();

        let config = ConfigLoader::load(&workspace).unwrap();
        let compiler = RealityCompiler::open(&config).unwrap();
        assert_eq!(compiler.rule_ids(), vec!["link-similar"]);
        assert_eq!(compiler.commands_dir(), test_dir.path().join("bin").as_path());

        let outcome = compiler
            .declare_relation(
                RelationProperties::tool("log-analyzer", &["logs", "analysis"]),
                Some(script("log-analyzer")),
            )
            .unwrap();
        assert!(outcome.spawned.is_empty());
        assert!(test_dir.path().join("bin").join("log-analyzer").exists());
        assert!(root.join("relations").exists());
    });
}
