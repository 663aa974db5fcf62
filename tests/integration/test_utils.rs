//! Shared test utilities for integration tests
//!
//! Centralizes compiler setup and environment isolation so individual test
//! modules stay focused on behaviour.

use reify::{DeclareOutcome, RealityCompiler, RelationProperties};
use std::sync::Mutex;
use tempfile::TempDir;

/// Global mutex to serialize environment variable access across all tests
static ENV_MUTEX: Mutex<()> = Mutex::new(());

/// Environment variable state to restore after test
struct EnvState {
    vars: Vec<(&'static str, Option<String>)>,
}

impl EnvState {
    fn capture(names: &[&'static str]) -> Self {
        Self {
            vars: names.iter().map(|name| (*name, std::env::var(name).ok())).collect(),
        }
    }

    fn restore(self) {
        for (name, value) in self.vars {
            match value {
                Some(orig) => std::env::set_var(name, orig),
                None => std::env::remove_var(name),
            }
        }
    }
}

/// Run `f` with `XDG_CONFIG_HOME` pointed at the test dir and every
/// `REIFY_*` variable the loader reads cleared, restoring them afterwards
pub fn with_isolated_env<F, R>(test_dir: &TempDir, f: F) -> R
where
    F: FnOnce() -> R,
{
    let _guard = ENV_MUTEX.lock().unwrap_or_else(|e| e.into_inner());
    let env_state = EnvState::capture(&[
        "XDG_CONFIG_HOME",
        "REIFY_ENV",
        "REIFY_STORAGE__ROOT",
        "REIFY_RULES__ENABLED",
        "REIFY_RULES__SIMILARITY_THRESHOLD",
        "REIFY_INDEX__ANCESTRY_DEPTH",
    ]);

    let config_home = test_dir.path().join("xdg");
    std::fs::create_dir_all(&config_home).unwrap();
    std::env::set_var("XDG_CONFIG_HOME", config_home.to_str().unwrap());
    for name in [
        "REIFY_ENV",
        "REIFY_STORAGE__ROOT",
        "REIFY_RULES__ENABLED",
        "REIFY_RULES__SIMILARITY_THRESHOLD",
        "REIFY_INDEX__ANCESTRY_DEPTH",
    ] {
        std::env::remove_var(name);
    }

    let result = f();

    env_state.restore();

    result
}

/// Compiler rooted in a fresh temp dir with default rules
pub fn open_compiler(test_dir: &TempDir) -> RealityCompiler {
    RealityCompiler::open_at(test_dir.path().join("store")).unwrap()
}

/// Implementation bytes for a tool
pub fn script(name: &str) -> Vec<u8> {
    format!("#!/bin/sh\n# {}\necho \"{} $@\"\n", name, name).into_bytes()
}

pub fn declare_tool(compiler: &RealityCompiler, name: &str, transforms: &[&str]) -> DeclareOutcome {
    compiler
        .declare_relation(RelationProperties::tool(name, transforms), Some(script(name)))
        .unwrap()
}

pub fn node_names(nodes: &[reify::VirtualNode]) -> Vec<&str> {
    nodes.iter().map(|n| n.name.as_str()).collect()
}
