//! Caller-supplied rules running through the compiler

use reify::relation::{ArtifactProperties, Relation, RelationKind, RelationProperties};
use reify::rules::{RelationDraft, RuleContext, RuleOutcome, SpawnDocs, SpawnViewer};
use reify::{ReifyConfig, RealityCompiler, Rule, RuleError, RulesEngine};
use std::collections::BTreeMap;
use std::fs;
use tempfile::TempDir;

use crate::integration::script;

/// Fails whenever it fires
struct CatalogLookup;

impl Rule for CatalogLookup {
    fn id(&self) -> &'static str {
        "catalog-lookup"
    }

    fn name(&self) -> &'static str {
        "Look tools up in a remote catalog"
    }

    fn priority(&self) -> u32 {
        1
    }

    fn condition(&self, _relation: &Relation) -> bool {
        true
    }

    fn action(&self, _relation: &Relation, _ctx: &RuleContext<'_>) -> Result<RuleOutcome, RuleError> {
        Err(RuleError::Action("catalog unavailable".to_string()))
    }
}

/// Panics whenever it fires
struct Broken;

impl Rule for Broken {
    fn id(&self) -> &'static str {
        "broken"
    }

    fn name(&self) -> &'static str {
        "Rule with a bug"
    }

    fn priority(&self) -> u32 {
        5
    }

    fn condition(&self, relation: &Relation) -> bool {
        relation.kind() == RelationKind::Tool
    }

    fn action(&self, relation: &Relation, _ctx: &RuleContext<'_>) -> Result<RuleOutcome, RuleError> {
        panic!("no handler for {}", relation.name())
    }
}

/// Gives every tool a changelog artifact
struct SpawnChangelog;

impl Rule for SpawnChangelog {
    fn id(&self) -> &'static str {
        "spawn-changelog"
    }

    fn name(&self) -> &'static str {
        "Spawn a changelog for every tool"
    }

    fn priority(&self) -> u32 {
        50
    }

    fn condition(&self, relation: &Relation) -> bool {
        relation.kind() == RelationKind::Tool
    }

    fn action(&self, relation: &Relation, _ctx: &RuleContext<'_>) -> Result<RuleOutcome, RuleError> {
        Ok(RuleOutcome {
            spawn: vec![RelationDraft {
                properties: RelationProperties::Artifact(ArtifactProperties {
                    name: format!("{}-changelog", relation.name()),
                    subtype: "changelog".to_string(),
                    format: "markdown".to_string(),
                    extensions: BTreeMap::new(),
                }),
                content: Some(format!("# {}\n\n- initial version\n", relation.name()).into_bytes()),
            }],
            links: Vec::new(),
        })
    }
}

fn open_with(test_dir: &TempDir, rules: Vec<Box<dyn Rule>>) -> RealityCompiler {
    let config = ReifyConfig::at_root(test_dir.path().join("store"));
    RealityCompiler::open_with_rules(&config, RulesEngine::new(rules)).unwrap()
}

#[test]
fn test_failing_and_panicking_rules_become_warnings() {
    let test_dir = TempDir::new().unwrap();
    let compiler = open_with(
        &test_dir,
        vec![
            Box::new(SpawnViewer),
            Box::new(Broken),
            Box::new(SpawnChangelog),
            Box::new(CatalogLookup),
            Box::new(SpawnDocs),
        ],
    );
    assert_eq!(
        compiler.rule_ids(),
        vec!["catalog-lookup", "broken", "spawn-viewer", "spawn-docs", "spawn-changelog"]
    );

    let outcome = compiler
        .declare_relation(
            RelationProperties::tool("etl", &["extract", "transform", "analysis"]),
            Some(script("etl")),
        )
        .unwrap();

    // The primary is stored and materialized despite the failures
    assert!(outcome.status.is_materialized());
    assert_eq!(fs::read(compiler.commands_dir().join("etl")).unwrap(), script("etl"));
    assert_eq!(compiler.get_metadata("etl").unwrap().id, outcome.relation.id);

    let spawned: Vec<&str> = outcome.spawned.iter().map(|r| r.name()).collect();
    assert_eq!(spawned, vec!["view-etl", "etl-docs", "etl-changelog"]);
    assert!(compiler
        .artifacts_dir()
        .join("changelog")
        .join("etl-changelog")
        .is_file());

    assert_eq!(outcome.warnings.len(), 2, "{:?}", outcome.warnings);
    assert_eq!(outcome.warnings[0].source, "catalog-lookup");
    assert!(outcome.warnings[0].message.contains("catalog unavailable"));
    assert_eq!(outcome.warnings[1].source, "broken");
    assert!(outcome.warnings[1].message.contains("no handler for etl"));
}

#[test]
fn test_custom_rules_skip_spawned_children() {
    let test_dir = TempDir::new().unwrap();
    let compiler = open_with(&test_dir, vec![Box::new(SpawnViewer), Box::new(SpawnChangelog)]);

    let outcome = compiler
        .declare_relation(
            RelationProperties::tool("log-analyzer", &["logs", "analysis"]),
            Some(script("log-analyzer")),
        )
        .unwrap();

    // The viewer is a tool too, but spawned relations are never evaluated
    let spawned: Vec<&str> = outcome.spawned.iter().map(|r| r.name()).collect();
    assert_eq!(spawned, vec!["view-log-analyzer", "log-analyzer-changelog"]);
    assert!(compiler.get_metadata("view-log-analyzer-changelog").is_err());
    assert!(outcome.warnings.is_empty());
}
