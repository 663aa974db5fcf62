//! State survives closing and reopening the store

use reify::{RealityCompiler, RelationFilter};
use tempfile::TempDir;

use crate::integration::{declare_tool, node_names, script};

#[test]
fn test_reopen_restores_index_and_edges() {
    let test_dir = TempDir::new().unwrap();
    let root = test_dir.path().join("store");

    let (analyzer, csv, json) = {
        let compiler = RealityCompiler::open_at(&root).unwrap();
        let analyzer = declare_tool(&compiler, "log-analyzer", &["logs", "analysis"]);
        let csv = declare_tool(&compiler, "csv-cleaner", &["csv", "clean"]);
        let json = declare_tool(&compiler, "json-cleaner", &["json", "clean"]);
        (analyzer.relation, csv.relation, json.relation)
    };

    let compiler = RealityCompiler::open_at(&root).unwrap();
    assert_eq!(compiler.list_relations(&RelationFilter::All).len(), 4);
    assert_eq!(compiler.get_metadata("log-analyzer").unwrap(), analyzer);

    let spawned = compiler.resolve_path("/tools/spawned-by/log-analyzer").unwrap();
    assert_eq!(node_names(&spawned), vec!["view-log-analyzer"]);

    let similar = compiler.resolve_path(&format!("/tools/similar/{}", csv.id)).unwrap();
    assert_eq!(node_names(&similar), vec!["json-cleaner"]);
    assert_eq!(similar[0].relation_id.as_ref(), Some(&json.id));

    let command = compiler.resolve_path("/commands/csv-cleaner").unwrap();
    assert_eq!(
        compiler.read_object(&command[0].object.unwrap()).unwrap(),
        script("csv-cleaner")
    );
}

#[test]
fn test_tombstones_survive_reopen() {
    let test_dir = TempDir::new().unwrap();
    let root = test_dir.path().join("store");

    let analyzer_id = {
        let compiler = RealityCompiler::open_at(&root).unwrap();
        let analyzer = declare_tool(&compiler, "log-analyzer", &["logs", "analysis"]);
        compiler.delete_relation(&analyzer.relation.id).unwrap();
        analyzer.relation.id
    };

    let compiler = RealityCompiler::open_at(&root).unwrap();
    assert!(compiler.get_metadata(analyzer_id.as_str()).is_err());
    assert!(compiler
        .resolve_path("/tools/view-log-analyzer/parents")
        .unwrap()
        .is_empty());

    // The freed name can be declared again after a restart
    let again = declare_tool(&compiler, "log-analyzer", &["logs"]);
    assert_ne!(again.relation.id, analyzer_id);
}
