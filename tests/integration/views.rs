//! Every view of a relation resolves to the same canonical object

use chrono::Utc;
use reify::vfs::NodeKind;
use reify::{ApiError, RelationProperties};
use tempfile::TempDir;

use crate::integration::{declare_tool, node_names, open_compiler, script};

#[test]
fn test_tool_views_share_one_object() {
    let test_dir = TempDir::new().unwrap();
    let compiler = open_compiler(&test_dir);

    let tools = [
        ("log-analyzer", vec!["logs", "analysis"]),
        ("csv-cleaner", vec!["csv", "clean"]),
        ("json-cleaner", vec!["json", "clean"]),
    ];
    for (name, transforms) in &tools {
        declare_tool(&compiler, name, transforms);
    }

    let today = Utc::now().date_naive().format("%Y-%m-%d").to_string();
    let snapshot = compiler.snapshot();

    for tool in snapshot.live_tools() {
        let name = tool.name();
        let by_name = compiler.resolve_path(&format!("/tools/by-name/{}", name)).unwrap();
        let command = compiler.resolve_path(&format!("/commands/{}", name)).unwrap();
        let executable = compiler.resolve_path(&format!("/tools/{}/executable", name)).unwrap();
        let dated = compiler.resolve_path(&format!("/by-date/{}/{}", today, name)).unwrap();

        let object = by_name[0].object.unwrap();
        assert_eq!(command[0].object, Some(object), "{}", name);
        assert_eq!(executable[0].object, Some(object), "{}", name);
        assert_eq!(dated[0].object, Some(object), "{}", name);
        assert_eq!(Some(object), tool.content);

        let bytes = compiler.read_object(&object).unwrap();
        assert_eq!(bytes, std::fs::read(compiler.commands_dir().join(name)).unwrap());
    }

    // Spawned viewer is listed everywhere too
    assert_eq!(snapshot.live_tools().len(), 4);
}

#[test]
fn test_definition_is_relation_body() {
    let test_dir = TempDir::new().unwrap();
    let compiler = open_compiler(&test_dir);
    let outcome = declare_tool(&compiler, "fmt", &["format"]);

    let definition = compiler.resolve_path("/tools/fmt/definition").unwrap();
    assert_eq!(definition.len(), 1);
    let body = compiler.read_object(&definition[0].object.unwrap()).unwrap();
    let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["id"], outcome.relation.id.as_str());
    assert_eq!(json["properties"]["kind"], "tool");
    assert_eq!(json["properties"]["name"], "fmt");

    let listing = compiler.resolve_path("/tools/fmt/").unwrap();
    assert_eq!(node_names(&listing), vec!["definition", "executable", "parents", "spawned"]);
    assert_eq!(listing[2].kind, NodeKind::Directory);
}

#[test]
fn test_root_and_tool_listings() {
    let test_dir = TempDir::new().unwrap();
    let compiler = open_compiler(&test_dir);
    declare_tool(&compiler, "log-analyzer", &["logs", "analysis"]);

    let root = compiler.resolve_path("/").unwrap();
    assert_eq!(node_names(&root), vec!["tools", "commands", "artifacts", "by-date"]);
    assert!(root.iter().all(|n| n.kind == NodeKind::Directory && n.relation_id.is_none()));

    let tools = compiler.resolve_path("/tools").unwrap();
    assert_eq!(
        node_names(&tools),
        vec![
            "by-name",
            "by-transform",
            "spawned-by",
            "similar",
            "ancestry",
            "log-analyzer",
            "view-log-analyzer"
        ]
    );

    let tags = compiler.resolve_path("/tools/by-transform/").unwrap();
    assert_eq!(node_names(&tags), vec!["analysis", "display", "logs", "view"]);
    let analysis = compiler.resolve_path("/tools/by-transform/analysis").unwrap();
    assert_eq!(node_names(&analysis), vec!["log-analyzer"]);

    let spawners = compiler.resolve_path("/tools/spawned-by").unwrap();
    assert_eq!(node_names(&spawners), vec!["log-analyzer"]);

    let ancestry = compiler.resolve_path("/tools/ancestry").unwrap();
    assert_eq!(node_names(&ancestry), vec!["view-log-analyzer"]);
    let parents = compiler.resolve_path("/tools/view-log-analyzer/parents").unwrap();
    assert_eq!(node_names(&parents), vec!["log-analyzer"]);
}

#[test]
fn test_memory_links_stay_out_of_commands() {
    let test_dir = TempDir::new().unwrap();
    let compiler = open_compiler(&test_dir);
    let tool = declare_tool(&compiler, "fmt", &["format"]);
    compiler
        .declare_relation(
            RelationProperties::memory_link("fmt-notes", "session-7", Some(tool.relation.id.clone())),
            None,
        )
        .unwrap();

    let commands = compiler.resolve_path("/commands/").unwrap();
    assert_eq!(node_names(&commands), vec!["fmt"]);
    assert!(matches!(
        compiler.resolve_path("/commands/fmt-notes"),
        Err(ApiError::NotFound(_))
    ));

    // Memory links have no date entry either
    let today = Utc::now().date_naive().format("%Y-%m-%d").to_string();
    let dated = compiler.resolve_path(&format!("/by-date/{}", today)).unwrap();
    assert_eq!(node_names(&dated), vec!["fmt"]);
}

#[test]
fn test_unknown_paths_are_not_found() {
    let test_dir = TempDir::new().unwrap();
    let compiler = open_compiler(&test_dir);
    compiler
        .declare_relation(RelationProperties::tool("fmt", &["format"]), Some(script("fmt")))
        .unwrap();

    for path in [
        "/nowhere",
        "/tools/missing",
        "/tools/fmt/bogus",
        "/tools/by-transform/none",
        "/commands/fmt/extra",
        "/artifacts/none",
        "/by-date/not-a-date",
        "relative/path",
    ] {
        assert!(
            matches!(compiler.resolve_path(path), Err(ApiError::NotFound(_))),
            "{}",
            path
        );
    }
}

#[test]
fn test_artifact_views() {
    let test_dir = TempDir::new().unwrap();
    let compiler = open_compiler(&test_dir);
    let body = b"name,score\nada,3\n".to_vec();
    let outcome = compiler
        .declare_relation(
            RelationProperties::artifact("scores.csv", "datasets", "csv"),
            Some(body.clone()),
        )
        .unwrap();

    let entity = outcome.status.entity().unwrap();
    assert_eq!(entity.path, compiler.artifacts_dir().join("datasets").join("scores.csv"));
    assert!(!entity.is_executable);
    assert_eq!(std::fs::read(&entity.path).unwrap(), body);

    let subtypes = compiler.resolve_path("/artifacts").unwrap();
    assert_eq!(node_names(&subtypes), vec!["datasets"]);
    let leaf = compiler.resolve_path("/artifacts/datasets/scores.csv").unwrap();
    assert_eq!(compiler.read_object(&leaf[0].object.unwrap()).unwrap(), body);
    assert!(compiler.resolve_path("/tools/by-name/scores.csv").is_err());
}

#[test]
fn test_tools_view_names_are_reserved() {
    let test_dir = TempDir::new().unwrap();
    let compiler = open_compiler(&test_dir);

    let result = compiler.declare_relation(
        RelationProperties::tool("similar", &["diff"]),
        Some(script("similar")),
    );
    assert!(matches!(result, Err(ApiError::InvalidRelation(_))));

    // Non-tools never appear under /tools, so the name is free for them
    let report = compiler
        .declare_relation(
            RelationProperties::artifact("similar", "report", "csv"),
            Some(b"a,b\n".to_vec()),
        )
        .unwrap();
    assert!(compiler.resolve_path("/tools/similar").unwrap().is_empty());
    assert!(matches!(
        compiler.resolve_path(&format!("/tools/{}", report.relation.id)),
        Err(ApiError::NotFound(_))
    ));
    assert_eq!(
        node_names(&compiler.resolve_path("/artifacts/report").unwrap()),
        vec!["similar"]
    );
}
