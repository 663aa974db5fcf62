//! By-date view merging relations with legacy content objects

use chrono::Utc;
use reify::object::ObjectStore;
use reify::types::hash_to_hex;
use reify::RealityCompiler;
use std::fs;
use std::path::Path;
use tempfile::TempDir;

use crate::integration::{declare_tool, node_names};

fn write_legacy(root: &Path, bytes: &[u8], created: &str, paths: &[&str], title: &str) -> [u8; 32] {
    let objects = ObjectStore::new(root).unwrap();
    let hash = objects.put(bytes).unwrap();
    let id = hash_to_hex(&hash);

    let dir = root.join("metadata");
    fs::create_dir_all(&dir).unwrap();
    let doc = serde_json::json!({
        "id": id,
        "type": "note",
        "title": title,
        "paths": paths,
        "created": created,
    });
    fs::write(dir.join(format!("{}.json", id)), doc.to_string()).unwrap();
    hash
}

#[test]
fn test_legacy_objects_listed_by_date() {
    let test_dir = TempDir::new().unwrap();
    let root = test_dir.path().join("store");
    let hash = write_legacy(
        &root,
        b"standup notes",
        "2024-01-15T09:30:00Z",
        &["/notes/standup", "/by-date/2024-01-15/standup.md"],
        "Standup",
    );

    let compiler = RealityCompiler::open_at(&root).unwrap();
    declare_tool(&compiler, "fmt", &["format"]);

    let dates = compiler.resolve_path("/by-date/").unwrap();
    let today = Utc::now().date_naive().format("%Y-%m-%d").to_string();
    assert_eq!(node_names(&dates), vec!["2024-01-15", today.as_str()]);

    let day = compiler.resolve_path("/by-date/2024-01-15").unwrap();
    assert_eq!(node_names(&day), vec!["standup.md"]);
    assert!(day[0].relation_id.is_none());
    assert_eq!(day[0].object, Some(hash));
    assert_eq!(compiler.read_object(&hash).unwrap(), b"standup notes");

    let leaf = compiler.resolve_path("/by-date/2024-01-15/standup.md").unwrap();
    assert_eq!(leaf[0].object, Some(hash));
}

#[test]
fn test_relation_shadows_legacy_object_with_same_name() {
    let test_dir = TempDir::new().unwrap();
    let root = test_dir.path().join("store");
    let created = Utc::now().to_rfc3339();
    write_legacy(&root, b"old fmt notes", &created, &[], "fmt");
    write_legacy(&root, b"other", &created, &[], "journal");

    let compiler = RealityCompiler::open_at(&root).unwrap();
    let tool = declare_tool(&compiler, "fmt", &["format"]);

    let today = Utc::now().date_naive().format("%Y-%m-%d").to_string();
    let day = compiler.resolve_path(&format!("/by-date/{}", today)).unwrap();
    assert_eq!(node_names(&day), vec!["fmt", "journal"]);
    assert_eq!(day[0].relation_id.as_ref(), Some(&tool.relation.id));
    assert_eq!(day[0].object, tool.relation.content);
}

#[test]
fn test_legacy_title_with_separator_is_resolvable() {
    let test_dir = TempDir::new().unwrap();
    let root = test_dir.path().join("store");
    let hash = write_legacy(&root, b"plan", "2024-03-01T10:00:00Z", &[], "Q3/Q4 plan");

    let compiler = RealityCompiler::open_at(&root).unwrap();
    let day = compiler.resolve_path("/by-date/2024-03-01").unwrap();
    assert_eq!(node_names(&day), vec!["Q3-Q4 plan"]);

    let leaf = compiler.resolve_path("/by-date/2024-03-01/Q3-Q4 plan").unwrap();
    assert_eq!(leaf[0].object, Some(hash));
}

#[test]
fn test_verify_skips_objects_keyed_by_older_digest() {
    let test_dir = TempDir::new().unwrap();
    let root = test_dir.path().join("store");

    // Older stores keyed objects by another digest, so the bytes never
    // re-hash to the key
    let foreign = [0x5au8; 32];
    let objects = ObjectStore::new(&root).unwrap();
    let path = objects.path_of(&foreign);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(&path, b"sha-256 era notes").unwrap();
    let dir = root.join("metadata");
    fs::create_dir_all(&dir).unwrap();
    let doc = serde_json::json!({
        "id": hash_to_hex(&foreign),
        "type": "note",
        "title": "notes",
        "created": "2024-01-15T09:30:00Z",
    });
    fs::write(dir.join(format!("{}.json", hash_to_hex(&foreign))), doc.to_string()).unwrap();

    let compiler = RealityCompiler::open_at(&root).unwrap();
    let tool = declare_tool(&compiler, "fmt", &["format"]);
    assert!(compiler.verify_objects().unwrap().is_empty());
    assert_eq!(compiler.read_object(&foreign).unwrap(), b"sha-256 era notes");

    let content = tool.relation.content.unwrap();
    fs::write(objects.path_of(&content), b"tampered").unwrap();
    assert_eq!(compiler.verify_objects().unwrap(), vec![content]);
}
