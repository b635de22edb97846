use std::fs;
use std::path::Path;
use tempfile::TempDir;
use wiz::WizError;
use wiz::definition;
use wiz::registry::{self, Registry};

fn write_json(dir: &Path, name: &str, content: serde_json::Value) {
    fs::write(dir.join(name), serde_json::to_string_pretty(&content).unwrap()).unwrap();
}

fn request(input: &str) -> wiz::requirement::Requirement {
    input.parse().unwrap()
}

#[test]
fn discovers_definitions_recursively() {
    let root = TempDir::new().unwrap();
    let nested = root.path().join("film").join("shared");
    fs::create_dir_all(&nested).unwrap();

    write_json(
        root.path(),
        "app.json",
        serde_json::json!({"identifier": "app", "version": "1.0.0"}),
    );
    write_json(
        &nested,
        "lib.json",
        serde_json::json!({"identifier": "lib", "version": "2.0.0"}),
    );

    let registry = Registry::fetch(&[root.path().to_path_buf()], &[], None);
    assert!(registry.query(&request("app")).is_ok());
    assert!(registry.query(&request("lib")).is_ok());
}

#[test]
fn max_depth_bounds_the_search() {
    let root = TempDir::new().unwrap();
    let nested = root.path().join("nested");
    fs::create_dir_all(&nested).unwrap();

    write_json(
        root.path(),
        "app.json",
        serde_json::json!({"identifier": "app", "version": "1.0.0"}),
    );
    write_json(
        &nested,
        "lib.json",
        serde_json::json!({"identifier": "lib", "version": "1.0.0"}),
    );

    let registry = Registry::fetch(&[root.path().to_path_buf()], &[], Some(0));
    assert!(registry.query(&request("app")).is_ok());
    assert!(matches!(
        registry.query(&request("lib")),
        Err(WizError::RequestNotFound(_))
    ));
}

#[test]
fn broken_files_are_skipped_not_fatal() {
    let root = TempDir::new().unwrap();
    fs::write(root.path().join("broken.json"), "{not json").unwrap();
    write_json(
        root.path(),
        "missing-identifier.json",
        serde_json::json!({"version": "1.0.0"}),
    );
    write_json(
        root.path(),
        "bad-requirement.json",
        serde_json::json!({"identifier": "bad", "requirements": ["=="]}),
    );
    write_json(
        root.path(),
        "app.json",
        serde_json::json!({"identifier": "app", "version": "1.0.0"}),
    );

    let registry = Registry::fetch(&[root.path().to_path_buf()], &[], None);
    assert!(registry.query(&request("app")).is_ok());
    assert!(registry.query(&request("bad")).is_err());
}

#[test]
fn disabled_definitions_are_skipped() {
    let root = TempDir::new().unwrap();
    write_json(
        root.path(),
        "app.json",
        serde_json::json!({"identifier": "app", "version": "1.0.0", "disabled": true}),
    );

    let registry = Registry::fetch(&[root.path().to_path_buf()], &[], None);
    assert!(registry.is_empty());
}

#[test]
fn loaded_definitions_record_their_origin() {
    let root = TempDir::new().unwrap();
    write_json(
        root.path(),
        "app.json",
        serde_json::json!({"identifier": "app", "version": "1.0.0"}),
    );

    let registry = Registry::fetch(&[root.path().to_path_buf()], &[], None);
    let candidates = registry.query(&request("app")).unwrap();
    let definition = &candidates[0].definition;

    assert!(definition.registry.is_some());
    let location = definition.definition_location.as_ref().unwrap();
    assert_eq!(location.file_name().unwrap(), "app.json");
}

#[test]
fn requests_narrow_the_fetch() {
    let root = TempDir::new().unwrap();
    write_json(
        root.path(),
        "nuke.json",
        serde_json::json!({
            "identifier": "nuke", "version": "11.2.0",
            "description": "Compositing application"
        }),
    );
    write_json(
        root.path(),
        "maya.json",
        serde_json::json!({
            "identifier": "maya", "version": "2023.0.0",
            "description": "3D application"
        }),
    );

    // Substring match on the identifier.
    let registry = Registry::fetch(&[root.path().to_path_buf()], &[request("nuke")], None);
    assert!(registry.query(&request("nuke")).is_ok());
    assert!(registry.query(&request("maya")).is_err());

    // Substring match on the description.
    let registry = Registry::fetch(
        &[root.path().to_path_buf()],
        &[request("compositing")],
        None,
    );
    assert!(registry.query(&request("nuke")).is_ok());

    // The version must satisfy the request's specifiers as well.
    let registry = Registry::fetch(&[root.path().to_path_buf()], &[request("nuke>=12")], None);
    assert!(registry.is_empty());
}

#[test]
fn implicit_requests_follow_discovery_order() {
    let root = TempDir::new().unwrap();
    write_json(
        root.path(),
        "a-studio.json",
        serde_json::json!({"identifier": "studio", "version": "1.0.0", "auto-use": true}),
    );
    write_json(
        root.path(),
        "b-site.json",
        serde_json::json!({"identifier": "site", "version": "0.5.0", "auto-use": true}),
    );
    write_json(
        root.path(),
        "c-app.json",
        serde_json::json!({"identifier": "app", "version": "1.0.0"}),
    );

    let registry = Registry::fetch(&[root.path().to_path_buf()], &[], None);
    assert_eq!(registry.implicit(), ["studio==1.0.0", "site==0.5.0"]);
}

#[test]
fn export_writes_and_respects_overwrite() {
    let root = TempDir::new().unwrap();
    let definition: wiz::definition::Definition = serde_json::from_value(serde_json::json!({
        "identifier": "app",
        "version": "1.2.0",
        "command": {"app": "App"}
    }))
    .unwrap();

    let target = registry::export(root.path(), &definition, false).unwrap();
    assert_eq!(target.file_name().unwrap(), "app-1.2.0.json");

    let error = registry::export(root.path(), &definition, false).unwrap_err();
    assert!(matches!(error, WizError::FileExists(_)));

    registry::export(root.path(), &definition, true).unwrap();

    let loaded = definition::load(&target).unwrap();
    assert_eq!(loaded.identifier, "app");
    assert_eq!(loaded.version.to_string(), "1.2.0");
}
