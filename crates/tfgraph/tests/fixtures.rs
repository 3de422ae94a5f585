//! Fixture tests
//!
//! Loads each *.tf file in /tests/fixtures/ individually, builds its graph without plugins and compares the
//! serialized graph with the *.json file of the same name.

use pretty_assertions::assert_eq;
use tfgraph::config::{Config, LoadError};
use tfgraph::plugin::OfflineLoader;

#[test]
fn fixtures() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_env("TFGRAPH_LOG"))
        .with_writer(std::io::stderr)
        .try_init();

    insta::glob!("fixtures/*.tf", |path| {
        let mut config = Config::default();
        config.load_file(path).expect("fixture must load");

        let graph = tfgraph::build_graph(&config, &OfflineLoader).expect("graph must build");
        let actual = serde_json::to_value(&graph).expect("graph must serialize");

        let expected = std::fs::read_to_string(path.with_extension("json")).unwrap();
        let expected: serde_json::Value = serde_json::from_str(&expected).unwrap();

        assert_eq!(actual, expected, "{}", path.display());
    });
}

#[test]
fn directories_load_tf_files_only() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("b.tf"), r#"variable "b" {}"#).unwrap();
    std::fs::write(dir.path().join("a.tf"), r#"variable "a" {}"#).unwrap();
    std::fs::write(dir.path().join("notes.txt"), "not hcl").unwrap();

    let mut config = Config::default();
    config.load_directory(dir.path()).unwrap();

    let names: Vec<_> = config.variables.iter().map(|v| v.name.as_str()).collect();
    assert_eq!(names, vec!["a", "b"]);
}

#[test]
fn empty_directories_are_rejected() {
    let dir = tempfile::tempdir().unwrap();

    let err = Config::default().load_directory(dir.path()).unwrap_err();
    assert!(matches!(err, LoadError::NoFilesFound(_)));
}

#[test]
fn invalid_files_name_their_path() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("main.tf");
    std::fs::write(&path, r#"module "network" {}"#).unwrap();

    let err = Config::default().load_file(&path).unwrap_err();
    let LoadError::Invalid { path: reported, .. } = err else {
        panic!("unexpected error {err:?}");
    };
    assert_eq!(reported.file_name(), path.file_name());
}
