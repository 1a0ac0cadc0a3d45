use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use cartprod_config::{Config, ConfigError, ConfigSourceKind, LoadOptions};
use tempfile::TempDir;

fn write_file(path: impl AsRef<Path>, contents: &str) {
    let mut file = fs::File::create(path).expect("create config");
    file.write_all(contents.as_bytes()).expect("write config");
}

fn canonical(path: impl AsRef<Path>) -> PathBuf {
    fs::canonicalize(path).expect("canonicalize path")
}

#[test]
fn loads_defaults_when_no_files_present() {
    let temp = TempDir::new().expect("tempdir");
    let working_dir = canonical(temp.path());

    let config = Config::load(LoadOptions::default().with_working_dir(working_dir.clone()))
        .expect("load defaults");

    assert_eq!(config.storage.temp_dir, std::env::temp_dir());
    assert_eq!(config.naming.variable_prefix, "V");
    assert_eq!(config.naming.dataset_prefix, "D");
    assert_eq!(config.sources.working_directory, working_dir);
    assert_eq!(config.sources.layers.len(), 1);
    assert_eq!(config.sources.layers[0].kind, ConfigSourceKind::Default);
}

#[test]
fn applies_precedence_and_merges_fields() {
    let temp = TempDir::new().expect("tempdir");
    let git_root = canonical(temp.path());
    fs::create_dir(git_root.join(".git")).expect("create .git");

    write_file(
        git_root.join(".cartprod.toml"),
        r#"
        [storage]
        temp_dir = "scratch"

        [naming]
        variable_prefix = "ROOTSEQ"
        dataset_prefix = "ROOTDS"
        "#,
    );

    let nested = git_root.join("project");
    fs::create_dir(&nested).expect("create nested");
    write_file(
        nested.join(".cartprod.toml"),
        r#"
        [naming]
        variable_prefix = "LOCALSEQ"
        "#,
    );

    let config =
        Config::load(LoadOptions::default().with_working_dir(&nested)).expect("load layered");

    assert_eq!(config.storage.temp_dir, git_root.join("scratch"));
    assert_eq!(config.naming.variable_prefix, "LOCALSEQ");
    assert_eq!(config.naming.dataset_prefix, "ROOTDS");

    let kinds: Vec<_> = config.sources.layers.iter().map(|layer| layer.kind).collect();
    assert_eq!(
        kinds,
        vec![
            ConfigSourceKind::Default,
            ConfigSourceKind::GitRoot,
            ConfigSourceKind::Local
        ]
    );
}

#[test]
fn override_path_takes_highest_precedence() {
    let temp = TempDir::new().expect("tempdir");
    let working_dir = canonical(temp.path());

    write_file(
        working_dir.join(".cartprod.toml"),
        "[naming]\ndataset_prefix = \"LOCAL\"\n",
    );
    write_file(
        working_dir.join("override.toml"),
        "[naming]\ndataset_prefix = \"OVR\"\n",
    );

    let config = Config::load(
        LoadOptions::default()
            .with_working_dir(&working_dir)
            .with_override_path("override.toml"),
    )
    .expect("load override");

    assert_eq!(config.naming.dataset_prefix, "OVR");
    assert_eq!(
        config.sources.layers.last().map(|layer| layer.kind),
        Some(ConfigSourceKind::Override)
    );
}

#[test]
fn missing_override_is_reported() {
    let temp = TempDir::new().expect("tempdir");

    let err = Config::load(
        LoadOptions::default()
            .with_working_dir(temp.path())
            .with_override_path("absent.toml"),
    )
    .unwrap_err();

    assert!(matches!(err, ConfigError::OverrideNotFound { .. }));
}

#[test]
fn invalid_prefixes_are_listed_with_their_source() {
    let temp = TempDir::new().expect("tempdir");
    let working_dir = canonical(temp.path());

    write_file(
        working_dir.join(".cartprod.toml"),
        r#"
        [naming]
        variable_prefix = "1bad"
        dataset_prefix = "also bad"
        "#,
    );

    let err = Config::load(LoadOptions::default().with_working_dir(&working_dir)).unwrap_err();
    let ConfigError::Validation(errors) = err else {
        panic!("expected validation error");
    };

    let messages: Vec<String> = errors.iter().map(|e| e.to_string()).collect();
    assert_eq!(messages.len(), 2);
    assert!(messages[0].starts_with("naming.variable_prefix"));
    assert!(messages[0].contains("local config"));
    assert!(messages[1].starts_with("naming.dataset_prefix"));
}

#[test]
fn unknown_keys_fail_to_parse() {
    let temp = TempDir::new().expect("tempdir");
    let working_dir = canonical(temp.path());

    write_file(
        working_dir.join(".cartprod.toml"),
        "[storage]\ntmp = \"x\"\n",
    );

    let err = Config::load(LoadOptions::default().with_working_dir(&working_dir)).unwrap_err();
    assert!(matches!(err, ConfigError::Parse { .. }));
}
