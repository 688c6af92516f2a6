use chatline_client::config::{
    SavedClientConfig, load_saved_config_from_path, save_saved_config_to_path,
};

fn sample_config() -> SavedClientConfig {
    SavedClientConfig {
        server_url: "ws://127.0.0.1:8000".to_owned(),
        username: "alice".to_owned(),
    }
}

#[test]
fn config_roundtrip_save_load() {
    let dir = tempfile::tempdir().expect("create tempdir");
    let path = dir.path().join("config.json");

    let cfg = sample_config();
    save_saved_config_to_path(&path, &cfg).expect("save config");
    let loaded = load_saved_config_from_path(&path)
        .expect("load config")
        .expect("config present");
    assert_eq!(loaded, cfg);
}

#[test]
fn missing_config_loads_as_none() {
    let dir = tempfile::tempdir().expect("create tempdir");
    let path = dir.path().join("config.json");

    let loaded = load_saved_config_from_path(&path).expect("load config");
    assert!(loaded.is_none());
}

#[test]
fn invalid_config_is_never_written() {
    let dir = tempfile::tempdir().expect("create tempdir");
    let path = dir.path().join("config.json");

    let cfg = SavedClientConfig {
        username: String::new(),
        ..sample_config()
    };
    save_saved_config_to_path(&path, &cfg).expect_err("empty username rejected");
    assert!(!path.exists());
}

#[test]
fn saved_config_with_bad_scheme_fails_to_load() {
    let dir = tempfile::tempdir().expect("create tempdir");
    let path = dir.path().join("config.json");

    std::fs::write(
        &path,
        r#"{"server_url":"http://127.0.0.1:8000","username":"alice"}"#,
    )
    .expect("write config");

    let err = load_saved_config_from_path(&path).expect_err("scheme rejected");
    assert!(err.to_string().contains("ws://"), "unexpected error: {err}");
}

#[test]
fn corrupt_config_fails_with_parse_error() {
    let dir = tempfile::tempdir().expect("create tempdir");
    let path = dir.path().join("config.json");

    std::fs::write(&path, "not json at all").expect("write config");

    let err = load_saved_config_from_path(&path).expect_err("corrupt file rejected");
    assert!(err.to_string().contains("parse"), "unexpected error: {err}");
}
