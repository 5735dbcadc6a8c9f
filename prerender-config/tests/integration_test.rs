//! Integration tests for prerender-config

use prerender_config::*;
use serde::Deserialize;
use std::io::Write;

#[derive(Debug, Deserialize)]
struct Section {
    source_path: String,
    #[serde(default)]
    exclude_urls: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct Settings {
    listen: String,
    prerender: Section,
}

#[test]
fn test_load_toml_file() {
    let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
    writeln!(
        file,
        r#"
        listen = "127.0.0.1:5000"

        [prerender]
        source_path = "ClientApp"
        exclude_urls = ["/sockjs-node"]
        "#
    )
    .unwrap();

    let manager = ConfigManager::new();
    manager.load_file(file.path()).unwrap();

    let settings: Settings = manager.load().unwrap();
    assert_eq!(settings.listen, "127.0.0.1:5000");
    assert_eq!(settings.prerender.source_path, "ClientApp");
    assert_eq!(settings.prerender.exclude_urls, vec!["/sockjs-node"]);
}

#[test]
fn test_overrides_win_over_file() {
    let mut file = tempfile::Builder::new().suffix(".json").tempfile().unwrap();
    write!(
        file,
        r#"{{"listen": "127.0.0.1:5000", "prerender": {{"source_path": "ClientApp"}}}}"#
    )
    .unwrap();

    let manager = ConfigManager::with_prefix("PRERENDER");
    manager.load_file(file.path()).unwrap();
    manager.set_raw("prerender.source_path", "web");

    let settings: Settings = manager.load().unwrap();
    assert_eq!(settings.prerender.source_path, "web");
}

#[test]
fn test_missing_file_reports_path() {
    let manager = ConfigManager::new();
    let err = manager
        .load_file(std::path::Path::new("/nonexistent/host.toml"))
        .unwrap_err();
    assert!(err.to_string().contains("/nonexistent/host.toml"));
}

#[test]
fn test_missing_section_fails_to_deserialize() {
    let manager = ConfigManager::new();
    manager.set("listen", "127.0.0.1:5000").unwrap();
    assert!(matches!(
        manager.load::<Settings>(),
        Err(ConfigError::DeserializationError(_))
    ));
}

#[test]
fn test_error_display() {
    let err = ConfigError::invalid("listen", "bad address");
    assert_eq!(err.to_string(), "Invalid value for 'listen': bad address");
}
