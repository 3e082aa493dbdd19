//! Unit Tests for Configuration Loading

use std::fs;
use tempfile::TempDir;
use termexec::config::{Config, ConfigLoader, LoadOptions};
use termexec::Error;

fn write(dir: &TempDir, name: &str, content: &str) -> std::path::PathBuf {
    let path = dir.path().join(name);
    fs::write(&path, content).unwrap();
    path
}

#[test]
fn test_partial_toml_keeps_defaults() {
    let dir = TempDir::new().unwrap();
    let path = write(&dir, "config.toml", "[tracking]\nflush_timeout_ms = 250\n");

    let config = ConfigLoader::load_from_path(&path).unwrap();
    assert_eq!(config.tracking.flush_timeout_ms, 250);
    assert_eq!(config.tracking.max_pending_executions, 64);
    assert_eq!(config.sessions.max_closed_sessions, 1024);
}

#[test]
fn test_json_config() {
    let dir = TempDir::new().unwrap();
    let path = write(
        &dir,
        "config.json",
        r#"{"tracking": {"max_pending_executions": 4}, "sessions": {"max_closed_sessions": 32}}"#,
    );

    let config = ConfigLoader::load_from_path(&path).unwrap();
    assert_eq!(config.tracking.max_pending_executions, 4);
    assert_eq!(config.sessions.max_closed_sessions, 32);
}

#[test]
fn test_invalid_values_rejected() {
    let dir = TempDir::new().unwrap();
    let path = write(&dir, "config.toml", "[tracking]\nmax_pending_executions = 0\n");

    let err = ConfigLoader::load_from_path(&path).unwrap_err();
    assert!(matches!(err, Error::ConfigValidationFailed { .. }));
}

#[test]
fn test_malformed_file_rejected() {
    let dir = TempDir::new().unwrap();
    let path = write(&dir, "config.toml", "[tracking\nnot toml");
    assert!(ConfigLoader::load_from_path(&path).is_err());
}

#[test]
fn test_search_path_finds_json_when_no_toml() {
    let dir = TempDir::new().unwrap();
    let expected = write(&dir, "config.json", r#"{"sessions": {"max_closed_sessions": 8}}"#);
    let mut loader = ConfigLoader::with_search_paths(vec![
        dir.path().join("absent"),
        dir.path().join("config"),
    ]);

    let config = loader.load_with_options(LoadOptions::default()).unwrap();
    assert_eq!(config.sessions.max_closed_sessions, 8);
    assert_eq!(loader.current_path(), Some(expected.as_path()));
}

#[test]
fn test_save_and_reload() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("nested").join("termexec.toml");

    let mut config = Config::default();
    config.tracking.pending_execution_ttl_ms = 10_000;
    ConfigLoader::new().save_to_path(&config, &path).unwrap();

    let reloaded = ConfigLoader::load_from_path(&path).unwrap();
    assert_eq!(reloaded, config);
}
