//! Tests for configuration loading.

use std::fs;
use std::time::Duration;

use taskreaper::config::Config;
use tempfile::tempdir;

fn sample_config_toml() -> &'static str {
    r#"
kill_chunk_size = 25
kill_retry_timeout_ms = 5000
kill_retry_max = 3
"#
}

#[test]
fn test_load_from_file() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("config.toml");
    fs::write(&path, sample_config_toml()).unwrap();

    let cfg = Config::load(Some(path)).unwrap();
    assert_eq!(cfg.kill_chunk_size, 25);
    assert_eq!(cfg.kill_retry_timeout_ms, 5000);
    assert_eq!(cfg.kill_retry_max, Some(3));
}

#[test]
fn test_missing_fields_use_defaults() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("config.toml");
    fs::write(&path, "kill_chunk_size = 10\n").unwrap();

    let cfg = Config::load(Some(path)).unwrap();
    assert_eq!(cfg.kill_chunk_size, 10);
    assert_eq!(cfg.kill_retry_timeout_ms, 10_000);
    assert_eq!(cfg.kill_retry_max, None);
}

#[test]
fn test_zero_retry_max_means_unbounded() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("config.toml");
    fs::write(
        &path,
        "kill_chunk_size = 10\nkill_retry_timeout_ms = 1000\nkill_retry_max = 0\n",
    )
    .unwrap();

    let cfg = Config::load(Some(path)).unwrap();
    assert_eq!(cfg.kill_retry_max, None);
}

#[test]
fn test_zero_chunk_size_is_rejected() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("config.toml");
    fs::write(&path, "kill_chunk_size = 0\n").unwrap();

    assert!(Config::load(Some(path)).is_err());
}

#[test]
fn test_zero_retry_timeout_is_rejected() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("config.toml");
    fs::write(&path, "kill_retry_timeout_ms = 0\n").unwrap();

    assert!(Config::load(Some(path)).is_err());
}

#[test]
fn test_kill_retry_timeout_duration() {
    let cfg = Config {
        kill_chunk_size: 100,
        kill_retry_timeout_ms: 2500,
        kill_retry_max: None,
    };
    assert_eq!(cfg.kill_retry_timeout(), Duration::from_millis(2500));
}

#[test]
fn test_kill_policy_mirrors_config() {
    let cfg = Config {
        kill_chunk_size: 7,
        kill_retry_timeout_ms: 1500,
        kill_retry_max: Some(4),
    };

    let policy = cfg.kill_policy();
    assert_eq!(policy.chunk_size, 7);
    assert_eq!(policy.retry_timeout, Duration::from_millis(1500));
    assert_eq!(policy.retry_max, Some(4));
}

#[test]
fn test_default_config_is_valid() {
    let cfg = Config::default();
    assert_eq!(cfg.kill_chunk_size, 100);
    assert_eq!(cfg.kill_retry_timeout_ms, 10_000);
    assert_eq!(cfg.kill_retry_max, None);
}
