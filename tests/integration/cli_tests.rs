use clap::Parser;
use launchcache::cache::{CacheDatabase, CacheEntry, CacheStore};
use launchcache::cli::Cli;
use launchcache::error::ExitCode;
use launchcache::fingerprint::Fingerprint;
use launchcache::run_app;
use std::fs;
use std::path::Path;
use tempfile::tempdir;

fn run(args: &[&str]) -> anyhow::Result<ExitCode> {
    let mut argv = vec!["launchcache", "-q"];
    argv.extend_from_slice(args);
    run_app(Cli::try_parse_from(argv).unwrap())
}

fn seed(db_path: &Path) {
    let db = CacheDatabase::open(db_path).unwrap();
    db.upsert(&CacheEntry::new(
        "/usr/share/applications/foo.desktop",
        "foo",
        true,
        Fingerprint::of_bytes(b"foo"),
    ))
    .unwrap();
    db.close().unwrap();
}

#[test]
fn test_disabled_refresh_is_skipped() {
    let dir = tempdir().unwrap();
    let config = dir.path().join("config.toml");
    let db = dir.path().join("cache.db");
    fs::write(&config, "enabled = false\n").unwrap();

    let code = run(&[
        "--config",
        config.to_str().unwrap(),
        "--database",
        db.to_str().unwrap(),
        "refresh",
    ])
    .unwrap();

    assert_eq!(code, ExitCode::Skipped);
    assert!(!db.exists());
}

#[test]
fn test_refresh_with_unopenable_database_fails() {
    let dir = tempdir().unwrap();
    let config = dir.path().join("config.toml");
    let blocker = dir.path().join("not-a-dir");
    fs::write(&config, "").unwrap();
    fs::write(&blocker, "file").unwrap();
    let db = blocker.join("cache.db");

    let result = run(&[
        "--config",
        config.to_str().unwrap(),
        "--database",
        db.to_str().unwrap(),
        "refresh",
        dir.path().to_str().unwrap(),
    ]);

    let err = result.unwrap_err();
    assert!(format!("{err:#}").contains("No cache database is available"));
}

#[test]
fn test_list_without_database_is_empty() {
    let dir = tempdir().unwrap();
    let db = dir.path().join("absent.db");

    let code = run(&["--database", db.to_str().unwrap(), "list"]).unwrap();

    assert_eq!(code, ExitCode::Success);
    assert!(!db.exists());
}

#[test]
fn test_list_existing_cache_as_json() {
    let dir = tempdir().unwrap();
    let db = dir.path().join("cache.db");
    seed(&db);

    let code = run(&["--database", db.to_str().unwrap(), "list", "--output", "json"]).unwrap();
    assert_eq!(code, ExitCode::Success);
}

#[test]
fn test_lookup_cached_launcher() {
    let dir = tempdir().unwrap();
    let db = dir.path().join("cache.db");
    seed(&db);

    let code = run(&[
        "--database",
        db.to_str().unwrap(),
        "lookup",
        "/usr/share/applications/foo.desktop",
    ])
    .unwrap();
    assert_eq!(code, ExitCode::Success);
}

#[test]
fn test_lookup_unknown_launcher_fails() {
    let dir = tempdir().unwrap();
    let db = dir.path().join("cache.db");
    seed(&db);

    let err = run(&[
        "--database",
        db.to_str().unwrap(),
        "lookup",
        "/usr/share/applications/unknown.desktop",
    ])
    .unwrap_err();
    assert!(err.to_string().contains("not in the cache"));
}

#[test]
fn test_show_config() {
    let dir = tempdir().unwrap();
    let config = dir.path().join("config.toml");
    fs::write(&config, "query_timeout_secs = 9\n").unwrap();

    let code = run(&["--config", config.to_str().unwrap(), "show-config"]).unwrap();
    assert_eq!(code, ExitCode::Success);
}
