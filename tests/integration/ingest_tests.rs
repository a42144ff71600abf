use launchcache::backend::{InfoKind, PackageId, PackageInfo, Role};
use launchcache::cache::{CacheEntry, CacheStore};
use launchcache::engine::EngineError;
use launchcache::fingerprint::Fingerprint;
use std::path::PathBuf;
use tempfile::tempdir;

use super::common::{engine, installing, write_launcher, Query, Script, APP, HIDDEN_APP};

#[test]
fn test_install_stores_launchers_without_ownership_query() {
    let apps = tempdir().unwrap();
    let bar = write_launcher(apps.path(), "bar.desktop", APP);
    let script = Script::new();
    script.ship(
        "bar",
        &[
            PathBuf::from("/usr/bin/bar"),
            bar.clone(),
            apps.path().join("bar-never-unpacked.desktop"),
        ],
    );

    let mut engine = engine(apps.path(), &script);
    let stats = engine.ingest_from_install(&[installing("bar", "fedora")]).unwrap();

    assert_eq!(stats.packages, 1);
    assert_eq!(stats.launchers, 1);
    assert_eq!(stats.inserted, 1);
    assert!(!stats.incomplete);

    assert_eq!(
        script.queries(),
        vec![Query::GetFiles(vec![PackageId::new(
            "bar", "1.0", "x86_64", "installed"
        )])]
    );

    let row = engine.store().get(&bar).unwrap().unwrap();
    assert_eq!(row.package, "bar");
    assert!(row.visible);
    assert_eq!(row.fingerprint, Fingerprint::of_bytes(APP.as_bytes()));
}

#[test]
fn test_only_arriving_packages_are_listed() {
    let apps = tempdir().unwrap();
    let script = Script::new();
    let id = |name: &str| PackageId::new(name, "1.0", "x86_64", "updates");

    let results = vec![
        PackageInfo::new(InfoKind::Installed, id("already")),
        PackageInfo::new(InfoKind::Installing, id("new")),
        PackageInfo::new(InfoKind::Removing, id("old")),
        PackageInfo::new(InfoKind::Updating, id("newer")),
    ];

    let mut engine = engine(apps.path(), &script);
    let stats = engine.ingest_from_install(&results).unwrap();

    assert_eq!(stats.packages, 2);
    assert_eq!(
        script.queries(),
        vec![Query::GetFiles(vec![
            PackageId::new("new", "1.0", "x86_64", "installed"),
            PackageId::new("newer", "1.0", "x86_64", "installed"),
        ])]
    );
}

#[test]
fn test_no_arriving_packages_makes_no_query() {
    let apps = tempdir().unwrap();
    let script = Script::new();
    let results = vec![PackageInfo::new(
        InfoKind::Removing,
        PackageId::new("old", "1.0", "x86_64", "installed"),
    )];

    let mut engine = engine(apps.path(), &script);
    let stats = engine.ingest_from_install(&results).unwrap();

    assert_eq!(stats.packages, 0);
    assert_eq!(stats.inserted, 0);
    assert!(script.queries().is_empty());
}

#[test]
fn test_unsupported_get_files_skips_ingest() {
    let apps = tempdir().unwrap();
    let script = Script::new();
    script.disable(Role::GetFiles);

    let mut engine = engine(apps.path(), &script);
    let err = engine
        .ingest_from_install(&[installing("bar", "fedora")])
        .unwrap_err();

    assert!(matches!(err, EngineError::Unsupported(Role::GetFiles)));
    assert!(script.queries().is_empty());
}

#[test]
fn test_ingested_rows_survive_next_refresh_untouched() {
    let apps = tempdir().unwrap();
    let bar = write_launcher(apps.path(), "bar.desktop", APP);
    let script = Script::new();
    script.ship("bar", &[bar.clone()]);

    let mut engine = engine(apps.path(), &script);
    engine.ingest_from_install(&[installing("bar", "fedora")]).unwrap();
    script.clear_queries();

    let report = engine.refresh().unwrap();

    assert_eq!(report.revalidate.unchanged, 1);
    assert_eq!(report.mutations(), 0);
    assert!(script.queries().is_empty());
}

#[test]
fn test_ingest_replaces_existing_row() {
    let apps = tempdir().unwrap();
    let bar = write_launcher(apps.path(), "bar.desktop", HIDDEN_APP);
    let script = Script::new();
    script.ship("bar", &[bar.clone()]);

    let mut engine = engine(apps.path(), &script);
    engine
        .store()
        .upsert(&CacheEntry::new(
            &bar,
            "previous-owner",
            true,
            Fingerprint::from_stored("stale"),
        ))
        .unwrap();

    engine.ingest_from_install(&[installing("bar", "fedora")]).unwrap();

    let rows = engine.store().scan_all().unwrap();
    assert_eq!(rows.len(), 1);
    let row = engine.store().get(&bar).unwrap().unwrap();
    assert_eq!(row.package, "bar");
    assert!(!row.visible);
    assert_eq!(row.fingerprint, Fingerprint::of_bytes(HIDDEN_APP.as_bytes()));
}

#[test]
fn test_unloadable_launcher_skipped_others_stored() {
    let apps = tempdir().unwrap();
    let broken = write_launcher(apps.path(), "broken.desktop", "not a key file\n");
    let good = write_launcher(apps.path(), "good.desktop", APP);
    let script = Script::new();
    script.ship("bar", &[broken.clone(), good.clone()]);

    let mut engine = engine(apps.path(), &script);
    let stats = engine.ingest_from_install(&[installing("bar", "fedora")]).unwrap();

    assert_eq!(stats.launchers, 2);
    assert_eq!(stats.inserted, 1);
    assert_eq!(stats.skipped, 1);
    assert!(engine.store().get(&broken).unwrap().is_none());
    assert!(engine.store().get(&good).unwrap().is_some());
}

#[test]
fn test_add_launcher_with_known_owner() {
    let apps = tempdir().unwrap();
    let foo = write_launcher(apps.path(), "foo.desktop", APP);
    let script = Script::new();

    let engine = engine(apps.path(), &script);
    let entry = engine.add_launcher(&foo, "foo", None).unwrap();

    assert_eq!(entry.package, "foo");
    assert_eq!(engine.store().get(&foo).unwrap(), Some(entry));
    assert!(script.queries().is_empty());

    let missing = apps.path().join("missing.desktop");
    assert!(engine.add_launcher(&missing, "foo", None).is_err());
    assert!(engine.store().get(&missing).unwrap().is_none());
}
