use std::fs;
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex};

use launchcache::backend::{ExitStatus, Role};
use launchcache::cache::{CacheDatabase, CacheStore};
use launchcache::engine::{EngineError, VisitedSet};
use launchcache::fingerprint::Fingerprint;
use launchcache::progress::{Phase, ProgressCallback};
use tempfile::tempdir;

use super::common::{
    engine, engine_config, engine_with, write_launcher, Query, Script, APP, HIDDEN_APP,
};

#[test]
fn test_first_cycle_inserts_owned_launchers() {
    let apps = tempdir().unwrap();
    let foo = write_launcher(apps.path(), "foo.desktop", APP);
    let settings = write_launcher(apps.path(), "foo-settings.desktop", HIDDEN_APP);

    let script = Script::new();
    script.own(&foo, &["foo"]);
    script.own(&settings, &["foo"]);

    let mut engine = engine(apps.path(), &script);
    let report = engine.refresh().unwrap();

    assert_eq!(report.revalidate.checked, 0);
    assert_eq!(report.discover.candidates, 2);
    assert_eq!(report.discover.inserted, 2);
    assert_eq!(report.skipped(), 0);

    let row = engine.store().get(&foo).unwrap().unwrap();
    assert_eq!(row.package, "foo");
    assert!(row.visible);
    assert_eq!(row.fingerprint, Fingerprint::of_bytes(APP.as_bytes()));

    let row = engine.store().get(&settings).unwrap().unwrap();
    assert!(!row.visible);
}

#[test]
fn test_second_cycle_makes_no_queries_or_writes() {
    let apps = tempdir().unwrap();
    let foo = write_launcher(apps.path(), "foo.desktop", APP);
    let script = Script::new();
    script.own(&foo, &["foo"]);

    let mut engine = engine(apps.path(), &script);
    engine.refresh().unwrap();
    let before = engine.store().scan_all().unwrap().len();
    script.clear_queries();

    let report = engine.refresh().unwrap();

    assert_eq!(report.mutations(), 0);
    assert_eq!(report.revalidate.unchanged, 1);
    assert_eq!(report.discover.candidates, 0);
    assert!(script.queries().is_empty());
    assert_eq!(engine.store().scan_all().unwrap().len(), before);
}

#[test]
fn test_deleted_launcher_removed_without_query() {
    let apps = tempdir().unwrap();
    let foo = write_launcher(apps.path(), "foo.desktop", APP);
    let script = Script::new();
    script.own(&foo, &["foo"]);

    let mut engine = engine(apps.path(), &script);
    engine.refresh().unwrap();
    script.clear_queries();

    fs::remove_file(&foo).unwrap();
    let report = engine.refresh().unwrap();

    assert_eq!(report.revalidate.removed, 1);
    assert!(engine.store().get(&foo).unwrap().is_none());
    assert!(script.queries().is_empty());
}

#[test]
fn test_changed_launcher_is_reresolved_once() {
    let apps = tempdir().unwrap();
    let foo = write_launcher(apps.path(), "foo.desktop", APP);
    let script = Script::new();
    script.own(&foo, &["foo"]);

    let mut engine = engine(apps.path(), &script);
    engine.refresh().unwrap();
    script.clear_queries();

    let changed = "[Desktop Entry]\nType=Application\nName=Foo 2\nExec=foo2\n";
    fs::write(&foo, changed).unwrap();
    script.own(&foo, &["foo2"]);

    let report = engine.refresh().unwrap();

    assert_eq!(report.revalidate.updated, 1);
    assert_eq!(report.discover.candidates, 0);
    assert_eq!(script.searched_paths(), vec![foo.clone()]);

    let row = engine.store().get(&foo).unwrap().unwrap();
    assert_eq!(row.package, "foo2");
    assert_eq!(row.fingerprint, Fingerprint::of_bytes(changed.as_bytes()));
}

#[test]
fn test_change_to_hidden_updates_visibility() {
    let apps = tempdir().unwrap();
    let foo = write_launcher(apps.path(), "foo.desktop", APP);
    let script = Script::new();
    script.own(&foo, &["foo"]);

    let mut engine = engine(apps.path(), &script);
    engine.refresh().unwrap();
    assert!(engine.store().get(&foo).unwrap().unwrap().visible);

    fs::write(&foo, HIDDEN_APP).unwrap();
    engine.refresh().unwrap();

    assert!(!engine.store().get(&foo).unwrap().unwrap().visible);
}

#[test]
fn test_unowned_launcher_not_inserted_and_retried() {
    let apps = tempdir().unwrap();
    let local = write_launcher(apps.path(), "local.desktop", APP);
    let script = Script::new();

    let mut engine = engine(apps.path(), &script);
    let report = engine.refresh().unwrap();

    assert_eq!(report.discover.candidates, 1);
    assert_eq!(report.discover.skipped, 1);
    assert!(engine.store().get(&local).unwrap().is_none());

    script.clear_queries();
    script.own(&local, &["local-pkg"]);
    let report = engine.refresh().unwrap();

    assert_eq!(report.discover.inserted, 1);
    assert_eq!(script.searched_paths(), vec![local.clone()]);
}

#[test]
fn test_ambiguous_owner_not_inserted() {
    let apps = tempdir().unwrap();
    let shared = write_launcher(apps.path(), "shared.desktop", APP);
    let script = Script::new();
    script.own(&shared, &["foo", "bar"]);

    let mut engine = engine(apps.path(), &script);
    let report = engine.refresh().unwrap();

    assert_eq!(report.discover.skipped, 1);
    assert!(engine.store().get(&shared).unwrap().is_none());
}

#[test]
fn test_ambiguous_change_leaves_old_row() {
    let apps = tempdir().unwrap();
    let foo = write_launcher(apps.path(), "foo.desktop", APP);
    let script = Script::new();
    script.own(&foo, &["foo"]);

    let mut engine = engine(apps.path(), &script);
    engine.refresh().unwrap();

    fs::write(&foo, HIDDEN_APP).unwrap();
    script.own(&foo, &["foo", "bar"]);
    script.clear_queries();
    let report = engine.refresh().unwrap();

    assert_eq!(report.revalidate.stale, 1);
    assert_eq!(report.revalidate.updated, 0);
    // The path still counts as visited, so discovery must not retry it.
    assert_eq!(script.searched_paths(), vec![foo.clone()]);

    let row = engine.store().get(&foo).unwrap().unwrap();
    assert_eq!(row.package, "foo");
    assert!(row.visible);
    assert_eq!(row.fingerprint, Fingerprint::of_bytes(APP.as_bytes()));

    // Once the ambiguity clears, the next cycle picks the change up.
    script.own(&foo, &["foo"]);
    let report = engine.refresh().unwrap();
    assert_eq!(report.revalidate.updated, 1);
    assert!(!engine.store().get(&foo).unwrap().unwrap().visible);
}

#[test]
fn test_failed_query_skips_path() {
    let apps = tempdir().unwrap();
    let foo = write_launcher(apps.path(), "foo.desktop", APP);
    let script = Script::new();
    script.own(&foo, &["foo"]);
    script.fail_searches(ExitStatus::Failed("database locked".to_string()));

    let mut engine = engine(apps.path(), &script);
    let report = engine.refresh().unwrap();

    assert_eq!(report.discover.skipped, 1);
    assert!(engine.store().get(&foo).unwrap().is_none());
}

#[test]
fn test_unanswered_query_times_out() {
    let apps = tempdir().unwrap();
    let foo = write_launcher(apps.path(), "foo.desktop", APP);
    let script = Script::new();
    script.own(&foo, &["foo"]);
    script.hang();

    let mut engine = engine(apps.path(), &script);
    let report = engine.refresh().unwrap();

    assert_eq!(report.discover.skipped, 1);
    assert!(engine.store().get(&foo).unwrap().is_none());
}

#[test]
fn test_unsupported_search_skips_refresh() {
    let apps = tempdir().unwrap();
    write_launcher(apps.path(), "foo.desktop", APP);
    let script = Script::new();
    script.disable(Role::SearchFile);

    let mut engine = engine(apps.path(), &script);
    let err = engine.refresh().unwrap_err();

    assert!(matches!(err, EngineError::Unsupported(Role::SearchFile)));
    assert!(script.queries().is_empty());
    assert!(engine.store().scan_all().unwrap().is_empty());
}

#[test]
fn test_only_launchers_are_queried() {
    let apps = tempdir().unwrap();
    let foo = write_launcher(apps.path(), "foo.desktop", APP);
    write_launcher(apps.path(), "mimeinfo.cache", "[MIME Cache]\n");
    write_launcher(apps.path(), "foo.desktop.bak", APP);
    let nested = write_launcher(apps.path(), "kde/nested.desktop", APP);

    let script = Script::new();
    script.own(&foo, &["foo"]);
    script.own(&nested, &["nested"]);

    let mut engine = engine(apps.path(), &script);
    let report = engine.refresh().unwrap();

    assert_eq!(report.discover.inserted, 2);
    let mut searched = script.searched_paths();
    searched.sort();
    let mut expected = vec![foo, nested];
    expected.sort();
    assert_eq!(searched, expected);
}

#[test]
fn test_each_query_names_one_path() {
    let apps = tempdir().unwrap();
    let a = write_launcher(apps.path(), "a.desktop", APP);
    let b = write_launcher(apps.path(), "b.desktop", APP);
    let script = Script::new();
    script.own(&a, &["a"]);
    script.own(&b, &["b"]);

    let mut engine = engine(apps.path(), &script);
    engine.refresh().unwrap();

    assert_eq!(
        script.queries(),
        vec![Query::SearchFile(vec![a]), Query::SearchFile(vec![b])]
    );
}

#[test]
fn test_invalid_entry_skipped() {
    let apps = tempdir().unwrap();
    let link = write_launcher(
        apps.path(),
        "link.desktop",
        "[Desktop Entry]\nType=Link\nURL=https://example.org\n",
    );
    let script = Script::new();
    script.own(&link, &["docs"]);

    let mut engine = engine(apps.path(), &script);
    let report = engine.refresh().unwrap();

    assert_eq!(report.discover.skipped, 1);
    assert!(engine.store().get(&link).unwrap().is_none());
}

#[test]
fn test_missing_applications_dir_is_not_fatal() {
    let root = tempdir().unwrap();
    let script = Script::new();

    let mut engine = engine(&root.path().join("absent"), &script);
    let report = engine.refresh().unwrap();

    assert_eq!(report.discover.inserted, 0);
    assert!(report.discover.walk_errors >= 1);
    assert!(script.queries().is_empty());
}

#[test]
fn test_shutdown_stops_before_any_write() {
    let apps = tempdir().unwrap();
    let foo = write_launcher(apps.path(), "foo.desktop", APP);
    let script = Script::new();
    script.own(&foo, &["foo"]);

    let flag = Arc::new(AtomicBool::new(true));
    let config = engine_config(apps.path()).with_shutdown_flag(flag);
    let mut engine = engine_with(CacheDatabase::open_in_memory().unwrap(), &script, config);
    let report = engine.refresh().unwrap();

    assert!(report.interrupted());
    assert_eq!(report.mutations(), 0);
    assert!(script.queries().is_empty());
}

#[test]
fn test_cache_survives_reopen() {
    let apps = tempdir().unwrap();
    let db_dir = tempdir().unwrap();
    let db_path = db_dir.path().join("cache").join("desktop-files.db");
    let foo = write_launcher(apps.path(), "foo.desktop", APP);
    let script = Script::new();
    script.own(&foo, &["foo"]);

    {
        let store = CacheDatabase::open(&db_path).unwrap();
        let mut engine = engine_with(store, &script, engine_config(apps.path()));
        assert_eq!(engine.refresh().unwrap().discover.inserted, 1);
    }
    script.clear_queries();

    let store = CacheDatabase::open(&db_path).unwrap();
    let mut engine = engine_with(store, &script, engine_config(apps.path()));
    let report = engine.refresh().unwrap();

    assert_eq!(report.revalidate.unchanged, 1);
    assert_eq!(report.mutations(), 0);
    assert!(script.queries().is_empty());
}

#[test]
fn test_revalidate_marks_surviving_paths() {
    let apps = tempdir().unwrap();
    let foo = write_launcher(apps.path(), "foo.desktop", APP);
    let gone = write_launcher(apps.path(), "gone.desktop", APP);
    let script = Script::new();
    script.own(&foo, &["foo"]);
    script.own(&gone, &["gone"]);

    let mut engine = engine(apps.path(), &script);
    engine.refresh().unwrap();
    fs::remove_file(&gone).unwrap();

    let mut visited = VisitedSet::new();
    let stats = engine.revalidate_all(&mut visited).unwrap();

    assert_eq!(stats.checked, 2);
    assert_eq!(stats.removed, 1);
    assert!(visited.contains(&foo));
    assert!(!visited.contains(&gone));
}

#[derive(Default)]
struct RecordingProgress {
    phases: Mutex<Vec<Phase>>,
}

impl ProgressCallback for RecordingProgress {
    fn on_phase_start(&self, phase: Phase, _total: usize) {
        self.phases.lock().unwrap().push(phase);
    }

    fn on_progress(&self, _current: usize, _path: &str) {}

    fn on_phase_end(&self, _phase: Phase) {}
}

#[test]
fn test_progress_reports_phases_in_order() {
    let apps = tempdir().unwrap();
    let foo = write_launcher(apps.path(), "foo.desktop", APP);
    let script = Script::new();
    script.own(&foo, &["foo"]);

    let progress = Arc::new(RecordingProgress::default());
    let config = engine_config(apps.path()).with_progress_callback(progress.clone());
    let mut engine = engine_with(CacheDatabase::open_in_memory().unwrap(), &script, config);
    engine.refresh().unwrap();

    assert_eq!(
        *progress.phases.lock().unwrap(),
        vec![Phase::Revalidate, Phase::Discover]
    );
}

fn insert_unfingerprinted_row(db_path: &std::path::Path, launcher: &std::path::Path) {
    let conn = rusqlite::Connection::open(db_path).unwrap();
    conn.execute(
        "INSERT INTO cache (path, package, visible, fingerprint) VALUES (?1, 'foo', 1, NULL)",
        [launcher.to_str().unwrap()],
    )
    .unwrap();
}

#[test]
fn test_unfingerprinted_row_for_vanished_file_is_removed() {
    let apps = tempdir().unwrap();
    let state = tempdir().unwrap();
    let db_path = state.path().join("cache.db");
    CacheDatabase::open(&db_path).unwrap().close().unwrap();
    let gone = apps.path().join("gone.desktop");
    insert_unfingerprinted_row(&db_path, &gone);

    let script = Script::new();
    let mut engine = engine_with(
        CacheDatabase::open(&db_path).unwrap(),
        &script,
        engine_config(apps.path()),
    );
    let report = engine.refresh().unwrap();

    assert_eq!(report.revalidate.removed, 1);
    assert_eq!(report.revalidate.malformed, 0);
    assert!(engine.store().scan_all().unwrap().is_empty());
    assert!(script.queries().is_empty());
}

#[test]
fn test_unfingerprinted_row_for_present_file_is_reresolved() {
    let apps = tempdir().unwrap();
    let state = tempdir().unwrap();
    let db_path = state.path().join("cache.db");
    CacheDatabase::open(&db_path).unwrap().close().unwrap();
    let foo = write_launcher(apps.path(), "foo.desktop", APP);
    insert_unfingerprinted_row(&db_path, &foo);

    let script = Script::new();
    script.own(&foo, &["foo"]);
    let mut engine = engine_with(
        CacheDatabase::open(&db_path).unwrap(),
        &script,
        engine_config(apps.path()),
    );
    let report = engine.refresh().unwrap();

    assert_eq!(report.revalidate.updated, 1);
    assert_eq!(report.discover.candidates, 0);
    let row = engine.store().get(&foo).unwrap().unwrap();
    assert_eq!(row.fingerprint, Fingerprint::of_bytes(APP.as_bytes()));
}
