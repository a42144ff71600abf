use launchcache::backend::Role;
use launchcache::cache::{CacheDatabase, CacheStore};
use launchcache::engine::EngineError;
use launchcache::hook::{ScanHook, TransactionOutcome};
use tempfile::tempdir;

use super::common::{engine, installing, write_launcher, Script, APP};

#[test]
fn test_refresh_transaction_runs_cycle() {
    let apps = tempdir().unwrap();
    let foo = write_launcher(apps.path(), "foo.desktop", APP);
    let script = Script::new();
    script.own(&foo, &["foo"]);

    let mut hook = ScanHook::new(engine(apps.path(), &script));
    let outcome = hook.transaction_finished(Role::RefreshCache, &[]).unwrap();

    match outcome {
        TransactionOutcome::Refreshed(report) => assert_eq!(report.discover.inserted, 1),
        other => panic!("Expected a refresh, got {:?}", other),
    }
    let engine = hook.engine().unwrap();
    assert!(engine.store().get(&foo).unwrap().is_some());
}

#[test]
fn test_install_transaction_runs_ingest() {
    let apps = tempdir().unwrap();
    let bar = write_launcher(apps.path(), "bar.desktop", APP);
    let script = Script::new();
    script.ship("bar", &[bar.clone()]);

    let mut hook = ScanHook::new(engine(apps.path(), &script));
    let outcome = hook
        .transaction_finished(Role::InstallPackages, &[installing("bar", "fedora")])
        .unwrap();

    match outcome {
        TransactionOutcome::Ingested(stats) => assert_eq!(stats.inserted, 1),
        other => panic!("Expected an ingest, got {:?}", other),
    }
}

#[test]
fn test_other_roles_are_ignored() {
    let apps = tempdir().unwrap();
    let foo = write_launcher(apps.path(), "foo.desktop", APP);
    let script = Script::new();
    script.own(&foo, &["foo"]);

    let mut hook = ScanHook::new(engine(apps.path(), &script));
    for role in [Role::UpdatePackages, Role::RemovePackages, Role::SearchFile] {
        let outcome = hook
            .transaction_finished(role, &[installing("bar", "fedora")])
            .unwrap();
        assert_eq!(outcome, TransactionOutcome::Ignored);
    }
    assert!(script.queries().is_empty());
}

#[test]
fn test_disabled_hook_ignores_everything() {
    let mut hook = ScanHook::<CacheDatabase>::disabled();
    assert!(hook.engine().is_none());

    let outcome = hook.transaction_finished(Role::RefreshCache, &[]).unwrap();
    assert_eq!(outcome, TransactionOutcome::Ignored);

    let outcome = hook
        .transaction_finished(Role::InstallPackages, &[installing("bar", "fedora")])
        .unwrap();
    assert_eq!(outcome, TransactionOutcome::Ignored);
}

#[test]
fn test_hook_without_store_reports_error() {
    let mut hook = ScanHook::<CacheDatabase>::without_store();

    let err = hook.transaction_finished(Role::RefreshCache, &[]).unwrap_err();
    assert!(matches!(err, EngineError::StoreUnavailable));

    let err = hook
        .transaction_finished(Role::InstallPackages, &[installing("bar", "fedora")])
        .unwrap_err();
    assert!(matches!(err, EngineError::StoreUnavailable));

    // Irrelevant roles stay quiet even without a store.
    let outcome = hook.transaction_finished(Role::GetFiles, &[]).unwrap();
    assert_eq!(outcome, TransactionOutcome::Ignored);
}

#[test]
fn test_unsupported_backend_surfaces_through_hook() {
    let apps = tempdir().unwrap();
    let script = Script::new();
    script.disable(Role::SearchFile);

    let mut hook = ScanHook::new(engine(apps.path(), &script));
    let err = hook.transaction_finished(Role::RefreshCache, &[]).unwrap_err();

    assert!(matches!(err, EngineError::Unsupported(Role::SearchFile)));
}
