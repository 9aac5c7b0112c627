//! Install/update lifecycle of plugin packages against a fake registry

mod common;

use common::{init_test_logging, status_plugin, FakeInstaller, FakeRegistry};
use modcli_core::package::{PackageDescriptor, PluginPackage, UpdateOutcome, LATEST};
use modcli_core::PluginError;
use pretty_assertions::assert_eq;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;

fn cache_descriptor(name: &str, version: &str, store: &Path) -> PackageDescriptor {
    PackageDescriptor {
        name: name.to_string(),
        version: version.to_string(),
        target_path: store.parent().unwrap().to_path_buf(),
        store_dir: Some(store.to_path_buf()),
    }
}

fn package(
    descriptor: PackageDescriptor,
    registry: &Arc<FakeRegistry>,
    installer: &Arc<FakeInstaller>,
) -> PluginPackage {
    PluginPackage::new(descriptor, registry.clone(), installer.clone()).unwrap()
}

#[tokio::test]
async fn test_latest_resolves_installs_and_exists() {
    init_test_logging();
    let temp_dir = TempDir::new().unwrap();
    let store = temp_dir.path().join("store");
    let registry = Arc::new(FakeRegistry::new(&["1.0.0", "1.2.0", "2.0.0"]));
    let installer = Arc::new(FakeInstaller::new(&status_plugin(0)));

    let mut pkg = package(cache_descriptor("demo", LATEST, &store), &registry, &installer);

    assert!(!pkg.exists().await.unwrap());
    assert_eq!(pkg.version(), "2.0.0");
    assert_eq!(pkg.cache_file_path(), Some(store.join("_demo@2.0.0@demo")));
    assert!(store.is_dir(), "exists() creates the store root");

    pkg.install().await.unwrap();
    assert!(pkg.exists().await.unwrap());
    assert_eq!(installer.installed_versions(), vec!["2.0.0"]);
    assert_eq!(
        pkg.root_file_path(),
        Some(store.join("_demo@2.0.0@demo").join("lib").join("index.wat"))
    );
}

#[tokio::test]
async fn test_exists_tracks_the_cache_directory() {
    let temp_dir = TempDir::new().unwrap();
    let store = temp_dir.path().join("store");
    let registry = Arc::new(FakeRegistry::new(&["1.0.0"]));
    let installer = Arc::new(FakeInstaller::new(""));

    let mut pkg = package(cache_descriptor("demo", "1.0.0", &store), &registry, &installer);
    let cached = store.join("_demo@1.0.0@demo");

    assert!(!pkg.exists().await.unwrap());
    std::fs::create_dir_all(&cached).unwrap();
    assert!(pkg.exists().await.unwrap());
    assert!(pkg.exists().await.unwrap());
    std::fs::remove_dir_all(&cached).unwrap();
    assert!(!pkg.exists().await.unwrap());

    // Pinned version: no registry traffic, no installs
    assert_eq!(registry.calls(), 0);
    assert_eq!(installer.install_count(), 0);
}

#[tokio::test]
async fn test_repeated_update_installs_at_most_once() {
    let temp_dir = TempDir::new().unwrap();
    let store = temp_dir.path().join("store");
    let registry = Arc::new(FakeRegistry::new(&["1.0.0"]));
    let installer = Arc::new(FakeInstaller::new(""));

    let mut pkg = package(cache_descriptor("demo", LATEST, &store), &registry, &installer);
    pkg.install().await.unwrap();
    assert_eq!(pkg.version(), "1.0.0");

    registry.publish("1.1.0");
    let before = registry.calls();

    let first = pkg.update().await.unwrap();
    assert_eq!(registry.calls(), before + 1);
    let second = pkg.update().await.unwrap();
    assert_eq!(registry.calls(), before + 2);

    assert_eq!(first, UpdateOutcome::Installed { version: "1.1.0".to_string() });
    assert_eq!(second, UpdateOutcome::UpToDate { version: "1.1.0".to_string() });
    assert_eq!(installer.installed_versions(), vec!["1.0.0", "1.1.0"]);
    assert_eq!(pkg.version(), "1.1.0");

    // Older versions are kept
    assert!(store.join("_demo@1.0.0@demo").is_dir());
    assert!(store.join("_demo@1.1.0@demo").is_dir());
}

#[tokio::test]
async fn test_update_when_current_is_latest_is_noop() {
    let temp_dir = TempDir::new().unwrap();
    let store = temp_dir.path().join("store");
    std::fs::create_dir_all(store.join("_demo@2.0.0@demo")).unwrap();
    let registry = Arc::new(FakeRegistry::new(&["1.0.0", "2.0.0"]));
    let installer = Arc::new(FakeInstaller::new(""));

    let mut pkg = package(cache_descriptor("demo", LATEST, &store), &registry, &installer);
    assert!(pkg.exists().await.unwrap());

    for _ in 0..2 {
        assert_eq!(
            pkg.update().await.unwrap(),
            UpdateOutcome::UpToDate { version: "2.0.0".to_string() }
        );
    }
    assert_eq!(installer.install_count(), 0);
    assert_eq!(registry.calls(), 3);
}

#[tokio::test]
async fn test_scoped_name_cache_path() {
    let temp_dir = TempDir::new().unwrap();
    let store = temp_dir.path().join("store");
    let registry = Arc::new(FakeRegistry::new(&["0.3.1"]));
    let installer = Arc::new(FakeInstaller::new(""));

    let mut pkg = package(cache_descriptor("@modcli/init", LATEST, &store), &registry, &installer);
    pkg.install().await.unwrap();

    let expected = store.join("_@modcli_init@0.3.1@@modcli/init");
    assert_eq!(pkg.cache_file_path(), Some(expected.clone()));
    assert!(expected.join("package.json").is_file());
}

#[tokio::test]
async fn test_no_versions_available() {
    let temp_dir = TempDir::new().unwrap();
    let registry = Arc::new(FakeRegistry::new(&[]));
    let installer = Arc::new(FakeInstaller::new(""));

    let mut pkg = package(
        cache_descriptor("demo", LATEST, &temp_dir.path().join("store")),
        &registry,
        &installer,
    );
    let err = pkg.exists().await.unwrap_err();
    assert!(matches!(err, PluginError::NoVersionsAvailable(_)));
}

#[tokio::test]
async fn test_registry_failure_aborts_install() {
    let temp_dir = TempDir::new().unwrap();
    let registry = Arc::new(FakeRegistry::unavailable());
    let installer = Arc::new(FakeInstaller::new(""));

    let mut pkg = package(
        cache_descriptor("demo", LATEST, &temp_dir.path().join("store")),
        &registry,
        &installer,
    );
    let err = pkg.install().await.unwrap_err();
    assert!(matches!(err, PluginError::RegistryUnavailable { .. }));
    assert_eq!(installer.install_count(), 0);
}

#[tokio::test]
async fn test_installer_failure_is_install_error() {
    let temp_dir = TempDir::new().unwrap();
    let registry = Arc::new(FakeRegistry::new(&["1.0.0"]));
    let installer = Arc::new(FakeInstaller::failing());

    let mut pkg = package(
        cache_descriptor("demo", LATEST, &temp_dir.path().join("store")),
        &registry,
        &installer,
    );
    let err = pkg.install().await.unwrap_err();
    assert!(
        matches!(&err, PluginError::Install { name, version, .. } if name == "demo" && version == "1.0.0"),
        "unexpected error: {err}"
    );
}

#[tokio::test]
async fn test_direct_mode_uses_target_path() {
    let temp_dir = TempDir::new().unwrap();
    let target = temp_dir.path().join("local-plugin");
    let registry = Arc::new(FakeRegistry::new(&["1.0.0"]));
    let installer = Arc::new(FakeInstaller::new(""));

    let descriptor = PackageDescriptor {
        name: "demo".to_string(),
        version: LATEST.to_string(),
        target_path: target.clone(),
        store_dir: None,
    };
    let mut pkg = package(descriptor, &registry, &installer);

    assert!(!pkg.is_cache_mode());
    assert!(!pkg.exists().await.unwrap());
    assert_eq!(pkg.root_file_path(), None);

    common::write_module(&target, &status_plugin(0));
    assert!(pkg.exists().await.unwrap());
    assert_eq!(pkg.update().await.unwrap(), UpdateOutcome::Skipped);
    assert_eq!(
        pkg.root_file_path(),
        Some(target.join("lib").join("index.wat"))
    );
    assert_eq!(registry.calls(), 0);
}

#[test]
fn test_descriptor_validation() {
    let registry = Arc::new(FakeRegistry::new(&[]));
    let installer = Arc::new(FakeInstaller::new(""));
    let absolute = std::env::temp_dir();

    let cases = [
        ("", LATEST, absolute.clone(), None),
        ("demo", "not-a-version", absolute.clone(), None),
        ("demo", LATEST, PathBuf::from("relative/path"), None),
        ("demo", LATEST, absolute.clone(), Some(PathBuf::from("relative/store"))),
    ];

    for (name, version, target_path, store_dir) in cases {
        let descriptor = PackageDescriptor {
            name: name.to_string(),
            version: version.to_string(),
            target_path,
            store_dir,
        };
        let err = PluginPackage::new(descriptor, registry.clone(), installer.clone()).unwrap_err();
        assert!(matches!(err, PluginError::Validation(_)), "{name} {version}");
    }
}
