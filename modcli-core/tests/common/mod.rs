//! Shared helpers for modcli-core integration tests
#![allow(dead_code)]

use async_trait::async_trait;
use modcli_core::package::Installer;
use modcli_core::registry::{PackageMetadata, Registry, VersionMetadata};
use modcli_core::{PluginError, Result};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, Once};

static INIT: Once = Once::new();

/// Initialize logging for tests (only once per test run)
pub fn init_test_logging() {
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_test_writer()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .try_init();
    });
}

/// Plugin that returns the status given when the fixture is built
pub fn status_plugin(status: i32) -> String {
    format!(
        r#"(module
             (memory (export "memory") 1)
             (func (export "modcli_alloc") (param i32) (result i32) (i32.const 1024))
             (func (export "modcli_run") (param i32 i32) (result i32) (i32.const {status})))"#
    )
}

/// Plugin that returns the length of the JSON it was given
pub const INPUT_LENGTH_PLUGIN: &str = r#"(module
  (memory (export "memory") 1)
  (func (export "modcli_alloc") (param i32) (result i32) (i32.const 1024))
  (func (export "modcli_run") (param $ptr i32) (param $len i32) (result i32)
    (local.get $len)))"#;

/// Write a module root: `package.json` pointing at `lib/index.wat`
pub fn write_module(root: &Path, wat: &str) {
    std::fs::create_dir_all(root.join("lib")).unwrap();
    std::fs::write(
        root.join("package.json"),
        r#"{"name":"demo","version":"1.0.0","main":"lib/index.wat"}"#,
    )
    .unwrap();
    std::fs::write(root.join("lib").join("index.wat"), wat).unwrap();
}

/// In-memory registry that counts metadata requests
pub struct FakeRegistry {
    versions: Mutex<Vec<String>>,
    calls: AtomicUsize,
    fail: bool,
}

impl FakeRegistry {
    pub fn new(versions: &[&str]) -> Self {
        Self {
            versions: Mutex::new(versions.iter().map(|v| v.to_string()).collect()),
            calls: AtomicUsize::new(0),
            fail: false,
        }
    }

    pub fn unavailable() -> Self {
        Self {
            fail: true,
            ..Self::new(&[])
        }
    }

    pub fn publish(&self, version: &str) {
        self.versions.lock().unwrap().push(version.to_string());
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Registry for FakeRegistry {
    async fn fetch_metadata(&self, name: &str) -> Result<PackageMetadata> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(PluginError::registry(name, "HTTP 503"));
        }

        Ok(PackageMetadata {
            name: Some(name.to_string()),
            versions: self
                .versions
                .lock()
                .unwrap()
                .iter()
                .map(|v| (v.clone(), VersionMetadata::default()))
                .collect(),
        })
    }
}

/// Installer that writes a module with the given plugin source
pub struct FakeInstaller {
    wat: String,
    installs: Mutex<Vec<String>>,
    fail: bool,
}

impl FakeInstaller {
    pub fn new(wat: &str) -> Self {
        Self {
            wat: wat.to_string(),
            installs: Mutex::new(Vec::new()),
            fail: false,
        }
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::new("")
        }
    }

    pub fn install_count(&self) -> usize {
        self.installs.lock().unwrap().len()
    }

    pub fn installed_versions(&self) -> Vec<String> {
        self.installs.lock().unwrap().clone()
    }
}

#[async_trait]
impl Installer for FakeInstaller {
    async fn install(&self, name: &str, version: &str, dest: &Path) -> Result<()> {
        if self.fail {
            return Err(PluginError::registry(name, "tarball missing"));
        }
        write_module(dest, &self.wat);
        self.installs.lock().unwrap().push(version.to_string());
        Ok(())
    }
}
