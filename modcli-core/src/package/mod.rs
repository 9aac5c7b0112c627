//! Plugin package lifecycle
//!
//! A [`PluginPackage`] ties one registry module to a location on disk and
//! implements the minimal-work install/update cycle:
//!
//! ```text
//! constructed -> exists? -> install | update | skip -> entry resolved
//! ```
//!
//! Mode is fixed at construction. With a store directory the package lives
//! in the versioned cache (`<store>/_<name>@<version>@<name>`); without one
//! the target path is used as-is (local debugging).

pub mod entry;
pub mod installer;

use semver::Version;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::cache::{self, CacheKey};
use crate::error::{PluginError, Result};
use crate::registry::{version, Registry};

pub use entry::{resolve_entry, ModuleManifest, MANIFEST_FILE};
pub use installer::{Installer, TarballInstaller};

/// Version sentinel resolved against the registry before use
pub const LATEST: &str = "latest";

/// Identifies the module to resolve
#[derive(Debug, Clone)]
pub struct PackageDescriptor {
    pub name: String,
    /// Concrete semver version or [`LATEST`]
    pub version: String,
    pub target_path: PathBuf,
    /// Cache root; `Some` selects cache mode
    pub store_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Mode {
    Direct,
    Cache { store_dir: PathBuf },
}

/// Result of [`PluginPackage::update`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateOutcome {
    /// A newer version was installed
    Installed { version: String },
    /// The newest version was already cached
    UpToDate { version: String },
    /// Direct mode never updates
    Skipped,
}

pub struct PluginPackage {
    name: String,
    version: String,
    target_path: PathBuf,
    mode: Mode,
    registry: Arc<dyn Registry>,
    installer: Arc<dyn Installer>,
}

impl std::fmt::Debug for PluginPackage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginPackage")
            .field("name", &self.name)
            .field("version", &self.version)
            .field("target_path", &self.target_path)
            .field("mode", &self.mode)
            .finish_non_exhaustive()
    }
}

impl PluginPackage {
    pub fn new(
        descriptor: PackageDescriptor,
        registry: Arc<dyn Registry>,
        installer: Arc<dyn Installer>,
    ) -> Result<Self> {
        let PackageDescriptor {
            name,
            version,
            target_path,
            store_dir,
        } = descriptor;

        if name.trim().is_empty() {
            return Err(PluginError::Validation("package name must not be empty".to_string()));
        }
        if version != LATEST {
            Version::parse(&version).map_err(|e| {
                PluginError::Validation(format!("invalid version '{version}' for {name}: {e}"))
            })?;
        }
        if !target_path.is_absolute() {
            return Err(PluginError::Validation(format!(
                "target path must be absolute: {}",
                target_path.display()
            )));
        }

        let mode = match store_dir {
            Some(store_dir) if !store_dir.is_absolute() => {
                return Err(PluginError::Validation(format!(
                    "store directory must be absolute: {}",
                    store_dir.display()
                )))
            }
            Some(store_dir) => Mode::Cache { store_dir },
            None => Mode::Direct,
        };

        Ok(Self {
            name,
            version,
            target_path,
            mode,
            registry,
            installer,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Current version; [`LATEST`] until resolved
    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn target_path(&self) -> &Path {
        &self.target_path
    }

    pub fn store_dir(&self) -> Option<&Path> {
        match &self.mode {
            Mode::Cache { store_dir } => Some(store_dir),
            Mode::Direct => None,
        }
    }

    pub fn is_cache_mode(&self) -> bool {
        matches!(self.mode, Mode::Cache { .. })
    }

    /// Cache directory for the current version (cache mode only)
    pub fn cache_file_path(&self) -> Option<PathBuf> {
        self.specific_cache_path(&self.version)
    }

    /// Cache directory for an arbitrary version (cache mode only)
    pub fn specific_cache_path(&self, version: &str) -> Option<PathBuf> {
        self.store_dir()
            .map(|store| cache::cache_path(store, &CacheKey::new(&self.name, version)))
    }

    /// Ensure the store exists and pin [`LATEST`] to a concrete version
    async fn prepare(&mut self) -> Result<()> {
        if let Some(store_dir) = self.store_dir() {
            cache::ensure_root_exists(store_dir)?;
        }

        if self.version == LATEST {
            let latest = self.fetch_latest().await?;
            tracing::debug!("Resolved {}@{} to {}", self.name, LATEST, latest);
            self.version = latest;
        }

        Ok(())
    }

    async fn fetch_latest(&self) -> Result<String> {
        let versions = self.registry.fetch_versions(&self.name).await?;
        Ok(version::latest_overall(&self.name, &versions)?.to_string())
    }

    /// Whether the module is present on disk.
    ///
    /// Cache mode may query the registry once to pin [`LATEST`]; it never
    /// writes to the cache beyond creating the store root.
    pub async fn exists(&mut self) -> Result<bool> {
        if !self.is_cache_mode() {
            return Ok(self.target_path.exists());
        }

        self.prepare().await?;
        Ok(self.cache_file_path().is_some_and(|p| p.is_dir()))
    }

    /// Install the current version
    pub async fn install(&mut self) -> Result<()> {
        self.prepare().await?;

        let dest = self
            .cache_file_path()
            .unwrap_or_else(|| self.target_path.clone());
        tracing::debug!("Installing {}@{} into {}", self.name, self.version, dest.display());

        self.install_version(&self.version, &dest).await
    }

    /// Install the registry's newest version unless it is already cached.
    ///
    /// Queries the version list exactly once per call. When an install
    /// follows, the installer makes its own download-metadata request.
    /// Older cached versions stay.
    pub async fn update(&mut self) -> Result<UpdateOutcome> {
        let Some(store_dir) = self.store_dir() else {
            tracing::debug!("Direct mode, not updating {}", self.name);
            return Ok(UpdateOutcome::Skipped);
        };
        cache::ensure_root_exists(store_dir)?;

        let latest = self.fetch_latest().await?;
        let latest_path = self
            .specific_cache_path(&latest)
            .ok_or_else(|| PluginError::Validation("cache mode without store".to_string()))?;

        if latest_path.is_dir() {
            if self.version == LATEST {
                self.version = latest.clone();
            }
            tracing::debug!("{}@{} is up to date", self.name, latest);
            return Ok(UpdateOutcome::UpToDate { version: latest });
        }

        tracing::info!("Updating {} to {}", self.name, latest);
        self.install_version(&latest, &latest_path).await?;
        self.version = latest.clone();

        Ok(UpdateOutcome::Installed { version: latest })
    }

    async fn install_version(&self, version: &str, dest: &Path) -> Result<()> {
        self.installer
            .install(&self.name, version, dest)
            .await
            .map_err(|e| match e {
                PluginError::Install { .. } => e,
                other => PluginError::install(&self.name, version, other),
            })
    }

    /// Entry file of the module, or `None` if no manifest declares one
    pub fn root_file_path(&self) -> Option<PathBuf> {
        let root = self
            .cache_file_path()
            .unwrap_or_else(|| self.target_path.clone());
        entry::resolve_entry(&root)
    }
}
