//! Module installation
//!
//! Downloads a published tarball, checks its digest and unpacks it into a
//! cache directory. Unpacking goes to a staging directory beside the
//! destination which is then renamed into place, so a failed install never
//! leaves a half-populated cache entry behind.

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use std::io::Cursor;
use std::path::{Component, Path, PathBuf};

use super::entry::MANIFEST_FILE;
use crate::error::{PluginError, Result};
use crate::registry::{HttpRegistry, Registry};

/// Materialises `name@version` into a directory
#[async_trait]
pub trait Installer: Send + Sync {
    async fn install(&self, name: &str, version: &str, dest: &Path) -> Result<()>;
}

/// Installs registry tarballs
#[derive(Debug, Clone)]
pub struct TarballInstaller {
    registry: HttpRegistry,
}

impl TarballInstaller {
    pub fn new(registry: HttpRegistry) -> Self {
        Self { registry }
    }

    async fn download(&self, name: &str, version: &str, url: &str) -> Result<Vec<u8>> {
        tracing::info!("Downloading {}@{} from {}", name, version, url);

        let response = self
            .registry
            .http_client()
            .get(url)
            .send()
            .await
            .map_err(|e| PluginError::install(name, version, format!("download failed: {e}")))?;

        if !response.status().is_success() {
            return Err(PluginError::install(
                name,
                version,
                format!("HTTP {} for {url}", response.status()),
            ));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| PluginError::install(name, version, format!("failed to read download: {e}")))?;

        Ok(bytes.to_vec())
    }
}

#[async_trait]
impl Installer for TarballInstaller {
    async fn install(&self, name: &str, version: &str, dest: &Path) -> Result<()> {
        let metadata = self
            .registry
            .fetch_metadata(name)
            .await
            .map_err(|e| PluginError::install(name, version, e))?;

        let dist = metadata
            .dist_for(version)
            .ok_or_else(|| PluginError::install(name, version, "no download URL published"))?;

        let bytes = self.download(name, version, &dist.tarball).await?;

        match &dist.digest {
            Some(expected) => {
                verify_digest(&bytes, expected).map_err(|e| PluginError::install(name, version, e))?;
                tracing::debug!("Verified digest: {}", expected);
            }
            None => tracing::debug!("No digest published for {}@{}", name, version),
        }

        let dest = dest.to_path_buf();
        let (name_owned, version_owned) = (name.to_string(), version.to_string());
        tokio::task::spawn_blocking(move || install_tarball(&bytes, &dest))
            .await
            .map_err(|e| PluginError::install(&name_owned, &version_owned, e))?
            .map_err(|e| PluginError::install(&name_owned, &version_owned, e))?;

        tracing::info!("Installed {}@{}", name, version);
        Ok(())
    }
}

/// Check a `sha256:<hex>` digest
pub fn verify_digest(bytes: &[u8], expected: &str) -> std::result::Result<(), String> {
    let actual = format!("sha256:{}", hex::encode(Sha256::digest(bytes)));

    if !actual.eq_ignore_ascii_case(expected) {
        return Err(format!(
            "digest verification failed (expected {expected}, actual {actual})"
        ));
    }

    Ok(())
}

/// Unpack a gzip tarball into `dest` through a staging directory.
///
/// `dest` may be missing or an empty directory. A `dest` that already holds
/// a module manifest is a finished install (another installer got there
/// first) and is kept. Any other existing `dest` is refused.
pub fn install_tarball(bytes: &[u8], dest: &Path) -> std::result::Result<(), String> {
    let parent = dest
        .parent()
        .ok_or_else(|| format!("invalid install destination {}", dest.display()))?;
    std::fs::create_dir_all(parent)
        .map_err(|e| format!("failed to create {}: {e}", parent.display()))?;

    let staging = tempfile::Builder::new()
        .prefix(".staging-")
        .tempdir_in(parent)
        .map_err(|e| format!("failed to create staging directory: {e}"))?;

    unpack_stripped(bytes, staging.path())?;

    if dest.exists() {
        if is_installed_module(dest) {
            tracing::debug!("{} appeared during install, keeping existing copy", dest.display());
            return Ok(());
        }
        if !is_empty_dir(dest) {
            return Err(format!(
                "{} already exists and is not an installed module",
                dest.display()
            ));
        }
        std::fs::remove_dir(dest)
            .map_err(|e| format!("failed to replace empty {}: {e}", dest.display()))?;
    }

    match std::fs::rename(staging.path(), dest) {
        Ok(()) => Ok(()),
        Err(_) if is_installed_module(dest) => {
            tracing::debug!("{} appeared during install, keeping existing copy", dest.display());
            Ok(())
        }
        Err(e) => Err(format!(
            "failed to move staged install to {}: {e}",
            dest.display()
        )),
    }
}

fn is_installed_module(dir: &Path) -> bool {
    dir.join(MANIFEST_FILE).is_file()
}

fn is_empty_dir(dir: &Path) -> bool {
    std::fs::read_dir(dir).is_ok_and(|mut entries| entries.next().is_none())
}

/// Unpack, dropping the archive's top-level directory (`package/` for npm)
fn unpack_stripped(bytes: &[u8], dest: &Path) -> std::result::Result<(), String> {
    let decoder = flate2::read::GzDecoder::new(Cursor::new(bytes));
    let mut archive = tar::Archive::new(decoder);

    let entries = archive
        .entries()
        .map_err(|e| format!("failed to read tarball: {e}"))?;

    for entry in entries {
        let mut entry = entry.map_err(|e| format!("corrupt tarball entry: {e}"))?;
        let path = entry
            .path()
            .map_err(|e| format!("invalid path in tarball: {e}"))?
            .into_owned();

        let Some(relative) = strip_first_component(&path)? else {
            continue;
        };

        let target = dest.join(&relative);
        if let Some(parent) = target.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| format!("failed to create {}: {e}", parent.display()))?;
        }
        entry
            .unpack(&target)
            .map_err(|e| format!("failed to extract {}: {e}", relative.display()))?;
    }

    Ok(())
}

fn strip_first_component(path: &Path) -> std::result::Result<Option<PathBuf>, String> {
    let mut relative = PathBuf::new();
    for component in path.components().skip(1) {
        match component {
            Component::Normal(part) => relative.push(part),
            Component::CurDir => {}
            _ => return Err(format!("refusing unsafe path in tarball: {}", path.display())),
        }
    }

    Ok((!relative.as_os_str().is_empty()).then_some(relative))
}
