//! Entry point discovery
//!
//! Walks up from a module root to the nearest `package.json` and resolves its
//! `main` field against the manifest's directory.

use serde::Deserialize;
use std::path::{Component, Path, PathBuf};

/// Manifest file name at a module's root
pub const MANIFEST_FILE: &str = "package.json";

/// The subset of a module manifest this crate reads
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ModuleManifest {
    /// Entry file, relative to the manifest's directory
    #[serde(default)]
    pub main: Option<String>,
}

impl ModuleManifest {
    pub fn from_dir(dir: &Path) -> Option<Self> {
        let path = dir.join(MANIFEST_FILE);
        let content = match std::fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) => {
                tracing::debug!("Cannot read {}: {}", path.display(), e);
                return None;
            }
        };

        match serde_json::from_str(&content) {
            Ok(manifest) => Some(manifest),
            Err(e) => {
                tracing::warn!("Ignoring malformed manifest {}: {}", path.display(), e);
                None
            }
        }
    }
}

/// Nearest ancestor of `start` (inclusive) containing a manifest file
pub fn find_module_dir(start: &Path) -> Option<PathBuf> {
    let start = absolutize(start);
    start
        .ancestors()
        .find(|dir| dir.join(MANIFEST_FILE).is_file())
        .map(Path::to_path_buf)
}

/// Absolute, separator-normalised path of the entry file for the module
/// containing `start`, or `None` when no manifest declares one.
pub fn resolve_entry(start: &Path) -> Option<PathBuf> {
    let dir = find_module_dir(start)?;
    let manifest = ModuleManifest::from_dir(&dir)?;
    let main = manifest.main.filter(|m| !m.trim().is_empty())?;

    let entry = normalize_lexically(&dir.join(main));
    tracing::debug!("Resolved entry point {}", entry.display());
    Some(format_path(&entry))
}

/// Rewrite `\` separators to `/` on platforms that use them
pub fn format_path(path: &Path) -> PathBuf {
    if std::path::MAIN_SEPARATOR == '/' {
        path.to_path_buf()
    } else {
        PathBuf::from(path.to_string_lossy().replace('\\', "/"))
    }
}

fn absolutize(path: &Path) -> PathBuf {
    if path.is_absolute() {
        return normalize_lexically(path);
    }
    match std::env::current_dir() {
        Ok(cwd) => normalize_lexically(&cwd.join(path)),
        Err(_) => path.to_path_buf(),
    }
}

/// Drop `.` components and fold `..` without touching the filesystem
fn normalize_lexically(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}
