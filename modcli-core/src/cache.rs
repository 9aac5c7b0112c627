//! Cache store layout
//!
//! Each installed version lives in its own directory under the store root:
//!
//! ```text
//! <store>/_<sanitized-name>@<version>@<name>/
//! ```
//!
//! Nothing here compares versions or touches the network.

use std::fmt;
use std::path::{Path, PathBuf};

use crate::error::{PluginError, Result};

/// Directory key for one `(name, version)` pair
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    pub fn new(name: &str, version: &str) -> Self {
        Self(format!("_{}@{version}@{name}", sanitize_name(name)))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Replace path separators so a scoped name forms a single path segment
pub fn sanitize_name(name: &str) -> String {
    name.replace(['/', '\\'], "_")
}

pub fn cache_path(root: &Path, key: &CacheKey) -> PathBuf {
    root.join(key.as_str())
}

/// Create the store root and its parents. Idempotent.
pub fn ensure_root_exists(root: &Path) -> Result<()> {
    if root.is_dir() {
        return Ok(());
    }

    tracing::debug!("Creating cache root {}", root.display());
    std::fs::create_dir_all(root).map_err(|e| PluginError::filesystem(root, e))
}
