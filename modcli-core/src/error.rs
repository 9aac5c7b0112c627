use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PluginError {
    #[error("Invalid input: {0}")]
    Validation(String),

    #[error("Registry unavailable for '{name}': {reason}")]
    RegistryUnavailable { name: String, reason: String },

    #[error("No versions available for '{0}'")]
    NoVersionsAvailable(String),

    #[error("Filesystem error at {}: {source}", path.display())]
    Filesystem {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to install {name}@{version}: {reason}")]
    Install {
        name: String,
        version: String,
        reason: String,
    },

    #[error("Plugin execution failed: {0}")]
    Execution(String),

    #[error("Failed to spawn '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
}

impl PluginError {
    pub fn filesystem(path: &Path, source: std::io::Error) -> Self {
        PluginError::Filesystem {
            path: path.to_path_buf(),
            source,
        }
    }

    pub fn registry(name: &str, reason: impl std::fmt::Display) -> Self {
        PluginError::RegistryUnavailable {
            name: name.to_string(),
            reason: reason.to_string(),
        }
    }

    pub fn install(name: &str, version: &str, reason: impl std::fmt::Display) -> Self {
        PluginError::Install {
            name: name.to_string(),
            version: version.to_string(),
            reason: reason.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, PluginError>;
