//! Runtime configuration
//!
//! A [`CliConfig`] is built once at startup (defaults, then the optional
//! `<home>/config.yaml`, then command-line overrides applied by the binary)
//! and passed by reference to every component that needs it.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::error::{PluginError, Result};

/// Directory under the user's home holding modcli state
pub const DEFAULT_CLI_HOME: &str = ".modcli";

/// Environment variable naming an alternative home (read once at startup)
pub const HOME_ENV: &str = "MODCLI_HOME";

/// Install target directory under the home path
pub const CACHE_DIR: &str = "dependencies";

/// Cache root under the install target
pub const STORE_DIR: &str = "node_modules";

/// Optional configuration file under the home path
pub const CONFIG_FILE: &str = "config.yaml";

/// Default package registry
pub const DEFAULT_REGISTRY_URL: &str = "https://registry.npmjs.org";

/// Built-in command table
const DEFAULT_COMMANDS: &[(&str, &str)] = &[("init", "@modcli/init")];

/// How a resolved plugin is run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ExecutionMode {
    /// Load the entry point into this process and call it
    #[default]
    InProcess,
    /// Re-enter the entry point from a freshly spawned process
    Subprocess,
}

impl FromStr for ExecutionMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "in-process" | "inprocess" => Ok(ExecutionMode::InProcess),
            "subprocess" | "out-of-process" => Ok(ExecutionMode::Subprocess),
            other => Err(format!(
                "Unknown execution mode '{other}'. Expected 'in-process' or 'subprocess'"
            )),
        }
    }
}

/// On-disk shape of `config.yaml`; every field is optional
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ConfigFile {
    pub registry: Option<String>,
    pub execution: Option<ExecutionMode>,
    pub commands: BTreeMap<String, String>,
}

impl ConfigFile {
    pub fn from_yaml(content: &str) -> Result<Self> {
        serde_yaml_ng::from_str(content)
            .map_err(|e| PluginError::Validation(format!("Invalid {CONFIG_FILE}: {e}")))
    }
}

#[derive(Debug, Clone)]
pub struct CliConfig {
    /// Root of all modcli state (`~/.modcli` by default)
    pub home_path: PathBuf,
    /// Debug override: run the module found at this path, no cache
    pub target_path: Option<PathBuf>,
    pub registry_url: String,
    pub execution: ExecutionMode,
    /// Command name -> registry module name
    pub commands: BTreeMap<String, String>,
}

impl CliConfig {
    /// Defaults rooted at `home_path`
    pub fn new(home_path: PathBuf) -> Self {
        Self {
            home_path,
            target_path: None,
            registry_url: DEFAULT_REGISTRY_URL.to_string(),
            execution: ExecutionMode::default(),
            commands: DEFAULT_COMMANDS
                .iter()
                .map(|(cmd, pkg)| (cmd.to_string(), pkg.to_string()))
                .collect(),
        }
    }

    /// Defaults merged with `<home_path>/config.yaml` when it exists
    pub fn load(home_path: PathBuf) -> Result<Self> {
        let mut config = Self::new(home_path);
        let config_path = config.home_path.join(CONFIG_FILE);

        if config_path.is_file() {
            let content = std::fs::read_to_string(&config_path)
                .map_err(|e| PluginError::filesystem(&config_path, e))?;
            config.apply_file(ConfigFile::from_yaml(&content)?);
            tracing::debug!("Loaded configuration from {}", config_path.display());
        }

        Ok(config)
    }

    pub fn apply_file(&mut self, file: ConfigFile) {
        if let Some(registry) = file.registry {
            self.registry_url = registry;
        }
        if let Some(execution) = file.execution {
            self.execution = execution;
        }
        self.commands.extend(file.commands);
    }

    /// Resolve the home path from an optional override.
    ///
    /// A relative override is taken relative to the user's home directory.
    pub fn resolve_home(home_override: Option<&OsStr>) -> Result<PathBuf> {
        let user_home = directories::BaseDirs::new()
            .map(|dirs| dirs.home_dir().to_path_buf())
            .filter(|home| home.exists());

        match (home_override, user_home) {
            (Some(path), _) if Path::new(path).is_absolute() => Ok(PathBuf::from(path)),
            (Some(path), Some(home)) => Ok(home.join(path)),
            (None, Some(home)) => Ok(home.join(DEFAULT_CLI_HOME)),
            (_, None) => Err(PluginError::Validation(
                "Current user home directory does not exist".to_string(),
            )),
        }
    }

    pub fn with_target_path(mut self, target_path: Option<PathBuf>) -> Self {
        self.target_path = target_path.filter(|p| !p.as_os_str().is_empty());
        self
    }

    pub fn with_registry(mut self, registry_url: impl Into<String>) -> Self {
        self.registry_url = registry_url.into();
        self
    }

    pub fn with_execution(mut self, execution: ExecutionMode) -> Self {
        self.execution = execution;
        self
    }

    /// Install target used in cache mode
    pub fn cache_target(&self) -> PathBuf {
        self.home_path.join(CACHE_DIR)
    }

    /// Cache root used in cache mode
    pub fn store_dir(&self) -> PathBuf {
        self.cache_target().join(STORE_DIR)
    }

    pub fn package_for_command(&self, command: &str) -> Option<&str> {
        self.commands.get(command).map(String::as_str)
    }

    pub fn command_names(&self) -> Vec<&str> {
        self.commands.keys().map(String::as_str).collect()
    }
}
