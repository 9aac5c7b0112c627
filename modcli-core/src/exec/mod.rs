//! Execution bridge
//!
//! Resolves the module behind a command, brings it up to date in the cache
//! and runs its entry point, either in this process or in a child process
//! that re-enters the entry point through [`PLUGIN_HOST_COMMAND`].

pub mod invocation;
pub mod loader;
pub mod spawn;

use std::ffi::OsString;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::config::{CliConfig, ExecutionMode};
use crate::error::{PluginError, Result};
use crate::package::{
    Installer, PackageDescriptor, PluginPackage, TarballInstaller, UpdateOutcome, LATEST,
};
use crate::registry::{HttpRegistry, Registry};

pub use invocation::{Invocation, InvocationPayload, PAYLOAD_FORMAT};
pub use loader::{Plugin, PluginLoader, WasmLoader, ENTRY_SYMBOL};
pub use spawn::{platform_command, run_child, ChildCommand, PLUGIN_HOST_COMMAND};

/// How a dispatched command ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecOutcome {
    /// The in-process plugin returned successfully
    Completed,
    /// The plugin process exited with this code. The caller must exit with it.
    Exited(i32),
    /// The module declares no entry point; nothing was run
    NoEntryPoint,
}

/// Runs a resolved entry point with the configured strategy
pub struct ExecutionBridge {
    mode: ExecutionMode,
    loader: Arc<dyn PluginLoader>,
    host_program: Option<PathBuf>,
}

impl ExecutionBridge {
    pub fn new(mode: ExecutionMode, loader: Arc<dyn PluginLoader>) -> Self {
        Self {
            mode,
            loader,
            host_program: None,
        }
    }

    /// Executable spawned in subprocess mode (defaults to the current one)
    pub fn with_host_program(mut self, program: PathBuf) -> Self {
        self.host_program = Some(program);
        self
    }

    pub async fn run(&self, entry: &Path, invocation: &Invocation) -> Result<ExecOutcome> {
        match self.mode {
            ExecutionMode::InProcess => self.run_in_process(entry, invocation),
            ExecutionMode::Subprocess => self.run_out_of_process(entry, invocation).await,
        }
    }

    fn run_in_process(&self, entry: &Path, invocation: &Invocation) -> Result<ExecOutcome> {
        debug!("Running {} in process", entry.display());
        let plugin = self.loader.load(entry)?;

        match plugin.invoke(&invocation.to_input())? {
            0 => Ok(ExecOutcome::Completed),
            status => Err(PluginError::Execution(format!(
                "plugin '{}' returned status {status}",
                invocation.command
            ))),
        }
    }

    async fn run_out_of_process(&self, entry: &Path, invocation: &Invocation) -> Result<ExecOutcome> {
        let program = match &self.host_program {
            Some(program) => program.clone(),
            None => std::env::current_exe().map_err(|source| PluginError::Spawn {
                program: "<current executable>".to_string(),
                source,
            })?,
        };

        // Kept alive until the child has exited
        let mut payload_file = tempfile::Builder::new()
            .prefix("modcli-invocation-")
            .suffix(".json")
            .tempfile()
            .map_err(|e| PluginError::filesystem(&std::env::temp_dir(), e))?;
        let payload = InvocationPayload::from(invocation).to_json()?;
        payload_file
            .write_all(payload.as_bytes())
            .and_then(|_| payload_file.flush())
            .map_err(|e| PluginError::filesystem(payload_file.path(), e))?;

        let args: Vec<OsString> = vec![
            PLUGIN_HOST_COMMAND.into(),
            "--entry".into(),
            entry.as_os_str().to_owned(),
            "--payload".into(),
            payload_file.path().as_os_str().to_owned(),
        ];
        let command = platform_command(program, args);

        let code = run_child(&command).await?;
        if code == 0 {
            debug!("Plugin process for '{}' exited successfully", invocation.command);
        } else {
            error!("Plugin process for '{}' failed with exit code {}", invocation.command, code);
        }

        Ok(ExecOutcome::Exited(code))
    }
}

/// Child side of subprocess execution: load `entry`, feed it the payload and
/// return the process exit code.
pub fn run_plugin_host(loader: &dyn PluginLoader, entry: &Path, payload_path: &Path) -> i32 {
    let result = InvocationPayload::read_from(payload_path)
        .and_then(|payload| Ok((loader.load(entry)?, payload)))
        .and_then(|(plugin, payload)| plugin.invoke(&payload.to_input()));

    match result {
        Ok(status) => status,
        Err(e) => {
            error!("{}", e);
            1
        }
    }
}

/// Command dispatch: command name -> module -> cached install -> entry -> run
pub struct Dispatcher<'a> {
    config: &'a CliConfig,
    registry: Arc<dyn Registry>,
    installer: Arc<dyn Installer>,
    bridge: ExecutionBridge,
}

impl<'a> Dispatcher<'a> {
    pub fn new(
        config: &'a CliConfig,
        registry: Arc<dyn Registry>,
        installer: Arc<dyn Installer>,
        bridge: ExecutionBridge,
    ) -> Self {
        Self {
            config,
            registry,
            installer,
            bridge,
        }
    }

    /// Production wiring: HTTP registry, tarball installer, WASM loader
    pub fn from_config(config: &'a CliConfig) -> Result<Self> {
        let registry = HttpRegistry::new(config.registry_url.clone())?;
        let installer = TarballInstaller::new(registry.clone());
        let bridge = ExecutionBridge::new(config.execution, Arc::new(WasmLoader::new()?));

        Ok(Self::new(config, Arc::new(registry), Arc::new(installer), bridge))
    }

    /// Package for a command, in direct mode when a target path is configured
    pub fn package_for(&self, command: &str) -> Result<PluginPackage> {
        let name = self.config.package_for_command(command).ok_or_else(|| {
            PluginError::Validation(format!(
                "Unknown command '{command}'. Available commands: {}",
                self.config.command_names().join(", ")
            ))
        })?;

        let (target_path, store_dir) = match &self.config.target_path {
            Some(target_path) => (target_path.clone(), None),
            None => (self.config.cache_target(), Some(self.config.store_dir())),
        };
        debug!("targetPath: {}", target_path.display());
        if let Some(store_dir) = &store_dir {
            debug!("storeDir: {}", store_dir.display());
        }

        PluginPackage::new(
            PackageDescriptor {
                name: name.to_string(),
                version: LATEST.to_string(),
                target_path,
                store_dir,
            },
            self.registry.clone(),
            self.installer.clone(),
        )
    }

    /// Install or update a cache-mode package; direct-mode packages are used as found
    pub async fn prepare(&self, package: &mut PluginPackage) -> Result<()> {
        if !package.is_cache_mode() {
            return Ok(());
        }

        if package.exists().await? {
            match package.update().await? {
                UpdateOutcome::Installed { version } => {
                    info!("Updated {} to {}", package.name(), version)
                }
                UpdateOutcome::UpToDate { version } => {
                    debug!("{}@{} already cached", package.name(), version)
                }
                UpdateOutcome::Skipped => {}
            }
        } else {
            package.install().await?;
            info!("Installed {}@{}", package.name(), package.version());
        }

        Ok(())
    }

    pub async fn dispatch(&self, invocation: &Invocation) -> Result<ExecOutcome> {
        let mut package = self.package_for(&invocation.command)?;
        self.prepare(&mut package).await?;

        let Some(entry) = package.root_file_path() else {
            warn!("{} does not declare an entry point", package.name());
            return Ok(ExecOutcome::NoEntryPoint);
        };

        self.bridge.run(&entry, invocation).await
    }
}
