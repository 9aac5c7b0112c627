//! modcli - a CLI whose subcommands are resolved from a package registry
//!
//! Every command names a registry module. The module is cached per version
//! under the modcli home and its entry point is run in process or in a
//! freshly spawned copy of this executable.

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use std::path::{Path, PathBuf};
use tracing::{debug, error, info};
use tracing_subscriber::EnvFilter;

use modcli_core::config::HOME_ENV;
use modcli_core::exec::{run_plugin_host, WasmLoader, PLUGIN_HOST_COMMAND};
use modcli_core::registry::HttpRegistry;
use modcli_core::update_check::check_global_update;
use modcli_core::{CliConfig, Dispatcher, ExecOutcome, ExecutionMode, Invocation};

/// Log levels
#[derive(Debug, Clone, ValueEnum)]
enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    fn to_filter_directive(&self) -> &'static str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }
}

#[derive(Parser, Debug)]
#[clap(
    name = "modcli",
    about = "Command line tool whose commands are installed on demand from a package registry",
    version
)]
struct Cli {
    #[clap(subcommand)]
    command: Command,

    /// Verbose logging and full error details
    #[clap(long, global = true)]
    debug: bool,

    /// Set log level
    #[clap(long, default_value = "info", global = true)]
    log_level: LogLevel,

    /// Run the module found at this path instead of the cached registry copy
    #[clap(long, global = true)]
    target_path: Option<PathBuf>,

    /// Override the modcli home directory (default: ~/.modcli)
    #[clap(long, global = true)]
    home: Option<PathBuf>,

    /// Override the package registry URL
    #[clap(long, global = true)]
    registry: Option<String>,

    /// How plugins are run: in-process or subprocess
    #[clap(long, global = true)]
    execution: Option<ExecutionMode>,

    /// Skip the check for a newer modcli release
    #[clap(long, global = true)]
    no_update_check: bool,
}

#[derive(Parser, Debug)]
enum Command {
    /// Create a new project
    Init {
        /// Name of the project to create
        project_name: Option<String>,

        /// Overwrite existing files
        #[clap(short, long)]
        force: bool,
    },

    /// Run a plugin entry point with a serialized invocation (internal)
    #[clap(name = PLUGIN_HOST_COMMAND, hide = true)]
    PluginHost {
        #[clap(long)]
        entry: PathBuf,

        #[clap(long)]
        payload: PathBuf,
    },

    /// Any other command is looked up in the command table
    #[clap(external_subcommand)]
    External(Vec<String>),
}

/// Initialize tracing with CLI flags
///
/// `--debug` forces debug level regardless of `--log-level`.
fn initialize_tracing(log_level: &LogLevel, debug: bool) {
    let directive = if debug {
        "debug"
    } else {
        log_level.to_filter_directive()
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(directive))
        .with_target(false)
        .with_writer(std::io::stderr) // stdout belongs to plugins
        .init();
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    initialize_tracing(&cli.log_level, cli.debug);

    let debug_details = cli.debug;
    let code = match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            error!("{:#}", e);
            if debug_details {
                eprintln!("{e:?}");
            }
            1
        }
    };

    std::process::exit(code);
}

/// Run the parsed command and return the process exit code
async fn run(cli: Cli) -> Result<i32> {
    let invocation = match &cli.command {
        Command::PluginHost { entry, payload } => {
            let loader = WasmLoader::new().context("Failed to initialize plugin runtime")?;
            return Ok(run_plugin_host(&loader, entry, payload));
        }
        Command::Init {
            project_name,
            force,
        } => init_invocation(project_name.clone(), *force),
        Command::External(tokens) => external_invocation(tokens),
    };

    info!("modcli version {}", env!("CARGO_PKG_VERSION"));

    let config = build_config(&cli)?;
    debug!("Using modcli home {}", config.home_path.display());

    if !cli.no_update_check {
        let registry = HttpRegistry::new(config.registry_url.clone())?;
        check_global_update(&registry, "modcli", env!("CARGO_PKG_VERSION")).await;
    }

    let invocation = with_internals(invocation, cli.debug, config.target_path.as_deref());
    let dispatcher = Dispatcher::from_config(&config)?;

    match dispatcher.dispatch(&invocation).await? {
        ExecOutcome::Completed | ExecOutcome::NoEntryPoint => Ok(0),
        ExecOutcome::Exited(code) => Ok(code),
    }
}

/// Assemble the configuration once: defaults, then `config.yaml`, then flags
fn build_config(cli: &Cli) -> Result<CliConfig> {
    let home_override = cli
        .home
        .clone()
        .map(PathBuf::into_os_string)
        .or_else(|| std::env::var_os(HOME_ENV));
    let home_path = CliConfig::resolve_home(home_override.as_deref())?;

    let mut config = CliConfig::load(home_path)?;
    if let Some(registry) = &cli.registry {
        config = config.with_registry(registry.clone());
    }
    if let Some(execution) = cli.execution {
        config = config.with_execution(execution);
    }

    let target_path = match &cli.target_path {
        Some(path) => Some(absolute_path(path)?),
        None => None,
    };

    Ok(config.with_target_path(target_path))
}

fn absolute_path(path: &Path) -> Result<PathBuf> {
    if path.is_absolute() {
        return Ok(path.to_path_buf());
    }
    let cwd = std::env::current_dir().context("Failed to read current directory")?;
    Ok(cwd.join(path))
}

fn init_invocation(project_name: Option<String>, force: bool) -> Invocation {
    let invocation = Invocation::new("init").with_args(project_name);
    if force {
        invocation.with_option("force", true)
    } else {
        invocation
    }
}

/// `<command> [tokens...]` as captured by clap
fn external_invocation(tokens: &[String]) -> Invocation {
    match tokens.split_first() {
        Some((name, rest)) => Invocation::from_tokens(name.clone(), rest.iter().cloned()),
        None => Invocation::new(""),
    }
}

/// Host-only details that reach in-process plugins but never the subprocess payload
fn with_internals(invocation: Invocation, debug: bool, target_path: Option<&Path>) -> Invocation {
    let invocation = invocation.with_internal("debug", debug);
    match target_path {
        Some(path) => invocation.with_internal("targetPath", path.display().to_string()),
        None => invocation,
    }
}
