//! modcli core: dynamic plugin resolution and execution
//!
//! Commands are not bundled with the CLI. Each one names a registry module
//! that is resolved to a concrete version, cached under a deterministic
//! `name@version` directory, and run through its declared entry point.

pub mod cache;
pub mod config;
pub mod error;
pub mod exec;
pub mod package;
pub mod registry;
pub mod update_check;

pub use config::{CliConfig, ExecutionMode};
pub use error::{PluginError, Result};
pub use exec::{Dispatcher, ExecOutcome, ExecutionBridge, Invocation};
pub use package::{PackageDescriptor, PluginPackage, UpdateOutcome};
