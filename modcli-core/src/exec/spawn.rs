//! Child process spawning

use std::ffi::OsString;
use std::process::{ExitStatus, Stdio};

use crate::error::{PluginError, Result};

/// Hidden subcommand through which a spawned process re-enters a plugin
pub const PLUGIN_HOST_COMMAND: &str = "__plugin-host";

/// A program and its arguments, ready to spawn
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChildCommand {
    pub program: OsString,
    pub args: Vec<OsString>,
}

/// Apply the spawn policy for the current platform
pub fn platform_command(program: impl Into<OsString>, args: Vec<OsString>) -> ChildCommand {
    wrap_for_platform(program.into(), args, cfg!(windows))
}

/// On Windows run through `cmd /c`; elsewhere invoke the program directly
pub fn wrap_for_platform(program: OsString, args: Vec<OsString>, windows: bool) -> ChildCommand {
    if !windows {
        return ChildCommand { program, args };
    }

    let mut wrapped = Vec::with_capacity(args.len() + 2);
    wrapped.push(OsString::from("/c"));
    wrapped.push(program);
    wrapped.extend(args);

    ChildCommand {
        program: OsString::from("cmd"),
        args: wrapped,
    }
}

/// Spawn with inherited stdio and wait for the exit code
pub async fn run_child(command: &ChildCommand) -> Result<i32> {
    tracing::debug!("Spawning {:?} {:?}", command.program, command.args);

    let status = tokio::process::Command::new(&command.program)
        .args(&command.args)
        .stdin(Stdio::inherit())
        .stdout(Stdio::inherit())
        .stderr(Stdio::inherit())
        .status()
        .await
        .map_err(|source| PluginError::Spawn {
            program: command.program.to_string_lossy().into_owned(),
            source,
        })?;

    Ok(exit_code(status))
}

/// Exit code of a finished child; termination by signal counts as 1
pub fn exit_code(status: ExitStatus) -> i32 {
    match status.code() {
        Some(code) => code,
        None => {
            tracing::warn!("Child process terminated by signal ({})", status);
            1
        }
    }
}
