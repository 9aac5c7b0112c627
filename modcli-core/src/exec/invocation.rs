//! Command invocations and the payload handed to plugin host processes

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::Path;

use crate::error::{PluginError, Result};

/// Payload schema version understood by `__plugin-host`
pub const PAYLOAD_FORMAT: u32 = 1;

/// The arguments of the command being dispatched
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Invocation {
    /// Command name used to look up the module. Internal.
    pub command: String,
    /// Positional arguments
    pub args: Vec<String>,
    /// Public options, forwarded everywhere
    pub options: BTreeMap<String, Value>,
    /// Process-local settings (debug flags, override paths). Never forwarded
    /// to child processes.
    pub internal: BTreeMap<String, Value>,
}

impl Invocation {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            ..Default::default()
        }
    }

    pub fn with_args(mut self, args: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn with_option(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.options.insert(key.into(), value.into());
        self
    }

    pub fn with_internal(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.internal.insert(key.into(), value.into());
        self
    }

    /// Build from raw tokens of an unrecognised subcommand.
    ///
    /// `--key=value` and `--flag` become options (`-f` is a flag named `f`);
    /// everything else, and everything after `--`, is positional.
    pub fn from_tokens<I, S>(command: impl Into<String>, tokens: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut invocation = Self::new(command);
        let mut positional_only = false;

        for token in tokens {
            let token = token.as_ref();
            if positional_only {
                invocation.args.push(token.to_string());
                continue;
            }

            if token == "--" {
                positional_only = true;
            } else if let Some(long) = token.strip_prefix("--") {
                match long.split_once('=') {
                    Some((key, value)) => invocation.options.insert(key.to_string(), Value::from(value)),
                    None => invocation.options.insert(long.to_string(), Value::Bool(true)),
                };
            } else if let Some(short) = token.strip_prefix('-').filter(|s| !s.is_empty()) {
                for flag in short.chars() {
                    invocation.options.insert(flag.to_string(), Value::Bool(true));
                }
            } else {
                invocation.args.push(token.to_string());
            }
        }

        invocation
    }

    /// JSON handed to an in-process plugin: the complete invocation
    pub fn to_input(&self) -> Value {
        serde_json::json!({
            "command": self.command,
            "args": self.args,
            "options": self.options,
            "internal": self.internal,
        })
    }
}

/// What a plugin host process receives: positional arguments and public
/// options only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct InvocationPayload {
    pub format: u32,
    pub args: Vec<String>,
    #[serde(default)]
    pub options: BTreeMap<String, Value>,
}

impl From<&Invocation> for InvocationPayload {
    fn from(invocation: &Invocation) -> Self {
        Self {
            format: PAYLOAD_FORMAT,
            args: invocation.args.clone(),
            options: invocation.options.clone(),
        }
    }
}

impl InvocationPayload {
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self)
            .map_err(|e| PluginError::Execution(format!("failed to serialize invocation: {e}")))
    }

    /// Parse and validate a payload
    pub fn from_json(content: &str) -> Result<Self> {
        let payload: Self = serde_json::from_str(content)
            .map_err(|e| PluginError::Validation(format!("invalid invocation payload: {e}")))?;

        if payload.format != PAYLOAD_FORMAT {
            return Err(PluginError::Validation(format!(
                "unsupported invocation payload format {} (expected {PAYLOAD_FORMAT})",
                payload.format
            )));
        }

        Ok(payload)
    }

    pub fn read_from(path: &Path) -> Result<Self> {
        let content =
            std::fs::read_to_string(path).map_err(|e| PluginError::filesystem(path, e))?;
        Self::from_json(&content)
    }

    /// JSON handed to the plugin inside the host process
    pub fn to_input(&self) -> Value {
        serde_json::json!({
            "args": self.args,
            "options": self.options,
        })
    }
}
