//! Plugin loading
//!
//! Entry points are WebAssembly modules (`.wasm`, or `.wat` text). A module
//! is only accepted when it exports:
//!
//! - `memory`
//! - `modcli_alloc(len: i32) -> i32`, returning a buffer for the input
//! - `modcli_run(ptr: i32, len: i32) -> i32`, the entry symbol
//!
//! The host writes the invocation as JSON into the allocated buffer, calls
//! `modcli_run` and treats the return value as the plugin's status. Modules
//! may import `env.host_print(ptr, len)` and `env.host_log(level, ptr, len)`.

use serde_json::Value;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, instrument};
use wasmtime::{
    Caller, Config, Engine, ExternType, FuncType, Linker, Module, Store, StoreLimits,
    StoreLimitsBuilder, ValType,
};

use crate::error::{PluginError, Result};

/// The well-known entry symbol
pub const ENTRY_SYMBOL: &str = "modcli_run";

/// Input buffer allocator export
pub const ALLOC_SYMBOL: &str = "modcli_alloc";

/// Default cap on guest memory (64 MiB)
pub const DEFAULT_MAX_MEMORY_BYTES: usize = 64 * 1024 * 1024;

const HOST_MODULE: &str = "env";
const HOST_FUNCTIONS: &[&str] = &["host_print", "host_log"];

/// A loaded plugin capability
pub trait Plugin: Send {
    /// Run the plugin with `input`, returning its status (0 = success)
    fn invoke(&self, input: &Value) -> Result<i32>;
}

/// Turns an entry file into a [`Plugin`]
pub trait PluginLoader: Send + Sync {
    fn load(&self, entry: &Path) -> Result<Box<dyn Plugin>>;
}

/// Loads WebAssembly entry points with wasmtime
#[derive(Clone)]
pub struct WasmLoader {
    engine: Engine,
    max_memory_bytes: usize,
}

impl WasmLoader {
    pub fn new() -> Result<Self> {
        Self::with_max_memory(DEFAULT_MAX_MEMORY_BYTES)
    }

    pub fn with_max_memory(max_memory_bytes: usize) -> Result<Self> {
        let config = Config::new();
        let engine = Engine::new(&config)
            .map_err(|e| PluginError::Execution(format!("failed to create WASM engine: {e}")))?;

        Ok(Self {
            engine,
            max_memory_bytes,
        })
    }
}

impl PluginLoader for WasmLoader {
    #[instrument(name = "wasm_load", skip(self, entry), fields(entry = %entry.display()))]
    fn load(&self, entry: &Path) -> Result<Box<dyn Plugin>> {
        match entry.extension().and_then(|e| e.to_str()) {
            Some("wasm") | Some("wat") => {}
            _ => {
                return Err(PluginError::Execution(format!(
                    "unsupported entry point type: {}",
                    entry.display()
                )))
            }
        }

        let module = Module::from_file(&self.engine, entry).map_err(|e| {
            PluginError::Execution(format!("failed to load {}: {e:#}", entry.display()))
        })?;
        validate_module(&module)
            .map_err(|e| PluginError::Execution(format!("{}: {e}", entry.display())))?;

        debug!("Loaded plugin module {}", entry.display());
        Ok(Box::new(WasmPlugin {
            engine: self.engine.clone(),
            module,
            max_memory_bytes: self.max_memory_bytes,
            path: entry.to_path_buf(),
        }))
    }
}

/// Check exports and imports against the plugin ABI
fn validate_module(module: &Module) -> std::result::Result<(), String> {
    let mut has_memory = false;
    let mut has_alloc = false;
    let mut has_entry = false;

    for export in module.exports() {
        match (export.name(), export.ty()) {
            ("memory", ExternType::Memory(_)) => has_memory = true,
            (ALLOC_SYMBOL, ExternType::Func(ty)) => {
                if !signature_is(&ty, 1, 1) {
                    return Err(format!("`{ALLOC_SYMBOL}` must have type (i32) -> i32"));
                }
                has_alloc = true;
            }
            (ENTRY_SYMBOL, ExternType::Func(ty)) => {
                if !signature_is(&ty, 2, 1) {
                    return Err(format!("`{ENTRY_SYMBOL}` must have type (i32, i32) -> i32"));
                }
                has_entry = true;
            }
            _ => {}
        }
    }

    if !has_entry {
        return Err(format!("module does not export `{ENTRY_SYMBOL}`"));
    }
    if !has_alloc {
        return Err(format!("module does not export `{ALLOC_SYMBOL}`"));
    }
    if !has_memory {
        return Err("module does not export `memory`".to_string());
    }

    for import in module.imports() {
        if import.module() != HOST_MODULE || !HOST_FUNCTIONS.contains(&import.name()) {
            return Err(format!(
                "unsupported import `{}.{}`",
                import.module(),
                import.name()
            ));
        }
    }

    Ok(())
}

/// All params and results are i32 with the given arity
fn signature_is(ty: &FuncType, params: usize, results: usize) -> bool {
    ty.params().len() == params
        && ty.results().len() == results
        && ty.params().chain(ty.results()).all(|t| matches!(t, ValType::I32))
}

struct HostState {
    limits: StoreLimits,
}

/// A validated WebAssembly plugin. Each invocation gets a fresh store.
pub struct WasmPlugin {
    engine: Engine,
    module: Module,
    max_memory_bytes: usize,
    path: PathBuf,
}

impl WasmPlugin {
    fn linker(&self) -> wasmtime::Result<Linker<HostState>> {
        let mut linker = Linker::new(&self.engine);

        linker.func_wrap(
            HOST_MODULE,
            "host_print",
            |mut caller: Caller<'_, HostState>, ptr: i32, len: i32| -> wasmtime::Result<()> {
                let text = read_guest_string(&mut caller, ptr, len)?;
                let mut stdout = std::io::stdout().lock();
                stdout.write_all(text.as_bytes())?;
                stdout.flush()?;
                Ok(())
            },
        )?;

        linker.func_wrap(
            HOST_MODULE,
            "host_log",
            |mut caller: Caller<'_, HostState>, level: i32, ptr: i32, len: i32| -> wasmtime::Result<()> {
                let message = read_guest_string(&mut caller, ptr, len)?;
                match level {
                    0 => tracing::error!(target: "modcli::plugin", "{}", message),
                    1 => tracing::warn!(target: "modcli::plugin", "{}", message),
                    2 => tracing::info!(target: "modcli::plugin", "{}", message),
                    3 => tracing::debug!(target: "modcli::plugin", "{}", message),
                    _ => tracing::trace!(target: "modcli::plugin", "{}", message),
                }
                Ok(())
            },
        )?;

        Ok(linker)
    }

    fn invoke_raw(&self, input: &[u8]) -> wasmtime::Result<i32> {
        let mut store = Store::new(
            &self.engine,
            HostState {
                limits: StoreLimitsBuilder::new()
                    .memory_size(self.max_memory_bytes)
                    .build(),
            },
        );
        store.limiter(|state| &mut state.limits);

        let instance = self.linker()?.instantiate(&mut store, &self.module)?;
        let memory = instance
            .get_memory(&mut store, "memory")
            .ok_or_else(|| anyhow::anyhow!("`memory` export not found"))?;
        let alloc = instance.get_typed_func::<i32, i32>(&mut store, ALLOC_SYMBOL)?;
        let run = instance.get_typed_func::<(i32, i32), i32>(&mut store, ENTRY_SYMBOL)?;

        let len = i32::try_from(input.len())
            .map_err(|_| anyhow::anyhow!("invocation too large ({} bytes)", input.len()))?;
        let ptr = alloc.call(&mut store, len)?;
        memory.write(&mut store, ptr as u32 as usize, input)?;

        run.call(&mut store, (ptr, len))
    }
}

impl Plugin for WasmPlugin {
    #[instrument(name = "wasm_invoke", skip(self, input), fields(entry = %self.path.display()))]
    fn invoke(&self, input: &Value) -> Result<i32> {
        let bytes = serde_json::to_vec(input)
            .map_err(|e| PluginError::Execution(format!("failed to serialize invocation: {e}")))?;

        let status = self
            .invoke_raw(&bytes)
            .map_err(|e| PluginError::Execution(format!("{e:#}")))?;

        debug!("Plugin returned status {}", status);
        Ok(status)
    }
}

fn read_guest_string(
    caller: &mut Caller<'_, HostState>,
    ptr: i32,
    len: i32,
) -> wasmtime::Result<String> {
    let memory = caller
        .get_export("memory")
        .and_then(|export| export.into_memory())
        .ok_or_else(|| anyhow::anyhow!("`memory` export not found"))?;

    let start = ptr as u32 as usize;
    let end = start
        .checked_add(len as u32 as usize)
        .ok_or_else(|| anyhow::anyhow!("guest string out of bounds"))?;
    let bytes = memory
        .data(&*caller)
        .get(start..end)
        .ok_or_else(|| anyhow::anyhow!("guest string out of bounds"))?;

    Ok(String::from_utf8_lossy(bytes).into_owned())
}
