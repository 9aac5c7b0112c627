//! Shared helpers for modcli binary tests
#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::process::{Command, Output};

pub fn modcli_binary() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_modcli"))
}

/// Plugin that prints a greeting through the host and returns `status`
pub fn greeting_plugin(status: i32) -> String {
    format!(
        r#"(module
             (import "env" "host_print" (func $print (param i32 i32)))
             (memory (export "memory") 1)
             (data (i32.const 16) "hello from plugin\n")
             (func (export "modcli_alloc") (param i32) (result i32) (i32.const 1024))
             (func (export "modcli_run") (param i32 i32) (result i32)
               (call $print (i32.const 16) (i32.const 18))
               (i32.const {status})))"#
    )
}

/// Write a module root with `package.json` pointing at `lib/index.wat`
pub fn write_module(root: &Path, wat: &str) {
    std::fs::create_dir_all(root.join("lib")).unwrap();
    std::fs::write(
        root.join("package.json"),
        r#"{"name":"@modcli/init","version":"1.0.0","main":"lib/index.wat"}"#,
    )
    .unwrap();
    std::fs::write(root.join("lib").join("index.wat"), wat).unwrap();
}

/// Run modcli against an isolated home with the update check disabled
pub fn run_modcli(home: &Path, args: &[&str]) -> Output {
    Command::new(modcli_binary())
        .arg("--no-update-check")
        .arg("--home")
        .arg(home)
        .args(args)
        .env_remove("MODCLI_HOME")
        .output()
        .expect("failed to run modcli")
}
