//! `vsd info`: workspace diagnostics.

use std::fs;
use std::path::Path;
use std::process::{Command, Stdio};

use anyhow::Result;
use vsd_pipeline::{pid_alive, read_lock, ToolCommand, WorkspaceLock};

use crate::config::VsdConfig;

pub fn run(config: &VsdConfig) -> Result<()> {
    println!("=== VSD Info ===");
    println!();
    println!("VSD version: {}", env!("CARGO_PKG_VERSION"));
    println!();

    println!("--- Workspace ---");
    println!("  Root:      {}", config.workspace.root().display());
    println!(
        "  vsd-env.yml: {}",
        if config.env_file { "found" } else { "not found (using defaults)" }
    );
    println!("  Resources: {}", existence(&config.resources_dir));
    println!("  Catalog:   {}", existence(&config.catalog_path()));
    println!();

    println!("--- Zephyr ---");
    match &config.zephyr_base {
        Some(base) => println!("  ZEPHYR_BASE: {}", existence(base)),
        None => println!("  ZEPHYR_BASE: not set"),
    }
    match &config.zephyr_sdk_install_dir {
        Some(sdk) => {
            println!("  SDK:         {}", existence(sdk));
            println!("  SDK version: {}", sdk_version_status(sdk, config.zephyr_sdk_version.as_ref()));
        }
        None => println!("  SDK:         not set"),
    }
    println!();

    println!("--- Tools ---");
    for (name, tool) in config.tools.iter() {
        print_tool_status(name, tool);
    }
    println!();

    let boards = config.workspace.boards()?;
    println!("--- Boards ({}) ---", boards.len());
    for board in &boards {
        let lock = WorkspaceLock::path_for(&config.workspace.locks_dir(), board);
        match read_lock(&lock) {
            Ok(Some(info)) if pid_alive(info.pid) => {
                println!("  {board}: busy ({} by pid {})", info.stage, info.pid)
            }
            Ok(Some(info)) => println!("  {board}: stale lock from pid {}", info.pid),
            Ok(None) => println!("  {board}"),
            Err(e) => println!("  {board}: unreadable lock: {e}"),
        }
    }

    Ok(())
}

fn existence(path: &Path) -> String {
    if path.exists() {
        path.display().to_string()
    } else {
        format!("{} (missing)", path.display())
    }
}

/// Compare the installed SDK's `sdk_version` file with the expected version.
fn sdk_version_status(sdk: &Path, expected: Option<&semver::Version>) -> String {
    let installed = fs::read_to_string(sdk.join("sdk_version"))
        .ok()
        .and_then(|text| semver::Version::parse(text.trim()).ok());
    match (installed, expected) {
        (Some(found), Some(want)) if &found == want => format!("{found}"),
        (Some(found), Some(want)) => format!("{found} (expected {want})"),
        (Some(found), None) => format!("{found}"),
        (None, Some(want)) => format!("unknown (expected {want})"),
        (None, None) => "unknown".to_string(),
    }
}

fn print_tool_status(name: &str, tool: &ToolCommand) {
    let check = Command::new(&tool.program)
        .arg("--version")
        .stdin(Stdio::null())
        .stderr(Stdio::null())
        .output();
    match check {
        Ok(output) => {
            let version = String::from_utf8_lossy(&output.stdout);
            let first_line = version.lines().next().unwrap_or("(unknown version)");
            println!("  {name} ({}): {first_line}", tool.program);
        }
        Err(_) => println!("  {name} ({}): not found", tool.program),
    }
}
