//! External tool invocations.
//!
//! Each tool is a program plus an argument template. Arguments may contain
//! `{name}` placeholders filled from the stage's variables; unknown
//! placeholders are left as written.

use std::collections::BTreeMap;
use std::process::Command;

use regex::Regex;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCommand {
    pub program: String,
    #[serde(default)]
    pub args: Vec<String>,
}

impl ToolCommand {
    pub fn new<I, S>(program: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }

    /// Arguments with placeholders substituted.
    pub fn render_args(&self, vars: &BTreeMap<&str, String>) -> Result<Vec<String>, regex::Error> {
        let placeholder = Regex::new(r"\{([A-Za-z_][A-Za-z0-9_]*)\}")?;
        Ok(self
            .args
            .iter()
            .map(|arg| {
                placeholder
                    .replace_all(arg, |caps: &regex::Captures<'_>| match vars.get(&caps[1]) {
                        Some(value) => value.clone(),
                        None => caps[0].to_string(),
                    })
                    .into_owned()
            })
            .collect())
    }

    pub fn command(&self, vars: &BTreeMap<&str, String>) -> Result<Command, regex::Error> {
        let mut cmd = Command::new(&self.program);
        cmd.args(self.render_args(vars)?);
        Ok(cmd)
    }
}

/// Partial replacement for a tool from configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ToolOverride {
    pub program: Option<String>,
    pub args: Option<Vec<String>>,
}

/// The external programs the pipeline drives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Toolchain {
    /// Firmware build (`west build`).
    pub west: ToolCommand,
    /// Devicetree to platform description; prints the result on stdout.
    pub translator: ToolCommand,
    pub simulator: ToolCommand,
    /// Diagram editor server started by `vsd run`.
    pub editor: ToolCommand,
}

impl Default for Toolchain {
    fn default() -> Self {
        Self {
            west: ToolCommand::new(
                "west",
                [
                    "build",
                    "-p",
                    "-b",
                    "{board}",
                    "--build-dir",
                    "{build_dir}",
                    "{app}",
                    "--",
                    "-DBOARD_ROOT={board_root}",
                ],
            ),
            translator: ToolCommand::new("dts2repl", ["{dts}"]),
            simulator: ToolCommand::new("renode", ["--console", "--disable-gui", "{resc}", "-e", "start"]),
            editor: ToolCommand::new(
                "pipeline_manager",
                [
                    "--frontend-directory",
                    "{frontend_dir}",
                    "--workspace-directory",
                    "{editor_workspace}",
                    "--backend-host",
                    "{host}",
                    "--backend-port",
                    "{port}",
                    "--tcp-server-host",
                    "{backend_host}",
                    "--tcp-server-port",
                    "{backend_port}",
                ],
            ),
        }
    }
}

impl Toolchain {
    pub const NAMES: [&'static str; 4] = ["west", "translator", "simulator", "editor"];

    pub fn get(&self, name: &str) -> Option<&ToolCommand> {
        match name {
            "west" => Some(&self.west),
            "translator" => Some(&self.translator),
            "simulator" => Some(&self.simulator),
            "editor" => Some(&self.editor),
            _ => None,
        }
    }

    fn get_mut(&mut self, name: &str) -> Option<&mut ToolCommand> {
        match name {
            "west" => Some(&mut self.west),
            "translator" => Some(&mut self.translator),
            "simulator" => Some(&mut self.simulator),
            "editor" => Some(&mut self.editor),
            _ => None,
        }
    }

    /// Apply an override. Returns `false` for an unknown tool name.
    pub fn apply(&mut self, name: &str, over: &ToolOverride) -> bool {
        let Some(tool) = self.get_mut(name) else {
            return false;
        };
        if let Some(program) = &over.program {
            tool.program = program.clone();
        }
        if let Some(args) = &over.args {
            tool.args = args.clone();
        }
        true
    }

    pub fn iter(&self) -> impl Iterator<Item = (&'static str, &ToolCommand)> {
        Self::NAMES
            .into_iter()
            .filter_map(|name| self.get(name).map(|tool| (name, tool)))
    }
}
