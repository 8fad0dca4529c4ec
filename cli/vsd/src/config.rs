//! Workspace configuration: `vsd-env.yml` plus environment overrides.
//!
//! Resolved once at startup and passed down explicitly.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use vsd_pipeline::{Orchestrator, OutputMode, ToolOverride, Toolchain, Workspace};

/// Default resources directory name inside the workspace.
pub const RESOURCES_DIR: &str = "visual-system-designer-resources";

/// Base catalog file inside the resources directory.
pub const CATALOG_FILE: &str = "components-specification.json";

const ZEPHYR_BASE: &str = "ZEPHYR_BASE";
const ZEPHYR_SDK_INSTALL_DIR: &str = "ZEPHYR_SDK_INSTALL_DIR";

/// Contents of `vsd-env.yml`.
///
/// Upper-case keys are environment variables handed to every tool, as
/// `vsd init` writes them (`ZEPHYR_BASE`, `ZEPHYR_SDK_INSTALL_DIR`, ...).
/// Lower-case keys are VSD settings. Relative paths are relative to the
/// workspace.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EnvFile {
    /// Expected Zephyr SDK version (semver).
    #[serde(default)]
    pub zephyr_sdk_version: Option<String>,
    #[serde(default)]
    pub resources_dir: Option<PathBuf>,
    /// Per-tool program/argument overrides, keyed by tool name.
    #[serde(default)]
    pub tools: BTreeMap<String, ToolOverride>,
    #[serde(flatten)]
    pub vars: BTreeMap<String, String>,
}

impl EnvFile {
    pub fn from_yaml_str(text: &str) -> Result<Self> {
        let file: EnvFile = serde_yaml::from_str(text).context("failed to parse vsd-env.yml")?;
        if let Some(key) = file.vars.keys().find(|k| !is_env_var_name(k)) {
            bail!("unknown key '{key}' (environment variables are upper case)");
        }
        Ok(file)
    }

    /// Load the file if it exists.
    pub fn load(path: &Path) -> Result<Option<Self>> {
        if !path.exists() {
            return Ok(None);
        }
        let text = fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?;
        Self::from_yaml_str(&text)
            .with_context(|| format!("in {}", path.display()))
            .map(Some)
    }
}

fn is_env_var_name(key: &str) -> bool {
    key.starts_with(|c: char| c.is_ascii_uppercase() || c == '_')
        && key.chars().all(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || c == '_')
}

/// Fully resolved configuration.
#[derive(Debug, Clone)]
pub struct VsdConfig {
    pub workspace: Workspace,
    pub zephyr_base: Option<PathBuf>,
    pub zephyr_sdk_install_dir: Option<PathBuf>,
    pub zephyr_sdk_version: Option<semver::Version>,
    pub resources_dir: PathBuf,
    pub tools: Toolchain,
    /// Other variables from `vsd-env.yml`, exported to tools.
    pub env_vars: BTreeMap<String, String>,
    /// Whether `vsd-env.yml` was found.
    pub env_file: bool,
}

impl VsdConfig {
    /// Resolve from the process environment. `workspace` overrides
    /// `VSD_WORKSPACE`, which defaults to the current directory.
    pub fn resolve(workspace: Option<&Path>) -> Result<Self> {
        Self::resolve_with(workspace, |key| std::env::var(key).ok().filter(|v| !v.is_empty()))
    }

    pub fn resolve_with(workspace: Option<&Path>, env: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let root = match workspace {
            Some(dir) => dir.to_path_buf(),
            None => env("VSD_WORKSPACE").map(PathBuf::from).unwrap_or_else(|| PathBuf::from(".")),
        };
        let workspace = Workspace::open(&root)
            .with_context(|| format!("cannot open workspace {}", root.display()))?;
        let file = EnvFile::load(&workspace.config_file())?;
        let env_file = file.is_some();
        let mut file = file.unwrap_or_default();
        let within = |p: PathBuf| if p.is_absolute() { p } else { workspace.root().join(p) };

        let file_base = file.vars.remove(ZEPHYR_BASE);
        let file_sdk = file.vars.remove(ZEPHYR_SDK_INSTALL_DIR);
        let zephyr_base = env(ZEPHYR_BASE).or(file_base).map(PathBuf::from).map(within);
        let zephyr_sdk_install_dir = env(ZEPHYR_SDK_INSTALL_DIR).or(file_sdk).map(PathBuf::from).map(within);
        let zephyr_sdk_version = file
            .zephyr_sdk_version
            .as_deref()
            .map(|v| semver::Version::parse(v).with_context(|| format!("invalid zephyr_sdk_version '{v}'")))
            .transpose()?;
        let resources_dir = within(file.resources_dir.unwrap_or_else(|| PathBuf::from(RESOURCES_DIR)));

        let mut tools = Toolchain::default();
        for (name, over) in &file.tools {
            if !tools.apply(name, over) {
                bail!(
                    "unknown tool '{name}' in {} (expected one of: {})",
                    workspace.config_file().display(),
                    Toolchain::NAMES.join(", ")
                );
            }
        }

        Ok(Self {
            workspace,
            zephyr_base,
            zephyr_sdk_install_dir,
            zephyr_sdk_version,
            resources_dir,
            tools,
            env_vars: file.vars,
            env_file,
        })
    }

    pub fn catalog_path(&self) -> PathBuf {
        self.resources_dir.join(CATALOG_FILE)
    }

    pub fn zephyr_base(&self) -> Result<&Path> {
        self.zephyr_base
            .as_deref()
            .context("ZEPHYR_BASE is not set (export it or set it in vsd-env.yml)")
    }

    /// Orchestrator for this workspace. Stages that read Zephyr sources need
    /// `ZEPHYR_BASE`; the others accept its absence.
    pub fn orchestrator(&self, needs_zephyr: bool, output: OutputMode) -> Result<Orchestrator> {
        let zephyr_base = if needs_zephyr {
            self.zephyr_base()?.to_path_buf()
        } else {
            self.zephyr_base.clone().unwrap_or_default()
        };
        let mut orchestrator = Orchestrator::new(self.workspace.clone(), &self.resources_dir, zephyr_base)
            .with_tools(self.tools.clone())
            .with_output(output);
        for (key, value) in &self.env_vars {
            orchestrator = orchestrator.with_env(key.as_str(), value.as_str());
        }
        if let Some(sdk) = &self.zephyr_sdk_install_dir {
            orchestrator = orchestrator.with_env(ZEPHYR_SDK_INSTALL_DIR, sdk.display().to_string());
        }
        Ok(orchestrator)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn no_env(_: &str) -> Option<String> {
        None
    }

    #[test]
    fn defaults_without_env_file() {
        let dir = tempfile::tempdir().unwrap();
        let config = VsdConfig::resolve_with(Some(dir.path()), no_env).unwrap();
        assert!(!config.env_file);
        assert!(config.zephyr_base.is_none());
        assert!(config.resources_dir.ends_with(RESOURCES_DIR));
        assert_eq!(config.tools, Toolchain::default());
        assert!(config.zephyr_base().is_err());
    }

    #[test]
    fn env_file_and_overrides() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("vsd-env.yml"),
            "\
ZEPHYR_BASE: zephyrproject/zephyr
ZEPHYR_SDK_INSTALL_DIR: /opt/zephyr-sdk-0.16.5
PYRENODE_ARCH_PKG: /opt/renode.tar.xz
zephyr_sdk_version: 0.16.5
resources_dir: /opt/vsd-resources
tools:
  simulator:
    program: /opt/renode/renode
",
        )
        .unwrap();

        let config = VsdConfig::resolve_with(Some(dir.path()), no_env).unwrap();
        assert!(config.env_file);
        assert!(config.zephyr_base.as_ref().unwrap().ends_with("zephyrproject/zephyr"));
        assert!(config.zephyr_base.as_ref().unwrap().is_absolute());
        assert_eq!(config.zephyr_sdk_install_dir, Some(PathBuf::from("/opt/zephyr-sdk-0.16.5")));
        assert_eq!(config.zephyr_sdk_version, Some(semver::Version::new(0, 16, 5)));
        assert_eq!(config.resources_dir, PathBuf::from("/opt/vsd-resources"));
        assert_eq!(config.tools.simulator.program, "/opt/renode/renode");
        assert_eq!(config.catalog_path(), PathBuf::from("/opt/vsd-resources").join(CATALOG_FILE));
        assert_eq!(
            config.env_vars,
            BTreeMap::from([("PYRENODE_ARCH_PKG".to_string(), "/opt/renode.tar.xz".to_string())])
        );

        let orchestrator = config.orchestrator(true, OutputMode::Log).unwrap();
        assert_eq!(orchestrator.env()["PYRENODE_ARCH_PKG"], "/opt/renode.tar.xz");
        assert_eq!(orchestrator.env()["ZEPHYR_SDK_INSTALL_DIR"], "/opt/zephyr-sdk-0.16.5");

        let from_env = VsdConfig::resolve_with(Some(dir.path()), |key| {
            (key == "ZEPHYR_BASE").then(|| "/env/zephyr".to_string())
        })
        .unwrap();
        assert_eq!(from_env.zephyr_base, Some(PathBuf::from("/env/zephyr")));
    }

    #[test]
    fn workspace_from_environment() {
        let dir = tempfile::tempdir().unwrap();
        let ws = dir.path().join("ws");
        let config = VsdConfig::resolve_with(None, |key| {
            (key == "VSD_WORKSPACE").then(|| ws.display().to_string())
        })
        .unwrap();
        assert_eq!(config.workspace.root(), fs::canonicalize(&ws).unwrap());
    }

    #[test]
    fn unknown_tool_rejected() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("vsd-env.yml"), "tools:\n  compiler:\n    program: gcc\n").unwrap();
        let err = VsdConfig::resolve_with(Some(dir.path()), no_env).unwrap_err();
        assert!(err.to_string().contains("unknown tool 'compiler'"));
    }

    #[test]
    fn bad_sdk_version_rejected() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("vsd-env.yml"), "zephyr_sdk_version: latest\n").unwrap();
        assert!(VsdConfig::resolve_with(Some(dir.path()), no_env).is_err());
    }

    #[test]
    fn unknown_keys_rejected() {
        assert!(EnvFile::from_yaml_str("zephyr_bsae: /z\n").is_err());
        assert!(EnvFile::from_yaml_str("ZEPHYR_TOOLCHAIN_VARIANT: zephyr\n").is_ok());
    }
}
