//! Zephyr board directory generation.
//!
//! A board directory is assembled from the SoC resources shipped in
//! `<resources>/zephyr-data/socs/<soc>/`:
//!
//! - `configs.yaml`: vendor, SoC list, Kconfig selects and defconfig edits
//! - `<soc>.dts`: base devicetree
//! - `overlay.dts` (optional): board-level additions
//!
//! and the devicetree fragments for everything connected to the SoC node.

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use vsd_graph::ValidatedGraph;

use crate::devicetree::{chosen_block, Overlay};
use crate::error::{GenerationError, Result};

/// SoC resource file name.
pub const SOC_CONFIG: &str = "configs.yaml";

/// SoC build settings read from `configs.yaml`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SocConfig {
    pub vendor: String,
    pub board_socs: Vec<BoardSoc>,
    #[serde(default)]
    pub select: Vec<String>,
    /// Defconfig to start from, relative to the Zephyr tree.
    pub defconfig_file: PathBuf,
    #[serde(default)]
    pub remove_defconfig_flags: Vec<String>,
    #[serde(default)]
    pub add_defconfig_flags: Vec<String>,
    /// Files copied from the Zephyr tree into the board directory.
    #[serde(default)]
    pub additional_files: Vec<PathBuf>,
}

/// One entry of `board_socs`, copied into `board.yml` as given.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoardSoc {
    pub name: String,
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_yaml::Value>,
}

/// `board.yml` as Zephyr's hardware model v2 expects it.
#[derive(Debug, Serialize)]
struct BoardYml<'a> {
    board: BoardEntry<'a>,
}

#[derive(Debug, Serialize)]
struct BoardEntry<'a> {
    name: &'a str,
    vendor: &'a str,
    socs: &'a [BoardSoc],
}

impl SocConfig {
    pub fn from_yaml_str(text: &str, path: &Path) -> Result<Self> {
        let config: SocConfig = serde_yaml::from_str(text).map_err(|e| GenerationError::InvalidSocConfig {
            path: path.to_path_buf(),
            detail: e.to_string(),
        })?;
        if config.board_socs.is_empty() {
            return Err(GenerationError::InvalidSocConfig {
                path: path.to_path_buf(),
                detail: "board_socs is empty".into(),
            });
        }
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path).map_err(GenerationError::io(path))?;
        Self::from_yaml_str(&text, path)
    }

    /// Name of the primary SoC.
    pub fn soc_name(&self) -> &str {
        self.board_socs.first().map(|s| s.name.as_str()).unwrap_or_default()
    }

    pub fn kconfig(&self, board: &str) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "config BOARD_{}", board.to_uppercase());
        let _ = writeln!(out, "\tbool \"{board}\"");
        for flag in &self.select {
            let _ = writeln!(out, "\tselect {flag}");
        }
        let _ = writeln!(out, "\tselect SOC_{}", self.soc_name().to_uppercase());
        out
    }

    pub fn board_yml(&self, board: &str) -> Result<String> {
        let yml = BoardYml {
            board: BoardEntry {
                name: board,
                vendor: &self.vendor,
                socs: &self.board_socs,
            },
        };
        serde_yaml::to_string(&yml).map_err(|e| GenerationError::InvalidSocConfig {
            path: PathBuf::from("board.yml"),
            detail: e.to_string(),
        })
    }

    /// The base defconfig with `remove_defconfig_flags` dropped and
    /// `add_defconfig_flags` appended.
    pub fn defconfig(&self, base: &str) -> String {
        let mut out: String = base
            .lines()
            .filter(|line| {
                !self
                    .remove_defconfig_flags
                    .iter()
                    .any(|flag| line.trim() == format!("{flag}=y"))
            })
            .map(|line| format!("{line}\n"))
            .collect();
        for flag in &self.add_defconfig_flags {
            out.push_str(flag);
            out.push('\n');
        }
        out
    }
}

/// Where board generation reads from.
#[derive(Debug, Clone)]
pub struct BoardTarget {
    pub board_name: String,
    /// `boards/` directory; the board lands in `boards/<board>/`.
    pub boards_dir: PathBuf,
    /// Resource tree holding `zephyr-data/socs/`.
    pub resources_dir: PathBuf,
    pub zephyr_base: PathBuf,
}

impl BoardTarget {
    pub fn board_dir(&self) -> PathBuf {
        self.boards_dir.join(&self.board_name)
    }

    pub fn soc_dir(&self, soc: &str) -> PathBuf {
        self.resources_dir.join("zephyr-data").join("socs").join(soc)
    }
}

/// Name of the SoC resource directory used for the graph's board root.
pub fn soc_name(graph: &ValidatedGraph<'_>) -> Result<String> {
    let root = graph.board_root().ok_or(GenerationError::MissingBoardRoot)?;
    Ok(root
        .spec
        .model_name()
        .unwrap_or(root.type_name())
        .to_string())
}

/// Write the board files into `dir`, which must exist and be empty.
pub fn write_board_files(graph: &ValidatedGraph<'_>, target: &BoardTarget, dir: &Path) -> Result<()> {
    let soc = soc_name(graph)?;
    let soc_dir = target.soc_dir(&soc);
    if !soc_dir.is_dir() {
        return Err(GenerationError::MissingSocResources { soc, path: soc_dir });
    }
    let config = SocConfig::load(&soc_dir.join(SOC_CONFIG))?;
    let board = target.board_name.as_str();

    write(&dir.join(format!("Kconfig.{board}")), &config.kconfig(board))?;
    write(&dir.join("board.yml"), &config.board_yml(board)?)?;

    let defconfig_path = target.zephyr_base.join(&config.defconfig_file);
    let base = fs::read_to_string(&defconfig_path).map_err(GenerationError::io(&defconfig_path))?;
    write(&dir.join(format!("{board}_defconfig")), &config.defconfig(&base))?;

    let soc_dts_path = soc_dir.join(format!("{soc}.dts"));
    let mut dts = fs::read_to_string(&soc_dts_path).map_err(GenerationError::io(&soc_dts_path))?;
    let overlay_path = soc_dir.join("overlay.dts");
    if overlay_path.exists() {
        let overlay = fs::read_to_string(&overlay_path).map_err(GenerationError::io(&overlay_path))?;
        dts.push_str("\n\n// overlay\n\n");
        dts.push_str(&overlay);
    }

    let fragments = Overlay::from_links(&graph.root_neighbours());
    let chosen = chosen_block(&dts).map_err(|source| GenerationError::Template {
        path: soc_dts_path.clone(),
        source,
    })?;
    dts.push_str("\n\n// nodes from graph\n\n");
    dts.push_str(&fragments.leds);
    dts.push_str(&fragments.sensors);
    dts.push_str(&chosen);
    write(&dir.join(format!("{board}.dts")), &dts)?;

    for file in &config.additional_files {
        let src = target.zephyr_base.join(file);
        let Some(name) = src.file_name() else {
            continue;
        };
        if src.is_file() {
            let dst = dir.join(name);
            fs::copy(&src, &dst).map_err(GenerationError::io(&dst))?;
        } else {
            tracing::warn!(file = %src.display(), "additional board file not found");
        }
    }

    tracing::info!(board, soc = %soc, skipped = fragments.skipped.len(), "board files written");
    Ok(())
}

fn write(path: &Path, content: &str) -> Result<()> {
    fs::write(path, content).map_err(GenerationError::io(path))
}
