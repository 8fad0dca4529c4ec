//! `vsd prepare-zephyr-board`: generate the board directory.

use std::path::{Path, PathBuf};

use anyhow::Result;
use vsd_pipeline::{OutputMode, PipelineRequest, Stage};

use super::Design;
use crate::config::VsdConfig;

pub fn run(config: &VsdConfig, graph: &Path, spec_mods: &[PathBuf]) -> Result<()> {
    let design = Design::load(config, graph, spec_mods)?;
    let validated = design.validate()?;
    let board = validated.board_name();

    let orchestrator = config.orchestrator(true, OutputMode::Log)?;
    let request = PipelineRequest::single(&board, Stage::PrepareBoard).with_graph(&validated);
    let report = orchestrator.run(&request)?;
    print!("{report}");
    println!(
        "Board '{board}' ready in {}",
        config.workspace.board_dir(&board).display()
    );
    Ok(())
}
