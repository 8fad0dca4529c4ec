//! `vsd build-zephyr`: build an application for a prepared board.

use std::path::Path;

use anyhow::Result;
use vsd_pipeline::{OutputMode, PipelineRequest, Stage};

use crate::config::VsdConfig;

pub fn run(config: &VsdConfig, board: &str, app: Option<&Path>) -> Result<()> {
    let app = match app {
        Some(app) => app.to_path_buf(),
        None => config.workspace.generated_dir().join(board),
    };
    let orchestrator = config.orchestrator(true, OutputMode::Log)?;
    let report = orchestrator.run(&PipelineRequest::single(board, Stage::Build).with_app(app))?;
    print!("{report}");
    Ok(())
}
