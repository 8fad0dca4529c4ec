//! `vsd prepare-renode-files`: simulator script and platform description.

use std::path::Path;

use anyhow::Result;
use vsd_pipeline::{OutputMode, PipelineRequest, Stage};

use crate::config::VsdConfig;

pub fn run(config: &VsdConfig, board: &str, templates_dir: Option<&Path>) -> Result<()> {
    let orchestrator = config.orchestrator(false, OutputMode::Log)?;
    let mut request = PipelineRequest::single(board, Stage::PrepareSimulatorFiles);
    if let Some(dir) = templates_dir {
        request = request.with_templates_dir(dir);
    }
    let report = orchestrator.run(&request)?;
    print!("{report}");
    Ok(())
}
