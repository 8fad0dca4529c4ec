//! `vsd simulate`: run the simulator with its console attached.

use std::time::Duration;

use anyhow::Result;
use vsd_pipeline::{OutputMode, PipelineRequest, Stage, StageOutcome};

use crate::config::VsdConfig;

pub fn run(config: &VsdConfig, board: &str, timeout: Option<u64>) -> Result<()> {
    let orchestrator = config.orchestrator(false, OutputMode::Inherit)?;
    let mut request = PipelineRequest::single(board, Stage::Simulate);
    if let Some(secs) = timeout {
        request = request.with_timeout(Duration::from_secs(secs));
    }
    let report = orchestrator.run(&request)?;
    if report.outcome(Stage::Simulate) == Some(StageOutcome::TimedOut) {
        match timeout {
            Some(secs) => println!("Simulation of '{board}' stopped after {secs}s"),
            None => println!("Simulation of '{board}' stopped"),
        }
    }
    Ok(())
}
