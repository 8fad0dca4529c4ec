//! Summary of a pipeline run.

use std::fmt;

use crate::cache::CacheStats;
use crate::stage::{Stage, StageOutcome, StageResult};

#[derive(Debug, Clone)]
pub struct PipelineReport {
    pub board: String,
    pub duration_ms: u64,
    /// Results in execution order.
    pub stages: Vec<StageResult>,
    pub cache: CacheStats,
}

impl PipelineReport {
    pub fn result(&self, stage: Stage) -> Option<&StageResult> {
        self.stages.iter().find(|r| r.stage == stage)
    }

    pub fn outcome(&self, stage: Stage) -> Option<StageOutcome> {
        self.result(stage).map(|r| r.outcome)
    }
}

impl fmt::Display for PipelineReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "=== Pipeline Report ===")?;
        writeln!(f, "Board: {}", self.board)?;
        writeln!(f, "Duration: {} ms", self.duration_ms)?;
        writeln!(
            f,
            "Cache: {} hit(s), {} miss(es)",
            self.cache.hits, self.cache.misses
        )?;

        if self.stages.is_empty() {
            return Ok(());
        }
        writeln!(f)?;
        writeln!(f, "--- Stages ({}) ---", self.stages.len())?;
        for result in &self.stages {
            write!(f, "  {:<24} {}", result.stage.to_string(), result.outcome)?;
            match (result.outcome, result.exit_code) {
                (StageOutcome::Cached, _) => writeln!(f)?,
                (_, Some(code)) => writeln!(f, " (exit {code}, {} ms)", result.duration_ms)?,
                (_, None) => writeln!(f, " ({} ms)", result.duration_ms)?,
            }
            if let Some(log) = &result.log {
                writeln!(f, "      log: {}", log.display())?;
            }
            for artifact in &result.artifacts {
                writeln!(f, "      -> {}", artifact.display())?;
            }
        }
        Ok(())
    }
}
