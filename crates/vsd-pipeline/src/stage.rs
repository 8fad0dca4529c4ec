//! Pipeline stages and their outcomes.

use std::fmt;
use std::path::PathBuf;

/// A pipeline stage. Declaration order is execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Stage {
    PrepareBoard,
    Build,
    PrepareSimulatorFiles,
    Simulate,
}

impl Stage {
    pub const ALL: [Stage; 4] = [
        Stage::PrepareBoard,
        Stage::Build,
        Stage::PrepareSimulatorFiles,
        Stage::Simulate,
    ];

    /// File-name friendly identifier, used for `.stages/<id>.hash` and logs.
    pub fn id(self) -> &'static str {
        match self {
            Stage::PrepareBoard => "prepare_board",
            Stage::Build => "build",
            Stage::PrepareSimulatorFiles => "prepare_simulator_files",
            Stage::Simulate => "simulate",
        }
    }

    pub fn from_id(id: &str) -> Option<Stage> {
        Stage::ALL.into_iter().find(|s| s.id() == id)
    }

    /// Whether a successful run may be skipped next time.
    pub fn cacheable(self) -> bool {
        self != Stage::Simulate
    }

    /// Stages from `first` to `last`, inclusive.
    pub fn range(first: Stage, last: Stage) -> impl Iterator<Item = Stage> {
        Stage::ALL.into_iter().filter(move |s| *s >= first && *s <= last)
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Stage::PrepareBoard => "PREPARE_BOARD",
            Stage::Build => "BUILD",
            Stage::PrepareSimulatorFiles => "PREPARE_SIMULATOR_FILES",
            Stage::Simulate => "SIMULATE",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageOutcome {
    Executed,
    /// Inputs unchanged and outputs present; nothing was run.
    Cached,
    /// Simulation stopped by its timeout. Counts as success.
    TimedOut,
}

impl fmt::Display for StageOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            StageOutcome::Executed => "executed",
            StageOutcome::Cached => "cached",
            StageOutcome::TimedOut => "timed out",
        })
    }
}

/// Record of one stage of a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageResult {
    pub stage: Stage,
    pub outcome: StageOutcome,
    /// Exit code of the external process, if one ran and exited normally.
    pub exit_code: Option<i32>,
    pub log: Option<PathBuf>,
    /// Files the stage produced (or found in place when cached).
    pub artifacts: Vec<PathBuf>,
    pub duration_ms: u64,
}

impl StageResult {
    pub(crate) fn cached(stage: Stage, artifacts: Vec<PathBuf>) -> Self {
        Self {
            stage,
            outcome: StageOutcome::Cached,
            exit_code: None,
            log: None,
            artifacts,
            duration_ms: 0,
        }
    }
}
