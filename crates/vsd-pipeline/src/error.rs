use std::path::PathBuf;

use thiserror::Error;
use vsd_codegen::GenerationError;

use crate::stage::Stage;

/// Errors raised while running pipeline stages.
#[derive(Debug, Error)]
pub enum OrchestrationError {
    #[error("{stage} failed (exit status {}); see {}", .status.map_or("unknown".into(), |s| s.to_string()), .log.display())]
    BuildFailed {
        stage: Stage,
        status: Option<i32>,
        log: PathBuf,
    },

    #[error("simulation failed: {detail}{}", see_log(.log))]
    SimulationFailed {
        detail: String,
        log: Option<PathBuf>,
    },

    #[error("{stage} was stopped before it finished")]
    Stopped { stage: Stage },

    #[error("a simulation of board '{board}' is already running (pid {pid})")]
    AlreadyRunning { board: String, pid: u32 },

    #[error("board '{board}' is in use by pid {pid} ({stage})")]
    WorkspaceBusy { board: String, pid: u32, stage: String },

    #[error("tool '{tool}' not found (program '{program}')")]
    ToolNotFound {
        tool: String,
        program: String,
        stage: Option<Stage>,
    },

    #[error("{stage} needs {}, which does not exist", .path.display())]
    MissingArtifact { stage: Stage, path: PathBuf },

    #[error("{stage}: {source}")]
    Generation {
        stage: Stage,
        #[source]
        source: GenerationError,
    },

    #[error("{stage} needs a validated graph")]
    MissingGraph { stage: Stage },

    #[error("corrupt lock file {}: {detail}", .path.display())]
    CorruptLock { path: PathBuf, detail: String },

    #[error("invalid tool argument pattern: {0}")]
    Pattern(#[from] regex::Error),

    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("I/O error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

impl OrchestrationError {
    pub(crate) fn io(path: impl Into<PathBuf>) -> impl FnOnce(std::io::Error) -> Self {
        let path = path.into();
        move |source| OrchestrationError::Io { path, source }
    }

    /// The stage the error is attributed to, when there is one.
    pub fn stage(&self) -> Option<Stage> {
        match self {
            OrchestrationError::BuildFailed { stage, .. }
            | OrchestrationError::MissingArtifact { stage, .. }
            | OrchestrationError::Generation { stage, .. }
            | OrchestrationError::MissingGraph { stage }
            | OrchestrationError::Stopped { stage } => Some(*stage),
            OrchestrationError::ToolNotFound { stage, .. } => *stage,
            OrchestrationError::SimulationFailed { .. } => Some(Stage::Simulate),
            _ => None,
        }
    }

    /// Another run holds the board.
    pub fn is_contention(&self) -> bool {
        matches!(
            self,
            OrchestrationError::AlreadyRunning { .. } | OrchestrationError::WorkspaceBusy { .. }
        )
    }
}

fn see_log(log: &Option<PathBuf>) -> String {
    log.as_ref()
        .map(|p| format!("; see {}", p.display()))
        .unwrap_or_default()
}

pub type Result<T> = std::result::Result<T, OrchestrationError>;
