//! Build and simulation orchestration.
//!
//! Stages run in a fixed order for one board at a time:
//!
//! 1. `PREPARE_BOARD`: generate the board directory from the validated graph.
//! 2. `BUILD`: build the application with west.
//! 3. `PREPARE_SIMULATOR_FILES`: write the simulator script and platform.
//! 4. `SIMULATE`: run the simulator, optionally with a timeout.
//!
//! Each stage is skipped when its input digest matches the last successful
//! run and its outputs are still present. A per-board lock file keeps
//! concurrent invocations off the same board.

pub mod cache;
pub mod digest;
pub mod error;
pub mod lock;
pub mod orchestrator;
pub mod process;
pub mod report;
pub mod stage;
pub mod tool;
pub mod workspace;

pub use cache::{CacheStats, StageCache};
pub use digest::{ContentHash, InputDigest};
pub use error::{OrchestrationError, Result};
pub use lock::{pid_alive, read_lock, LockInfo, WorkspaceLock};
pub use orchestrator::{BoardRun, Orchestrator, PipelineRequest};
pub use process::{OutputMode, ProcessEnd, Supervision};
pub use report::PipelineReport;
pub use stage::{Stage, StageOutcome, StageResult};
pub use tool::{ToolCommand, ToolOverride, Toolchain};
pub use workspace::{Workspace, CONFIG_FILE};
