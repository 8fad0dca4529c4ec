//! `vsd clean`: remove a board's directories.

use std::fs;

use anyhow::{Context, Result};
use vsd_pipeline::{Stage, WorkspaceLock};

use crate::config::VsdConfig;

/// Remove the board, build and output directories of `board`. Refuses while
/// another run holds the board.
pub fn run(config: &VsdConfig, board: &str) -> Result<()> {
    let ws = &config.workspace;
    let _lock = WorkspaceLock::acquire(&ws.locks_dir(), board, Stage::PrepareBoard)?;

    for dir in ws.board_dirs(board) {
        if dir.exists() {
            fs::remove_dir_all(&dir).with_context(|| format!("failed to remove {}", dir.display()))?;
            println!("Removed {}", dir.display());
        } else {
            println!("Already clean: {} does not exist", dir.display());
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clean_removes_board_directories() {
        let dir = tempfile::tempdir().unwrap();
        let config = VsdConfig::resolve_with(Some(dir.path()), |_| None).unwrap();
        let ws = &config.workspace;
        for d in ws.board_dirs("demo") {
            fs::create_dir_all(&d).unwrap();
            fs::write(d.join("file"), b"x").unwrap();
        }
        fs::create_dir_all(ws.board_dir("other")).unwrap();

        run(&config, "demo").unwrap();
        assert!(ws.board_dirs("demo").iter().all(|d| !d.exists()));
        assert!(ws.board_dir("other").exists());
        assert!(!WorkspaceLock::path_for(&ws.locks_dir(), "demo").exists());
    }

    #[test]
    fn clean_handles_already_clean() {
        let dir = tempfile::tempdir().unwrap();
        let config = VsdConfig::resolve_with(Some(dir.path()), |_| None).unwrap();
        run(&config, "demo").unwrap();
    }

    #[test]
    fn clean_refuses_busy_board() {
        let dir = tempfile::tempdir().unwrap();
        let config = VsdConfig::resolve_with(Some(dir.path()), |_| None).unwrap();
        let ws = &config.workspace;
        fs::create_dir_all(ws.board_dir("demo")).unwrap();
        let _held = WorkspaceLock::acquire(&ws.locks_dir(), "demo", Stage::Simulate).unwrap();

        let err = run(&config, "demo").unwrap_err();
        assert!(err.downcast_ref::<vsd_pipeline::OrchestrationError>().is_some_and(|e| e.is_contention()));
        assert!(ws.board_dir("demo").exists());
    }
}
