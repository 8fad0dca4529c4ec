//! Per-board exclusive lock: `.locks/<board>.lock`.
//!
//! The lock file carries the holder's pid, current stage and a random token.
//! It is published atomically (written to a private file, then hard-linked
//! into place) so readers never see a half-written lock. A lock whose pid is
//! gone is reclaimed.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{OrchestrationError, Result};
use crate::stage::Stage;

/// Contents of a lock file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockInfo {
    pub pid: u32,
    pub stage: String,
    pub token: String,
}

/// Held for every stage of a run; released on drop.
#[derive(Debug)]
pub struct WorkspaceLock {
    path: PathBuf,
    board: String,
    info: LockInfo,
}

impl WorkspaceLock {
    pub fn path_for(locks_dir: &Path, board: &str) -> PathBuf {
        locks_dir.join(format!("{board}.lock"))
    }

    pub fn acquire(locks_dir: &Path, board: &str, stage: Stage) -> Result<Self> {
        fs::create_dir_all(locks_dir).map_err(OrchestrationError::io(locks_dir))?;
        let path = Self::path_for(locks_dir, board);
        let info = LockInfo {
            pid: std::process::id(),
            stage: stage.id().to_string(),
            token: Uuid::new_v4().to_string(),
        };

        // One retry after reclaiming a stale lock.
        for _ in 0..2 {
            if publish(&path, &info)? {
                tracing::debug!(board, stage = %stage, "workspace lock acquired");
                return Ok(WorkspaceLock {
                    path,
                    board: board.to_string(),
                    info,
                });
            }
            let Some(holder) = read_lock(&path)? else {
                continue;
            };
            if pid_alive(holder.pid) {
                return Err(contention(board, holder));
            }
            tracing::warn!(board, pid = holder.pid, "reclaiming stale workspace lock");
            remove_if_present(&path)?;
        }
        match read_lock(&path)? {
            Some(holder) => Err(contention(board, holder)),
            None => Err(OrchestrationError::CorruptLock {
                path,
                detail: "lock vanished while acquiring".into(),
            }),
        }
    }

    pub fn board(&self) -> &str {
        &self.board
    }

    pub fn info(&self) -> &LockInfo {
        &self.info
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Record the stage now running so other invocations can tell a live
    /// simulation from a build.
    pub fn set_stage(&mut self, stage: Stage) -> Result<()> {
        self.info.stage = stage.id().to_string();
        let staging = private_path(&self.path, &self.info.token);
        write_new(&staging, &self.info)?;
        fs::rename(&staging, &self.path).map_err(OrchestrationError::io(&self.path))
    }
}

impl Drop for WorkspaceLock {
    fn drop(&mut self) {
        // Never remove a lock that was reclaimed by someone else.
        match read_lock(&self.path) {
            Ok(Some(holder)) if holder.token == self.info.token => {
                if let Err(e) = fs::remove_file(&self.path) {
                    tracing::warn!(path = %self.path.display(), error = %e, "failed to release lock");
                }
            }
            _ => tracing::warn!(path = %self.path.display(), "lock no longer ours at release"),
        }
    }
}

/// Current holder of `path`, if the file exists.
pub fn read_lock(path: &Path) -> Result<Option<LockInfo>> {
    let text = match fs::read_to_string(path) {
        Ok(text) => text,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => {
            return Err(OrchestrationError::Io {
                path: path.to_path_buf(),
                source: e,
            })
        }
    };
    serde_json::from_str(&text)
        .map(Some)
        .map_err(|e| OrchestrationError::CorruptLock {
            path: path.to_path_buf(),
            detail: e.to_string(),
        })
}

/// Whether a process with this pid exists.
pub fn pid_alive(pid: u32) -> bool {
    let Ok(pid) = libc::pid_t::try_from(pid) else {
        return false;
    };
    if pid <= 0 {
        return false;
    }
    // SAFETY: signal 0 only checks for existence and permission.
    let rc = unsafe { libc::kill(pid, 0) };
    rc == 0 || std::io::Error::last_os_error().raw_os_error() == Some(libc::EPERM)
}

fn contention(board: &str, holder: LockInfo) -> OrchestrationError {
    if holder.stage == Stage::Simulate.id() {
        OrchestrationError::AlreadyRunning {
            board: board.to_string(),
            pid: holder.pid,
        }
    } else {
        OrchestrationError::WorkspaceBusy {
            board: board.to_string(),
            pid: holder.pid,
            stage: holder.stage,
        }
    }
}

fn private_path(path: &Path, token: &str) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    path.with_file_name(format!(".{name}.{token}"))
}

fn write_new(path: &Path, info: &LockInfo) -> Result<()> {
    let json = serde_json::to_string(info).map_err(|e| OrchestrationError::CorruptLock {
        path: path.to_path_buf(),
        detail: e.to_string(),
    })?;
    let mut file = OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)
        .map_err(OrchestrationError::io(path))?;
    file.write_all(json.as_bytes())
        .and_then(|()| file.sync_all())
        .map_err(OrchestrationError::io(path))
}

/// Try to publish `info` at `path`. `false` when the lock is already taken.
fn publish(path: &Path, info: &LockInfo) -> Result<bool> {
    let staging = private_path(path, &info.token);
    write_new(&staging, info)?;
    let linked = fs::hard_link(&staging, path);
    remove_if_present(&staging)?;
    match linked {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => Ok(false),
        Err(e) => Err(OrchestrationError::Io {
            path: path.to_path_buf(),
            source: e,
        }),
    }
}

fn remove_if_present(path: &Path) -> Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(OrchestrationError::Io {
            path: path.to_path_buf(),
            source: e,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plant(locks: &Path, board: &str, pid: u32, stage: Stage) {
        fs::create_dir_all(locks).unwrap();
        let info = LockInfo {
            pid,
            stage: stage.id().into(),
            token: "planted".into(),
        };
        fs::write(
            WorkspaceLock::path_for(locks, board),
            serde_json::to_string(&info).unwrap(),
        )
        .unwrap();
    }

    fn dead_pid() -> u32 {
        let mut child = std::process::Command::new("true").spawn().unwrap();
        let pid = child.id();
        child.wait().unwrap();
        pid
    }

    #[test]
    fn second_acquire_is_refused_until_release() {
        let dir = tempfile::tempdir().unwrap();
        let lock = WorkspaceLock::acquire(dir.path(), "demo", Stage::Build).unwrap();
        let held = read_lock(lock.path()).unwrap().unwrap();
        assert_eq!(held.pid, std::process::id());
        assert_eq!(held.stage, "build");

        let err = WorkspaceLock::acquire(dir.path(), "demo", Stage::Build).unwrap_err();
        assert!(matches!(err, OrchestrationError::WorkspaceBusy { .. }));

        // Other boards are independent.
        WorkspaceLock::acquire(dir.path(), "other", Stage::Build).unwrap();

        drop(lock);
        assert!(!WorkspaceLock::path_for(dir.path(), "demo").exists());
        WorkspaceLock::acquire(dir.path(), "demo", Stage::Build).unwrap();
    }

    #[test]
    fn live_simulation_reports_already_running() {
        let dir = tempfile::tempdir().unwrap();
        let mut lock = WorkspaceLock::acquire(dir.path(), "demo", Stage::Build).unwrap();
        lock.set_stage(Stage::Simulate).unwrap();
        match WorkspaceLock::acquire(dir.path(), "demo", Stage::Simulate) {
            Err(OrchestrationError::AlreadyRunning { board, pid }) => {
                assert_eq!(board, "demo");
                assert_eq!(pid, std::process::id());
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn stale_lock_is_reclaimed() {
        let dir = tempfile::tempdir().unwrap();
        plant(dir.path(), "demo", dead_pid(), Stage::Simulate);
        let lock = WorkspaceLock::acquire(dir.path(), "demo", Stage::Build).unwrap();
        assert_ne!(lock.info().token, "planted");
    }

    #[test]
    fn drop_leaves_foreign_lock_alone() {
        let dir = tempfile::tempdir().unwrap();
        let lock = WorkspaceLock::acquire(dir.path(), "demo", Stage::Build).unwrap();
        plant(dir.path(), "demo", std::process::id(), Stage::Build);
        drop(lock);
        assert!(WorkspaceLock::path_for(dir.path(), "demo").exists());
    }

    #[test]
    fn no_private_files_left_behind() {
        let dir = tempfile::tempdir().unwrap();
        let mut lock = WorkspaceLock::acquire(dir.path(), "demo", Stage::Build).unwrap();
        lock.set_stage(Stage::PrepareSimulatorFiles).unwrap();
        let names: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["demo.lock".to_string()]);
    }

    #[test]
    fn liveness() {
        assert!(pid_alive(std::process::id()));
        assert!(!pid_alive(dead_pid()));
        assert!(!pid_alive(0));
    }
}
