//! Spawning and supervising external processes.

use std::collections::BTreeMap;
use std::fs::File;
use std::path::Path;
use std::os::unix::process::CommandExt;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::error::{OrchestrationError, Result};
use crate::stage::Stage;
use crate::tool::ToolCommand;

const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Where a supervised process's output goes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputMode {
    /// Captured to the stage log.
    #[default]
    Log,
    /// Passed through to our own stdout/stderr.
    Inherit,
}

/// A tool ready to be spawned: command line, name for messages, stage.
pub struct Invocation<'a> {
    pub name: &'a str,
    pub tool: &'a ToolCommand,
    pub vars: &'a BTreeMap<&'a str, String>,
    pub cwd: &'a Path,
    pub env: &'a BTreeMap<String, String>,
    pub stage: Option<Stage>,
}

impl Invocation<'_> {
    fn command(&self) -> Result<Command> {
        let mut cmd = self.tool.command(self.vars)?;
        cmd.current_dir(self.cwd).envs(self.env).stdin(Stdio::null());
        Ok(cmd)
    }

    fn spawn(&self, cmd: &mut Command) -> Result<Child> {
        tracing::debug!(tool = self.name, program = %self.tool.program, "spawning");
        cmd.spawn().map_err(|e| self.spawn_error(e))
    }

    fn spawn_error(&self, e: std::io::Error) -> OrchestrationError {
        if e.kind() == std::io::ErrorKind::NotFound {
            OrchestrationError::ToolNotFound {
                tool: self.name.to_string(),
                program: self.tool.program.clone(),
                stage: self.stage,
            }
        } else {
            OrchestrationError::Io {
                path: self.tool.program.clone().into(),
                source: e,
            }
        }
    }
}

fn log_file(log: &Path) -> Result<(File, File)> {
    if let Some(parent) = log.parent() {
        std::fs::create_dir_all(parent).map_err(OrchestrationError::io(parent))?;
    }
    let out = File::create(log).map_err(OrchestrationError::io(log))?;
    let err = out.try_clone().map_err(OrchestrationError::io(log))?;
    Ok((out, err))
}

/// Run to completion and return stdout; stderr goes to `log`.
pub fn run_captured(inv: &Invocation<'_>, log: &Path) -> Result<(ExitStatus, String)> {
    let (_, err) = log_file(log)?;
    let mut cmd = inv.command()?;
    cmd.stdout(Stdio::piped()).stderr(err);
    let child = inv.spawn(&mut cmd)?;
    let output = child.wait_with_output().map_err(OrchestrationError::io(log))?;
    Ok((output.status, String::from_utf8_lossy(&output.stdout).into_owned()))
}

/// How a supervised process ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessEnd {
    /// Exited on its own before any deadline.
    Exited(ExitStatus),
    /// Exited after being sent SIGINT at the deadline, on Ctrl-C or on a
    /// stop request.
    Interrupted(ExitStatus),
    /// Ignored SIGINT for the whole grace period and was killed.
    Killed,
}

/// Deadline handling for a long-running process.
#[derive(Debug, Clone)]
pub struct Supervision {
    pub timeout: Option<Duration>,
    /// Time allowed between SIGINT and SIGKILL.
    pub grace: Duration,
    /// Raised by another thread to stop the process early.
    pub stop: Option<Arc<AtomicBool>>,
}

impl Default for Supervision {
    fn default() -> Self {
        Self {
            timeout: None,
            grace: Duration::from_secs(5),
            stop: None,
        }
    }
}

/// Start a tool in its own process group and supervise it until it ends.
/// Signals go to the whole group so helpers spawned by wrapper scripts stop
/// with the tool.
pub fn run_supervised(
    inv: &Invocation<'_>,
    log: &Path,
    output: OutputMode,
    supervision: Supervision,
) -> Result<ProcessEnd> {
    let mut cmd = inv.command()?;
    cmd.process_group(0);
    if output == OutputMode::Log {
        let (out, err) = log_file(log)?;
        cmd.stdout(out).stderr(err);
    }
    let mut child = inv.spawn(&mut cmd)?;
    supervise(&mut child, supervision).map_err(OrchestrationError::io(log))
}

/// Set by our SIGINT handler while a supervised group is running. The group
/// does not receive terminal Ctrl-C itself, so it is forwarded from here.
static CTRL_C: AtomicBool = AtomicBool::new(false);

extern "C" fn note_ctrl_c(_: libc::c_int) {
    CTRL_C.store(true, Ordering::SeqCst);
}

/// Restores the previous SIGINT disposition on drop.
struct CtrlCForward {
    previous: libc::sighandler_t,
}

impl CtrlCForward {
    fn install() -> Self {
        CTRL_C.store(false, Ordering::SeqCst);
        let handler = note_ctrl_c as extern "C" fn(libc::c_int) as libc::sighandler_t;
        // SAFETY: the handler only stores to an atomic.
        let previous = unsafe { libc::signal(libc::SIGINT, handler) };
        Self { previous }
    }
}

impl Drop for CtrlCForward {
    fn drop(&mut self) {
        // SAFETY: reinstalls the disposition saved in `install`.
        unsafe {
            libc::signal(libc::SIGINT, self.previous);
        }
    }
}

/// Wait for `child`, the leader of its own process group. At the deadline (or
/// on Ctrl-C, or when the stop flag is raised) the group gets SIGINT, and
/// SIGKILL once the grace period is over. Whatever is left of the group after an interrupted run is killed.
pub fn supervise(child: &mut Child, supervision: Supervision) -> std::io::Result<ProcessEnd> {
    let group = child.id();
    let _forward = CtrlCForward::install();
    let started = Instant::now();
    loop {
        if let Some(status) = child.try_wait()? {
            return Ok(ProcessEnd::Exited(status));
        }
        if CTRL_C.load(Ordering::SeqCst) {
            tracing::info!(pid = group, "interrupted, stopping process group");
            break;
        }
        if supervision.stop.as_deref().is_some_and(|stop| stop.load(Ordering::SeqCst)) {
            tracing::info!(pid = group, "stop requested, stopping process group");
            break;
        }
        if supervision.timeout.is_some_and(|t| started.elapsed() >= t) {
            tracing::info!(pid = group, "timeout reached, sending SIGINT");
            break;
        }
        std::thread::sleep(POLL_INTERVAL);
    }

    signal_group(group, libc::SIGINT)?;
    let interrupted = Instant::now();
    while interrupted.elapsed() < supervision.grace {
        if let Some(status) = child.try_wait()? {
            // Background helpers that outlived the leader.
            signal_group(group, libc::SIGKILL)?;
            return Ok(ProcessEnd::Interrupted(status));
        }
        std::thread::sleep(POLL_INTERVAL);
    }

    tracing::warn!(pid = group, "process ignored SIGINT, killing its group");
    signal_group(group, libc::SIGKILL)?;
    child.wait()?;
    Ok(ProcessEnd::Killed)
}

/// Whether `status` is the result of SIGINT: killed by the signal, or the
/// shell convention of exit code 130.
pub fn interrupted_by_sigint(status: &ExitStatus) -> bool {
    use std::os::unix::process::ExitStatusExt;
    status.signal() == Some(libc::SIGINT) || status.code() == Some(130)
}

/// Send `signal` to process group `pgid`. A group with no members left is
/// not an error.
fn signal_group(pgid: u32, signal: libc::c_int) -> std::io::Result<()> {
    let pgid = libc::pid_t::try_from(pgid)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidInput, e))?;
    // SAFETY: pgid is the group led by a child we have not yet reaped.
    if unsafe { libc::killpg(pgid, signal) } == 0 {
        return Ok(());
    }
    let err = std::io::Error::last_os_error();
    if err.raw_os_error() == Some(libc::ESRCH) {
        Ok(())
    } else {
        Err(err)
    }
}
