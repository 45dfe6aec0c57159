//! Process execution.
//!
//! Spawns the program under test with stdin read from the input fixture and
//! stdout/stderr written straight into the capture files, then waits for it
//! under a wall-clock timeout. On unix the child leads its own process
//! group, so a timeout takes down anything it forked as well.

use crate::resolve::ResolvedCase;
use serde::Serialize;
use std::fs::File;
use std::io;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::time::{Duration, Instant};

/// How often a running child is polled for completion.
const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Exit status reported when the executable does not exist.
pub const EXIT_NOT_FOUND: i32 = 127;

/// Exit status reported when the executable exists but cannot be started.
pub const EXIT_NOT_EXECUTABLE: i32 = 126;

/// Exit status reported when the input fixture cannot be opened.
pub const EXIT_BAD_INPUT: i32 = 1;

/// What happened when a case's program was run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ExecutionOutcome {
    /// The process ran to completion.
    Exited {
        code: i32,
        /// Signal that terminated the process, if any. `code` is then `128 + signal`.
        #[serde(skip_serializing_if = "Option::is_none")]
        signal: Option<i32>,
    },
    /// The process could not be started. `code` follows shell conventions.
    LaunchFailed { code: i32, reason: String },
    /// The process outlived the timeout and was killed.
    TimedOut { after: u64 },
}

impl ExecutionOutcome {
    /// Exit code, or `None` for a timed out run.
    pub fn exit_code(&self) -> Option<i32> {
        match self {
            ExecutionOutcome::Exited { code, .. } | ExecutionOutcome::LaunchFailed { code, .. } => {
                Some(*code)
            }
            ExecutionOutcome::TimedOut { .. } => None,
        }
    }

    pub fn timed_out(&self) -> bool {
        matches!(self, ExecutionOutcome::TimedOut { .. })
    }
}

/// Run a resolved case.
///
/// Both capture files are created (truncated) before anything else, so they
/// reflect only this run even when the launch fails. Case-level failures are
/// folded into the outcome; this never returns an error.
pub fn execute(resolved: &ResolvedCase<'_>, timeout: Duration) -> ExecutionOutcome {
    let (stdout, stderr) = match open_captures(resolved) {
        Ok(files) => files,
        Err(e) => {
            return ExecutionOutcome::LaunchFailed {
                code: EXIT_NOT_EXECUTABLE,
                reason: format!("cannot create capture files: {e}"),
            };
        }
    };

    let stdin = match File::open(&resolved.input) {
        Ok(f) => f,
        Err(e) => {
            return ExecutionOutcome::LaunchFailed {
                code: EXIT_BAD_INPUT,
                reason: format!("cannot open input {}: {e}", resolved.input.display()),
            };
        }
    };

    let mut cmd = Command::new(&resolved.executable);
    cmd.args(resolved.arguments())
        .current_dir(&resolved.working_dir)
        .stdin(Stdio::from(stdin))
        .stdout(Stdio::from(stdout))
        .stderr(Stdio::from(stderr));
    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt;
        cmd.process_group(0);
    }

    let child = match cmd.spawn() {
        Ok(child) => child,
        Err(e) => {
            tracing::debug!(case = resolved.ordinal, error = %e, "spawn failed");
            return launch_failure(&e, resolved);
        }
    };
    tracing::debug!(case = resolved.ordinal, pid = child.id(), "spawned");

    wait_with_timeout(child, timeout, resolved.ordinal)
}

fn open_captures(resolved: &ResolvedCase<'_>) -> io::Result<(File, File)> {
    let stdout = File::create(&resolved.actual_stdout)?;
    let stderr = File::create(&resolved.actual_stderr)?;
    Ok((stdout, stderr))
}

fn launch_failure(e: &io::Error, resolved: &ResolvedCase<'_>) -> ExecutionOutcome {
    let code = match e.kind() {
        io::ErrorKind::NotFound => EXIT_NOT_FOUND,
        _ => EXIT_NOT_EXECUTABLE,
    };
    ExecutionOutcome::LaunchFailed {
        code,
        reason: format!("cannot run {}: {e}", resolved.executable.display()),
    }
}

fn wait_with_timeout(mut child: Child, timeout: Duration, ordinal: usize) -> ExecutionOutcome {
    let start = Instant::now();
    loop {
        match child.try_wait() {
            Ok(Some(status)) => {
                tracing::debug!(case = ordinal, ?status, elapsed = ?start.elapsed(), "exited");
                return exited(status);
            }
            Ok(None) => {
                if start.elapsed() >= timeout {
                    kill(&mut child, ordinal);
                    return ExecutionOutcome::TimedOut {
                        after: timeout.as_secs(),
                    };
                }
                std::thread::sleep(POLL_INTERVAL);
            }
            Err(e) => {
                kill(&mut child, ordinal);
                return ExecutionOutcome::LaunchFailed {
                    code: EXIT_NOT_EXECUTABLE,
                    reason: format!("failed to wait for child: {e}"),
                };
            }
        }
    }
}

/// Kill the child's whole process group and reap the child so the capture
/// files are final before they are read.
fn kill(child: &mut Child, ordinal: usize) {
    #[cfg(unix)]
    if let Ok(pgid) = libc::pid_t::try_from(child.id()) {
        // SAFETY: kill(2) with a negated pid signals the group led by the
        // child, which is still unreaped and so cannot have been recycled.
        if unsafe { libc::kill(-pgid, libc::SIGKILL) } == -1 {
            let e = io::Error::last_os_error();
            tracing::debug!(case = ordinal, error = %e, "failed to kill process group");
        }
    }
    if let Err(e) = child.kill() {
        tracing::warn!(case = ordinal, error = %e, "failed to kill child");
    }
    if let Err(e) = child.wait() {
        tracing::warn!(case = ordinal, error = %e, "failed to reap child");
    }
    tracing::debug!(case = ordinal, "killed child");
}

fn exited(status: ExitStatus) -> ExecutionOutcome {
    #[cfg(unix)]
    let signal = {
        use std::os::unix::process::ExitStatusExt;
        status.signal()
    };
    #[cfg(not(unix))]
    let signal: Option<i32> = None;

    let code = match (status.code(), signal) {
        (Some(code), _) => code,
        (None, Some(sig)) => 128 + sig,
        (None, None) => -1,
    };
    ExecutionOutcome::Exited { code, signal }
}
