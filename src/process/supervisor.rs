//! Transcoder process ownership
//!
//! A [`TranscoderProcess`] is the only handle to a running transcoder.
//! Every session teardown path ends in [`TranscoderProcess::terminate`],
//! which always returns: SIGTERM, a bounded wait, then SIGKILL.

use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use tokio::process::{Child, ChildStdout, Command};
use tokio::sync::Mutex;

use crate::error::{Error, Result};

/// How a terminate call ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminateOutcome {
    /// The process had already exited
    AlreadyExited,
    /// The process exited within the grace period
    Graceful,
    /// The grace period expired and the process was killed
    Killed,
}

/// Exclusively owned transcoder process
pub struct TranscoderProcess {
    pid: Option<u32>,
    program: String,
    child: Mutex<Child>,
    stdout: Option<ChildStdout>,
}

impl TranscoderProcess {
    /// Spawn `command`, piping stdout only when `capture_stdout` is set
    ///
    /// stdin is closed and diagnostics are discarded. The child is also
    /// killed if the handle is dropped without `terminate`.
    pub fn spawn(mut command: Command, capture_stdout: bool) -> Result<Self> {
        let program = command.as_std().get_program().to_string_lossy().into_owned();

        command
            .stdin(Stdio::null())
            .stdout(if capture_stdout {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stderr(Stdio::null())
            .kill_on_drop(true);

        let mut child = command.spawn().map_err(|source| Error::Spawn {
            program: program.clone(),
            source,
        })?;

        let pid = child.id();
        let stdout = child.stdout.take();

        tracing::debug!(pid = ?pid, program = %program, "Transcoder spawned");

        Ok(Self {
            pid,
            program,
            child: Mutex::new(child),
            stdout,
        })
    }

    /// OS process id, if the OS reported one at spawn
    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// Executable name the process was started from
    pub fn program(&self) -> &str {
        &self.program
    }

    /// Take the stdout pipe; `None` if not captured or already taken
    pub fn take_stdout(&mut self) -> Option<ChildStdout> {
        self.stdout.take()
    }

    /// Non-blocking liveness check
    pub async fn is_alive(&self) -> bool {
        matches!(self.child.lock().await.try_wait(), Ok(None))
    }

    /// Exit status if the process has exited
    pub async fn exit_status(&self) -> Option<ExitStatus> {
        self.child.lock().await.try_wait().ok().flatten()
    }

    /// Stop the process: graceful signal, wait up to `grace`, then kill
    pub async fn terminate(&self, grace: Duration) -> TerminateOutcome {
        let mut child = self.child.lock().await;

        if let Ok(Some(status)) = child.try_wait() {
            tracing::debug!(pid = ?self.pid, status = %status, "Transcoder already exited");
            return TerminateOutcome::AlreadyExited;
        }

        send_terminate(&mut child);

        match tokio::time::timeout(grace, child.wait()).await {
            Ok(Ok(status)) => {
                tracing::debug!(pid = ?self.pid, status = %status, "Transcoder exited");
                TerminateOutcome::Graceful
            }
            Ok(Err(e)) => {
                // Exit could not be confirmed; make sure it is gone
                tracing::warn!(pid = ?self.pid, error = %e, "Failed to wait for transcoder, killing");
                force_kill(&mut child, self.pid).await
            }
            Err(_) => {
                tracing::warn!(
                    pid = ?self.pid,
                    grace_ms = grace.as_millis() as u64,
                    "Transcoder ignored termination, killing"
                );
                force_kill(&mut child, self.pid).await
            }
        }
    }
}

async fn force_kill(child: &mut Child, pid: Option<u32>) -> TerminateOutcome {
    if let Err(e) = child.kill().await {
        tracing::warn!(pid = ?pid, error = %e, "Failed to kill transcoder");
    }
    TerminateOutcome::Killed
}

#[cfg(unix)]
fn send_terminate(child: &mut Child) {
    use nix::sys::signal::{kill, Signal};
    use nix::unistd::Pid;

    if let Some(pid) = child.id() {
        let _ = kill(Pid::from_raw(pid as i32), Signal::SIGTERM);
    }
}

#[cfg(not(unix))]
fn send_terminate(child: &mut Child) {
    // No graceful signal available; the wait below sees the kill land
    let _ = child.start_kill();
}
