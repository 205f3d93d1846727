//! Child-process plumbing for measurement tools.
//!
//! Measurement commands are short-lived but untrusted: a wedged tool must
//! not wedge the worker, and a chatty one must not deadlock on a full pipe.
//! So stdout/stderr are drained on reader threads while the child is polled
//! with `try_wait` against a deadline; on timeout the child is killed and
//! reaped.

use std::io::Read;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use crate::ProbeError;

/// Captured output of a measurement command that exited successfully.
pub(crate) struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
}

/// Run a command to completion with a wall-clock bound.
///
/// On timeout the child is killed, reaped, and `ProbeError::Timeout` is
/// returned. A non-zero exit becomes `ProcessFailure` carrying the exit
/// status and whatever the tool wrote to stderr.
pub(crate) fn run_with_timeout(
    cmd: &mut Command,
    timeout: Duration,
) -> Result<CommandOutput, ProbeError> {
    let tool = cmd.get_program().to_string_lossy().into_owned();

    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    let mut child = cmd.spawn().map_err(|e| ProbeError::ProcessFailure {
        tool: tool.clone(),
        reason: format!("spawn failed: {e}"),
    })?;

    let stdout = drain(child.stdout.take());
    let stderr = drain(child.stderr.take());

    let status = wait_with_timeout(&mut child, timeout).ok_or_else(|| {
        tracing::warn!(tool = %tool, timeout_s = timeout.as_secs(), "measurement timed out, killing");
        let _ = child.kill();
        let _ = child.wait();
        ProbeError::Timeout {
            tool: tool.clone(),
            timeout,
        }
    })?;

    let stdout = stdout.join().unwrap_or_default();
    let stderr = stderr.join().unwrap_or_default();

    if !status.success() {
        return Err(ProbeError::ProcessFailure {
            tool,
            reason: format!("exited with {status}: {}", stderr.trim()),
        });
    }

    Ok(CommandOutput { stdout, stderr })
}

/// Read a pipe to EOF on a background thread.
fn drain(pipe: Option<impl Read + Send + 'static>) -> thread::JoinHandle<String> {
    thread::spawn(move || {
        let mut buf = String::new();
        if let Some(mut pipe) = pipe {
            let _ = pipe.read_to_string(&mut buf);
        }
        buf
    })
}

/// Poll a child until it exits or the deadline passes.
fn wait_with_timeout(child: &mut Child, timeout: Duration) -> Option<ExitStatus> {
    let deadline = Instant::now() + timeout;
    loop {
        match child.try_wait() {
            Ok(Some(status)) => return Some(status),
            Ok(None) => {}
            Err(e) => tracing::warn!(error = %e, "error polling child process"),
        }
        if Instant::now() >= deadline {
            return None;
        }
        thread::sleep(Duration::from_millis(50));
    }
}

/// A child process killed and reaped when the guard leaves scope.
///
/// Used for the iperf server-side listener: the listener must be stopped on
/// every exit path of the client measurement, including errors.
pub(crate) struct ScopedChild {
    child: Child,
    tool: String,
}

impl ScopedChild {
    pub(crate) fn spawn(cmd: &mut Command) -> Result<Self, ProbeError> {
        let tool = cmd.get_program().to_string_lossy().into_owned();
        cmd.stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null());
        let child = cmd.spawn().map_err(|e| ProbeError::ProcessFailure {
            tool: tool.clone(),
            reason: format!("listener spawn failed: {e}"),
        })?;
        Ok(Self { child, tool })
    }
}

impl Drop for ScopedChild {
    fn drop(&mut self) {
        if let Err(e) = self.child.kill() {
            tracing::debug!(tool = %self.tool, error = %e, "listener already gone");
        }
        let _ = self.child.wait();
    }
}
