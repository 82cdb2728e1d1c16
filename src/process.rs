//! Child-process plumbing shared by the supervisor and the release helper.
//!
//! Everything here is a thin layer over `tokio::process`: argument
//! marshaling ([`ProcessSpec`]), exit bookkeeping ([`ProcessState`]), and the
//! two signal/wait primitives the supervisor's teardown tiers need. Policy
//! (when to restart, when to escalate, what to log) lives in
//! [`crate::supervisor`], not here.

use std::os::unix::process::ExitStatusExt;
use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use tokio::process::{Child, Command};
use tokio::time::timeout;

// ---------------------------------------------------------------------------
// ProcessSpec
// ---------------------------------------------------------------------------

/// A fully marshaled command line for one external process.
///
/// Built once (see [`crate::dnsmasq::daemon_spec`]) and kept by the
/// supervisor so the same invocation can be respawned after a crash.
#[derive(Debug, Clone)]
pub struct ProcessSpec {
    /// Executable name or path; resolved via `PATH` when bare.
    pub program: PathBuf,

    /// Positional arguments, already rendered to strings.
    pub args: Vec<String>,
}

impl ProcessSpec {
    pub fn new(program: impl Into<PathBuf>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    /// Launch the process with all standard streams detached.
    ///
    /// The child is spawned with `kill_on_drop`, so a dropped handle can
    /// never leak a running daemon past its owner.
    ///
    /// # Errors
    ///
    /// Returns the underlying io error when the executable cannot be
    /// spawned (missing binary, permission denied).
    pub fn spawn(&self) -> std::io::Result<Child> {
        Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
    }
}

// ---------------------------------------------------------------------------
// ProcessState
// ---------------------------------------------------------------------------

/// How a child process finished.
///
/// Carries the exit code for a normal exit, the signal number for a
/// signalled death, or the io error text when the handle itself failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessState {
    /// Exit code, when the process exited normally.
    pub code: Option<i32>,

    /// Terminating signal, when the process was killed by one.
    pub signal: Option<i32>,

    /// Description of a spawn/wait failure, when no exit was observed.
    pub error: Option<String>,
}

impl ProcessState {
    pub fn from_status(status: ExitStatus) -> Self {
        Self {
            code: status.code(),
            signal: status.signal(),
            error: None,
        }
    }

    pub fn from_error(err: &std::io::Error) -> Self {
        Self {
            code: None,
            signal: None,
            error: Some(err.to_string()),
        }
    }

    /// Human-readable failure detail, or `None` for a clean exit 0.
    pub fn failure_message(&self) -> Option<String> {
        if let Some(err) = &self.error {
            return Some(err.clone());
        }
        if let Some(sig) = self.signal {
            return Some(format!("terminated by signal {sig}"));
        }
        match self.code {
            Some(0) | None => None,
            Some(code) => Some(format!("exited with exit code {code}")),
        }
    }
}

// ---------------------------------------------------------------------------
// Signal / wait primitives
// ---------------------------------------------------------------------------

/// Ask the child to exit with SIGTERM.
///
/// No-op when the child has already been reaped (no pid). Errors surface the
/// kill(2) errno; callers in the teardown path log and escalate instead of
/// propagating.
pub fn terminate(child: &Child) -> std::io::Result<()> {
    let Some(pid) = child.id() else {
        return Ok(());
    };

    let rc = unsafe { libc::kill(pid as libc::pid_t, libc::SIGTERM) };
    if rc == 0 {
        Ok(())
    } else {
        Err(std::io::Error::last_os_error())
    }
}

/// Wait for the child to finish, bounded by `limit`.
///
/// Returns the observed [`ProcessState`] when the child finished (or the
/// wait itself failed and the handle is unusable), `None` when the child is
/// still running at the deadline.
pub async fn wait_for_exit(child: &mut Child, limit: Duration) -> Option<ProcessState> {
    match timeout(limit, child.wait()).await {
        Ok(Ok(status)) => Some(ProcessState::from_status(status)),
        Ok(Err(e)) => Some(ProcessState::from_error(&e)),
        Err(_elapsed) => None,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn sh(script: &str) -> ProcessSpec {
        ProcessSpec::new("/bin/sh", vec!["-c".to_string(), script.to_string()])
    }

    #[test]
    fn clean_exit_has_no_failure_message() {
        let state = ProcessState {
            code: Some(0),
            signal: None,
            error: None,
        };
        assert_eq!(state.failure_message(), None);
    }

    #[test]
    fn nonzero_exit_reports_the_code() {
        let state = ProcessState {
            code: Some(5),
            signal: None,
            error: None,
        };
        assert_eq!(
            state.failure_message().as_deref(),
            Some("exited with exit code 5")
        );
    }

    #[test]
    fn signalled_death_reports_the_signal() {
        let state = ProcessState {
            code: None,
            signal: Some(9),
            error: None,
        };
        assert_eq!(
            state.failure_message().as_deref(),
            Some("terminated by signal 9")
        );
    }

    #[test]
    fn spawn_error_text_is_carried_through() {
        let err = std::io::Error::new(std::io::ErrorKind::NotFound, "no such file");
        let state = ProcessState::from_error(&err);
        assert_eq!(state.failure_message().as_deref(), Some("no such file"));
    }

    #[tokio::test]
    async fn spawn_and_wait_reports_exit_code() {
        let mut child = sh("exit 3").spawn().expect("spawn /bin/sh");
        let state = wait_for_exit(&mut child, Duration::from_secs(5))
            .await
            .expect("child should exit well within the limit");
        assert_eq!(state.code, Some(3));
        assert_eq!(state.signal, None);
    }

    #[tokio::test]
    async fn spawn_missing_binary_is_an_io_error() {
        let spec = ProcessSpec::new("/nonexistent/leasekeeper-test-binary", vec![]);
        assert!(spec.spawn().is_err());
    }

    #[tokio::test]
    async fn wait_for_exit_times_out_on_a_live_child() {
        let mut child = sh("sleep 30").spawn().expect("spawn sleeper");
        let observed = wait_for_exit(&mut child, Duration::from_millis(50)).await;
        assert!(observed.is_none(), "sleeper must still be running");
        child.kill().await.expect("kill sleeper");
    }

    #[tokio::test]
    async fn terminate_delivers_sigterm() {
        let mut child = sh("sleep 30").spawn().expect("spawn sleeper");
        terminate(&child).expect("SIGTERM should be deliverable");

        let state = wait_for_exit(&mut child, Duration::from_secs(5))
            .await
            .expect("sleeper should die from SIGTERM");
        assert_eq!(state.signal, Some(libc::SIGTERM));
    }
}
