//! Daemon lifecycle supervision: bounded start, crash detection, caller-driven
//! self-heal, and two-tier teardown.
//!
//! ```text
//! DaemonSupervisor::start()
//!     └─► tokio::process::Command  →  dnsmasq child process
//!             ├─► crash monitor task   (polls try_wait() every 250 ms,
//!             │                         logs "died …" and marks Crashed)
//!             └─► shutdown()           (SIGTERM → wait 1 s → SIGKILL → wait 100 ms)
//! ```
//!
//! The monitor never calls back into the supervisor; it only updates the
//! shared state the owner consults. Restarting after a crash is always the
//! caller's move, via [`DaemonSupervisor::check_running`].

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use tokio::process::Child;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::process::{self, ProcessSpec, ProcessState};

/// Exit code dnsmasq uses for a network access problem, in practice a
/// conflicting listener on the DNS port.
const ADDRESS_IN_USE_EXIT: i32 = 2;

const PORT_CONFLICT_HINT: &str = "Ensure nothing is using port 53.";

/// Crash monitor poll cadence.
const MONITOR_INTERVAL: Duration = Duration::from_millis(250);

// ---------------------------------------------------------------------------
// ServiceState
// ---------------------------------------------------------------------------

/// Observed lifecycle state of the supervised daemon.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServiceState {
    /// No child process exists. Initial and terminal.
    Stopped,
    /// A start is in flight (spawn plus settle window).
    Starting,
    /// The child is believed alive; the crash monitor is registered.
    Running,
    /// A requested stop is in flight.
    Stopping,
    /// The child finished without being asked to; carries the logged
    /// death report.
    Crashed(String),
}

// ---------------------------------------------------------------------------
// SupervisorTimeouts
// ---------------------------------------------------------------------------

/// Wait bounds for the supervisor's blocking transitions.
///
/// Defaults carry the production values; tests shrink them to keep the
/// escalation paths fast.
#[derive(Debug, Clone, Copy)]
pub struct SupervisorTimeouts {
    /// Window after spawn in which an exit fails the start. The daemon
    /// parses its config and binds its sockets well within this.
    pub start_settle: Duration,

    /// Graceful wait after SIGTERM before escalating.
    pub stop_grace: Duration,

    /// Wait after SIGKILL before giving up and logging.
    pub kill_wait: Duration,
}

impl Default for SupervisorTimeouts {
    fn default() -> Self {
        Self {
            start_settle: Duration::from_millis(500),
            stop_grace: Duration::from_secs(1),
            kill_wait: Duration::from_millis(100),
        }
    }
}

// ---------------------------------------------------------------------------
// DaemonSupervisor
// ---------------------------------------------------------------------------

/// Owns at most one live child process built from a fixed [`ProcessSpec`].
///
/// Call [`shutdown`](Self::shutdown) for the graceful two-tier stop. A
/// supervisor dropped without it aborts the monitor and reclaims the child
/// through `kill_on_drop`, so the daemon cannot outlive its owner either
/// way.
pub struct DaemonSupervisor {
    spec: ProcessSpec,
    timeouts: SupervisorTimeouts,
    child: Arc<RwLock<Option<Child>>>,
    state: Arc<RwLock<ServiceState>>,
    monitor: Option<JoinHandle<()>>,
}

impl DaemonSupervisor {
    pub fn new(spec: ProcessSpec) -> Self {
        Self::with_timeouts(spec, SupervisorTimeouts::default())
    }

    pub fn with_timeouts(spec: ProcessSpec, timeouts: SupervisorTimeouts) -> Self {
        Self {
            spec,
            timeouts,
            child: Arc::new(RwLock::new(None)),
            state: Arc::new(RwLock::new(ServiceState::Stopped)),
            monitor: None,
        }
    }

    /// Current lifecycle state.
    pub async fn state(&self) -> ServiceState {
        self.state.read().await.clone()
    }

    /// True when the child process handle reports a live process.
    pub async fn running(&self) -> bool {
        let mut guard = self.child.write().await;
        match guard.as_mut() {
            Some(child) => matches!(child.try_wait(), Ok(None)),
            None => false,
        }
    }

    /// Launch the daemon and register the crash monitor.
    ///
    /// The child must still be up at the end of the settle window; an exit
    /// inside it fails the start with the exit detail. Any previously owned
    /// child is replaced (and reclaimed via `kill_on_drop`), so the
    /// one-live-child invariant holds across restarts.
    ///
    /// # Errors
    ///
    /// Returns an error when the process cannot be spawned or exits within
    /// the settle window. The supervisor is left `Stopped` and may be
    /// started again.
    pub async fn start(&mut self) -> Result<()> {
        self.unregister_monitor();
        *self.state.write().await = ServiceState::Starting;

        let program = self.spec.program.display().to_string();
        debug!(%program, "starting daemon");

        let mut child = match self.spec.spawn() {
            Ok(child) => child,
            Err(e) => {
                *self.state.write().await = ServiceState::Stopped;
                return Err(e).with_context(|| format!("{program} failed to start"));
            }
        };

        if let Some(exit) = process::wait_for_exit(&mut child, self.timeouts.start_settle).await {
            *self.state.write().await = ServiceState::Stopped;
            bail!(start_failure_report(&program, &exit));
        }

        info!(%program, pid = child.id(), "daemon started");
        *self.child.write().await = Some(child);
        *self.state.write().await = ServiceState::Running;
        self.monitor = Some(spawn_monitor(
            program,
            Arc::clone(&self.child),
            Arc::clone(&self.state),
        ));

        Ok(())
    }

    /// Restart the daemon if (and only if) it is not running.
    ///
    /// This is the sole self-heal path; it is driven by the caller's health
    /// cadence, never by the monitor.
    ///
    /// # Errors
    ///
    /// Propagates only a failed restart.
    pub async fn check_running(&mut self) -> Result<()> {
        if self.running().await {
            return Ok(());
        }

        warn!(program = %self.spec.program.display(), "not running");
        self.start().await
    }

    /// Stop the daemon; never fails, idempotent.
    ///
    /// The monitor is unregistered before any signal goes out, so a
    /// requested stop is never reported as a crash. Escalation: SIGTERM,
    /// bounded wait; then SIGKILL, shorter bounded wait; then a warning if
    /// the child still refuses to go.
    pub async fn shutdown(&mut self) {
        self.unregister_monitor();
        *self.state.write().await = ServiceState::Stopping;

        let Some(mut child) = self.child.write().await.take() else {
            *self.state.write().await = ServiceState::Stopped;
            return;
        };

        debug!(program = %self.spec.program.display(), "terminating");
        if let Err(e) = process::terminate(&child) {
            debug!(error = %e, "SIGTERM delivery failed");
        }

        if process::wait_for_exit(&mut child, self.timeouts.stop_grace)
            .await
            .is_none()
        {
            info!(program = %self.spec.program.display(), "failed to terminate nicely, killing");
            let _ = child.start_kill();

            if process::wait_for_exit(&mut child, self.timeouts.kill_wait)
                .await
                .is_none()
            {
                warn!(program = %self.spec.program.display(), "failed to kill");
            }
        }

        *self.state.write().await = ServiceState::Stopped;
    }

    fn unregister_monitor(&mut self) {
        if let Some(handle) = self.monitor.take() {
            handle.abort();
        }
    }
}

impl Drop for DaemonSupervisor {
    fn drop(&mut self) {
        // No monitor may fire past this point; the child itself is
        // reclaimed by kill_on_drop when the handle unwinds.
        self.unregister_monitor();
    }
}

// ---------------------------------------------------------------------------
// Crash monitor
// ---------------------------------------------------------------------------

/// Watch the shared child handle and record an unrequested exit.
///
/// Registered only after a successful start; aborted before any requested
/// termination. It updates shared state and logs; it never restarts
/// anything.
fn spawn_monitor(
    program: String,
    child: Arc<RwLock<Option<Child>>>,
    state: Arc<RwLock<ServiceState>>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            tokio::time::sleep(MONITOR_INTERVAL).await;

            // A requested stop is not a crash.
            if matches!(
                *state.read().await,
                ServiceState::Stopping | ServiceState::Stopped
            ) {
                return;
            }

            let mut guard = child.write().await;
            let Some(live) = guard.as_mut() else {
                return;
            };

            match live.try_wait() {
                Ok(None) => {}
                Ok(Some(status)) => {
                    let report = crash_report(&ProcessState::from_status(status));
                    error!(%program, "{report}");
                    *guard = None;
                    drop(guard);
                    *state.write().await = ServiceState::Crashed(report);
                    return;
                }
                Err(e) => {
                    error!(%program, error = %e, "could not poll daemon state");
                }
            }
        }
    })
}

/// Diagnostic line for an unrequested daemon exit.
fn crash_report(exit: &ProcessState) -> String {
    let mut msg = String::from("died");
    if let Some(detail) = exit.failure_message() {
        msg.push_str(": ");
        msg.push_str(&detail);
    }
    if exit.code == Some(ADDRESS_IN_USE_EXIT) {
        msg.push_str(". ");
        msg.push_str(PORT_CONFLICT_HINT);
    }
    msg
}

/// Error text for a start that failed inside the settle window.
fn start_failure_report(program: &str, exit: &ProcessState) -> String {
    let mut msg = format!("{program} failed to start");
    if let Some(detail) = exit.failure_message() {
        msg.push_str(": ");
        msg.push_str(&detail);
    }
    if exit.code == Some(ADDRESS_IN_USE_EXIT) {
        msg.push_str(". ");
        msg.push_str(PORT_CONFLICT_HINT);
    }
    msg
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn exited(code: i32) -> ProcessState {
        ProcessState {
            code: Some(code),
            signal: None,
            error: None,
        }
    }

    #[test]
    fn crash_report_for_a_clean_exit_is_bare() {
        assert_eq!(crash_report(&exited(0)), "died");
    }

    #[test]
    fn crash_report_carries_the_exit_code() {
        assert_eq!(crash_report(&exited(1)), "died: exited with exit code 1");
    }

    #[test]
    fn crash_report_hints_at_port_conflicts_only_for_exit_code_2() {
        let with_hint = crash_report(&exited(2));
        assert_eq!(
            with_hint,
            "died: exited with exit code 2. Ensure nothing is using port 53."
        );

        for code in [0, 1, 3, 53] {
            assert!(
                !crash_report(&exited(code)).contains("port 53"),
                "exit code {code} must not produce the port hint"
            );
        }
    }

    #[test]
    fn crash_report_for_a_signalled_death_names_the_signal() {
        let state = ProcessState {
            code: None,
            signal: Some(9),
            error: None,
        };
        assert_eq!(crash_report(&state), "died: terminated by signal 9");
    }

    #[test]
    fn start_failure_report_includes_program_and_hint() {
        let msg = start_failure_report("dnsmasq", &exited(2));
        assert_eq!(
            msg,
            "dnsmasq failed to start: exited with exit code 2. Ensure nothing is using port 53."
        );

        let plain = start_failure_report("dnsmasq", &exited(1));
        assert!(!plain.contains("port 53"));
    }

    #[test]
    fn default_timeouts_keep_the_teardown_tiers_ordered() {
        let t = SupervisorTimeouts::default();
        assert!(t.stop_grace > t.kill_wait);
    }
}
