//! Forced lease revocation through the `dhcp_release` privileged helper.
//!
//! Revocation is diagnostic plumbing for VM teardown: when an instance is
//! destroyed, its lease should go with it so the address pool does not
//! silt up. Nothing here is allowed to fail the caller: every problem is
//! logged and absorbed, because a stuck lease must never block destroying
//! a VM.

use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use tracing::{debug, warn};

use crate::leases;
use crate::process::{self, ProcessSpec};

/// Helper binary shipped with dnsmasq-utils; needs the privileges to speak
/// raw DHCP on the bridge.
pub const DEFAULT_HELPER: &str = "dhcp_release";

/// Bound on the helper run. It performs a single DHCPRELEASE exchange, so
/// anything slower than this is wedged and gets killed.
const HELPER_WAIT: Duration = Duration::from_secs(5);

/// What one revocation attempt reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReleaseOutcome {
    /// Helper exited 0.
    Released,
    /// Helper exited non-zero or died to a signal (`exit_code` is `None`
    /// for the signalled case).
    Failed { exit_code: Option<i32> },
}

/// Capability to revoke a single lease.
///
/// Injected into the server so tests can observe invocations without the
/// privileged binary being present on the host.
#[async_trait]
pub trait LeaseReleaser: Send + Sync {
    /// Ask the daemon on `bridge` to forget the `ip`/`hw_addr` binding.
    ///
    /// # Errors
    ///
    /// Returns an error when the helper could not be launched or did not
    /// exit within the wait bound. Callers log; they do not propagate.
    async fn release(&self, bridge: &str, ip: Ipv4Addr, hw_addr: &str) -> Result<ReleaseOutcome>;
}

/// The real capability: runs `dhcp_release <bridge> <ip> <mac>`.
#[derive(Debug, Clone)]
pub struct DhcpReleaseCommand {
    program: PathBuf,
}

impl DhcpReleaseCommand {
    pub fn new() -> Self {
        Self::with_program(DEFAULT_HELPER)
    }

    /// Use an alternate helper binary (packaging differences, tests).
    pub fn with_program(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl Default for DhcpReleaseCommand {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LeaseReleaser for DhcpReleaseCommand {
    async fn release(&self, bridge: &str, ip: Ipv4Addr, hw_addr: &str) -> Result<ReleaseOutcome> {
        let spec = ProcessSpec::new(
            &self.program,
            vec![bridge.to_string(), ip.to_string(), hw_addr.to_string()],
        );

        let mut child = spec
            .spawn()
            .with_context(|| format!("launch {}", self.program.display()))?;

        match process::wait_for_exit(&mut child, HELPER_WAIT).await {
            Some(state) => {
                if let Some(err) = state.error {
                    bail!("wait for {}: {err}", self.program.display());
                }
                if state.code == Some(0) {
                    Ok(ReleaseOutcome::Released)
                } else {
                    Ok(ReleaseOutcome::Failed {
                        exit_code: state.code,
                    })
                }
            }
            None => {
                let _ = child.kill().await;
                bail!(
                    "{} did not exit within {HELPER_WAIT:?}",
                    self.program.display()
                );
            }
        }
    }
}

/// Revoke whatever lease `hw_addr` currently holds.
///
/// Resolves the address through the lease table first; a MAC with no lease
/// is a warned no-op. Helper launch errors and non-zero exits are logged
/// with the attempted ip/mac. This never returns an error: revocation is
/// best-effort by contract.
pub async fn release_mac(
    state_dir: &Path,
    bridge: &str,
    releaser: &dyn LeaseReleaser,
    hw_addr: &str,
) {
    let Some(ip) = leases::ip_for_mac(state_dir, hw_addr) else {
        warn!(hw_addr, "attempting to release non-existent address");
        return;
    };

    match releaser.release(bridge, ip, hw_addr).await {
        Ok(ReleaseOutcome::Released) => {
            debug!(ip = %ip, hw_addr, "lease released");
        }
        Ok(ReleaseOutcome::Failed { exit_code }) => {
            warn!(ip = %ip, hw_addr, exit_code, "failed to release ip address");
        }
        Err(e) => {
            warn!(ip = %ip, hw_addr, error = %e, "failed to release ip address");
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
