//! The assembled service: one dnsmasq instance serving one bridge, with the
//! lease table and revocation helper wired around it.
//!
//! [`DnsmasqServer`] is the only type most callers touch. Construction
//! starts the daemon (and fails hard when that fails); from then on the
//! owner reads leases, revokes them, and drives self-healing through this
//! type alone.

use std::fmt;
use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tempfile::NamedTempFile;
use tracing::info;

use crate::dnsmasq;
use crate::leases::{self, LeaseEntry};
use crate::net::Subnet;
use crate::release::{self, DhcpReleaseCommand, LeaseReleaser};
use crate::supervisor::{DaemonSupervisor, ServiceState};

/// Where and for whom the daemon serves.
#[derive(Debug, Clone)]
pub struct NetworkConfig {
    /// Directory holding the lease table and scratch config. Created on
    /// construction when missing.
    pub state_dir: PathBuf,
    /// Bridge interface the daemon binds.
    pub bridge: String,
    /// The /24 owned by the bridge.
    pub subnet: Subnet,
}

/// A supervised dnsmasq bound to one bridge.
pub struct DnsmasqServer {
    config: NetworkConfig,
    // Holds the scratch conf on disk for exactly the server's lifetime.
    conf_file: NamedTempFile,
    supervisor: DaemonSupervisor,
    releaser: Box<dyn LeaseReleaser>,
}

// Manual impl: the boxed `dyn LeaseReleaser` carries no `Debug` bound, so
// the derive cannot apply.
impl fmt::Debug for DnsmasqServer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DnsmasqServer")
            .field("config", &self.config)
            .field("conf_file", &self.conf_file)
            .finish_non_exhaustive()
    }
}

impl DnsmasqServer {
    /// Start a server that revokes leases through the stock `dhcp_release`
    /// helper.
    ///
    /// # Errors
    ///
    /// Fails when the state directory cannot be created, the scratch config
    /// cannot be written, or the daemon does not come up.
    pub async fn new(config: NetworkConfig) -> Result<Self> {
        Self::with_releaser(config, Box::new(DhcpReleaseCommand::new())).await
    }

    /// Start a server with a caller-supplied revocation capability.
    pub async fn with_releaser(
        config: NetworkConfig,
        releaser: Box<dyn LeaseReleaser>,
    ) -> Result<Self> {
        tokio::fs::create_dir_all(&config.state_dir)
            .await
            .with_context(|| {
                format!("could not create state dir {}", config.state_dir.display())
            })?;

        let conf_file = dnsmasq::create_conf_file(&config.state_dir)?;
        let spec = dnsmasq::daemon_spec(
            &config.state_dir,
            &config.bridge,
            config.subnet,
            conf_file.path(),
        );

        let mut supervisor = DaemonSupervisor::new(spec);
        supervisor.start().await?;

        info!(bridge = %config.bridge, subnet = %config.subnet, "dnsmasq serving");

        Ok(Self {
            config,
            conf_file,
            supervisor,
            releaser,
        })
    }

    /// IPv4 address currently leased to `hw_addr`, if any.
    pub fn get_ip_for(&self, hw_addr: &str) -> Option<Ipv4Addr> {
        leases::ip_for_mac(&self.config.state_dir, hw_addr)
    }

    /// Every parseable row of the lease table, in file order.
    pub fn leases(&self) -> Vec<LeaseEntry> {
        leases::entries(&self.config.state_dir)
    }

    /// Force-revoke whatever lease `hw_addr` holds.
    ///
    /// Best-effort: misses and helper failures are logged, never returned.
    pub async fn release_mac(&self, hw_addr: &str) {
        release::release_mac(
            &self.config.state_dir,
            &self.config.bridge,
            self.releaser.as_ref(),
            hw_addr,
        )
        .await;
    }

    /// Restart the daemon if it is found dead; a no-op while it runs.
    ///
    /// # Errors
    ///
    /// Propagates a failed restart.
    pub async fn check_running(&mut self) -> Result<()> {
        self.supervisor.check_running().await
    }

    /// True when the daemon process is alive right now.
    pub async fn running(&self) -> bool {
        self.supervisor.running().await
    }

    /// Current lifecycle state, including any crash report.
    pub async fn state(&self) -> ServiceState {
        self.supervisor.state().await
    }

    /// Graceful two-tier stop. Idempotent.
    ///
    /// Dropping the server without calling this still reclaims the child,
    /// but skips the graceful tier.
    pub async fn shutdown(&mut self) {
        self.supervisor.shutdown().await;
    }

    pub fn config(&self) -> &NetworkConfig {
        &self.config
    }

    /// Path of the scratch config file passed to the daemon.
    pub fn conf_path(&self) -> &Path {
        self.conf_file.path()
    }
}
