//! leasekeeper command line.
//!
//! `serve` runs the supervised daemon in the foreground; the other
//! subcommands are thin views over the same state directory, usable while
//! a server (this one or another process's) owns it.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Result, bail};
use clap::{Parser, Subcommand};
use tokio::signal::unix::{SignalKind, signal};
use tracing::{error, info};

use leasekeeper::release::DEFAULT_HELPER;
use leasekeeper::{
    DhcpReleaseCommand, DnsmasqServer, NetworkConfig, Subnet, leases, logging, release,
};

#[derive(Parser, Debug)]
#[command(
    name = "leasekeeper",
    version,
    about = "Supervised dnsmasq for bridged VM networks"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the supervised daemon in the foreground until interrupted
    Serve {
        /// Directory for the lease table and scratch config
        #[arg(long)]
        state_dir: PathBuf,

        /// Bridge interface to serve
        #[arg(long)]
        bridge: String,

        /// Leading three octets of the bridge's /24 (e.g. 10.44.0)
        #[arg(long)]
        subnet: Subnet,

        /// Seconds between liveness checks
        #[arg(long, default_value_t = 5)]
        health_interval: u64,
    },

    /// Print the IPv4 address leased to a MAC address
    Lookup {
        /// Directory holding the lease table
        #[arg(long)]
        state_dir: PathBuf,

        /// Hardware address to resolve (as dnsmasq records it)
        hw_addr: String,
    },

    /// List the lease table
    Leases {
        /// Directory holding the lease table
        #[arg(long)]
        state_dir: PathBuf,

        /// Emit JSON instead of columns
        #[arg(long)]
        json: bool,
    },

    /// Force-release the lease held by a MAC address
    Release {
        /// Directory holding the lease table
        #[arg(long)]
        state_dir: PathBuf,

        /// Bridge interface the lease was issued on
        #[arg(long)]
        bridge: String,

        /// Path to the dhcp_release helper
        #[arg(long, default_value = DEFAULT_HELPER)]
        helper: PathBuf,

        hw_addr: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let _log_guard = logging::init();
    let cli = Cli::parse();

    match cli.command {
        Command::Serve {
            state_dir,
            bridge,
            subnet,
            health_interval,
        } => serve(state_dir, bridge, subnet, health_interval).await,
        Command::Lookup { state_dir, hw_addr } => lookup(&state_dir, &hw_addr),
        Command::Leases { state_dir, json } => list_leases(&state_dir, json),
        Command::Release {
            state_dir,
            bridge,
            helper,
            hw_addr,
        } => {
            let releaser = DhcpReleaseCommand::with_program(helper);
            release::release_mac(&state_dir, &bridge, &releaser, &hw_addr).await;
            Ok(())
        }
    }
}

/// Foreground service: start the daemon, keep it alive, stop it cleanly.
async fn serve(
    state_dir: PathBuf,
    bridge: String,
    subnet: Subnet,
    health_interval: u64,
) -> Result<()> {
    let config = NetworkConfig {
        state_dir,
        bridge,
        subnet,
    };
    let mut server = DnsmasqServer::new(config).await?;

    let mut health = tokio::time::interval(Duration::from_secs(health_interval.max(1)));
    health.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    let mut sigterm = signal(SignalKind::terminate())?;

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            _ = sigterm.recv() => break,
            _ = health.tick() => {
                // A failed restart is retried on the next tick.
                if let Err(e) = server.check_running().await {
                    error!(error = %e, "restart failed");
                }
            }
        }
    }

    info!("shutting down");
    server.shutdown().await;
    Ok(())
}

fn lookup(state_dir: &Path, hw_addr: &str) -> Result<()> {
    match leases::ip_for_mac(state_dir, hw_addr) {
        Some(ip) => {
            println!("{ip}");
            Ok(())
        }
        None => bail!("no lease for {hw_addr}"),
    }
}

fn list_leases(state_dir: &Path, json: bool) -> Result<()> {
    let entries = leases::entries(state_dir);

    if json {
        println!("{}", serde_json::to_string_pretty(&entries)?);
        return Ok(());
    }

    for entry in &entries {
        let expiry = match entry.expiry {
            Some(0) => "infinite".to_string(),
            Some(secs) => chrono::DateTime::from_timestamp(secs as i64, 0)
                .map(|t| t.to_rfc3339())
                .unwrap_or_else(|| secs.to_string()),
            None => "-".to_string(),
        };
        println!(
            "{}  {}  {}  {}",
            entry.hw_addr, entry.ip, entry.hostname, expiry
        );
    }

    Ok(())
}
