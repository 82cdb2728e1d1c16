//! dnsmasq invocation for one bridge.
//!
//! Builds the [`ProcessSpec`] the supervisor launches and owns the scratch
//! configuration file trick: dnsmasq is pointed at an empty, uniquely-named
//! conf file so it never reads the system-wide `/etc/dnsmasq.conf`, keeping
//! the managed instance isolated from whatever else the host runs.

use std::path::Path;

use anyhow::{Context, Result};
use tempfile::NamedTempFile;

use crate::leases;
use crate::net::Subnet;
use crate::process::ProcessSpec;

/// DNS domain the daemon serves for guest names (`<instance>.leasekeeper`).
pub const LOCAL_DOMAIN: &str = "leasekeeper";

/// Create the empty scratch conf file in `state_dir`.
///
/// One per server instance, named `dnsmasq-XXXXXX.conf`. The handle must be
/// kept alive for as long as the daemon may be (re)started from the
/// `ProcessSpec` that references it; the file is deleted when the handle drops.
pub fn create_conf_file(state_dir: &Path) -> Result<NamedTempFile> {
    tempfile::Builder::new()
        .prefix("dnsmasq-")
        .suffix(".conf")
        .tempfile_in(state_dir)
        .with_context(|| format!("create dnsmasq conf file in {}", state_dir.display()))
}

/// Build the dnsmasq command line for `bridge`/`subnet`.
///
/// The daemon must stay in the foreground (`--keep-in-foreground`) so the
/// supervisor's child handle tracks the real serving process, binds only the
/// bridge interface, and writes its lease table into `state_dir` where
/// [`crate::leases`] reads it.
pub fn daemon_spec(
    state_dir: &Path,
    bridge: &str,
    subnet: Subnet,
    conf_path: &Path,
) -> ProcessSpec {
    let args = vec![
        "--keep-in-foreground".to_string(),
        "--strict-order".to_string(),
        "--bind-interfaces".to_string(),
        "--pid-file=".to_string(),
        format!("--domain={LOCAL_DOMAIN}"),
        format!("--local=/{LOCAL_DOMAIN}/"),
        "--except-interface=lo".to_string(),
        format!("--interface={bridge}"),
        format!("--listen-address={}", subnet.gateway()),
        "--dhcp-no-override".to_string(),
        "--dhcp-authoritative".to_string(),
        format!(
            "--dhcp-leasefile={}",
            leases::lease_path(state_dir).display()
        ),
        format!(
            "--dhcp-range={},{},infinite",
            subnet.range_start(),
            subnet.range_end()
        ),
        format!("--conf-file={}", conf_path.display()),
    ];

    ProcessSpec::new("dnsmasq", args)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
