//! On-demand reader for the dnsmasq lease table.
//!
//! The lease file is owned and continuously rewritten by the daemon; this
//! module never caches it and never locks it. Every query re-reads
//! `<state_dir>/dnsmasq.leases` from scratch, and anything that does not
//! parse (short lines, a line torn by a concurrent rewrite) is skipped
//! rather than reported.

use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};

use serde::Serialize;

/// File the daemon writes its leases to, relative to the state directory.
pub const LEASES_FILE: &str = "dnsmasq.leases";

// dnsmasq lease entries consist of:
// <lease expiration> <mac addr> <ipv4> <hostname> <client id>
//
// The offsets are dnsmasq's on-disk format; a different daemon would need
// its own reader.
const EXPIRY_FIELD: usize = 0;
const HW_ADDR_FIELD: usize = 1;
const IPV4_FIELD: usize = 2;
const HOSTNAME_FIELD: usize = 3;

/// One row of the lease table, freshly parsed on every call.
///
/// Never stored by the crate; the file is the single source of truth.
#[derive(Debug, Clone, Serialize)]
pub struct LeaseEntry {
    /// Lease expiration as unix seconds; `None` when the field is not
    /// numeric (dnsmasq writes `0` for infinite leases).
    pub expiry: Option<u64>,

    /// Hardware (MAC) address as dnsmasq recorded it.
    pub hw_addr: String,

    /// Leased IPv4 address.
    pub ip: Ipv4Addr,

    /// Client hostname, `"*"` when the client sent none.
    pub hostname: String,
}

/// Absolute path of the lease file under `state_dir`.
pub fn lease_path(state_dir: &Path) -> PathBuf {
    state_dir.join(LEASES_FILE)
}

/// Resolve the IPv4 address currently leased to `hw_addr`.
///
/// First matching line wins. A missing or unreadable lease file means no
/// entries, not an error; the daemon simply has not written one yet.
pub fn ip_for_mac(state_dir: &Path, hw_addr: &str) -> Option<Ipv4Addr> {
    let table = std::fs::read_to_string(lease_path(state_dir)).ok()?;
    table
        .lines()
        .filter_map(parse_line)
        .find(|lease| lease.hw_addr == hw_addr)
        .map(|lease| lease.ip)
}

/// All current leases, in file order.
///
/// Used by the CLI listing; callers must treat the result as a snapshot
/// that is stale the moment it is returned.
pub fn entries(state_dir: &Path) -> Vec<LeaseEntry> {
    let Ok(table) = std::fs::read_to_string(lease_path(state_dir)) else {
        return Vec::new();
    };
    table.lines().filter_map(parse_line).collect()
}

fn parse_line(line: &str) -> Option<LeaseEntry> {
    let fields: Vec<&str> = line.split(' ').collect();
    if fields.len() <= IPV4_FIELD {
        return None;
    }

    // A torn or foreign line fails the address parse and is skipped.
    let ip = fields[IPV4_FIELD].parse().ok()?;

    Some(LeaseEntry {
        expiry: fields[EXPIRY_FIELD].parse().ok(),
        hw_addr: fields[HW_ADDR_FIELD].to_string(),
        ip,
        hostname: fields.get(HOSTNAME_FIELD).unwrap_or(&"*").to_string(),
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
