//! Bridge subnet addressing.
//!
//! Each managed bridge owns one /24 subnet, identified by its first three
//! octets (e.g. `"10.44.0"`). The daemon listens on the gateway address
//! (`.1`) and hands out leases from `.2` through `.254`, the same carve-up
//! the rest of the VM manager assumes when it plumbs a bridge.

use std::fmt;
use std::net::Ipv4Addr;
use std::str::FromStr;

use anyhow::bail;

/// A /24 subnet named by its leading three octets.
///
/// Parsed from strings like `"10.44.0"`; reserialises to the same form via
/// [`fmt::Display`]. Host addresses within the subnet are derived, never
/// stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Subnet {
    octets: [u8; 3],
}

impl Subnet {
    /// The bridge/gateway address the daemon binds: `<subnet>.1`.
    pub fn gateway(&self) -> Ipv4Addr {
        self.host(1)
    }

    /// First address handed out by DHCP: `<subnet>.2`.
    pub fn range_start(&self) -> Ipv4Addr {
        self.host(2)
    }

    /// Last address handed out by DHCP: `<subnet>.254`.
    pub fn range_end(&self) -> Ipv4Addr {
        self.host(254)
    }

    /// True if `addr` falls inside this /24.
    pub fn contains(&self, addr: Ipv4Addr) -> bool {
        addr.octets()[..3] == self.octets
    }

    fn host(&self, last: u8) -> Ipv4Addr {
        Ipv4Addr::new(self.octets[0], self.octets[1], self.octets[2], last)
    }
}

impl FromStr for Subnet {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split('.').collect();
        if parts.len() != 3 {
            bail!("subnet must be the first three octets of a /24 (e.g. 10.44.0), got {s:?}");
        }

        let mut octets = [0u8; 3];
        for (slot, part) in octets.iter_mut().zip(&parts) {
            *slot = part
                .parse::<u8>()
                .map_err(|_| anyhow::anyhow!("invalid subnet octet {part:?} in {s:?}"))?;
        }

        Ok(Self { octets })
    }
}

impl fmt::Display for Subnet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.octets[0], self.octets[1], self.octets[2])
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
