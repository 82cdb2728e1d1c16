//! leasekeeper: DHCP/DNS service supervision for bridged VM networks.
//!
//! Runs dnsmasq as a supervised foreground child serving one host bridge,
//! resolves VM MAC addresses to their IPv4 leases, and force-revokes leases
//! through the privileged `dhcp_release` helper.
//!
//! Uses tokio for process management and timers, tracing for structured
//! logs.
//!
//! Module map:
//! - [`net`]: the /24 subnet a bridge owns
//! - [`process`]: spawn/terminate/wait primitives over `tokio::process`
//! - [`dnsmasq`]: daemon command line and scratch config
//! - [`leases`]: lease table parsing (MAC to IP)
//! - [`release`]: lease revocation through the helper
//! - [`supervisor`]: start confirmation, crash monitor, two-tier teardown
//! - [`server`]: [`DnsmasqServer`], the assembled service

pub mod dnsmasq;
pub mod leases;
pub mod logging;
pub mod net;
pub mod process;
pub mod release;
pub mod server;
pub mod supervisor;

pub use leases::LeaseEntry;
pub use net::Subnet;
pub use release::{DhcpReleaseCommand, LeaseReleaser, ReleaseOutcome};
pub use server::{DnsmasqServer, NetworkConfig};
pub use supervisor::{DaemonSupervisor, ServiceState, SupervisorTimeouts};
