//! Integration tests against a real dnsmasq.
//!
//! These start the actual daemon on a host bridge and exercise the whole
//! service end to end. Because they need the `dnsmasq` binary, root (the
//! daemon binds port 53 on the bridge), and a bridge interface carrying the
//! gateway address, they are gated with the `dnsmasq-integration-tests`
//! feature flag.
//!
//! # Running
//!
//! ```bash
//! ip link add lkbr0 type bridge
//! ip addr add 10.247.250.1/24 dev lkbr0
//! ip link set lkbr0 up
//!
//! cargo test --features dnsmasq-integration-tests --test dnsmasq_integration \
//!     -- --test-threads=1
//! ```
//!
//! Every test binds the same bridge, so they must not run concurrently.
//! Override the bridge and subnet with `LEASEKEEPER_TEST_BRIDGE` and
//! `LEASEKEEPER_TEST_SUBNET`.

#![cfg(all(feature = "dnsmasq-integration-tests", unix))]

use std::time::Duration;

use leasekeeper::{DnsmasqServer, NetworkConfig, ServiceState, Subnet};

// ---------------------------------------------------------------------------
// Environment variable helpers
// ---------------------------------------------------------------------------

fn test_bridge() -> String {
    std::env::var("LEASEKEEPER_TEST_BRIDGE").unwrap_or_else(|_| "lkbr0".to_string())
}

fn test_subnet() -> Subnet {
    std::env::var("LEASEKEEPER_TEST_SUBNET")
        .unwrap_or_else(|_| "10.247.250".to_string())
        .parse()
        .expect("LEASEKEEPER_TEST_SUBNET must be three dotted octets")
}

fn test_config(state_dir: &std::path::Path) -> NetworkConfig {
    NetworkConfig {
        state_dir: state_dir.to_path_buf(),
        bridge: test_bridge(),
        subnet: test_subnet(),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_server_starts_and_stops() {
    let tmp = tempfile::TempDir::new().expect("temp state dir");
    let mut server = DnsmasqServer::new(test_config(tmp.path()))
        .await
        .expect("dnsmasq should start on the test bridge");

    assert!(server.running().await, "daemon must be alive after start");
    assert!(server.conf_path().exists(), "scratch conf must be on disk");

    server.shutdown().await;
    assert!(!server.running().await);
    assert_eq!(server.state().await, ServiceState::Stopped);
}

#[tokio::test]
async fn test_fresh_server_has_no_leases() {
    let tmp = tempfile::TempDir::new().expect("temp state dir");
    let mut server = DnsmasqServer::new(test_config(tmp.path()))
        .await
        .expect("dnsmasq should start on the test bridge");

    assert!(server.leases().is_empty(), "no client has leased anything");
    assert_eq!(server.get_ip_for("52:54:00:12:34:56"), None);

    server.shutdown().await;
}

#[tokio::test]
async fn test_check_running_revives_a_killed_daemon() {
    let tmp = tempfile::TempDir::new().expect("temp state dir");
    let mut server = DnsmasqServer::new(test_config(tmp.path()))
        .await
        .expect("dnsmasq should start on the test bridge");

    // Kill it behind the supervisor's back. The leasefile argument carries
    // the unique state dir, so the pattern matches exactly this daemon.
    let pattern = format!("--dhcp-leasefile={}", tmp.path().join("dnsmasq.leases").display());
    let killed = std::process::Command::new("pkill")
        .arg("-KILL")
        .arg("-f")
        .arg(&pattern)
        .status()
        .expect("run pkill");
    assert!(killed.success(), "pkill must find the daemon");

    // Death plus at least one monitor poll.
    tokio::time::sleep(Duration::from_millis(1000)).await;
    assert!(matches!(server.state().await, ServiceState::Crashed(_)));

    server
        .check_running()
        .await
        .expect("restart should succeed");
    assert!(server.running().await, "daemon must be back up");

    server.shutdown().await;
}

#[tokio::test]
async fn test_conflicting_listener_fails_the_start_with_the_port_hint() {
    let tmp_a = tempfile::TempDir::new().expect("temp state dir");
    let mut first = DnsmasqServer::new(test_config(tmp_a.path()))
        .await
        .expect("first dnsmasq should start");

    // Same bridge, same gateway address: the second daemon cannot bind.
    let tmp_b = tempfile::TempDir::new().expect("temp state dir");
    let err = DnsmasqServer::new(test_config(tmp_b.path()))
        .await
        .expect_err("second dnsmasq must fail to bind");
    let msg = err.to_string();
    assert!(msg.contains("failed to start"), "got: {msg}");
    assert!(
        msg.contains("Ensure nothing is using port 53."),
        "got: {msg}"
    );

    first.shutdown().await;
}
