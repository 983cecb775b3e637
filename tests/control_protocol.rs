//! End-to-end tests of the control protocol against a booted daemon.

mod common;

use common::{send, settings, topology, write_temp};
use fleetd::control::Envelope;
use fleetd::{boot, Daemon};

async fn daemon() -> Daemon {
    let path = write_temp("topology.xml", &topology(0, 0));
    boot(&settings(vec![path])).await.unwrap()
}

fn envelope(response: &str) -> Envelope {
    serde_json::from_str(response).unwrap_or_else(|e| panic!("not an envelope ({e}): {response}"))
}

#[tokio::test]
async fn get_networks_lists_the_loaded_topology() {
    let daemon = daemon().await;
    let addr = daemon.server().bound_addr("s1").unwrap();

    let reply = envelope(&send(addr, "get-networks").await);
    assert!(reply.succeeded);
    let names: Vec<&str> = reply
        .data
        .as_array()
        .unwrap()
        .iter()
        .map(|n| n["Name"].as_str().unwrap())
        .collect();
    assert_eq!(names, ["net1"]);

    daemon.shutdown().await;
}

#[tokio::test]
async fn unknown_and_malformed_commands() {
    let daemon = daemon().await;
    let addr = daemon.server().bound_addr("s1").unwrap();

    assert_eq!(send(addr, "reboot now").await, "unknown command");

    let reply = envelope(&send(addr, "add-host net1 h2").await);
    assert!(!reply.succeeded);
    assert_eq!(reply.message, "invalid parameter");

    daemon.shutdown().await;
}

#[tokio::test]
async fn add_host_updates_the_live_tree() {
    let daemon = daemon().await;
    let addr = daemon.server().bound_addr("s1").unwrap();

    let reply = envelope(&send(addr, "add-host net1 h2 10.0.0.6 aa:bb:cc:dd:ee:01 h2.example.com\r\n").await);
    assert!(reply.succeeded, "{}", reply.message);
    assert_eq!(reply.message, "host was added");
    assert_eq!(daemon.store().snapshot().hosts().count(), 2);

    // Same MAC as h1.
    let reply = envelope(&send(addr, "add-host net1 h3 10.0.0.7 AA:BB:CC:DD:EE:FF h3.example.com").await);
    assert!(!reply.succeeded);
    assert_eq!(daemon.store().snapshot().hosts().count(), 2);

    daemon.shutdown().await;
}

#[tokio::test]
async fn add_host_to_a_missing_network_is_rejected() {
    let daemon = daemon().await;
    let addr = daemon.server().bound_addr("s1").unwrap();

    let reply = envelope(&send(addr, "add-host does-not-exist h2 10.0.0.6 aa:bb:cc:dd:ee:01 h2.example.com").await);
    assert!(!reply.succeeded);
    assert_eq!(reply.message, "network not found: does-not-exist");

    daemon.shutdown().await;
}

#[tokio::test]
async fn overlapping_network_is_rejected_and_distinct_one_is_provisioned() {
    let daemon = daemon().await;
    let addr = daemon.server().bound_addr("s1").unwrap();

    let reply = envelope(&send(addr, "add-network s1 net2 backup 10.0.0.5 255.255.255.0 10.0.0.254").await);
    assert!(!reply.succeeded);

    let reply = envelope(&send(addr, "add-network s1 net3 backup 10.0.1.1 255.255.255.0 10.0.1.254").await);
    assert!(reply.succeeded, "{}", reply.message);
    assert_eq!(reply.message, "network was added");

    // The bridge is provisioned before the reply goes out.
    assert!(daemon.network().networks().iter().any(|n| n == "net3"));

    daemon.shutdown().await;
}

#[tokio::test]
async fn added_server_gets_its_own_listener() {
    let daemon = daemon().await;
    let addr = daemon.server().bound_addr("s1").unwrap();

    let reply = envelope(&send(addr, "add-server s2 0").await);
    assert!(reply.succeeded, "{}", reply.message);

    let second = daemon.server().bound_addr("s2").unwrap();
    assert!(envelope(&send(second, "init-backingstore").await).succeeded);

    let reply = envelope(&send(addr, "add-server s2 0").await);
    assert!(!reply.succeeded);
    assert_eq!(reply.message, "server name is already used: s2");

    daemon.shutdown().await;
}

#[tokio::test]
async fn store_that_cannot_listen_fails_the_command() {
    let daemon = daemon().await;
    let addr = daemon.server().bound_addr("s1").unwrap();

    let taken = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let busy = taken.local_addr().unwrap().port();
    let reply = envelope(&send(addr, &format!("add-backingstore bs2 {busy} btrfs")).await);
    assert!(!reply.succeeded);
    assert!(reply.message.contains("failed to bind"), "{}", reply.message);

    // The addition itself stays in the tree.
    assert_eq!(daemon.store().snapshot().backing_stores.len(), 2);

    daemon.shutdown().await;
}

#[tokio::test]
async fn concurrent_requests_are_answered_independently() {
    let daemon = daemon().await;
    let addr = daemon.server().bound_addr("s1").unwrap();

    let requests = (0..8).map(|i| {
        tokio::spawn(async move {
            let line = format!("add-host net1 c{i} 10.0.0.{} aa:bb:cc:dd:ee:{i:02x} c{i}.example.com", 20 + i);
            send(addr, &line).await
        })
    });
    for request in requests.collect::<Vec<_>>() {
        let reply = envelope(&request.await.unwrap());
        assert!(reply.succeeded, "{}", reply.message);
    }
    assert_eq!(daemon.store().snapshot().hosts().count(), 9);

    daemon.shutdown().await;
}
