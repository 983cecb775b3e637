//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

use fleetd::Settings;

/// A topology document with one server listening on `server_port`, one
/// production network with one host, and one local backing store.
pub fn topology(server_port: u16, store_port: u16) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<config name="lab">
  <server name="s1">
    <ipv4><port>{server_port}</port></ipv4>
    <network name="net1">
      <type>production</type>
      <ipv4><address>10.0.0.1</address><subnet>255.255.255.0</subnet></ipv4>
      <gateway><ipv4><address>10.0.0.254</address></ipv4></gateway>
      <host name="h1">
        <ipv4><address>10.0.0.5</address><mac>aa:bb:cc:dd:ee:ff</mac></ipv4>
        <utsname>h1.example.com</utsname>
      </host>
    </network>
  </server>
  <backingstore name="bs1">
    <host><ipv4><port>{store_port}</port></ipv4></host>
    <type>btrfs</type>
  </backingstore>
</config>
"#
    )
}

/// Write `content` to a fresh file under the system temp directory.
pub fn write_temp(name: &str, content: &str) -> PathBuf {
    static NEXT: AtomicUsize = AtomicUsize::new(0);
    let dir = std::env::temp_dir().join(format!(
        "fleetd-test-{}-{}",
        std::process::id(),
        NEXT.fetch_add(1, Ordering::SeqCst)
    ));
    std::fs::create_dir_all(&dir).unwrap();
    let path = dir.join(name);
    std::fs::write(&path, content).unwrap();
    path
}

/// Settings that load only `paths` and bind on loopback.
pub fn settings(paths: Vec<PathBuf>) -> Settings {
    Settings {
        config_paths: paths,
        listen_host: "127.0.0.1".into(),
        max_connections: 16,
        replication_retry_secs: 1,
        fix_network: true,
        ..Settings::default()
    }
}

/// A port that was free a moment ago.
pub async fn free_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap().port()
}

/// Send one request line and read the full response.
pub async fn send(addr: SocketAddr, line: &str) -> String {
    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream.write_all(line.as_bytes()).await.unwrap();
    stream.shutdown().await.unwrap();

    let mut response = String::new();
    tokio::time::timeout(Duration::from_secs(5), stream.read_to_string(&mut response))
        .await
        .expect("response within timeout")
        .unwrap();
    response
}
