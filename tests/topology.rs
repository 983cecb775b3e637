//! Loading, validating and mutating the topology without a network.

mod common;

use std::sync::Arc;

use common::{topology, write_temp};
use fleetd::config::loader::{parse_document, to_document, ConfigError};
use fleetd::config::model::ConfigModel;
use fleetd::config::sanity::{Sanity, SanityError};
use fleetd::config::schema::{Host, IpV4, Network};
use fleetd::config::validation::validate;
use fleetd::config::{ConfigStore, MutationError, TreeState};
use fleetd::control::Command;
use fleetd::Bus;

fn loaded_store() -> Arc<ConfigStore> {
    let store = Arc::new(ConfigStore::new());
    store.activate(parse_document(&topology(8080, 7000)).unwrap());
    store
}

#[test]
fn documented_topology_validates() {
    let tree = parse_document(&topology(8080, 7000)).unwrap();
    validate(&tree, &[]).unwrap();
    Sanity::new(&tree).check_tree().unwrap();

    let (_, host) = tree.hosts().next().unwrap();
    assert_eq!(host.utsname, "h1.example.com");
    assert_eq!(tree.servers[0].networks[0].gateway.ipv4.address, "10.0.0.254");
}

#[test]
fn overlapping_network_is_rejected() {
    let store = loaded_store();
    let network = Network {
        server: "s1".into(),
        name: "net2".into(),
        kind: "production".into(),
        ipv4: IpV4 {
            address: "10.0.0.5".into(),
            subnet: "255.255.255.0".into(),
            ..IpV4::default()
        },
        ..Network::default()
    };

    let err = store.add_network(network).unwrap_err();
    assert!(matches!(err, MutationError::Sanity(SanityError::SubnetOverlap { .. })), "{err}");
    assert_eq!(store.snapshot().networks().count(), 1);
}

#[test]
fn host_for_unknown_network_is_rejected() {
    let store = loaded_store();
    let host = Host {
        network: "does-not-exist".into(),
        name: "h2".into(),
        ipv4: IpV4 {
            address: "10.0.0.6".into(),
            mac: "aa:bb:cc:dd:ee:01".into(),
            ..IpV4::default()
        },
        utsname: "h2.example.com".into(),
    };

    assert_eq!(
        store.add_host(host).unwrap_err(),
        MutationError::Sanity(SanityError::NetworkNotFound("does-not-exist".into()))
    );
}

#[test]
fn get_networks_on_an_empty_tree_fails() {
    let store = Arc::new(ConfigStore::new());
    store.activate(parse_document(r#"<config name="empty"></config>"#).unwrap());
    let model = ConfigModel::new(store, Arc::new(Bus::new()), Vec::new());

    let (envelope, announcements) = model.handle(Command::GetNetworks);
    assert!(!envelope.succeeded);
    assert_eq!(envelope.message, "no networks configured");
    assert!(announcements.is_none());
}

#[test]
fn written_document_reads_back_identically() {
    let tree = parse_document(&topology(8080, 7000)).unwrap();
    let text = to_document(&tree).unwrap();
    assert!(text.starts_with(r#"<?xml version="1.0" encoding="UTF-8"?>"#));
    assert_eq!(parse_document(&text).unwrap(), tree);
}

#[test]
fn load_falls_through_to_the_first_valid_candidate() {
    let broken = write_temp("broken.xml", "<config name=");
    // Passes parsing, fails sanity: two networks at the same address.
    let clashing = write_temp(
        "clashing.xml",
        &topology(8080, 7000).replace(
            "</network>\n  </server>",
            r#"</network>
    <network name="net9">
      <type>backup</type>
      <ipv4><address>10.0.0.1</address><subnet>255.255.0.0</subnet></ipv4>
      <gateway><ipv4><address>10.0.0.254</address></ipv4></gateway>
    </network>
  </server>"#,
        ),
    );
    let good = write_temp("good.xml", &topology(8080, 7000));

    let store = ConfigStore::new();
    let tree = store
        .load(&[
            std::path::PathBuf::from("/nonexistent/fleetd.xml"),
            broken,
            clashing,
            good,
        ])
        .unwrap();
    assert_eq!(tree.name, "lab");
    assert_eq!(tree.networks().count(), 1);
    assert_eq!(store.state(), TreeState::Active);
}

#[test]
fn load_without_a_valid_candidate_fails() {
    let store = ConfigStore::new();
    let err = store.load(&[write_temp("broken.xml", "not xml at all")]).unwrap_err();
    assert!(matches!(err, ConfigError::NoValidConfig));
    assert_eq!(store.state(), TreeState::BootFailed);
}

#[test]
fn mutations_require_an_active_tree() {
    let store = ConfigStore::new();
    let host = Host {
        network: "net1".into(),
        name: "h2".into(),
        ipv4: IpV4 {
            address: "10.0.0.6".into(),
            ..IpV4::default()
        },
        utsname: "h2.example.com".into(),
    };
    assert_eq!(store.add_host(host).unwrap_err(), MutationError::NotActive);
}

#[test]
fn failed_mutation_leaves_the_snapshot_untouched() {
    let store = loaded_store();
    let before = store.snapshot();

    let duplicate = Host {
        network: "net1".into(),
        name: "h1".into(),
        ipv4: IpV4 {
            address: "10.0.0.9".into(),
            ..IpV4::default()
        },
        utsname: "other.example.com".into(),
    };
    assert_eq!(
        store.add_host(duplicate).unwrap_err(),
        MutationError::Sanity(SanityError::HostNameUsed("h1".into()))
    );
    assert!(Arc::ptr_eq(&before, &store.snapshot()));
}
