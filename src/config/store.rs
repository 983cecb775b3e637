//! The owned live topology.
//!
//! # Responsibilities
//! - Load the first candidate document that parses, validates and is sane
//! - Hand out consistent snapshots of the live tree
//! - Apply runtime additions without ever publishing an invalid tree
//!
//! # Design Decisions
//! - The tree lives in an `ArcSwap`; readers never block
//! - A mutation validates against a snapshot and publishes with
//!   compare-and-swap, retrying when another mutation won the race
//! - No entity is ever removed

use arc_swap::ArcSwap;
use std::path::PathBuf;
use std::sync::{Arc, PoisonError, RwLock};
use thiserror::Error;

use crate::config::loader::{read_document, ConfigError};
use crate::config::sanity::{Sanity, SanityError};
use crate::config::schema::{ConfigData, Host, HostPos, LocalBackingStore, Network, NetworkPos, Server};
use crate::config::validation::{validate, RuleError};

/// Lifecycle of the live tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TreeState {
    /// Nothing read yet.
    Unloaded,
    /// A candidate passed field validation.
    Loaded,
    /// A candidate passed both passes and is live.
    Active,
    /// Every candidate was rejected.
    BootFailed,
}

/// Why a runtime addition was refused.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MutationError {
    #[error("configuration is not active")]
    NotActive,

    #[error(transparent)]
    Field(#[from] RuleError),

    #[error(transparent)]
    Sanity(#[from] SanityError),
}

/// Owner of the live topology.
pub struct ConfigStore {
    live: ArcSwap<ConfigData>,
    state: RwLock<TreeState>,
}

impl ConfigStore {
    pub fn new() -> Self {
        Self {
            live: ArcSwap::from_pointee(ConfigData::default()),
            state: RwLock::new(TreeState::Unloaded),
        }
    }

    /// Adopt the first candidate that survives both validation passes.
    pub fn load(&self, paths: &[PathBuf]) -> Result<Arc<ConfigData>, ConfigError> {
        for path in paths {
            tracing::info!(path = %path.display(), "Reading configuration");

            let data = match read_document(path) {
                Ok(data) => data,
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "Skipping configuration candidate");
                    continue;
                }
            };

            if let Err(e) = validate(&data, &[]) {
                tracing::warn!(path = %path.display(), error = %e, "Configuration failed field validation");
                continue;
            }
            self.set_state(TreeState::Loaded);

            if let Err(e) = Sanity::new(&data).check_tree() {
                tracing::warn!(path = %path.display(), error = %e, "Configuration failed sanity checks");
                continue;
            }

            tracing::info!(
                path = %path.display(),
                name = %data.name,
                servers = data.servers.len(),
                backing_stores = data.backing_stores.len(),
                "Configuration loaded"
            );
            self.activate(data);
            return Ok(self.snapshot());
        }

        self.set_state(TreeState::BootFailed);
        Err(ConfigError::NoValidConfig)
    }

    /// Publish an already validated tree.
    pub fn activate(&self, data: ConfigData) {
        self.live.store(Arc::new(data));
        self.set_state(TreeState::Active);
    }

    /// The live tree.
    pub fn snapshot(&self) -> Arc<ConfigData> {
        self.live.load_full()
    }

    pub fn state(&self) -> TreeState {
        *self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append a server.
    pub fn add_server(&self, server: Server) -> Result<Server, MutationError> {
        validate(&server, &[])?;
        self.mutate(|tree| {
            tree.servers.push(server.clone());
            let index = tree.servers.len() - 1;
            let sanity = Sanity::new(tree);
            sanity.check_server(index)?;
            for network in 0..server.networks.len() {
                sanity.check_network(NetworkPos { server: index, network })?;
            }
            Ok(server.clone())
        })
    }

    /// Append a network to the server named by `network.server`.
    pub fn add_network(&self, network: Network) -> Result<Network, MutationError> {
        validate(&network, &[])?;
        self.mutate(|tree| {
            let server = tree
                .server_index(&network.server)
                .ok_or_else(|| SanityError::ServerNotFound(network.server.clone()))?;
            let networks = &mut tree.servers[server].networks;
            networks.push(network.clone());
            let pos = NetworkPos {
                server,
                network: networks.len() - 1,
            };
            Sanity::new(tree).check_network(pos)?;
            Ok(network.clone())
        })
    }

    /// Append a host to the network named by `host.network`.
    pub fn add_host(&self, host: Host) -> Result<Host, MutationError> {
        validate(&host, &[])?;
        self.mutate(|tree| {
            let at = tree
                .network_pos(&host.network)
                .ok_or_else(|| SanityError::NetworkNotFound(host.network.clone()))?;
            let hosts = &mut tree.servers[at.server].networks[at.network].hosts;
            hosts.push(host.clone());
            let pos = HostPos {
                server: at.server,
                network: at.network,
                host: hosts.len() - 1,
            };
            Sanity::new(tree).check_host(pos)?;
            Ok(host.clone())
        })
    }

    /// Append a local backing store.
    pub fn add_backing_store(&self, store: LocalBackingStore) -> Result<LocalBackingStore, MutationError> {
        validate(&store, &[])?;
        self.mutate(|tree| {
            tree.backing_stores.push(store.clone());
            Sanity::new(tree).check_local_store(tree.backing_stores.len() - 1)?;
            Ok(store.clone())
        })
    }

    /// Apply `change` to a copy of the live tree and publish the copy if it succeeds.
    fn mutate<T, F>(&self, change: F) -> Result<T, MutationError>
    where
        F: Fn(&mut ConfigData) -> Result<T, SanityError>,
    {
        if self.state() != TreeState::Active {
            return Err(MutationError::NotActive);
        }

        loop {
            let current = self.live.load_full();
            let mut next = ConfigData::clone(&current);
            let value = change(&mut next)?;

            let previous = self.live.compare_and_swap(&current, Arc::new(next));
            if Arc::ptr_eq(&*previous, &current) {
                return Ok(value);
            }
            tracing::debug!("Live configuration changed during mutation, retrying");
        }
    }

    fn set_state(&self, state: TreeState) {
        *self.state.write().unwrap_or_else(PoisonError::into_inner) = state;
    }
}

impl Default for ConfigStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::{Gateway, IpV4, RemoteBackingStore, StoreHost};

    fn active_store() -> ConfigStore {
        let store = ConfigStore::new();
        store.activate(ConfigData {
            name: "lab".into(),
            servers: vec![Server {
                name: "s1".into(),
                ipv4: IpV4 {
                    port: "8080".into(),
                    ..IpV4::default()
                },
                ..Server::default()
            }],
            backing_stores: Vec::new(),
        });
        store
    }

    fn network(name: &str, address: &str) -> Network {
        Network {
            name: name.into(),
            kind: "production".into(),
            ipv4: IpV4 {
                address: address.into(),
                subnet: "255.255.255.0".into(),
                ..IpV4::default()
            },
            gateway: Gateway {
                ipv4: IpV4 {
                    address: "10.0.0.254".into(),
                    ..IpV4::default()
                },
            },
            hosts: Vec::new(),
            server: "s1".into(),
        }
    }

    fn host(name: &str, network: &str) -> Host {
        Host {
            name: name.into(),
            ipv4: IpV4 {
                address: "10.0.0.5".into(),
                mac: "aa:bb:cc:dd:ee:ff".into(),
                ..IpV4::default()
            },
            utsname: format!("{name}.example.com"),
            network: network.into(),
        }
    }

    #[test]
    fn mutations_need_an_active_tree() {
        let store = ConfigStore::new();
        assert_eq!(store.state(), TreeState::Unloaded);
        assert_eq!(store.add_network(network("net1", "10.0.0.1")), Err(MutationError::NotActive));
    }

    #[test]
    fn load_without_candidates_fails() {
        let store = ConfigStore::new();
        let err = store.load(&[PathBuf::from("/nonexistent/fleetd.xml")]).unwrap_err();
        assert!(matches!(err, ConfigError::NoValidConfig));
        assert_eq!(store.state(), TreeState::BootFailed);
    }

    #[test]
    fn added_network_becomes_visible() {
        let store = active_store();
        let before = store.snapshot();

        store.add_network(network("net1", "10.0.0.1")).unwrap();

        assert!(before.servers[0].networks.is_empty(), "old snapshots stay unchanged");
        assert_eq!(store.snapshot().servers[0].networks[0].name, "net1");
    }

    #[test]
    fn network_on_unknown_server_is_rejected() {
        let store = active_store();
        let mut n = network("net1", "10.0.0.1");
        n.server = "s9".into();
        assert_eq!(
            store.add_network(n),
            Err(MutationError::Sanity(SanityError::ServerNotFound("s9".into())))
        );
    }

    #[test]
    fn host_on_unknown_network_leaves_tree_unchanged() {
        let store = active_store();
        store.add_network(network("net1", "10.0.0.1")).unwrap();

        let err = store.add_host(host("h1", "does-not-exist")).unwrap_err();
        assert_eq!(err, MutationError::Sanity(SanityError::NetworkNotFound("does-not-exist".into())));
        assert_eq!(store.snapshot().hosts().count(), 0);

        store.add_host(host("h1", "net1")).unwrap();
        assert_eq!(store.snapshot().hosts().count(), 1);
    }

    #[test]
    fn invalid_fragment_is_rejected_before_sanity() {
        let store = active_store();
        let mut h = host("h1", "net1");
        h.ipv4.mac = "not-a-mac".into();
        assert!(matches!(store.add_host(h), Err(MutationError::Field(_))));
    }

    #[test]
    fn duplicate_server_is_rejected() {
        let store = active_store();
        let duplicate = Server {
            name: "s1".into(),
            ipv4: IpV4 {
                port: "9090".into(),
                ..IpV4::default()
            },
            ..Server::default()
        };
        assert_eq!(
            store.add_server(duplicate),
            Err(MutationError::Sanity(SanityError::ServerNameUsed("s1".into())))
        );
        assert_eq!(store.snapshot().servers.len(), 1);
    }

    #[test]
    fn backing_store_type_is_checked() {
        let store = active_store();
        let candidate = |kind: &str| LocalBackingStore {
            name: "bs1".into(),
            host: StoreHost {
                ipv4: IpV4 {
                    port: "7000".into(),
                    ..IpV4::default()
                },
            },
            kind: kind.into(),
        };

        assert!(matches!(
            store.add_backing_store(candidate("zfs")),
            Err(MutationError::Sanity(SanityError::InvalidStoreType(_)))
        ));
        store.add_backing_store(candidate("btrfs")).unwrap();
        assert_eq!(store.snapshot().backing_stores.len(), 1);
    }

    #[test]
    fn every_kind_of_addition_leaves_a_sane_tree() {
        let store = active_store();
        store.add_network(network("net1", "10.0.0.1")).unwrap();
        store.add_host(host("h1", "net1")).unwrap();
        store
            .add_server(Server {
                name: "s2".into(),
                ipv4: IpV4 {
                    port: "9090".into(),
                    ..IpV4::default()
                },
                backing_store: Some(RemoteBackingStore {
                    host: StoreHost {
                        ipv4: IpV4 {
                            address: "10.0.0.9".into(),
                            port: "7001".into(),
                            ..IpV4::default()
                        },
                    },
                }),
                ..Server::default()
            })
            .unwrap();
        store
            .add_backing_store(LocalBackingStore {
                name: "bs1".into(),
                host: StoreHost {
                    ipv4: IpV4 {
                        port: "7000".into(),
                        ..IpV4::default()
                    },
                },
                kind: "btrfs".into(),
            })
            .unwrap();

        let tree = store.snapshot();
        assert_eq!(Sanity::new(&tree).check_tree(), Ok(()));
        assert_eq!(validate(tree.as_ref(), &[]), Ok(()));
    }

    #[test]
    fn narrower_network_inside_an_existing_one_is_rejected() {
        let store = active_store();
        let mut wide = network("net1", "10.0.0.1");
        wide.ipv4.subnet = "255.0.0.0".into();
        store.add_network(wide).unwrap();

        let mut narrow = network("net2", "10.5.0.1");
        narrow.gateway.ipv4.address = "10.5.0.254".into();
        assert_eq!(
            store.add_network(narrow),
            Err(MutationError::Sanity(SanityError::SubnetOverlap {
                candidate: "net2".into(),
                existing: "net1".into(),
            }))
        );
        assert_eq!(Sanity::new(&store.snapshot()).check_tree(), Ok(()));
    }

    #[test]
    fn concurrent_additions_are_all_kept() {
        let store = Arc::new(active_store());
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let store = store.clone();
                std::thread::spawn(move || {
                    let mut n = network(&format!("net{i}"), &format!("10.{i}.0.1"));
                    n.gateway.ipv4.address = format!("10.{i}.0.254");
                    store.add_network(n)
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap().unwrap();
        }
        assert_eq!(store.snapshot().networks().count(), 8);
    }
}
