//! Structural sanity checks.
//!
//! # Responsibilities
//! - Enforce cross-entity invariants field validation cannot see
//! - Uniqueness of names, addresses, MACs and ports across the whole tree
//! - Network subnet overlap and host-to-network references
//!
//! # Design Decisions
//! - Checks are expressed against a position in the tree and compare that
//!   entity with every *other* entity; a runtime addition is checked by
//!   appending it to a copy of the tree and checking its position
//! - Runs only after field validation succeeded
//! - Overlap is decided at whole-octet granularity (see [`overlaps`])

use thiserror::Error;

use crate::config::schema::{ConfigData, HostPos, IpV4, NetworkPos, NetworkType, StoreType};
use crate::config::validation::{validate, RuleError};

/// A violated structural invariant.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SanityError {
    #[error("server name is already used: {0}")]
    ServerNameUsed(String),

    #[error("network name is already used: {0}")]
    NetworkNameUsed(String),

    #[error("network type is invalid: {0}")]
    InvalidNetworkType(String),

    #[error("network ip is already in use: {0}")]
    NetworkAddressUsed(String),

    #[error("network ip/subnet of {candidate} is overlapping with existing network {existing}")]
    SubnetOverlap { candidate: String, existing: String },

    #[error("host name is already in use: {0}")]
    HostNameUsed(String),

    #[error("uts name is already in use: {0}")]
    UtsNameUsed(String),

    #[error("host ip is already in use: {0}")]
    HostAddressUsed(String),

    #[error("host mac is already in use: {0}")]
    HostMacUsed(String),

    #[error("network not found: {0}")]
    NetworkNotFound(String),

    #[error("server not found: {0}")]
    ServerNotFound(String),

    #[error("backing store name is already used: {0}")]
    StoreNameUsed(String),

    #[error("backing store port is already used: {0}")]
    StorePortUsed(String),

    #[error("backing store type is invalid: {0}")]
    InvalidStoreType(String),

    #[error(transparent)]
    Field(#[from] RuleError),
}

/// Structural checker over one tree.
pub struct Sanity<'a> {
    tree: &'a ConfigData,
}

impl<'a> Sanity<'a> {
    pub fn new(tree: &'a ConfigData) -> Self {
        Self { tree }
    }

    /// Check every entity of the tree.
    pub fn check_tree(&self) -> Result<(), SanityError> {
        for index in 0..self.tree.servers.len() {
            self.check_server(index)?;
        }
        let positions: Vec<NetworkPos> = self.tree.networks().map(|(pos, _)| pos).collect();
        for pos in positions {
            self.check_network(pos)?;
        }
        for index in 0..self.tree.backing_stores.len() {
            self.check_local_store(index)?;
        }
        Ok(())
    }

    /// The server at `index` must not share its name with another server.
    pub fn check_server(&self, index: usize) -> Result<(), SanityError> {
        let Some(server) = self.tree.servers.get(index) else {
            return Ok(());
        };
        let taken = self
            .tree
            .servers
            .iter()
            .enumerate()
            .any(|(i, other)| i != index && other.name == server.name);
        if taken {
            return Err(SanityError::ServerNameUsed(server.name.clone()));
        }
        Ok(())
    }

    /// Type, address and name of the network at `pos`, then each of its hosts.
    pub fn check_network(&self, pos: NetworkPos) -> Result<(), SanityError> {
        let Some(network) = self.tree.network(pos) else {
            return Ok(());
        };

        if network.kind.parse::<NetworkType>().is_err() {
            return Err(SanityError::InvalidNetworkType(network.kind.clone()));
        }
        validate(&network.ipv4, &["mac", "port"])?;

        for (other_pos, other) in self.tree.networks() {
            if other_pos == pos {
                continue;
            }
            if other.name == network.name {
                return Err(SanityError::NetworkNameUsed(network.name.clone()));
            }
            if other.ipv4.address == network.ipv4.address {
                return Err(SanityError::NetworkAddressUsed(network.ipv4.address.clone()));
            }
            if overlaps(&network.ipv4, &other.ipv4) || overlaps(&other.ipv4, &network.ipv4) {
                return Err(SanityError::SubnetOverlap {
                    candidate: network.name.clone(),
                    existing: other.name.clone(),
                });
            }
        }

        for host in 0..network.hosts.len() {
            self.check_host(HostPos {
                server: pos.server,
                network: pos.network,
                host,
            })?;
        }
        Ok(())
    }

    /// Identity of the host at `pos` against every other host, and its network reference.
    pub fn check_host(&self, pos: HostPos) -> Result<(), SanityError> {
        let Some(host) = self.tree.host(pos) else {
            return Ok(());
        };

        for (other_pos, other) in self.tree.hosts() {
            if other_pos == pos {
                continue;
            }
            if other.name == host.name {
                return Err(SanityError::HostNameUsed(host.name.clone()));
            }
            if other.utsname == host.utsname {
                return Err(SanityError::UtsNameUsed(host.utsname.clone()));
            }
            if other.ipv4.address == host.ipv4.address {
                return Err(SanityError::HostAddressUsed(host.ipv4.address.clone()));
            }
            if !host.ipv4.mac.is_empty() && other.ipv4.mac.eq_ignore_ascii_case(&host.ipv4.mac) {
                return Err(SanityError::HostMacUsed(host.ipv4.mac.clone()));
            }
        }

        if !host.network.is_empty() && self.tree.network_pos(&host.network).is_none() {
            return Err(SanityError::NetworkNotFound(host.network.clone()));
        }
        Ok(())
    }

    /// Name, port and type of the local backing store at `index`.
    pub fn check_local_store(&self, index: usize) -> Result<(), SanityError> {
        let Some(store) = self.tree.backing_stores.get(index) else {
            return Ok(());
        };

        for (i, other) in self.tree.backing_stores.iter().enumerate() {
            if i == index {
                continue;
            }
            if other.name == store.name {
                return Err(SanityError::StoreNameUsed(store.name.clone()));
            }
            if other.host.ipv4.port == store.host.ipv4.port {
                return Err(SanityError::StorePortUsed(store.host.ipv4.port.clone()));
            }
        }

        if store.kind.parse::<StoreType>().is_err() {
            return Err(SanityError::InvalidStoreType(store.kind.clone()));
        }
        Ok(())
    }
}

/// Whether `candidate` overlaps `other`.
///
/// The prefix is the number of leading `255` octets in the candidate's
/// subnet mask. The networks overlap when that prefix is non-zero and both
/// addresses agree on every octet within it.
pub fn overlaps(candidate: &IpV4, other: &IpV4) -> bool {
    let prefix = candidate.subnet.split('.').take(4).take_while(|octet| *octet == "255").count();
    if prefix == 0 {
        return false;
    }
    let ours: Vec<&str> = candidate.address.split('.').collect();
    let theirs: Vec<&str> = other.address.split('.').collect();
    if ours.len() < prefix || theirs.len() < prefix {
        return false;
    }
    ours[..prefix] == theirs[..prefix]
}
