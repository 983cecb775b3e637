//! Topology entity definitions.
//!
//! The tree is rooted at [`ConfigData`]: servers own networks, networks own
//! hosts, and local backing stores hang off the root. All types derive Serde
//! traits for the XML document; empty leaf values are omitted on output so a
//! parse/serialize/parse cycle is lossless.
//!
//! Each entity also carries its field rule table (see [`Validate`]): one entry
//! per field naming the rules that apply and the sub-fields to ignore below it.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::config::validation::{Directive, Field, Rule, Validate};

/// IPv4 endpoint description shared by every entity.
///
/// Which parts are meaningful depends on the embedding entity; the parent's
/// rule table ignores the rest.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct IpV4 {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub address: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub subnet: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub mac: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub port: String,
}

/// Root of the topology.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename = "config")]
pub struct ConfigData {
    #[serde(rename = "@name", default)]
    pub name: String,

    #[serde(rename = "server", default)]
    pub servers: Vec<Server>,

    #[serde(rename = "backingstore", default)]
    pub backing_stores: Vec<LocalBackingStore>,
}

/// A node hosting networks and a control listener.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct Server {
    #[serde(rename = "@name", default)]
    pub name: String,

    /// Control listener; only `port` is used.
    #[serde(default)]
    pub ipv4: IpV4,

    /// Peer to replicate results to.
    #[serde(rename = "backingstore", default, skip_serializing_if = "Option::is_none")]
    pub backing_store: Option<RemoteBackingStore>,

    #[serde(rename = "network", default)]
    pub networks: Vec<Network>,
}

/// A bridged network on a server.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct Network {
    #[serde(rename = "@name", default)]
    pub name: String,

    /// One of the [`NetworkType`] names.
    #[serde(rename = "type", default)]
    pub kind: String,

    /// Bridge address and subnet mask.
    #[serde(default)]
    pub ipv4: IpV4,

    #[serde(default)]
    pub gateway: Gateway,

    #[serde(rename = "host", default)]
    pub hosts: Vec<Host>,

    /// Owning server. Set for runtime additions and availability events.
    #[serde(skip)]
    pub server: String,
}

/// Default route of a network.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct Gateway {
    #[serde(default)]
    pub ipv4: IpV4,
}

/// A container attached to a network.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct Host {
    #[serde(rename = "@name", default)]
    pub name: String,

    /// Address and MAC.
    #[serde(default)]
    pub ipv4: IpV4,

    #[serde(default)]
    pub utsname: String,

    /// Owning network. Only set when the host arrives through `add-host`
    /// or an availability event.
    #[serde(skip)]
    pub network: String,
}

/// Endpoint of a backing store.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct StoreHost {
    #[serde(default)]
    pub ipv4: IpV4,
}

/// A backing store served by this daemon.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct LocalBackingStore {
    #[serde(rename = "@name", default)]
    pub name: String,

    /// Replica listener; only `port` is used.
    #[serde(default)]
    pub host: StoreHost,

    /// One of the [`StoreType`] names.
    #[serde(rename = "type", default)]
    pub kind: String,
}

/// A peer backing store a server replicates to.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct RemoteBackingStore {
    /// Peer `address` and `port`.
    #[serde(default)]
    pub host: StoreHost,
}

impl RemoteBackingStore {
    /// `address:port` of the peer.
    pub fn endpoint(&self) -> String {
        format!("{}:{}", self.host.ipv4.address, self.host.ipv4.port)
    }
}

/// Recognized network types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetworkType {
    Production,
    Backup,
    Temporary,
}

impl FromStr for NetworkType {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "production" => Ok(NetworkType::Production),
            "backup" => Ok(NetworkType::Backup),
            "temporary" => Ok(NetworkType::Temporary),
            _ => Err(()),
        }
    }
}

impl fmt::Display for NetworkType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            NetworkType::Production => "production",
            NetworkType::Backup => "backup",
            NetworkType::Temporary => "temporary",
        })
    }
}

/// Recognized backing store types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreType {
    Btrfs,
}

impl FromStr for StoreType {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "btrfs" => Ok(StoreType::Btrfs),
            _ => Err(()),
        }
    }
}

/// Position of a network in the tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NetworkPos {
    pub server: usize,
    pub network: usize,
}

/// Position of a host in the tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HostPos {
    pub server: usize,
    pub network: usize,
    pub host: usize,
}

impl HostPos {
    /// Position of the owning network.
    pub fn network_pos(&self) -> NetworkPos {
        NetworkPos {
            server: self.server,
            network: self.network,
        }
    }
}

impl ConfigData {
    /// Every network in the tree with its position.
    pub fn networks(&self) -> impl Iterator<Item = (NetworkPos, &Network)> {
        self.servers.iter().enumerate().flat_map(|(s, server)| {
            server
                .networks
                .iter()
                .enumerate()
                .map(move |(n, network)| (NetworkPos { server: s, network: n }, network))
        })
    }

    /// Every host in the tree with its position.
    pub fn hosts(&self) -> impl Iterator<Item = (HostPos, &Host)> {
        self.networks().flat_map(|(pos, network)| {
            network.hosts.iter().enumerate().map(move |(h, host)| {
                (
                    HostPos {
                        server: pos.server,
                        network: pos.network,
                        host: h,
                    },
                    host,
                )
            })
        })
    }

    pub fn network(&self, pos: NetworkPos) -> Option<&Network> {
        self.servers.get(pos.server)?.networks.get(pos.network)
    }

    pub fn host(&self, pos: HostPos) -> Option<&Host> {
        self.network(pos.network_pos())?.hosts.get(pos.host)
    }

    /// Index of the server named `name`.
    pub fn server_index(&self, name: &str) -> Option<usize> {
        self.servers.iter().position(|s| s.name == name)
    }

    /// Position of the network named `name`.
    pub fn network_pos(&self, name: &str) -> Option<NetworkPos> {
        self.networks().find(|(_, n)| n.name == name).map(|(pos, _)| pos)
    }
}

// Field rule tables.

const NOT_EMPTY: &[Directive] = &[Directive::not(Rule::Empty)];
const SHORT_NAME: &[Directive] = &[Directive::not(Rule::Empty), Directive::is(Rule::Max(15))];
const IPV4: &[Directive] = &[Directive::is(Rule::Ipv4)];
const MAC: &[Directive] = &[Directive::is(Rule::Mac)];
const PORT: &[Directive] = &[Directive::is(Rule::Port)];
const UTS: &[Directive] = &[Directive::is(Rule::Uts)];

impl Validate for IpV4 {
    fn fields(&self) -> Vec<Field<'_>> {
        vec![
            Field::text("address", &self.address, IPV4),
            Field::text("subnet", &self.subnet, IPV4),
            Field::text("mac", &self.mac, MAC),
            Field::text("port", &self.port, PORT),
        ]
    }
}

impl Validate for ConfigData {
    fn fields(&self) -> Vec<Field<'_>> {
        vec![
            Field::text("name", &self.name, NOT_EMPTY),
            Field::each("server", &self.servers),
            Field::each("backingstore", &self.backing_stores),
        ]
    }
}

impl Validate for Server {
    fn fields(&self) -> Vec<Field<'_>> {
        vec![
            Field::text("name", &self.name, NOT_EMPTY),
            Field::nested("ipv4", &self.ipv4).ignoring(&["address", "subnet", "mac"]),
            Field::optional("backingstore", self.backing_store.as_ref()),
            Field::each("network", &self.networks),
        ]
    }
}

impl Validate for Network {
    fn fields(&self) -> Vec<Field<'_>> {
        vec![
            Field::text("name", &self.name, SHORT_NAME),
            Field::text("type", &self.kind, NOT_EMPTY),
            Field::nested("ipv4", &self.ipv4).ignoring(&["mac", "port"]),
            Field::nested("gateway", &self.gateway),
            Field::each("host", &self.hosts),
        ]
    }
}

impl Validate for Gateway {
    fn fields(&self) -> Vec<Field<'_>> {
        vec![Field::nested("ipv4", &self.ipv4).ignoring(&["subnet", "mac", "port"])]
    }
}

impl Validate for Host {
    fn fields(&self) -> Vec<Field<'_>> {
        vec![
            Field::text("name", &self.name, NOT_EMPTY),
            Field::nested("ipv4", &self.ipv4).ignoring(&["subnet", "port"]),
            Field::text("utsname", &self.utsname, UTS),
        ]
    }
}

impl Validate for StoreHost {
    fn fields(&self) -> Vec<Field<'_>> {
        vec![Field::nested("ipv4", &self.ipv4)]
    }
}

impl Validate for LocalBackingStore {
    fn fields(&self) -> Vec<Field<'_>> {
        vec![
            Field::text("name", &self.name, NOT_EMPTY),
            Field::nested("host", &self.host).ignoring(&["address", "subnet", "mac"]),
            Field::text("type", &self.kind, NOT_EMPTY),
        ]
    }
}

impl Validate for RemoteBackingStore {
    fn fields(&self) -> Vec<Field<'_>> {
        vec![Field::nested("host", &self.host).ignoring(&["subnet", "mac"])]
    }
}
