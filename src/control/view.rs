//! JSON shapes of entities carried in result envelopes.
//!
//! Keys are PascalCase like the envelope itself. Empty address parts are
//! left out.

use serde::Serialize;

use crate::config::schema::{ConfigData, Gateway, Host, IpV4, LocalBackingStore, Network, Server, StoreHost};

fn is_empty(value: &&str) -> bool {
    value.is_empty()
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct AddressView<'a> {
    #[serde(skip_serializing_if = "is_empty")]
    address: &'a str,
    #[serde(skip_serializing_if = "is_empty")]
    subnet: &'a str,
    #[serde(skip_serializing_if = "is_empty")]
    mac: &'a str,
    #[serde(skip_serializing_if = "is_empty")]
    port: &'a str,
}

impl<'a> From<&'a IpV4> for AddressView<'a> {
    fn from(ip: &'a IpV4) -> Self {
        Self {
            address: &ip.address,
            subnet: &ip.subnet,
            mac: &ip.mac,
            port: &ip.port,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct EndpointView<'a> {
    #[serde(rename = "IpV4")]
    ipv4: AddressView<'a>,
}

impl<'a> From<&'a StoreHost> for EndpointView<'a> {
    fn from(host: &'a StoreHost) -> Self {
        Self {
            ipv4: (&host.ipv4).into(),
        }
    }
}

impl<'a> From<&'a Gateway> for EndpointView<'a> {
    fn from(gateway: &'a Gateway) -> Self {
        Self {
            ipv4: (&gateway.ipv4).into(),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct HostView<'a> {
    name: &'a str,
    #[serde(skip_serializing_if = "is_empty")]
    network: &'a str,
    #[serde(rename = "IpV4")]
    ipv4: AddressView<'a>,
    uts_name: &'a str,
}

impl<'a> From<&'a Host> for HostView<'a> {
    fn from(host: &'a Host) -> Self {
        Self {
            name: &host.name,
            network: &host.network,
            ipv4: (&host.ipv4).into(),
            uts_name: &host.utsname,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct NetworkView<'a> {
    name: &'a str,
    #[serde(skip_serializing_if = "is_empty")]
    server: &'a str,
    #[serde(rename = "Type")]
    kind: &'a str,
    #[serde(rename = "IpV4")]
    ipv4: AddressView<'a>,
    gateway: EndpointView<'a>,
    hosts: Vec<HostView<'a>>,
}

impl<'a> NetworkView<'a> {
    /// `network` as owned by the server named `server`.
    pub fn owned_by(network: &'a Network, server: &'a str) -> Self {
        Self {
            server,
            ..Self::from(network)
        }
    }

    /// Every network of `tree` with its owning server filled in.
    pub fn all(tree: &'a ConfigData) -> Vec<Self> {
        tree.networks()
            .map(|(pos, network)| Self::owned_by(network, &tree.servers[pos.server].name))
            .collect()
    }
}

impl<'a> From<&'a Network> for NetworkView<'a> {
    fn from(network: &'a Network) -> Self {
        Self {
            name: &network.name,
            server: &network.server,
            kind: &network.kind,
            ipv4: (&network.ipv4).into(),
            gateway: (&network.gateway).into(),
            hosts: network.hosts.iter().map(HostView::from).collect(),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct ServerView<'a> {
    name: &'a str,
    #[serde(rename = "IpV4")]
    ipv4: AddressView<'a>,
    #[serde(skip_serializing_if = "Option::is_none")]
    backing_store: Option<EndpointView<'a>>,
    networks: Vec<NetworkView<'a>>,
}

impl<'a> From<&'a Server> for ServerView<'a> {
    fn from(server: &'a Server) -> Self {
        Self {
            name: &server.name,
            ipv4: (&server.ipv4).into(),
            backing_store: server.backing_store.as_ref().map(|store| (&store.host).into()),
            networks: server
                .networks
                .iter()
                .map(|network| NetworkView::owned_by(network, &server.name))
                .collect(),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct StoreView<'a> {
    name: &'a str,
    host: EndpointView<'a>,
    #[serde(rename = "Type")]
    kind: &'a str,
}

impl<'a> From<&'a LocalBackingStore> for StoreView<'a> {
    fn from(store: &'a LocalBackingStore) -> Self {
        Self {
            name: &store.name,
            host: (&store.host).into(),
            kind: &store.kind,
        }
    }
}
