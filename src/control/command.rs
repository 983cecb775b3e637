//! Command line parsing.
//!
//! A request is a keyword followed by space separated arguments. Each
//! keyword maps to one [`Command`] variant carrying the entity it builds.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use thiserror::Error;

use crate::config::schema::{Gateway, Host, IpV4, LocalBackingStore, Network, RemoteBackingStore, Server, StoreHost};

/// Keywords understood by the control protocol.
pub const KEYWORDS: &[&str] = &[
    "get-networks",
    "add-server",
    "add-network",
    "add-host",
    "add-backingstore",
    "init-backingstore",
];

/// Why a request line could not be turned into a [`Command`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommandError {
    #[error("unknown command")]
    Unknown(String),

    #[error("invalid parameter")]
    InvalidParameter { keyword: &'static str },
}

/// A parsed request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    GetNetworks,
    AddServer(Server),
    AddNetwork(Network),
    AddHost(Host),
    AddBackingStore(LocalBackingStore),
    InitBackingStore,
}

impl Command {
    /// Parse one request line.
    pub fn parse(line: &str) -> Result<Self, CommandError> {
        let mut words = line.split_whitespace();
        let keyword = words.next().unwrap_or_default();
        let args: Vec<&str> = words.collect();

        let keyword = KEYWORDS
            .iter()
            .copied()
            .find(|k| *k == keyword)
            .ok_or_else(|| CommandError::Unknown(keyword.to_string()))?;
        let invalid = || CommandError::InvalidParameter { keyword };

        let command = match (keyword, args.as_slice()) {
            ("get-networks", []) => Command::GetNetworks,
            ("init-backingstore", []) => Command::InitBackingStore,

            ("add-server", [name, port]) => Command::AddServer(server(name, port, None)),
            ("add-server", [name, port, address, replica_port]) => {
                Command::AddServer(server(name, port, Some((address, replica_port))))
            }

            ("add-network", [server, name, kind, address, subnet, gateway]) => Command::AddNetwork(Network {
                name: name.to_string(),
                kind: kind.to_string(),
                ipv4: IpV4 {
                    address: address.to_string(),
                    subnet: subnet.to_string(),
                    ..IpV4::default()
                },
                gateway: Gateway {
                    ipv4: IpV4 {
                        address: gateway.to_string(),
                        ..IpV4::default()
                    },
                },
                hosts: Vec::new(),
                server: server.to_string(),
            }),

            ("add-host", [network, name, address, mac, utsname]) => Command::AddHost(Host {
                name: name.to_string(),
                ipv4: IpV4 {
                    address: address.to_string(),
                    mac: mac.to_string(),
                    ..IpV4::default()
                },
                utsname: utsname.to_string(),
                network: network.to_string(),
            }),

            ("add-backingstore", [name, port, kind]) => Command::AddBackingStore(LocalBackingStore {
                name: name.to_string(),
                host: StoreHost {
                    ipv4: IpV4 {
                        port: port.to_string(),
                        ..IpV4::default()
                    },
                },
                kind: kind.to_string(),
            }),

            _ => return Err(invalid()),
        };
        Ok(command)
    }

    /// The keyword this command was parsed from.
    pub fn keyword(&self) -> &'static str {
        match self {
            Command::GetNetworks => "get-networks",
            Command::AddServer(_) => "add-server",
            Command::AddNetwork(_) => "add-network",
            Command::AddHost(_) => "add-host",
            Command::AddBackingStore(_) => "add-backingstore",
            Command::InitBackingStore => "init-backingstore",
        }
    }
}

fn server(name: &str, port: &str, replica: Option<(&&str, &&str)>) -> Server {
    Server {
        name: name.to_string(),
        ipv4: IpV4 {
            port: port.to_string(),
            ..IpV4::default()
        },
        backing_store: replica.map(|(address, port)| RemoteBackingStore {
            host: StoreHost {
                ipv4: IpV4 {
                    address: address.to_string(),
                    port: port.to_string(),
                    ..IpV4::default()
                },
            },
        }),
        networks: Vec::new(),
    }
}

static COMMAND_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Correlates a command with its result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CommandId(u64);

impl CommandId {
    pub fn new() -> Self {
        Self(COMMAND_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for CommandId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for CommandId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "cmd-{}", self.0)
    }
}

/// A command travelling on the bus.
#[derive(Debug, Clone)]
pub struct CommandRequest {
    pub id: CommandId,
    pub command: Command,
}

impl CommandRequest {
    pub fn new(command: Command) -> Self {
        Self {
            id: CommandId::new(),
            command,
        }
    }
}
