//! Payloads carried by the daemon's events.

use crate::config::schema::{Host, LocalBackingStore, Network, RemoteBackingStore, Server};
use crate::control::check::CheckRequest;
use crate::control::command::CommandRequest;
use crate::control::envelope::CommandOutcome;

/// Everything a module can publish on the bus.
///
/// Handlers match exhaustively on the variant they expect for an event and
/// ignore anything else.
#[derive(Debug, Clone)]
pub enum Payload {
    /// A server entered the live tree.
    Server(Server),
    /// A network entered the live tree. `Network::server` names its owner.
    Network(Network),
    /// A host entered the live tree. `Host::network` names its owner.
    Host(Host),
    /// A local backing store entered the live tree.
    LocalStore(LocalBackingStore),
    /// A server's replication target entered the live tree.
    RemoteStore {
        server: String,
        store: RemoteBackingStore,
    },
    /// A command received from a peer.
    Command(CommandRequest),
    /// A runtime addition waiting for the consuming modules.
    Check(CheckRequest),
    /// The outcome of a command.
    Result(CommandOutcome),
}

impl Payload {
    /// Short variant label for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Payload::Server(_) => "server",
            Payload::Network(_) => "network",
            Payload::Host(_) => "host",
            Payload::LocalStore(_) => "local-store",
            Payload::RemoteStore { .. } => "remote-store",
            Payload::Command(_) => "command",
            Payload::Check(_) => "check",
            Payload::Result(_) => "result",
        }
    }
}
