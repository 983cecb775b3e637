//! Confirmation of runtime additions.
//!
//! After the live tree accepts an addition, the modules that act on it
//! (listeners, bridges, replication) each report a [`Verdict`] before the
//! peer gets its result. Every subscriber holds a clone of the reply
//! channel, so the collector knows it has heard from everyone once the
//! channel closes.

use std::fmt::Display;
use tokio::sync::mpsc;

use crate::config::schema::{Host, LocalBackingStore, Network, Server};
use crate::control::command::CommandId;

/// An entity a peer command just added to the live tree.
#[derive(Debug, Clone)]
pub enum Addition {
    Server(Server),
    Network(Network),
    Host(Host),
    LocalStore(LocalBackingStore),
}

impl Addition {
    pub fn kind(&self) -> &'static str {
        match self {
            Addition::Server(_) => "server",
            Addition::Network(_) => "network",
            Addition::Host(_) => "host",
            Addition::LocalStore(_) => "local-store",
        }
    }
}

/// One module's answer to a [`CheckRequest`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Verdict {
    pub module: &'static str,
    pub outcome: Result<(), String>,
}

/// Ask the consuming modules to act on an addition.
#[derive(Debug, Clone)]
pub struct CheckRequest {
    pub id: CommandId,
    pub addition: Addition,
    verdicts: mpsc::UnboundedSender<Verdict>,
}

impl CheckRequest {
    /// A request and the receiver its verdicts arrive on.
    pub fn new(id: CommandId, addition: Addition) -> (Self, mpsc::UnboundedReceiver<Verdict>) {
        let (verdicts, rx) = mpsc::unbounded_channel();
        (
            Self {
                id,
                addition,
                verdicts,
            },
            rx,
        )
    }

    /// Report how `module` fared with the addition.
    pub fn report<E: Display>(&self, module: &'static str, result: Result<(), E>) {
        let outcome = result.map_err(|e| e.to_string());
        if self.verdicts.send(Verdict { module, outcome }).is_err() {
            tracing::debug!(command_id = %self.id, module, "Verdict arrived after collection");
        }
    }
}

/// Every verdict, returned once all copies of the request are gone.
pub async fn collect(mut verdicts: mpsc::UnboundedReceiver<Verdict>) -> Vec<Verdict> {
    let mut out = Vec::new();
    while let Some(verdict) = verdicts.recv().await {
        out.push(verdict);
    }
    out
}
