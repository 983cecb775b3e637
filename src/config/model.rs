//! The configuration module.
//!
//! # Responsibilities
//! - Load the live tree during `init`
//! - Announce every entity with an `*-available` event
//! - Execute peer commands against the live tree and publish their results
//! - Hold back the result of an addition until the consuming modules acted on it
//!
//! # Data Flow
//! ```text
//! init:    ConfigStore::load → server-available → network-available → host-available
//!                            → backingstore-available (remote, then local)
//! command: Command → ConfigStore::add_* → check-command → verdicts → command-result
//! ```

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use std::path::PathBuf;
use std::sync::Arc;

use crate::config::schema::ConfigData;
use crate::config::store::ConfigStore;
use crate::control::check::{self, Addition, CheckRequest};
use crate::control::command::{Command, CommandId, CommandRequest};
use crate::control::envelope::{CommandOutcome, Envelope};
use crate::control::view::{HostView, NetworkView, ServerView, StoreView};
use crate::event::names::{
    BACKINGSTORE_AVAILABLE, CHECK_COMMAND, COMMAND, COMMAND_RESULT, HOST_AVAILABLE, NETWORK_AVAILABLE,
    SERVER_AVAILABLE,
};
use crate::event::{Bus, Payload};
use crate::module::{EventRole, Module, ModuleError};

const ACTIVE: &[&str] = &[
    SERVER_AVAILABLE,
    NETWORK_AVAILABLE,
    HOST_AVAILABLE,
    BACKINGSTORE_AVAILABLE,
    CHECK_COMMAND,
    COMMAND_RESULT,
];
const PASSIVE: &[&str] = &[COMMAND];

/// Availability event with its payload.
pub type Announcement = (&'static str, Payload);

/// Owns the topology on behalf of the other modules.
pub struct ConfigModel {
    store: Arc<ConfigStore>,
    bus: Arc<Bus>,
    paths: Vec<PathBuf>,
}

impl ConfigModel {
    pub fn new(store: Arc<ConfigStore>, bus: Arc<Bus>, paths: Vec<PathBuf>) -> Self {
        Self { store, bus, paths }
    }

    /// Availability events for every entity of `data`, in announcement order.
    pub fn announcements(data: &ConfigData) -> Vec<Announcement> {
        let mut out = Vec::new();
        for server in &data.servers {
            out.push((SERVER_AVAILABLE, Payload::Server(server.clone())));
            for network in &server.networks {
                let mut owned = network.clone();
                owned.server = server.name.clone();
                out.push((NETWORK_AVAILABLE, Payload::Network(owned)));
                for host in &network.hosts {
                    let mut host = host.clone();
                    host.network = network.name.clone();
                    out.push((HOST_AVAILABLE, Payload::Host(host)));
                }
            }
            if let Some(store) = &server.backing_store {
                out.push((
                    BACKINGSTORE_AVAILABLE,
                    Payload::RemoteStore {
                        server: server.name.clone(),
                        store: store.clone(),
                    },
                ));
            }
        }
        for store in &data.backing_stores {
            out.push((BACKINGSTORE_AVAILABLE, Payload::LocalStore(store.clone())));
        }
        out
    }

    /// Run a command against the live tree.
    ///
    /// Returns the envelope and, on success, the addition the consuming
    /// modules still have to act on.
    pub fn handle(&self, command: Command) -> (Envelope, Option<Addition>) {
        match command {
            Command::GetNetworks => {
                let tree = self.store.snapshot();
                let networks = NetworkView::all(&tree);
                if networks.is_empty() {
                    return (Envelope::failure("no networks configured"), None);
                }
                (Envelope::success("", to_data(&networks)), None)
            }

            Command::AddServer(server) => match self.store.add_server(server) {
                Ok(server) => (
                    Envelope::success("server was added", to_data(&ServerView::from(&server))),
                    Some(Addition::Server(server)),
                ),
                Err(e) => (Envelope::failure(e.to_string()), None),
            },

            Command::AddNetwork(network) => match self.store.add_network(network) {
                Ok(network) => (
                    Envelope::success("network was added", to_data(&NetworkView::from(&network))),
                    Some(Addition::Network(network)),
                ),
                Err(e) => (Envelope::failure(e.to_string()), None),
            },

            Command::AddHost(host) => match self.store.add_host(host) {
                Ok(host) => (
                    Envelope::success("host was added", to_data(&HostView::from(&host))),
                    Some(Addition::Host(host)),
                ),
                Err(e) => (Envelope::failure(e.to_string()), None),
            },

            Command::AddBackingStore(store) => match self.store.add_backing_store(store) {
                Ok(store) => (
                    Envelope::success("backing store was added", to_data(&StoreView::from(&store))),
                    Some(Addition::LocalStore(store)),
                ),
                Err(e) => (Envelope::failure(e.to_string()), None),
            },

            Command::InitBackingStore => {
                let tree = self.store.snapshot();
                if tree.backing_stores.is_empty() {
                    return (Envelope::failure("no backing store configured"), None);
                }
                let stores: Vec<StoreView<'_>> = tree.backing_stores.iter().map(StoreView::from).collect();
                (Envelope::success("backing store initialized", to_data(&stores)), None)
            }
        }
    }

    /// Have the consuming modules act on `addition`.
    ///
    /// Returns the joined reasons of every module that could not.
    pub async fn confirm(&self, id: CommandId, addition: Addition) -> Result<(), String> {
        let kind = addition.kind();
        let (request, verdicts) = CheckRequest::new(id, addition);
        match self.bus.fire(CHECK_COMMAND, Payload::Check(request)) {
            Ok(modules) => tracing::debug!(command_id = %id, addition = kind, modules, "Awaiting verdicts"),
            Err(e) => {
                tracing::warn!(command_id = %id, error = %e, "Could not ask modules to confirm");
                return Ok(());
            }
        }

        let refusals: Vec<String> = check::collect(verdicts)
            .await
            .into_iter()
            .filter_map(|verdict| match verdict.outcome {
                Ok(()) => None,
                Err(reason) => {
                    tracing::warn!(command_id = %id, module = verdict.module, reason = %reason, "Addition refused");
                    Some(reason)
                }
            })
            .collect();

        if refusals.is_empty() {
            Ok(())
        } else {
            Err(refusals.join("; "))
        }
    }

    async fn execute(&self, request: CommandRequest) {
        let keyword = request.command.keyword();
        let (mut envelope, addition) = self.handle(request.command);
        if let Some(addition) = addition {
            if let Err(reason) = self.confirm(request.id, addition).await {
                envelope.succeeded = false;
                envelope.message = reason;
            }
        }
        tracing::info!(
            command_id = %request.id,
            command = keyword,
            succeeded = envelope.succeeded,
            message = %envelope.message,
            "Command executed"
        );

        let outcome = CommandOutcome {
            id: request.id,
            keyword,
            envelope,
        };
        if let Err(e) = self.bus.fire(COMMAND_RESULT, Payload::Result(outcome)) {
            tracing::warn!(event = COMMAND_RESULT, error = %e, "Could not fire event");
        }
    }
}

fn to_data<T: Serialize>(value: &T) -> Value {
    serde_json::to_value(value).unwrap_or(Value::Null)
}

#[async_trait]
impl Module for ConfigModel {
    fn name(&self) -> &'static str {
        "config"
    }

    fn events(&self, role: EventRole) -> &'static [&'static str] {
        match role {
            EventRole::Active => ACTIVE,
            EventRole::Passive => PASSIVE,
        }
    }

    async fn init(&self) -> Result<(), ModuleError> {
        let data = self.store.load(&self.paths)?;
        let announcements = Self::announcements(&data);
        tracing::info!(events = announcements.len(), "Announcing configuration");
        for (event, payload) in announcements {
            self.bus.fire(event, payload)?;
        }
        Ok(())
    }

    async fn start(&self) -> Result<(), ModuleError> {
        Ok(())
    }

    async fn stop(&self) -> Result<(), ModuleError> {
        Ok(())
    }

    async fn event(&self, name: &str, payload: Payload) {
        match payload {
            Payload::Command(request) => self.execute(request).await,
            other => tracing::debug!(event = name, payload = other.kind(), "Ignoring event"),
        }
    }
}
