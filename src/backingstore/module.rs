//! The backing store module.
//!
//! Local stores get a replica listener on their port. A server's remote
//! store gets a talker that forwards every successful command result to the
//! peer. Stores announced after `start` are brought up immediately; stores
//! added by a command answer `check-command` with the outcome.

use async_trait::async_trait;
use dashmap::DashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::mpsc;

use crate::backingstore::replication::{run_replica_listener, run_talker, Outbox, RetryPolicy};
use crate::config::schema::{LocalBackingStore, RemoteBackingStore};
use crate::control::check::{Addition, CheckRequest};
use crate::control::envelope::CommandOutcome;
use crate::event::names::{BACKINGSTORE_AVAILABLE, CHECK_COMMAND, COMMAND_RESULT};
use crate::event::Payload;
use crate::lifecycle::shutdown::Shutdown;
use crate::module::{EventRole, Module, ModuleError};
use crate::net::Listener;

const PASSIVE: &[&str] = &[BACKINGSTORE_AVAILABLE, CHECK_COMMAND, COMMAND_RESULT];

/// A store announced by the configuration.
#[derive(Debug, Clone)]
enum Store {
    Local(LocalBackingStore),
    Remote { server: String, store: RemoteBackingStore },
}

#[derive(Default)]
struct Collected {
    started: bool,
    stores: Vec<Store>,
}

/// Listener and talker options.
#[derive(Debug, Clone)]
pub struct StoreOptions {
    pub listen_host: String,
    pub max_connections: usize,
    pub retry: RetryPolicy,
}

pub struct BackingStoreModule {
    options: StoreOptions,
    collected: Mutex<Collected>,
    outboxes: DashMap<String, Outbox>,
    bound: DashMap<String, SocketAddr>,
    received: Arc<AtomicUsize>,
    shutdown: Shutdown,
}

impl BackingStoreModule {
    pub fn new(options: StoreOptions) -> Self {
        Self {
            options,
            collected: Mutex::new(Collected::default()),
            outboxes: DashMap::new(),
            bound: DashMap::new(),
            received: Arc::new(AtomicUsize::new(0)),
            shutdown: Shutdown::new(),
        }
    }

    /// Address the replica listener of a local store is bound to.
    pub fn bound_addr(&self, store: &str) -> Option<SocketAddr> {
        self.bound.get(store).map(|addr| *addr)
    }

    /// Replicated messages received by all local stores.
    pub fn received(&self) -> usize {
        self.received.load(Ordering::SeqCst)
    }

    /// Servers with a running replication talker.
    pub fn replicating(&self) -> usize {
        self.outboxes.len()
    }

    async fn bring_up(&self, store: &Store) -> Result<(), ModuleError> {
        match store {
            Store::Local(local) => {
                let addr = format!("{}:{}", self.options.listen_host, local.host.ipv4.port);
                let listener = Listener::bind(&addr, self.options.max_connections).await?;
                if let Ok(bound) = listener.local_addr() {
                    self.bound.insert(local.name.clone(), bound);
                }
                tracing::info!(store = %local.name, address = %addr, kind = %local.kind, "Replica listener started");
                tokio::spawn(run_replica_listener(
                    local.name.clone(),
                    listener,
                    Arc::clone(&self.received),
                    self.shutdown.clone(),
                ));
            }
            Store::Remote { server, store } => {
                let (tx, rx) = mpsc::unbounded_channel();
                self.outboxes.insert(server.clone(), tx);
                tokio::spawn(run_talker(store.endpoint(), rx, self.options.retry, self.shutdown.clone()));
            }
        }
        Ok(())
    }

    async fn admit(&self, store: Store) -> Result<(), ModuleError> {
        {
            let mut collected = self.lock();
            if !collected.started {
                collected.stores.push(store);
                return Ok(());
            }
        }
        self.bring_up(&store).await
    }

    async fn available(&self, store: Store) {
        if let Err(e) = self.admit(store).await {
            tracing::error!(error = %e, "Could not bring up backing store");
        }
    }

    async fn check(&self, check: CheckRequest) {
        let store = match &check.addition {
            Addition::LocalStore(local) => Store::Local(local.clone()),
            Addition::Server(server) => match &server.backing_store {
                Some(store) => Store::Remote {
                    server: server.name.clone(),
                    store: store.clone(),
                },
                None => return,
            },
            _ => return,
        };
        check.report(self.name(), self.admit(store).await);
    }

    fn replicate(&self, outcome: CommandOutcome) {
        if !outcome.envelope.succeeded {
            return;
        }
        let message = outcome.envelope.to_json();
        for outbox in self.outboxes.iter() {
            if outbox.value().send(message.clone()).is_err() {
                tracing::warn!(server = %outbox.key(), command_id = %outcome.id, "Replication talker is gone");
            }
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Collected> {
        self.collected.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl Module for BackingStoreModule {
    fn name(&self) -> &'static str {
        "backingstore"
    }

    fn events(&self, role: EventRole) -> &'static [&'static str] {
        match role {
            EventRole::Active => &[],
            EventRole::Passive => PASSIVE,
        }
    }

    async fn init(&self) -> Result<(), ModuleError> {
        Ok(())
    }

    async fn start(&self) -> Result<(), ModuleError> {
        let stores = {
            let mut collected = self.lock();
            collected.started = true;
            std::mem::take(&mut collected.stores)
        };
        for store in &stores {
            self.bring_up(store).await?;
        }
        Ok(())
    }

    async fn stop(&self) -> Result<(), ModuleError> {
        self.shutdown.trigger();
        self.outboxes.clear();
        tracing::info!(received = self.received(), "Backing store stopped");
        Ok(())
    }

    async fn event(&self, name: &str, payload: Payload) {
        match payload {
            Payload::LocalStore(store) => self.available(Store::Local(store)).await,
            Payload::RemoteStore { server, store } => self.available(Store::Remote { server, store }).await,
            Payload::Check(check) => self.check(check).await,
            Payload::Result(outcome) => self.replicate(outcome),
            other => tracing::debug!(event = name, payload = other.kind(), "Ignoring event"),
        }
    }
}
