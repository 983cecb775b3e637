//! Control listeners.
//!
//! # Responsibilities
//! - Collect servers announced by the configuration
//! - Run one command listener per server once started
//! - Turn each connection into a `command` event and answer with its result
//! - Confirm added servers once their listener is bound
//!
//! # Design Decisions
//! - One request per connection: read to EOF, answer, close
//! - Results are matched to connections by command id through one-shot channels
//! - Servers announced after `start` get a listener immediately

use async_trait::async_trait;
use dashmap::DashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::net::TcpStream;
use tokio::sync::oneshot;

use crate::config::schema::Server;
use crate::control::check::{Addition, CheckRequest};
use crate::control::command::{Command, CommandError, CommandId, CommandRequest};
use crate::control::envelope::Envelope;
use crate::event::names::{CHECK_COMMAND, COMMAND, COMMAND_RESULT, SERVER_AVAILABLE};
use crate::event::{Bus, Payload};
use crate::lifecycle::shutdown::Shutdown;
use crate::module::{EventRole, Module, ModuleError};
use crate::net::{read_message, write_message, ConnectionPermit, ConnectionTracker, Listener, TransportError};

const ACTIVE: &[&str] = &[COMMAND];
const PASSIVE: &[&str] = &[SERVER_AVAILABLE, CHECK_COMMAND, COMMAND_RESULT];

/// Listener options.
#[derive(Debug, Clone)]
pub struct ListenOptions {
    pub host: String,
    pub max_connections: usize,
}

#[derive(Default)]
struct Collected {
    started: bool,
    servers: Vec<Server>,
}

/// State shared with connection tasks.
struct Shared {
    bus: Arc<Bus>,
    pending: DashMap<CommandId, oneshot::Sender<Envelope>>,
    connections: ConnectionTracker,
}

/// The control server module.
pub struct ServerModule {
    shared: Arc<Shared>,
    options: ListenOptions,
    collected: Mutex<Collected>,
    bound: DashMap<String, SocketAddr>,
    shutdown: Shutdown,
}

impl ServerModule {
    pub fn new(bus: Arc<Bus>, options: ListenOptions) -> Self {
        Self {
            shared: Arc::new(Shared {
                bus,
                pending: DashMap::new(),
                connections: ConnectionTracker::new(),
            }),
            options,
            collected: Mutex::new(Collected::default()),
            bound: DashMap::new(),
            shutdown: Shutdown::new(),
        }
    }

    /// Address the listener of `server` is bound to.
    pub fn bound_addr(&self, server: &str) -> Option<SocketAddr> {
        self.bound.get(server).map(|addr| *addr)
    }

    /// Connections currently being served.
    pub fn active_connections(&self) -> usize {
        self.shared.connections.active_count()
    }

    async fn listen(&self, server: &Server) -> Result<(), ModuleError> {
        let addr = format!("{}:{}", self.options.host, server.ipv4.port);
        let listener = Listener::bind(&addr, self.options.max_connections).await?;
        if let Ok(local) = listener.local_addr() {
            self.bound.insert(server.name.clone(), local);
        }
        tracing::info!(server = %server.name, address = %addr, "Control listener started");

        let shared = Arc::clone(&self.shared);
        let mut shutdown = self.shutdown.subscribe();
        let name = server.name.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = shutdown.recv() => break,
                    accepted = listener.accept() => match accepted {
                        Ok((stream, peer, permit)) => {
                            let shared = Arc::clone(&shared);
                            tokio::spawn(async move { shared.serve(stream, peer, permit).await });
                        }
                        Err(e) => tracing::warn!(server = %name, error = %e, "Accept failed"),
                    },
                }
            }
            tracing::info!(server = %name, "Control listener stopped");
        });
        Ok(())
    }

    /// Collect `server` before `start`, listen on it afterwards.
    async fn admit(&self, server: Server) -> Result<(), ModuleError> {
        {
            let mut collected = self.collected.lock().unwrap_or_else(PoisonError::into_inner);
            if !collected.started {
                tracing::debug!(server = %server.name, "Server collected");
                collected.servers.push(server);
                return Ok(());
            }
        }
        self.listen(&server).await
    }

    async fn server_available(&self, server: Server) {
        let name = server.name.clone();
        if let Err(e) = self.admit(server).await {
            tracing::error!(server = %name, error = %e, "Could not start control listener");
        }
    }

    async fn check(&self, check: CheckRequest) {
        if let Addition::Server(server) = &check.addition {
            let result = self.admit(server.clone()).await;
            check.report(self.name(), result);
        }
    }
}

impl Shared {
    async fn serve(&self, mut stream: TcpStream, peer: SocketAddr, _permit: ConnectionPermit) {
        let guard = self.connections.track();
        let peer = peer.to_string();

        let line = match read_message(&mut stream, &peer).await {
            Ok(line) => line,
            Err(e @ TransportError::TooLarge { .. }) => {
                tracing::warn!(connection_id = %guard.id(), error = %e, "Request refused");
                let response = Envelope::failure("request too large").to_json();
                if let Err(e) = write_message(&mut stream, &peer, &response).await {
                    tracing::warn!(connection_id = %guard.id(), error = %e, "Write failed");
                }
                return;
            }
            Err(e) => {
                tracing::warn!(connection_id = %guard.id(), error = %e, "Read failed");
                return;
            }
        };
        tracing::debug!(connection_id = %guard.id(), peer = %peer, request = %line, "Request received");

        let response = self.respond(&line).await;
        if let Err(e) = write_message(&mut stream, &peer, &response).await {
            tracing::warn!(connection_id = %guard.id(), error = %e, "Write failed");
        }
    }

    /// Response text for one request line.
    async fn respond(&self, line: &str) -> String {
        let command = match Command::parse(line) {
            Ok(command) => command,
            Err(e @ CommandError::Unknown(_)) => return e.to_string(),
            Err(e @ CommandError::InvalidParameter { .. }) => return Envelope::failure(e.to_string()).to_json(),
        };

        let request = CommandRequest::new(command);
        let id = request.id;
        let (tx, rx) = oneshot::channel();
        self.pending.insert(id, tx);

        if let Err(e) = self.bus.fire(COMMAND, Payload::Command(request)) {
            self.pending.remove(&id);
            return Envelope::failure(e.to_string()).to_json();
        }

        match rx.await {
            Ok(envelope) => envelope.to_json(),
            Err(_) => Envelope::failure("command was dropped").to_json(),
        }
    }

    fn complete(&self, id: CommandId, envelope: Envelope) {
        match self.pending.remove(&id) {
            Some((_, tx)) => {
                let _ = tx.send(envelope);
            }
            None => tracing::debug!(command_id = %id, "No connection waiting for result"),
        }
    }
}

#[async_trait]
impl Module for ServerModule {
    fn name(&self) -> &'static str {
        "server"
    }

    fn events(&self, role: EventRole) -> &'static [&'static str] {
        match role {
            EventRole::Active => ACTIVE,
            EventRole::Passive => PASSIVE,
        }
    }

    async fn init(&self) -> Result<(), ModuleError> {
        Ok(())
    }

    async fn start(&self) -> Result<(), ModuleError> {
        let servers = {
            let mut collected = self.collected.lock().unwrap_or_else(PoisonError::into_inner);
            collected.started = true;
            std::mem::take(&mut collected.servers)
        };
        for server in &servers {
            self.listen(server).await?;
        }
        Ok(())
    }

    async fn stop(&self) -> Result<(), ModuleError> {
        self.shutdown.trigger();
        tracing::info!(
            listeners = self.bound.len(),
            active_connections = self.active_connections(),
            "Control server stopping"
        );
        Ok(())
    }

    async fn event(&self, name: &str, payload: Payload) {
        match payload {
            Payload::Server(server) => self.server_available(server).await,
            Payload::Check(check) => self.check(check).await,
            Payload::Result(outcome) => self.shared.complete(outcome.id, outcome.envelope),
            other => tracing::debug!(event = name, payload = other.kind(), "Ignoring event"),
        }
    }
}
