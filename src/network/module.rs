//! The network module.
//!
//! Collects the networks announced by the configuration and makes sure a
//! bridge with the configured address exists for each one. At `start`,
//! existing bridges are only repaired or created when `fix_network` is set;
//! networks added at runtime always get a fresh bridge, and the peer that
//! added one hears whether provisioning worked.

use async_trait::async_trait;
use std::sync::{Arc, Mutex, PoisonError};

use crate::config::schema::Network;
use crate::control::check::{Addition, CheckRequest};
use crate::event::names::{CHECK_COMMAND, NETWORK_AVAILABLE};
use crate::event::Payload;
use crate::module::{EventRole, Module, ModuleError};
use crate::network::bridge::{BridgeBackend, BridgeError};

const PASSIVE: &[&str] = &[NETWORK_AVAILABLE, CHECK_COMMAND];

#[derive(Default)]
struct Collected {
    started: bool,
    networks: Vec<Network>,
}

pub struct NetworkModule {
    backend: Arc<dyn BridgeBackend>,
    fix: bool,
    collected: Mutex<Collected>,
}

impl NetworkModule {
    pub fn new(backend: Arc<dyn BridgeBackend>, fix: bool) -> Self {
        Self {
            backend,
            fix,
            collected: Mutex::new(Collected::default()),
        }
    }

    /// Networks known to the module.
    pub fn networks(&self) -> Vec<String> {
        self.lock().networks.iter().map(|n| n.name.clone()).collect()
    }

    /// Verify the bridge of `network`, repairing it when allowed.
    pub fn ensure(&self, network: &Network) -> Result<(), BridgeError> {
        let Some(bridge) = self.backend.find(&network.name)? else {
            tracing::warn!(network = %network.name, "Bridge not available");
            if !self.fix {
                return Err(BridgeError::NotFound(network.name.clone()));
            }
            return self.provision(network);
        };

        if bridge.address != network.ipv4.address || bridge.subnet != network.ipv4.subnet {
            if !self.fix {
                return Err(BridgeError::AddressMismatch {
                    bridge: network.name.clone(),
                    address: network.ipv4.address.clone(),
                });
            }
            tracing::info!(network = %network.name, "Repairing bridge address");
            self.backend
                .set_address(&network.name, &network.ipv4.address, &network.ipv4.subnet)?;
        }

        if !bridge.up {
            if !self.fix {
                return Err(BridgeError::Down(network.name.clone()));
            }
            self.backend.set_up(&network.name)?;
        }
        Ok(())
    }

    /// Create, address and raise the bridge of `network`.
    pub fn provision(&self, network: &Network) -> Result<(), BridgeError> {
        self.backend.create(&network.name)?;
        self.backend
            .set_address(&network.name, &network.ipv4.address, &network.ipv4.subnet)?;
        self.backend.set_up(&network.name)?;
        tracing::info!(
            network = %network.name,
            address = %network.ipv4.address,
            subnet = %network.ipv4.subnet,
            "Bridge provisioned"
        );
        Ok(())
    }

    /// Collect `network` before `start`, provision it afterwards.
    fn admit(&self, network: &Network) -> Result<(), BridgeError> {
        let started = {
            let mut collected = self.lock();
            collected.networks.push(network.clone());
            collected.started
        };
        if !started {
            tracing::debug!(network = %network.name, "Network collected");
            return Ok(());
        }
        self.provision(network)
    }

    fn available(&self, network: Network) {
        if let Err(e) = self.admit(&network) {
            tracing::error!(network = %network.name, error = %e, "Could not provision bridge");
        }
    }

    fn check(&self, check: CheckRequest) {
        if let Addition::Network(network) = &check.addition {
            check.report(self.name(), self.admit(network));
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Collected> {
        self.collected.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl Module for NetworkModule {
    fn name(&self) -> &'static str {
        "network"
    }

    fn events(&self, role: EventRole) -> &'static [&'static str] {
        match role {
            EventRole::Active => &[],
            EventRole::Passive => PASSIVE,
        }
    }

    async fn init(&self) -> Result<(), ModuleError> {
        if self.fix {
            tracing::info!("Bridges will be created or repaired as needed");
        }
        Ok(())
    }

    async fn start(&self) -> Result<(), ModuleError> {
        let networks = {
            let mut collected = self.lock();
            collected.started = true;
            collected.networks.clone()
        };
        for network in &networks {
            self.ensure(network)?;
        }
        tracing::info!(networks = networks.len(), "Bridges verified");
        Ok(())
    }

    async fn stop(&self) -> Result<(), ModuleError> {
        Ok(())
    }

    async fn event(&self, name: &str, payload: Payload) {
        match payload {
            Payload::Network(network) => self.available(network),
            Payload::Check(check) => self.check(check),
            other => tracing::debug!(event = name, payload = other.kind(), "Ignoring event"),
        }
    }
}
