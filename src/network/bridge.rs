//! Bridge provisioning backend.
//!
//! The daemon only talks to bridges through [`BridgeBackend`]. The in-memory
//! [`MemoryBridges`] backend is used for dry runs and tests.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use thiserror::Error;

/// Bridge provisioning failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BridgeError {
    #[error("bridge {0} not found")]
    NotFound(String),

    #[error("bridge {0} already exists")]
    AlreadyExists(String),

    #[error("ip address {address} was removed from bridge {bridge}")]
    AddressMismatch { bridge: String, address: String },

    #[error("bridge {0} is down")]
    Down(String),

    #[error("bridge backend failed: {0}")]
    Backend(String),
}

/// Observed state of a bridge.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Bridge {
    pub name: String,
    pub address: String,
    pub subnet: String,
    pub up: bool,
}

/// Operations the network module needs from the host's bridge facility.
pub trait BridgeBackend: Send + Sync {
    /// Look a bridge up by name.
    fn find(&self, name: &str) -> Result<Option<Bridge>, BridgeError>;

    /// Create a bridge with no address, link down.
    fn create(&self, name: &str) -> Result<Bridge, BridgeError>;

    /// Assign the address and subnet mask.
    fn set_address(&self, name: &str, address: &str, subnet: &str) -> Result<(), BridgeError>;

    /// Bring the link up.
    fn set_up(&self, name: &str) -> Result<(), BridgeError>;

    /// Whether the backend only simulates bridges. A simulated host starts
    /// with none, so they are always created.
    fn is_simulated(&self) -> bool {
        false
    }
}

/// Bridges kept in memory.
#[derive(Debug, Default)]
pub struct MemoryBridges {
    bridges: DashMap<String, Bridge>,
}

impl MemoryBridges {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-populate a bridge.
    pub fn insert(&self, bridge: Bridge) {
        self.bridges.insert(bridge.name.clone(), bridge);
    }

    pub fn len(&self) -> usize {
        self.bridges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bridges.is_empty()
    }
}

impl BridgeBackend for MemoryBridges {
    fn find(&self, name: &str) -> Result<Option<Bridge>, BridgeError> {
        Ok(self.bridges.get(name).map(|b| b.value().clone()))
    }

    fn create(&self, name: &str) -> Result<Bridge, BridgeError> {
        let bridge = Bridge {
            name: name.to_string(),
            ..Bridge::default()
        };
        match self.bridges.entry(name.to_string()) {
            Entry::Occupied(_) => Err(BridgeError::AlreadyExists(name.to_string())),
            Entry::Vacant(slot) => {
                slot.insert(bridge.clone());
                Ok(bridge)
            }
        }
    }

    fn set_address(&self, name: &str, address: &str, subnet: &str) -> Result<(), BridgeError> {
        let mut bridge = self
            .bridges
            .get_mut(name)
            .ok_or_else(|| BridgeError::NotFound(name.to_string()))?;
        bridge.address = address.to_string();
        bridge.subnet = subnet.to_string();
        Ok(())
    }

    fn set_up(&self, name: &str) -> Result<(), BridgeError> {
        let mut bridge = self
            .bridges
            .get_mut(name)
            .ok_or_else(|| BridgeError::NotFound(name.to_string()))?;
        bridge.up = true;
        Ok(())
    }

    fn is_simulated(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_configure_and_raise() {
        let bridges = MemoryBridges::new();
        assert_eq!(bridges.find("br0"), Ok(None));

        bridges.create("br0").unwrap();
        assert_eq!(bridges.create("br0"), Err(BridgeError::AlreadyExists("br0".into())));

        bridges.set_address("br0", "10.0.0.1", "255.255.255.0").unwrap();
        bridges.set_up("br0").unwrap();

        let bridge = bridges.find("br0").unwrap().unwrap();
        assert_eq!(bridge.address, "10.0.0.1");
        assert!(bridge.up);
    }

    #[test]
    fn configuring_missing_bridge_fails() {
        let bridges = MemoryBridges::new();
        assert_eq!(bridges.set_up("nope"), Err(BridgeError::NotFound("nope".into())));
    }
}
