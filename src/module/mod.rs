//! Module lifecycle subsystem.
//!
//! # Data Flow
//! ```text
//! ModuleRegistry::start_all
//!     1. active events of every module   → bus.register_event
//!     2. passive events of every module  → bus.register_callback(module.event)
//!     3. module.init() for every module  → errors recorded per module
//!        bus.flush()                     → init-time events fully delivered
//!     4. module.start() where init succeeded
//!
//! ModuleRegistry::stop_all
//!     module.stop() → unregister callbacks → unregister events
//! ```
//!
//! # Design Decisions
//! - Modules never call each other; all coordination is through named events
//! - Only wiring errors abort startup; init/start errors are inspected by boot

pub mod registry;

use async_trait::async_trait;
use thiserror::Error;

use crate::config::loader::ConfigError;
use crate::event::{BusError, Payload};
use crate::net::TransportError;
use crate::network::bridge::BridgeError;

pub use registry::{ModuleRegistry, RegistryError};

/// Whether a module publishes or subscribes to an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventRole {
    /// Events the module fires.
    Active,
    /// Events the module handles.
    Passive,
}

/// Errors a module reports from its lifecycle calls.
#[derive(Debug, Error)]
pub enum ModuleError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Bridge(#[from] BridgeError),

    #[error(transparent)]
    Bus(#[from] BusError),
}

/// The lifecycle contract every pluggable component implements.
#[async_trait]
pub trait Module: Send + Sync {
    /// Unique module name.
    fn name(&self) -> &'static str;

    /// Events the module publishes (`Active`) or subscribes to (`Passive`).
    fn events(&self, role: EventRole) -> &'static [&'static str];

    /// Load state; may fire events, which are flushed before any `start`.
    async fn init(&self) -> Result<(), ModuleError>;

    /// Begin serving. Only called when `init` succeeded.
    async fn start(&self) -> Result<(), ModuleError>;

    /// Release resources.
    async fn stop(&self) -> Result<(), ModuleError>;

    /// Single entry point for every subscribed event.
    async fn event(&self, name: &str, payload: Payload);
}
