//! fleetd: a modular daemon that owns a fleet topology and serves it to peers.
//!
//! ```text
//!  topology XML ──▶ config ──(bus)──▶ server ◀──▶ peer commands
//!                              │
//!                              ├────▶ network (bridges)
//!                              └────▶ backingstore (replication)
//!
//!  container (template discovery, no events)
//! ```

pub mod backingstore;
pub mod config;
pub mod container;
pub mod control;
pub mod event;
pub mod lifecycle;
pub mod module;
pub mod net;
pub mod network;
pub mod observability;

pub use config::{ConfigData, ConfigStore, Settings};
pub use event::Bus;
pub use lifecycle::{boot, BootError, Daemon};
pub use module::{Module, ModuleRegistry};
