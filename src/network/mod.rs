//! Network provisioning subsystem.
//!
//! # Data Flow
//! ```text
//! network-available → NetworkModule (collected until start)
//! start             → ensure every bridge (create/repair only with fix_network)
//! check-command     → provision the added network, report the verdict
//! ```

pub mod bridge;
pub mod module;

pub use bridge::{Bridge, BridgeBackend, BridgeError, MemoryBridges};
pub use module::NetworkModule;
