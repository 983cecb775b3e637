//! Backing store subsystem.
//!
//! # Data Flow
//! ```text
//! backingstore-available (local)  → replica listener on the store's port
//! backingstore-available (remote) → talker dialing the peer store
//! check-command (added store)     → same, with the outcome as the verdict
//! command-result (succeeded)      → every talker → peer replica listener
//! ```

pub mod module;
pub mod replication;

pub use module::{BackingStoreModule, StoreOptions};
pub use replication::RetryPolicy;
