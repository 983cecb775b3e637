//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! settings file (TOML, settings.rs)
//!     → candidate topology documents (XML, loader.rs)
//!     → validation.rs (per-field rules)
//!     → sanity.rs (cross-entity consistency)
//!     → ConfigStore (live tree, store.rs)
//!     → ConfigModel announces every entity on the bus (model.rs)
//!
//! On a peer command:
//!     ConfigModel → ConfigStore::add_* → validate + sanity on a copy
//!     → atomic swap of the live tree
//! ```
//!
//! # Design Decisions
//! - The first candidate that passes both checks wins
//! - Readers always see a complete tree; mutations never edit it in place
//! - Entities keep positional back-references, never pointers

pub mod loader;
pub mod model;
pub mod sanity;
pub mod schema;
pub mod settings;
pub mod store;
pub mod validation;

pub use loader::ConfigError;
pub use model::ConfigModel;
pub use schema::ConfigData;
pub use settings::Settings;
pub use store::{ConfigStore, MutationError, TreeState};
