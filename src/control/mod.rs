//! Control protocol subsystem.
//!
//! # Data Flow
//! ```text
//! peer connection → read to EOF → Command::parse
//!     unknown keyword      → "unknown command"
//!     wrong arity          → failure envelope
//!     otherwise            → fire `command` → ConfigModel
//!                          → (additions) `check-command` → verdicts from server/network/backingstore
//!                          → `command-result` → envelope JSON → peer
//! ```

pub mod check;
pub mod command;
pub mod envelope;
pub mod server;
pub mod view;

pub use check::{Addition, CheckRequest, Verdict};
pub use command::{Command, CommandError, CommandId, CommandRequest};
pub use envelope::{CommandOutcome, Envelope};
pub use server::{ListenOptions, ServerModule};
