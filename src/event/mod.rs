//! Event bus subsystem.
//!
//! # Data Flow
//! ```text
//! module declares active events  → bus.register_event
//! module declares passive events → bus.register_callback(module handler)
//!
//! bus.fire(name, payload)
//!     → one spawned task per listener/callback (fire-and-forget)
//!     → each task tracked in-flight until it completes
//!
//! bus.flush()
//!     → waits until nothing is in flight
//! ```
//!
//! # Design Decisions
//! - The bus is generic over its payload; the daemon uses [`Payload`]
//! - Completion is tracked by counting guards, never by polling

pub mod bus;
pub mod payload;
pub mod tracker;

pub use bus::{callback, ActiveEvent, BusError, Callback, EventBus, Listener};
pub use payload::Payload;
pub use tracker::{InFlight, InFlightGuard};

/// The bus as used by the daemon's modules.
pub type Bus = EventBus<Payload>;

/// Event names shared between modules.
pub mod names {
    pub const SERVER_AVAILABLE: &str = "server-available";
    pub const NETWORK_AVAILABLE: &str = "network-available";
    pub const HOST_AVAILABLE: &str = "host-available";
    pub const BACKINGSTORE_AVAILABLE: &str = "backingstore-available";
    /// A peer command to execute.
    pub const COMMAND: &str = "command";
    /// A runtime addition the consuming modules must act on before it is reported.
    pub const CHECK_COMMAND: &str = "check-command";
    /// The result of a command, routed back to the connection that sent it.
    pub const COMMAND_RESULT: &str = "command-result";
}
