//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (startup.rs):
//!     Settings → bus + live tree → modules → ModuleRegistry::start_all
//!     → abort when a module named in `abort_on` recorded an error
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Daemon::shutdown
//!
//! Shutdown (shutdown.rs):
//!     module stop → broadcast to its accept loops and talkers
//! ```

pub mod shutdown;
pub mod signals;
pub mod startup;

pub use shutdown::Shutdown;
pub use startup::{boot, BootError, Daemon};
