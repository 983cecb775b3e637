//! Observability subsystem.
//!
//! Every module logs through `tracing` with structured fields (`module`,
//! `event`, `command_id`, `connection_id`); [`logging::init`] installs the
//! subscriber once per process.

pub mod logging;
