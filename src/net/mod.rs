//! Byte-stream transport.
//!
//! # Data Flow
//! ```text
//! Incoming TCP connection
//!     → listener.rs (accept loop, connection limits)
//!     → connection.rs (id, tracking, read to EOF / write / close)
//!     → handed to the owning module (control server, replica listener)
//!
//! Outgoing
//!     connection::dial → write → close
//! ```
//!
//! # Design Decisions
//! - One message per connection: the peer half-closes after sending
//! - Bounded accept queue prevents resource exhaustion
//! - Transport failures only ever drop the affected connection

pub mod connection;
pub mod listener;

use thiserror::Error;

pub use connection::{dial, read_message, write_message, ConnectionGuard, ConnectionId, ConnectionTracker};
pub use listener::{ConnectionPermit, Listener};

/// Transport failures.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to accept: {0}")]
    Accept(#[source] std::io::Error),

    #[error("failed to connect to {addr}: {source}")]
    Connect {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("i/o error with {peer}: {source}")]
    Io {
        peer: String,
        #[source]
        source: std::io::Error,
    },

    #[error("message from {peer} exceeds {limit} bytes")]
    TooLarge { peer: String, limit: u64 },

    /// The listener was shut down.
    #[error("transport closed")]
    Closed,
}
