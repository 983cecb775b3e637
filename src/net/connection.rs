//! Connection identity, tracking and single-message I/O.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;

use crate::net::TransportError;

/// Largest message accepted from a peer.
pub const MAX_MESSAGE_BYTES: u64 = 64 * 1024;

static NEXT_CONNECTION: AtomicU64 = AtomicU64::new(1);

/// Process-wide connection number, shown as `conn-N` in logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(u64);

impl ConnectionId {
    fn next() -> Self {
        Self(NEXT_CONNECTION.fetch_add(1, Ordering::Relaxed))
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Counts open connections of one listener.
#[derive(Debug, Clone, Default)]
pub struct ConnectionTracker {
    active: Arc<AtomicUsize>,
}

impl ConnectionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a new connection. The guard releases it on drop.
    pub fn track(&self) -> ConnectionGuard {
        self.active.fetch_add(1, Ordering::SeqCst);
        let id = ConnectionId::next();
        tracing::trace!(connection_id = %id, "Connection opened");
        ConnectionGuard {
            active: Arc::clone(&self.active),
            id,
        }
    }

    pub fn active_count(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }
}

/// Lifetime of one tracked connection.
#[derive(Debug)]
pub struct ConnectionGuard {
    active: Arc<AtomicUsize>,
    id: ConnectionId,
}

impl ConnectionGuard {
    pub fn id(&self) -> ConnectionId {
        self.id
    }
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        self.active.fetch_sub(1, Ordering::SeqCst);
        tracing::trace!(connection_id = %self.id, "Connection closed");
    }
}

/// Read until the peer half-closes. Line breaks become spaces and the
/// result is trimmed; a message over [`MAX_MESSAGE_BYTES`] is refused.
pub async fn read_message<S>(stream: &mut S, peer: &str) -> Result<String, TransportError>
where
    S: AsyncRead + Unpin,
{
    let mut buf = Vec::new();
    stream
        .take(MAX_MESSAGE_BYTES + 1)
        .read_to_end(&mut buf)
        .await
        .map_err(|source| TransportError::Io {
            peer: peer.to_string(),
            source,
        })?;
    if buf.len() as u64 > MAX_MESSAGE_BYTES {
        return Err(TransportError::TooLarge {
            peer: peer.to_string(),
            limit: MAX_MESSAGE_BYTES,
        });
    }

    let text = String::from_utf8_lossy(&buf);
    Ok(text.replace("\r\n", " ").replace(['\r', '\n'], " ").trim().to_string())
}

/// Write a whole message and shut the write half down.
pub async fn write_message<S>(stream: &mut S, peer: &str, message: &str) -> Result<(), TransportError>
where
    S: AsyncWrite + Unpin,
{
    let io_error = |source| TransportError::Io {
        peer: peer.to_string(),
        source,
    };
    stream.write_all(message.as_bytes()).await.map_err(io_error)?;
    stream.shutdown().await.map_err(io_error)
}

/// Open a connection to `addr`.
pub async fn dial(addr: &str) -> Result<TcpStream, TransportError> {
    TcpStream::connect(addr)
        .await
        .map_err(|source| TransportError::Connect {
            addr: addr.to_string(),
            source,
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn guards_release_their_slot_and_get_increasing_ids() {
        let tracker = ConnectionTracker::new();
        let first = tracker.track();
        let second = tracker.track();
        assert_eq!(tracker.active_count(), 2);
        assert!(second.id() > first.id());

        drop(first);
        assert_eq!(tracker.active_count(), 1);
        drop(second);
        assert_eq!(tracker.active_count(), 0);
    }

    #[tokio::test]
    async fn message_is_read_to_eof_without_newlines() {
        let (mut client, mut server) = tokio::io::duplex(1024);
        write_message(&mut client, "test", "get-networks\n").await.unwrap();

        let message = read_message(&mut server, "test").await.unwrap();
        assert_eq!(message, "get-networks");
    }

    #[tokio::test]
    async fn line_breaks_separate_words() {
        let (mut client, mut server) = tokio::io::duplex(1024);
        write_message(&mut client, "test", "add-network s1\r\nnet2 production\n").await.unwrap();

        let message = read_message(&mut server, "test").await.unwrap();
        assert_eq!(message, "add-network s1 net2 production");
    }

    #[tokio::test]
    async fn oversized_message_is_refused() {
        let (mut client, mut server) = tokio::io::duplex(4096);
        let writer = tokio::spawn(async move {
            let body = "x".repeat(MAX_MESSAGE_BYTES as usize + 1);
            write_message(&mut client, "test", &body).await
        });

        let err = read_message(&mut server, "test").await.unwrap_err();
        assert!(matches!(err, TransportError::TooLarge { limit: MAX_MESSAGE_BYTES, .. }));
        writer.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn dial_refused_is_a_connect_error() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        drop(listener);

        assert!(matches!(dial(&addr).await, Err(TransportError::Connect { .. })));
    }
}
