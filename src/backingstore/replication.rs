//! Result replication between daemons.
//!
//! # Responsibilities
//! - Talker: deliver every queued message to one peer, one connection per message
//! - Replica listener: accept messages from peers and count them
//!
//! # Design Decisions
//! - Dial failures retry forever with a fixed delay; a message is never dropped
//! - Messages are delivered in queue order
//! - Both loops end when their module's shutdown is triggered

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

use crate::lifecycle::shutdown::Shutdown;
use crate::net::{dial, read_message, write_message, Listener, TransportError};

/// Fixed-delay retry without a limit.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub delay: Duration,
}

impl RetryPolicy {
    pub fn fixed(delay: Duration) -> Self {
        Self { delay }
    }
}

/// Sending side of a talker.
pub type Outbox = mpsc::UnboundedSender<String>;

/// Deliver queued messages to `endpoint` until the queue closes or shutdown.
pub async fn run_talker(
    endpoint: String,
    mut outbox: mpsc::UnboundedReceiver<String>,
    retry: RetryPolicy,
    shutdown: Shutdown,
) {
    let mut stop = shutdown.subscribe();
    if shutdown.is_triggered() {
        return;
    }
    tracing::info!(endpoint = %endpoint, "Replication talker started");

    loop {
        let message = tokio::select! {
            _ = stop.recv() => break,
            message = outbox.recv() => match message {
                Some(message) => message,
                None => break,
            },
        };

        let mut attempt = 0u64;
        loop {
            attempt += 1;
            match deliver(&endpoint, &message).await {
                Ok(()) => {
                    tracing::debug!(endpoint = %endpoint, attempt, "Replicated result");
                    break;
                }
                Err(e) => {
                    tracing::warn!(
                        endpoint = %endpoint,
                        attempt,
                        retry_in_secs = retry.delay.as_secs_f64(),
                        error = %e,
                        "Replication failed"
                    );
                    tokio::select! {
                        _ = stop.recv() => return,
                        _ = tokio::time::sleep(retry.delay) => {}
                    }
                }
            }
        }
    }
    tracing::info!(endpoint = %endpoint, "Replication talker stopped");
}

async fn deliver(endpoint: &str, message: &str) -> Result<(), TransportError> {
    let mut stream = dial(endpoint).await?;
    write_message(&mut stream, endpoint, message).await
}

/// Accept replicated messages until shutdown, counting each one received.
pub async fn run_replica_listener(name: String, listener: Listener, received: Arc<AtomicUsize>, shutdown: Shutdown) {
    let mut stop = shutdown.subscribe();
    if shutdown.is_triggered() {
        return;
    }
    loop {
        tokio::select! {
            _ = stop.recv() => break,
            accepted = listener.accept() => match accepted {
                Ok((mut stream, peer, permit)) => {
                    let name = name.clone();
                    let received = Arc::clone(&received);
                    tokio::spawn(async move {
                        let _permit = permit;
                        let peer = peer.to_string();
                        match read_message(&mut stream, &peer).await {
                            Ok(message) if !message.is_empty() => {
                                let total = received.fetch_add(1, Ordering::SeqCst) + 1;
                                tracing::info!(store = %name, peer = %peer, total, message = %message, "Replica received");
                            }
                            Ok(_) => tracing::debug!(store = %name, peer = %peer, "Empty replica message"),
                            Err(e) => tracing::warn!(store = %name, error = %e, "Replica read failed"),
                        }
                    });
                }
                Err(e) => tracing::warn!(store = %name, error = %e, "Accept failed"),
            },
        }
    }
    tracing::info!(store = %name, "Replica listener stopped");
}
