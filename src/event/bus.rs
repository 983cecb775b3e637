//! Named publish/subscribe channels with asynchronous fan-out.
//!
//! # Responsibilities
//! - Keep the registry of named events and their subscribers
//! - Schedule one independent task per subscriber on every fire
//! - Account for every scheduled task so `flush` can await drainage
//!
//! # Design Decisions
//! - `fire` never waits for a handler; it only fails for unknown events
//! - No ordering between invocations, even from a single `fire`
//! - The registry is only written during boot and shutdown, so its locks are uncontended
//! - Subscriber identity is pointer identity of the shared handler

use async_trait::async_trait;
use dashmap::DashMap;
use futures_util::future::BoxFuture;
use std::future::Future;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use thiserror::Error;

use crate::event::tracker::InFlight;

/// Errors reported synchronously by the bus.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BusError {
    /// The event name was never registered.
    #[error("event not found: {0}")]
    EventNotFound(String),

    /// The identical subscriber is already attached to the event.
    #[error("subscriber already registered for event {0}")]
    AlreadyRegistered(String),

    /// The subscriber is not attached to the event.
    #[error("subscriber not found for event {0}")]
    NotFound(String),
}

/// A passive handler that only receives the payload.
#[async_trait]
pub trait Listener<P: Send + 'static>: Send + Sync {
    /// Handle one occurrence of the event.
    async fn extinguish(&self, payload: P);
}

/// A handler that receives the event name along with the payload.
pub type Callback<P> = Arc<dyn Fn(String, P) -> BoxFuture<'static, ()> + Send + Sync>;

/// Wrap an async closure into a [`Callback`].
pub fn callback<P, F, Fut>(f: F) -> Callback<P>
where
    F: Fn(String, P) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    Arc::new(move |name, payload| Box::pin(f(name, payload)))
}

/// A registered event with its subscribers.
pub struct ActiveEvent<P: Send + 'static> {
    name: String,
    listeners: RwLock<Vec<Arc<dyn Listener<P>>>>,
    callbacks: RwLock<Vec<Callback<P>>>,
    in_flight: InFlight,
}

impl<P: Send + 'static> ActiveEvent<P> {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            listeners: RwLock::new(Vec::new()),
            callbacks: RwLock::new(Vec::new()),
            in_flight: InFlight::new(),
        }
    }

    /// The event name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Number of attached listeners and callbacks.
    pub fn subscriber_count(&self) -> usize {
        read(&self.listeners).len() + read(&self.callbacks).len()
    }

    /// Invocations of this event still running.
    pub fn in_flight(&self) -> usize {
        self.in_flight.count()
    }
}

/// The event bus.
pub struct EventBus<P: Send + 'static> {
    events: DashMap<String, Arc<ActiveEvent<P>>>,
    in_flight: InFlight,
}

impl<P: Clone + Send + 'static> EventBus<P> {
    /// Create an empty bus.
    pub fn new() -> Self {
        Self {
            events: DashMap::new(),
            in_flight: InFlight::new(),
        }
    }

    /// Register an event, returning the existing one if already present.
    pub fn register_event(&self, name: &str) -> Arc<ActiveEvent<P>> {
        let event = self
            .events
            .entry(name.to_string())
            .or_insert_with(|| {
                tracing::debug!(event = name, "Event registered");
                Arc::new(ActiveEvent::new(name))
            });
        Arc::clone(event.value())
    }

    /// Remove an event and all of its subscribers.
    pub fn unregister_event(&self, name: &str) -> Result<(), BusError> {
        self.events
            .remove(name)
            .map(|_| tracing::debug!(event = name, "Event unregistered"))
            .ok_or_else(|| BusError::EventNotFound(name.to_string()))
    }

    /// Whether the event is registered.
    pub fn is_registered(&self, name: &str) -> bool {
        self.events.contains_key(name)
    }

    /// Look up a registered event.
    pub fn event(&self, name: &str) -> Result<Arc<ActiveEvent<P>>, BusError> {
        self.events
            .get(name)
            .map(|event| Arc::clone(event.value()))
            .ok_or_else(|| BusError::EventNotFound(name.to_string()))
    }

    /// Attach a passive listener to an event.
    pub fn register_listener(&self, name: &str, listener: Arc<dyn Listener<P>>) -> Result<(), BusError> {
        let event = self.event(name)?;
        let mut listeners = write(&event.listeners);
        if listeners.iter().any(|l| same_target(l, &listener)) {
            return Err(BusError::AlreadyRegistered(name.to_string()));
        }
        listeners.push(listener);
        Ok(())
    }

    /// Detach a passive listener from an event.
    pub fn unregister_listener(&self, name: &str, listener: &Arc<dyn Listener<P>>) -> Result<(), BusError> {
        let event = self.event(name)?;
        let mut listeners = write(&event.listeners);
        let index = listeners
            .iter()
            .position(|l| same_target(l, listener))
            .ok_or_else(|| BusError::NotFound(name.to_string()))?;
        listeners.remove(index);
        Ok(())
    }

    /// Attach a callback to an event.
    pub fn register_callback(&self, name: &str, callback: Callback<P>) -> Result<(), BusError> {
        let event = self.event(name)?;
        let mut callbacks = write(&event.callbacks);
        if callbacks.iter().any(|c| same_target(c, &callback)) {
            return Err(BusError::AlreadyRegistered(name.to_string()));
        }
        callbacks.push(callback);
        Ok(())
    }

    /// Detach a callback from an event.
    pub fn unregister_callback(&self, name: &str, callback: &Callback<P>) -> Result<(), BusError> {
        let event = self.event(name)?;
        let mut callbacks = write(&event.callbacks);
        let index = callbacks
            .iter()
            .position(|c| same_target(c, callback))
            .ok_or_else(|| BusError::NotFound(name.to_string()))?;
        callbacks.remove(index);
        Ok(())
    }

    /// Schedule one asynchronous invocation per subscriber and return immediately.
    ///
    /// Returns the number of scheduled invocations. Fails without scheduling
    /// anything if the event is not registered.
    pub fn fire(&self, name: &str, payload: P) -> Result<usize, BusError> {
        let event = self.event(name)?;
        let listeners = read(&event.listeners).clone();
        let callbacks = read(&event.callbacks).clone();
        let dispatched = listeners.len() + callbacks.len();

        for listener in listeners {
            let guards = (self.in_flight.track(), event.in_flight.track());
            let payload = payload.clone();
            tokio::spawn(async move {
                listener.extinguish(payload).await;
                drop(guards);
            });
        }

        for callback in callbacks {
            let guards = (self.in_flight.track(), event.in_flight.track());
            let invocation = callback(event.name.clone(), payload.clone());
            tokio::spawn(async move {
                invocation.await;
                drop(guards);
            });
        }

        tracing::debug!(event = name, dispatched, "Event fired");
        Ok(dispatched)
    }

    /// Invocations still running across all events.
    pub fn in_flight(&self) -> usize {
        self.in_flight.count()
    }

    /// Wait until every scheduled invocation has completed.
    ///
    /// Invocations scheduled by running handlers are registered before their
    /// parent completes, so chained fires are drained too.
    pub async fn flush(&self) {
        tracing::debug!(outstanding = self.in_flight.count(), "Flushing event bus");
        self.in_flight.wait_idle().await;
    }
}

impl<P: Clone + Send + 'static> Default for EventBus<P> {
    fn default() -> Self {
        Self::new()
    }
}

fn same_target<T: ?Sized>(a: &Arc<T>, b: &Arc<T>) -> bool {
    std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b))
}

fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}
