//! Ordered bring-up and tear-down of registered modules.

use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

use crate::event::{callback, Bus, BusError, Callback, Payload};
use crate::module::{EventRole, Module, ModuleError};

/// Errors from registry operations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("module name must not be empty")]
    EmptyName,

    #[error("module {0} already registered")]
    AlreadyRegistered(String),

    #[error("module {0} not found")]
    NotFound(String),

    /// Two modules declared the same event as active.
    #[error("event {event} is published by both {first} and {second}")]
    EventCollision {
        event: String,
        first: String,
        second: String,
    },

    /// A module subscribed to an event no module publishes.
    #[error("module {module} cannot subscribe: {source}")]
    Subscribe {
        module: String,
        #[source]
        source: BusError,
    },
}

struct Entry {
    module: Arc<dyn Module>,
    /// The callback registered for every passive event, kept for unregistration.
    handler: Callback<Payload>,
    error: Option<ModuleError>,
}

/// Owns the modules and sequences them around the bus.
pub struct ModuleRegistry {
    bus: Arc<Bus>,
    modules: Vec<Entry>,
}

impl ModuleRegistry {
    /// Create an empty registry wired to `bus`.
    pub fn new(bus: Arc<Bus>) -> Self {
        Self {
            bus,
            modules: Vec::new(),
        }
    }

    /// Add a module. Names must be unique.
    pub fn register(&mut self, module: Arc<dyn Module>) -> Result<(), RegistryError> {
        let name = module.name();
        if name.is_empty() {
            return Err(RegistryError::EmptyName);
        }
        if self.find(name).is_some() {
            return Err(RegistryError::AlreadyRegistered(name.to_string()));
        }

        let target = Arc::clone(&module);
        let handler = callback(move |event: String, payload: Payload| {
            let target = Arc::clone(&target);
            async move { target.event(&event, payload).await }
        });

        tracing::info!(module = name, "Module registered");
        self.modules.push(Entry {
            module,
            handler,
            error: None,
        });
        Ok(())
    }

    /// Names of all registered modules in registration order.
    pub fn names(&self) -> Vec<&'static str> {
        self.modules.iter().map(|e| e.module.name()).collect()
    }

    /// Last error recorded for a module by `init`, `start` or `stop`.
    pub fn error(&self, name: &str) -> Result<Option<&ModuleError>, RegistryError> {
        self.find(name)
            .map(|entry| entry.error.as_ref())
            .ok_or_else(|| RegistryError::NotFound(name.to_string()))
    }

    /// Remove and return the error recorded for a module.
    pub fn take_error(&mut self, name: &str) -> Result<Option<ModuleError>, RegistryError> {
        self.modules
            .iter_mut()
            .find(|e| e.module.name() == name)
            .map(|entry| entry.error.take())
            .ok_or_else(|| RegistryError::NotFound(name.to_string()))
    }

    /// Run the four startup phases.
    ///
    /// Returns early only for wiring errors (phases 1 and 2). Lifecycle errors
    /// are recorded and can be read back with [`ModuleRegistry::error`].
    pub async fn start_all(&mut self) -> Result<(), RegistryError> {
        // 1. active events
        let mut publishers: HashMap<&'static str, &'static str> = HashMap::new();
        for entry in &self.modules {
            let name = entry.module.name();
            for event in entry.module.events(EventRole::Active) {
                if let Some(first) = publishers.insert(*event, name) {
                    return Err(RegistryError::EventCollision {
                        event: event.to_string(),
                        first: first.to_string(),
                        second: name.to_string(),
                    });
                }
                self.bus.register_event(event);
                tracing::debug!(module = name, event, "Active event registered");
            }
        }

        // 2. passive events
        for entry in &self.modules {
            let name = entry.module.name();
            for event in entry.module.events(EventRole::Passive) {
                self.bus
                    .register_callback(event, Arc::clone(&entry.handler))
                    .map_err(|source| RegistryError::Subscribe {
                        module: name.to_string(),
                        source,
                    })?;
                tracing::debug!(module = name, event, "Passive event registered");
            }
        }

        // 3. init, then drain everything init fired
        for entry in &mut self.modules {
            let name = entry.module.name();
            entry.error = entry.module.init().await.err();
            match &entry.error {
                None => tracing::info!(module = name, "Module initialized"),
                Some(e) => tracing::error!(module = name, error = %e, "Module init failed"),
            }
        }
        self.bus.flush().await;

        // 4. start
        for entry in &mut self.modules {
            if entry.error.is_some() {
                continue;
            }
            let name = entry.module.name();
            entry.error = entry.module.start().await.err();
            match &entry.error {
                None => tracing::info!(module = name, "Module started"),
                Some(e) => tracing::error!(module = name, error = %e, "Module start failed"),
            }
        }

        Ok(())
    }

    /// Stop every module, then unwire it from the bus.
    pub async fn stop_all(&mut self) {
        for entry in &mut self.modules {
            let name = entry.module.name();
            if let Err(e) = entry.module.stop().await {
                tracing::warn!(module = name, error = %e, "Module stop failed");
                entry.error = Some(e);
            }
        }

        for entry in &self.modules {
            for event in entry.module.events(EventRole::Passive) {
                if let Err(e) = self.bus.unregister_callback(event, &entry.handler) {
                    tracing::debug!(module = entry.module.name(), event, error = %e, "Callback already gone");
                }
            }
        }

        for entry in &self.modules {
            for event in entry.module.events(EventRole::Active) {
                if let Err(e) = self.bus.unregister_event(event) {
                    tracing::debug!(module = entry.module.name(), event, error = %e, "Event already gone");
                }
            }
        }

        tracing::info!(modules = self.modules.len(), "All modules stopped");
    }

    fn find(&self, name: &str) -> Option<&Entry> {
        self.modules.iter().find(|e| e.module.name() == name)
    }
}
