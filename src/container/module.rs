//! The container module.
//!
//! Discovers the installable templates at `init`. A host without templates
//! is not an error for the daemon; the list simply stays empty.

use async_trait::async_trait;
use std::sync::{Arc, Mutex, PoisonError};

use crate::container::templates::{discover, TemplateBackend};
use crate::event::Payload;
use crate::module::{EventRole, Module, ModuleError};

pub struct ContainerModule {
    backend: Arc<dyn TemplateBackend>,
    templates: Mutex<Vec<String>>,
}

impl ContainerModule {
    pub fn new(backend: Arc<dyn TemplateBackend>) -> Self {
        Self {
            backend,
            templates: Mutex::new(Vec::new()),
        }
    }

    /// Templates found during `init`.
    pub fn templates(&self) -> Vec<String> {
        self.templates.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

#[async_trait]
impl Module for ContainerModule {
    fn name(&self) -> &'static str {
        "container"
    }

    fn events(&self, _role: EventRole) -> &'static [&'static str] {
        &[]
    }

    async fn init(&self) -> Result<(), ModuleError> {
        let backend = Arc::clone(&self.backend);
        let found = match tokio::task::spawn_blocking(move || discover(backend.as_ref())).await {
            Ok(found) => found,
            Err(e) => {
                tracing::warn!(error = %e, "Template discovery did not finish");
                return Ok(());
            }
        };
        match found {
            Ok(templates) => {
                tracing::info!(count = templates.len(), templates = ?templates, "Container templates found");
                *self.templates.lock().unwrap_or_else(PoisonError::into_inner) = templates;
            }
            Err(e) => tracing::warn!(error = %e, "No container templates"),
        }
        Ok(())
    }

    async fn start(&self) -> Result<(), ModuleError> {
        Ok(())
    }

    async fn stop(&self) -> Result<(), ModuleError> {
        Ok(())
    }

    async fn event(&self, name: &str, payload: Payload) {
        tracing::debug!(event = name, payload = payload.kind(), "Ignoring event");
    }
}
