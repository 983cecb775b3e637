//! Startup orchestration.
//!
//! # Responsibilities
//! - Build the bus, the live tree and every module from [`Settings`]
//! - Run the registry's startup phases
//! - Decide whether recorded module errors abort the process
//!
//! # Design Decisions
//! - Modules are registered in a fixed order: config, server, network, backingstore, container
//! - Wiring errors always abort; module errors abort only for modules listed in `abort_on`
//! - Bridges are managed through the in-memory backend, which always creates them

use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use crate::backingstore::{BackingStoreModule, RetryPolicy, StoreOptions};
use crate::config::settings::Settings;
use crate::config::store::ConfigStore;
use crate::config::ConfigModel;
use crate::container::{ContainerModule, SystemTemplates};
use crate::control::{ListenOptions, ServerModule};
use crate::event::Bus;
use crate::module::{ModuleError, ModuleRegistry, RegistryError};
use crate::network::{BridgeBackend, MemoryBridges, NetworkModule};

/// Errors that end the boot sequence.
#[derive(Debug, Error)]
pub enum BootError {
    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error("module {module} failed: {source}")]
    Module {
        module: String,
        #[source]
        source: ModuleError,
    },
}

/// A running daemon.
pub struct Daemon {
    registry: ModuleRegistry,
    store: Arc<ConfigStore>,
    bus: Arc<Bus>,
    server: Arc<ServerModule>,
    network: Arc<NetworkModule>,
    backing_store: Arc<BackingStoreModule>,
    container: Arc<ContainerModule>,
}

impl Daemon {
    /// The live tree shared with the configuration module.
    pub fn store(&self) -> &Arc<ConfigStore> {
        &self.store
    }

    pub fn bus(&self) -> &Arc<Bus> {
        &self.bus
    }

    pub fn server(&self) -> &Arc<ServerModule> {
        &self.server
    }

    pub fn network(&self) -> &Arc<NetworkModule> {
        &self.network
    }

    pub fn backing_store(&self) -> &Arc<BackingStoreModule> {
        &self.backing_store
    }

    pub fn container(&self) -> &Arc<ContainerModule> {
        &self.container
    }

    pub fn registry(&self) -> &ModuleRegistry {
        &self.registry
    }

    /// Stop every module and unwire the bus.
    pub async fn shutdown(mut self) {
        tracing::info!("Shutting down");
        self.registry.stop_all().await;
    }
}

/// Build, wire and start every module.
pub async fn boot(settings: &Settings) -> Result<Daemon, BootError> {
    let bus = Arc::new(Bus::new());
    let store = Arc::new(ConfigStore::new());

    let config = Arc::new(ConfigModel::new(
        Arc::clone(&store),
        Arc::clone(&bus),
        settings.config_paths.clone(),
    ));
    let server = Arc::new(ServerModule::new(
        Arc::clone(&bus),
        ListenOptions {
            host: settings.listen_host.clone(),
            max_connections: settings.max_connections,
        },
    ));
    let bridges = Arc::new(MemoryBridges::new());
    let fix_network = settings.fix_network || bridges.is_simulated();
    if fix_network && !settings.fix_network {
        tracing::info!("Bridges are simulated; creating them regardless of fix_network");
    }
    let network = Arc::new(NetworkModule::new(bridges, fix_network));
    let backing_store = Arc::new(BackingStoreModule::new(StoreOptions {
        listen_host: settings.listen_host.clone(),
        max_connections: settings.max_connections,
        retry: RetryPolicy::fixed(Duration::from_secs(settings.replication_retry_secs)),
    }));
    let container = Arc::new(ContainerModule::new(Arc::new(SystemTemplates::from_env())));

    let mut registry = ModuleRegistry::new(Arc::clone(&bus));
    registry.register(config)?;
    registry.register(server.clone())?;
    registry.register(network.clone())?;
    registry.register(backing_store.clone())?;
    registry.register(container.clone())?;

    tracing::info!(modules = ?registry.names(), "Starting modules");
    registry.start_all().await?;

    let mut daemon = Daemon {
        registry,
        store,
        bus,
        server,
        network,
        backing_store,
        container,
    };

    if let Some(failed) = first_fatal(&mut daemon.registry, &settings.abort_on)? {
        daemon.registry.stop_all().await;
        return Err(failed);
    }

    tracing::info!(state = ?daemon.store.state(), "Daemon started");
    Ok(daemon)
}

fn first_fatal(registry: &mut ModuleRegistry, abort_on: &[String]) -> Result<Option<BootError>, BootError> {
    for module in abort_on {
        if let Some(source) = registry.take_error(module)? {
            tracing::error!(module = %module, error = %source, "Fatal module error");
            return Ok(Some(BootError::Module {
                module: module.clone(),
                source,
            }));
        }
    }
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::store::TreeState;
    use std::path::PathBuf;

    fn settings(paths: Vec<PathBuf>) -> Settings {
        Settings {
            config_paths: paths,
            listen_host: "127.0.0.1".into(),
            ..Settings::default()
        }
    }

    #[tokio::test]
    async fn missing_configuration_aborts_boot() {
        let err = boot(&settings(vec![PathBuf::from("/nonexistent/fleetd.xml")]))
            .await
            .err()
            .unwrap();
        assert!(matches!(err, BootError::Module { ref module, .. } if module == "config"));
    }

    #[tokio::test]
    async fn tolerated_failures_keep_the_daemon_running() {
        let mut settings = settings(vec![PathBuf::from("/nonexistent/fleetd.xml")]);
        settings.abort_on.clear();

        let daemon = boot(&settings).await.unwrap();
        assert_eq!(daemon.store().state(), TreeState::BootFailed);
        assert!(daemon.registry().error("config").unwrap().is_some());
        daemon.shutdown().await;
    }

    #[tokio::test]
    async fn simulated_bridges_start_cleanly_by_default() {
        let dir = std::env::temp_dir().join(format!("fleetd-startup-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("topology.xml");
        std::fs::write(
            &path,
            r#"<config name="lab">
  <server name="s1">
    <ipv4><port>0</port></ipv4>
    <network name="net1">
      <type>production</type>
      <ipv4><address>10.0.0.1</address><subnet>255.255.255.0</subnet></ipv4>
      <gateway><ipv4><address>10.0.0.254</address></ipv4></gateway>
    </network>
  </server>
</config>"#,
        )
        .unwrap();

        let settings = settings(vec![path]);
        assert!(!settings.fix_network);
        let daemon = boot(&settings).await.unwrap();
        assert!(daemon.registry().error("network").unwrap().is_none());
        assert!(daemon.registry().error("container").unwrap().is_none());
        assert_eq!(daemon.network().networks(), ["net1"]);
        daemon.shutdown().await;
        std::fs::remove_dir_all(&dir).ok();
    }
}
