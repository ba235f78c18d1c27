//! Application-owned home of the connection manager
//!
//! The application root creates one `ManagerSlot` and passes it (or the
//! manager it hands out) to consumers. The manager is built on first access,
//! exactly once, even when that first access is concurrent.

use crate::broadcast::StatusBroadcasts;
use crate::config::LinkConfig;
use crate::connection::manager::ConnectionManager;
use crate::connector::ConnectorFactory;
use crate::presence::CompanionRegistry;
use std::sync::{Arc, OnceLock};
use tracing::info;

pub struct ManagerSlot {
    config: LinkConfig,
    registry: Arc<dyn CompanionRegistry>,
    factory: Arc<dyn ConnectorFactory>,
    broadcasts: StatusBroadcasts,
    manager: OnceLock<Arc<ConnectionManager>>,
}

impl ManagerSlot {
    pub fn new(
        config: LinkConfig,
        registry: Arc<dyn CompanionRegistry>,
        factory: Arc<dyn ConnectorFactory>,
        broadcasts: StatusBroadcasts,
    ) -> Self {
        Self {
            config,
            registry,
            factory,
            broadcasts,
            manager: OnceLock::new(),
        }
    }

    /// The shared manager, created on first call
    pub fn get(&self) -> Arc<ConnectionManager> {
        self.manager
            .get_or_init(|| {
                Arc::new(ConnectionManager::new(
                    self.config.clone(),
                    self.registry.clone(),
                    self.factory.clone(),
                    self.broadcasts.clone(),
                ))
            })
            .clone()
    }

    /// Whether the manager has been created yet
    pub fn is_created(&self) -> bool {
        self.manager.get().is_some()
    }

    /// Make sure the manager exists, then start the device session
    pub async fn connect_to_pump(&self) {
        info!("Attempting to connect to pump");
        self.get().connect_to_pump().await;
    }
}
