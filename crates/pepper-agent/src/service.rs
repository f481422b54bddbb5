use std::sync::Arc;
use std::time::Duration;

use pepper_config::Configuration;
use tokio::sync::Mutex;

use crate::error::LifecycleError;
use crate::lifecycle::LifecycleManager;

/// Process-level entry points: start, stop and configuration changes.
///
/// The configuration lock is held across the restart so concurrent changes
/// are applied in the order their lock acquisitions complete and the running
/// worker always matches the stored configuration.
pub struct MonitorService {
    manager: LifecycleManager,
    config: Mutex<Arc<Configuration>>,
}

impl MonitorService {
    pub fn new(manager: LifecycleManager, config: Configuration) -> Self {
        Self {
            manager,
            config: Mutex::new(Arc::new(config)),
        }
    }

    /// (Re)start forwarding with the current configuration.
    pub async fn start(&self) -> Option<u64> {
        let config = self.config.lock().await;
        self.manager.restart(Arc::clone(&config)).await
    }

    /// Stop forwarding. Does not wait for the worker to exit.
    pub async fn stop(&self) {
        self.manager.detach().await;
    }

    /// Store `config` and rebuild the worker from it.
    pub async fn on_configuration_changed(&self, config: Configuration) -> Option<u64> {
        tracing::info!("configuration changed");
        let mut current = self.config.lock().await;
        *current = Arc::new(config);
        self.manager.restart(Arc::clone(&current)).await
    }

    pub async fn configuration(&self) -> Arc<Configuration> {
        Arc::clone(&*self.config.lock().await)
    }

    pub fn manager(&self) -> &LifecycleManager {
        &self.manager
    }

    /// Stop forwarding and wait up to `grace` for the worker to exit.
    pub async fn shutdown(&self, grace: Duration) -> Result<(), LifecycleError> {
        self.manager.shutdown(grace).await
    }
}
