use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use pepper_config::Configuration;
use tokio::sync::Mutex;
use tokio::time::timeout;

use crate::emitter::EmitterFactory;
use crate::error::LifecycleError;
use crate::source::TelemetrySource;
use crate::worker::{Worker, WorkerHandle};

/// Owns at most one running [`Worker`].
///
/// Attach, detach and restart all run under one lock, so callers can never
/// observe two live workers. Stopping is cooperative: a detached worker drops
/// its in-flight fetches at the next await point and never starts another
/// pass. On a multi-threaded runtime a record that already passed its
/// liveness check may still be emitted just after the detach returns.
pub struct LifecycleManager {
    source: Arc<dyn TelemetrySource>,
    emitters: Arc<dyn EmitterFactory>,
    current: Mutex<Option<WorkerHandle>>,
    next_id: AtomicU64,
}

impl LifecycleManager {
    pub fn new(source: Arc<dyn TelemetrySource>, emitters: Arc<dyn EmitterFactory>) -> Self {
        Self {
            source,
            emitters,
            current: Mutex::new(None),
            next_id: AtomicU64::new(1),
        }
    }

    /// Replace the current worker with one built from `config`, as a single
    /// critical section. Returns the new worker's id, or `None` when the
    /// configuration is disabled.
    pub async fn restart(&self, config: Arc<Configuration>) -> Option<u64> {
        let mut current = self.current.lock().await;
        Self::stop_current(&mut current);
        self.attach_locked(&mut current, config)
    }

    /// Start a worker for `config` unless it is disabled.
    pub async fn attach(&self, config: Arc<Configuration>) -> Option<u64> {
        let mut current = self.current.lock().await;
        self.attach_locked(&mut current, config)
    }

    /// Signal the current worker to stop and forget it. Does not wait for the
    /// loop to exit. Returns whether a worker was running.
    pub async fn detach(&self) -> bool {
        let mut current = self.current.lock().await;
        Self::stop_current(&mut current).is_some()
    }

    /// Detach, then wait up to `grace` for the old loop to finish.
    pub async fn shutdown(&self, grace: Duration) -> Result<(), LifecycleError> {
        let handle = {
            let mut current = self.current.lock().await;
            Self::stop_current(&mut current)
        };

        let Some(handle) = handle else {
            return Ok(());
        };

        match timeout(grace, handle.join()).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(error)) => Err(LifecycleError::Join(error.to_string())),
            Err(_) => Err(LifecycleError::ShutdownTimedOut(grace)),
        }
    }

    pub async fn is_running(&self) -> bool {
        self.current.lock().await.is_some()
    }

    pub async fn current_worker_id(&self) -> Option<u64> {
        self.current.lock().await.as_ref().map(WorkerHandle::id)
    }

    pub async fn current_config(&self) -> Option<Arc<Configuration>> {
        self.current
            .lock()
            .await
            .as_ref()
            .map(|handle| Arc::clone(handle.config()))
    }

    fn attach_locked(
        &self,
        current: &mut Option<WorkerHandle>,
        config: Arc<Configuration>,
    ) -> Option<u64> {
        if !config.enabled {
            tracing::info!("fluentd disabled, no worker started");
            return None;
        }

        if let Some(previous) = Self::stop_current(current) {
            tracing::warn!(worker = previous.id(), "attach replaced a running worker");
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let emitter = self.emitters.build(&config);
        let endpoint = config.endpoint();
        let handle = Worker::new(id, config, Arc::clone(&self.source), emitter).spawn();
        *current = Some(handle);

        tracing::info!(worker = id, endpoint = %endpoint, "fluentd enabled, worker attached");
        Some(id)
    }

    fn stop_current(current: &mut Option<WorkerHandle>) -> Option<WorkerHandle> {
        let handle = current.take()?;
        handle.stop();
        tracing::debug!(worker = handle.id(), "worker detached");
        Some(handle)
    }
}
