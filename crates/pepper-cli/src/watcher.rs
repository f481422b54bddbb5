//! Config file change detection.
//!
//! The file is polled by modification time and size. A change reloads the
//! file and hands the result to [`MonitorService::on_configuration_changed`];
//! a file that fails to load leaves the running worker untouched.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use pepper_agent::MonitorService;
use pepper_config::load_config_from_file;
use tokio::time::MissedTickBehavior;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Fingerprint {
    modified: Option<SystemTime>,
    len: u64,
}

fn fingerprint(path: &Path) -> Option<Fingerprint> {
    let metadata = fs::metadata(path).ok()?;
    Some(Fingerprint {
        modified: metadata.modified().ok(),
        len: metadata.len(),
    })
}

pub struct ConfigWatcher {
    path: PathBuf,
    last: Option<Fingerprint>,
}

impl ConfigWatcher {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let last = fingerprint(&path);
        Self { path, last }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether the file changed since the previous check. A file that
    /// disappears is not a change; it counts again once it reappears.
    pub fn poll_changed(&mut self) -> bool {
        let current = fingerprint(&self.path);
        if current == self.last {
            return false;
        }
        self.last = current;
        current.is_some()
    }
}

/// Reload `path` into `service`. Returns whether the new configuration was
/// applied.
pub async fn reload(path: &Path, service: &MonitorService) -> bool {
    match load_config_from_file(path) {
        Ok(resolved) => {
            let worker = service
                .on_configuration_changed(resolved.configuration())
                .await;
            tracing::info!(path = %path.display(), worker = ?worker, "configuration reloaded");
            true
        }
        Err(error) => {
            tracing::warn!(
                path = %path.display(),
                error = %format!("{:#}", error),
                "keeping current configuration"
            );
            false
        }
    }
}

/// Poll `path` every `period` until the task is aborted.
pub async fn watch(path: PathBuf, period: Duration, service: Arc<MonitorService>) {
    let mut watcher = ConfigWatcher::new(path);
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ticker.tick().await;

    tracing::debug!(path = %watcher.path().display(), "watching configuration file");

    loop {
        ticker.tick().await;
        if watcher.poll_changed() {
            tracing::info!(path = %watcher.path().display(), "configuration file changed");
            reload(watcher.path(), &service).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pepper_agent::testing::{RecordingEmitter, ScriptedSource};
    use pepper_agent::{Configuration, LifecycleManager};
    use std::fs::File;
    use tempfile::TempDir;

    fn service() -> Arc<MonitorService> {
        let emitter = RecordingEmitter::new();
        let manager = LifecycleManager::new(Arc::new(ScriptedSource::new()), emitter.factory());
        Arc::new(MonitorService::new(manager, Configuration::default()))
    }

    #[test]
    fn test_poll_changed_detects_rewrite() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("pepper-monitor.json");
        fs::write(&path, "{}").unwrap();

        let mut watcher = ConfigWatcher::new(&path);
        assert!(!watcher.poll_changed());

        let file = File::options().write(true).open(&path).unwrap();
        file.set_modified(SystemTime::now() + Duration::from_secs(60))
            .unwrap();
        assert!(watcher.poll_changed());
        assert!(!watcher.poll_changed());
    }

    #[test]
    fn test_removed_file_is_not_a_change() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("pepper-monitor.json");
        fs::write(&path, "{}").unwrap();

        let mut watcher = ConfigWatcher::new(&path);
        fs::remove_file(&path).unwrap();
        assert!(!watcher.poll_changed());

        fs::write(&path, r#"{"enable_fluentd": true}"#).unwrap();
        assert!(watcher.poll_changed());
    }

    #[tokio::test]
    async fn test_reload_applies_valid_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("pepper-monitor.json");
        fs::write(
            &path,
            r#"{"enable_fluentd": true, "tag_prefix": "lab", "interval_sec": 5}"#,
        )
        .unwrap();
        let service = service();

        assert!(reload(&path, &service).await);

        let config = service.configuration().await;
        assert!(config.enabled);
        assert_eq!(config.tag_prefix, "lab");
        assert!(service.manager().is_running().await);
        service.stop().await;
    }

    #[tokio::test]
    async fn test_reload_keeps_config_on_invalid_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("pepper-monitor.json");
        fs::write(&path, "{ not json").unwrap();
        let service = service();

        assert!(!reload(&path, &service).await);
        assert_eq!(*service.configuration().await, Configuration::default());
    }

    #[tokio::test(start_paused = true)]
    async fn test_watch_reloads_on_change() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("pepper-monitor.json");
        fs::write(&path, "{}").unwrap();
        let service = service();

        let task = tokio::spawn(watch(path.clone(), Duration::from_secs(1), service.clone()));
        tokio::time::sleep(Duration::from_millis(100)).await;

        fs::write(&path, r#"{"enable_fluentd": true, "tag_prefix": "watched"}"#).unwrap();
        tokio::time::sleep(Duration::from_millis(1500)).await;

        assert_eq!(service.configuration().await.tag_prefix, "watched");
        task.abort();
        service.stop().await;
    }
}
