use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use pepper_config::Configuration;
use tokio::sync::Notify;
use tokio::task::{JoinError, JoinHandle};

use crate::emitter::Emitter;
use crate::sampler::Sampler;
use crate::source::TelemetrySource;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    Created,
    Running,
    Stopped,
}

/// Outcome of one polling pass over all groups.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IterationReport {
    pub emitted: usize,
    pub failed: usize,
}

/// Liveness flag shared by a worker task and its handle. Only `stop` writes it.
#[derive(Debug)]
struct StopSignal {
    alive: AtomicBool,
    wake: Notify,
}

impl StopSignal {
    fn new() -> Self {
        Self {
            alive: AtomicBool::new(true),
            wake: Notify::new(),
        }
    }

    fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    fn stop(&self) {
        self.alive.store(false, Ordering::SeqCst);
        self.wake.notify_waiters();
    }

    /// Resolves once `stop` has been called.
    async fn stopped(&self) {
        let notified = self.wake.notified();
        tokio::pin!(notified);
        // must be registered before the flag is read
        notified.as_mut().enable();
        if !self.is_alive() {
            return;
        }
        notified.await;
    }

    /// Sleep for `interval`, or less if a stop arrives meanwhile.
    async fn pace(&self, interval: Duration) -> bool {
        tokio::select! {
            _ = tokio::time::sleep(interval) => true,
            _ = self.stopped() => false,
        }
    }
}

/// A polling loop bound to one configuration. Consumed by [`Worker::spawn`];
/// a stopped worker is never restarted.
pub struct Worker {
    id: u64,
    config: Arc<Configuration>,
    sampler: Sampler,
    emitter: Arc<dyn Emitter>,
}

impl Worker {
    pub fn new(
        id: u64,
        config: Arc<Configuration>,
        source: Arc<dyn TelemetrySource>,
        emitter: Arc<dyn Emitter>,
    ) -> Self {
        let sampler = Sampler::new(source, config.fetch_timeout(), config.key_error_policy);
        Self {
            id,
            config,
            sampler,
            emitter,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn state(&self) -> WorkerState {
        WorkerState::Created
    }

    /// Start the loop on its own task.
    pub fn spawn(self) -> WorkerHandle {
        let signal = Arc::new(StopSignal::new());
        let id = self.id;
        let config = Arc::clone(&self.config);
        let task = tokio::spawn(self.run(Arc::clone(&signal)));

        WorkerHandle {
            id,
            config,
            signal,
            task,
        }
    }

    async fn run(self, signal: Arc<StopSignal>) {
        tracing::info!(
            worker = self.id,
            interval_secs = self.config.interval_secs,
            groups = self.config.groups.len(),
            "worker started"
        );

        while signal.is_alive() {
            tracing::debug!(worker = self.id, "sending events");
            let iteration = AssertUnwindSafe(self.poll_once(&signal)).catch_unwind();
            tokio::select! {
                outcome = iteration => match outcome {
                    Ok(report) => tracing::debug!(
                        worker = self.id,
                        emitted = report.emitted,
                        failed = report.failed,
                        "polling pass finished"
                    ),
                    Err(panic) => tracing::error!(
                        worker = self.id,
                        panic = %panic_message(panic.as_ref()),
                        "polling pass panicked"
                    ),
                },
                _ = signal.stopped() => {
                    tracing::debug!(worker = self.id, "stopped mid-pass, pending fetches dropped");
                    break;
                }
            }

            if !signal.pace(self.config.interval()).await {
                tracing::debug!(worker = self.id, "pacing sleep interrupted");
            }
        }

        tracing::info!(worker = self.id, "worker stopped");
    }

    /// Sample and emit every group once. Never fails: a group that cannot be
    /// sampled is logged and skipped, the remaining groups still go out.
    async fn poll_once(&self, signal: &StopSignal) -> IterationReport {
        let mut report = IterationReport::default();

        for group in &self.config.groups {
            match self.sampler.sample_group(group).await {
                Ok(sample) => {
                    if !signal.is_alive() {
                        tracing::debug!(worker = self.id, "stopped mid-pass, discarding samples");
                        break;
                    }
                    let tag = self.config.qualified_tag(&group.name);
                    self.emitter.log(&tag, &sample);
                    report.emitted += 1;
                }
                Err(error) => {
                    tracing::warn!(
                        worker = self.id,
                        group = %group.name,
                        error = %error,
                        "failed to sample metric group"
                    );
                    report.failed += 1;
                }
            }
        }

        report
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Handle to a spawned worker. Dropping it does not stop the worker.
pub struct WorkerHandle {
    id: u64,
    config: Arc<Configuration>,
    signal: Arc<StopSignal>,
    task: JoinHandle<()>,
}

impl WorkerHandle {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn config(&self) -> &Arc<Configuration> {
        &self.config
    }

    /// Ask the loop to exit. Returns immediately. In-flight fetches are
    /// dropped at their next await point and the pacing sleep is cut short.
    pub fn stop(&self) {
        self.signal.stop();
    }

    pub fn is_alive(&self) -> bool {
        self.signal.is_alive()
    }

    pub fn state(&self) -> WorkerState {
        if self.task.is_finished() {
            WorkerState::Stopped
        } else {
            WorkerState::Running
        }
    }

    /// Wait for the loop to exit. Does not stop it.
    pub async fn join(self) -> Result<(), JoinError> {
        self.task.await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{RecordingEmitter, ScriptedSource};
    use pepper_config::{KeyErrorPolicy, MetricGroup};

    fn config(groups: Vec<MetricGroup>) -> Arc<Configuration> {
        Arc::new(
            Configuration::default()
                .with_enabled(true)
                .with_interval_secs(1)
                .with_groups(groups),
        )
    }

    fn worker(
        config: Arc<Configuration>,
        source: ScriptedSource,
        emitter: &Arc<RecordingEmitter>,
    ) -> Worker {
        Worker::new(1, config, Arc::new(source), emitter.clone())
    }

    #[tokio::test]
    async fn test_poll_once_emits_each_group_under_prefixed_tag() {
        let emitter = RecordingEmitter::new();
        let source = ScriptedSource::new()
            .with_value("charge", 0.5)
            .with_value("load", 2.0);
        let worker = worker(
            config(vec![
                MetricGroup::new("battery", ["charge"]),
                MetricGroup::new("cpu", ["load"]),
            ]),
            source,
            &emitter,
        );

        let report = worker.poll_once(&StopSignal::new()).await;

        assert_eq!(report, IterationReport { emitted: 2, failed: 0 });
        assert_eq!(emitter.tags(), vec!["pepper.battery", "pepper.cpu"]);
    }

    #[tokio::test]
    async fn test_failed_group_does_not_block_later_groups() {
        let emitter = RecordingEmitter::new();
        let source = ScriptedSource::new()
            .with_failing_key("charge")
            .with_value("load", 2.0);
        let worker = worker(
            config(vec![
                MetricGroup::new("battery", ["charge"]),
                MetricGroup::new("cpu", ["load"]),
            ]),
            source,
            &emitter,
        );

        let report = worker.poll_once(&StopSignal::new()).await;

        assert_eq!(report, IterationReport { emitted: 1, failed: 1 });
        assert_eq!(emitter.tags(), vec!["pepper.cpu"]);
    }

    #[tokio::test]
    async fn test_stopped_signal_discards_pending_emissions() {
        let emitter = RecordingEmitter::new();
        let source = ScriptedSource::new().with_value("charge", 0.5);
        let worker = worker(
            config(vec![MetricGroup::new("battery", ["charge"])]),
            source,
            &emitter,
        );
        let signal = StopSignal::new();
        signal.stop();

        let report = worker.poll_once(&signal).await;

        assert_eq!(report.emitted, 0);
        assert_eq!(emitter.count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_worker_runs_until_stopped() {
        let emitter = RecordingEmitter::new();
        let source = ScriptedSource::new().with_value("charge", 0.5);
        let worker = worker(
            config(vec![MetricGroup::new("battery", ["charge"])]),
            source,
            &emitter,
        );
        assert_eq!(worker.state(), WorkerState::Created);

        let handle = worker.spawn();
        assert_eq!(handle.state(), WorkerState::Running);

        tokio::time::sleep(Duration::from_millis(2500)).await;
        assert_eq!(emitter.count(), 3);
        assert_eq!(handle.state(), WorkerState::Running);

        handle.stop();
        assert!(!handle.is_alive());
        handle.join().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_interrupts_pacing_sleep() {
        let emitter = RecordingEmitter::new();
        let source = ScriptedSource::new().with_value("charge", 0.5);
        let config = Arc::new(
            Configuration::default()
                .with_enabled(true)
                .with_interval_secs(3600)
                .with_groups(vec![MetricGroup::new("battery", ["charge"])]),
        );
        let handle = Worker::new(7, config, Arc::new(source), emitter.clone()).spawn();

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(emitter.count(), 1);

        let started = tokio::time::Instant::now();
        handle.stop();
        handle.join().await.unwrap();
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_panicking_source_does_not_kill_worker() {
        let emitter = RecordingEmitter::new();
        let source = ScriptedSource::new()
            .with_panicking_key("broken")
            .with_value("load", 1.0);
        let handle = worker(
            config(vec![
                MetricGroup::new("bad", ["broken"]),
                MetricGroup::new("cpu", ["load"]),
            ]),
            source,
            &emitter,
        )
        .spawn();

        tokio::time::sleep(Duration::from_millis(3500)).await;

        assert_eq!(handle.state(), WorkerState::Running);
        handle.stop();
        handle.join().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_cuts_short_hung_group_under_skip_key() {
        let emitter = RecordingEmitter::new();
        let keys = ["k1", "k2", "k3", "k4", "k5"];
        let source = keys
            .iter()
            .fold(ScriptedSource::new(), |source, key| source.with_hanging_key(key));
        let config = Arc::new(
            Configuration::default()
                .with_enabled(true)
                .with_interval_secs(1)
                .with_key_error_policy(KeyErrorPolicy::SkipKey)
                .with_groups(vec![MetricGroup::new("stalled", keys)]),
        );
        let handle = Worker::new(3, config, Arc::new(source), emitter.clone()).spawn();
        tokio::time::sleep(Duration::from_millis(10)).await;

        let started = tokio::time::Instant::now();
        handle.stop();
        handle.join().await.unwrap();

        assert!(started.elapsed() < Duration::from_secs(1));
        assert_eq!(emitter.count(), 0);
    }

    #[tokio::test]
    async fn test_stopped_resolves_after_stop() {
        let signal = StopSignal::new();
        signal.stop();
        signal.stopped().await;
        assert!(!signal.pace(Duration::from_secs(3600)).await);
    }

    #[test]
    fn test_panic_message() {
        assert_eq!(panic_message(&"boom"), "boom");
        assert_eq!(panic_message(&"boom".to_string()), "boom");
        assert_eq!(panic_message(&42_u8), "unknown panic");
    }
}
