//! In-memory sources and emitters for exercising workers without a robot or
//! a collector.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use pepper_config::Configuration;

use crate::emitter::{Emitter, EmitterFactory};
use crate::error::SourceError;
use crate::sample::MetricSample;
use crate::source::{Reading, TelemetrySource};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Source answering from a fixed table, with optional scripted failures.
///
/// Unknown keys read as [`Reading::Absent`].
#[derive(Default)]
pub struct ScriptedSource {
    values: HashMap<String, Reading>,
    failing_keys: HashSet<String>,
    hanging_keys: HashSet<String>,
    panicking_keys: HashSet<String>,
    fail_every: Option<usize>,
    calls: AtomicUsize,
}

impl ScriptedSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_value(self, key: &str, value: f64) -> Self {
        self.with_reading(key, Reading::number(value))
    }

    pub fn with_reading(mut self, key: &str, reading: Reading) -> Self {
        self.values.insert(key.to_string(), reading);
        self
    }

    /// Every fetch of `key` fails.
    pub fn with_failing_key(mut self, key: &str) -> Self {
        self.failing_keys.insert(key.to_string());
        self
    }

    /// Fetches of `key` never complete.
    pub fn with_hanging_key(mut self, key: &str) -> Self {
        self.hanging_keys.insert(key.to_string());
        self
    }

    /// Fetches of `key` panic.
    pub fn with_panicking_key(mut self, key: &str) -> Self {
        self.panicking_keys.insert(key.to_string());
        self
    }

    /// Every `n`th call (the 2nd, 4th, ... for `n = 2`) fails as unavailable.
    pub fn failing_every(mut self, n: usize) -> Self {
        self.fail_every = Some(n.max(1));
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TelemetrySource for ScriptedSource {
    async fn fetch_value(&self, key: &str) -> Result<Reading, SourceError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;

        if self.hanging_keys.contains(key) {
            std::future::pending::<()>().await;
        }
        if self.panicking_keys.contains(key) {
            panic!("scripted panic while fetching {}", key);
        }
        if self.failing_keys.contains(key) {
            return Err(SourceError::Fetch {
                key: key.to_string(),
                message: "scripted failure".to_string(),
            });
        }
        if let Some(n) = self.fail_every {
            if call % n == 0 {
                return Err(SourceError::Unavailable(format!(
                    "scripted outage on call {}",
                    call
                )));
            }
        }

        Ok(self
            .values
            .get(key)
            .cloned()
            .unwrap_or(Reading::Absent))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct EmittedRecord {
    pub tag: String,
    pub fields: MetricSample,
}

/// Emitter that keeps every record in memory.
#[derive(Default)]
pub struct RecordingEmitter {
    records: Mutex<Vec<EmittedRecord>>,
}

impl RecordingEmitter {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn records(&self) -> Vec<EmittedRecord> {
        lock(&self.records).clone()
    }

    pub fn tags(&self) -> Vec<String> {
        lock(&self.records).iter().map(|r| r.tag.clone()).collect()
    }

    pub fn count(&self) -> usize {
        lock(&self.records).len()
    }

    /// A factory handing this same recorder to every worker.
    pub fn factory(self: &Arc<Self>) -> Arc<dyn EmitterFactory> {
        let emitter = Arc::clone(self);
        Arc::new(move |_: &Configuration| emitter.clone() as Arc<dyn Emitter>)
    }
}

impl Emitter for RecordingEmitter {
    fn log(&self, tag: &str, fields: &MetricSample) {
        lock(&self.records).push(EmittedRecord {
            tag: tag.to_string(),
            fields: fields.clone(),
        });
    }
}
