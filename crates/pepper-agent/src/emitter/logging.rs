use super::Emitter;
use crate::sample::MetricSample;

/// Writes records to the process log instead of a collector.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingEmitter;

impl Emitter for TracingEmitter {
    fn log(&self, tag: &str, fields: &MetricSample) {
        match serde_json::to_string(fields) {
            Ok(record) => tracing::info!(tag, %record, "record"),
            Err(error) => tracing::warn!(tag, error = %error, "failed to encode record"),
        }
    }
}
