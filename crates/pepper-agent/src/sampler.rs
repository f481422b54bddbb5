use std::sync::Arc;
use std::time::Duration;

use pepper_config::{KeyErrorPolicy, MetricGroup};
use tokio::time::timeout;

use crate::error::SampleError;
use crate::sample::MetricSample;
use crate::source::TelemetrySource;

/// Turns a metric group into a [`MetricSample`] by querying the source key
/// by key.
pub struct Sampler {
    source: Arc<dyn TelemetrySource>,
    fetch_timeout: Duration,
    policy: KeyErrorPolicy,
}

impl Sampler {
    pub fn new(
        source: Arc<dyn TelemetrySource>,
        fetch_timeout: Duration,
        policy: KeyErrorPolicy,
    ) -> Self {
        Self {
            source,
            fetch_timeout,
            policy,
        }
    }

    /// Sample every metric of `group`, in declaration order.
    ///
    /// Keys without data become absent fields. A hard fetch error or timeout
    /// either aborts the group or is recorded as absent, depending on the
    /// [`KeyErrorPolicy`].
    pub async fn sample_group(&self, group: &MetricGroup) -> Result<MetricSample, SampleError> {
        let mut sample = MetricSample::new();

        for metric in group.keys() {
            match self.fetch(&metric.key).await {
                Ok(value) => sample.insert(metric.field, value),
                Err(error) => match self.policy {
                    KeyErrorPolicy::AbortGroup => return Err(error),
                    KeyErrorPolicy::SkipKey => {
                        tracing::warn!(
                            group = %group.name,
                            key = %metric.key,
                            error = %error,
                            "metric fetch failed, recording as absent"
                        );
                        sample.insert(metric.field, None);
                    }
                },
            }
        }

        Ok(sample)
    }

    async fn fetch(&self, key: &str) -> Result<Option<f64>, SampleError> {
        match timeout(self.fetch_timeout, self.source.fetch_value(key)).await {
            Ok(Ok(reading)) => Ok(reading.as_f64()),
            Ok(Err(error)) => Err(error.into()),
            Err(_) => Err(SampleError::Timeout {
                key: key.to_string(),
                timeout: self.fetch_timeout,
            }),
        }
    }
}
