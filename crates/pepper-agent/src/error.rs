use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("Telemetry source unavailable: {0}")]
    Unavailable(String),

    #[error("Failed to fetch {key}: {message}")]
    Fetch { key: String, message: String },
}

#[derive(Debug, Error)]
pub enum SampleError {
    #[error("Fetching {key} timed out after {timeout:?}")]
    Timeout { key: String, timeout: Duration },

    #[error(transparent)]
    Source(#[from] SourceError),
}

#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("Worker did not stop within {0:?}")]
    ShutdownTimedOut(Duration),

    #[error("Worker task join error: {0}")]
    Join(String),
}
