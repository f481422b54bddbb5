use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde_json::{Map, Value};

use super::{Reading, TelemetrySource};
use crate::error::SourceError;

/// Reads values from a JSON object file that some other process keeps
/// up to date. The file is re-read on every fetch.
#[derive(Debug, Clone)]
pub struct SnapshotSource {
    path: PathBuf,
}

impl SnapshotSource {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    async fn load(&self) -> Result<Map<String, Value>, SourceError> {
        let content = tokio::fs::read_to_string(&self.path).await.map_err(|e| {
            SourceError::Unavailable(format!("{}: {}", self.path.display(), e))
        })?;

        match serde_json::from_str(&content) {
            Ok(Value::Object(map)) => Ok(map),
            Ok(_) => Err(SourceError::Unavailable(format!(
                "{}: snapshot is not a JSON object",
                self.path.display()
            ))),
            Err(e) => Err(SourceError::Unavailable(format!(
                "{}: {}",
                self.path.display(),
                e
            ))),
        }
    }
}

#[async_trait]
impl TelemetrySource for SnapshotSource {
    async fn fetch_value(&self, key: &str) -> Result<Reading, SourceError> {
        let mut snapshot = self.load().await?;
        Ok(snapshot
            .remove(key)
            .map(Reading::from_json)
            .unwrap_or(Reading::Absent))
    }
}
