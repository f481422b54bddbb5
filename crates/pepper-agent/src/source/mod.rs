mod snapshot;

pub use snapshot::SnapshotSource;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::SourceError;
use crate::sample::coerce;

/// Result of a successful fetch.
#[derive(Debug, Clone, PartialEq)]
pub enum Reading {
    /// The source has no data for this key right now.
    Absent,
    Value(Value),
}

impl Reading {
    pub fn number(value: f64) -> Self {
        Self::Value(Value::from(value))
    }

    pub fn text(value: impl Into<String>) -> Self {
        Self::Value(Value::String(value.into()))
    }

    /// `null` counts as no data.
    pub fn from_json(value: Value) -> Self {
        if value.is_null() {
            Self::Absent
        } else {
            Self::Value(value)
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Absent => None,
            Self::Value(value) => coerce(value),
        }
    }
}

/// Live key/value telemetry, e.g. the robot's memory service.
#[async_trait]
pub trait TelemetrySource: Send + Sync {
    async fn fetch_value(&self, key: &str) -> Result<Reading, SourceError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_null_is_absent() {
        assert_eq!(Reading::from_json(Value::Null), Reading::Absent);
        assert_eq!(Reading::from_json(json!(1)), Reading::Value(json!(1)));
    }

    #[test]
    fn test_reading_as_f64() {
        assert_eq!(Reading::Absent.as_f64(), None);
        assert_eq!(Reading::number(0.87).as_f64(), Some(0.87));
        assert_eq!(Reading::text("41.5").as_f64(), Some(41.5));
        assert_eq!(Reading::text("hot").as_f64(), None);
    }
}
