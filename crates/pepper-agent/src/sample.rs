use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::Value;

/// One group's values for a single polling cycle.
///
/// `None` means the sensor reported no data; it is kept distinct from zero and
/// serialized as `null`.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct MetricSample {
    fields: BTreeMap<String, Option<f64>>,
}

impl MetricSample {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, field: impl Into<String>, value: Option<f64>) {
        self.fields.insert(field.into(), value);
    }

    /// `None` if the field was never sampled, `Some(None)` if it was sampled
    /// but absent.
    pub fn get(&self, field: &str) -> Option<Option<f64>> {
        self.fields.get(field).copied()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }
}

impl<K: Into<String>> FromIterator<(K, Option<f64>)> for MetricSample {
    fn from_iter<I: IntoIterator<Item = (K, Option<f64>)>>(iter: I) -> Self {
        Self {
            fields: iter.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        }
    }
}

/// Normalize a raw reading to `f64`. Anything that is not a finite number
/// (or a string holding one) becomes `None`.
pub fn coerce(value: &Value) -> Option<f64> {
    let number = match value {
        Value::Number(number) => number.as_f64(),
        Value::String(text) => text.trim().parse::<f64>().ok(),
        Value::Null | Value::Bool(_) | Value::Array(_) | Value::Object(_) => None,
    }?;
    number.is_finite().then_some(number)
}
