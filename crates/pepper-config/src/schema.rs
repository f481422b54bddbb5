use std::collections::HashSet;
use std::fmt;
use std::time::Duration;

use pepper_telemetry::TelemetryConfig;
use serde::{Deserialize, Serialize};

pub const DEFAULT_TAG_PREFIX: &str = "pepper";
pub const DEFAULT_FLUENTD_HOST: &str = "127.0.0.1";
pub const DEFAULT_FLUENTD_PORT: u16 = 24224;
pub const DEFAULT_INTERVAL_SECS: u64 = 60;
pub const DEFAULT_FETCH_TIMEOUT_SECS: u64 = 5;

const TEMPERATURE_KEY_TEMPLATE: &str = "Device/SubDeviceList/{}/Temperature/Sensor/Value";

const ACTUATORS: &[&str] = &[
    "HeadPitch",
    "HeadYaw",
    "RShoulderRoll",
    "RShoulderPitch",
    "RElbowYaw",
    "RElbowRoll",
    "RWristYaw",
    "RHand",
    "LShoulderRoll",
    "LShoulderPitch",
    "LElbowYaw",
    "LElbowRoll",
    "LWristYaw",
    "LHand",
    "HipPitch",
    "HipRoll",
    "KneePitch",
    "WheelFL",
    "WheelFR",
    "WheelB",
];

/// Raw agent options as written in the configuration file.
///
/// Numeric options are accepted both as numbers and as strings, and anything
/// malformed falls back to its default in [`MonitorOptions::normalize`].
///
/// # Example
///
/// ```yaml
/// enable_fluentd: true
/// tag_prefix: pepper
/// fluentd_host: 127.0.0.1
/// fluentd_port: "24224"
/// interval_sec: "60"
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorOptions {
    /// Start a worker at all (default: false)
    #[serde(default)]
    pub enable_fluentd: bool,

    /// Prefix prepended to every record tag (default: pepper)
    #[serde(default = "default_tag_prefix")]
    pub tag_prefix: String,

    /// Collector host (default: 127.0.0.1)
    #[serde(default = "default_fluentd_host")]
    pub fluentd_host: String,

    /// Collector port (default: 24224)
    #[serde(default)]
    pub fluentd_port: Option<OptionValue>,

    /// Polling interval in seconds, at least 1 (default: 60)
    #[serde(default)]
    pub interval_sec: Option<OptionValue>,

    /// Upper bound for a single metric fetch (default: 5, never above the interval)
    #[serde(default)]
    pub fetch_timeout_sec: Option<OptionValue>,

    /// What a hard fetch error does to the rest of its group
    #[serde(default)]
    pub key_error_policy: KeyErrorPolicy,

    /// Metric groups sampled each cycle (default: battery and temperature)
    #[serde(default = "default_groups")]
    pub groups: Vec<MetricGroup>,

    /// Diagnostic logging for the agent process
    #[serde(default)]
    pub logging: TelemetryConfig,
}

impl Default for MonitorOptions {
    fn default() -> Self {
        Self {
            enable_fluentd: false,
            tag_prefix: default_tag_prefix(),
            fluentd_host: default_fluentd_host(),
            fluentd_port: None,
            interval_sec: None,
            fetch_timeout_sec: None,
            key_error_policy: KeyErrorPolicy::default(),
            groups: default_groups(),
            logging: TelemetryConfig::default(),
        }
    }
}

fn default_tag_prefix() -> String {
    DEFAULT_TAG_PREFIX.to_string()
}

fn default_fluentd_host() -> String {
    DEFAULT_FLUENTD_HOST.to_string()
}

fn default_key_template() -> String {
    "{}".to_string()
}

/// The battery and joint temperature groups monitored on the robot.
pub fn default_groups() -> Vec<MetricGroup> {
    vec![
        MetricGroup::new(
            "battery",
            [MetricId::Named {
                id: "BatteryChargeChanged".to_string(),
                field: "charge".to_string(),
            }],
        ),
        MetricGroup::new("temperature", ACTUATORS.iter().copied())
            .with_key_template(TEMPERATURE_KEY_TEMPLATE),
    ]
}

/// A numeric option that may arrive as a number or as text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OptionValue {
    Integer(i64),
    Float(f64),
    Text(String),
    Other(serde_json::Value),
}

impl OptionValue {
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Self::Integer(value) => Some(*value),
            Self::Float(value) if value.is_finite() && value.fract() == 0.0 => Some(*value as i64),
            Self::Float(_) => None,
            Self::Text(text) => text.trim().parse().ok(),
            Self::Other(_) => None,
        }
    }
}

impl fmt::Display for OptionValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Integer(value) => write!(f, "{}", value),
            Self::Float(value) => write!(f, "{}", value),
            Self::Text(text) => write!(f, "{:?}", text),
            Self::Other(value) => write!(f, "{}", value),
        }
    }
}

impl From<i64> for OptionValue {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<&str> for OptionValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

/// How the sampler treats a hard fetch error for one key.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyErrorPolicy {
    /// Drop the whole group for this cycle.
    #[default]
    AbortGroup,
    /// Record the key as absent and keep sampling the group.
    SkipKey,
}

/// A metric identifier, optionally with an explicit output field name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetricId {
    Plain(String),
    Named { id: String, field: String },
}

impl MetricId {
    pub fn id(&self) -> &str {
        match self {
            Self::Plain(id) | Self::Named { id, .. } => id,
        }
    }

    /// Output field name: the explicit one, or the lowercased identifier.
    pub fn field(&self) -> String {
        match self {
            Self::Plain(id) => id.to_lowercase(),
            Self::Named { field, .. } => field.clone(),
        }
    }
}

impl From<&str> for MetricId {
    fn from(id: &str) -> Self {
        Self::Plain(id.to_string())
    }
}

impl From<String> for MetricId {
    fn from(id: String) -> Self {
        Self::Plain(id)
    }
}

/// A resolved `(field, key)` pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetricKey {
    pub field: String,
    pub key: String,
}

/// A named set of metrics emitted together as one record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricGroup {
    pub name: String,

    /// Source key pattern; `{}` is replaced by each identifier
    #[serde(default = "default_key_template")]
    pub key_template: String,

    pub metrics: Vec<MetricId>,
}

impl MetricGroup {
    pub fn new<I>(name: impl Into<String>, metrics: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<MetricId>,
    {
        Self {
            name: name.into(),
            key_template: default_key_template(),
            metrics: metrics.into_iter().map(Into::into).collect(),
        }
    }

    pub fn with_key_template(mut self, template: impl Into<String>) -> Self {
        self.key_template = template.into();
        self
    }

    /// Source key for one identifier.
    pub fn key_for(&self, id: &str) -> String {
        self.key_template.replace("{}", id)
    }

    /// Resolve every metric to its field and source key, in declaration order.
    pub fn keys(&self) -> Vec<MetricKey> {
        self.metrics
            .iter()
            .map(|metric| MetricKey {
                field: metric.field(),
                key: self.key_for(metric.id()),
            })
            .collect()
    }
}

/// Normalized configuration handed to a worker.
///
/// Built once per configuration change and never mutated afterwards; a new
/// value always means a new worker.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Configuration {
    pub enabled: bool,
    pub tag_prefix: String,
    pub host: String,
    pub port: u16,
    pub interval_secs: u64,
    pub fetch_timeout_secs: u64,
    pub key_error_policy: KeyErrorPolicy,
    pub groups: Vec<MetricGroup>,
}

impl Default for Configuration {
    fn default() -> Self {
        MonitorOptions::default().normalize()
    }
}

impl Configuration {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }

    pub fn endpoint(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Record tag for a group: `<tag_prefix>.<group>`, or the bare group name
    /// when the prefix is empty.
    pub fn qualified_tag(&self, group: &str) -> String {
        if self.tag_prefix.is_empty() {
            group.to_string()
        } else {
            format!("{}.{}", self.tag_prefix, group)
        }
    }

    /// Every source key polled per cycle, in order.
    pub fn metric_keys(&self) -> Vec<String> {
        self.groups
            .iter()
            .flat_map(|group| group.keys().into_iter().map(|metric| metric.key))
            .collect()
    }

    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn with_tag_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.tag_prefix = prefix.into();
        self
    }

    pub fn with_endpoint(mut self, host: impl Into<String>, port: u16) -> Self {
        self.host = host.into();
        self.port = port;
        self
    }

    /// Set the interval, clamped to at least one second. The fetch timeout is
    /// pulled down with it if needed.
    pub fn with_interval_secs(mut self, secs: i64) -> Self {
        self.interval_secs = clamp_interval(secs);
        self.fetch_timeout_secs = self.fetch_timeout_secs.min(self.interval_secs);
        self
    }

    pub fn with_fetch_timeout_secs(mut self, secs: u64) -> Self {
        self.fetch_timeout_secs = secs.clamp(1, self.interval_secs);
        self
    }

    pub fn with_key_error_policy(mut self, policy: KeyErrorPolicy) -> Self {
        self.key_error_policy = policy;
        self
    }

    pub fn with_groups(mut self, groups: Vec<MetricGroup>) -> Self {
        self.groups = groups;
        self
    }
}

/// Interval values below one second become one second.
pub fn clamp_interval(secs: i64) -> u64 {
    secs.max(1) as u64
}

impl MonitorOptions {
    /// Produce the worker configuration, replacing malformed values with
    /// defaults. Never fails.
    pub fn normalize(&self) -> Configuration {
        let interval_secs = match parse_integer("interval_sec", self.interval_sec.as_ref()) {
            Some(secs) => clamp_interval(secs),
            None => DEFAULT_INTERVAL_SECS,
        };

        let port = parse_integer("fluentd_port", self.fluentd_port.as_ref())
            .map(|port| match u16::try_from(port) {
                Ok(port) if port != 0 => port,
                _ => {
                    tracing::warn!(port, "fluentd_port out of range, using default");
                    DEFAULT_FLUENTD_PORT
                }
            })
            .unwrap_or(DEFAULT_FLUENTD_PORT);

        let fetch_timeout_secs =
            parse_integer("fetch_timeout_sec", self.fetch_timeout_sec.as_ref())
                .map(|secs| secs.max(1) as u64)
                .unwrap_or(DEFAULT_FETCH_TIMEOUT_SECS)
                .min(interval_secs);

        Configuration {
            enabled: self.enable_fluentd,
            tag_prefix: self.tag_prefix.clone(),
            host: self.fluentd_host.clone(),
            port,
            interval_secs,
            fetch_timeout_secs,
            key_error_policy: self.key_error_policy,
            groups: normalize_groups(&self.groups),
        }
    }
}

fn parse_integer(option: &str, value: Option<&OptionValue>) -> Option<i64> {
    let value = value?;
    let parsed = value.as_integer();
    if parsed.is_none() {
        tracing::warn!(option, value = %value, "option is not an integer, using default");
    }
    parsed
}

fn normalize_groups(groups: &[MetricGroup]) -> Vec<MetricGroup> {
    let mut normalized = Vec::with_capacity(groups.len());

    for group in groups {
        if group.name.trim().is_empty() {
            tracing::warn!("skipping metric group without a name");
            continue;
        }

        let mut seen = HashSet::new();
        let metrics: Vec<MetricId> = group
            .metrics
            .iter()
            .filter(|metric| {
                let fresh = seen.insert(metric.field());
                if !fresh {
                    tracing::warn!(
                        group = %group.name,
                        field = %metric.field(),
                        "duplicate metric field, keeping the first"
                    );
                }
                fresh
            })
            .cloned()
            .collect();

        if metrics.is_empty() {
            tracing::warn!(group = %group.name, "skipping metric group without metrics");
            continue;
        }

        normalized.push(MetricGroup {
            name: group.name.clone(),
            key_template: group.key_template.clone(),
            metrics,
        });
    }

    normalized
}
