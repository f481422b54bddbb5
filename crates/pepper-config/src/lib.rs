pub mod loader;
pub mod schema;

pub use loader::{
    find_config_file, load_config_from_file, ConfigFormat, ResolvedConfig,
};
pub use schema::{
    clamp_interval, default_groups, Configuration, KeyErrorPolicy, MetricGroup, MetricId,
    MetricKey, MonitorOptions, OptionValue, DEFAULT_FETCH_TIMEOUT_SECS, DEFAULT_FLUENTD_HOST,
    DEFAULT_FLUENTD_PORT, DEFAULT_INTERVAL_SECS, DEFAULT_TAG_PREFIX,
};
