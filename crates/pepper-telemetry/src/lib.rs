//! Diagnostic logging for the pepper-monitor agent.
//!
//! The agent itself ships metric records to Fluentd; this crate only covers
//! the process's own logs.

mod subscriber;

pub use subscriber::{init_subscriber, EventCounts, EventCountLayer, TelemetryConfig};
