use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::layer::Context;
use tracing_subscriber::util::TryInitError;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Running totals of WARN and ERROR events seen by the process.
#[derive(Debug, Clone, Default)]
pub struct EventCounts {
    warnings: Arc<AtomicU64>,
    errors: Arc<AtomicU64>,
}

impl EventCounts {
    pub fn warnings(&self) -> u64 {
        self.warnings.load(Ordering::Relaxed)
    }

    pub fn errors(&self) -> u64 {
        self.errors.load(Ordering::Relaxed)
    }
}

/// Layer that tallies WARN/ERROR events into an [`EventCounts`].
///
/// Polling failures never surface as return values, so these totals are the
/// only summary of how noisy a run was.
pub struct EventCountLayer {
    counts: EventCounts,
}

impl EventCountLayer {
    pub fn new(counts: EventCounts) -> Self {
        Self { counts }
    }
}

impl<S> tracing_subscriber::Layer<S> for EventCountLayer
where
    S: Subscriber,
{
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        match *event.metadata().level() {
            Level::WARN => {
                self.counts.warnings.fetch_add(1, Ordering::Relaxed);
            }
            Level::ERROR => {
                self.counts.errors.fetch_add(1, Ordering::Relaxed);
            }
            _ => {}
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TelemetryConfig {
    #[serde(default = "default_level")]
    pub level: String,

    #[serde(default)]
    pub json_output: bool,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
            json_output: false,
        }
    }
}

fn default_level() -> String {
    "info".to_string()
}

/// Install the global subscriber, writing to stderr. `RUST_LOG` takes
/// precedence over `config.level`.
pub fn init_subscriber(config: &TelemetryConfig) -> Result<EventCounts, TryInitError> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));
    let counts = EventCounts::default();
    let counter = EventCountLayer::new(counts.clone());

    if config.json_output {
        tracing_subscriber::registry()
            .with(filter)
            .with(counter)
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .try_init()?;
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(counter)
            .with(fmt::layer().with_writer(std::io::stderr))
            .try_init()?;
    }

    Ok(counts)
}
