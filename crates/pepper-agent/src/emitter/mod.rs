//! Record sinks. Emission is best-effort: an emitter never reports delivery
//! failures back to the worker.

mod fluent;
mod logging;

pub use fluent::FluentEmitter;
pub use logging::TracingEmitter;

use std::sync::Arc;

use pepper_config::Configuration;

use crate::sample::MetricSample;

pub trait Emitter: Send + Sync {
    /// Queue one record. Must not block the caller.
    fn log(&self, tag: &str, fields: &MetricSample);
}

/// Builds the emitter a new worker will own. The emitter's transport is fixed
/// for the worker's lifetime.
pub trait EmitterFactory: Send + Sync {
    fn build(&self, config: &Configuration) -> Arc<dyn Emitter>;
}

impl<F> EmitterFactory for F
where
    F: Fn(&Configuration) -> Arc<dyn Emitter> + Send + Sync,
{
    fn build(&self, config: &Configuration) -> Arc<dyn Emitter> {
        self(config)
    }
}

/// Opens a [`FluentEmitter`] towards the configured host and port.
#[derive(Debug, Clone, Copy, Default)]
pub struct FluentEmitterFactory;

impl EmitterFactory for FluentEmitterFactory {
    fn build(&self, config: &Configuration) -> Arc<dyn Emitter> {
        Arc::new(FluentEmitter::connect(&config.host, config.port))
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TracingEmitterFactory;

impl EmitterFactory for TracingEmitterFactory {
    fn build(&self, _config: &Configuration) -> Arc<dyn Emitter> {
        Arc::new(TracingEmitter)
    }
}
