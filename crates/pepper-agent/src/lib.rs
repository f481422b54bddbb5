//! Telemetry forwarding core for pepper-monitor.
//!
//! A [`LifecycleManager`] keeps at most one [`Worker`] alive. Each worker
//! samples its configured metric groups from a [`TelemetrySource`] on a fixed
//! interval and hands the samples to an [`Emitter`]. Configuration changes go
//! through [`MonitorService::on_configuration_changed`], which swaps the worker
//! atomically.

pub mod emitter;
pub mod error;
pub mod lifecycle;
pub mod sample;
pub mod sampler;
pub mod service;
pub mod source;
pub mod testing;
pub mod worker;

pub use emitter::{
    Emitter, EmitterFactory, FluentEmitter, FluentEmitterFactory, TracingEmitter,
    TracingEmitterFactory,
};
pub use error::{LifecycleError, SampleError, SourceError};
pub use lifecycle::LifecycleManager;
pub use sample::MetricSample;
pub use sampler::Sampler;
pub use service::MonitorService;
pub use source::{Reading, SnapshotSource, TelemetrySource};
pub use worker::{IterationReport, Worker, WorkerHandle, WorkerState};

pub use pepper_config::Configuration;
