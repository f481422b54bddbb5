//! pepper-monitor CLI
//!
//! This crate provides the `pepper-monitor` binary:
//! - `run` (default): start forwarding and follow config changes until interrupted
//! - `check-config`: print the normalized configuration

pub mod commands;
pub mod settings;
pub mod watcher;

pub use commands::{Cli, Commands};
pub use settings::{load_settings, Settings};
pub use watcher::ConfigWatcher;
