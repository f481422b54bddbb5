//! pepper-monitor - robot telemetry forwarder

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use colored::Colorize;
use pepper_agent::{
    EmitterFactory, FluentEmitterFactory, LifecycleManager, MonitorService, SnapshotSource,
    TelemetrySource, TracingEmitterFactory,
};
use pepper_cli::{load_settings, watcher, Cli, Commands, Settings};
use pepper_telemetry::{init_subscriber, EventCounts};

const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let result = match cli.subcommand() {
        Commands::Run => run_monitor(&cli).await,
        Commands::CheckConfig => run_check_config(&cli),
    };

    if let Err(e) = result {
        eprintln!("{}: {:#}", "Error".red().bold(), e);
        std::process::exit(1);
    }
}

/// Install the subscriber from the config's `logging` section, with
/// `--json-logs` forcing JSON output.
fn init_logging(cli: &Cli, settings: &Settings) -> Result<EventCounts> {
    let mut logging = settings.options.logging.clone();
    logging.json_output |= cli.json_logs;
    init_subscriber(&logging).context("Failed to initialize logging")
}

fn run_check_config(cli: &Cli) -> Result<()> {
    let settings = load_settings(cli.config.as_deref())?;

    init_logging(cli, &settings)?;

    match &settings.path {
        Some(path) => eprintln!("{} {}", "Loaded:".cyan().bold(), path.display()),
        None => eprintln!("{}", "No config file found, using defaults".yellow()),
    }

    let config = settings.options.normalize();
    println!("{}", serde_json::to_string_pretty(&config)?);
    Ok(())
}

async fn run_monitor(cli: &Cli) -> Result<()> {
    let settings = load_settings(cli.config.as_deref())?;

    let counts = init_logging(cli, &settings)?;

    match &settings.path {
        Some(path) => tracing::info!(path = %path.display(), "configuration loaded"),
        None => tracing::info!("no configuration file found, using defaults"),
    }

    let config = settings.options.normalize();
    let source: Arc<dyn TelemetrySource> = Arc::new(SnapshotSource::new(&cli.source));
    let emitters: Arc<dyn EmitterFactory> = if cli.dry_run {
        Arc::new(TracingEmitterFactory)
    } else {
        Arc::new(FluentEmitterFactory)
    };
    let service = Arc::new(MonitorService::new(
        LifecycleManager::new(source, emitters),
        config,
    ));

    service.start().await;

    let watch_task = settings.path.clone().map(|path| {
        let period = Duration::from_secs(cli.watch_interval.max(1));
        tokio::spawn(watcher::watch(path, period, Arc::clone(&service)))
    });

    let waited = wait_for_shutdown(settings.path.as_deref(), &service).await;

    if let Some(task) = watch_task {
        task.abort();
    }
    if let Err(e) = service.shutdown(SHUTDOWN_GRACE).await {
        tracing::warn!(error = %e, "worker did not stop cleanly");
    }

    tracing::info!(
        warnings = counts.warnings(),
        errors = counts.errors(),
        "pepper-monitor stopped"
    );
    waited
}

#[cfg(unix)]
async fn wait_for_shutdown(config_path: Option<&Path>, service: &MonitorService) -> Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut hangup = signal(SignalKind::hangup()).context("Failed to install SIGHUP handler")?;

    loop {
        tokio::select! {
            result = tokio::signal::ctrl_c() => {
                result.context("Failed to listen for Ctrl-C")?;
                tracing::info!("interrupt received, shutting down");
                return Ok(());
            }
            _ = hangup.recv() => match config_path {
                Some(path) => {
                    tracing::info!("SIGHUP received, reloading configuration");
                    watcher::reload(path, service).await;
                }
                None => tracing::info!("SIGHUP received without a configuration file, ignoring"),
            }
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_shutdown(_config_path: Option<&Path>, _service: &MonitorService) -> Result<()> {
    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl-C")?;
    tracing::info!("interrupt received, shutting down");
    Ok(())
}
