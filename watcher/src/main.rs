// drone-trigger binary entry point
// Exit codes: 0 on shutdown, 1 on runtime failure, 78 on configuration errors

use clap::Parser;
use common::config::Settings;
use common::http::HttpFetcher;
use common::monitor::{Monitor, MonitorConfig, MonitorEngine};
use common::store::{FileWatchStore, WatchStore};
use common::telemetry;
use common::trigger::{BuildTrigger, DroneTrigger};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{error, info};

/// Generic runtime or fatal error
const EXIT_RUNTIME: u8 = 1;
/// EX_CONFIG from sysexits.h
const EXIT_CONFIG: u8 = 78;

#[derive(Parser, Debug)]
#[command(name = "drone-trigger")]
#[command(version)]
#[command(about = "Triggers drone builds when a watched JSON value changes")]
struct Cli {
    /// Directory containing dronetrigger.toml (overrides agent.config_dir)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Directory holding default.toml / local.toml agent settings
    #[arg(long, default_value = "config")]
    settings_dir: PathBuf,

    /// Initialise values, run a single cycle and exit
    #[arg(long)]
    once: bool,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let settings = Settings::load_from_path(&cli.settings_dir);
    let observability = settings
        .as_ref()
        .map(|s| s.observability.clone())
        .unwrap_or_else(|_| Settings::default().observability);

    if let Err(e) = telemetry::init_logging(&observability.log_level, observability.log_format) {
        eprintln!("Error: {}", e);
        return ExitCode::from(EXIT_RUNTIME);
    }

    let settings = match settings {
        Ok(settings) => settings,
        Err(e) => {
            error!(error = %e, "Failed to load settings");
            return ExitCode::from(EXIT_CONFIG);
        }
    };
    if let Err(e) = settings.validate() {
        error!(error = %e, "Invalid settings");
        return ExitCode::from(EXIT_CONFIG);
    }

    if let Some(port) = settings.observability.metrics_port {
        if let Err(e) = telemetry::init_metrics(port) {
            error!(error = %e, "Failed to initialize metrics exporter");
            return ExitCode::from(EXIT_RUNTIME);
        }
    }

    match run(cli, settings).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(code) => ExitCode::from(code),
    }
}

async fn run(cli: Cli, settings: Settings) -> Result<(), u8> {
    info!("Starting drone-trigger");

    let config_dir = cli.config.unwrap_or(settings.agent.config_dir);
    let store = FileWatchStore::open(&config_dir).map_err(|e| {
        error!(error = %e, config_dir = %config_dir.display(), "Failed to load watch config");
        if e.is_config_error() {
            EXIT_CONFIG
        } else {
            EXIT_RUNTIME
        }
    })?;

    let connection = store.connection().clone();
    info!(
        path = %store.path().display(),
        drone_host = %connection.drone_host,
        services = store.services().len(),
        poll_interval_seconds = connection.poll_interval_seconds,
        max_lookback = connection.max_lookback,
        "Watch config loaded"
    );

    let http = HttpFetcher::new(settings.http.timeout_seconds).map_err(|e| {
        error!(error = %e, "Failed to initialize HTTP client");
        EXIT_RUNTIME
    })?;

    let trigger: Arc<dyn BuildTrigger> = Arc::new(DroneTrigger::new(http.clone(), &connection));
    let monitor_config = MonitorConfig {
        poll_interval_seconds: connection.poll_interval_seconds,
    };
    let engine = Arc::new(MonitorEngine::new(monitor_config, store, http, trigger));

    if cli.once {
        engine.bootstrap().await.map_err(|e| {
            error!(error = %e, "Initialisation failed");
            EXIT_RUNTIME
        })?;
        let report = engine.run_cycle().await;
        info!(
            checked = report.checked,
            triggered = report.triggered,
            trigger_failed = report.trigger_failed,
            skipped = report.skipped,
            "Single cycle complete"
        );
        return Ok(());
    }

    let engine_for_shutdown = engine.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        engine_for_shutdown.stop().await;
    });

    engine.start().await.map_err(|e| {
        error!(error = %e, "Monitor error");
        EXIT_RUNTIME
    })?;

    info!("drone-trigger stopped");
    Ok(())
}

/// Resolves on Ctrl+C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }

    info!("Shutdown signal received, initiating graceful shutdown");
}
