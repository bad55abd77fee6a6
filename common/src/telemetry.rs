// Telemetry module for structured logging and metrics

use crate::config::LogFormat;
use anyhow::Result;
use metrics::{counter, describe_counter, describe_histogram, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

/// Initialize logging.
///
/// `RUST_LOG` wins over `log_level` when set. JSON output carries the current span so
/// every line emitted while checking a service includes its name.
pub fn init_logging(log_level: &str, format: LogFormat) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(log_level))
        .map_err(|e| anyhow::anyhow!("Failed to create env filter: {}", e))?;

    let layer = match format {
        LogFormat::Json => fmt::layer()
            .json()
            .with_current_span(true)
            .with_span_list(false)
            .with_target(true)
            .with_filter(env_filter)
            .boxed(),
        LogFormat::Pretty => fmt::layer()
            .with_target(false)
            .with_filter(env_filter)
            .boxed(),
    };

    tracing_subscriber::registry()
        .with(layer)
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to initialize tracing subscriber: {}", e))?;

    tracing::info!(log_level = log_level, format = ?format, "Logging initialized");

    Ok(())
}

/// Initialize Prometheus metrics exporter
///
/// Registers:
/// - watch_checks_total: Counter of service checks by outcome
/// - watch_triggers_total: Counter of trigger attempts by result
/// - watch_cycle_duration_seconds: Histogram of full polling cycles
pub fn init_metrics(metrics_port: u16) -> Result<()> {
    let addr: SocketAddr = format!("0.0.0.0:{}", metrics_port)
        .parse()
        .map_err(|e| anyhow::anyhow!("Invalid metrics port: {}", e))?;

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| anyhow::anyhow!("Failed to install Prometheus exporter: {}", e))?;

    describe_counter!("watch_checks_total", "Total number of service checks");
    describe_counter!("watch_triggers_total", "Total number of build trigger attempts");
    describe_histogram!(
        "watch_cycle_duration_seconds",
        "Duration of polling cycles in seconds"
    );

    tracing::info!(
        metrics_port = metrics_port,
        metrics_endpoint = format!("http://0.0.0.0:{}/metrics", metrics_port),
        "Prometheus metrics exporter initialized"
    );

    Ok(())
}

#[inline]
pub fn record_check(service: &str, outcome: &'static str) {
    counter!("watch_checks_total", "service" => service.to_string(), "outcome" => outcome)
        .increment(1);
}

#[inline]
pub fn record_trigger(service: &str, success: bool) {
    let result = if success { "success" } else { "failure" };
    counter!("watch_triggers_total", "service" => service.to_string(), "result" => result)
        .increment(1);
}

#[inline]
pub fn record_cycle_duration(duration_seconds: f64) {
    histogram!("watch_cycle_duration_seconds").record(duration_seconds);
}
