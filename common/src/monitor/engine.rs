// Monitor engine: change detection and build triggering for watched services

use crate::errors::{CheckError, MonitorError};
use crate::http::HttpFetcher;
use crate::models::{CheckOutcome, CycleReport, ServiceWatch, WatchValue};
use crate::path;
use crate::store::WatchStore;
use crate::telemetry;
use crate::trigger::BuildTrigger;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{broadcast, Mutex, MutexGuard};
use tokio::time::sleep;
use tracing::{debug, error, info, instrument, warn};

/// Configuration for the monitor loop
#[derive(Debug, Clone)]
pub struct MonitorConfig {
    /// Seconds to sleep between cycles
    pub poll_interval_seconds: u64,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            poll_interval_seconds: crate::models::DEFAULT_POLL_INTERVAL_SECONDS,
        }
    }
}

/// Monitor trait for the polling lifecycle
#[async_trait]
pub trait Monitor: Send + Sync {
    /// Initialise missing values, then poll until stopped
    async fn start(&self) -> Result<(), MonitorError>;

    /// Interrupt the inter-cycle sleep and end `start`
    async fn stop(&self);

    /// Check every service once
    async fn run_cycle(&self) -> CycleReport;
}

/// Sequential monitor over a WatchStore
pub struct MonitorEngine<S: WatchStore> {
    config: MonitorConfig,
    store: Mutex<S>,
    http: HttpFetcher,
    trigger: Arc<dyn BuildTrigger>,
    shutdown_tx: broadcast::Sender<()>,
}

impl<S: WatchStore> MonitorEngine<S> {
    /// Create a new monitor engine
    pub fn new(
        config: MonitorConfig,
        store: S,
        http: HttpFetcher,
        trigger: Arc<dyn BuildTrigger>,
    ) -> Self {
        let (shutdown_tx, _shutdown_rx) = broadcast::channel(1);

        Self {
            config,
            store: Mutex::new(store),
            http,
            trigger,
            shutdown_tx,
        }
    }

    /// Get a shutdown signal receiver
    pub fn shutdown_receiver(&self) -> broadcast::Receiver<()> {
        self.shutdown_tx.subscribe()
    }

    /// Lock the store, e.g. to inspect values after a cycle
    pub async fn store(&self) -> MutexGuard<'_, S> {
        self.store.lock().await
    }

    /// Fetch the source document and resolve the watched value
    pub async fn fetch_value(&self, service: &ServiceWatch) -> Result<WatchValue, CheckError> {
        let document = self.http.get_text(&service.source_url, None).await?;
        Ok(path::resolve(&document, &service.path_expression)?)
    }

    /// Store the first value for every uninitialised service without triggering.
    ///
    /// Any failure here is fatal; returns how many services were initialised.
    #[instrument(skip(self))]
    pub async fn bootstrap(&self) -> Result<usize, MonitorError> {
        let services = self.store.lock().await.services();
        let mut initialized = 0;

        for service in services.iter().filter(|s| !s.is_initialized()) {
            let value = self.fetch_value(service).await.map_err(|source| {
                error!(service = %service.name, error = %source, "Failed to fetch initial value");
                MonitorError::Bootstrap {
                    service: service.name.clone(),
                    source,
                }
            })?;

            self.store
                .lock()
                .await
                .record_value(&service.name, &value)
                .map_err(|source| MonitorError::Store {
                    service: service.name.clone(),
                    source,
                })?;

            info!(service = %service.name, value = %value, "Wrote initial value");
            initialized += 1;
        }

        Ok(initialized)
    }

    /// Check a single service. Never fails: every error becomes a logged outcome.
    #[instrument(
        skip(self, service),
        fields(service = %service.name, repo = %service.target_repo, branch = %service.branch)
    )]
    pub async fn check_service(&self, service: &ServiceWatch) -> CheckOutcome {
        let current = match self.fetch_value(service).await {
            Ok(value) => value,
            Err(e) => {
                warn!(error = %e, kind = e.kind(), "Check failed, skipping service this cycle");
                return CheckOutcome::Skipped;
            }
        };

        let previous = match &service.last_value {
            Some(previous) => previous.clone(),
            None => {
                return match self.store.lock().await.record_value(&service.name, &current) {
                    Ok(()) => {
                        info!(value = %current, "Wrote initial value");
                        CheckOutcome::Initialized(current)
                    }
                    Err(e) => {
                        error!(value = %current, error = %e, "Initial value accepted but not persisted");
                        CheckOutcome::PersistFailed {
                            current,
                            build_number: None,
                        }
                    }
                };
            }
        };

        if previous == current {
            debug!(value = %current, "Value unchanged");
            return CheckOutcome::Unchanged;
        }

        info!(previous = %previous, current = %current, "Got new value, triggering build");

        let build_number = match self
            .trigger
            .trigger(&service.target_repo, &service.branch)
            .await
        {
            Ok(number) => {
                telemetry::record_trigger(&service.name, true);
                number
            }
            Err(e) => {
                telemetry::record_trigger(&service.name, false);
                warn!(error = %e, "Trigger failed, will retry next cycle");
                return CheckOutcome::TriggerFailed { previous, current };
            }
        };

        match self.store.lock().await.record_value(&service.name, &current) {
            Ok(()) => {
                info!(build_number, value = %current, "Successfully triggered build for new value");
                CheckOutcome::Triggered {
                    previous,
                    current,
                    build_number,
                }
            }
            Err(e) => {
                error!(
                    build_number,
                    value = %current,
                    error = %e,
                    "Build triggered but new value could not be persisted, write will be retried"
                );
                CheckOutcome::PersistFailed {
                    current,
                    build_number: Some(build_number),
                }
            }
        }
    }
}

#[async_trait]
impl<S: WatchStore + 'static> Monitor for MonitorEngine<S> {
    #[instrument(skip(self))]
    async fn start(&self) -> Result<(), MonitorError> {
        let mut shutdown_rx = self.shutdown_receiver();

        let initialized = self.bootstrap().await?;
        info!(
            initialized,
            poll_interval_seconds = self.config.poll_interval_seconds,
            "Starting monitor loop"
        );

        let poll_interval = Duration::from_secs(self.config.poll_interval_seconds);

        loop {
            let report = self.run_cycle().await;
            info!(
                checked = report.checked,
                triggered = report.triggered,
                trigger_failed = report.trigger_failed,
                skipped = report.skipped,
                "Cycle complete"
            );

            tokio::select! {
                _ = sleep(poll_interval) => {}
                _ = shutdown_rx.recv() => {
                    info!("Shutdown signal received, stopping monitor");
                    break;
                }
            }
        }

        info!("Monitor stopped");
        Ok(())
    }

    async fn stop(&self) {
        info!("Stopping monitor");
        let _ = self.shutdown_tx.send(());
    }

    #[instrument(skip(self))]
    async fn run_cycle(&self) -> CycleReport {
        let started = Instant::now();
        let services = {
            let mut store = self.store.lock().await;
            if store.is_dirty() {
                match store.flush() {
                    Ok(()) => info!("Pending values written to store"),
                    Err(e) => error!(error = %e, "Store still not writable"),
                }
            }
            store.services()
        };
        let mut report = CycleReport::default();

        for service in &services {
            let outcome = self.check_service(service).await;
            telemetry::record_check(&service.name, outcome.label());
            report.record(&outcome);
        }

        telemetry::record_cycle_duration(started.elapsed().as_secs_f64());
        report
    }
}
