//! Inventory monitor
//!
//! Polls the telemetry source on a fixed period, swaps the result into the
//! [`DeviceRegistry`] and wakes streaming sessions when the visible set
//! changed. A failed poll leaves the previous inventory in place.

use core::error::Error;
use std::any::Any;
use std::sync::Arc;
use std::time::Duration;

use derive_more::Display;
use error_stack::Report;
use serde::Serialize;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing::error;
use tracing::info;
use tracing::warn;

use super::ChangeSignal;
use super::Device;
use super::DeviceRegistry;
use super::DeviceSet;
use super::Health;
use crate::telemetry;
use crate::telemetry::TelemetryResult;
use crate::telemetry::TelemetrySession;
use crate::telemetry::TelemetrySource;

#[derive(Debug, Display)]
pub enum MonitorError {
    #[display("Inventory poll failed")]
    Poll,
    #[display("Inventory poll panicked")]
    Panicked,
    #[display("Inventory poll was aborted")]
    Aborted,
    #[display("Telemetry source failed permanently")]
    Fatal,
    #[display("Inventory poll failed {failures} times in a row")]
    TooManyFailures { failures: u32 },
}

impl Error for MonitorError {}

#[derive(Debug, Clone, Copy)]
pub struct MonitorConfig {
    pub poll_interval: Duration,
    /// Consecutive failed polls tolerated before the monitor gives up.
    pub max_consecutive_failures: u32,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(60),
            max_consecutive_failures: 3,
        }
    }
}

/// Everything one poll learned about one device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeviceReport {
    pub id: String,
    pub name: String,
    pub pci_bus_id: String,
    pub health: Health,
}

/// Query every device once. Any failure discards the partial result.
pub fn collect<S: TelemetrySource>(source: &S) -> TelemetryResult<Vec<DeviceReport>> {
    let session = source.open()?;
    let count = session.device_count()?;

    let mut reports = Vec::with_capacity(count as usize);
    for index in 0..count {
        let identity = session.device_identity(index)?;
        let healthy = session.device_healthy(index)?;
        if !healthy {
            info!("device [{}] ({}) is not healthy", index, identity.name);
        }
        reports.push(DeviceReport {
            id: index.to_string(),
            name: identity.name,
            pci_bus_id: identity.pci_bus_id,
            health: Health::from_healthy(healthy),
        });
    }
    Ok(reports)
}

pub struct InventoryMonitor<S> {
    source: S,
    registry: Arc<DeviceRegistry>,
    signal: Arc<ChangeSignal>,
    config: MonitorConfig,
}

impl<S: TelemetrySource> InventoryMonitor<S> {
    pub fn new(
        source: S,
        registry: Arc<DeviceRegistry>,
        signal: Arc<ChangeSignal>,
        config: MonitorConfig,
    ) -> Self {
        Self {
            source,
            registry,
            signal,
            config,
        }
    }

    pub fn config(&self) -> MonitorConfig {
        self.config
    }

    pub fn collect(&self) -> TelemetryResult<Vec<DeviceReport>> {
        collect(&self.source)
    }

    /// Run one poll cycle on the calling thread. Returns whether the
    /// inventory changed.
    pub fn poll_once(&self) -> TelemetryResult<bool> {
        let devices: DeviceSet = self
            .collect()?
            .into_iter()
            .map(|report| Device::new(report.id, report.health))
            .collect();

        let changed = self.registry.update(devices);
        if changed {
            let sessions = self.signal.notify();
            debug!("woke {} streaming session(s)", sessions);
        }
        Ok(changed)
    }
}

impl<S: TelemetrySource> InventoryMonitor<S> {
    /// Run one poll cycle on the blocking pool.
    ///
    /// A panic inside the telemetry source surfaces as
    /// [`MonitorError::Panicked`] instead of tearing down the caller.
    pub async fn poll(self: &Arc<Self>) -> Result<bool, Report<MonitorError>> {
        let monitor = Arc::clone(self);
        match tokio::task::spawn_blocking(move || monitor.poll_once()).await {
            Ok(Ok(changed)) => Ok(changed),
            Ok(Err(report)) => Err(report.change_context(MonitorError::Poll)),
            Err(join_error) if join_error.is_panic() => {
                let message = panic_message(join_error.into_panic());
                Err(Report::new(MonitorError::Panicked).attach_printable(message))
            }
            Err(join_error) => {
                Err(Report::new(MonitorError::Aborted).attach_printable(join_error.to_string()))
            }
        }
    }

    /// Poll until cancelled or until polling can no longer be trusted.
    ///
    /// The first tick is skipped: the inventory is primed before the plugin
    /// server starts.
    #[tracing::instrument(skip(self, cancellation_token))]
    pub async fn run(
        self: Arc<Self>,
        cancellation_token: CancellationToken,
    ) -> Result<(), Report<MonitorError>> {
        info!(
            "Starting inventory monitor, polling every {:?}",
            self.config.poll_interval
        );

        let mut interval = tokio::time::interval(self.config.poll_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        interval.tick().await;

        let mut failures = 0u32;
        loop {
            tokio::select! {
                _ = cancellation_token.cancelled() => {
                    info!("Inventory monitor shutdown requested");
                    return Ok(());
                }
                _ = interval.tick() => {}
            }

            match self.poll().await {
                Ok(changed) => {
                    if failures > 0 {
                        info!("Inventory poll recovered after {} failure(s)", failures);
                    }
                    failures = 0;
                    debug!(changed, "inventory poll completed");
                }
                Err(report) => {
                    failures += 1;
                    if telemetry::is_fatal(&report) {
                        error!("Inventory poll failed permanently: {report:?}");
                        return Err(report.change_context(MonitorError::Fatal));
                    }
                    if failures >= self.config.max_consecutive_failures {
                        error!("Giving up on inventory polling: {report:?}");
                        return Err(
                            report.change_context(MonitorError::TooManyFailures { failures })
                        );
                    }
                    warn!(
                        "Inventory poll failed ({}/{}), keeping last known inventory: {report:?}",
                        failures, self.config.max_consecutive_failures
                    );
                }
            }
        }
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
