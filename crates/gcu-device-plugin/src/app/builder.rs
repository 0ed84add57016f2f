use std::sync::Arc;

use anyhow::Result;

use crate::app::Application;
use crate::app::ApplicationServices;
use crate::config::DaemonArgs;
use crate::device::ChangeSignal;
use crate::device::DeviceRegistry;
use crate::device::InventoryMonitor;
use crate::device::MonitorConfig;
use crate::kubelet_watcher::KubeletWatcher;
use crate::plugin::DeviceLayout;
use crate::telemetry::ErmlSource;
use crate::telemetry::TelemetrySource;

/// Application builder
pub struct ApplicationBuilder {
    daemon_args: DaemonArgs,
}

impl ApplicationBuilder {
    pub fn new(daemon_args: DaemonArgs) -> Self {
        Self { daemon_args }
    }

    /// Build the application on top of the ERML library.
    pub async fn build(self) -> Result<Application<ErmlSource>> {
        let telemetry = &self.daemon_args.telemetry;
        let source = ErmlSource::load(telemetry.locator().as_ref(), telemetry.no_driver)
            .map_err(|e| {
                tracing::error!("telemetry open failed: {e:?}");
                anyhow::anyhow!("telemetry open failed: {e:?}")
            })?;
        self.build_with_source(source).await
    }

    /// Build the application on top of any telemetry source and prime the
    /// inventory with one poll.
    pub async fn build_with_source<S: TelemetrySource>(self, source: S) -> Result<Application<S>> {
        tracing::info!("Building application components...");

        let registry = Arc::new(DeviceRegistry::new());
        let signal = Arc::new(ChangeSignal::new());
        let monitor = Arc::new(InventoryMonitor::new(
            source,
            registry.clone(),
            signal.clone(),
            MonitorConfig::from(&self.daemon_args),
        ));

        monitor.poll().await.map_err(|e| {
            tracing::error!("initial inventory failed: {e:?}");
            anyhow::anyhow!("initial inventory failed: {e:?}")
        })?;
        let snapshot = registry.snapshot();
        tracing::info!(
            "initial inventory: {} device(s), {} healthy [{}]",
            snapshot.len(),
            snapshot.healthy_count(),
            snapshot.ids()
        );

        let kubelet_watcher = Arc::new(KubeletWatcher::new(
            self.daemon_args.kubelet_socket_path(),
            self.daemon_args.kubelet_watch_period(),
        ));

        let services = ApplicationServices {
            registry,
            signal,
            monitor,
            kubelet_watcher,
            layout: DeviceLayout::from(&self.daemon_args),
        };

        Ok(Application::new(services, self.daemon_args))
    }
}
