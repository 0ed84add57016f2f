use std::time::Duration;

use anyhow::Result;
use tokio_util::sync::CancellationToken;

use crate::app::services::ApplicationServices;
use crate::app::tasks::Tasks;
use crate::config::DaemonArgs;
use crate::plugin;
use crate::plugin::DevicePluginService;
use crate::plugin::PluginServer;
use crate::plugin::Registration;
use crate::plugin::PLUGIN_OPTIONS;
use crate::telemetry::TelemetrySource;

const SERVER_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

/// Application core structure with explicit dependencies
pub struct Application<S> {
    services: ApplicationServices<S>,
    daemon_args: DaemonArgs,
    cancellation_token: CancellationToken,
}

impl<S: TelemetrySource> Application<S> {
    pub fn new(services: ApplicationServices<S>, daemon_args: DaemonArgs) -> Self {
        Self {
            services,
            daemon_args,
            cancellation_token: CancellationToken::new(),
        }
    }

    /// Cancelling this token stops the application as a termination signal
    /// would.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancellation_token.clone()
    }

    /// Serve the kubelet, register, and run the background tasks until one
    /// of them ends the process.
    ///
    /// Returns an error when the inventory can no longer be trusted; a
    /// kubelet restart or a termination signal is a clean exit.
    pub async fn run(&self) -> Result<()> {
        tracing::info!("Starting all application tasks...");

        let service = DevicePluginService::new(
            self.services.registry.clone(),
            self.services.signal.clone(),
            self.services.layout.clone(),
            self.cancellation_token.clone(),
        );
        let server = PluginServer::start(
            self.daemon_args.plugin_socket_path(),
            service,
            self.cancellation_token.clone(),
        )
        .await
        .map_err(|e| {
            tracing::error!("plugin server failed to start: {e:?}");
            anyhow::anyhow!("plugin server failed to start: {e:?}")
        })?;

        let registration = Registration {
            endpoint: self.daemon_args.endpoint.clone(),
            resource_name: self.daemon_args.resource_name.clone(),
            options: PLUGIN_OPTIONS,
        };
        if let Err(e) = plugin::register_with_kubelet(
            self.daemon_args.kubelet_socket_path(),
            &registration,
            self.daemon_args.connect_timeout(),
        )
        .await
        {
            tracing::error!("registration failed: {e:?}");
            self.stop_server(server).await;
            return Err(anyhow::anyhow!("registration failed: {e:?}"));
        }

        let mut tasks = Tasks::new(self.cancellation_token.clone());
        tasks.spawn_all_tasks(&self.services);
        let result = tasks.wait_for_completion().await;

        self.stop_server(server).await;

        if let Err(e) = &result {
            tracing::error!("Error during task execution: {e}");
        }
        tracing::info!("Application run completed");
        result
    }

    async fn stop_server(&self, server: PluginServer) {
        self.cancellation_token.cancel();
        if tokio::time::timeout(SERVER_SHUTDOWN_TIMEOUT, server.stopped())
            .await
            .is_err()
        {
            tracing::warn!(
                "plugin server did not stop within {:?}",
                SERVER_SHUTDOWN_TIMEOUT
            );
        }
    }

    /// Gracefully shutdown application
    pub async fn shutdown(&self) -> Result<()> {
        tracing::info!("Shutting down application...");
        self.cancellation_token.cancel();

        let socket = self.daemon_args.plugin_socket_path();
        if socket.exists() {
            if let Err(e) = std::fs::remove_file(&socket) {
                tracing::warn!("failed to remove plugin socket {}: {e}", socket.display());
            }
        }

        tracing::info!("Application shutdown completed");
        Ok(())
    }
}
