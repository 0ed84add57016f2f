use std::time::Duration;

use anyhow::Result;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::app::services::ApplicationServices;
use crate::kubelet_watcher::WatchOutcome;
use crate::telemetry::TelemetrySource;

const TASK_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

/// Task manager, responsible for starting and managing all background tasks
pub struct Tasks {
    tasks: Vec<JoinHandle<Result<()>>>,
    cancellation_token: CancellationToken,
}

impl Tasks {
    pub fn new(cancellation_token: CancellationToken) -> Self {
        Self {
            tasks: Vec::new(),
            cancellation_token,
        }
    }

    /// Start the inventory monitor and the kubelet watcher.
    pub fn spawn_all_tasks<S: TelemetrySource>(&mut self, services: &ApplicationServices<S>) {
        let monitor_task = {
            let monitor = services.monitor.clone();
            let token = self.cancellation_token.clone();
            tokio::spawn(async move {
                tracing::info!("Starting inventory monitor task");
                monitor.run(token).await.map_err(|e| {
                    tracing::error!("inventory monitor failed: {e:?}");
                    anyhow::anyhow!("inventory monitor failed: {e:?}")
                })?;
                tracing::info!("Inventory monitor task completed");
                Ok::<_, anyhow::Error>(())
            })
        };
        self.tasks.push(monitor_task);

        let kubelet_watch_task = {
            let watcher = services.kubelet_watcher.clone();
            let token = self.cancellation_token.clone();
            tokio::spawn(async move {
                if watcher.run(token).await == WatchOutcome::KubeletRestarted {
                    tracing::warn!("kubelet restarted, exiting so the plugin registers again");
                }
                Ok(())
            })
        };
        self.tasks.push(kubelet_watch_task);
    }

    /// Wait for a termination signal or for the first task to end, then
    /// stop the rest.
    pub async fn wait_for_completion(&mut self) -> Result<()> {
        let signal_handler = {
            use tokio::signal::unix::signal;
            use tokio::signal::unix::SignalKind;
            let mut sigterm = signal(SignalKind::terminate())?;
            let mut sigint = signal(SignalKind::interrupt())?;

            tokio::spawn(async move {
                tokio::select! {
                    _ = sigterm.recv() => {
                        tracing::info!("Received SIGTERM, initiating graceful shutdown");
                    }
                    _ = sigint.recv() => {
                        tracing::info!("Received SIGINT, initiating graceful shutdown");
                    }
                }
            })
        };

        let result = tokio::select! {
            _ = signal_handler => {
                tracing::info!("Shutdown signal received, cancelling all tasks");
                Ok(())
            }
            _ = self.cancellation_token.cancelled() => {
                tracing::info!("Shutdown requested, cancelling all tasks");
                Ok(())
            }
            finished = futures::future::select_all(&mut self.tasks) => {
                let (result, index, remaining) = finished;
                drop(remaining);
                self.tasks.remove(index);
                match result {
                    Ok(result) => result,
                    Err(e) => {
                        tracing::error!("Task completed with error: {e}");
                        Err(e.into())
                    }
                }
            }
        };

        self.cancellation_token.cancel();
        self.wait_for_tasks_with_timeout(TASK_SHUTDOWN_TIMEOUT).await;
        result
    }

    async fn wait_for_tasks_with_timeout(&mut self, timeout: Duration) {
        tokio::time::timeout(timeout, async {
            for task in &mut self.tasks {
                match task.await {
                    Ok(Err(e)) => tracing::warn!("Task failed during shutdown: {e}"),
                    Err(e) => tracing::error!("Task failed during shutdown: {e}"),
                    Ok(Ok(())) => {}
                }
            }
        })
        .await
        .unwrap_or_else(|_| {
            tracing::warn!("Task shutdown timed out after {:?}", timeout);
        });
    }
}
