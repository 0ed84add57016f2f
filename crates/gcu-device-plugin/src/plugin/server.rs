use core::error::Error;
use std::path::Path;
use std::path::PathBuf;

use derive_more::Display;
use device_plugin_pb::api::device_plugin_server::DevicePluginServer;
use error_stack::Report;
use error_stack::ResultExt;
use tokio::net::UnixListener;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::error;
use tracing::info;

use super::service::DevicePluginService;

#[derive(Debug, Display)]
pub enum ServerError {
    #[display("Failed to bind plugin socket {}", _0.display())]
    Bind(PathBuf),
}

impl Error for ServerError {}

/// gRPC server for the kubelet on the plugin socket.
#[derive(Debug)]
pub struct PluginServer {
    socket_path: PathBuf,
    handle: JoinHandle<()>,
}

impl PluginServer {
    /// Bind `socket_path`, replacing a stale socket file, and serve until
    /// the token is cancelled.
    pub async fn start(
        socket_path: impl AsRef<Path>,
        service: DevicePluginService,
        cancellation_token: CancellationToken,
    ) -> Result<Self, Report<ServerError>> {
        let socket_path = socket_path.as_ref().to_path_buf();
        info!("start device plugin server: {}", socket_path.display());

        // a previous instance may have left its socket behind
        if socket_path.exists() {
            std::fs::remove_file(&socket_path)
                .change_context_lazy(|| ServerError::Bind(socket_path.clone()))
                .attach_printable("failed to remove stale socket")?;
        }

        let listener = UnixListener::bind(&socket_path)
            .change_context_lazy(|| ServerError::Bind(socket_path.clone()))?;

        info!("gRPC server is bound to: {}", socket_path.display());

        let handle = tokio::spawn(async move {
            let result = tonic::transport::Server::builder()
                .add_service(DevicePluginServer::new(service))
                .serve_with_incoming_shutdown(
                    tokio_stream::wrappers::UnixListenerStream::new(listener),
                    async move {
                        cancellation_token.cancelled().await;
                        info!("shutting down gRPC server");
                    },
                )
                .await;
            if let Err(e) = result {
                error!("device plugin server failed: {e}");
            }
        });

        Ok(Self {
            socket_path,
            handle,
        })
    }

    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }

    /// Wait for the server task to finish after cancellation.
    pub async fn stopped(self) {
        if let Err(e) = self.handle.await {
            error!("device plugin server task failed: {e}");
        }
    }
}
