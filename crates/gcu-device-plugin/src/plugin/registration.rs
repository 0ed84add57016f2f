//! One-shot registration with the kubelet.

use core::error::Error;
use std::path::Path;
use std::path::PathBuf;
use std::time::Duration;

use derive_more::Display;
use device_plugin_pb::api::registration_client::RegistrationClient;
use device_plugin_pb::api::DevicePluginOptions;
use device_plugin_pb::api::RegisterRequest;
use error_stack::Report;
use error_stack::ResultExt;
use hyper_util::rt::TokioIo;
use tokio::net::UnixStream;
use tonic::transport::Channel;
use tonic::transport::Endpoint;
use tonic::transport::Uri;
use tonic::Request;
use tower::service_fn;
use tracing::info;

#[derive(Debug, Display)]
pub enum RegistrationError {
    #[display("Failed to connect to kubelet at {}", _0.display())]
    Connect(PathBuf),
    #[display("Registration did not complete within {_0:?}")]
    Timeout(Duration),
    #[display("Kubelet rejected the registration")]
    Rejected,
}

impl Error for RegistrationError {}

/// What this plugin announces to the kubelet.
#[derive(Debug, Clone)]
pub struct Registration {
    /// socket file name under the device plugin directory
    pub endpoint: String,
    pub resource_name: String,
    pub options: DevicePluginOptions,
}

impl Registration {
    fn request(&self) -> RegisterRequest {
        RegisterRequest {
            version: device_plugin_pb::VERSION.to_string(),
            endpoint: self.endpoint.clone(),
            resource_name: self.resource_name.clone(),
            options: Some(self.options),
        }
    }
}

/// Register with the kubelet listening on `kubelet_socket`. Connecting and
/// the call itself are both bounded by `timeout`; there is no retry.
pub async fn register_with_kubelet(
    kubelet_socket: impl AsRef<Path>,
    registration: &Registration,
    timeout: Duration,
) -> Result<(), Report<RegistrationError>> {
    let kubelet_socket = kubelet_socket.as_ref();
    info!(
        "registering {} ({}) with kubelet: {}",
        registration.resource_name,
        registration.endpoint,
        kubelet_socket.display()
    );

    let handshake = async {
        let channel = create_uds_channel(kubelet_socket, timeout).await?;
        let mut client = RegistrationClient::new(channel);
        client
            .register(Request::new(registration.request()))
            .await
            .change_context(RegistrationError::Rejected)?;
        Ok::<_, Report<RegistrationError>>(())
    };

    tokio::time::timeout(timeout, handshake)
        .await
        .change_context(RegistrationError::Timeout(timeout))??;

    info!("successfully registered device plugin with kubelet");
    Ok(())
}

/// gRPC channel over a unix socket.
async fn create_uds_channel(
    socket_path: &Path,
    connect_timeout: Duration,
) -> Result<Channel, Report<RegistrationError>> {
    let path = socket_path.to_path_buf();

    // the URI is a placeholder, the connector ignores it
    Endpoint::from_static("http://tonic")
        .connect_timeout(connect_timeout)
        .connect_with_connector(service_fn(move |_: Uri| {
            let path = path.clone();
            async move {
                let stream = UnixStream::connect(path).await?;
                Ok::<_, std::io::Error>(TokioIo::new(stream))
            }
        }))
        .await
        .change_context_lazy(|| RegistrationError::Connect(socket_path.to_path_buf()))
}
