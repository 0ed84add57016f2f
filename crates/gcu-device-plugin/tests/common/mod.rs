#![allow(dead_code)]

use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::Mutex;
use std::time::Duration;

use device_plugin_pb::api::device_plugin_client::DevicePluginClient;
use device_plugin_pb::api::registration_server::Registration;
use device_plugin_pb::api::registration_server::RegistrationServer;
use device_plugin_pb::api::Empty;
use device_plugin_pb::api::RegisterRequest;
use hyper_util::rt::TokioIo;
use tokio::net::UnixListener;
use tokio::net::UnixStream;
use tokio_util::sync::CancellationToken;
use tonic::transport::Channel;
use tonic::transport::Endpoint;
use tonic::transport::Uri;
use tonic::Request;
use tonic::Response;
use tonic::Status;
use tower::service_fn;

/// Kubelet registration endpoint that records every request.
#[derive(Clone, Default)]
pub struct FakeKubelet {
    pub received: Arc<Mutex<Vec<RegisterRequest>>>,
}

#[tonic::async_trait]
impl Registration for FakeKubelet {
    async fn register(&self, request: Request<RegisterRequest>) -> Result<Response<Empty>, Status> {
        self.received.lock().unwrap().push(request.into_inner());
        Ok(Response::new(Empty {}))
    }
}

impl FakeKubelet {
    /// Serve on `socket` until the token is cancelled.
    pub fn serve(&self, socket: &Path, token: CancellationToken) {
        let listener = UnixListener::bind(socket).expect("bind fake kubelet");
        let kubelet = self.clone();
        tokio::spawn(async move {
            tonic::transport::Server::builder()
                .add_service(RegistrationServer::new(kubelet))
                .serve_with_incoming_shutdown(
                    tokio_stream::wrappers::UnixListenerStream::new(listener),
                    token.cancelled_owned(),
                )
                .await
        });
    }

    pub fn registrations(&self) -> Vec<RegisterRequest> {
        self.received.lock().unwrap().clone()
    }

    /// Wait until at least one registration arrived.
    pub async fn wait_for_registration(&self) -> RegisterRequest {
        tokio::time::timeout(Duration::from_secs(10), async {
            loop {
                if let Some(request) = self.registrations().into_iter().next() {
                    return request;
                }
                tokio::time::sleep(Duration::from_millis(20)).await;
            }
        })
        .await
        .expect("plugin should register")
    }
}

/// Device plugin client speaking to the plugin socket at `socket`.
pub async fn plugin_client(socket: &Path) -> DevicePluginClient<Channel> {
    let socket: PathBuf = socket.to_path_buf();
    let channel = Endpoint::from_static("http://tonic")
        .connect_with_connector(service_fn(move |_: Uri| {
            let socket = socket.clone();
            async move {
                let stream = UnixStream::connect(socket).await?;
                Ok::<_, std::io::Error>(TokioIo::new(stream))
            }
        }))
        .await
        .expect("connect to plugin socket");
    DevicePluginClient::new(channel)
}
