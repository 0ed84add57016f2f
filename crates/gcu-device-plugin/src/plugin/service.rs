use std::pin::Pin;
use std::sync::Arc;

use device_plugin_pb::api;
use device_plugin_pb::api::device_plugin_server::DevicePlugin;
use device_plugin_pb::api::AllocateRequest;
use device_plugin_pb::api::AllocateResponse;
use device_plugin_pb::api::DevicePluginOptions;
use device_plugin_pb::api::Empty;
use device_plugin_pb::api::ListAndWatchResponse;
use device_plugin_pb::api::PreStartContainerRequest;
use device_plugin_pb::api::PreStartContainerResponse;
use device_plugin_pb::api::PreferredAllocationRequest;
use device_plugin_pb::api::PreferredAllocationResponse;
use futures::Stream;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tonic::Request;
use tonic::Response;
use tonic::Result as TonicResult;
use tonic::Status;
use tracing::debug;
use tracing::info;
use tracing::warn;

use super::allocation;
use super::allocation::DeviceLayout;
use crate::device::ChangeSignal;
use crate::device::DeviceRegistry;
use crate::device::Snapshot;

/// Options announced at registration and returned by
/// `GetDevicePluginOptions`.
pub const PLUGIN_OPTIONS: DevicePluginOptions = DevicePluginOptions {
    pre_start_required: true,
    get_preferred_allocation_available: false,
};

/// Render a snapshot in the order the kubelet will see it.
pub fn list_response(snapshot: &Snapshot) -> ListAndWatchResponse {
    ListAndWatchResponse {
        devices: snapshot
            .iter()
            .map(|device| api::Device {
                id: device.id.clone(),
                health: device.health.as_str().to_string(),
                topology: None,
            })
            .collect(),
    }
}

/// DevicePlugin service backed by the device registry.
#[derive(Debug, Clone)]
pub struct DevicePluginService {
    registry: Arc<DeviceRegistry>,
    signal: Arc<ChangeSignal>,
    layout: DeviceLayout,
    cancellation_token: CancellationToken,
}

impl DevicePluginService {
    pub fn new(
        registry: Arc<DeviceRegistry>,
        signal: Arc<ChangeSignal>,
        layout: DeviceLayout,
        cancellation_token: CancellationToken,
    ) -> Self {
        Self {
            registry,
            signal,
            layout,
            cancellation_token,
        }
    }
}

#[tonic::async_trait]
impl DevicePlugin for DevicePluginService {
    async fn get_device_plugin_options(
        &self,
        _request: Request<Empty>,
    ) -> TonicResult<Response<DevicePluginOptions>> {
        debug!("getting device plugin options");
        Ok(Response::new(PLUGIN_OPTIONS))
    }

    type ListAndWatchStream =
        Pin<Box<dyn Stream<Item = Result<ListAndWatchResponse, Status>> + Send>>;

    /// Stream the inventory: the current snapshot at once, then the latest
    /// snapshot after every change signal.
    async fn list_and_watch(
        &self,
        _request: Request<Empty>,
    ) -> TonicResult<Response<Self::ListAndWatchStream>> {
        info!("kubelet opened a ListAndWatch session");

        // subscribe before the first read so no change can slip in between
        let mut changes = self.signal.subscribe();
        let (tx, rx) = mpsc::channel(1);
        let registry = self.registry.clone();
        let cancellation_token = self.cancellation_token.clone();

        tokio::spawn(async move {
            loop {
                let snapshot = registry.snapshot();
                debug!(
                    devices = %snapshot.ids(),
                    "sending {} device(s) to kubelet",
                    snapshot.len()
                );
                if tx.send(Ok(list_response(&snapshot))).await.is_err() {
                    warn!("ListAndWatch session closed by kubelet");
                    return;
                }

                tokio::select! {
                    _ = cancellation_token.cancelled() => {
                        info!("ListAndWatch session stopped on shutdown");
                        return;
                    }
                    _ = tx.closed() => {
                        warn!("ListAndWatch session closed by kubelet");
                        return;
                    }
                    wakeup = changes.recv() => {
                        if wakeup.is_none() {
                            return;
                        }
                    }
                }
            }
        });

        let stream = tokio_stream::wrappers::ReceiverStream::new(rx);
        Ok(Response::new(Box::pin(stream)))
    }

    async fn get_preferred_allocation(
        &self,
        request: Request<PreferredAllocationRequest>,
    ) -> TonicResult<Response<PreferredAllocationResponse>> {
        debug!("getting preferred device allocation: {:?}", request.into_inner());
        Ok(Response::new(PreferredAllocationResponse {
            container_responses: vec![],
        }))
    }

    /// Hand device nodes and the id list to each container. One unknown id
    /// rejects the whole request.
    async fn allocate(
        &self,
        request: Request<AllocateRequest>,
    ) -> TonicResult<Response<AllocateResponse>> {
        let req = request.into_inner();
        info!("allocate request: {:?}", req);

        if let Some(id) = allocation::first_unknown(&self.registry, &req.container_requests) {
            warn!("rejecting allocation, unknown device {}", id);
            return Err(Status::invalid_argument(format!(
                "invalid allocation request for '{}': unknown device: {}",
                self.layout.device_family, id
            )));
        }

        let container_responses = req
            .container_requests
            .iter()
            .map(|container| self.layout.container_response(&container.devices_ids))
            .collect();

        Ok(Response::new(AllocateResponse {
            container_responses,
        }))
    }

    async fn pre_start_container(
        &self,
        request: Request<PreStartContainerRequest>,
    ) -> TonicResult<Response<PreStartContainerResponse>> {
        debug!("pre-start container: {:?}", request.into_inner());
        Ok(Response::new(PreStartContainerResponse {}))
    }
}
