mod common;

use std::sync::Arc;
use std::time::Duration;

use device_plugin_pb::api::AllocateRequest;
use device_plugin_pb::api::ContainerAllocateRequest;
use device_plugin_pb::api::Empty;
use device_plugin_pb::api::ListAndWatchResponse;
use gcu_device_plugin::device::ChangeSignal;
use gcu_device_plugin::device::DeviceRegistry;
use gcu_device_plugin::device::InventoryMonitor;
use gcu_device_plugin::device::MonitorConfig;
use gcu_device_plugin::plugin::DeviceLayout;
use gcu_device_plugin::plugin::DevicePluginService;
use gcu_device_plugin::plugin::PluginServer;
use gcu_device_plugin::telemetry::MockTelemetrySource;
use similar_asserts::assert_eq;
use test_log::test;
use tokio_util::sync::CancellationToken;
use tonic::Streaming;

struct Harness {
    _dir: tempfile::TempDir,
    source: MockTelemetrySource,
    monitor: Arc<InventoryMonitor<MockTelemetrySource>>,
    client: device_plugin_pb::api::device_plugin_client::DevicePluginClient<tonic::transport::Channel>,
    token: CancellationToken,
}

impl Harness {
    async fn start(health: &[bool]) -> Self {
        let dir = tempfile::tempdir().expect("tempdir");
        let socket = dir.path().join("jiangyuan.sock");

        let source = MockTelemetrySource::with_health(health);
        let registry = Arc::new(DeviceRegistry::new());
        let signal = Arc::new(ChangeSignal::new());
        let monitor = Arc::new(InventoryMonitor::new(
            source.clone(),
            registry.clone(),
            signal.clone(),
            MonitorConfig::default(),
        ));
        monitor.poll_once().expect("prime inventory");

        let token = CancellationToken::new();
        let service =
            DevicePluginService::new(registry, signal, DeviceLayout::default(), token.clone());
        PluginServer::start(&socket, service, token.clone())
            .await
            .expect("server should start");

        let client = common::plugin_client(&socket).await;
        Self {
            _dir: dir,
            source,
            monitor,
            client,
            token,
        }
    }

    async fn watch(&mut self) -> Streaming<ListAndWatchResponse> {
        self.client
            .list_and_watch(Empty {})
            .await
            .expect("ListAndWatch")
            .into_inner()
    }
}

impl Drop for Harness {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

fn health(response: &ListAndWatchResponse) -> Vec<(String, String)> {
    response
        .devices
        .iter()
        .map(|d| (d.id.clone(), d.health.clone()))
        .collect()
}

fn pairs(expected: &[(&str, &str)]) -> Vec<(String, String)> {
    expected
        .iter()
        .map(|(id, health)| (id.to_string(), health.to_string()))
        .collect()
}

async fn next(stream: &mut Streaming<ListAndWatchResponse>) -> ListAndWatchResponse {
    tokio::time::timeout(Duration::from_secs(5), stream.message())
        .await
        .expect("message should arrive")
        .expect("stream should be healthy")
        .expect("stream should stay open")
}

async fn assert_quiet(stream: &mut Streaming<ListAndWatchResponse>) {
    let quiet = tokio::time::timeout(Duration::from_millis(200), stream.message()).await;
    assert!(quiet.is_err(), "no message expected without a change");
}

#[test(tokio::test)]
async fn health_flip_reaches_the_kubelet_once() {
    let mut harness = Harness::start(&[true, false]).await;
    let mut stream = harness.watch().await;

    let initial = next(&mut stream).await;
    assert_eq!(health(&initial), pairs(&[("0", "Healthy"), ("1", "Unhealthy")]));

    harness.source.set_health(&[true, true]);
    assert!(harness.monitor.poll_once().expect("poll"));
    let update = next(&mut stream).await;
    assert_eq!(health(&update), pairs(&[("0", "Healthy"), ("1", "Healthy")]));

    assert!(!harness.monitor.poll_once().expect("identical poll"));
    assert_quiet(&mut stream).await;
}

#[test(tokio::test)]
async fn silent_polls_send_nothing_and_a_change_sends_the_final_state() {
    let mut harness = Harness::start(&[true, true]).await;
    let mut stream = harness.watch().await;
    next(&mut stream).await;

    for _ in 0..5 {
        assert!(!harness.monitor.poll_once().expect("silent poll"));
    }
    harness.source.set_health(&[true]);
    assert!(harness.monitor.poll_once().expect("changed poll"));

    let update = next(&mut stream).await;
    assert_eq!(health(&update), pairs(&[("0", "Healthy")]));
    assert_quiet(&mut stream).await;
}

#[test(tokio::test)]
async fn failed_poll_keeps_serving_the_last_inventory() {
    let mut harness = Harness::start(&[true, true]).await;
    harness
        .source
        .set_failure(Some(gcu_device_plugin::telemetry::mock::MockFailure::DeviceCount));
    assert!(harness.monitor.poll_once().is_err());

    let mut stream = harness.watch().await;
    let initial = next(&mut stream).await;
    assert_eq!(health(&initial), pairs(&[("0", "Healthy"), ("1", "Healthy")]));
}

#[test(tokio::test)]
async fn allocate_over_the_socket() {
    let mut harness = Harness::start(&[true, true, true]).await;

    let response = harness
        .client
        .allocate(AllocateRequest {
            container_requests: vec![ContainerAllocateRequest {
                devices_ids: vec!["0".to_string(), "2".to_string()],
            }],
        })
        .await
        .expect("allocate")
        .into_inner();

    let container = &response.container_responses[0];
    assert_eq!(
        container
            .devices
            .iter()
            .map(|d| d.host_path.as_str())
            .collect::<Vec<_>>(),
        vec!["/dev/gcu0", "/dev/gcu2", "/dev/gcuctl"]
    );
    assert_eq!(
        container
            .envs
            .get("ALLOCATED_JY_GPU_DEVICES")
            .map(String::as_str),
        Some("0,2")
    );
}

#[test(tokio::test)]
async fn allocate_unknown_device_is_rejected() {
    let mut harness = Harness::start(&[true]).await;

    let status = harness
        .client
        .allocate(AllocateRequest {
            container_requests: vec![
                ContainerAllocateRequest {
                    devices_ids: vec!["0".to_string()],
                },
                ContainerAllocateRequest {
                    devices_ids: vec!["4".to_string()],
                },
            ],
        })
        .await
        .expect_err("unknown device");

    assert_eq!(status.code(), tonic::Code::InvalidArgument);
    assert!(status.message().contains("unknown device: 4"));
}

#[test(tokio::test)]
async fn options_and_preferred_allocation() {
    let mut harness = Harness::start(&[true]).await;

    let options = harness
        .client
        .get_device_plugin_options(Empty {})
        .await
        .expect("options")
        .into_inner();
    assert!(options.pre_start_required);
    assert!(!options.get_preferred_allocation_available);

    let preferred = harness
        .client
        .get_preferred_allocation(device_plugin_pb::api::PreferredAllocationRequest {
            container_requests: vec![],
        })
        .await
        .expect("preferred allocation")
        .into_inner();
    assert!(preferred.container_responses.is_empty());
}
