use std::collections::HashMap;

use device_plugin_pb::api::ContainerAllocateRequest;
use device_plugin_pb::api::ContainerAllocateResponse;
use device_plugin_pb::api::DeviceSpec;

use crate::device::DeviceRegistry;

/// Where allocated devices live on the host and how a container learns
/// which ones it got.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceLayout {
    /// device node directory, e.g. "/dev/"
    pub node_prefix: String,
    /// device node family, e.g. "gcu" for "/dev/gcu0"
    pub device_family: String,
    /// control node always handed out with any device, e.g. "gcuctl"
    pub control_node: String,
    /// environment variable carrying the allocated ids
    pub env_name: String,
}

impl Default for DeviceLayout {
    fn default() -> Self {
        Self {
            node_prefix: "/dev/".to_string(),
            device_family: "gcu".to_string(),
            control_node: "gcuctl".to_string(),
            env_name: "ALLOCATED_JY_GPU_DEVICES".to_string(),
        }
    }
}

impl DeviceLayout {
    pub fn device_path(&self, id: &str) -> String {
        format!("{}{}{}", self.node_prefix, self.device_family, id)
    }

    pub fn control_path(&self) -> String {
        format!("{}{}", self.node_prefix, self.control_node)
    }

    /// Device nodes and environment for one container. Ids must already be
    /// validated.
    pub fn container_response(&self, ids: &[String]) -> ContainerAllocateResponse {
        let mut devices: Vec<DeviceSpec> = ids.iter().map(|id| node(self.device_path(id))).collect();
        devices.push(node(self.control_path()));

        let mut envs = HashMap::new();
        envs.insert(self.env_name.clone(), ids.join(","));

        ContainerAllocateResponse {
            envs,
            mounts: Vec::new(),
            devices,
            annotations: HashMap::new(),
            cdi_devices: Vec::new(),
        }
    }
}

fn node(path: String) -> DeviceSpec {
    DeviceSpec {
        container_path: path.clone(),
        host_path: path,
        permissions: "rwm".to_string(),
    }
}

/// The first requested id the registry does not know, across all
/// containers in request order.
pub fn first_unknown<'a>(
    registry: &DeviceRegistry,
    requests: &'a [ContainerAllocateRequest],
) -> Option<&'a str> {
    let snapshot = registry.snapshot();
    requests
        .iter()
        .flat_map(|request| request.devices_ids.iter())
        .find(|id| !snapshot.contains(id))
        .map(String::as_str)
}
