use std::sync::Arc;

use crate::device::ChangeSignal;
use crate::device::DeviceRegistry;
use crate::device::InventoryMonitor;
use crate::kubelet_watcher::KubeletWatcher;
use crate::plugin::DeviceLayout;

/// Application dependencies - simple struct with Arc-wrapped services
pub struct ApplicationServices<S> {
    pub registry: Arc<DeviceRegistry>,
    pub signal: Arc<ChangeSignal>,
    pub monitor: Arc<InventoryMonitor<S>>,
    pub kubelet_watcher: Arc<KubeletWatcher>,
    pub layout: DeviceLayout,
}
