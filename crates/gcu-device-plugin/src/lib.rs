//! Kubernetes device plugin for GCU accelerators.
//!
//! Devices are discovered through the ERML management library, kept in an
//! in-memory [`device::DeviceRegistry`] by the [`device::InventoryMonitor`]
//! and served to the kubelet over the `v1beta1` device plugin API.

pub mod app;
pub mod cmd;
pub mod config;
pub mod device;
pub mod kubelet_watcher;
pub mod plugin;
pub mod telemetry;
