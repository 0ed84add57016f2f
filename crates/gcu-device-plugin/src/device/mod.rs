pub mod monitor;
pub mod registry;
pub mod signal;

pub use monitor::collect;
pub use monitor::DeviceReport;
pub use monitor::InventoryMonitor;
pub use monitor::MonitorConfig;
pub use monitor::MonitorError;
pub use registry::Device;
pub use registry::DeviceRegistry;
pub use registry::DeviceSet;
pub use registry::Health;
pub use registry::Snapshot;
pub use signal::ChangeSignal;
