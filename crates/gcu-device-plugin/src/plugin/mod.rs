//! Kubelet facing side of the plugin: the `DevicePlugin` gRPC service, the
//! server hosting it and the registration handshake.

pub mod allocation;
pub mod registration;
pub mod server;
pub mod service;

pub use allocation::DeviceLayout;
pub use registration::register_with_kubelet;
pub use registration::Registration;
pub use registration::RegistrationError;
pub use server::PluginServer;
pub use server::ServerError;
pub use service::DevicePluginService;
pub use service::PLUGIN_OPTIONS;
