//! Process supervision
//!
//! The builder loads the telemetry source and primes the inventory, the
//! application then serves the kubelet and runs the background tasks until
//! one of them ends the process.

pub mod builder;
pub mod core;
pub mod services;
pub mod tasks;

pub use self::core::Application;
pub use builder::ApplicationBuilder;
pub use services::ApplicationServices;
