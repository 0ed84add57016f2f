//! Telemetry source boundary
//!
//! The inventory monitor only ever talks to a [`TelemetrySource`]. Opening a
//! source yields a session guard; every query goes through the guard and the
//! source is closed when the guard drops, on success, error and unwind alike.

pub mod erml;
pub mod mock;

use core::error::Error;

use derive_more::Display;
use error_stack::Report;

pub use self::erml::ErmlSource;
pub use self::mock::MockTelemetrySource;

pub type TelemetryResult<T> = Result<T, Report<TelemetryError>>;

/// Errors raised while querying the telemetry source.
#[derive(Debug, Display)]
pub enum TelemetryError {
    #[display("Failed to load telemetry library")]
    Load,
    #[display("Failed to open telemetry source")]
    Open,
    #[display("Failed to query device count")]
    DeviceCount,
    #[display("Failed to query identity of device {index}")]
    DeviceIdentity { index: u32 },
    #[display("Failed to query health of device {index}")]
    DeviceHealth { index: u32 },
}

impl Error for TelemetryError {}

/// Attached to a report when retrying at the next tick cannot help.
#[derive(Debug, Display, Clone, Copy)]
#[display("failure is permanent")]
pub struct Fatal;

/// Whether a report carries the [`Fatal`] marker anywhere in its chain.
pub fn is_fatal<C>(report: &Report<C>) -> bool {
    report.contains::<Fatal>()
}

/// Identity facts reported for one device.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DeviceIdentity {
    pub name: String,
    pub pci_bus_id: String,
}

/// Provider of raw per-device facts.
pub trait TelemetrySource: Send + Sync + 'static {
    type Session<'a>: TelemetrySession
    where
        Self: 'a;

    /// Acquire the source for one round of queries.
    fn open(&self) -> TelemetryResult<Self::Session<'_>>;
}

/// An open telemetry source. Dropping it closes the source.
pub trait TelemetrySession {
    fn device_count(&self) -> TelemetryResult<u32>;

    fn device_identity(&self, index: u32) -> TelemetryResult<DeviceIdentity>;

    fn device_healthy(&self, index: u32) -> TelemetryResult<bool>;
}
