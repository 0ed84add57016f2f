//! In-memory telemetry source for tests
//!
//! Clones share state, so a test can keep a handle after handing the source
//! to a monitor and flip device health or inject failures between polls.

use std::sync::Arc;
use std::sync::Mutex;
use std::sync::MutexGuard;
use std::sync::PoisonError;

use error_stack::Report;

use super::DeviceIdentity;
use super::Fatal;
use super::TelemetryError;
use super::TelemetryResult;
use super::TelemetrySession;
use super::TelemetrySource;

/// Failure to inject into every poll until cleared.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MockFailure {
    /// Opening the source fails and retrying will not help.
    FatalOpen,
    /// The device count query fails.
    DeviceCount,
    /// The identity query for this index fails.
    DeviceIdentity(u32),
    /// The device count query panics.
    Panic,
}

#[derive(Debug, Default)]
struct MockState {
    health: Vec<bool>,
    failure: Option<MockFailure>,
    opens: usize,
    closes: usize,
}

#[derive(Debug, Clone, Default)]
pub struct MockTelemetrySource {
    state: Arc<Mutex<MockState>>,
}

impl MockTelemetrySource {
    pub fn new() -> Self {
        Self::default()
    }

    /// One device per entry, healthy when `true`.
    pub fn with_health(health: &[bool]) -> Self {
        let source = Self::new();
        source.set_health(health);
        source
    }

    pub fn set_health(&self, health: &[bool]) {
        self.state().health = health.to_vec();
    }

    pub fn set_failure(&self, failure: Option<MockFailure>) {
        self.state().failure = failure;
    }

    /// Number of sessions opened so far.
    pub fn opens(&self) -> usize {
        self.state().opens
    }

    /// Number of sessions closed so far.
    pub fn closes(&self) -> usize {
        self.state().closes
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl TelemetrySource for MockTelemetrySource {
    type Session<'a> = MockSession<'a>;

    fn open(&self) -> TelemetryResult<MockSession<'_>> {
        let mut state = self.state();
        if state.failure == Some(MockFailure::FatalOpen) {
            return Err(Report::new(TelemetryError::Open).attach(Fatal));
        }
        state.opens += 1;
        Ok(MockSession { source: self })
    }
}

pub struct MockSession<'a> {
    source: &'a MockTelemetrySource,
}

impl TelemetrySession for MockSession<'_> {
    fn device_count(&self) -> TelemetryResult<u32> {
        let (failure, count) = {
            let state = self.source.state();
            (state.failure, state.health.len() as u32)
        };
        match failure {
            Some(MockFailure::Panic) => panic!("mock telemetry source panicked"),
            Some(MockFailure::DeviceCount) => Err(Report::new(TelemetryError::DeviceCount)
                .attach_printable("mock device count failure")),
            _ => Ok(count),
        }
    }

    fn device_identity(&self, index: u32) -> TelemetryResult<DeviceIdentity> {
        if self.source.state().failure == Some(MockFailure::DeviceIdentity(index)) {
            return Err(Report::new(TelemetryError::DeviceIdentity { index }));
        }
        Ok(DeviceIdentity {
            name: format!("GCU-{index}"),
            pci_bus_id: format!("0000:{index:02x}:00.0"),
        })
    }

    fn device_healthy(&self, index: u32) -> TelemetryResult<bool> {
        self.source
            .state()
            .health
            .get(index as usize)
            .copied()
            .ok_or_else(|| Report::new(TelemetryError::DeviceHealth { index }))
    }
}

impl Drop for MockSession<'_> {
    fn drop(&mut self) {
        self.source.state().closes += 1;
    }
}
