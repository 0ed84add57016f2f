use std::sync::Mutex;
use std::sync::MutexGuard;
use std::sync::PoisonError;

use ::erml::Erml;
use ::erml::ErmlError;
use ::erml::LibraryLocator;
use error_stack::Report;

use super::DeviceIdentity;
use super::Fatal;
use super::TelemetryError;
use super::TelemetryResult;
use super::TelemetrySession;
use super::TelemetrySource;

/// Telemetry source backed by the ERML shared library.
///
/// ERML state is process global, so sessions are serialized through a lock
/// held for the whole init/query/shutdown round.
#[derive(Debug)]
pub struct ErmlSource {
    erml: Erml,
    no_driver: bool,
    lifecycle: Mutex<()>,
}

impl ErmlSource {
    /// Locate and load the library. Does not initialise it yet.
    pub fn load(locator: &dyn LibraryLocator, no_driver: bool) -> TelemetryResult<Self> {
        let erml = Erml::load(locator).map_err(|e| to_report(e, TelemetryError::Load))?;
        tracing::info!("ERML library loaded from {}", erml.path());
        Ok(Self {
            erml,
            no_driver,
            lifecycle: Mutex::new(()),
        })
    }
}

impl TelemetrySource for ErmlSource {
    type Session<'a> = ErmlSession<'a>;

    fn open(&self) -> TelemetryResult<ErmlSession<'_>> {
        // a poll that panicked still released ERML in Drop, the lock is safe to reuse
        let guard = self
            .lifecycle
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        self.erml
            .init(self.no_driver)
            .map_err(|e| to_report(e, TelemetryError::Open))?;
        Ok(ErmlSession {
            erml: &self.erml,
            _guard: guard,
        })
    }
}

/// An initialised ERML library; shut down on drop.
pub struct ErmlSession<'a> {
    erml: &'a Erml,
    _guard: MutexGuard<'a, ()>,
}

impl TelemetrySession for ErmlSession<'_> {
    fn device_count(&self) -> TelemetryResult<u32> {
        self.erml
            .device_count()
            .map_err(|e| to_report(e, TelemetryError::DeviceCount))
    }

    fn device_identity(&self, index: u32) -> TelemetryResult<DeviceIdentity> {
        let info = self
            .erml
            .device_info(index)
            .map_err(|e| to_report(e, TelemetryError::DeviceIdentity { index }))?;
        Ok(DeviceIdentity {
            pci_bus_id: info.pci_bus_id(),
            name: info.name,
        })
    }

    fn device_healthy(&self, index: u32) -> TelemetryResult<bool> {
        self.erml
            .device_is_healthy(index)
            .map_err(|e| to_report(e, TelemetryError::DeviceHealth { index }))
    }
}

impl Drop for ErmlSession<'_> {
    fn drop(&mut self) {
        self.erml.shutdown();
    }
}

fn to_report(err: ErmlError, context: TelemetryError) -> Report<TelemetryError> {
    let fatal = err.is_fatal();
    let report = Report::new(err).change_context(context);
    if fatal {
        report.attach(Fatal)
    } else {
        report
    }
}
