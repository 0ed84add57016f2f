//! Safe bindings over the ERML (Enrigin Management Library) device telemetry API.
//!
//! The shared library is never linked at build time. It is located at runtime
//! by a [`LibraryLocator`], by default probing the same search paths and
//! sonames the vendor tooling uses, and the handful of entry points the
//! device plugin needs are resolved up front so a missing symbol fails at
//! load rather than mid-poll.

mod error;
mod ffi;
mod library;
mod policy;

pub use error::ErmlError;
pub use error::ErmlReturn;
pub use ffi::DeviceInfo;
pub use library::Erml;
pub use library::FixedPathLocator;
pub use library::LibraryLocator;
pub use library::SearchPathLocator;
pub use library::DEFAULT_LIBRARY_NAMES;
pub use library::DEFAULT_SEARCH_PATHS;
pub use policy::OnUnsupported;
