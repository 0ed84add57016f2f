//! What a polled attribute yields when ERML answers `ERML_ERROR_NOT_SUPPORTED`.
//!
//! The vendor bindings are inconsistent here: some getters surface the code
//! as an error, others silently hand back a zero value. Each attribute this
//! crate exposes therefore names its policy explicitly instead of sharing one
//! rule. Whether "unsupported" should ever read as "healthy" or "zero" is
//! still an open question for the device owners.

use crate::error::ErmlError;
use crate::error::ErmlReturn;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OnUnsupported {
    /// Surface `NotSupported` as an error.
    Fail,
    /// Treat `NotSupported` as success and use the attribute's default.
    Default,
}

pub(crate) const DEVICE_COUNT: OnUnsupported = OnUnsupported::Fail;
pub(crate) const DEVICE_INFO: OnUnsupported = OnUnsupported::Fail;
pub(crate) const DEVICE_HEALTH: OnUnsupported = OnUnsupported::Fail;

/// Turn a raw return code plus the value the call wrote into a result.
///
/// `message` is only evaluated on failure.
pub(crate) fn resolve<T>(
    call: &'static str,
    code: ErmlReturn,
    value: T,
    default: T,
    policy: OnUnsupported,
    message: impl FnOnce(ErmlReturn) -> String,
) -> Result<T, ErmlError> {
    match (code, policy) {
        (ErmlReturn::Success, _) => Ok(value),
        (ErmlReturn::NotSupported, OnUnsupported::Default) => {
            tracing::debug!("{call} not supported, using default value");
            Ok(default)
        }
        (code, _) => Err(ErmlError::Call {
            call,
            code,
            message: message(code),
        }),
    }
}
