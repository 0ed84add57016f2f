use std::ffi::c_int;
use std::fmt;

use thiserror::Error;

/// Return codes of `ermlReturn_t`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErmlReturn {
    Success,
    Uninitialized,
    InvalidArgument,
    NotSupported,
    LibraryNotFound,
    InvalidErrorCode,
    DriverNotLoaded,
    EslPortNumber,
    InvalidInput,
    FunctionNotFound,
    OpenDriverVersion,
    DriverNotCompatible,
    NoDevice,
    Timeout,
    Fail,
    Other(c_int),
}

impl ErmlReturn {
    pub fn from_raw(code: c_int) -> Self {
        match code {
            0 => Self::Success,
            1 => Self::Uninitialized,
            2 => Self::InvalidArgument,
            3 => Self::NotSupported,
            4 => Self::LibraryNotFound,
            5 => Self::InvalidErrorCode,
            6 => Self::DriverNotLoaded,
            7 => Self::EslPortNumber,
            8 => Self::InvalidInput,
            9 => Self::FunctionNotFound,
            10 => Self::OpenDriverVersion,
            11 => Self::DriverNotCompatible,
            12 => Self::NoDevice,
            253 => Self::Timeout,
            254 => Self::Fail,
            other => Self::Other(other),
        }
    }

    pub fn as_raw(self) -> c_int {
        match self {
            Self::Success => 0,
            Self::Uninitialized => 1,
            Self::InvalidArgument => 2,
            Self::NotSupported => 3,
            Self::LibraryNotFound => 4,
            Self::InvalidErrorCode => 5,
            Self::DriverNotLoaded => 6,
            Self::EslPortNumber => 7,
            Self::InvalidInput => 8,
            Self::FunctionNotFound => 9,
            Self::OpenDriverVersion => 10,
            Self::DriverNotCompatible => 11,
            Self::NoDevice => 12,
            Self::Timeout => 253,
            Self::Fail => 254,
            Self::Other(code) => code,
        }
    }

    pub fn is_success(self) -> bool {
        self == Self::Success
    }

    /// Fallback text used when `ErmlErrorString` itself cannot help.
    pub fn describe(self) -> &'static str {
        match self {
            Self::Success => "No error",
            Self::Uninitialized => "Error, device un-initialized",
            Self::InvalidArgument => "Error, invalid argument",
            Self::NotSupported => "Error, not supported operation",
            Self::LibraryNotFound => "Error, library not found",
            Self::InvalidErrorCode => "Error, invalid error code",
            Self::DriverNotLoaded => "Error, driver not loaded",
            Self::EslPortNumber => "Error, esl port number error",
            Self::InvalidInput => "Error, invalid input",
            Self::FunctionNotFound => "Error, func not found",
            Self::OpenDriverVersion => "Error, failed to open driver version",
            Self::DriverNotCompatible => "Error, driver version is incompatible",
            Self::NoDevice => "Error, no supported device",
            Self::Timeout => "Error, timeout",
            Self::Fail => "Error, operate fail",
            Self::Other(_) => "Error, unknown error code",
        }
    }
}

impl fmt::Display for ErmlReturn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Other(code) => write!(f, "{code}"),
            other => write!(f, "{other:?}"),
        }
    }
}

#[derive(Error, Debug)]
pub enum ErmlError {
    #[error("ERML library not found, tried: {}", .tried.join(", "))]
    LibraryNotFound { tried: Vec<String> },

    #[error("Failed to find symbol `{0}` in ERML library")]
    SymbolNotFound(&'static str),

    #[error("{call} failed with {code}: {message}")]
    Call {
        call: &'static str,
        code: ErmlReturn,
        message: String,
    },
}

impl ErmlError {
    /// Whether retrying later can possibly help. The fatal codes persist
    /// for the life of the process.
    pub fn is_fatal(&self) -> bool {
        match self {
            Self::LibraryNotFound { .. } | Self::SymbolNotFound(_) => true,
            Self::Call { code, .. } => matches!(
                code,
                ErmlReturn::Uninitialized
                    | ErmlReturn::LibraryNotFound
                    | ErmlReturn::DriverNotLoaded
                    | ErmlReturn::FunctionNotFound
                    | ErmlReturn::DriverNotCompatible
            ),
        }
    }

    pub fn code(&self) -> Option<ErmlReturn> {
        match self {
            Self::Call { code, .. } => Some(*code),
            _ => None,
        }
    }
}
