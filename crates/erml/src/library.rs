use std::ffi::c_char;
use std::path::PathBuf;
use std::sync::Once;

use libloading::os::unix::Library as UnixLibrary;
use libloading::os::unix::RTLD_GLOBAL;
use libloading::os::unix::RTLD_LAZY;
use libloading::Library;
use libloading::Symbol;

use crate::error::ErmlError;
use crate::error::ErmlReturn;
use crate::ffi::c_buf_to_string;
use crate::ffi::DeviceInfo;
use crate::ffi::ErmlDeviceInfoRaw;
use crate::ffi::ErmlErrorStringFn;
use crate::ffi::ErmlGetDevCountFn;
use crate::ffi::ErmlGetDevInfoFn;
use crate::ffi::ErmlGetDevIsHealthFn;
use crate::ffi::ErmlInitFn;
use crate::ffi::ErmlShutdownFn;
use crate::ffi::MAX_CHAR_BUFF_LEN;
use crate::policy;
use crate::policy::OnUnsupported;

/// Directories probed in order. The empty entry defers to the dynamic
/// linker's own search path.
pub const DEFAULT_SEARCH_PATHS: [&str; 4] =
    ["", "/usr/lib/", "/usr/lib64/", "/usr/lib/x86_64-linux-gnu/"];

static IGNORE_VENDOR_SIGNALS: Once = Once::new();

/// ERML raises SIGUSR1 and SIGUSR2 for its own use. Their default action
/// terminates the process, so both are ignored before the first init.
fn ignore_vendor_signals() {
    IGNORE_VENDOR_SIGNALS.call_once(|| {
        for (name, signal) in [("SIGUSR1", libc::SIGUSR1), ("SIGUSR2", libc::SIGUSR2)] {
            // SAFETY: SIG_IGN installs no handler code
            if unsafe { libc::signal(signal, libc::SIG_IGN) } == libc::SIG_ERR {
                tracing::warn!("failed to ignore {name}: {}", std::io::Error::last_os_error());
            }
        }
    });
}

pub const DEFAULT_LIBRARY_NAMES: [&str; 6] = [
    "liberml.so",
    "liberml.so.1",
    "liberml.so.2",
    "liberml.so.2.1",
    "liberml.so.2.0",
    "liberml.so.1.0.0",
];

/// Strategy for finding and opening the ERML shared library.
pub trait LibraryLocator: Send + Sync {
    /// Paths or sonames to try, in order.
    fn candidates(&self) -> Vec<String>;

    /// Open the first candidate that loads.
    fn locate(&self) -> Result<(String, Library), ErmlError> {
        let candidates = self.candidates();
        for candidate in &candidates {
            // SAFETY: loading ERML runs no initialisers beyond the vendor's own
            match unsafe { UnixLibrary::open(Some(candidate.as_str()), RTLD_LAZY | RTLD_GLOBAL) } {
                Ok(lib) => {
                    tracing::info!("Loaded ERML library from {}", candidate);
                    return Ok((candidate.clone(), Library::from(lib)));
                }
                Err(e) => tracing::debug!("ERML candidate {} not loadable: {}", candidate, e),
            }
        }
        Err(ErmlError::LibraryNotFound { tried: candidates })
    }
}

/// Probes every `path + name` combination.
#[derive(Debug, Clone)]
pub struct SearchPathLocator {
    paths: Vec<String>,
    names: Vec<String>,
}

impl SearchPathLocator {
    pub fn new(paths: Vec<String>, names: Vec<String>) -> Self {
        Self { paths, names }
    }
}

impl Default for SearchPathLocator {
    fn default() -> Self {
        Self::new(
            DEFAULT_SEARCH_PATHS.iter().map(|p| p.to_string()).collect(),
            DEFAULT_LIBRARY_NAMES.iter().map(|n| n.to_string()).collect(),
        )
    }
}

impl LibraryLocator for SearchPathLocator {
    fn candidates(&self) -> Vec<String> {
        self.paths
            .iter()
            .flat_map(|path| self.names.iter().map(move |name| format!("{path}{name}")))
            .collect()
    }
}

/// Opens exactly one operator-supplied path.
#[derive(Debug, Clone)]
pub struct FixedPathLocator(pub PathBuf);

impl LibraryLocator for FixedPathLocator {
    fn candidates(&self) -> Vec<String> {
        vec![self.0.to_string_lossy().into_owned()]
    }
}

/// A loaded ERML library with its entry points resolved.
///
/// ERML keeps process-global state and is not safe to drive from several
/// threads at once; callers serialize access around `init`/`shutdown`.
#[derive(Debug)]
pub struct Erml {
    path: String,
    init: ErmlInitFn,
    shutdown: ErmlShutdownFn,
    error_string: ErmlErrorStringFn,
    get_dev_count: ErmlGetDevCountFn,
    get_dev_info: ErmlGetDevInfoFn,
    get_dev_is_health: ErmlGetDevIsHealthFn,
    // keeps the function pointers above valid
    _lib: Library,
}

impl Erml {
    pub fn load(locator: &dyn LibraryLocator) -> Result<Self, ErmlError> {
        let (path, lib) = locator.locate()?;

        // SAFETY: the function types mirror the prototypes in erml.h
        unsafe {
            Ok(Self {
                init: symbol(&lib, "ErmlInit")?,
                shutdown: symbol(&lib, "ErmlShutdown")?,
                error_string: symbol(&lib, "ErmlErrorString")?,
                get_dev_count: symbol(&lib, "ErmlGetDevCount")?,
                get_dev_info: symbol(&lib, "ErmlGetDevInfo")?,
                get_dev_is_health: symbol(&lib, "ErmlGetDevIsHealth")?,
                path,
                _lib: lib,
            })
        }
    }

    /// Where the library was loaded from.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Initialise the library. A failed init is shut down again before
    /// returning, so `shutdown` only needs pairing with a successful one.
    pub fn init(&self, no_driver: bool) -> Result<(), ErmlError> {
        ignore_vendor_signals();
        // SAFETY: entry point resolved at load
        let code = ErmlReturn::from_raw(unsafe { (self.init)(no_driver) });
        policy::resolve("ErmlInit", code, (), (), OnUnsupported::Fail, |c| {
            self.error_string(c)
        })
        .inspect_err(|_| self.shutdown())
    }

    pub fn shutdown(&self) {
        // SAFETY: entry point resolved at load
        unsafe { (self.shutdown)() }
    }

    pub fn device_count(&self) -> Result<u32, ErmlError> {
        let mut count = 0u32;
        // SAFETY: `count` outlives the call
        let code = ErmlReturn::from_raw(unsafe { (self.get_dev_count)(&mut count) });
        policy::resolve("ErmlGetDevCount", code, count, 0, policy::DEVICE_COUNT, |c| {
            self.error_string(c)
        })
    }

    pub fn device_info(&self, index: u32) -> Result<DeviceInfo, ErmlError> {
        let mut raw = ErmlDeviceInfoRaw::default();
        // SAFETY: `raw` has the layout of ermlDeviceInfo_t and outlives the call
        let code = ErmlReturn::from_raw(unsafe { (self.get_dev_info)(index, &mut raw) });
        policy::resolve(
            "ErmlGetDevInfo",
            code,
            DeviceInfo::from(&raw),
            DeviceInfo::from(&ErmlDeviceInfoRaw::default()),
            policy::DEVICE_INFO,
            |c| self.error_string(c),
        )
    }

    pub fn device_is_healthy(&self, index: u32) -> Result<bool, ErmlError> {
        let mut healthy = false;
        // SAFETY: `healthy` outlives the call
        let code = ErmlReturn::from_raw(unsafe { (self.get_dev_is_health)(index, &mut healthy) });
        policy::resolve(
            "ErmlGetDevIsHealth",
            code,
            healthy,
            false,
            policy::DEVICE_HEALTH,
            |c| self.error_string(c),
        )
    }

    fn error_string(&self, code: ErmlReturn) -> String {
        let mut buf: [c_char; MAX_CHAR_BUFF_LEN] = [0; MAX_CHAR_BUFF_LEN];
        // SAFETY: ERML writes at most MAX_CHAR_BUFF_LEN bytes into the buffer
        let ret = ErmlReturn::from_raw(unsafe { (self.error_string)(code.as_raw(), buf.as_mut_ptr()) });
        let message = c_buf_to_string(&buf);
        if ret.is_success() && !message.is_empty() {
            message
        } else {
            code.describe().to_string()
        }
    }
}

unsafe fn symbol<T: Copy>(lib: &Library, name: &'static str) -> Result<T, ErmlError> {
    let sym: Symbol<T> = lib.get(name.as_bytes()).map_err(|e| {
        tracing::debug!("resolving {} failed: {}", name, e);
        ErmlError::SymbolNotFound(name)
    })?;
    Ok(*sym)
}
