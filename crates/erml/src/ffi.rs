use std::ffi::c_char;
use std::ffi::c_int;
use std::ffi::CStr;

pub(crate) const MAX_CHAR_BUFF_LEN: usize = 128;

#[allow(
    non_camel_case_types,
    reason = "FFI types must match ERML API naming conventions"
)]
pub(crate) type ermlReturn_t = c_int;

pub(crate) type ErmlInitFn = unsafe extern "C" fn(no_driver: bool) -> ermlReturn_t;
pub(crate) type ErmlShutdownFn = unsafe extern "C" fn();
pub(crate) type ErmlErrorStringFn =
    unsafe extern "C" fn(result: ermlReturn_t, p_error_str: *mut c_char) -> ermlReturn_t;
pub(crate) type ErmlGetDevCountFn = unsafe extern "C" fn(dev_count: *mut u32) -> ermlReturn_t;
pub(crate) type ErmlGetDevInfoFn =
    unsafe extern "C" fn(dev_idx: u32, p_info: *mut ErmlDeviceInfoRaw) -> ermlReturn_t;
pub(crate) type ErmlGetDevIsHealthFn =
    unsafe extern "C" fn(dev_idx: u32, is_health: *mut bool) -> ermlReturn_t;

/// Layout of `ermlDeviceInfo_t`.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub(crate) struct ErmlDeviceInfoRaw {
    pub name: [c_char; MAX_CHAR_BUFF_LEN],
    pub vendor_id: u32,
    pub device_id: u32,
    pub domain_id: u32,
    pub bus_id: u32,
    pub dev_id: u32,
    pub func_id: u32,
    pub logic_id: u32,
}

impl Default for ErmlDeviceInfoRaw {
    fn default() -> Self {
        Self {
            name: [0; MAX_CHAR_BUFF_LEN],
            vendor_id: 0,
            device_id: 0,
            domain_id: 0,
            bus_id: 0,
            dev_id: 0,
            func_id: 0,
            logic_id: 0,
        }
    }
}

/// Identity facts ERML reports for one device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceInfo {
    pub name: String,
    pub vendor_id: u32,
    pub device_id: u32,
    pub domain_id: u32,
    pub bus_id: u32,
    pub dev_id: u32,
    pub func_id: u32,
    pub logic_id: u32,
}

impl DeviceInfo {
    /// PCI location in `dddd:bb:dd.f` form.
    pub fn pci_bus_id(&self) -> String {
        format!(
            "{:04x}:{:02x}:{:02x}.{:x}",
            self.domain_id, self.bus_id, self.dev_id, self.func_id
        )
    }
}

impl From<&ErmlDeviceInfoRaw> for DeviceInfo {
    fn from(raw: &ErmlDeviceInfoRaw) -> Self {
        Self {
            name: c_buf_to_string(&raw.name),
            vendor_id: raw.vendor_id,
            device_id: raw.device_id,
            domain_id: raw.domain_id,
            bus_id: raw.bus_id,
            dev_id: raw.dev_id,
            func_id: raw.func_id,
            logic_id: raw.logic_id,
        }
    }
}

/// Read a NUL-terminated string out of a fixed C buffer, tolerating a
/// buffer the library filled completely without a terminator.
pub(crate) fn c_buf_to_string(buf: &[c_char]) -> String {
    // SAFETY: c_char and u8 have the same size and alignment
    let bytes = unsafe { std::slice::from_raw_parts(buf.as_ptr().cast::<u8>(), buf.len()) };
    match CStr::from_bytes_until_nul(bytes) {
        Ok(s) => s.to_string_lossy().into_owned(),
        Err(_) => String::from_utf8_lossy(bytes).into_owned(),
    }
}

#[cfg(test)]
mod tests {
    use similar_asserts::assert_eq;

    use super::*;

    fn raw_with_name(name: &str) -> ErmlDeviceInfoRaw {
        let mut raw = ErmlDeviceInfoRaw::default();
        for (dst, src) in raw.name.iter_mut().zip(name.bytes()) {
            *dst = src as c_char;
        }
        raw
    }

    #[test]
    fn device_info_from_raw() {
        let mut raw = raw_with_name("S60");
        raw.domain_id = 0;
        raw.bus_id = 0x3b;
        raw.dev_id = 0;
        raw.func_id = 1;
        raw.logic_id = 2;

        let info = DeviceInfo::from(&raw);
        assert_eq!(info.name, "S60");
        assert_eq!(info.logic_id, 2);
        assert_eq!(info.pci_bus_id(), "0000:3b:00.1");
    }

    #[test]
    fn unterminated_name_is_kept_whole() {
        let raw = ErmlDeviceInfoRaw {
            name: [b'a' as c_char; MAX_CHAR_BUFF_LEN],
            ..Default::default()
        };
        let info = DeviceInfo::from(&raw);
        assert_eq!(info.name.len(), MAX_CHAR_BUFF_LEN);
    }
}
