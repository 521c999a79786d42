//! Seam over the bulk kernel query.
//!
//! `SystemQuery` mirrors the NtQuerySystemInformation calling convention so
//! the production implementation is a passthrough and test implementations
//! can script statuses and synthetic buffers without touching a kernel.

/// Information class for the bulk process enumeration.
pub const SYSTEM_PROCESS_INFORMATION_CLASS: u32 = 5;

/// NTSTATUS: the caller's buffer is smaller than the data requires.
/// Distinct from generic failure; it carries the required size back.
pub const STATUS_INFO_LENGTH_MISMATCH: i32 = 0xC0000004_u32 as i32;

/// One system information query, shaped like the OS contract.
pub trait SystemQuery {
    /// Issue the query for `class`.
    ///
    /// With `buf` of `None` this is a sizing probe: no data is written and
    /// `needed` receives the currently required byte count. With a buffer,
    /// the kernel fills it and reports the bytes used (or required, on
    /// `STATUS_INFO_LENGTH_MISMATCH`) through `needed`. Negative return
    /// values are failure NTSTATUSes.
    fn query(&self, class: u32, buf: Option<&mut [u8]>, needed: &mut u32) -> i32;
}

impl<Q: SystemQuery + ?Sized> SystemQuery for &Q {
    fn query(&self, class: u32, buf: Option<&mut [u8]>, needed: &mut u32) -> i32 {
        (**self).query(class, buf, needed)
    }
}

/// The live kernel query via ntdll.
#[cfg(windows)]
pub struct NtQuery;

#[cfg(windows)]
impl SystemQuery for NtQuery {
    fn query(&self, class: u32, buf: Option<&mut [u8]>, needed: &mut u32) -> i32 {
        use ntapi::ntexapi::NtQuerySystemInformation;

        let (ptr, len) = match buf {
            Some(buf) => (buf.as_mut_ptr() as *mut _, buf.len() as u32),
            None => (std::ptr::null_mut(), 0),
        };

        // Safety: ptr/len describe a live &mut [u8] (or null with zero
        // length for the probe), and the kernel writes at most len bytes.
        unsafe { NtQuerySystemInformation(class, ptr, len, needed) }
    }
}
