//! Per-process detail lookup and termination.
//!
//! Kept apart from the bulk snapshot path on purpose: these helpers open
//! one handle to one process, on user-initiated actions only, so the
//! per-handle cost the snapshot reader avoids never lands on the refresh
//! cadence.

use std::mem;

use windows::Win32::Foundation::{CloseHandle, E_ACCESSDENIED, FILETIME, HANDLE};
use windows::Win32::System::ProcessStatus::{GetProcessMemoryInfo, PROCESS_MEMORY_COUNTERS};
use windows::Win32::System::Threading::{
    GetProcessHandleCount, GetProcessTimes, OpenProcess, QueryFullProcessImageNameW,
    TerminateProcess, PROCESS_NAME_WIN32, PROCESS_QUERY_LIMITED_INFORMATION, PROCESS_TERMINATE,
};

/// Detail row for one process, gathered through a single
/// PROCESS_QUERY_LIMITED_INFORMATION handle.
#[derive(Debug, Clone, Default)]
pub struct ProcessDetails {
    pub pid: u32,
    /// Image basename, e.g. `notepad.exe`.
    pub name: String,
    /// Full Win32 image path.
    pub image_path: String,
    pub working_set_bytes: u64,
    pub peak_working_set_bytes: u64,
    pub user_time_ns: u64,
    pub kernel_time_ns: u64,
    /// Creation timestamp in native 100 ns ticks. Compare against the
    /// matching snapshot entry's ticks to detect pid reuse before trusting
    /// cached data keyed by pid.
    pub create_time_ticks: i64,
    pub handle_count: u32,
}

/// Look up one process by pid.
///
/// Returns `None` for the pseudo-processes (pids 0 and 4) and for
/// processes this token cannot open; protected and elevated processes
/// routinely deny access.
pub fn process_details(pid: u32) -> Option<ProcessDetails> {
    if pid == 0 || pid == 4 {
        return None;
    }

    unsafe {
        let handle = OpenProcess(PROCESS_QUERY_LIMITED_INFORMATION, false, pid).ok()?;

        let mut creation = FILETIME::default();
        let mut exit = FILETIME::default();
        let mut kernel = FILETIME::default();
        let mut user = FILETIME::default();
        if GetProcessTimes(handle, &mut creation, &mut exit, &mut kernel, &mut user).is_err() {
            let _ = CloseHandle(handle);
            return None;
        }

        let mut counters: PROCESS_MEMORY_COUNTERS = mem::zeroed();
        counters.cb = mem::size_of::<PROCESS_MEMORY_COUNTERS>() as u32;
        let mem_ok = GetProcessMemoryInfo(handle, &mut counters, counters.cb).is_ok();

        let mut handle_count = 0u32;
        let _ = GetProcessHandleCount(handle, &mut handle_count);

        let image_path = query_image_path(handle).unwrap_or_default();

        let _ = CloseHandle(handle);

        Some(ProcessDetails {
            pid,
            name: basename(&image_path).to_string(),
            image_path,
            working_set_bytes: if mem_ok { counters.WorkingSetSize as u64 } else { 0 },
            peak_working_set_bytes: if mem_ok {
                counters.PeakWorkingSetSize as u64
            } else {
                0
            },
            user_time_ns: filetime_to_u64(&user).saturating_mul(100),
            kernel_time_ns: filetime_to_u64(&kernel).saturating_mul(100),
            create_time_ticks: filetime_to_u64(&creation) as i64,
            handle_count,
        })
    }
}

/// Terminate a process through one PROCESS_TERMINATE handle.
///
/// Refuses the pseudo-processes outright; any OS refusal (access denied,
/// already gone) comes back as the raw error for the caller to report.
/// Nothing is retried.
pub fn terminate_process(pid: u32) -> windows::core::Result<()> {
    if pid == 0 || pid == 4 {
        return Err(windows::core::Error::from(E_ACCESSDENIED));
    }

    unsafe {
        let handle = OpenProcess(PROCESS_TERMINATE, false, pid)?;
        let result = TerminateProcess(handle, 1);
        let _ = CloseHandle(handle);
        result
    }
}

/// Full Win32 path of the process image, via an already-open handle.
fn query_image_path(handle: HANDLE) -> Option<String> {
    unsafe {
        let mut buffer = [0u16; 1024];
        let mut size = buffer.len() as u32;
        QueryFullProcessImageNameW(
            handle,
            PROCESS_NAME_WIN32,
            windows::core::PWSTR(buffer.as_mut_ptr()),
            &mut size,
        )
        .ok()?;
        Some(String::from_utf16_lossy(&buffer[..size as usize]))
    }
}

/// Filename component of a Windows path.
fn basename(path: &str) -> &str {
    path.rsplit('\\').next().unwrap_or(path)
}

/// Convert FILETIME to u64 (100-nanosecond intervals)
fn filetime_to_u64(ft: &FILETIME) -> u64 {
    ((ft.dwHighDateTime as u64) << 32) | (ft.dwLowDateTime as u64)
}
