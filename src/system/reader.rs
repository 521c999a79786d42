//! Bulk process snapshot acquisition.
//!
//! One `NtQuerySystemInformation(SystemProcessInformation)` round trip
//! enumerates every running process (thread counts, handle counts, CPU
//! times, working sets) without opening a single per-process handle. The
//! buffer is sized by a probe call, padded with slack, and re-requested at
//! double the kernel-reported size at most once if the process set grew in
//! between. The filled buffer is then walked as a chain of fixed-layout
//! records.

use log::{debug, warn};

use crate::system::error::{ParseError, SnapshotError};
use crate::system::layout;
use crate::system::process::{ProcessSnapshotEntry, ProcessStatus, IDLE_PROCESS_NAME};
use crate::system::query::{
    SystemQuery, STATUS_INFO_LENGTH_MISMATCH, SYSTEM_PROCESS_INFORMATION_CLASS,
};

/// Slack added over the probed size: processes may spawn between the sizing
/// call and the data call.
const SIZE_MARGIN: usize = 64 * 1024;

/// Acquires complete point-in-time process snapshots through one bulk
/// kernel query per call. Stateless; every call is independent and a failed
/// call leaves nothing behind.
pub struct SnapshotReader<Q: SystemQuery> {
    query: Q,
}

impl<Q: SystemQuery> SnapshotReader<Q> {
    pub fn new(query: Q) -> Self {
        Self { query }
    }

    /// Produce one full snapshot, in kernel enumeration order.
    pub fn acquire_snapshot(&self) -> Result<Vec<ProcessSnapshotEntry>, SnapshotError> {
        let buf = self.fill_buffer()?;
        Ok(parse_snapshot(&buf)?)
    }

    /// Negotiate a buffer with the kernel and fill it.
    ///
    /// Probe for the required size, allocate with margin, fetch. On
    /// `STATUS_INFO_LENGTH_MISMATCH` retry exactly once at double the size
    /// the kernel just reported; any other failure status is fatal for
    /// this call. The caller's refresh cadence is the only backoff.
    fn fill_buffer(&self) -> Result<Vec<u8>, SnapshotError> {
        let mut needed: u32 = 0;
        let _ = self
            .query
            .query(SYSTEM_PROCESS_INFORMATION_CLASS, None, &mut needed);

        let mut size = needed as usize + SIZE_MARGIN;
        let mut buffer = vec![0u8; size];
        let mut status =
            self.query
                .query(SYSTEM_PROCESS_INFORMATION_CLASS, Some(&mut buffer), &mut needed);

        if status == STATUS_INFO_LENGTH_MISMATCH {
            size = needed as usize * 2;
            warn!("snapshot buffer too small, retrying once at {} bytes", size);
            buffer = vec![0u8; size];
            status =
                self.query
                    .query(SYSTEM_PROCESS_INFORMATION_CLASS, Some(&mut buffer), &mut needed);
        }

        if status < 0 {
            return Err(SnapshotError::QueryFailed { status });
        }

        debug!("snapshot buffer filled: {} of {} bytes", needed, size);
        Ok(buffer)
    }
}

/// Walk the record chain of a filled snapshot buffer.
///
/// `NextEntryOffset` is authoritative: records carry no fixed stride and
/// need not be contiguous. Every offset is validated against the buffer
/// before any field read; zero terminates the chain. Nonzero offsets are
/// relative and move strictly forward, so the walk always terminates.
fn parse_snapshot(buf: &[u8]) -> Result<Vec<ProcessSnapshotEntry>, ParseError> {
    let mut entries = Vec::new();
    if buf.is_empty() {
        return Ok(entries);
    }

    let mut offset = 0usize;
    loop {
        let record = layout::decode_record(buf, offset)?;
        entries.push(materialize(buf, &record)?);

        let next = record.next_entry_offset as usize;
        if next == 0 {
            break;
        }
        offset = match offset.checked_add(next) {
            Some(absolute) if absolute < buf.len() => absolute,
            _ => {
                return Err(ParseError::OffsetOutOfBounds {
                    offset: offset.saturating_add(next),
                    len: buf.len(),
                })
            }
        };
    }

    Ok(entries)
}

/// Turn one decoded record into a snapshot entry: convert CPU times from
/// 100 ns ticks to nanoseconds, keep the creation timestamp in native
/// ticks, and substitute the idle-process sentinel for a nameless record.
/// Pid 0 is the idle process whatever its name field holds, so its name
/// span is never read.
fn materialize(
    buf: &[u8],
    record: &layout::RawProcessRecord,
) -> Result<ProcessSnapshotEntry, ParseError> {
    let name = if record.pid == 0 {
        IDLE_PROCESS_NAME.to_string()
    } else {
        layout::resolve_image_name(buf, record)?
            .unwrap_or_else(|| IDLE_PROCESS_NAME.to_string())
    };

    Ok(ProcessSnapshotEntry {
        pid: record.pid as u32,
        parent_pid: record.parent_pid as u32,
        name,
        session_id: record.session_id,
        thread_count: record.thread_count,
        handle_count: record.handle_count,
        working_set_bytes: record.working_set_bytes,
        user_time_ns: ticks_to_ns(record.user_time_ticks),
        kernel_time_ns: ticks_to_ns(record.kernel_time_ticks),
        create_time_ticks: record.create_time_ticks,
        status: ProcessStatus::Running,
    })
}

/// Kernel CPU times arrive in 100 ns units; negative values read as zero.
fn ticks_to_ns(ticks: i64) -> u64 {
    (ticks.max(0) as u64).saturating_mul(100)
}
