//! Byte layout of the 64-bit SYSTEM_PROCESS_INFORMATION record.
//!
//! `NtQuerySystemInformation(SystemProcessInformation)` fills the caller's
//! buffer with variable-length records chained by a relative
//! `NextEntryOffset` (zero on the last record). The fixed field offsets are
//! stable per OS version but undocumented; every field this crate consumes
//! is read here, by offset, through a bounds-checked slice with no struct
//! casts, so a malformed buffer can produce an error but never an
//! out-of-bounds read. Layout drift between OS versions stays contained in
//! this module.

use crate::system::error::ParseError;

// Field offsets within one record.
const NEXT_ENTRY_OFFSET: usize = 0x00; // u32, relative to record start
const NUMBER_OF_THREADS: usize = 0x04; // u32
const CREATE_TIME: usize = 0x20; // i64, 100 ns ticks
const USER_TIME: usize = 0x28; // i64, 100 ns ticks
const KERNEL_TIME: usize = 0x30; // i64, 100 ns ticks
const IMAGE_NAME_LENGTH: usize = 0x38; // u16, bytes, excludes terminator
const IMAGE_NAME_BUFFER: usize = 0x40; // u64, absolute pointer into the buffer
const UNIQUE_PROCESS_ID: usize = 0x50; // u64 (HANDLE-sized)
const INHERITED_FROM_PID: usize = 0x58; // u64 (HANDLE-sized)
const HANDLE_COUNT: usize = 0x60; // u32
const SESSION_ID: usize = 0x64; // u32
const WORKING_SET_SIZE: usize = 0x90; // u64, bytes

/// Fixed-layout span every record must cover, through WorkingSetSize.
pub const MIN_RECORD_LEN: usize = 0x98;

/// Fixed fields of one record, exactly as encoded.
#[derive(Debug, Clone, Copy)]
pub struct RawProcessRecord {
    pub next_entry_offset: u32,
    pub thread_count: u32,
    pub create_time_ticks: i64,
    pub user_time_ticks: i64,
    pub kernel_time_ticks: i64,
    pub name_len: u16,
    pub name_ptr: u64,
    pub pid: u64,
    pub parent_pid: u64,
    pub handle_count: u32,
    pub session_id: u32,
    pub working_set_bytes: u64,
}

/// Decode the fixed part of the record starting at `offset`.
pub fn decode_record(buf: &[u8], offset: usize) -> Result<RawProcessRecord, ParseError> {
    let end = offset
        .checked_add(MIN_RECORD_LEN)
        .filter(|&end| end <= buf.len())
        .ok_or(ParseError::TruncatedRecord {
            offset,
            needed: MIN_RECORD_LEN,
            available: buf.len().saturating_sub(offset),
        })?;
    let rec = &buf[offset..end];

    Ok(RawProcessRecord {
        next_entry_offset: read_u32(rec, NEXT_ENTRY_OFFSET),
        thread_count: read_u32(rec, NUMBER_OF_THREADS),
        create_time_ticks: read_i64(rec, CREATE_TIME),
        user_time_ticks: read_i64(rec, USER_TIME),
        kernel_time_ticks: read_i64(rec, KERNEL_TIME),
        name_len: read_u16(rec, IMAGE_NAME_LENGTH),
        name_ptr: read_u64(rec, IMAGE_NAME_BUFFER),
        pid: read_u64(rec, UNIQUE_PROCESS_ID),
        parent_pid: read_u64(rec, INHERITED_FROM_PID),
        handle_count: read_u32(rec, HANDLE_COUNT),
        session_id: read_u32(rec, SESSION_ID),
        working_set_bytes: read_u64(rec, WORKING_SET_SIZE),
    })
}

/// Resolve the UNICODE_STRING image name of a record.
///
/// The name's `Buffer` field holds an absolute pointer into the same
/// snapshot buffer; it is rebased against the buffer's start address and
/// the resulting span bounds-checked before any byte is decoded. Returns
/// `None` for a null or empty name.
pub fn resolve_image_name(
    buf: &[u8],
    rec: &RawProcessRecord,
) -> Result<Option<String>, ParseError> {
    if rec.name_ptr == 0 || rec.name_len == 0 {
        return Ok(None);
    }

    // UTF-16 code units are 2 bytes; drop a trailing odd byte.
    let bytes = rec.name_len as usize & !1;
    let base = buf.as_ptr() as u64;
    let span = rec
        .name_ptr
        .checked_sub(base)
        .and_then(|rel| usize::try_from(rel).ok())
        .and_then(|start| {
            let end = start.checked_add(bytes)?;
            buf.get(start..end)
        })
        .ok_or(ParseError::NameOutOfBounds {
            ptr: rec.name_ptr,
            bytes,
        })?;

    let units: Vec<u16> = span
        .chunks_exact(2)
        .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
        .collect();
    let name = String::from_utf16_lossy(&units);

    if name.is_empty() {
        Ok(None)
    } else {
        Ok(Some(name))
    }
}

// Little-endian reads over a span already checked to cover MIN_RECORD_LEN.

fn read_u16(rec: &[u8], at: usize) -> u16 {
    let mut raw = [0u8; 2];
    raw.copy_from_slice(&rec[at..at + 2]);
    u16::from_le_bytes(raw)
}

fn read_u32(rec: &[u8], at: usize) -> u32 {
    let mut raw = [0u8; 4];
    raw.copy_from_slice(&rec[at..at + 4]);
    u32::from_le_bytes(raw)
}

fn read_u64(rec: &[u8], at: usize) -> u64 {
    let mut raw = [0u8; 8];
    raw.copy_from_slice(&rec[at..at + 8]);
    u64::from_le_bytes(raw)
}

fn read_i64(rec: &[u8], at: usize) -> i64 {
    read_u64(rec, at) as i64
}
