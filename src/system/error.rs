//! Error taxonomy for snapshot acquisition.
//!
//! Exactly two failure kinds reach callers: the kernel query itself failed
//! (`QueryFailed`, carrying the raw NTSTATUS), or the returned buffer could
//! not be walked safely (`Parse`). Either way the caller's previously
//! retained telemetry is left untouched.

use thiserror::Error;

/// A structural problem found while walking a snapshot buffer.
///
/// Parsing stops at the offending record; nothing past the reported
/// position is read.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseError {
    /// A record's fixed-layout span extends past the end of the buffer.
    #[error("record at offset {offset:#x} truncated: {needed} bytes needed, {available} available")]
    TruncatedRecord {
        offset: usize,
        needed: usize,
        available: usize,
    },

    /// A next-entry offset points outside the buffer.
    #[error("record chain offset {offset:#x} lands outside the {len}-byte snapshot buffer")]
    OffsetOutOfBounds { offset: usize, len: usize },

    /// An image-name span lies outside the buffer.
    #[error("image name at {ptr:#x} ({bytes} bytes) lies outside the snapshot buffer")]
    NameOutOfBounds { ptr: u64, bytes: usize },
}

/// Why a snapshot could not be produced.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnapshotError {
    /// The system query returned a failure NTSTATUS, after the single
    /// size retry if one was attempted.
    #[error("NtQuerySystemInformation failed with NTSTATUS {status:#010X}")]
    QueryFailed { status: i32 },

    /// The returned buffer failed structural validation.
    #[error("snapshot buffer invalid: {0}")]
    Parse(#[from] ParseError),
}
