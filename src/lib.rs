//! Low-overhead Windows process telemetry.
//!
//! One bulk `NtQuerySystemInformation(SystemProcessInformation)` call per
//! refresh enumerates every running process with thread counts, handle
//! counts, CPU times and working sets, without opening a handle to any of
//! them.
//!
//! Two layers:
//!   - [`SnapshotReader`] issues the kernel query, negotiates the buffer
//!     size, and parses the returned record chain into immutable
//!     [`ProcessSnapshotEntry`] values.
//!   - [`TelemetryRegistry`] retains the previous refresh's CPU baseline,
//!     derives per-process CPU percentages from the deltas, and serves
//!     aggregate thread/handle/process counts under concurrent access.
//!
//! Data flow per refresh:
//!
//! ```text
//! refresh() -> acquire_snapshot() -> one kernel round trip
//!           -> merge with retained baseline (outside the lock)
//!           -> install baseline + snapshot + timestamp (one lock step)
//!           -> Vec<ProcessView>
//! ```
//!
//! The kernel call sits behind the [`SystemQuery`] trait, and the parser
//! and merge logic are plain functions over byte slices, so everything
//! above the syscall builds and tests on any host. The live query
//! (`NtQuery`), the one-handle detail helpers and the demo binary are
//! Windows-only.

pub mod system;

pub use system::error::{ParseError, SnapshotError};
pub use system::process::{ProcessSnapshotEntry, ProcessStatus, ProcessView, IDLE_PROCESS_NAME};
pub use system::query::{SystemQuery, STATUS_INFO_LENGTH_MISMATCH, SYSTEM_PROCESS_INFORMATION_CLASS};
pub use system::reader::SnapshotReader;
pub use system::registry::{logical_core_count, TelemetryRegistry};

#[cfg(windows)]
pub use system::details::{process_details, terminate_process, ProcessDetails};
#[cfg(windows)]
pub use system::query::NtQuery;
