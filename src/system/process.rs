//! Process data model: raw snapshot entries and derived per-refresh views.

/// Name reported for processes the kernel leaves nameless, in practice
/// exactly the pid 0 idle process.
pub const IDLE_PROCESS_NAME: &str = "System Idle Process";

/// Execution status of a snapshot entry. The bulk enumeration reports live
/// processes only, so every entry carries `Running`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProcessStatus {
    #[default]
    Running,
}

impl ProcessStatus {
    pub fn symbol(&self) -> &'static str {
        match self {
            Self::Running => "R",
        }
    }
}

impl std::fmt::Display for ProcessStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.symbol())
    }
}

/// One process as reported by a single bulk snapshot.
///
/// Immutable once materialized; every snapshot yields a fresh set, and pids
/// are unique within one snapshot.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ProcessSnapshotEntry {
    pub pid: u32,
    pub parent_pid: u32,
    pub name: String,
    pub session_id: u32,
    pub thread_count: u32,
    pub handle_count: u32,
    pub working_set_bytes: u64,
    /// Accumulated user-mode CPU time in nanoseconds, non-decreasing over
    /// the process lifetime.
    pub user_time_ns: u64,
    /// Accumulated kernel-mode CPU time in nanoseconds, non-decreasing over
    /// the process lifetime.
    pub kernel_time_ns: u64,
    /// Creation timestamp in native 100 ns ticks. Opaque: comparable only
    /// to other entries' ticks (pid-reuse detection), never interpreted as
    /// calendar time here.
    pub create_time_ticks: i64,
    pub status: ProcessStatus,
}

impl ProcessSnapshotEntry {
    /// Total accumulated CPU time, user plus kernel, in nanoseconds.
    pub fn total_cpu_ns(&self) -> u64 {
        self.user_time_ns.saturating_add(self.kernel_time_ns)
    }
}

/// Per-refresh derived view served to callers. Ephemeral; percentages are
/// only meaningful for the refresh that produced them.
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessView {
    pub pid: u32,
    pub name: String,
    /// Share of total machine CPU over the last refresh interval, clamped
    /// to 0.0..=100.0.
    pub cpu_percent: f32,
    /// Working set, bytes.
    pub memory_bytes: u64,
    pub status: ProcessStatus,
}
