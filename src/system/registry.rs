//! Delta-merging telemetry registry.
//!
//! Retains the previous refresh's per-pid accumulated CPU time (the
//! baseline), the latest snapshot, and one shared sample timestamp behind a
//! single lock. Each refresh acquires a fresh snapshot, derives CPU
//! percentages from the deltas outside the lock, then installs baseline,
//! snapshot and timestamp in one step. Readers never observe a mixed
//! process set, and a failed refresh leaves the prior state installed.

use std::collections::HashMap;
use std::time::Instant;

use chrono::{DateTime, Utc};
use log::debug;
use parking_lot::Mutex;

use crate::system::error::SnapshotError;
use crate::system::process::{ProcessSnapshotEntry, ProcessView};
use crate::system::query::SystemQuery;
use crate::system::reader::SnapshotReader;

/// Retained state, replaced wholesale on every successful refresh.
#[derive(Default)]
struct RetainedState {
    /// pid -> total accumulated CPU time (ns) at the last sample.
    baseline: HashMap<u32, u64>,
    /// The snapshot behind the current aggregates.
    snapshot: Vec<ProcessSnapshotEntry>,
    /// Monotonic instant of the last successful sample; one timestamp
    /// covers every entry of that sample. `None` until the first refresh.
    last_sample: Option<Instant>,
    /// Wall-clock counterpart of `last_sample`, for display.
    last_refresh_at: Option<DateTime<Utc>>,
}

/// Serves live process views and aggregate counts from bulk snapshots.
///
/// Concurrent `refresh` calls may race on the kernel query; whichever
/// installs last wins, and every reader sees some complete refresh's state.
pub struct TelemetryRegistry<Q: SystemQuery> {
    reader: SnapshotReader<Q>,
    logical_cores: usize,
    state: Mutex<RetainedState>,
}

#[cfg(windows)]
impl TelemetryRegistry<crate::system::query::NtQuery> {
    /// Registry over the live kernel query. The logical core count is read
    /// once here and normalizes CPU percentages for the registry's
    /// lifetime.
    pub fn new() -> Self {
        Self::with_reader(
            SnapshotReader::new(crate::system::query::NtQuery),
            logical_core_count(),
        )
    }
}

#[cfg(windows)]
impl Default for TelemetryRegistry<crate::system::query::NtQuery> {
    fn default() -> Self {
        Self::new()
    }
}

impl<Q: SystemQuery> TelemetryRegistry<Q> {
    /// Registry over an arbitrary query implementation, normalizing against
    /// the given core count (raised to at least 1).
    pub fn with_reader(reader: SnapshotReader<Q>, logical_cores: usize) -> Self {
        Self {
            reader,
            logical_cores: logical_cores.max(1),
            state: Mutex::new(RetainedState::default()),
        }
    }

    /// Acquire a fresh snapshot and merge it with the retained baseline.
    ///
    /// Returns this refresh's per-process views. The first refresh, a new
    /// pid, and a zero wall delta all read 0.0% CPU. On error the retained
    /// state is left untouched and the error surfaces to the caller; no
    /// retry beyond the reader's single size retry.
    pub fn refresh(&self) -> Result<Vec<ProcessView>, SnapshotError> {
        let entries = self.reader.acquire_snapshot()?;
        let now = Instant::now();
        let wall = Utc::now();

        let (prev_baseline, prev_sample) = {
            let state = self.state.lock();
            (state.baseline.clone(), state.last_sample)
        };

        let merge = merge_snapshot(&entries, &prev_baseline, prev_sample, now, self.logical_cores);
        debug!(
            "refresh merged {} processes ({} carried a baseline)",
            entries.len(),
            merge.carried
        );

        let mut state = self.state.lock();
        state.baseline = merge.baseline;
        state.snapshot = entries;
        state.last_sample = Some(now);
        state.last_refresh_at = Some(wall);

        Ok(merge.views)
    }

    /// Threads across every process in the current snapshot.
    pub fn total_threads(&self) -> u64 {
        let state = self.state.lock();
        state.snapshot.iter().map(|p| p.thread_count as u64).sum()
    }

    /// Open handles across every process in the current snapshot.
    pub fn total_handles(&self) -> u64 {
        let state = self.state.lock();
        state.snapshot.iter().map(|p| p.handle_count as u64).sum()
    }

    /// Processes in the current snapshot.
    pub fn process_count(&self) -> usize {
        self.state.lock().snapshot.len()
    }

    /// Wall-clock time of the last successful refresh, `None` before the
    /// first.
    pub fn last_refresh_at(&self) -> Option<DateTime<Utc>> {
        self.state.lock().last_refresh_at
    }

    /// Core count CPU percentages are normalized against.
    pub fn logical_cores(&self) -> usize {
        self.logical_cores
    }
}

/// Logical core count of the running system, at least 1.
pub fn logical_core_count() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

struct MergeOutcome {
    views: Vec<ProcessView>,
    baseline: HashMap<u32, u64>,
    /// Entries whose pid already had a baseline.
    carried: usize,
}

/// Derive per-process CPU percentages for one snapshot against the
/// previous baseline, and build the baseline the next refresh diffs
/// against.
///
/// One wall delta applies to every entry. A pid absent from the previous
/// baseline reads 0.0, as does everything when the delta is zero. The
/// delta math saturates, so a reused pid's restarted counter yields a
/// small or zero delta rather than a spike. Percentages are normalized by
/// the logical core count and clamped to [0, 100]. Pids absent from this
/// snapshot are dropped from the new baseline.
fn merge_snapshot(
    entries: &[ProcessSnapshotEntry],
    prev_baseline: &HashMap<u32, u64>,
    prev_sample: Option<Instant>,
    now: Instant,
    logical_cores: usize,
) -> MergeOutcome {
    let wall_delta_ns = prev_sample
        .map(|prev| now.saturating_duration_since(prev).as_nanos() as u64)
        .unwrap_or(0);

    let mut views = Vec::with_capacity(entries.len());
    let mut baseline = HashMap::with_capacity(entries.len());
    let mut carried = 0usize;

    for entry in entries {
        let total = entry.total_cpu_ns();
        let cpu_percent = match prev_baseline.get(&entry.pid) {
            Some(&prev) if wall_delta_ns > 0 => {
                carried += 1;
                let used = total.saturating_sub(prev) as f64;
                let pct = used / wall_delta_ns as f64 * 100.0 / logical_cores as f64;
                pct.clamp(0.0, 100.0) as f32
            }
            _ => 0.0,
        };

        baseline.insert(entry.pid, total);
        views.push(ProcessView {
            pid: entry.pid,
            name: entry.name.clone(),
            cpu_percent,
            memory_bytes: entry.working_set_bytes,
            status: entry.status,
        });
    }

    MergeOutcome {
        views,
        baseline,
        carried,
    }
}
