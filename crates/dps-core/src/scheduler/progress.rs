//! Session-level progress aggregation.
//!
//! Counters and metrics are recomputed from task states after every task's
//! terminal transition and on each monitor tick. Consumers get full-state
//! snapshots; rapid repeated emissions are expected.

use crate::probe::ResourceProbe;
use crate::scheduler::model::{MetricsSnapshot, Session, TaskStatus};

/// Recomputes `completed_units` and the metrics snapshot in place.
///
/// completed units = Σ range length over Completed tasks, so the counter
/// never exceeds `total_units` while processing (ranges partition the total).
pub fn recompute(session: &mut Session, probe: &dyn ResourceProbe) {
    let completed_units: u64 = session
        .tasks
        .iter()
        .filter(|t| t.status == TaskStatus::Completed)
        .map(|t| t.range.len())
        .sum();

    let active_workers = session
        .tasks
        .iter()
        .filter(|t| t.status == TaskStatus::InProgress)
        .count();

    let elapsed = session.elapsed_secs();
    let units_per_sec = if elapsed > f64::EPSILON {
        completed_units as f64 / elapsed
    } else {
        0.0
    };

    session.completed_units = completed_units;
    session.metrics = MetricsSnapshot {
        duration_secs: elapsed,
        cpu_percent: probe.cpu_usage_percent(),
        memory_bytes: probe.memory_used_bytes(),
        active_workers,
        units_per_sec,
    };
}
