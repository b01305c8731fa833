//! Unit-range math and task planning.
//!
//! Splits a work source of `total_units` units (numbered from 1) into
//! contiguous tasks of `units_per_task` units, the last possibly shorter.

use serde::{Deserialize, Serialize};

/// An inclusive range of work-unit numbers [start, end], 1-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitRange {
    /// First unit number (inclusive).
    pub start: u64,
    /// Last unit number (inclusive).
    pub end: u64,
}

impl UnitRange {
    /// Number of units in this range.
    pub fn len(&self) -> u64 {
        if self.end < self.start {
            return 0;
        }
        self.end - self.start + 1
    }

    pub fn is_empty(&self) -> bool {
        self.end < self.start
    }

    /// Whether `unit` falls inside this range.
    pub fn contains(&self, unit: u64) -> bool {
        unit >= self.start && unit <= self.end
    }
}

impl std::fmt::Display for UnitRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}-{}", self.start, self.end)
    }
}

/// One planned task: its position in the plan, its unit range, and the
/// worker slot it is grouped under for progress display. The slot is
/// assigned round-robin at planning time and carries no execution affinity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TaskPlan {
    pub index: usize,
    pub range: UnitRange,
    pub worker_slot: usize,
}

/// Builds a task plan covering [1, total_units] in contiguous ranges of
/// `units_per_task`, the last possibly shorter. Yields ⌈total/per⌉ tasks;
/// a total smaller than `units_per_task` yields exactly one task.
/// Returns an empty vec if `total_units` or `units_per_task` is 0.
pub fn plan_tasks(total_units: u64, units_per_task: u64, worker_count: usize) -> Vec<TaskPlan> {
    if total_units == 0 || units_per_task == 0 {
        return Vec::new();
    }
    let worker_count = worker_count.max(1);

    let task_count = total_units.div_ceil(units_per_task) as usize;
    let mut out = Vec::with_capacity(task_count);
    let mut start = 1u64;

    for index in 0..task_count {
        // saturating: the final chunk can sit at the top of the u64 range
        let end = start.saturating_add(units_per_task - 1).min(total_units);
        out.push(TaskPlan {
            index,
            range: UnitRange { start, end },
            worker_slot: index % worker_count,
        });
        start = end.saturating_add(1);
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plan_tasks_even() {
        let tasks = plan_tasks(20, 5, 4);
        assert_eq!(tasks.len(), 4);
        assert_eq!(tasks[0].range, UnitRange { start: 1, end: 5 });
        assert_eq!(tasks[1].range, UnitRange { start: 6, end: 10 });
        assert_eq!(tasks[2].range, UnitRange { start: 11, end: 15 });
        assert_eq!(tasks[3].range, UnitRange { start: 16, end: 20 });
    }

    #[test]
    fn plan_tasks_short_tail() {
        // 8 units at 3 per task: [1-3], [4-6], [7-8]
        let tasks = plan_tasks(8, 3, 4);
        assert_eq!(tasks.len(), 3);
        assert_eq!(tasks[0].range, UnitRange { start: 1, end: 3 });
        assert_eq!(tasks[1].range, UnitRange { start: 4, end: 6 });
        assert_eq!(tasks[2].range, UnitRange { start: 7, end: 8 });
        assert_eq!(tasks[2].range.len(), 2);
    }

    #[test]
    fn plan_tasks_total_smaller_than_chunk() {
        let tasks = plan_tasks(3, 10, 4);
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].range, UnitRange { start: 1, end: 3 });
    }

    #[test]
    fn plan_tasks_empty_inputs() {
        assert!(plan_tasks(0, 5, 4).is_empty());
        assert!(plan_tasks(100, 0, 4).is_empty());
    }

    #[test]
    fn plan_tasks_contiguous_no_gaps_no_overlap() {
        for (total, per) in [(1u64, 1u64), (7, 3), (100, 7), (64, 64), (65, 64)] {
            let tasks = plan_tasks(total, per, 3);
            assert_eq!(tasks.len() as u64, total.div_ceil(per));
            assert_eq!(tasks[0].range.start, 1);
            assert_eq!(tasks.last().unwrap().range.end, total);
            for pair in tasks.windows(2) {
                assert_eq!(pair[1].range.start, pair[0].range.end + 1);
            }
            let covered: u64 = tasks.iter().map(|t| t.range.len()).sum();
            assert_eq!(covered, total);
        }
    }

    #[test]
    fn plan_tasks_near_u64_max_does_not_overflow() {
        let tasks = plan_tasks(u64::MAX, u64::MAX - 1, 2);
        assert_eq!(tasks.len(), 2);
        assert_eq!(
            tasks[0].range,
            UnitRange {
                start: 1,
                end: u64::MAX - 1
            }
        );
        assert_eq!(
            tasks[1].range,
            UnitRange {
                start: u64::MAX,
                end: u64::MAX
            }
        );
        assert_eq!(tasks[1].range.len(), 1);
    }

    #[test]
    fn worker_slots_round_robin() {
        let tasks = plan_tasks(50, 5, 3);
        let slots: Vec<usize> = tasks.iter().map(|t| t.worker_slot).collect();
        assert_eq!(slots, vec![0, 1, 2, 0, 1, 2, 0, 1, 2, 0]);
    }

    #[test]
    fn range_len_and_contains() {
        let r = UnitRange { start: 4, end: 6 };
        assert_eq!(r.len(), 3);
        assert!(r.contains(4));
        assert!(r.contains(6));
        assert!(!r.contains(7));
        assert_eq!(r.to_string(), "4-6");
    }
}
