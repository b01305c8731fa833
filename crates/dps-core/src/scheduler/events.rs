//! Session notifications.
//!
//! Events fan out over a broadcast channel obtained from
//! `SessionManager::subscribe`. Delivery is best-effort: a lagging
//! subscriber loses the oldest events, and each `Progress` event is a
//! full-state snapshot, so the latest one always wins.

use crate::processor::UnitResult;
use crate::scheduler::model::{MetricsSnapshot, TaskCounts, TaskFailure};
use uuid::Uuid;

/// Capacity of the manager's broadcast channel.
pub(crate) const EVENT_CHANNEL_CAPACITY: usize = 256;

#[derive(Debug, Clone)]
pub enum SchedulerEvent {
    /// Emitted after every task terminal transition and on every monitor tick.
    Progress {
        session_id: Uuid,
        completed_units: u64,
        total_units: u64,
        task_counts: TaskCounts,
        metrics: MetricsSnapshot,
    },
    /// Emitted exactly once per session, when it reaches a terminal state.
    /// `success` is false for Failed and Cancelled sessions; `failures`
    /// lists the tasks whose ranges are missing from `results`.
    Completed {
        session_id: Uuid,
        success: bool,
        results: Vec<UnitResult>,
        failures: Vec<TaskFailure>,
        metrics: MetricsSnapshot,
        error: Option<String>,
    },
}

impl SchedulerEvent {
    pub fn session_id(&self) -> Uuid {
        match self {
            SchedulerEvent::Progress { session_id, .. }
            | SchedulerEvent::Completed { session_id, .. } => *session_id,
        }
    }
}
