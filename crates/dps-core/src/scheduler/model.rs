//! Session and task records, statuses, counters, and metrics.
//!
//! A `Session` owns the full task list for one work source. Records live in
//! the manager's registry; reads get clones, so every query is a snapshot.

use crate::config::SchedulerConfig;
use crate::partitioner::{TaskPlan, UnitRange};
use crate::processor::UnitResult;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Session lifecycle. Transitions are monotonic:
/// Created → Processing → {Completed, Failed, Cancelled}.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionStatus {
    Created,
    Processing,
    Completed,
    Failed,
    Cancelled,
}

impl SessionStatus {
    /// Terminal states never transition further; the cleanup sweep is the
    /// only thing that touches a terminal session.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SessionStatus::Completed | SessionStatus::Failed | SessionStatus::Cancelled
        )
    }
}

/// Task lifecycle. Transitions are monotonic:
/// Pending → InProgress → {Completed, Failed, Cancelled}.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaskStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
    Cancelled,
}

impl TaskStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskStatus::Completed | TaskStatus::Failed | TaskStatus::Cancelled
        )
    }
}

/// One execution attempt over a contiguous unit range.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: Uuid,
    /// Position in the session's plan (stable for the session's lifetime).
    pub index: usize,
    pub range: UnitRange,
    /// Display grouping only; no execution affinity.
    pub worker_slot: usize,
    pub status: TaskStatus,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    /// 0.0 while Pending, 100.0 once Completed.
    pub progress_percent: f64,
    /// Processor output, present only on Completed.
    pub results: Option<Vec<UnitResult>>,
    pub error: Option<String>,
}

impl Task {
    pub fn from_plan(plan: &TaskPlan) -> Self {
        Self {
            id: Uuid::new_v4(),
            index: plan.index,
            range: plan.range,
            worker_slot: plan.worker_slot,
            status: TaskStatus::Pending,
            started_at: None,
            completed_at: None,
            progress_percent: 0.0,
            results: None,
            error: None,
        }
    }
}

/// Per-status task tally, recomputed for every progress emission.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskCounts {
    pub pending: usize,
    pub in_progress: usize,
    pub completed: usize,
    pub failed: usize,
    pub cancelled: usize,
}

impl TaskCounts {
    pub fn of(tasks: &[Task]) -> Self {
        let mut counts = Self::default();
        for task in tasks {
            match task.status {
                TaskStatus::Pending => counts.pending += 1,
                TaskStatus::InProgress => counts.in_progress += 1,
                TaskStatus::Completed => counts.completed += 1,
                TaskStatus::Failed => counts.failed += 1,
                TaskStatus::Cancelled => counts.cancelled += 1,
            }
        }
        counts
    }
}

/// Point-in-time resource and throughput measurements for a session.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    /// Seconds since processing started (0 before start).
    pub duration_secs: f64,
    /// System CPU utilization at measurement time, 0.0–100.0.
    pub cpu_percent: f64,
    /// System memory in use at measurement time, bytes.
    pub memory_bytes: u64,
    /// Tasks currently InProgress.
    pub active_workers: usize,
    /// Completed units per elapsed second (0 when elapsed ≈ 0).
    pub units_per_sec: f64,
}

/// A task that contributed nothing to the merged output, and why.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskFailure {
    pub task_index: usize,
    pub range: UnitRange,
    pub error: String,
}

/// The job grouping all tasks derived from one work source.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: Uuid,
    /// Opaque reference to the backing work source (resolved by collaborators).
    pub source_ref: String,
    pub status: SessionStatus,
    /// Unit-count estimate at creation; rewritten to the merged count on the
    /// natural join, which may be lower when tasks failed.
    pub total_units: u64,
    pub completed_units: u64,
    pub tasks: Vec<Task>,
    /// Final ordered output, populated only when the session completes.
    pub merged: Option<Vec<UnitResult>>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
    pub metrics: MetricsSnapshot,
    /// Sizing config this session was created with (gate capacity excluded;
    /// that is fixed process-wide).
    pub config: SchedulerConfig,
}

impl Session {
    pub fn new(
        source_ref: String,
        total_units: u64,
        plan: &[TaskPlan],
        config: SchedulerConfig,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            source_ref,
            status: SessionStatus::Created,
            total_units,
            completed_units: 0,
            tasks: plan.iter().map(Task::from_plan).collect(),
            merged: None,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            error: None,
            metrics: MetricsSnapshot::default(),
            config,
        }
    }

    /// Seconds of processing so far (0 before start, frozen once completed).
    pub fn elapsed_secs(&self) -> f64 {
        let Some(started) = self.started_at else {
            return 0.0;
        };
        let end = self.completed_at.unwrap_or_else(Utc::now);
        (end - started).num_milliseconds().max(0) as f64 / 1000.0
    }
}
