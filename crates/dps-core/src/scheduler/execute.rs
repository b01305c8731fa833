//! Single-task execution: gate acquisition, status transitions, fault isolation.
//!
//! Errors are caught here and recorded on the task; a failing task never
//! aborts its siblings. The gate permit is held only for the processor call
//! and is released on every exit path.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use thiserror::Error;
use tokio::sync::{broadcast, Mutex};
use tokio_util::sync::CancellationToken;

use crate::partitioner::UnitRange;
use crate::probe::ResourceProbe;
use crate::processor::{UnitResult, WorkUnitProcessor};
use crate::scheduler::events::SchedulerEvent;
use crate::scheduler::gate::ConcurrencyGate;
use crate::scheduler::model::{Session, TaskCounts, TaskStatus};
use crate::scheduler::progress;

/// Why one task execution stopped without results. Classified at the task
/// boundary so the terminal transition can be recorded on the right task.
#[derive(Debug, Error)]
pub(super) enum TaskError {
    #[error("cancelled")]
    Cancelled,
    #[error("timed out after {0}s")]
    Timeout(u64),
    #[error("{0}")]
    Processor(anyhow::Error),
}

/// Everything one task execution needs; cheap to clone per task.
#[derive(Clone)]
pub(super) struct TaskContext {
    pub session: Arc<Mutex<Session>>,
    pub gate: ConcurrencyGate,
    pub processor: Arc<dyn WorkUnitProcessor>,
    pub probe: Arc<dyn ResourceProbe>,
    pub events: broadcast::Sender<SchedulerEvent>,
    pub cancel: CancellationToken,
}

/// Runs one task to a terminal state. Never returns an error: every outcome
/// (results, processor failure, timeout, cancellation) is recorded on the
/// task record and followed by a progress recompute + emission.
pub(super) async fn run_task(ctx: TaskContext, task_index: usize) {
    let (source_ref, range, timeout_secs) = {
        let s = ctx.session.lock().await;
        let task = &s.tasks[task_index];
        (s.source_ref.clone(), task.range, s.config.task_timeout_secs)
    };

    // A task cancelled before it starts never touches the gate.
    if ctx.cancel.is_cancelled() {
        settle(&ctx, task_index, Err(TaskError::Cancelled)).await;
        return;
    }

    let permit = tokio::select! {
        _ = ctx.cancel.cancelled() => {
            settle(&ctx, task_index, Err(TaskError::Cancelled)).await;
            return;
        }
        permit = ctx.gate.acquire() => permit,
    };
    let Some(_permit) = permit else {
        settle(
            &ctx,
            task_index,
            Err(TaskError::Processor(anyhow::anyhow!(
                "concurrency gate closed"
            ))),
        )
        .await;
        return;
    };

    if !mark_in_progress(&ctx, task_index).await {
        // Cancellation settled the task while we waited on the gate.
        return;
    }
    tracing::debug!(task = task_index, range = %range, "task started");

    let outcome = invoke_processor(&ctx, &source_ref, range, timeout_secs).await;
    settle(&ctx, task_index, outcome).await;
    // _permit drops here: the gate slot is released on every exit path.
}

async fn invoke_processor(
    ctx: &TaskContext,
    source_ref: &str,
    range: UnitRange,
    timeout_secs: Option<u64>,
) -> Result<Vec<UnitResult>, TaskError> {
    let call = ctx
        .processor
        .process_range(source_ref, range, ctx.cancel.child_token());

    tokio::select! {
        _ = ctx.cancel.cancelled() => Err(TaskError::Cancelled),
        res = async {
            match timeout_secs {
                Some(secs) => match tokio::time::timeout(Duration::from_secs(secs), call).await {
                    Ok(inner) => inner.map_err(TaskError::Processor),
                    Err(_) => Err(TaskError::Timeout(secs)),
                },
                None => call.await.map_err(TaskError::Processor),
            }
        } => res,
    }
}

/// Transitions the task Pending → InProgress. Returns false if cancellation
/// already moved it to a terminal state.
async fn mark_in_progress(ctx: &TaskContext, task_index: usize) -> bool {
    let event = {
        let mut s = ctx.session.lock().await;
        let task = &mut s.tasks[task_index];
        if task.status != TaskStatus::Pending {
            return false;
        }
        task.status = TaskStatus::InProgress;
        task.started_at = Some(Utc::now());
        progress::recompute(&mut s, ctx.probe.as_ref());
        progress_event(&s)
    };
    let _ = ctx.events.send(event);
    true
}

/// Records the task's terminal state and emits a fresh progress snapshot.
/// A task that is already terminal (cancelled out from under us) is left
/// untouched so status transitions stay one-directional.
async fn settle(
    ctx: &TaskContext,
    task_index: usize,
    outcome: Result<Vec<UnitResult>, TaskError>,
) {
    let event = {
        let mut s = ctx.session.lock().await;
        let task = &mut s.tasks[task_index];
        if task.status.is_terminal() {
            return;
        }
        task.completed_at = Some(Utc::now());
        match outcome {
            Ok(results) => {
                task.status = TaskStatus::Completed;
                task.progress_percent = 100.0;
                task.results = Some(results);
                tracing::debug!(task = task_index, range = %task.range, "task completed");
            }
            Err(TaskError::Cancelled) => {
                task.status = TaskStatus::Cancelled;
                tracing::debug!(task = task_index, range = %task.range, "task cancelled");
            }
            Err(err) => {
                task.status = TaskStatus::Failed;
                task.error = Some(err.to_string());
                tracing::warn!(task = task_index, range = %task.range, error = %err, "task failed");
            }
        }
        progress::recompute(&mut s, ctx.probe.as_ref());
        progress_event(&s)
    };
    let _ = ctx.events.send(event);
}

pub(super) fn progress_event(session: &Session) -> SchedulerEvent {
    SchedulerEvent::Progress {
        session_id: session.id,
        completed_units: session.completed_units,
        total_units: session.total_units,
        task_counts: TaskCounts::of(&session.tasks),
        metrics: session.metrics,
    }
}
