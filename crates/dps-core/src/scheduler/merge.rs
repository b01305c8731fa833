//! Assembles the final ordered result set from settled tasks.

use crate::processor::UnitResult;
use crate::scheduler::model::{Task, TaskFailure, TaskStatus};

/// Collects results from Completed tasks, ordered ascending by unit key,
/// plus a failure record for every task that contributed nothing.
///
/// Failed and Cancelled tasks are silently absent from the merged output;
/// callers that care inspect the failure list. Only the natural
/// all-tasks-settled join calls this, never the cancellation path.
pub(super) fn merge_results(tasks: &[Task]) -> (Vec<UnitResult>, Vec<TaskFailure>) {
    let mut merged: Vec<UnitResult> = Vec::new();
    let mut failures: Vec<TaskFailure> = Vec::new();

    for task in tasks {
        match task.status {
            TaskStatus::Completed => {
                if let Some(results) = &task.results {
                    merged.extend(results.iter().cloned());
                }
            }
            TaskStatus::Failed | TaskStatus::Cancelled => failures.push(TaskFailure {
                task_index: task.index,
                range: task.range,
                error: task
                    .error
                    .clone()
                    .unwrap_or_else(|| "cancelled".to_string()),
            }),
            // A non-terminal task here means the join fired early; surface it
            // as a failure rather than dropping the range without a trace.
            TaskStatus::Pending | TaskStatus::InProgress => failures.push(TaskFailure {
                task_index: task.index,
                range: task.range,
                error: "task never settled".to_string(),
            }),
        }
    }

    merged.sort_by_key(|r| r.unit);
    (merged, failures)
}
