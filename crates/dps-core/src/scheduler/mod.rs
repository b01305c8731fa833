//! Session and task scheduler.
//!
//! Coordinates the processing pipeline for one work source:
//! partitioner → gate-bounded task executions → progress aggregation →
//! ordered result merge. A process-wide semaphore bounds concurrent
//! processor calls across all sessions.

mod execute;
mod merge;

pub mod events;
pub mod gate;
pub mod manager;
pub mod model;
pub mod progress;

pub use events::SchedulerEvent;
pub use gate::ConcurrencyGate;
pub use manager::SessionManager;
pub use model::{
    MetricsSnapshot, Session, SessionStatus, Task, TaskCounts, TaskFailure, TaskStatus,
};
