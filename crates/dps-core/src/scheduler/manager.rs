//! Session lifecycle: registry, state machine, monitor loop, join, cleanup.
//!
//! The registry maps session id → record + cancellation scope. Discipline:
//! only the owning lifecycle operation (task executions, the joiner, cancel)
//! mutates a session's fields; queries clone snapshots. Counters are
//! eventually-consistent reads, not transactional ones.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use chrono::Utc;
use tokio::sync::{broadcast, Mutex, RwLock};
use tokio::task::JoinSet;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::allocator;
use crate::config::SchedulerConfig;
use crate::partitioner;
use crate::probe::ResourceProbe;
use crate::processor::{WorkSourceStore, WorkUnitProcessor};
use crate::scheduler::events::{SchedulerEvent, EVENT_CHANNEL_CAPACITY};
use crate::scheduler::execute::{self, TaskContext};
use crate::scheduler::gate::ConcurrencyGate;
use crate::scheduler::merge::merge_results;
use crate::scheduler::model::{Session, SessionStatus, TaskFailure, TaskStatus};
use crate::scheduler::progress;

/// Registry entry: the session record plus its cancellation scope.
#[derive(Clone)]
struct SessionEntry {
    session: Arc<Mutex<Session>>,
    cancel: CancellationToken,
}

/// Owns all sessions in the process and drives their state machines.
///
/// The concurrency gate is sized once here, from the default config's
/// `max_workers`; sessions created with a custom config share it unchanged.
pub struct SessionManager {
    registry: RwLock<HashMap<Uuid, SessionEntry>>,
    gate: ConcurrencyGate,
    processor: Arc<dyn WorkUnitProcessor>,
    probe: Arc<dyn ResourceProbe>,
    store: Option<Arc<dyn WorkSourceStore>>,
    events: broadcast::Sender<SchedulerEvent>,
    cfg: SchedulerConfig,
}

impl SessionManager {
    pub fn new(
        cfg: SchedulerConfig,
        processor: Arc<dyn WorkUnitProcessor>,
        probe: Arc<dyn ResourceProbe>,
        store: Option<Arc<dyn WorkSourceStore>>,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            registry: RwLock::new(HashMap::new()),
            gate: ConcurrencyGate::new(cfg.max_workers),
            processor,
            probe,
            store,
            events,
            cfg,
        }
    }

    /// Subscribe to progress/completion notifications for all sessions.
    /// Lossy under lag; every Progress event is a full-state snapshot.
    pub fn subscribe(&self) -> broadcast::Receiver<SchedulerEvent> {
        self.events.subscribe()
    }

    /// Gate capacity chosen at construction (for status surfaces and tests).
    pub fn gate_capacity(&self) -> usize {
        self.gate.capacity()
    }

    /// Creates a session in Created: runs the allocator and partitioner and
    /// stores the record. `config` overrides the default for task sizing and
    /// adaptive allocation only — never the shared gate.
    pub async fn create_session(
        &self,
        source_ref: impl Into<String>,
        total_units: u64,
        config: Option<SchedulerConfig>,
    ) -> Result<Uuid> {
        let source_ref = source_ref.into();
        let cfg = config.unwrap_or_else(|| self.cfg.clone());
        if total_units == 0 {
            anyhow::bail!("total_units must be positive");
        }
        if cfg.units_per_task == 0 {
            anyhow::bail!("units_per_task must be positive");
        }

        let workers = allocator::effective_workers(total_units, &cfg, self.probe.as_ref());
        let plan = partitioner::plan_tasks(total_units, cfg.units_per_task, workers);
        let session = Session::new(source_ref, total_units, &plan, cfg);
        let id = session.id;

        tracing::info!(
            session = %id,
            total_units,
            tasks = plan.len(),
            workers,
            "session created"
        );

        self.registry.write().await.insert(
            id,
            SessionEntry {
                session: Arc::new(Mutex::new(session)),
                cancel: CancellationToken::new(),
            },
        );
        Ok(id)
    }

    /// Transitions Created → Processing and launches one execution per task,
    /// the monitor loop, and the joiner. Returns false (with a warning) for
    /// unknown sessions or any status other than Created.
    pub async fn start_processing(&self, id: Uuid) -> bool {
        let Some(entry) = self.entry(id).await else {
            tracing::warn!(session = %id, "start requested for unknown session");
            return false;
        };

        let (task_count, interval_ms) = {
            let mut s = entry.session.lock().await;
            if s.status != SessionStatus::Created {
                tracing::warn!(session = %id, status = ?s.status, "start refused: wrong state");
                return false;
            }
            s.status = SessionStatus::Processing;
            s.started_at = Some(Utc::now());
            (s.tasks.len(), s.config.monitor_interval_ms)
        };

        let ctx = TaskContext {
            session: Arc::clone(&entry.session),
            gate: self.gate.clone(),
            processor: Arc::clone(&self.processor),
            probe: Arc::clone(&self.probe),
            events: self.events.clone(),
            cancel: entry.cancel.clone(),
        };

        tracing::info!(session = %id, tasks = task_count, "processing started");

        tokio::spawn(run_monitor(ctx.clone(), interval_ms));
        tokio::spawn(run_join(ctx, task_count));
        true
    }

    /// Cancels a Created or Processing session: trips its cancellation scope,
    /// moves every non-terminal task to Cancelled, and stamps the session
    /// Cancelled. Never produces a merged result. Returns false for unknown
    /// or already-terminal sessions.
    pub async fn cancel_processing(&self, id: Uuid) -> bool {
        let Some(entry) = self.entry(id).await else {
            tracing::warn!(session = %id, "cancel requested for unknown session");
            return false;
        };
        entry.cancel.cancel();

        let event = {
            let mut s = entry.session.lock().await;
            if s.status.is_terminal() {
                tracing::warn!(session = %id, status = ?s.status, "cancel refused: already terminal");
                return false;
            }
            let now = Utc::now();
            for task in &mut s.tasks {
                if !task.status.is_terminal() {
                    task.status = TaskStatus::Cancelled;
                    task.completed_at = Some(now);
                }
            }
            s.status = SessionStatus::Cancelled;
            s.completed_at = Some(now);
            progress::recompute(&mut s, self.probe.as_ref());
            tracing::info!(session = %id, "session cancelled");

            let failures: Vec<TaskFailure> = s
                .tasks
                .iter()
                .filter(|t| t.status != TaskStatus::Completed)
                .map(|t| TaskFailure {
                    task_index: t.index,
                    range: t.range,
                    error: t.error.clone().unwrap_or_else(|| "cancelled".to_string()),
                })
                .collect();
            SchedulerEvent::Completed {
                session_id: s.id,
                success: false,
                results: Vec::new(),
                failures,
                metrics: s.metrics,
                error: Some("cancelled".to_string()),
            }
        };
        let _ = self.events.send(event);
        true
    }

    /// Point-in-time snapshot of one session.
    pub async fn get_session(&self, id: Uuid) -> Option<Session> {
        let entry = self.entry(id).await?;
        let s = entry.session.lock().await;
        Some(s.clone())
    }

    /// Snapshots of all non-terminal sessions. Terminal sessions stay
    /// fetchable by id until the cleanup sweep removes them.
    pub async fn list_active_sessions(&self) -> Vec<Session> {
        let registry = self.registry.read().await;
        let mut out = Vec::new();
        for entry in registry.values() {
            let s = entry.session.lock().await;
            if !s.status.is_terminal() {
                out.push(s.clone());
            }
        }
        out
    }

    /// Removes terminal sessions whose completion stamp is older than
    /// `retention` and asks the work-source store (when present) to release
    /// their backing sources. Returns the number removed. Sessions younger
    /// than the retention window are never touched.
    pub async fn cleanup_terminal_sessions(&self, retention: Duration) -> usize {
        let now = Utc::now();
        let mut expired: Vec<(Uuid, String)> = Vec::new();
        {
            let mut registry = self.registry.write().await;
            for (id, entry) in registry.iter() {
                let s = entry.session.lock().await;
                if !s.status.is_terminal() {
                    continue;
                }
                let Some(done) = s.completed_at else { continue };
                let age = (now - done).to_std().unwrap_or_default();
                if age >= retention {
                    expired.push((*id, s.source_ref.clone()));
                }
            }
            for (id, _) in &expired {
                registry.remove(id);
            }
        }

        for (id, source_ref) in &expired {
            if let Some(store) = &self.store {
                if let Err(e) = store.release(source_ref).await {
                    tracing::warn!(session = %id, error = %e, "work source release failed");
                }
            }
            tracing::info!(session = %id, "removed terminal session");
        }
        expired.len()
    }

    /// Periodic cleanup sweep using the config's `[cleanup]` settings.
    /// Runs until `shutdown` is cancelled; spawn it once per process.
    pub async fn run_cleanup_loop(&self, shutdown: CancellationToken) {
        let cleanup = self.cfg.cleanup_or_default();
        let retention = Duration::from_secs(cleanup.retention_secs);
        let mut interval =
            tokio::time::interval(Duration::from_secs(cleanup.sweep_interval_secs.max(1)));
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        interval.tick().await; // first tick fires immediately; sweep after one full interval

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = interval.tick() => {
                    let removed = self.cleanup_terminal_sessions(retention).await;
                    if removed > 0 {
                        tracing::debug!(removed, "cleanup sweep");
                    }
                }
            }
        }
        tracing::debug!("cleanup loop stopped");
    }

    async fn entry(&self, id: Uuid) -> Option<SessionEntry> {
        self.registry.read().await.get(&id).cloned()
    }
}

/// Recomputes and emits progress on a fixed tick until the session leaves
/// Processing or the session's cancellation scope trips.
async fn run_monitor(ctx: TaskContext, interval_ms: u64) {
    let mut interval = tokio::time::interval(Duration::from_millis(interval_ms.max(50)));
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            _ = ctx.cancel.cancelled() => break,
            _ = interval.tick() => {}
        }
        let event = {
            let mut s = ctx.session.lock().await;
            if s.status != SessionStatus::Processing {
                break;
            }
            progress::recompute(&mut s, ctx.probe.as_ref());
            execute::progress_event(&s)
        };
        let _ = ctx.events.send(event);
    }
}

/// Awaits every task execution, then merges and completes the session.
/// Task errors are already isolated at the task boundary; an error escaping
/// the join itself (a panicked execution) fails the session — a defensive
/// second layer that should not trigger in normal operation.
async fn run_join(ctx: TaskContext, task_count: usize) {
    let mut join_set = JoinSet::new();
    for index in 0..task_count {
        join_set.spawn(execute::run_task(ctx.clone(), index));
    }

    let mut join_error: Option<String> = None;
    while let Some(res) = join_set.join_next().await {
        if let Err(e) = res {
            join_error = Some(format!("task join: {e}"));
        }
    }

    let event = {
        let mut s = ctx.session.lock().await;
        if s.status != SessionStatus::Processing {
            // Cancellation won the race; its terminal state stands.
            return;
        }
        s.completed_at = Some(Utc::now());
        progress::recompute(&mut s, ctx.probe.as_ref());

        match join_error {
            Some(msg) => {
                s.status = SessionStatus::Failed;
                s.error = Some(msg.clone());
                tracing::error!(session = %s.id, error = %msg, "session failed in join");
                SchedulerEvent::Completed {
                    session_id: s.id,
                    success: false,
                    results: Vec::new(),
                    failures: Vec::new(),
                    metrics: s.metrics,
                    error: Some(msg),
                }
            }
            None => {
                let (merged, failures) = merge_results(&s.tasks);
                // Counters now reflect the merged output, which may fall
                // short of the original estimate when tasks failed.
                s.total_units = merged.len() as u64;
                s.completed_units = merged.len() as u64;
                s.merged = Some(merged.clone());
                s.status = SessionStatus::Completed;
                tracing::info!(
                    session = %s.id,
                    merged = merged.len(),
                    failed_tasks = failures.len(),
                    "session completed"
                );
                SchedulerEvent::Completed {
                    session_id: s.id,
                    success: true,
                    results: merged,
                    failures,
                    metrics: s.metrics,
                    error: None,
                }
            }
        }
    };
    let _ = ctx.events.send(event);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::partitioner::UnitRange;
    use crate::probe::StaticProbe;
    use crate::processor::UnitResult;
    use async_trait::async_trait;

    struct NoopProcessor;

    #[async_trait]
    impl WorkUnitProcessor for NoopProcessor {
        async fn process_range(
            &self,
            _source_ref: &str,
            range: UnitRange,
            _cancel: CancellationToken,
        ) -> Result<Vec<UnitResult>> {
            Ok((range.start..=range.end)
                .map(|unit| UnitResult {
                    unit,
                    payload: serde_json::Value::Null,
                })
                .collect())
        }
    }

    fn manager() -> SessionManager {
        SessionManager::new(
            SchedulerConfig::default(),
            Arc::new(NoopProcessor),
            Arc::new(StaticProbe::idle(4)),
            None,
        )
    }

    #[tokio::test]
    async fn create_session_rejects_zero_units() {
        let mgr = manager();
        assert!(mgr.create_session("doc-1", 0, None).await.is_err());
    }

    #[tokio::test]
    async fn create_session_partitions_and_stores() {
        let mgr = manager();
        let cfg = SchedulerConfig {
            units_per_task: 3,
            ..SchedulerConfig::default()
        };
        let id = mgr.create_session("doc-1", 8, Some(cfg)).await.unwrap();
        let s = mgr.get_session(id).await.unwrap();
        assert_eq!(s.status, SessionStatus::Created);
        assert_eq!(s.tasks.len(), 3);
        assert_eq!(s.tasks[0].range, UnitRange { start: 1, end: 3 });
        assert_eq!(s.tasks[2].range, UnitRange { start: 7, end: 8 });
    }

    #[tokio::test]
    async fn start_refused_for_unknown_or_wrong_state() {
        let mgr = manager();
        assert!(!mgr.start_processing(Uuid::new_v4()).await);

        let id = mgr.create_session("doc-1", 4, None).await.unwrap();
        assert!(mgr.start_processing(id).await);
        // second start races the run; either Processing or already terminal,
        // both must refuse
        assert!(!mgr.start_processing(id).await);
    }

    #[tokio::test]
    async fn custom_config_never_resizes_the_gate() {
        let mgr = manager();
        let big = SchedulerConfig {
            max_workers: 64,
            ..SchedulerConfig::default()
        };
        mgr.create_session("doc-1", 8, Some(big)).await.unwrap();
        assert_eq!(mgr.gate_capacity(), SchedulerConfig::default().max_workers);
    }

    #[tokio::test]
    async fn list_active_excludes_terminal_sessions() {
        let mgr = manager();
        let a = mgr.create_session("doc-a", 4, None).await.unwrap();
        let b = mgr.create_session("doc-b", 4, None).await.unwrap();
        assert!(mgr.cancel_processing(b).await);

        let active: Vec<Uuid> = mgr
            .list_active_sessions()
            .await
            .into_iter()
            .map(|s| s.id)
            .collect();
        assert_eq!(active, vec![a]);
        // terminal session still fetchable by id until cleanup
        assert!(mgr.get_session(b).await.is_some());
    }

    #[tokio::test]
    async fn cancel_is_idempotent_only_once() {
        let mgr = manager();
        let id = mgr.create_session("doc-1", 4, None).await.unwrap();
        assert!(mgr.cancel_processing(id).await);
        assert!(!mgr.cancel_processing(id).await);
        let s = mgr.get_session(id).await.unwrap();
        assert_eq!(s.status, SessionStatus::Cancelled);
        assert!(s.merged.is_none());
        assert!(s.tasks.iter().all(|t| t.status == TaskStatus::Cancelled));
    }
}
