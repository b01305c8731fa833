//! Mock collaborators for scheduler integration tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use dps_core::partitioner::UnitRange;
use dps_core::processor::{UnitResult, WorkSourceStore, WorkUnitProcessor};

/// Scripted work-unit processor: sleeps `delay` per range, fails ranges whose
/// start unit is listed in `fail_starts`, and records the peak number of
/// concurrent in-flight calls so tests can assert the gate bound.
pub struct MockProcessor {
    pub delay: Duration,
    pub fail_starts: Vec<u64>,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
}

impl MockProcessor {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            fail_starts: Vec::new(),
            in_flight: AtomicUsize::new(0),
            peak_in_flight: AtomicUsize::new(0),
        }
    }

    pub fn failing(delay: Duration, fail_starts: Vec<u64>) -> Self {
        Self {
            fail_starts,
            ..Self::new(delay)
        }
    }

    /// Highest number of simultaneously in-flight `process_range` calls seen.
    pub fn peak_concurrency(&self) -> usize {
        self.peak_in_flight.load(Ordering::Relaxed)
    }

    fn enter(&self) {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(now, Ordering::SeqCst);
    }

    fn exit(&self) {
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl WorkUnitProcessor for MockProcessor {
    async fn process_range(
        &self,
        _source_ref: &str,
        range: UnitRange,
        cancel: CancellationToken,
    ) -> anyhow::Result<Vec<UnitResult>> {
        self.enter();
        let outcome = tokio::select! {
            _ = cancel.cancelled() => Err(anyhow::anyhow!("processor observed cancellation")),
            _ = tokio::time::sleep(self.delay) => {
                if self.fail_starts.contains(&range.start) {
                    Err(anyhow::anyhow!("scripted failure for range {range}"))
                } else {
                    Ok((range.start..=range.end)
                        .map(|unit| UnitResult {
                            unit,
                            payload: serde_json::json!({ "unit": unit, "answer": format!("a{unit}") }),
                        })
                        .collect())
                }
            }
        };
        self.exit();
        outcome
    }
}

/// Processor that panics instead of returning, to exercise the defensive
/// join layer (a panicking execution must fail the whole session).
pub struct PanickingProcessor;

#[async_trait]
impl WorkUnitProcessor for PanickingProcessor {
    async fn process_range(
        &self,
        _source_ref: &str,
        range: UnitRange,
        _cancel: CancellationToken,
    ) -> anyhow::Result<Vec<UnitResult>> {
        panic!("processor blew up on range {range}");
    }
}

/// Work-source store that records which sources were released.
#[derive(Default)]
pub struct MockStore {
    released: Mutex<Vec<String>>,
}

impl MockStore {
    pub fn released(&self) -> Vec<String> {
        self.released.lock().unwrap().clone()
    }
}

#[async_trait]
impl WorkSourceStore for MockStore {
    async fn release(&self, source_ref: &str) -> anyhow::Result<()> {
        self.released.lock().unwrap().push(source_ref.to_string());
        Ok(())
    }
}
