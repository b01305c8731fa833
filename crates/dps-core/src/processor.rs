//! Collaborator seams: work-unit processing and work-source storage.
//!
//! The scheduler treats "process one range of units" as an opaque async call.
//! Extraction, model calls, and response parsing all live behind
//! `WorkUnitProcessor`; the scheduler only sees unit-keyed payloads or an error.

use crate::partitioner::UnitRange;
use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

/// Processed output for a single work unit. The payload shape is owned by
/// the processor; the scheduler only orders by `unit`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnitResult {
    /// Work-unit number this result belongs to (1-based).
    pub unit: u64,
    /// Opaque processor output.
    pub payload: serde_json::Value,
}

/// Processes a contiguous range of work units from one work source.
///
/// Implementations should observe `cancel` at their own await points so
/// in-flight calls wind down promptly; the scheduler also races the call
/// against the token, so observation is best-effort.
#[async_trait]
pub trait WorkUnitProcessor: Send + Sync {
    async fn process_range(
        &self,
        source_ref: &str,
        range: UnitRange,
        cancel: CancellationToken,
    ) -> Result<Vec<UnitResult>>;
}

/// Owns the backing work sources. The cleanup sweep asks it to release a
/// source once the session referencing it has been removed.
#[async_trait]
pub trait WorkSourceStore: Send + Sync {
    async fn release(&self, source_ref: &str) -> Result<()>;
}
