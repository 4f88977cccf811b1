//! Run log port.
//!
//! The audit trail of scrape runs. The log is pure recording: it never
//! rejects a well-formed run, and reads are finite, most-recent-first, and
//! restartable (each query recomputes from the log, holding no cursor).

use async_trait::async_trait;
use log::warn;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use super::model::ScrapeRun;
use crate::errors::StoreError;

// =============================================================================
// Port
// =============================================================================

/// Storage interface for the scrape run audit trail.
#[async_trait]
pub trait RunLog: Send + Sync {
    /// Records a new run.
    async fn append(&self, run: ScrapeRun) -> Result<(), StoreError>;

    /// Replaces the recorded state of a run, matched by id.
    ///
    /// An unknown id is recorded as a fresh entry rather than rejected.
    async fn update(&self, run: ScrapeRun) -> Result<(), StoreError>;

    /// Most recent runs for a source, newest first, at most `limit` entries.
    async fn recent(&self, source: &str, limit: usize) -> Result<Vec<ScrapeRun>, StoreError>;
}

// =============================================================================
// In-Memory Log
// =============================================================================

/// Reference `RunLog` backed by a process-local list.
#[derive(Default)]
pub struct MemoryRunLog {
    runs: RwLock<Vec<ScrapeRun>>,
}

impl MemoryRunLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of recorded runs.
    pub fn len(&self) -> usize {
        self.read_runs().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn read_runs(&self) -> RwLockReadGuard<'_, Vec<ScrapeRun>> {
        self.runs.read().unwrap_or_else(|poisoned| {
            warn!("Run log lock poisoned; recovering");
            poisoned.into_inner()
        })
    }

    fn write_runs(&self) -> RwLockWriteGuard<'_, Vec<ScrapeRun>> {
        self.runs.write().unwrap_or_else(|poisoned| {
            warn!("Run log lock poisoned; recovering");
            poisoned.into_inner()
        })
    }
}

#[async_trait]
impl RunLog for MemoryRunLog {
    async fn append(&self, run: ScrapeRun) -> Result<(), StoreError> {
        self.write_runs().push(run);
        Ok(())
    }

    async fn update(&self, run: ScrapeRun) -> Result<(), StoreError> {
        let mut runs = self.write_runs();
        match runs.iter_mut().find(|existing| existing.id == run.id) {
            Some(slot) => *slot = run,
            None => {
                warn!("Run {} not in log; recording as new entry", run.id);
                runs.push(run);
            }
        }
        Ok(())
    }

    async fn recent(&self, source: &str, limit: usize) -> Result<Vec<ScrapeRun>, StoreError> {
        Ok(self
            .read_runs()
            .iter()
            .rev()
            .filter(|run| run.source == source)
            .take(limit)
            .cloned()
            .collect())
    }
}
