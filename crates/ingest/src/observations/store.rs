//! Observation storage port.
//!
//! This module defines the storage interface the pipeline writes through,
//! abstracting the persistence layer so different backends (SQLite,
//! PostgreSQL, an in-memory map) can be used interchangeably. The port is
//! deliberately narrow: insert against the natural key, and lookup by the
//! natural key. Observations are immutable, so there is no update.

use async_trait::async_trait;
use log::warn;
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use super::model::{ObservationKey, PriceObservation};
use crate::errors::StoreError;

// =============================================================================
// Port
// =============================================================================

/// Outcome of an insert against the natural key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    /// The observation was new and is now stored.
    Inserted,
    /// A row with the same (symbol, timestamp, source) already exists;
    /// the stored row is left untouched.
    DuplicateIgnored,
}

/// Storage interface for price observations.
///
/// Implementations must enforce uniqueness on the natural key themselves:
/// concurrent inserts of the same key from different pipelines must yield
/// exactly one `Inserted` and otherwise `DuplicateIgnored`.
#[async_trait]
pub trait ObservationStore: Send + Sync {
    /// Inserts an observation unless its natural key is already present.
    ///
    /// # Returns
    ///
    /// `Inserted` for a new row, `DuplicateIgnored` when the key exists.
    async fn insert(&self, observation: PriceObservation) -> Result<InsertOutcome, StoreError>;

    /// Looks up the stored observation for a natural key.
    async fn lookup(&self, key: &ObservationKey) -> Result<Option<PriceObservation>, StoreError>;
}

// =============================================================================
// In-Memory Store
// =============================================================================

/// Reference `ObservationStore` backed by a process-local map.
///
/// Used by tests and as the default wiring until a real backend is attached.
#[derive(Default)]
pub struct MemoryObservationStore {
    rows: RwLock<HashMap<ObservationKey, PriceObservation>>,
}

impl MemoryObservationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored observations.
    pub fn len(&self) -> usize {
        self.read_rows().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn read_rows(&self) -> RwLockReadGuard<'_, HashMap<ObservationKey, PriceObservation>> {
        self.rows.read().unwrap_or_else(|poisoned| {
            warn!("Observation store lock poisoned; recovering");
            poisoned.into_inner()
        })
    }

    fn write_rows(&self) -> RwLockWriteGuard<'_, HashMap<ObservationKey, PriceObservation>> {
        self.rows.write().unwrap_or_else(|poisoned| {
            warn!("Observation store lock poisoned; recovering");
            poisoned.into_inner()
        })
    }
}

#[async_trait]
impl ObservationStore for MemoryObservationStore {
    async fn insert(&self, observation: PriceObservation) -> Result<InsertOutcome, StoreError> {
        let mut rows = self.write_rows();
        match rows.entry(observation.key()) {
            Entry::Occupied(_) => Ok(InsertOutcome::DuplicateIgnored),
            Entry::Vacant(slot) => {
                slot.insert(observation);
                Ok(InsertOutcome::Inserted)
            }
        }
    }

    async fn lookup(&self, key: &ObservationKey) -> Result<Option<PriceObservation>, StoreError> {
        Ok(self.read_rows().get(key).cloned())
    }
}
