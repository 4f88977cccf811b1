//! Finboard Ingest - Scrape run orchestration and observation persistence.
//!
//! This crate turns normalized records from `finboard-market-data` adapters
//! into persisted [`PriceObservation`] rows with a full [`ScrapeRun`] audit
//! trail. It is storage-agnostic: persistence sits behind the
//! [`ObservationStore`] and [`RunLog`] traits, with in-memory
//! implementations included for tests and small deployments.

pub mod config;
pub mod constants;
pub mod errors;
pub mod observations;
pub mod pipeline;
pub mod runs;

// Re-export the pipeline entry points and common types
pub use config::PipelineConfig;
pub use errors::{IngestError, Result, StoreError};
pub use observations::{
    InsertOutcome, MemoryObservationStore, ObservationKey, ObservationStore, PriceObservation,
    QualityTier,
};
pub use pipeline::{
    CancelToken, IngestionPipeline, ObservationValidator, RunRequest, ValidationFailure,
    ValidatorConfig,
};
pub use runs::{MemoryRunLog, RunLog, ScrapeRun, ScrapeStatus, ScrapeType};
