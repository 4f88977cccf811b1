//! Price observation module.
//!
//! The validated output side of the pipeline: the observation record itself,
//! its natural key, the quality tier, and the storage port observations are
//! written through.

mod model;
mod store;

pub use model::{
    ObservationKey, PriceObservation, QualityTier, QUALITY_TIER_HIGH, QUALITY_TIER_LOW,
    QUALITY_TIER_MEDIUM,
};
pub use store::{InsertOutcome, MemoryObservationStore, ObservationStore};
