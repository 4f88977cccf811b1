//! Pipeline configuration.
//!
//! Configuration is always an explicitly constructed value passed into the
//! pipeline at build time. Nothing here reads the environment or a global.

use std::time::Duration;

use crate::constants::{
    DEFAULT_CLOCK_SKEW_TOLERANCE_SECS, DEFAULT_FETCH_TIMEOUT_SECS, DEFAULT_LOOKBACK_DAYS,
    DEFAULT_MAX_RETRIES, DEFAULT_RUN_BUDGET_SECS,
};

/// Run-level settings for the ingestion pipeline.
#[derive(Clone, Debug, PartialEq)]
pub struct PipelineConfig {
    /// Wall-clock budget for one whole run; exceeded runs finalize as
    /// timed out with partial counts preserved.
    pub run_budget: Duration,

    /// Timeout applied to each individual adapter fetch.
    pub fetch_timeout: Duration,

    /// Retry budget per symbol for transient failures.
    pub max_retries: u32,

    /// How far back fetches reach: `since` is the run start minus this.
    pub lookback: Duration,

    /// How far ahead of the local clock an observation timestamp may sit
    /// before it is rejected.
    pub clock_skew_tolerance: Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            run_budget: Duration::from_secs(DEFAULT_RUN_BUDGET_SECS),
            fetch_timeout: Duration::from_secs(DEFAULT_FETCH_TIMEOUT_SECS),
            max_retries: DEFAULT_MAX_RETRIES,
            lookback: Duration::from_secs(DEFAULT_LOOKBACK_DAYS as u64 * 24 * 60 * 60),
            clock_skew_tolerance: Duration::from_secs(DEFAULT_CLOCK_SKEW_TOLERANCE_SECS),
        }
    }
}
