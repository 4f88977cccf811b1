//! Ingestion pipeline constants.

/// Source id for the Alpha Vantage adapter
pub const SOURCE_ALPHA_VANTAGE: &str = "alpha_vantage";

/// Source id for the Yahoo Finance adapter
pub const SOURCE_YAHOO: &str = "yahoo";

/// Source id for the MarketWatch adapter
pub const SOURCE_MARKETWATCH: &str = "marketwatch";

/// Default retry budget per symbol within one run
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Default per-fetch timeout in seconds
pub const DEFAULT_FETCH_TIMEOUT_SECS: u64 = 30;

/// Default wall-clock budget for a whole run, in seconds
pub const DEFAULT_RUN_BUDGET_SECS: u64 = 300;

/// Default lookback window for fetches, in days
pub const DEFAULT_LOOKBACK_DAYS: i64 = 30;

/// Default tolerance for observation timestamps ahead of the local clock,
/// in seconds
pub const DEFAULT_CLOCK_SKEW_TOLERANCE_SECS: u64 = 300;
