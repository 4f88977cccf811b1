//! Scrape run domain models.
//!
//! A `ScrapeRun` records one execution of the pipeline against a source for
//! a set of symbols. Its status is an explicit state machine so retry
//! exhaustion and timeout races stay unambiguous: Pending -> InProgress ->
//! exactly one of {Success, Failed, TimedOut, RateLimited}.

use chrono::{DateTime, Duration, Utc};
use log::warn;
use serde::{Deserialize, Serialize};

// =============================================================================
// Scrape Type
// =============================================================================

/// What kind of data a run collects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ScrapeType {
    /// Daily OHLCV price rows
    #[default]
    StockPrice,
    /// Company profile data
    CompanyInfo,
    /// Fundamentals and statements
    FinancialData,
    /// Index and market-wide data
    MarketData,
    /// News articles
    News,
}

impl ScrapeType {
    /// Returns the string identifier for this scrape type.
    pub fn as_str(&self) -> &'static str {
        match self {
            ScrapeType::StockPrice => "stock_price",
            ScrapeType::CompanyInfo => "company_info",
            ScrapeType::FinancialData => "financial_data",
            ScrapeType::MarketData => "market_data",
            ScrapeType::News => "news",
        }
    }
}

// =============================================================================
// Scrape Status
// =============================================================================

/// Status of a scrape run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ScrapeStatus {
    /// Created and scheduled, not yet claimed
    #[default]
    Pending,
    /// Claimed by the pipeline, attempts underway
    InProgress,
    /// At least one symbol fully processed
    Success,
    /// Every symbol failed after exhausting retries
    Failed,
    /// Wall-clock budget or cancellation cut the run short.
    /// Stored rows use the historical wire name "timeout".
    #[serde(rename = "timeout")]
    TimedOut,
    /// The source rejected the run before any data was obtained
    RateLimited,
}

impl ScrapeStatus {
    /// Returns the string identifier for this status.
    pub fn as_str(&self) -> &'static str {
        match self {
            ScrapeStatus::Pending => "pending",
            ScrapeStatus::InProgress => "in_progress",
            ScrapeStatus::Success => "success",
            ScrapeStatus::Failed => "failed",
            ScrapeStatus::TimedOut => "timeout",
            ScrapeStatus::RateLimited => "rate_limited",
        }
    }

    /// Whether this status ends a run. Terminal statuses are written exactly
    /// once and never left.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ScrapeStatus::Success
                | ScrapeStatus::Failed
                | ScrapeStatus::TimedOut
                | ScrapeStatus::RateLimited
        )
    }

    /// Whether the state machine permits moving from `self` to `next`.
    pub fn can_transition(&self, next: ScrapeStatus) -> bool {
        match (self, next) {
            (ScrapeStatus::Pending, ScrapeStatus::InProgress) => true,
            (ScrapeStatus::InProgress, next) => next.is_terminal(),
            _ => false,
        }
    }
}

// =============================================================================
// Scrape Run
// =============================================================================

/// One execution of the ingestion pipeline against a source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScrapeRun {
    /// Unique identifier for the run
    pub id: String,
    /// Source the run fetched from
    pub source: String,
    /// Kind of data collected
    pub scrape_type: ScrapeType,
    /// Symbol targeted, when the run covers exactly one
    pub target_symbol: Option<String>,
    /// Current status
    pub status: ScrapeStatus,
    /// When the run was created
    pub started_at: DateTime<Utc>,
    /// When the run reached a terminal status
    pub completed_at: Option<DateTime<Utc>>,
    /// Records seen: valid, invalid, and duplicate rows all count once
    pub records_processed: u32,
    /// New observation rows inserted
    pub records_created: u32,
    /// Always zero today; observations are immutable and corrections are
    /// fresh inserts
    pub records_updated: u32,
    /// Failure detail for unsuccessful terminal statuses
    pub error_message: Option<String>,
    /// Highest per-symbol retry count reached during the run
    pub retry_count: u32,
    /// Retry budget per symbol
    pub max_retries: u32,
}

impl ScrapeRun {
    /// Create a new run in Pending.
    pub fn new(
        source: impl Into<String>,
        scrape_type: ScrapeType,
        target_symbol: Option<String>,
        max_retries: u32,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            source: source.into(),
            scrape_type,
            target_symbol,
            status: ScrapeStatus::Pending,
            started_at: Utc::now(),
            completed_at: None,
            records_processed: 0,
            records_created: 0,
            records_updated: 0,
            error_message: None,
            retry_count: 0,
            max_retries,
        }
    }

    /// Claim the run: Pending -> InProgress. Invalid transitions are logged
    /// and ignored.
    pub fn begin(&mut self) {
        if !self.status.can_transition(ScrapeStatus::InProgress) {
            warn!(
                "Ignoring invalid run transition {} -> in_progress for {}",
                self.status.as_str(),
                self.id
            );
            return;
        }
        self.status = ScrapeStatus::InProgress;
    }

    /// Finalize the run with a terminal status, exactly once. Invalid
    /// transitions (already terminal, still pending, non-terminal `status`)
    /// are logged and ignored.
    pub fn finish(&mut self, status: ScrapeStatus, error_message: Option<String>) {
        if !self.status.can_transition(status) {
            warn!(
                "Ignoring invalid run transition {} -> {} for {}",
                self.status.as_str(),
                status.as_str(),
                self.id
            );
            return;
        }
        self.status = status;
        self.completed_at = Some(Utc::now());
        self.error_message = error_message;
    }

    /// Elapsed time from creation to completion, if completed.
    pub fn duration(&self) -> Option<Duration> {
        self.completed_at.map(|done| done - self.started_at)
    }

    /// Whether the run ended in Success.
    pub fn is_successful(&self) -> bool {
        self.status == ScrapeStatus::Success
    }

    /// Whether the run ended in an unsuccessful terminal status.
    pub fn is_failed(&self) -> bool {
        matches!(
            self.status,
            ScrapeStatus::Failed | ScrapeStatus::TimedOut | ScrapeStatus::RateLimited
        )
    }

    /// Whether a failed run still has retry budget for a rerun.
    pub fn can_retry(&self) -> bool {
        self.is_failed() && self.retry_count < self.max_retries
    }

    /// Fraction of processed records that became new rows.
    pub fn efficiency(&self) -> f64 {
        if self.records_processed == 0 {
            return 0.0;
        }
        f64::from(self.records_created) / f64::from(self.records_processed)
    }
}
