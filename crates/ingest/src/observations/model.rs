//! Price observation domain models.
//!
//! This module contains the validated, deduplicated price record produced by
//! the ingestion pipeline, its natural key, and the quality tier assigned
//! after validation.

use chrono::{DateTime, Utc};
use finboard_market_data::Quote;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

// =============================================================================
// Quality Tier
// =============================================================================

/// Quality tier wire names
pub const QUALITY_TIER_HIGH: &str = "high";
pub const QUALITY_TIER_MEDIUM: &str = "medium";
pub const QUALITY_TIER_LOW: &str = "low";

/// Data quality classification assigned by the pipeline after validation.
///
/// A record that passes every check cleanly is `High`. Soft issues (zero
/// volume, missing adjusted close) degrade the tier without blocking
/// persistence; hard invariant violations never reach an observation at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum QualityTier {
    /// Clean pass, no issues
    #[default]
    High,
    /// Exactly one soft issue
    Medium,
    /// Two or more soft issues
    Low,
}

impl QualityTier {
    /// Returns the string identifier for this tier.
    pub fn as_str(&self) -> &'static str {
        match self {
            QualityTier::High => QUALITY_TIER_HIGH,
            QualityTier::Medium => QUALITY_TIER_MEDIUM,
            QualityTier::Low => QUALITY_TIER_LOW,
        }
    }

    /// Tier implied by the number of soft issues found during validation.
    pub fn from_soft_issues(count: usize) -> Self {
        match count {
            0 => QualityTier::High,
            1 => QualityTier::Medium,
            _ => QualityTier::Low,
        }
    }
}

impl From<QualityTier> for String {
    fn from(tier: QualityTier) -> Self {
        tier.as_str().to_string()
    }
}

// =============================================================================
// Price Observation
// =============================================================================

/// A validated daily price record for one symbol from one source.
///
/// Observations are immutable once persisted: a correction from a source is
/// a new insert, never a mutation of an existing row. Duplicate detection
/// uses the natural key (symbol, timestamp, source).
///
/// # Invariants
///
/// Enforced by the pipeline validator before an observation is built:
/// * `high >= low`
/// * `high >= open` and `high >= close`
/// * `low <= open` and `low <= close`
/// * `timestamp` not ahead of the clock beyond the configured skew tolerance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PriceObservation {
    pub symbol: String,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub adjusted_close: Option<Decimal>,
    pub volume: u64,
    pub timestamp: DateTime<Utc>,
    pub source: String,
    pub quality_tier: QualityTier,
}

impl PriceObservation {
    /// Build an observation from a fetched quote, stamping the source id and
    /// the tier the validator assigned.
    pub fn from_quote(quote: Quote, source: impl Into<String>, quality_tier: QualityTier) -> Self {
        Self {
            symbol: quote.symbol,
            open: quote.open,
            high: quote.high,
            low: quote.low,
            close: quote.close,
            adjusted_close: quote.adjusted_close,
            volume: quote.volume,
            timestamp: quote.timestamp,
            source: source.into(),
            quality_tier,
        }
    }

    /// The natural key identifying this observation.
    pub fn key(&self) -> ObservationKey {
        ObservationKey {
            symbol: self.symbol.clone(),
            timestamp: self.timestamp,
            source: self.source.clone(),
        }
    }
}

// =============================================================================
// Observation Key
// =============================================================================

/// Natural key of a price observation: (symbol, timestamp, source).
///
/// Two observations with the same key describe the same market fact; the
/// store keeps exactly one row per key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ObservationKey {
    pub symbol: String,
    pub timestamp: DateTime<Utc>,
    pub source: String,
}
