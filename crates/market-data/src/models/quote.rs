use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// One normalized daily price record as returned by a source adapter.
///
/// This is the common shape every concrete source normalizes into before the
/// ingestion pipeline sees the data. It carries no provenance or quality
/// metadata; those are stamped on by the pipeline when the record is
/// validated and persisted.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Quote {
    /// Ticker symbol, upper-cased by the adapter
    pub symbol: String,

    /// Timestamp of the trading period this record covers
    pub timestamp: DateTime<Utc>,

    /// Opening price
    pub open: Decimal,

    /// High price
    pub high: Decimal,

    /// Low price
    pub low: Decimal,

    /// Closing price
    pub close: Decimal,

    /// Split and dividend adjusted close, when the source provides one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub adjusted_close: Option<Decimal>,

    /// Trading volume for the period
    pub volume: u64,
}

impl Quote {
    /// Create a record from plain OHLCV fields, without an adjusted close.
    pub fn ohlcv(
        symbol: impl Into<String>,
        timestamp: DateTime<Utc>,
        open: Decimal,
        high: Decimal,
        low: Decimal,
        close: Decimal,
        volume: u64,
    ) -> Self {
        Self {
            symbol: symbol.into(),
            timestamp,
            open,
            high,
            low,
            close,
            adjusted_close: None,
            volume,
        }
    }

    /// Attach an adjusted close to the record.
    pub fn with_adjusted_close(mut self, adjusted_close: Decimal) -> Self {
        self.adjusted_close = Some(adjusted_close);
        self
    }
}
