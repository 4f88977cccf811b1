//! Alpha Vantage source adapter implementation.
//!
//! Fetches daily equity bars via the TIME_SERIES_DAILY_ADJUSTED endpoint and
//! normalizes them into [`Quote`] records, including the adjusted close.
//!
//! Note: the Alpha Vantage free tier is limited to 5 API calls per minute;
//! the default [`SourceConfig`] reflects that.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use log::{debug, warn};
use reqwest::Client;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::collections::HashMap;
use std::str::FromStr;
use std::time::Duration;

use crate::errors::SourceError;
use crate::models::{Quote, SourceConfig};
use crate::source::SourceAdapter;

const BASE_URL: &str = "https://www.alphavantage.co/query";
const SOURCE_ID: &str = "alpha_vantage";

/// Sent with every request; some providers reject requests without one.
const DEFAULT_USER_AGENT: &str = "finboard-scraper/0.1";

/// Request timeout for a single API call.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Alpha Vantage source adapter.
///
/// Produces daily OHLCV records with adjusted close for equities.
/// Free tier is limited to 5 API calls per minute.
pub struct AlphaVantageAdapter {
    client: Client,
    api_key: String,
}

// ============================================================================
// Response structures for the Alpha Vantage API
// ============================================================================

/// TIME_SERIES_DAILY_ADJUSTED response envelope.
#[derive(Debug, Deserialize)]
struct TimeSeriesResponse {
    #[serde(rename = "Time Series (Daily)")]
    time_series: Option<HashMap<String, DailyBar>>,
    #[serde(rename = "Error Message")]
    error_message: Option<String>,
    #[serde(rename = "Note")]
    note: Option<String>,
    #[serde(rename = "Information")]
    information: Option<String>,
}

#[derive(Debug, Deserialize)]
struct DailyBar {
    #[serde(rename = "1. open")]
    open: String,
    #[serde(rename = "2. high")]
    high: String,
    #[serde(rename = "3. low")]
    low: String,
    #[serde(rename = "4. close")]
    close: String,
    #[serde(rename = "5. adjusted close")]
    adjusted_close: Option<String>,
    #[serde(rename = "6. volume")]
    volume: String,
}

// ============================================================================
// AlphaVantageAdapter implementation
// ============================================================================

impl AlphaVantageAdapter {
    /// Create a new adapter with the given API key and the default
    /// user agent.
    pub fn new(api_key: String) -> Self {
        Self::with_user_agent(api_key, DEFAULT_USER_AGENT)
    }

    /// Create a new adapter with an explicit user agent.
    pub fn with_user_agent(api_key: String, user_agent: &str) -> Self {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .user_agent(user_agent)
            .build()
            .unwrap_or_else(|_| Client::new());

        Self { client, api_key }
    }

    /// Make a request to the Alpha Vantage API and return the raw body.
    async fn request(&self, params: &[(&str, &str)]) -> Result<String, SourceError> {
        let mut all_params: Vec<(&str, &str)> = params.to_vec();
        all_params.push(("apikey", &self.api_key));

        let url = reqwest::Url::parse_with_params(BASE_URL, &all_params).map_err(|e| {
            SourceError::MalformedResponse {
                source_id: SOURCE_ID.to_string(),
                message: format!("failed to build request URL: {}", e),
            }
        })?;

        debug!(
            "Alpha Vantage request: {}",
            url.as_str().replace(&self.api_key, "***")
        );

        let response = self.client.get(url).send().await.map_err(|e| {
            if !e.is_timeout() {
                warn!("Alpha Vantage transport error, treating as timeout: {}", e);
            }
            SourceError::Timeout {
                source_id: SOURCE_ID.to_string(),
            }
        })?;

        let status = response.status();
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(SourceError::RateLimited {
                source_id: SOURCE_ID.to_string(),
            });
        }

        if status.is_server_error() {
            warn!("Alpha Vantage HTTP {}, treating as timeout", status);
            return Err(SourceError::Timeout {
                source_id: SOURCE_ID.to_string(),
            });
        }

        if !status.is_success() {
            return Err(SourceError::MalformedResponse {
                source_id: SOURCE_ID.to_string(),
                message: format!("HTTP {}", status),
            });
        }

        response.text().await.map_err(|e| {
            warn!("Alpha Vantage body read failed: {}", e);
            SourceError::Timeout {
                source_id: SOURCE_ID.to_string(),
            }
        })
    }

    /// Check for API-level errors reported inside a 200 response.
    fn check_api_error(
        symbol: &str,
        error_message: &Option<String>,
        note: &Option<String>,
        information: &Option<String>,
    ) -> Result<(), SourceError> {
        if let Some(msg) = error_message {
            // "Invalid API call" is how the API reports unknown symbols
            if msg.contains("Invalid API call") || msg.contains("not found") {
                return Err(SourceError::SymbolNotFound {
                    source_id: SOURCE_ID.to_string(),
                    symbol: symbol.to_string(),
                });
            }
            return Err(SourceError::MalformedResponse {
                source_id: SOURCE_ID.to_string(),
                message: msg.clone(),
            });
        }

        // "Note" usually indicates rate limiting
        if let Some(msg) = note {
            if msg.contains("API call frequency") || msg.contains("rate limit") {
                return Err(SourceError::RateLimited {
                    source_id: SOURCE_ID.to_string(),
                });
            }
            warn!("Alpha Vantage note: {}", msg);
        }

        // "Information" can indicate quota exhaustion on the free tier
        if let Some(msg) = information {
            if msg.contains("API call frequency")
                || msg.contains("rate limit")
                || msg.contains("premium")
            {
                return Err(SourceError::RateLimited {
                    source_id: SOURCE_ID.to_string(),
                });
            }
            warn!("Alpha Vantage info: {}", msg);
        }

        Ok(())
    }

    /// Parse a date string in YYYY-MM-DD format to DateTime<Utc>.
    fn parse_date(date_str: &str) -> Option<DateTime<Utc>> {
        NaiveDate::parse_from_str(date_str, "%Y-%m-%d")
            .ok()
            .and_then(|d| d.and_hms_opt(0, 0, 0))
            .and_then(|dt| Utc.from_local_datetime(&dt).single())
    }

    /// Parse a decimal value from a string.
    fn parse_decimal(s: &str) -> Option<Decimal> {
        Decimal::from_str(s).ok()
    }

    /// Normalize one daily bar; None if any field is unparseable.
    fn parse_bar(symbol: &str, date_str: &str, bar: &DailyBar) -> Option<Quote> {
        let timestamp = Self::parse_date(date_str)?;
        let open = Self::parse_decimal(&bar.open)?;
        let high = Self::parse_decimal(&bar.high)?;
        let low = Self::parse_decimal(&bar.low)?;
        let close = Self::parse_decimal(&bar.close)?;
        let volume = bar.volume.parse::<u64>().ok()?;

        let mut quote = Quote::ohlcv(symbol, timestamp, open, high, low, close, volume);
        if let Some(adj) = bar.adjusted_close.as_deref().and_then(Self::parse_decimal) {
            quote = quote.with_adjusted_close(adj);
        }
        Some(quote)
    }

    /// Parse a TIME_SERIES_DAILY_ADJUSTED payload into normalized records.
    ///
    /// Rows with unparseable fields are skipped with a warning; an envelope
    /// that cannot be deserialized at all is a MalformedResponse.
    fn parse_time_series(
        symbol: &str,
        text: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<Quote>, SourceError> {
        let response: TimeSeriesResponse =
            serde_json::from_str(text).map_err(|e| SourceError::MalformedResponse {
                source_id: SOURCE_ID.to_string(),
                message: format!("failed to parse response: {}", e),
            })?;

        Self::check_api_error(
            symbol,
            &response.error_message,
            &response.note,
            &response.information,
        )?;

        let time_series =
            response
                .time_series
                .ok_or_else(|| SourceError::SymbolNotFound {
                    source_id: SOURCE_ID.to_string(),
                    symbol: symbol.to_string(),
                })?;

        let mut quotes = Vec::with_capacity(time_series.len());
        for (date_str, bar) in &time_series {
            match Self::parse_bar(symbol, date_str, bar) {
                Some(quote) if quote.timestamp >= since => quotes.push(quote),
                Some(_) => {}
                None => warn!(
                    "Alpha Vantage: skipping unparseable bar for {} on {}",
                    symbol, date_str
                ),
            }
        }

        // Sort by timestamp ascending
        quotes.sort_by(|a, b| a.timestamp.cmp(&b.timestamp));

        Ok(quotes)
    }
}

// ============================================================================
// SourceAdapter trait implementation
// ============================================================================

#[async_trait]
impl SourceAdapter for AlphaVantageAdapter {
    fn id(&self) -> &'static str {
        SOURCE_ID
    }

    fn default_config(&self) -> SourceConfig {
        SourceConfig {
            source_id: SOURCE_ID.to_string(),
            requests_per_minute: 5, // Free tier is very limited
            burst_allowance: 1,     // Sequential requests only
            backoff_base: Duration::from_secs(2),
            backoff_max: Duration::from_secs(60),
        }
    }

    async fn fetch(
        &self,
        symbol: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<Quote>, SourceError> {
        let symbol = symbol.to_uppercase();
        let params = [
            ("function", "TIME_SERIES_DAILY_ADJUSTED"),
            ("symbol", symbol.as_str()),
            ("outputsize", "compact"), // 'full' is premium-only
        ];

        let text = self.request(&params).await?;
        let quotes = Self::parse_time_series(&symbol, &text, since)?;

        debug!(
            "Alpha Vantage: fetched {} daily bars for {}",
            quotes.len(),
            symbol
        );

        Ok(quotes)
    }
}
