//! Error types and retry classification for source fetches.
//!
//! This module provides:
//! - [`SourceError`]: The error enum for all source adapter operations
//! - [`RetryClass`]: Classification for determining retry behavior

mod retry;

pub use retry::RetryClass;

use thiserror::Error;

/// Errors a source adapter can report from a fetch.
///
/// The taxonomy is deliberately closed: every failure mode of an outbound
/// fetch maps onto one of these four variants, and each variant carries a
/// fixed [`RetryClass`] via [`retry_class`](Self::retry_class). Transport
/// failures that are not literal timeouts (connection refused, DNS) are
/// reported as [`Timeout`](Self::Timeout) since they are transient from the
/// caller's point of view; adapters log the underlying cause before mapping.
///
/// The provenance field is `source_id`, never `source`: thiserror treats a
/// field named `source` as the error's cause and requires it to implement
/// `std::error::Error`. These variants carry no cause chain.
#[derive(Error, Debug)]
pub enum SourceError {
    /// The source does not know the requested symbol.
    /// Terminal for that symbol - retrying won't help.
    #[error("Symbol not found: {symbol} ({source_id})")]
    SymbolNotFound {
        /// Id of the source that was queried
        source_id: String,
        /// The symbol the source did not recognize
        symbol: String,
    },

    /// The source rejected the request for exceeding its quota
    /// (HTTP 429 or an in-band throttle notice).
    /// Retried with exponential backoff.
    #[error("Rate limited: {source_id}")]
    RateLimited {
        /// Id of the source that rejected the request
        source_id: String,
    },

    /// The request did not complete in time, or the transport failed
    /// in a transient way. Retried with exponential backoff.
    #[error("Timeout: {source_id}")]
    Timeout {
        /// Id of the source that timed out
        source_id: String,
    },

    /// The source answered with a payload that violates its data contract.
    /// Not a transient condition; the payload is dropped, never retried.
    #[error("Malformed response from {source_id}: {message}")]
    MalformedResponse {
        /// Id of the source that produced the payload
        source_id: String,
        /// What was wrong with it
        message: String,
    },
}

impl SourceError {
    /// Returns the retry classification for this error.
    ///
    /// - [`RetryClass::Never`]: terminal, the pipeline moves on
    /// - [`RetryClass::WithBackoff`]: transient, retry after an
    ///   exponentially growing delay
    ///
    /// # Examples
    ///
    /// ```
    /// use finboard_market_data::errors::{RetryClass, SourceError};
    ///
    /// let error = SourceError::RateLimited { source_id: "alpha_vantage".to_string() };
    /// assert_eq!(error.retry_class(), RetryClass::WithBackoff);
    ///
    /// let error = SourceError::SymbolNotFound {
    ///     source_id: "alpha_vantage".to_string(),
    ///     symbol: "INVALID".to_string(),
    /// };
    /// assert_eq!(error.retry_class(), RetryClass::Never);
    /// ```
    pub fn retry_class(&self) -> RetryClass {
        match self {
            // Terminal errors - never retry
            Self::SymbolNotFound { .. } | Self::MalformedResponse { .. } => RetryClass::Never,

            // Transient errors - retry with backoff
            Self::RateLimited { .. } | Self::Timeout { .. } => RetryClass::WithBackoff,
        }
    }

    /// The id of the source this error originated from.
    pub fn source_id(&self) -> &str {
        match self {
            Self::SymbolNotFound { source_id, .. }
            | Self::RateLimited { source_id }
            | Self::Timeout { source_id }
            | Self::MalformedResponse { source_id, .. } => source_id,
        }
    }
}
