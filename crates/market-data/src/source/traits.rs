//! Source adapter trait definition.
//!
//! This module defines the `SourceAdapter` capability trait that all
//! concrete market data sources implement.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::errors::SourceError;
use crate::models::{Quote, SourceConfig};

/// Capability trait for one external market data source.
///
/// Implement this trait to add support for a new source. The registry keys
/// adapters by [`id`](Self::id) and paces calls to them with the limits from
/// [`default_config`](Self::default_config), which process-start
/// configuration may override at registration time.
///
/// Adapters perform network I/O only. They never persist data and never
/// retry internally; retry scheduling belongs to the caller, which consults
/// [`SourceError::retry_class`](crate::errors::SourceError::retry_class).
///
/// # Example
///
/// ```ignore
/// use async_trait::async_trait;
/// use finboard_market_data::source::SourceAdapter;
///
/// struct MySource {
///     api_key: String,
/// }
///
/// #[async_trait]
/// impl SourceAdapter for MySource {
///     fn id(&self) -> &'static str {
///         "my_source"
///     }
///
///     async fn fetch(
///         &self,
///         symbol: &str,
///         since: chrono::DateTime<chrono::Utc>,
///     ) -> Result<Vec<finboard_market_data::Quote>, finboard_market_data::SourceError> {
///         // ... call the source's API, normalize into Quote records
///         # unimplemented!()
///     }
/// }
/// ```
#[async_trait]
pub trait SourceAdapter: Send + Sync {
    /// Unique identifier for this source.
    ///
    /// Should be a constant string like "alpha_vantage" or "yahoo".
    /// Used as the registry key and on every record's provenance stamp.
    fn id(&self) -> &'static str;

    /// Pacing and backoff defaults for this source.
    ///
    /// Registration may override these with externally supplied
    /// configuration; absent an override, the limiter is configured with
    /// exactly what this returns.
    fn default_config(&self) -> SourceConfig {
        SourceConfig::for_source(self.id())
    }

    /// Fetch normalized records for one symbol.
    ///
    /// # Arguments
    ///
    /// * `symbol` - The ticker symbol to fetch
    /// * `since` - Only records with a timestamp at or after this instant
    ///   are returned
    ///
    /// # Returns
    ///
    /// Normalized records ordered by timestamp ascending, or a
    /// [`SourceError`] describing why the fetch failed. An empty vector is a
    /// valid success: the source knows the symbol but has nothing new.
    async fn fetch(&self, symbol: &str, since: DateTime<Utc>)
        -> Result<Vec<Quote>, SourceError>;
}
