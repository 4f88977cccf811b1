//! Source registry: the lookup table from source id to adapter.
//!
//! The registry owns the throttling state shared by everything that talks
//! to a source: the token bucket rate limiter and the backoff controller.
//! Both are configured at registration time from each adapter's declared
//! defaults, optionally overridden by process-start configuration.

use std::collections::HashMap;
use std::sync::Arc;

use log::{debug, warn};

use super::{BackoffController, Permit, RateLimiter};
use crate::errors::SourceError;
use crate::models::SourceConfig;
use crate::source::SourceAdapter;

/// Registry of source adapters keyed by source id.
pub struct SourceRegistry {
    adapters: HashMap<String, Arc<dyn SourceAdapter>>,
    rate_limiter: RateLimiter,
    backoff: BackoffController,
}

impl SourceRegistry {
    /// Build a registry from adapters, pacing each with its own declared
    /// default configuration.
    pub fn new(adapters: Vec<Arc<dyn SourceAdapter>>) -> Self {
        Self::with_configs(adapters, Vec::new())
    }

    /// Build a registry from adapters plus configuration overrides.
    ///
    /// Every adapter starts from its [`SourceAdapter::default_config`]; an
    /// override whose `source_id` matches a registered adapter replaces
    /// those defaults. Overrides for unknown sources are ignored with a
    /// warning.
    pub fn with_configs(
        adapters: Vec<Arc<dyn SourceAdapter>>,
        overrides: Vec<SourceConfig>,
    ) -> Self {
        let rate_limiter = RateLimiter::new();
        let backoff = BackoffController::new();
        let mut by_id: HashMap<String, Arc<dyn SourceAdapter>> = HashMap::new();

        for adapter in adapters {
            let config = adapter.default_config();
            debug!(
                "Registering source '{}' ({} req/min, burst {})",
                adapter.id(),
                config.requests_per_minute,
                config.burst_allowance
            );
            rate_limiter.configure(config.clone());
            backoff.configure(&config);
            by_id.insert(adapter.id().to_string(), adapter);
        }

        for config in overrides {
            if by_id.contains_key(&config.source_id) {
                debug!(
                    "Overriding pacing for source '{}' ({} req/min, burst {})",
                    config.source_id, config.requests_per_minute, config.burst_allowance
                );
                backoff.configure(&config);
                rate_limiter.configure(config);
            } else {
                warn!(
                    "Ignoring pacing override for unregistered source '{}'",
                    config.source_id
                );
            }
        }

        Self {
            adapters: by_id,
            rate_limiter,
            backoff,
        }
    }

    /// Look up the adapter registered under a source id.
    pub fn get(&self, source_id: &str) -> Option<Arc<dyn SourceAdapter>> {
        self.adapters.get(source_id).cloned()
    }

    /// Whether a source id is registered.
    pub fn contains(&self, source_id: &str) -> bool {
        self.adapters.contains_key(source_id)
    }

    /// Registered source ids, sorted for stable iteration.
    pub fn source_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.adapters.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Acquire a rate limiter permit for a source.
    ///
    /// Delegates to the shared [`RateLimiter`]; only callers pacing this
    /// source are suspended.
    pub async fn acquire(&self, source_id: &str) -> Result<Permit, SourceError> {
        self.rate_limiter.acquire(source_id).await
    }

    /// The shared rate limiter.
    pub fn rate_limiter(&self) -> &RateLimiter {
        &self.rate_limiter
    }

    /// The shared backoff controller.
    pub fn backoff(&self) -> &BackoffController {
        &self.backoff
    }
}
