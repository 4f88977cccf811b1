//! Token bucket rate limiter for market data sources.
//!
//! Implements per-source request pacing using the token bucket algorithm.
//! Each source gets its own bucket with the capacity and refill rate from
//! its [`SourceConfig`]; buckets for unconfigured sources are created
//! on demand with default settings.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

use log::{debug, warn};

use crate::errors::SourceError;
use crate::models::SourceConfig;

/// Default refill rate: 60 requests per minute.
const DEFAULT_REQUESTS_PER_MINUTE: f64 = 60.0;

/// Default bucket capacity, matching `SourceConfig::default`.
const DEFAULT_BUCKET_CAPACITY: f64 = 5.0;

/// Longest an unconfigured source's acquire may wait before failing.
const DEFAULT_MAX_WAIT: Duration = Duration::from_secs(30);

/// Proof that the rate limiter granted one outbound request.
///
/// A permit is consumed by making the request; it is never returned to the
/// bucket.
#[must_use = "a permit authorizes exactly one outbound request"]
#[derive(Debug)]
pub struct Permit {
    source: String,
}

impl Permit {
    fn grant(source: &str) -> Self {
        Self {
            source: source.to_string(),
        }
    }

    /// The source this permit was granted for.
    pub fn source(&self) -> &str {
        &self.source
    }
}

/// Token bucket for a single source.
#[derive(Debug)]
struct TokenBucket {
    /// Current number of available tokens.
    tokens: f64,
    /// Last time the bucket was updated.
    last_update: Instant,
    /// Token refill rate (tokens per second).
    rate: f64,
    /// Maximum bucket capacity.
    capacity: f64,
}

impl TokenBucket {
    /// Create a new token bucket with default settings.
    fn new() -> Self {
        Self {
            tokens: DEFAULT_BUCKET_CAPACITY,
            last_update: Instant::now(),
            rate: DEFAULT_REQUESTS_PER_MINUTE / 60.0, // Convert to per-second
            capacity: DEFAULT_BUCKET_CAPACITY,
        }
    }

    /// Create a token bucket from a source's pacing configuration.
    fn with_config(requests_per_minute: u32, capacity: f64) -> Self {
        Self {
            tokens: capacity,
            last_update: Instant::now(),
            rate: requests_per_minute as f64 / 60.0,
            capacity,
        }
    }

    /// Refill tokens based on elapsed time.
    fn refill(&mut self) {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_update).as_secs_f64();
        let new_tokens = elapsed * self.rate;

        self.tokens = (self.tokens + new_tokens).min(self.capacity);
        self.last_update = now;
    }

    /// Try to take a token immediately.
    /// Returns true if a token was available, false otherwise.
    fn try_acquire(&mut self) -> bool {
        self.refill();

        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    /// Calculate the wait time until a token becomes available.
    fn time_until_available(&mut self) -> Duration {
        self.refill();

        if self.tokens >= 1.0 {
            Duration::ZERO
        } else {
            let tokens_needed = 1.0 - self.tokens;
            let seconds_needed = tokens_needed / self.rate;
            Duration::from_secs_f64(seconds_needed)
        }
    }
}

/// Token bucket rate limiter for multiple sources.
///
/// Thread-safe limiter maintaining per-source buckets. Acquire calls suspend
/// only the task pacing that source; a wait that would exceed the source's
/// `backoff_max` fails fast with [`SourceError::RateLimited`] instead of
/// sleeping unboundedly.
pub struct RateLimiter {
    /// Per-source token buckets.
    buckets: Mutex<HashMap<String, TokenBucket>>,
    /// Per-source configuration.
    configs: Mutex<HashMap<String, SourceConfig>>,
}

impl RateLimiter {
    /// Create a new rate limiter with no configured sources.
    pub fn new() -> Self {
        Self {
            buckets: Mutex::new(HashMap::new()),
            configs: Mutex::new(HashMap::new()),
        }
    }

    /// Lock the buckets mutex, recovering from poison if necessary.
    ///
    /// For rate limiting it is safe to recover from a poisoned mutex since
    /// the worst case is slightly incorrect pacing, which beats panicking.
    fn lock_buckets(&self) -> MutexGuard<'_, HashMap<String, TokenBucket>> {
        self.buckets.lock().unwrap_or_else(|poisoned| {
            warn!("Rate limiter buckets mutex was poisoned, recovering");
            poisoned.into_inner()
        })
    }

    /// Lock the configs mutex, recovering from poison if necessary.
    fn lock_configs(&self) -> MutexGuard<'_, HashMap<String, SourceConfig>> {
        self.configs.lock().unwrap_or_else(|poisoned| {
            warn!("Rate limiter configs mutex was poisoned, recovering");
            poisoned.into_inner()
        })
    }

    /// Configure pacing for one source.
    ///
    /// The source id is taken from `config.source_id`. An existing bucket
    /// for that source is discarded so the new limits apply immediately.
    pub fn configure(&self, config: SourceConfig) {
        let source = config.source_id.clone();

        let mut configs = self.lock_configs();
        configs.insert(source.clone(), config);
        drop(configs); // Release configs lock before acquiring buckets lock

        let mut buckets = self.lock_buckets();
        buckets.remove(&source);
    }

    /// Acquire a permit for the given source.
    ///
    /// Suspends the calling task while the bucket refills, never longer than
    /// the source's `backoff_max` in total; past that bound the acquire
    /// fails with [`SourceError::RateLimited`]. Sources without explicit
    /// configuration get a default bucket and a default wait bound.
    pub async fn acquire(&self, source: &str) -> Result<Permit, SourceError> {
        let max_wait = self.max_wait_for(source);
        let mut waited = Duration::ZERO;

        loop {
            let wait_time = {
                let mut buckets = self.lock_buckets();

                let bucket = buckets
                    .entry(source.to_string())
                    .or_insert_with(|| self.create_bucket(source));

                if bucket.try_acquire() {
                    debug!("Rate limiter: granted permit for '{}'", source);
                    return Ok(Permit::grant(source));
                }

                bucket.time_until_available()
            };

            if waited + wait_time > max_wait {
                warn!(
                    "Rate limiter: projected wait {:?} exceeds bound {:?} for '{}'",
                    waited + wait_time,
                    max_wait,
                    source
                );
                return Err(SourceError::RateLimited {
                    source_id: source.to_string(),
                });
            }

            if wait_time > Duration::ZERO {
                debug!(
                    "Rate limiter: waiting {:?} for source '{}'",
                    wait_time, source
                );
                tokio::time::sleep(wait_time).await;
                waited += wait_time;
            }
        }
    }

    /// Try to acquire a permit without waiting.
    pub fn try_acquire(&self, source: &str) -> Option<Permit> {
        let mut buckets = self.lock_buckets();

        let bucket = buckets
            .entry(source.to_string())
            .or_insert_with(|| self.create_bucket(source));

        if bucket.try_acquire() {
            Some(Permit::grant(source))
        } else {
            None
        }
    }

    /// Get the remaining tokens for a source.
    pub fn remaining_tokens(&self, source: &str) -> f64 {
        let mut buckets = self.lock_buckets();

        if let Some(bucket) = buckets.get_mut(source) {
            bucket.refill();
            bucket.tokens
        } else {
            self.lock_configs()
                .get(source)
                .map(|c| c.burst_allowance as f64)
                .unwrap_or(DEFAULT_BUCKET_CAPACITY)
        }
    }

    /// Discard the bucket for a source, restoring its full burst allowance.
    pub fn reset(&self, source: &str) {
        let mut buckets = self.lock_buckets();
        buckets.remove(source);
    }

    /// Create a bucket for a source, using its config if present.
    fn create_bucket(&self, source: &str) -> TokenBucket {
        let configs = self.lock_configs();

        if let Some(config) = configs.get(source) {
            TokenBucket::with_config(config.requests_per_minute, config.burst_allowance as f64)
        } else {
            TokenBucket::new()
        }
    }

    /// Longest total wait allowed when acquiring for this source.
    fn max_wait_for(&self, source: &str) -> Duration {
        self.lock_configs()
            .get(source)
            .map(|c| c.backoff_max)
            .unwrap_or(DEFAULT_MAX_WAIT)
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new()
    }
}
