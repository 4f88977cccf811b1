//! Exponential backoff controller for transient source failures.
//!
//! Tracks consecutive transient failures per (source, symbol) and computes
//! the delay before the next retry: `min(backoff_base * 2^retry_count,
//! backoff_max)` plus jitter in `[0, delay / 10)` so retries across symbols
//! do not synchronize into storms. Counters reset to zero on success.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use log::{debug, warn};
use rand::Rng;

use crate::models::SourceConfig;

/// Delay schedule derived from one source's configuration.
#[derive(Clone, Debug, PartialEq)]
pub struct BackoffPolicy {
    base: Duration,
    max: Duration,
}

impl BackoffPolicy {
    /// Create a schedule with an explicit base delay and ceiling.
    pub fn new(base: Duration, max: Duration) -> Self {
        Self { base, max }
    }

    /// Derive the schedule from a source's configuration.
    pub fn from_config(config: &SourceConfig) -> Self {
        Self::new(config.backoff_base, config.backoff_max)
    }

    /// Raw delay for the given retry count, without jitter.
    ///
    /// Doubles per retry, saturating at the configured ceiling.
    pub fn delay(&self, retry_count: u32) -> Duration {
        let factor = 1u32 << retry_count.min(31);
        self.base.saturating_mul(factor).min(self.max)
    }

    /// Delay for the given retry count with jitter added.
    ///
    /// The jitter is uniform in `[0, delay / 10)`.
    pub fn jittered(&self, retry_count: u32) -> Duration {
        let delay = self.delay(retry_count);
        if delay.is_zero() {
            return delay;
        }
        let jitter = delay.mul_f64(rand::thread_rng().gen_range(0.0..0.1));
        delay + jitter
    }
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self::from_config(&SourceConfig::default())
    }
}

/// Backoff state for multiple sources.
///
/// Holds the per-(source, symbol) consecutive-failure counters the retry
/// loop consults. Shared alongside the rate limiter; both together make up
/// the only synchronized state a source's callers touch.
pub struct BackoffController {
    /// Per-source delay schedules.
    policies: Mutex<HashMap<String, BackoffPolicy>>,
    /// Consecutive transient failures per (source, symbol).
    counters: Mutex<HashMap<(String, String), u32>>,
}

impl BackoffController {
    /// Create a controller with no configured sources.
    pub fn new() -> Self {
        Self {
            policies: Mutex::new(HashMap::new()),
            counters: Mutex::new(HashMap::new()),
        }
    }

    /// Lock the policies mutex, recovering from poison if necessary.
    fn lock_policies(&self) -> MutexGuard<'_, HashMap<String, BackoffPolicy>> {
        self.policies.lock().unwrap_or_else(|poisoned| {
            warn!("Backoff policies mutex was poisoned, recovering");
            poisoned.into_inner()
        })
    }

    /// Lock the counters mutex, recovering from poison if necessary.
    fn lock_counters(&self) -> MutexGuard<'_, HashMap<(String, String), u32>> {
        self.counters.lock().unwrap_or_else(|poisoned| {
            warn!("Backoff counters mutex was poisoned, recovering");
            poisoned.into_inner()
        })
    }

    /// Configure the delay schedule for one source.
    pub fn configure(&self, config: &SourceConfig) {
        let mut policies = self.lock_policies();
        policies.insert(config.source_id.clone(), BackoffPolicy::from_config(config));
    }

    /// Start a fresh call sequence for a symbol, clearing its counter.
    pub fn begin(&self, source: &str, symbol: &str) {
        let mut counters = self.lock_counters();
        counters.remove(&(source.to_string(), symbol.to_string()));
    }

    /// Consecutive transient failures recorded for a symbol.
    pub fn retries(&self, source: &str, symbol: &str) -> u32 {
        let counters = self.lock_counters();
        counters
            .get(&(source.to_string(), symbol.to_string()))
            .copied()
            .unwrap_or(0)
    }

    /// Record one more transient failure and return the jittered delay to
    /// wait before the next attempt.
    ///
    /// The delay uses the counter value before the increment, so the first
    /// retry waits `backoff_base`.
    pub fn next_delay(&self, source: &str, symbol: &str) -> Duration {
        let policy = self.policy_for(source);

        let mut counters = self.lock_counters();
        let counter = counters
            .entry((source.to_string(), symbol.to_string()))
            .or_insert(0);
        let delay = policy.jittered(*counter);
        *counter += 1;

        debug!(
            "Backoff: retry {} for {}/{} in {:?}",
            *counter, source, symbol, delay
        );
        delay
    }

    /// Record a success, clearing the symbol's failure counter.
    pub fn record_success(&self, source: &str, symbol: &str) {
        let mut counters = self.lock_counters();
        if counters
            .remove(&(source.to_string(), symbol.to_string()))
            .is_some()
        {
            debug!("Backoff: counter reset for {}/{}", source, symbol);
        }
    }

    /// The delay schedule for a source, defaulting when unconfigured.
    fn policy_for(&self, source: &str) -> BackoffPolicy {
        self.lock_policies()
            .get(source)
            .cloned()
            .unwrap_or_default()
    }
}

impl Default for BackoffController {
    fn default() -> Self {
        Self::new()
    }
}
