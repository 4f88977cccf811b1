//! Per-source pacing and backoff configuration.

use std::time::Duration;

/// Pacing and retry shape for one source.
///
/// Owned by the rate limiter: the token bucket refills at
/// `requests_per_minute` and holds at most `burst_allowance` tokens, and the
/// backoff controller derives its delay schedule from `backoff_base` and
/// `backoff_max`. Values are supplied at process start and never mutated
/// afterwards.
#[derive(Clone, Debug, PartialEq)]
pub struct SourceConfig {
    /// Source this configuration applies to.
    pub source_id: String,

    /// Token bucket refill rate, in requests per minute.
    pub requests_per_minute: u32,

    /// Token bucket capacity: how many requests may burst before pacing
    /// kicks in.
    pub burst_allowance: u32,

    /// First backoff delay; doubles on each consecutive transient failure.
    pub backoff_base: Duration,

    /// Ceiling on any single backoff delay.
    pub backoff_max: Duration,
}

impl SourceConfig {
    /// Default pacing for the given source.
    pub fn for_source(source_id: impl Into<String>) -> Self {
        Self {
            source_id: source_id.into(),
            ..Self::default()
        }
    }
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            source_id: String::new(),
            requests_per_minute: 60,
            burst_allowance: 5,
            backoff_base: Duration::from_secs(1),
            backoff_max: Duration::from_secs(30),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_for_source_keeps_defaults() {
        let config = SourceConfig::for_source("alpha_vantage");
        assert_eq!(config.source_id, "alpha_vantage");
        assert_eq!(config.requests_per_minute, 60);
        assert_eq!(config.burst_allowance, 5);
        assert_eq!(config.backoff_base, Duration::from_secs(1));
        assert_eq!(config.backoff_max, Duration::from_secs(30));
    }

    #[test]
    fn test_override_with_struct_update() {
        let config = SourceConfig {
            requests_per_minute: 5,
            ..SourceConfig::for_source("alpha_vantage")
        };
        assert_eq!(config.source_id, "alpha_vantage");
        assert_eq!(config.requests_per_minute, 5);
    }
}
