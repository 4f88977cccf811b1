//! Source registry module.
//!
//! This module provides the pacing machinery shared by every source,
//! including:
//! - Adapter registration and lookup by source id
//! - Token bucket rate limiting per source
//! - Exponential backoff with per-symbol retry counters

mod backoff;
mod rate_limiter;
mod source_registry;

pub use backoff::{BackoffController, BackoffPolicy};
pub use rate_limiter::{Permit, RateLimiter};
pub use source_registry::SourceRegistry;
