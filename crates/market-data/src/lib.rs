//! Finboard Market Data Crate
//!
//! This crate provides source-agnostic market data fetching capabilities
//! for the Finboard ingestion pipeline.
//!
//! # Overview
//!
//! The market data crate supports:
//! - Multiple sources: Alpha Vantage, plus any [`SourceAdapter`] impl
//! - Per-source token bucket rate limiting
//! - Exponential backoff with per-symbol retry counters
//! - A closed error taxonomy that tells callers what is retryable
//!
//! # Architecture
//!
//! ```text
//! +------------------+     +------------------+
//! |     Caller       | --> |  SourceRegistry  |  (lookup by source id)
//! +------------------+     +------------------+
//!                              |           |
//!                              v           v
//!                   +-------------+   +--------------------+
//!                   | RateLimiter |   | BackoffController  |
//!                   +-------------+   +--------------------+
//!                              |
//!                              v
//!                      +------------------+
//!                      |  SourceAdapter   |  (AlphaVantage, etc.)
//!                      +------------------+
//!                              |
//!                              v
//!                      +------------------+
//!                      |      Quote       |  (raw OHLCV rows)
//!                      +------------------+
//! ```
//!
//! # Core Types
//!
//! - [`Quote`] - Raw OHLCV row as returned by a source
//! - [`SourceConfig`] - Per-source pacing parameters
//! - [`SourceAdapter`] - Trait every source implements
//! - [`SourceError`] - Closed taxonomy of fetch failures
//! - [`RetryClass`] - What the caller may do after a failure

pub mod errors;
pub mod models;
pub mod registry;
pub mod source;

// Re-export all public types from models
pub use models::{Quote, SourceConfig};

// Re-export error types
pub use errors::{RetryClass, SourceError};

// Re-export source types
pub use source::alpha_vantage::AlphaVantageAdapter;
pub use source::SourceAdapter;

// Re-export registry types
pub use registry::{BackoffController, BackoffPolicy, Permit, RateLimiter, SourceRegistry};
