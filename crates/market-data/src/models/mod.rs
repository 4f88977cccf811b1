//! Source-facing data models
//!
//! This module contains the data types shared by source adapters and the
//! throttling layer:
//! - `quote` - The normalized daily record every adapter produces (Quote)
//! - `config` - Per-source pacing and backoff configuration (SourceConfig)

mod config;
mod quote;

pub use config::SourceConfig;
pub use quote::Quote;
