//! Source adapter abstraction and implementations.
//!
//! This module contains:
//! - The `SourceAdapter` trait every concrete source implements
//! - Concrete adapter implementations (Alpha Vantage)
//!
//! # Architecture
//!
//! The adapter layer is designed to be:
//! - **Source-agnostic**: The ingestion pipeline depends only on the fetch
//!   capability, never on a concrete adapter type
//! - **Extensible**: New sources plug in by implementing `SourceAdapter` and
//!   registering under their source id
//! - **Side-effect free beyond I/O**: Adapters perform network fetches and
//!   normalization only; they never persist anything

mod traits;

// Adapter implementations
pub mod alpha_vantage;

// Re-exports
pub use alpha_vantage::AlphaVantageAdapter;
pub use traits::SourceAdapter;
