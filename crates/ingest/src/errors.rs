//! Error types for the ingestion pipeline.
//!
//! This module defines storage-agnostic error types. Backend-specific errors
//! (from a relational store, a message queue, etc.) are converted to these
//! types by the storage implementation.
//!
//! Per-symbol fetch and validation failures never surface here: they are
//! contained inside a `ScrapeRun` and reported through its status and
//! `error_message`. The variants below cover the faults that escape the
//! pipeline boundary.

use thiserror::Error;

/// Type alias for Result using our Error type.
pub type Result<T> = std::result::Result<T, IngestError>;

/// Root error type for the ingestion pipeline.
///
/// Observation-store faults never get a variant here: a failing insert
/// aborts the run, which finalizes as Failed with the fault in its
/// `error_message`.
#[derive(Error, Debug)]
pub enum IngestError {
    /// The requested source id is not registered.
    #[error("Unknown source: {0}")]
    UnknownSource(String),

    /// The run log could not record a run transition.
    #[error("Run log write failed: {0}")]
    RunLog(StoreError),
}

/// Backend-agnostic error type for storage ports.
///
/// Implementations convert their native errors (Diesel, SQLite, HTTP) into
/// these variants using `String` details.
#[derive(Error, Debug)]
pub enum StoreError {
    /// Failed to reach the backing store.
    #[error("Failed to connect to store: {0}")]
    ConnectionFailed(String),

    /// A query or write failed to execute.
    #[error("Store query failed: {0}")]
    QueryFailed(String),

    /// Internal/unexpected storage error.
    #[error("Internal store error: {0}")]
    Internal(String),
}
