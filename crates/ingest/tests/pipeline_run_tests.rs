//! End-to-end pipeline tests over scripted source adapters.
//!
//! Each test drives `IngestionPipeline::run_once` (or `run_many`) against an
//! adapter that replays a scripted sequence of replies, then asserts on the
//! finalized `ScrapeRun`, the observation store, and the run log.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use rust_decimal_macros::dec;

use finboard_market_data::{Quote, SourceAdapter, SourceConfig, SourceError, SourceRegistry};

use finboard_ingest::{
    CancelToken, IngestionPipeline, InsertOutcome, MemoryObservationStore, MemoryRunLog,
    ObservationKey, ObservationStore, PipelineConfig, PriceObservation, QualityTier, RunLog,
    RunRequest, ScrapeStatus, StoreError,
};

// =============================================================================
// Scripted adapter
// =============================================================================

/// One reply in a scripted fetch sequence.
#[derive(Clone)]
enum Reply {
    Quotes(Vec<Quote>),
    RateLimited,
    Timeout,
    NotFound,
    Malformed(&'static str),
}

/// Adapter that replays scripted replies, one per fetch call, falling back
/// to a fixed reply once the script is consumed.
struct ScriptedSource {
    id: &'static str,
    replies: Mutex<VecDeque<Reply>>,
    fallback: Reply,
    calls: AtomicUsize,
    pacing: SourceConfig,
}

impl ScriptedSource {
    fn new(id: &'static str, pacing: SourceConfig) -> Self {
        Self {
            id,
            replies: Mutex::new(VecDeque::new()),
            fallback: Reply::Quotes(Vec::new()),
            calls: AtomicUsize::new(0),
            pacing,
        }
    }

    fn with_replies(self, replies: Vec<Reply>) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
            ..self
        }
    }

    fn with_fallback(self, fallback: Reply) -> Self {
        Self { fallback, ..self }
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SourceAdapter for ScriptedSource {
    fn id(&self) -> &'static str {
        self.id
    }

    fn default_config(&self) -> SourceConfig {
        self.pacing.clone()
    }

    async fn fetch(
        &self,
        symbol: &str,
        _since: DateTime<Utc>,
    ) -> Result<Vec<Quote>, SourceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        let reply = self
            .replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| self.fallback.clone());

        match reply {
            Reply::Quotes(quotes) => Ok(quotes),
            Reply::RateLimited => Err(SourceError::RateLimited {
                source_id: self.id.to_string(),
            }),
            Reply::Timeout => Err(SourceError::Timeout {
                source_id: self.id.to_string(),
            }),
            Reply::NotFound => Err(SourceError::SymbolNotFound {
                source_id: self.id.to_string(),
                symbol: symbol.to_string(),
            }),
            Reply::Malformed(message) => Err(SourceError::MalformedResponse {
                source_id: self.id.to_string(),
                message: message.to_string(),
            }),
        }
    }
}

/// Adapter that requests cancellation from inside its first fetch.
struct CancellingSource {
    id: &'static str,
    token: CancelToken,
    quotes: Vec<Quote>,
}

#[async_trait]
impl SourceAdapter for CancellingSource {
    fn id(&self) -> &'static str {
        self.id
    }

    fn default_config(&self) -> SourceConfig {
        fast_pacing(self.id)
    }

    async fn fetch(
        &self,
        _symbol: &str,
        _since: DateTime<Utc>,
    ) -> Result<Vec<Quote>, SourceError> {
        self.token.cancel();
        Ok(self.quotes.clone())
    }
}

/// Observation store whose inserts always fail.
struct FailingStore;

#[async_trait]
impl ObservationStore for FailingStore {
    async fn insert(
        &self,
        _observation: PriceObservation,
    ) -> Result<InsertOutcome, StoreError> {
        Err(StoreError::QueryFailed("disk full".to_string()))
    }

    async fn lookup(
        &self,
        _key: &ObservationKey,
    ) -> Result<Option<PriceObservation>, StoreError> {
        Ok(None)
    }
}

// =============================================================================
// Helpers
// =============================================================================

/// Pacing that never makes a test wait: huge quota, millisecond backoff.
fn fast_pacing(source: &str) -> SourceConfig {
    SourceConfig {
        requests_per_minute: 60_000,
        burst_allowance: 1_000,
        backoff_base: Duration::from_millis(1),
        backoff_max: Duration::from_millis(20),
        ..SourceConfig::for_source(source)
    }
}

fn fast_config() -> PipelineConfig {
    PipelineConfig {
        run_budget: Duration::from_secs(5),
        fetch_timeout: Duration::from_millis(500),
        ..PipelineConfig::default()
    }
}

fn symbols(names: &[&str]) -> Vec<String> {
    names.iter().map(|name| name.to_string()).collect()
}

/// A clean daily record with distinct timestamps per `days_ago`.
fn quote_on(symbol: &str, days_ago: i64) -> Quote {
    Quote::ohlcv(
        symbol,
        Utc::now() - ChronoDuration::days(days_ago),
        dec!(100.0),
        dec!(105.0),
        dec!(95.0),
        dec!(102.0),
        1_000_000,
    )
}

/// A record violating the high >= low invariant.
fn inverted_quote(symbol: &str, days_ago: i64) -> Quote {
    Quote::ohlcv(
        symbol,
        Utc::now() - ChronoDuration::days(days_ago),
        dec!(100.0),
        dec!(90.0),
        dec!(110.0),
        dec!(100.0),
        1_000,
    )
}

struct Harness {
    pipeline: IngestionPipeline<MemoryObservationStore, MemoryRunLog>,
    registry: Arc<SourceRegistry>,
    observations: Arc<MemoryObservationStore>,
    run_log: Arc<MemoryRunLog>,
}

fn harness(adapters: Vec<Arc<dyn SourceAdapter>>, config: PipelineConfig) -> Harness {
    let registry = Arc::new(SourceRegistry::new(adapters));
    let observations = Arc::new(MemoryObservationStore::new());
    let run_log = Arc::new(MemoryRunLog::new());
    let pipeline = IngestionPipeline::new(
        Arc::clone(&registry),
        Arc::clone(&observations),
        Arc::clone(&run_log),
        config,
    );
    Harness {
        pipeline,
        registry,
        observations,
        run_log,
    }
}

// =============================================================================
// Happy path and validation
// =============================================================================

#[tokio::test]
async fn test_valid_records_persist_with_full_counts() {
    let batch = vec![
        quote_on("AAPL", 3),
        quote_on("AAPL", 2),
        quote_on("AAPL", 1),
    ];
    let source = Arc::new(
        ScriptedSource::new("alpha_vantage", fast_pacing("alpha_vantage"))
            .with_replies(vec![Reply::Quotes(batch)]),
    );
    let adapter: Arc<dyn SourceAdapter> = source.clone();
    let h = harness(vec![adapter], fast_config());

    let run = h
        .pipeline
        .run_once("alpha_vantage", &symbols(&["AAPL"]))
        .await
        .unwrap();

    assert!(run.is_successful());
    assert_eq!(run.records_processed, 3);
    assert_eq!(run.records_created, 3);
    assert_eq!(run.records_updated, 0);
    assert_eq!(run.retry_count, 0);
    assert!(run.completed_at.is_some());
    assert_eq!(run.efficiency(), 1.0);
    assert_eq!(h.observations.len(), 3);
    assert_eq!(source.calls(), 1);
}

#[tokio::test]
async fn test_invalid_record_is_dropped_without_failing_the_run() {
    let batch = vec![
        quote_on("AAPL", 4),
        quote_on("AAPL", 3),
        quote_on("AAPL", 2),
        inverted_quote("AAPL", 1),
    ];
    let source = Arc::new(
        ScriptedSource::new("alpha_vantage", fast_pacing("alpha_vantage"))
            .with_replies(vec![Reply::Quotes(batch)]),
    );
    let adapter: Arc<dyn SourceAdapter> = source.clone();
    let h = harness(vec![adapter], fast_config());

    let run = h
        .pipeline
        .run_once("alpha_vantage", &symbols(&["AAPL"]))
        .await
        .unwrap();

    // The inverted record is counted as processed but never persisted
    assert!(run.is_successful());
    assert_eq!(run.records_processed, 4);
    assert_eq!(run.records_created, 3);
    assert_eq!(h.observations.len(), 3);
}

#[tokio::test]
async fn test_rerun_with_same_records_creates_nothing_new() {
    let batch = vec![quote_on("AAPL", 2), quote_on("AAPL", 1)];
    let source = Arc::new(
        ScriptedSource::new("alpha_vantage", fast_pacing("alpha_vantage")).with_replies(vec![
            Reply::Quotes(batch.clone()),
            Reply::Quotes(batch),
        ]),
    );
    let adapter: Arc<dyn SourceAdapter> = source.clone();
    let h = harness(vec![adapter], fast_config());

    let first = h
        .pipeline
        .run_once("alpha_vantage", &symbols(&["AAPL"]))
        .await
        .unwrap();
    let second = h
        .pipeline
        .run_once("alpha_vantage", &symbols(&["AAPL"]))
        .await
        .unwrap();

    assert_eq!(first.records_created, 2);
    assert!(second.is_successful());
    assert_eq!(second.records_processed, 2);
    assert_eq!(second.records_created, 0);
    assert_eq!(h.observations.len(), 2);
    assert_eq!(h.run_log.len(), 2);
}

#[tokio::test]
async fn test_quality_tier_reflects_soft_issues() {
    let clean = quote_on("AAPL", 1).with_adjusted_close(dec!(101.5));
    let bare = quote_on("MSFT", 1);
    let source = Arc::new(
        ScriptedSource::new("alpha_vantage", fast_pacing("alpha_vantage")).with_replies(vec![
            Reply::Quotes(vec![clean.clone()]),
            Reply::Quotes(vec![bare.clone()]),
        ]),
    );
    let adapter: Arc<dyn SourceAdapter> = source.clone();
    let h = harness(vec![adapter], fast_config());

    let run = h
        .pipeline
        .run_once("alpha_vantage", &symbols(&["AAPL", "MSFT"]))
        .await
        .unwrap();
    assert!(run.is_successful());

    let graded_high = h
        .observations
        .lookup(&ObservationKey {
            symbol: "AAPL".to_string(),
            timestamp: clean.timestamp,
            source: "alpha_vantage".to_string(),
        })
        .await
        .unwrap()
        .unwrap();
    assert_eq!(graded_high.quality_tier, QualityTier::High);

    // Missing adjusted close is one soft issue
    let graded_medium = h
        .observations
        .lookup(&ObservationKey {
            symbol: "MSFT".to_string(),
            timestamp: bare.timestamp,
            source: "alpha_vantage".to_string(),
        })
        .await
        .unwrap()
        .unwrap();
    assert_eq!(graded_medium.quality_tier, QualityTier::Medium);
}

// =============================================================================
// Retry and failure classification
// =============================================================================

#[tokio::test]
async fn test_always_rate_limited_source_finalizes_rate_limited() {
    let source = Arc::new(
        ScriptedSource::new("alpha_vantage", fast_pacing("alpha_vantage"))
            .with_fallback(Reply::RateLimited),
    );
    let adapter: Arc<dyn SourceAdapter> = source.clone();
    let h = harness(
        vec![adapter],
        PipelineConfig {
            max_retries: 2,
            ..fast_config()
        },
    );

    let run = h
        .pipeline
        .run_once("alpha_vantage", &symbols(&["AAPL"]))
        .await
        .unwrap();

    assert_eq!(run.status, ScrapeStatus::RateLimited);
    // Initial attempt plus max_retries retries, then the symbol is abandoned
    assert_eq!(source.calls(), 3);
    assert_eq!(run.retry_count, 2);
    assert!(run.retry_count <= run.max_retries);
    assert_eq!(run.records_processed, 0);
    assert!(run.error_message.unwrap().contains("Rate limited"));
}

#[tokio::test]
async fn test_transient_errors_recover_within_budget() {
    let source = Arc::new(
        ScriptedSource::new("alpha_vantage", fast_pacing("alpha_vantage")).with_replies(vec![
            Reply::Timeout,
            Reply::RateLimited,
            Reply::Quotes(vec![quote_on("AAPL", 1)]),
        ]),
    );
    let adapter: Arc<dyn SourceAdapter> = source.clone();
    let h = harness(vec![adapter], fast_config());

    let run = h
        .pipeline
        .run_once("alpha_vantage", &symbols(&["AAPL"]))
        .await
        .unwrap();

    assert!(run.is_successful());
    assert_eq!(source.calls(), 3);
    assert_eq!(run.retry_count, 2);
    assert_eq!(run.records_created, 1);
    assert!(run.error_message.is_none());
}

#[tokio::test]
async fn test_unknown_symbol_fails_without_retrying() {
    let source = Arc::new(
        ScriptedSource::new("alpha_vantage", fast_pacing("alpha_vantage"))
            .with_fallback(Reply::NotFound),
    );
    let adapter: Arc<dyn SourceAdapter> = source.clone();
    let h = harness(vec![adapter], fast_config());

    let run = h
        .pipeline
        .run_once("alpha_vantage", &symbols(&["AAPL"]))
        .await
        .unwrap();

    assert_eq!(run.status, ScrapeStatus::Failed);
    assert_eq!(source.calls(), 1);
    assert_eq!(run.retry_count, 0);
    let message = run.error_message.unwrap();
    assert!(message.contains("AAPL"));
    assert!(message.contains("Symbol not found"));
}

#[tokio::test]
async fn test_one_bad_symbol_does_not_fail_the_run() {
    let source = Arc::new(
        ScriptedSource::new("alpha_vantage", fast_pacing("alpha_vantage")).with_replies(vec![
            Reply::Quotes(vec![quote_on("GOOD", 1)]),
            Reply::NotFound,
        ]),
    );
    let adapter: Arc<dyn SourceAdapter> = source.clone();
    let h = harness(vec![adapter], fast_config());

    let run = h
        .pipeline
        .run_once("alpha_vantage", &symbols(&["GOOD", "MISSING"]))
        .await
        .unwrap();

    assert!(run.is_successful());
    assert_eq!(run.records_created, 1);
    assert!(run.error_message.is_none());
    assert!(run.target_symbol.is_none());
}

#[tokio::test]
async fn test_all_terminal_failures_finalize_failed() {
    let source = Arc::new(
        ScriptedSource::new("alpha_vantage", fast_pacing("alpha_vantage")).with_replies(vec![
            Reply::NotFound,
            Reply::Malformed("missing time series key"),
        ]),
    );
    let adapter: Arc<dyn SourceAdapter> = source.clone();
    let h = harness(vec![adapter], fast_config());

    let run = h
        .pipeline
        .run_once("alpha_vantage", &symbols(&["AAA", "BBB"]))
        .await
        .unwrap();

    assert_eq!(run.status, ScrapeStatus::Failed);
    let message = run.error_message.unwrap();
    assert!(message.contains("AAA"));
    assert!(message.contains("BBB"));
    assert!(message.contains("Malformed response"));
}

#[tokio::test]
async fn test_mixed_failures_are_failed_not_rate_limited() {
    // AAA exhausts its retry budget against the quota, BBB is unknown;
    // a run is only RateLimited when rate limiting explains every failure
    let source = Arc::new(
        ScriptedSource::new("alpha_vantage", fast_pacing("alpha_vantage")).with_replies(vec![
            Reply::RateLimited,
            Reply::RateLimited,
            Reply::NotFound,
        ]),
    );
    let adapter: Arc<dyn SourceAdapter> = source.clone();
    let h = harness(
        vec![adapter],
        PipelineConfig {
            max_retries: 1,
            ..fast_config()
        },
    );

    let run = h
        .pipeline
        .run_once("alpha_vantage", &symbols(&["AAA", "BBB"]))
        .await
        .unwrap();

    assert_eq!(run.status, ScrapeStatus::Failed);
    assert!(run.retry_count <= run.max_retries);
}

// =============================================================================
// Budget, cancellation, and storage faults
// =============================================================================

#[tokio::test]
async fn test_exhausted_run_budget_finalizes_timed_out() {
    // The first backoff delay already exceeds the whole run budget
    let pacing = SourceConfig {
        backoff_base: Duration::from_millis(200),
        backoff_max: Duration::from_secs(1),
        ..fast_pacing("alpha_vantage")
    };
    let source = Arc::new(ScriptedSource::new("alpha_vantage", pacing).with_fallback(Reply::Timeout));
    let adapter: Arc<dyn SourceAdapter> = source.clone();
    let h = harness(
        vec![adapter],
        PipelineConfig {
            run_budget: Duration::from_millis(50),
            ..fast_config()
        },
    );

    let run = h
        .pipeline
        .run_once("alpha_vantage", &symbols(&["AAPL"]))
        .await
        .unwrap();

    assert_eq!(run.status, ScrapeStatus::TimedOut);
    assert_eq!(source.calls(), 1);
    assert_eq!(run.retry_count, 0);
    assert_eq!(
        run.error_message.as_deref(),
        Some("run budget exhausted after 0 of 1 symbols")
    );
}

#[tokio::test]
async fn test_cancellation_preserves_partial_counts() {
    let token = CancelToken::new();
    let adapter: Arc<dyn SourceAdapter> = Arc::new(CancellingSource {
        id: "alpha_vantage",
        token: token.clone(),
        quotes: vec![quote_on("AAPL", 1)],
    });
    let h = harness(vec![adapter], fast_config());

    let run = h
        .pipeline
        .run_once_with_cancel("alpha_vantage", &symbols(&["AAPL", "MSFT"]), &token)
        .await
        .unwrap();

    // The first symbol completed before cancellation was observed
    assert_eq!(run.status, ScrapeStatus::TimedOut);
    assert_eq!(run.records_created, 1);
    assert_eq!(
        run.error_message.as_deref(),
        Some("cancelled after 1 of 2 symbols")
    );
    assert_eq!(h.observations.len(), 1);
}

#[tokio::test]
async fn test_storage_fault_fails_the_run_in_place() {
    let source = Arc::new(
        ScriptedSource::new("alpha_vantage", fast_pacing("alpha_vantage"))
            .with_replies(vec![Reply::Quotes(vec![quote_on("AAPL", 1)])]),
    );
    let adapter: Arc<dyn SourceAdapter> = source.clone();
    let run_log = Arc::new(MemoryRunLog::new());
    let pipeline = IngestionPipeline::new(
        Arc::new(SourceRegistry::new(vec![adapter])),
        Arc::new(FailingStore),
        Arc::clone(&run_log),
        fast_config(),
    );

    let run = pipeline
        .run_once("alpha_vantage", &symbols(&["AAPL"]))
        .await
        .unwrap();

    assert_eq!(run.status, ScrapeStatus::Failed);
    assert_eq!(run.records_processed, 1);
    assert_eq!(run.records_created, 0);
    let message = run.error_message.unwrap();
    assert!(message.contains("storage fault"));
    assert!(message.contains("disk full"));

    // The failure is recorded in run history, not surfaced as an Err
    let logged = run_log.recent("alpha_vantage", 10).await.unwrap();
    assert_eq!(logged.len(), 1);
    assert_eq!(logged[0].status, ScrapeStatus::Failed);
}

// =============================================================================
// Source independence and run history
// =============================================================================

#[tokio::test]
async fn test_starved_source_does_not_block_sibling_run() {
    let starved_pacing = SourceConfig {
        requests_per_minute: 1,
        burst_allowance: 1,
        backoff_base: Duration::from_millis(1),
        backoff_max: Duration::ZERO,
        ..SourceConfig::for_source("alpha_vantage")
    };
    let starved = Arc::new(ScriptedSource::new("alpha_vantage", starved_pacing));
    let healthy = Arc::new(
        ScriptedSource::new("yahoo", fast_pacing("yahoo"))
            .with_replies(vec![Reply::Quotes(vec![quote_on("MSFT", 1)])]),
    );
    let adapters: Vec<Arc<dyn SourceAdapter>> = vec![starved.clone(), healthy.clone()];
    let h = harness(
        adapters,
        PipelineConfig {
            max_retries: 1,
            ..fast_config()
        },
    );

    // Drain the starved source's only token; its next acquire fails fast
    h.registry.acquire("alpha_vantage").await.unwrap();

    let started = Instant::now();
    let results = h
        .pipeline
        .run_many(vec![
            RunRequest::new("alpha_vantage", symbols(&["AAPL"])),
            RunRequest::new("yahoo", symbols(&["MSFT"])),
        ])
        .await;
    let elapsed = started.elapsed();

    let starved_run = results[0].as_ref().unwrap();
    let healthy_run = results[1].as_ref().unwrap();

    assert_eq!(starved_run.status, ScrapeStatus::RateLimited);
    assert!(healthy_run.is_successful());
    assert_eq!(healthy_run.records_created, 1);
    // Waiting out the starved source's quota would take a minute; fast
    // completion shows the healthy run never queued behind it
    assert!(elapsed < Duration::from_secs(2));
}

#[tokio::test]
async fn test_run_log_keeps_terminal_entries_newest_first() {
    let batch = vec![quote_on("AAPL", 1)];
    let source = Arc::new(
        ScriptedSource::new("alpha_vantage", fast_pacing("alpha_vantage")).with_replies(vec![
            Reply::Quotes(batch.clone()),
            Reply::Quotes(batch),
        ]),
    );
    let adapter: Arc<dyn SourceAdapter> = source.clone();
    let h = harness(vec![adapter], fast_config());

    let first = h
        .pipeline
        .run_once("alpha_vantage", &symbols(&["AAPL"]))
        .await
        .unwrap();
    let second = h
        .pipeline
        .run_once("alpha_vantage", &symbols(&["AAPL"]))
        .await
        .unwrap();

    let entries = h.run_log.recent("alpha_vantage", 10).await.unwrap();
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0].id, second.id);
    assert_eq!(entries[1].id, first.id);
    assert!(entries.iter().all(|run| run.status.is_terminal()));
    assert!(entries.iter().all(|run| run.completed_at.is_some()));
}
