//! Scrape run orchestration.
//!
//! The ingestion pipeline drives one scrape run end to end: look up the
//! source adapter, open a [`ScrapeRun`], fetch each requested symbol under
//! the source's rate limit and retry policy, validate and persist what came
//! back, and finalize the run with a terminal status.
//!
//! ```text
//!  run_once(source, symbols)
//!        │
//!        ▼
//!  IngestionPipeline ──► SourceRegistry ──► rate limiter / backoff
//!        │                     │
//!        │                     └──► SourceAdapter::fetch
//!        │
//!        ├──► ObservationValidator ──► quality tier or reject
//!        ├──► ObservationStore     ──► insert, duplicates ignored
//!        └──► RunLog               ──► append / update ScrapeRun
//! ```
//!
//! Symbols within a run are fetched sequentially; concurrency across sources
//! comes from [`IngestionPipeline::run_many`], where runs against different
//! sources interleave freely because each source paces only its own callers.
//!
//! Transient fetch errors (rate limiting, timeouts) back off exponentially
//! up to the run's retry budget, terminal errors fail the symbol
//! immediately, and one symbol's failure never stops the rest of the run.
//! Only a run log write failure escapes as an `Err`; every other outcome,
//! including storage faults, is reflected in the returned run.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use futures::future::join_all;
use log::{debug, error, warn};
use tokio::time::{sleep, timeout};

use finboard_market_data::{Quote, RetryClass, SourceAdapter, SourceError, SourceRegistry};

use crate::config::PipelineConfig;
use crate::constants::DEFAULT_LOOKBACK_DAYS;
use crate::errors::{IngestError, Result, StoreError};
use crate::observations::{InsertOutcome, ObservationStore, PriceObservation};
use crate::runs::{RunLog, ScrapeRun, ScrapeStatus, ScrapeType};

mod validator;

pub use validator::{ObservationValidator, ValidationFailure, ValidatorConfig};

// =============================================================================
// Cancellation
// =============================================================================

/// Cooperative cancellation flag shared between a run and its controller.
///
/// Cloning is cheap; every clone observes the same flag. A cancelled run
/// finalizes as timed out, keeping whatever partial counts it accumulated.
#[derive(Clone, Debug, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    /// Create a token in the not-cancelled state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation. Idempotent.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    /// Whether cancellation has been requested.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

// =============================================================================
// Run Requests
// =============================================================================

/// One source's worth of work for [`IngestionPipeline::run_many`].
#[derive(Clone, Debug)]
pub struct RunRequest {
    /// Registered source id to fetch from.
    pub source_id: String,
    /// Symbols to fetch, in order.
    pub symbols: Vec<String>,
}

impl RunRequest {
    pub fn new(source_id: impl Into<String>, symbols: Vec<String>) -> Self {
        Self {
            source_id: source_id.into(),
            symbols,
        }
    }
}

// =============================================================================
// Per-Symbol Outcomes
// =============================================================================

/// Why a run stopped before attempting every symbol.
enum RunAbort {
    /// The wall-clock budget ran out.
    Budget,
    /// Cancellation was requested.
    Cancelled,
    /// The observation store failed; nothing more can be persisted.
    Storage(StoreError),
}

/// Terminal outcome of processing one symbol.
enum SymbolOutcome {
    /// Fetch succeeded and its records were validated and persisted.
    Completed,
    /// The symbol failed for good, after retries where the error allowed
    /// them.
    Failed {
        message: String,
        /// True when the final error was rate limiting.
        rate_limited: bool,
    },
}

// =============================================================================
// Ingestion Pipeline
// =============================================================================

/// Orchestrates scrape runs against registered sources.
///
/// This is a thin layer over its collaborators: the [`SourceRegistry`] owns
/// adapters and pacing, the [`ObservationValidator`] grades records, and the
/// two stores persist observations and run history. The pipeline itself
/// holds no mutable state, so one instance serves concurrent runs.
pub struct IngestionPipeline<O, L>
where
    O: ObservationStore,
    L: RunLog,
{
    /// Registered source adapters plus their shared pacing state.
    registry: Arc<SourceRegistry>,
    /// Destination for validated observations.
    observations: Arc<O>,
    /// Append-only history of scrape runs.
    run_log: Arc<L>,
    /// Record grading rules.
    validator: ObservationValidator,
    /// Run-level settings.
    config: PipelineConfig,
}

impl<O, L> IngestionPipeline<O, L>
where
    O: ObservationStore,
    L: RunLog,
{
    /// Create a pipeline over the given collaborators.
    ///
    /// The validator is derived from `config`; use
    /// [`with_validator`](Self::with_validator) to replace it.
    pub fn new(
        registry: Arc<SourceRegistry>,
        observations: Arc<O>,
        run_log: Arc<L>,
        config: PipelineConfig,
    ) -> Self {
        let validator = ObservationValidator::new(ValidatorConfig {
            clock_skew_tolerance: config.clock_skew_tolerance,
            ..ValidatorConfig::default()
        });
        Self {
            registry,
            observations,
            run_log,
            validator,
            config,
        }
    }

    /// Replace the record validator.
    pub fn with_validator(mut self, validator: ObservationValidator) -> Self {
        self.validator = validator;
        self
    }

    /// Execute one scrape run against a source.
    ///
    /// Returns the finalized [`ScrapeRun`] whatever happened during the
    /// fetch; the status and counters tell the story. The only `Err` this
    /// returns is [`IngestError::UnknownSource`] for an unregistered source
    /// id or [`IngestError::RunLog`] when run history cannot be written.
    pub async fn run_once(&self, source_id: &str, symbols: &[String]) -> Result<ScrapeRun> {
        self.run_once_with_cancel(source_id, symbols, &CancelToken::new())
            .await
    }

    /// Execute one scrape run, checking `cancel` between attempts.
    pub async fn run_once_with_cancel(
        &self,
        source_id: &str,
        symbols: &[String],
        cancel: &CancelToken,
    ) -> Result<ScrapeRun> {
        let adapter = self
            .registry
            .get(source_id)
            .ok_or_else(|| IngestError::UnknownSource(source_id.to_string()))?;

        let target_symbol = if symbols.len() == 1 {
            Some(symbols[0].clone())
        } else {
            None
        };
        let mut run = ScrapeRun::new(
            source_id,
            ScrapeType::StockPrice,
            target_symbol,
            self.config.max_retries,
        );
        self.run_log
            .append(run.clone())
            .await
            .map_err(IngestError::RunLog)?;

        run.begin();
        self.run_log
            .update(run.clone())
            .await
            .map_err(IngestError::RunLog)?;

        debug!(
            "Run {} started for '{}' ({} symbols)",
            run.id,
            source_id,
            symbols.len()
        );

        let since = Utc::now() - self.lookback();
        let deadline = Instant::now() + self.config.run_budget;

        let mut completed: usize = 0;
        let mut attempted: usize = 0;
        let mut failures: Vec<(String, String)> = Vec::new();
        let mut rate_limited_failures: usize = 0;
        let mut abort: Option<RunAbort> = None;

        for symbol in symbols {
            match self
                .process_symbol(&adapter, &mut run, symbol, since, deadline, cancel)
                .await
            {
                Ok(SymbolOutcome::Completed) => {
                    attempted += 1;
                    completed += 1;
                }
                Ok(SymbolOutcome::Failed {
                    message,
                    rate_limited,
                }) => {
                    attempted += 1;
                    if rate_limited {
                        rate_limited_failures += 1;
                    }
                    failures.push((symbol.clone(), message));
                }
                Err(reason) => {
                    abort = Some(reason);
                    break;
                }
            }
        }

        let total = symbols.len();
        let (status, error_message) = match abort {
            Some(RunAbort::Storage(err)) => {
                error!("Run {}: aborted by storage fault: {}", run.id, err);
                (
                    ScrapeStatus::Failed,
                    Some(format!("storage fault: {}", err)),
                )
            }
            Some(RunAbort::Budget) => (
                ScrapeStatus::TimedOut,
                Some(format!(
                    "run budget exhausted after {} of {} symbols",
                    attempted, total
                )),
            ),
            Some(RunAbort::Cancelled) => (
                ScrapeStatus::TimedOut,
                Some(format!("cancelled after {} of {} symbols", attempted, total)),
            ),
            None if total == 0 => (
                ScrapeStatus::Failed,
                Some("no symbols requested".to_string()),
            ),
            None if completed > 0 => {
                if !failures.is_empty() {
                    warn!(
                        "Run {}: {} of {} symbols failed: {}",
                        run.id,
                        failures.len(),
                        total,
                        failure_summary(&failures)
                    );
                }
                (ScrapeStatus::Success, None)
            }
            // Every symbol ran out of retries against the source's quota and
            // nothing was obtained: the run as a whole was rate limited.
            None if rate_limited_failures == failures.len() && run.records_processed == 0 => (
                ScrapeStatus::RateLimited,
                Some(failure_summary(&failures)),
            ),
            None => (ScrapeStatus::Failed, Some(failure_summary(&failures))),
        };

        run.finish(status, error_message);
        self.run_log
            .update(run.clone())
            .await
            .map_err(IngestError::RunLog)?;

        debug!(
            "Run {} finished {}: {} processed, {} created, retry high-water {}",
            run.id,
            run.status.as_str(),
            run.records_processed,
            run.records_created,
            run.retry_count
        );

        Ok(run)
    }

    /// Execute runs for several sources, one run per request.
    ///
    /// Runs interleave on the calling task; a starved source suspends only
    /// its own run while the others proceed.
    pub async fn run_many(&self, requests: Vec<RunRequest>) -> Vec<Result<ScrapeRun>> {
        join_all(requests.into_iter().map(|request| async move {
            self.run_once(&request.source_id, &request.symbols).await
        }))
        .await
    }

    /// Fetch one symbol, retrying transient errors until the retry budget,
    /// the run budget, or cancellation stops it.
    async fn process_symbol(
        &self,
        adapter: &Arc<dyn SourceAdapter>,
        run: &mut ScrapeRun,
        symbol: &str,
        since: DateTime<Utc>,
        deadline: Instant,
        cancel: &CancelToken,
    ) -> std::result::Result<SymbolOutcome, RunAbort> {
        let source = run.source.clone();
        self.registry.backoff().begin(&source, symbol);

        loop {
            if cancel.is_cancelled() {
                return Err(RunAbort::Cancelled);
            }
            if Instant::now() >= deadline {
                return Err(RunAbort::Budget);
            }

            // A rejected permit is a transient rate-limit failure and goes
            // through the same backoff path as an in-band throttle notice.
            let fetch_result = match self.registry.acquire(&source).await {
                Ok(_permit) => {
                    match timeout(self.config.fetch_timeout, adapter.fetch(symbol, since)).await {
                        Ok(result) => result,
                        Err(_) => Err(SourceError::Timeout {
                            source_id: source.clone(),
                        }),
                    }
                }
                Err(err) => Err(err),
            };

            match fetch_result {
                Ok(quotes) => {
                    self.registry.backoff().record_success(&source, symbol);
                    debug!(
                        "Fetched {} records for {}/{}",
                        quotes.len(),
                        source,
                        symbol
                    );
                    self.persist_quotes(run, symbol, quotes)
                        .await
                        .map_err(RunAbort::Storage)?;
                    return Ok(SymbolOutcome::Completed);
                }
                Err(err) => match err.retry_class() {
                    RetryClass::Never => {
                        warn!("Giving up on {}/{}: {}", source, symbol, err);
                        return Ok(SymbolOutcome::Failed {
                            message: err.to_string(),
                            rate_limited: false,
                        });
                    }
                    RetryClass::WithBackoff => {
                        let used = self.registry.backoff().retries(&source, symbol);
                        if used >= run.max_retries {
                            warn!(
                                "Exhausted {} retries for {}/{}: {}",
                                run.max_retries, source, symbol, err
                            );
                            return Ok(SymbolOutcome::Failed {
                                message: err.to_string(),
                                rate_limited: matches!(err, SourceError::RateLimited { .. }),
                            });
                        }

                        let delay = self.registry.backoff().next_delay(&source, symbol);
                        let remaining = deadline.saturating_duration_since(Instant::now());
                        if delay >= remaining {
                            return Err(RunAbort::Budget);
                        }

                        // Counted only once the retry is committed
                        run.retry_count = run.retry_count.max(used + 1);
                        debug!(
                            "Retry {}/{} for {}/{} in {:?} after: {}",
                            used + 1,
                            run.max_retries,
                            source,
                            symbol,
                            delay,
                            err
                        );
                        sleep(delay).await;
                    }
                },
            }
        }
    }

    /// Validate and insert one fetch's records, updating the run counters.
    ///
    /// Invalid records are dropped with a warning; duplicates leave the
    /// stored row untouched. A store error aborts the whole run.
    async fn persist_quotes(
        &self,
        run: &mut ScrapeRun,
        symbol: &str,
        quotes: Vec<Quote>,
    ) -> std::result::Result<(), StoreError> {
        let now = Utc::now();

        for quote in quotes {
            run.records_processed += 1;

            let tier = match self.validator.validate(&quote, now) {
                Ok(tier) => tier,
                Err(failure) => {
                    warn!(
                        "Dropping record for {} at {}: {}",
                        symbol, quote.timestamp, failure
                    );
                    continue;
                }
            };

            let observation = PriceObservation::from_quote(quote, run.source.clone(), tier);
            match self.observations.insert(observation).await? {
                InsertOutcome::Inserted => run.records_created += 1,
                InsertOutcome::DuplicateIgnored => {
                    debug!("Duplicate observation for {} ignored", symbol);
                }
            }
        }

        Ok(())
    }

    /// Fetch window start, falling back to the default lookback when the
    /// configured one does not fit a chrono duration.
    fn lookback(&self) -> ChronoDuration {
        ChronoDuration::from_std(self.config.lookback)
            .unwrap_or_else(|_| ChronoDuration::days(DEFAULT_LOOKBACK_DAYS))
    }
}

/// Join per-symbol failures into one run-level error message.
fn failure_summary(failures: &[(String, String)]) -> String {
    failures
        .iter()
        .map(|(symbol, message)| format!("{}: {}", symbol, message))
        .collect::<Vec<_>>()
        .join("; ")
}
