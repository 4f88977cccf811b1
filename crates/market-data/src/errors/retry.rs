/// Classification for retry policy.
///
/// Used to determine how the ingestion pipeline should respond to a
/// [`SourceError`](super::SourceError) from an adapter call.
///
/// # Behavior Summary
///
/// | Class | Retry Same Symbol? | Backoff Delay Applied? |
/// |-------|--------------------|------------------------|
/// | `Never` | No | No |
/// | `WithBackoff` | Yes, up to maxRetries | Yes (exponential + jitter) |
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum RetryClass {
    /// Never retry - unknown symbol or a data-contract violation.
    /// The request is fundamentally invalid and retrying won't help.
    Never,

    /// Retry the same symbol after an exponential backoff delay.
    ///
    /// Used for transient errors like rate limiting (429) or timeout.
    /// Each consecutive failure doubles the delay up to the source's
    /// configured ceiling; the attempt is abandoned once the retry
    /// budget is exhausted.
    WithBackoff,
}
