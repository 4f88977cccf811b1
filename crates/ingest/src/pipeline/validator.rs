//! Observation validation.
//!
//! Every fetched record passes through here before it may become a
//! `PriceObservation`. Hard invariant violations drop the record (counted,
//! never persisted); soft issues degrade the quality tier but let the
//! record through.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use rust_decimal::Decimal;
use std::time::Duration;
use thiserror::Error;

use crate::constants::DEFAULT_CLOCK_SKEW_TOLERANCE_SECS;
use crate::observations::QualityTier;
use finboard_market_data::Quote;

// =============================================================================
// Configuration
// =============================================================================

/// Validation settings.
#[derive(Clone, Debug, PartialEq)]
pub struct ValidatorConfig {
    /// How far ahead of `now` a timestamp may sit before rejection.
    pub clock_skew_tolerance: Duration,

    /// Treat zero trading volume as a soft quality issue.
    pub flag_zero_volume: bool,

    /// Treat a missing adjusted close as a soft quality issue.
    pub flag_missing_adjusted_close: bool,
}

impl Default for ValidatorConfig {
    fn default() -> Self {
        Self {
            clock_skew_tolerance: Duration::from_secs(DEFAULT_CLOCK_SKEW_TOLERANCE_SECS),
            flag_zero_volume: true,
            flag_missing_adjusted_close: true,
        }
    }
}

// =============================================================================
// Validation Failure
// =============================================================================

/// Hard invariant violation. Consumed inside the pipeline: the offending
/// record is dropped and counted, and the failure never crosses the
/// pipeline boundary.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationFailure {
    #[error("high {high} is below low {low}")]
    HighBelowLow { high: Decimal, low: Decimal },

    #[error("open {open} is outside the low/high range")]
    OpenOutsideRange { open: Decimal },

    #[error("close {close} is outside the low/high range")]
    CloseOutsideRange { close: Decimal },

    #[error("negative price")]
    NegativePrice,

    #[error("timestamp {timestamp} is ahead of the clock beyond tolerance")]
    FutureTimestamp { timestamp: DateTime<Utc> },
}

// =============================================================================
// Validator
// =============================================================================

/// Checks fetched quotes against the observation invariants and grades the
/// survivors.
#[derive(Clone, Debug, Default)]
pub struct ObservationValidator {
    config: ValidatorConfig,
}

impl ObservationValidator {
    pub fn new(config: ValidatorConfig) -> Self {
        Self { config }
    }

    /// Validate one quote against `now`.
    ///
    /// # Returns
    ///
    /// The quality tier to persist with on a pass, or the first hard
    /// violation found.
    pub fn validate(
        &self,
        quote: &Quote,
        now: DateTime<Utc>,
    ) -> Result<QualityTier, ValidationFailure> {
        if quote.open < Decimal::ZERO
            || quote.high < Decimal::ZERO
            || quote.low < Decimal::ZERO
            || quote.close < Decimal::ZERO
        {
            return Err(ValidationFailure::NegativePrice);
        }

        if quote.high < quote.low {
            return Err(ValidationFailure::HighBelowLow {
                high: quote.high,
                low: quote.low,
            });
        }

        if quote.open > quote.high || quote.open < quote.low {
            return Err(ValidationFailure::OpenOutsideRange { open: quote.open });
        }

        if quote.close > quote.high || quote.close < quote.low {
            return Err(ValidationFailure::CloseOutsideRange { close: quote.close });
        }

        if quote.timestamp > now + self.skew() {
            return Err(ValidationFailure::FutureTimestamp {
                timestamp: quote.timestamp,
            });
        }

        let mut soft_issues = 0;
        if self.config.flag_zero_volume && quote.volume == 0 {
            soft_issues += 1;
        }
        if self.config.flag_missing_adjusted_close && quote.adjusted_close.is_none() {
            soft_issues += 1;
        }

        Ok(QualityTier::from_soft_issues(soft_issues))
    }

    fn skew(&self) -> ChronoDuration {
        ChronoDuration::from_std(self.config.clock_skew_tolerance)
            .unwrap_or_else(|_| ChronoDuration::seconds(DEFAULT_CLOCK_SKEW_TOLERANCE_SECS as i64))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rust_decimal_macros::dec;

    fn quote(open: Decimal, high: Decimal, low: Decimal, close: Decimal) -> Quote {
        Quote::ohlcv(
            "AAPL",
            Utc.with_ymd_and_hms(2024, 1, 15, 0, 0, 0).unwrap(),
            open,
            high,
            low,
            close,
            1_000_000,
        )
        .with_adjusted_close(close)
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 16, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_clean_quote_is_high_tier() {
        let validator = ObservationValidator::default();
        let tier = validator
            .validate(&quote(dec!(10), dec!(12), dec!(9), dec!(11)), now())
            .unwrap();
        assert_eq!(tier, QualityTier::High);
    }

    #[test]
    fn test_flat_day_passes() {
        let validator = ObservationValidator::default();
        let tier = validator
            .validate(&quote(dec!(10), dec!(10), dec!(10), dec!(10)), now())
            .unwrap();
        assert_eq!(tier, QualityTier::High);
    }

    #[test]
    fn test_high_below_low_is_rejected() {
        let validator = ObservationValidator::default();
        let err = validator
            .validate(&quote(dec!(10), dec!(9), dec!(12), dec!(10)), now())
            .unwrap_err();
        assert!(matches!(err, ValidationFailure::HighBelowLow { .. }));
    }

    #[test]
    fn test_open_outside_range_is_rejected() {
        let validator = ObservationValidator::default();

        let above = validator
            .validate(&quote(dec!(13), dec!(12), dec!(9), dec!(11)), now())
            .unwrap_err();
        assert!(matches!(above, ValidationFailure::OpenOutsideRange { .. }));

        let below = validator
            .validate(&quote(dec!(8), dec!(12), dec!(9), dec!(11)), now())
            .unwrap_err();
        assert!(matches!(below, ValidationFailure::OpenOutsideRange { .. }));
    }

    #[test]
    fn test_close_outside_range_is_rejected() {
        let validator = ObservationValidator::default();
        let err = validator
            .validate(&quote(dec!(10), dec!(12), dec!(9), dec!(8)), now())
            .unwrap_err();
        assert!(matches!(err, ValidationFailure::CloseOutsideRange { .. }));
    }

    #[test]
    fn test_negative_price_is_rejected() {
        let validator = ObservationValidator::default();
        let err = validator
            .validate(&quote(dec!(-1), dec!(12), dec!(9), dec!(11)), now())
            .unwrap_err();
        assert_eq!(err, ValidationFailure::NegativePrice);
    }

    #[test]
    fn test_future_timestamp_beyond_tolerance_is_rejected() {
        let validator = ObservationValidator::new(ValidatorConfig {
            clock_skew_tolerance: Duration::from_secs(300),
            ..ValidatorConfig::default()
        });

        let mut q = quote(dec!(10), dec!(12), dec!(9), dec!(11));
        q.timestamp = now() + ChronoDuration::seconds(400);
        let err = validator.validate(&q, now()).unwrap_err();
        assert!(matches!(err, ValidationFailure::FutureTimestamp { .. }));
    }

    #[test]
    fn test_future_timestamp_within_tolerance_passes() {
        let validator = ObservationValidator::new(ValidatorConfig {
            clock_skew_tolerance: Duration::from_secs(300),
            ..ValidatorConfig::default()
        });

        let mut q = quote(dec!(10), dec!(12), dec!(9), dec!(11));
        q.timestamp = now() + ChronoDuration::seconds(200);
        assert!(validator.validate(&q, now()).is_ok());
    }

    #[test]
    fn test_soft_issues_degrade_tier() {
        let validator = ObservationValidator::default();

        let mut zero_volume = quote(dec!(10), dec!(12), dec!(9), dec!(11));
        zero_volume.volume = 0;
        assert_eq!(
            validator.validate(&zero_volume, now()).unwrap(),
            QualityTier::Medium
        );

        let mut both = zero_volume.clone();
        both.adjusted_close = None;
        assert_eq!(validator.validate(&both, now()).unwrap(), QualityTier::Low);
    }

    #[test]
    fn test_soft_issue_toggles_disable_grading() {
        let validator = ObservationValidator::new(ValidatorConfig {
            flag_zero_volume: false,
            flag_missing_adjusted_close: false,
            ..ValidatorConfig::default()
        });

        let mut q = quote(dec!(10), dec!(12), dec!(9), dec!(11));
        q.volume = 0;
        q.adjusted_close = None;
        assert_eq!(validator.validate(&q, now()).unwrap(), QualityTier::High);
    }
}
