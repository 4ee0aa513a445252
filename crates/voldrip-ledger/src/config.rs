//! Ledger configuration.
//!
//! Provides [`LedgerConfig`] with the bounds every drip manager enforces on
//! period lengths, amounts and roll-forward work per call.

use serde::{Deserialize, Serialize};
use voldrip_core::constants::{DEFAULT_MAX_PERIODS_PER_CALL, DEFAULT_MIN_PERIOD_SECONDS, MAX_AMOUNT};
use voldrip_core::error::DripError;
use voldrip_core::types::Amount;

/// Bounds applied by a drip manager.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize,
    bincode::Encode, bincode::Decode,
)]
pub struct LedgerConfig {
    /// Shortest accepted `period_seconds`. Zero is always rejected.
    pub min_period_seconds: u64,
    /// Largest drip amount, volume delta or period total.
    pub max_amount: Amount,
    /// Largest number of periods a single call may roll forward.
    pub max_periods_per_call: u64,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            min_period_seconds: DEFAULT_MIN_PERIOD_SECONDS,
            max_amount: MAX_AMOUNT,
            max_periods_per_call: DEFAULT_MAX_PERIODS_PER_CALL,
        }
    }
}

impl LedgerConfig {
    /// Validate a `(period_seconds, drip_amount)` pair for `activate` or `set`.
    pub fn check_drip(&self, period_seconds: u64, drip_amount: Amount) -> Result<(), DripError> {
        if period_seconds == 0 {
            return Err(DripError::ZeroPeriodSeconds);
        }
        if period_seconds < self.min_period_seconds {
            return Err(DripError::PeriodTooShort {
                got: period_seconds,
                min: self.min_period_seconds,
            });
        }
        self.check_amount(drip_amount)
    }

    /// Validate an amount against [`max_amount`](Self::max_amount).
    pub fn check_amount(&self, amount: Amount) -> Result<(), DripError> {
        if amount > self.max_amount {
            return Err(DripError::AmountTooLarge {
                got: amount,
                max: self.max_amount,
            });
        }
        Ok(())
    }
}
