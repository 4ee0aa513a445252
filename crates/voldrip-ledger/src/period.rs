//! Sequential period ledger for one (measure, drip) pair.
//!
//! Periods are indexed from 1. The highest index is the open period; every
//! lower index is closed and its `total_volume` frozen. Roll-forward only
//! happens when the open period's end time has been reached, and it creates
//! every elapsed period so indices stay contiguous and boundaries stay
//! time-exact: `end(i + 1) = end(i) + period_seconds`.
//!
//! A deactivated ledger keeps its history but has no config; its open
//! period is frozen as-is and never rolls.

use voldrip_core::error::DripError;
use voldrip_core::types::{Amount, DripConfig, Period, PeriodIndex, Timestamp};

/// Period history and config for one (measure, drip) pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeriodLedger {
    /// `Some` iff the drip is active.
    config: Option<DripConfig>,
    /// Closed periods; `closed[i]` has index `i + 1`.
    closed: Vec<Period>,
    /// The open (or frozen) period, index `closed.len() + 1`.
    current: Period,
}

impl PeriodLedger {
    /// Start a ledger whose first period ends at `end_time`.
    pub fn new(config: DripConfig, end_time: Timestamp) -> Self {
        Self {
            config: Some(config),
            closed: Vec::new(),
            current: Period {
                total_volume: 0,
                drip_amount: config.drip_amount,
                end_time,
            },
        }
    }

    /// Rebuild a ledger from stored parts.
    pub fn from_parts(config: Option<DripConfig>, closed: Vec<Period>, current: Period) -> Self {
        Self { config, closed, current }
    }

    /// Stored parts: `(config, closed periods, open period)`.
    pub fn parts(&self) -> (Option<DripConfig>, &[Period], Period) {
        (self.config, &self.closed, self.current)
    }

    /// Whether the ledger has a config (the drip is active).
    pub fn is_active(&self) -> bool {
        self.config.is_some()
    }

    /// Current config, if active.
    pub fn config(&self) -> Option<DripConfig> {
        self.config
    }

    /// Replace the config for periods opened from now on.
    ///
    /// The open period keeps the drip amount it was created with.
    pub fn set_config(&mut self, config: DripConfig) {
        self.config = Some(config);
    }

    /// Drop the config, freezing the open period.
    pub fn deactivate(&mut self) {
        self.config = None;
    }

    /// Re-activate: close the frozen period and open a new one ending at `end_time`.
    pub fn reactivate(&mut self, config: DripConfig, end_time: Timestamp) {
        self.closed.push(self.current);
        self.current = Period {
            total_volume: 0,
            drip_amount: config.drip_amount,
            end_time,
        };
        self.config = Some(config);
    }

    /// Index of the open period. Also the number of periods created.
    pub fn current_index(&self) -> PeriodIndex {
        self.closed.len() as PeriodIndex + 1
    }

    /// The open period.
    pub fn current(&self) -> &Period {
        &self.current
    }

    /// Period `index`, closed or open.
    ///
    /// # Errors
    ///
    /// - [`DripError::PeriodNotFound`] for `0` or an index beyond the open period
    pub fn period(&self, index: PeriodIndex) -> Result<&Period, DripError> {
        let current = self.current_index();
        if index == current {
            return Ok(&self.current);
        }
        if index == 0 || index > current {
            return Err(DripError::PeriodNotFound { index });
        }
        usize::try_from(index - 1)
            .ok()
            .and_then(|i| self.closed.get(i))
            .ok_or(DripError::PeriodNotFound { index })
    }

    /// Number of periods that must be opened for `timestamp` to fall inside
    /// the open period. Always `0` for a deactivated ledger.
    pub fn elapsed_periods(&self, timestamp: Timestamp) -> u64 {
        let Some(config) = self.config else {
            return 0;
        };
        if timestamp < self.current.end_time || config.period_seconds == 0 {
            return 0;
        }
        (timestamp - self.current.end_time) / config.period_seconds + 1
    }

    /// Index of the period open at `timestamp`.
    ///
    /// For a deactivated ledger the frozen period counts as closed once its
    /// end time is reached, so the result is one past the stored history.
    pub fn index_at(&self, timestamp: Timestamp) -> PeriodIndex {
        let current = self.current_index();
        if self.is_active() {
            current.saturating_add(self.elapsed_periods(timestamp))
        } else if timestamp >= self.current.end_time {
            current + 1
        } else {
            current
        }
    }

    /// Check that rolling forward to `timestamp` is within bounds.
    ///
    /// Returns the number of periods [`roll_forward`](Self::roll_forward)
    /// will create.
    pub fn plan_roll(&self, timestamp: Timestamp, max_periods: u64) -> Result<u64, DripError> {
        let elapsed = self.elapsed_periods(timestamp);
        if elapsed == 0 {
            return Ok(0);
        }
        if elapsed > max_periods {
            return Err(DripError::TooManyElapsedPeriods {
                elapsed,
                max: max_periods,
            });
        }
        let period_seconds = self.config.map(|c| c.period_seconds).unwrap_or(0);
        elapsed
            .checked_mul(period_seconds)
            .and_then(|span| self.current.end_time.checked_add(span))
            .ok_or(DripError::TimestampOverflow)?;
        Ok(elapsed)
    }

    /// Close the open period and open successors until `timestamp` falls
    /// inside the open period. Returns the number of periods opened.
    ///
    /// Each new period takes the current config's drip amount and starts
    /// with zero volume.
    pub fn roll_forward(&mut self, timestamp: Timestamp, max_periods: u64) -> Result<u64, DripError> {
        let elapsed = self.plan_roll(timestamp, max_periods)?;
        let Some(config) = self.config else {
            return Ok(0);
        };
        if elapsed > 0 {
            self.closed.reserve(usize::try_from(elapsed).unwrap_or(0));
        }
        for _ in 0..elapsed {
            let end_time = self.current.end_time + config.period_seconds;
            self.closed.push(self.current);
            self.current = Period {
                total_volume: 0,
                drip_amount: config.drip_amount,
                end_time,
            };
        }
        Ok(elapsed)
    }

    /// Add `amount` to the open period's total volume.
    pub fn record_volume(&mut self, amount: Amount) -> Result<(), DripError> {
        self.current.total_volume = self
            .current
            .total_volume
            .checked_add(amount)
            .ok_or(DripError::ArithmeticOverflow)?;
        Ok(())
    }
}
