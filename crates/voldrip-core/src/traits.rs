//! Trait interfaces for the Voldrip ledger.
//!
//! These traits define the contracts between the engine and its callers:
//! - [`DripLedger`] — the drip registry and period ledger (voldrip-ledger implements)
//! - [`DripSink`] — the token-transfer collaborator that pays out computed shares

use crate::error::{DripError, VoldripError};
use crate::types::{Address, Amount, DripConfig, ParticipantVolumeState, Period, PeriodIndex, Timestamp};

/// Volume-proportional drip accounting for any number of measure tokens.
///
/// Every mutating call either fully applies or fails with the prior state
/// untouched. Timestamps are supplied by the caller and must be
/// non-decreasing per (measure, drip).
pub trait DripLedger {
    /// Activate `drip` for `measure`, opening a period that ends at `end_time`.
    ///
    /// # Errors
    ///
    /// - [`DripError::AlreadyActive`] if the drip is already active
    /// - [`DripError::InvalidDripAddress`] for the zero address or the sentinel
    fn activate(
        &mut self,
        measure: Address,
        drip: Address,
        period_seconds: u64,
        drip_amount: Amount,
        end_time: Timestamp,
    ) -> Result<(), DripError>;

    /// Deactivate `drip`, given its immediate predecessor in the active list
    /// ([`Address::SENTINEL`] when `drip` is the head).
    ///
    /// # Errors
    ///
    /// - [`DripError::InvalidPredecessor`] if `prev_drip` does not point at `drip`
    fn deactivate(&mut self, measure: Address, drip: Address, prev_drip: Address) -> Result<(), DripError>;

    /// Replace the config used for periods opened from now on.
    ///
    /// # Errors
    ///
    /// - [`DripError::NotActive`] if the drip is not active
    fn set(
        &mut self,
        measure: Address,
        drip: Address,
        period_seconds: u64,
        drip_amount: Amount,
    ) -> Result<(), DripError>;

    /// Whether `drip` is active for `measure`.
    fn is_active(&self, measure: Address, drip: Address) -> bool;

    /// Current config, zeroed when inactive.
    fn get_drip(&self, measure: Address, drip: Address) -> DripConfig;

    /// Period `index` (1-based), closed or currently accruing.
    fn get_period(&self, measure: Address, drip: Address, index: PeriodIndex) -> Result<Period, DripError>;

    /// Active drips of `measure`, most recently activated first.
    fn get_active_volume_drips(&self, measure: Address) -> Vec<Address>;

    /// Record `amount` of volume for `participant` at `timestamp`.
    ///
    /// Returns the claimable share settled by this call.
    fn accrue(
        &mut self,
        measure: Address,
        drip: Address,
        participant: Address,
        amount: Amount,
        timestamp: Timestamp,
    ) -> Result<Amount, DripError>;

    /// Settle `participant`'s closed-period volume without adding any.
    fn settle(
        &mut self,
        measure: Address,
        drip: Address,
        participant: Address,
        timestamp: Timestamp,
    ) -> Result<Amount, DripError>;

    /// The share [`settle`](Self::settle) would return at `timestamp`, without mutating.
    fn balance_of(
        &self,
        measure: Address,
        drip: Address,
        participant: Address,
        timestamp: Timestamp,
    ) -> Result<Amount, DripError>;

    /// Accrue `amount` into every active drip of `measure` and pay each
    /// non-zero share through `sink`.
    ///
    /// The accrual is kept when the sink fails. The refused share and every
    /// share after it stay claimable through `settle` or the next accrual.
    ///
    /// Returns the `(drip, share)` pairs in registry order.
    fn on_measure_minted(
        &mut self,
        measure: Address,
        participant: Address,
        amount: Amount,
        timestamp: Timestamp,
        sink: &mut dyn DripSink,
    ) -> Result<Vec<(Address, Amount)>, VoldripError>;

    /// Number of periods created for (measure, drip). `0` if never activated.
    fn period_count(&self, measure: Address, drip: Address) -> PeriodIndex;

    /// A participant's accumulator entry, if one exists.
    fn participant_state(
        &self,
        measure: Address,
        drip: Address,
        participant: Address,
    ) -> Option<ParticipantVolumeState>;
}

/// Receiver of computed drip shares.
///
/// The ledger only computes amounts; implementations perform the actual
/// token transfer or mint.
pub trait DripSink {
    /// Pay `amount` of `drip` to `participant`.
    fn credit(&mut self, drip: Address, participant: Address, amount: Amount) -> Result<(), VoldripError>;
}
