//! Per-participant volume accumulation and lazy settlement.
//!
//! A participant only ever holds volume in one period: the one recorded in
//! `last_period_index_credited`. When the ledger has moved past that period,
//! the volume is converted into a share of that period's drip amount and
//! the participant moves to the open period with zero volume. Intermediate
//! periods in which the participant had no volume contribute nothing.

use voldrip_core::error::DripError;
use voldrip_core::types::{Amount, ParticipantVolumeState, PeriodIndex};

use crate::period::PeriodLedger;
use crate::share::pro_rata_share;

/// Outcome of settling a participant against a ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Settlement {
    /// State after settlement.
    pub state: ParticipantVolumeState,
    /// Share converted from closed-period volume.
    pub claimable: Amount,
}

/// Settle `state` as of `open_index`, the index of the period open at the
/// settlement time.
///
/// Pure: neither the state nor the ledger is modified. If the participant's
/// period is behind `open_index`, that period is closed and its volume is
/// converted into a share; otherwise the state is returned unchanged.
pub fn settle(
    state: ParticipantVolumeState,
    ledger: &PeriodLedger,
    open_index: PeriodIndex,
) -> Result<Settlement, DripError> {
    if state.last_period_index_credited >= open_index {
        return Ok(Settlement { state, claimable: 0 });
    }

    let claimable = if state.volume_in_current_period == 0 {
        0
    } else {
        let period = ledger.period(state.last_period_index_credited)?;
        pro_rata_share(state.volume_in_current_period, period.total_volume, period.drip_amount)?
    };

    Ok(Settlement {
        state: ParticipantVolumeState {
            last_period_index_credited: open_index,
            volume_in_current_period: 0,
        },
        claimable,
    })
}

/// Settle as of `open_index`, then add `amount` to the open period.
pub fn accrue(
    state: ParticipantVolumeState,
    ledger: &PeriodLedger,
    open_index: PeriodIndex,
    amount: Amount,
) -> Result<Settlement, DripError> {
    let mut settled = settle(state, ledger, open_index)?;
    settled.state.volume_in_current_period = settled
        .state
        .volume_in_current_period
        .checked_add(amount)
        .ok_or(DripError::ArithmeticOverflow)?;
    Ok(settled)
}
