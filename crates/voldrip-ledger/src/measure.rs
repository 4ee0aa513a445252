//! All drip state owned by a single measure token.
//!
//! [`MeasureDrips`] bundles the measure's [`DripRegistry`], one
//! [`PeriodLedger`] per drip ever activated, and the participant
//! accumulators. Every operation runs in a fixed order: registry membership
//! check, period roll-forward, accumulator update. Mutating operations
//! validate everything before touching state, so a failed call leaves the
//! structure unchanged.
//!
//! Shares a payout sink refused are parked per (drip, participant) and
//! handed back by the next `accrue`, `settle` or mint for that pair.

use std::collections::HashMap;

use tracing::{debug, info};
use voldrip_core::error::DripError;
use voldrip_core::types::{Address, Amount, DripConfig, ParticipantVolumeState, Period, PeriodIndex, Timestamp};

use crate::accumulator::{self, Settlement};
use crate::config::LedgerConfig;
use crate::period::PeriodLedger;
use crate::registry::DripRegistry;

/// Validated accrual, ready to apply.
#[derive(Debug, Clone, Copy)]
struct AccruePlan {
    drip: Address,
    participant: Address,
    timestamp: Timestamp,
    rolls: u64,
    amount: Amount,
    settlement: Settlement,
}

/// Registry, period ledgers and accumulators for one measure token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MeasureDrips {
    measure: Address,
    registry: DripRegistry,
    /// Ledger per drip; kept after deactivation for history and settlement.
    ledgers: HashMap<Address, PeriodLedger>,
    /// Accumulator per (drip, participant).
    participants: HashMap<(Address, Address), ParticipantVolumeState>,
    /// Settled shares not yet delivered, per (drip, participant).
    unpaid: HashMap<(Address, Address), Amount>,
}

impl MeasureDrips {
    /// Empty state for `measure`.
    pub fn new(measure: Address) -> Self {
        Self {
            measure,
            registry: DripRegistry::new(),
            ledgers: HashMap::new(),
            participants: HashMap::new(),
            unpaid: HashMap::new(),
        }
    }

    /// Rebuild from stored parts. Callers are responsible for consistency.
    pub(crate) fn from_parts(
        measure: Address,
        registry: DripRegistry,
        ledgers: HashMap<Address, PeriodLedger>,
        participants: HashMap<(Address, Address), ParticipantVolumeState>,
        unpaid: HashMap<(Address, Address), Amount>,
    ) -> Self {
        Self {
            measure,
            registry,
            ledgers,
            participants,
            unpaid,
        }
    }

    /// The measure token this state belongs to.
    pub fn measure(&self) -> Address {
        self.measure
    }

    /// Active drip registry.
    pub fn registry(&self) -> &DripRegistry {
        &self.registry
    }

    /// Ledger of `drip`, active or not.
    pub fn ledger(&self, drip: &Address) -> Option<&PeriodLedger> {
        self.ledgers.get(drip)
    }

    /// All ledgers, in arbitrary order.
    pub fn ledgers(&self) -> impl Iterator<Item = (&Address, &PeriodLedger)> {
        self.ledgers.iter()
    }

    /// All accumulator entries as `((drip, participant), state)`, in arbitrary order.
    pub fn participants(&self) -> impl Iterator<Item = (&(Address, Address), &ParticipantVolumeState)> {
        self.participants.iter()
    }

    /// Whether nothing has ever been activated for this measure.
    pub fn is_empty(&self) -> bool {
        self.ledgers.is_empty()
    }

    // ------------------------------------------------------------------
    // Registry
    // ------------------------------------------------------------------

    /// Activate `drip`, opening a period that ends at `end_time`.
    ///
    /// A drip activated for the first time gets period 1. Re-activating a
    /// previously deactivated drip keeps its history and appends a period.
    pub fn activate(
        &mut self,
        config: &LedgerConfig,
        drip: Address,
        period_seconds: u64,
        drip_amount: Amount,
        end_time: Timestamp,
    ) -> Result<(), DripError> {
        if !drip.is_valid_drip() {
            return Err(DripError::InvalidDripAddress(drip));
        }
        if self.registry.contains(&drip) {
            return Err(DripError::AlreadyActive {
                measure: self.measure,
                drip,
            });
        }
        config.check_drip(period_seconds, drip_amount)?;

        let drip_config = DripConfig {
            period_seconds,
            drip_amount,
        };
        let index = match self.ledgers.get_mut(&drip) {
            Some(ledger) => {
                ledger.reactivate(drip_config, end_time);
                ledger.current_index()
            }
            None => {
                self.ledgers.insert(drip, PeriodLedger::new(drip_config, end_time));
                1
            }
        };
        self.registry.push(drip);

        info!(
            "drip activated: measure={} drip={} period_seconds={} drip_amount={} end_time={} period={}",
            self.measure, drip, period_seconds, drip_amount, end_time, index
        );
        Ok(())
    }

    /// Deactivate `drip` given its predecessor in the active list.
    ///
    /// The open period is frozen; history stays queryable and participants
    /// can still settle their volume in it.
    pub fn deactivate(&mut self, drip: Address, prev_drip: Address) -> Result<(), DripError> {
        if !drip.is_valid_drip() {
            return Err(DripError::InvalidDripAddress(drip));
        }
        if !self.registry.remove(&prev_drip, &drip) {
            return Err(DripError::InvalidPredecessor {
                prev: prev_drip,
                drip,
            });
        }
        if let Some(ledger) = self.ledgers.get_mut(&drip) {
            ledger.deactivate();
        }

        info!("drip deactivated: measure={} drip={}", self.measure, drip);
        Ok(())
    }

    /// Whether `drip` is active.
    pub fn is_active(&self, drip: &Address) -> bool {
        self.registry.contains(drip)
    }

    /// Active drips, most recently activated first.
    pub fn active_drips(&self) -> Vec<Address> {
        self.registry.iter().collect()
    }

    // ------------------------------------------------------------------
    // Period ledger
    // ------------------------------------------------------------------

    /// Replace the config of an active drip for periods opened from now on.
    pub fn set(
        &mut self,
        config: &LedgerConfig,
        drip: Address,
        period_seconds: u64,
        drip_amount: Amount,
    ) -> Result<(), DripError> {
        let measure = self.measure;
        let not_active = DripError::NotActive { measure, drip };
        if !self.registry.contains(&drip) {
            return Err(not_active);
        }
        config.check_drip(period_seconds, drip_amount)?;
        let ledger = self.ledgers.get_mut(&drip).ok_or(not_active)?;
        ledger.set_config(DripConfig {
            period_seconds,
            drip_amount,
        });

        info!(
            "drip updated: measure={} drip={} period_seconds={} drip_amount={}",
            measure, drip, period_seconds, drip_amount
        );
        Ok(())
    }

    /// Config of `drip`, zeroed when inactive.
    pub fn get_drip(&self, drip: &Address) -> DripConfig {
        self.ledgers
            .get(drip)
            .and_then(PeriodLedger::config)
            .unwrap_or_default()
    }

    /// Period `index` of `drip`.
    pub fn get_period(&self, drip: &Address, index: PeriodIndex) -> Result<Period, DripError> {
        self.ledgers
            .get(drip)
            .ok_or(DripError::PeriodNotFound { index })?
            .period(index)
            .copied()
    }

    /// Number of periods created for `drip`.
    pub fn period_count(&self, drip: &Address) -> PeriodIndex {
        self.ledgers.get(drip).map_or(0, PeriodLedger::current_index)
    }

    // ------------------------------------------------------------------
    // Accumulator
    // ------------------------------------------------------------------

    /// Accumulator entry of `participant` for `drip`.
    pub fn participant_state(&self, drip: &Address, participant: &Address) -> Option<ParticipantVolumeState> {
        self.participants.get(&(*drip, *participant)).copied()
    }

    /// Settled share of `drip` still owed to `participant` after a failed payout.
    pub fn unpaid(&self, drip: &Address, participant: &Address) -> Amount {
        self.unpaid.get(&(*drip, *participant)).copied().unwrap_or(0)
    }

    /// Park `amount` of `drip` for `participant` until it is next claimed.
    pub(crate) fn defer(&mut self, drip: Address, participant: Address, amount: Amount) -> Result<(), DripError> {
        if amount == 0 {
            return Ok(());
        }
        let owed = self
            .unpaid(&drip, &participant)
            .checked_add(amount)
            .ok_or(DripError::ArithmeticOverflow)?;
        self.unpaid.insert((drip, participant), owed);
        Ok(())
    }

    /// Settlement claimable plus anything parked for the pair.
    fn with_unpaid(&self, drip: &Address, participant: &Address, claimable: Amount) -> Result<Amount, DripError> {
        claimable
            .checked_add(self.unpaid(drip, participant))
            .ok_or(DripError::ArithmeticOverflow)
    }

    fn plan_accrue(
        &self,
        config: &LedgerConfig,
        drip: Address,
        participant: Address,
        amount: Amount,
        timestamp: Timestamp,
    ) -> Result<AccruePlan, DripError> {
        let not_active = DripError::NotActive {
            measure: self.measure,
            drip,
        };
        if !self.registry.contains(&drip) {
            return Err(not_active);
        }
        let ledger = self.ledgers.get(&drip).ok_or(not_active)?;
        config.check_amount(amount)?;

        let rolls = ledger.plan_roll(timestamp, config.max_periods_per_call)?;
        let open_total = if rolls > 0 { 0 } else { ledger.current().total_volume };
        let new_total = open_total
            .checked_add(amount)
            .ok_or(DripError::ArithmeticOverflow)?;
        config.check_amount(new_total)?;

        let open_index = ledger.current_index() + rolls;
        let state = self.participant_state(&drip, &participant).unwrap_or_default();
        let mut settlement = accumulator::accrue(state, ledger, open_index, amount)?;
        settlement.claimable = self.with_unpaid(&drip, &participant, settlement.claimable)?;

        Ok(AccruePlan {
            drip,
            participant,
            timestamp,
            rolls,
            amount,
            settlement,
        })
    }

    fn apply_accrue(&mut self, config: &LedgerConfig, plan: AccruePlan) -> Result<Amount, DripError> {
        let ledger = self.ledgers.get_mut(&plan.drip).ok_or(DripError::NotActive {
            measure: self.measure,
            drip: plan.drip,
        })?;
        ledger.roll_forward(plan.timestamp, config.max_periods_per_call)?;
        ledger.record_volume(plan.amount)?;
        let index = ledger.current_index();
        self.participants
            .insert((plan.drip, plan.participant), plan.settlement.state);
        self.unpaid.remove(&(plan.drip, plan.participant));

        if plan.rolls > 0 {
            debug!(
                "periods rolled: measure={} drip={} opened={} current={}",
                self.measure, plan.drip, plan.rolls, index
            );
        }
        debug!(
            "volume accrued: measure={} drip={} participant={} amount={} period={} claimable={}",
            self.measure, plan.drip, plan.participant, plan.amount, index, plan.settlement.claimable
        );
        Ok(plan.settlement.claimable)
    }

    /// Record `amount` of volume for `participant` in `drip` at `timestamp`.
    ///
    /// Returns the share settled from the participant's previous period.
    pub fn accrue(
        &mut self,
        config: &LedgerConfig,
        drip: Address,
        participant: Address,
        amount: Amount,
        timestamp: Timestamp,
    ) -> Result<Amount, DripError> {
        let plan = self.plan_accrue(config, drip, participant, amount, timestamp)?;
        self.apply_accrue(config, plan)
    }

    /// Accrue `amount` into every active drip, in registry order.
    ///
    /// All drips are validated before any is updated.
    pub fn accrue_all(
        &mut self,
        config: &LedgerConfig,
        participant: Address,
        amount: Amount,
        timestamp: Timestamp,
    ) -> Result<Vec<(Address, Amount)>, DripError> {
        let plans = self
            .registry
            .iter()
            .map(|drip| self.plan_accrue(config, drip, participant, amount, timestamp))
            .collect::<Result<Vec<_>, _>>()?;

        plans
            .into_iter()
            .map(|plan| Ok((plan.drip, self.apply_accrue(config, plan)?)))
            .collect()
    }

    /// Settle `participant`'s closed-period volume in `drip` at `timestamp`.
    ///
    /// Active drips roll forward first. Deactivated drips settle their
    /// frozen period once `timestamp` reaches its end time. A participant
    /// with no entry gets `0` and no entry is created.
    pub fn settle(
        &mut self,
        config: &LedgerConfig,
        drip: Address,
        participant: Address,
        timestamp: Timestamp,
    ) -> Result<Amount, DripError> {
        let measure = self.measure;
        let ledger = self
            .ledgers
            .get_mut(&drip)
            .ok_or(DripError::NotActive { measure, drip })?;

        let rolls = ledger.plan_roll(timestamp, config.max_periods_per_call)?;
        let open_index = ledger.index_at(timestamp);
        let Some(state) = self.participants.get(&(drip, participant)).copied() else {
            ledger.roll_forward(timestamp, config.max_periods_per_call)?;
            return Ok(0);
        };
        let settlement = accumulator::settle(state, ledger, open_index)?;
        let owed = self.unpaid.get(&(drip, participant)).copied().unwrap_or(0);
        let claimable = settlement
            .claimable
            .checked_add(owed)
            .ok_or(DripError::ArithmeticOverflow)?;

        ledger.roll_forward(timestamp, config.max_periods_per_call)?;
        self.participants.insert((drip, participant), settlement.state);
        self.unpaid.remove(&(drip, participant));

        debug!(
            "participant settled: measure={} drip={} participant={} opened={} claimable={}",
            measure, drip, participant, rolls, claimable
        );
        Ok(claimable)
    }

    /// The share [`settle`](Self::settle) would return at `timestamp`.
    pub fn balance_of(&self, drip: &Address, participant: &Address, timestamp: Timestamp) -> Result<Amount, DripError> {
        let ledger = self.ledgers.get(drip).ok_or(DripError::NotActive {
            measure: self.measure,
            drip: *drip,
        })?;
        let Some(state) = self.participant_state(drip, participant) else {
            return Ok(0);
        };
        let claimable = accumulator::settle(state, ledger, ledger.index_at(timestamp))?.claimable;
        self.with_unpaid(drip, participant, claimable)
    }
}
