//! Concurrent drip manager sharded by measure token.
//!
//! State for different measure tokens never interacts, so each measure's
//! [`MeasureDrips`] lives in its own `DashMap` entry. A call locks only the
//! shard holding its measure for the duration of the call, which keeps every
//! call atomic per measure while letting calls for other measures proceed
//! in parallel.

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use voldrip_core::error::{DripError, VoldripError};
use voldrip_core::traits::{DripLedger, DripSink};
use voldrip_core::types::{Address, Amount, DripConfig, ParticipantVolumeState, Period, PeriodIndex, Timestamp};

use crate::config::LedgerConfig;
use crate::manager::{defer_unpaid, pay_shares, DripManager};
use crate::measure::MeasureDrips;

/// Thread-safe drip manager. All methods take `&self`.
#[derive(Debug, Default)]
pub struct ShardedDripManager {
    config: LedgerConfig,
    measures: DashMap<Address, MeasureDrips>,
}

impl ShardedDripManager {
    /// Create an empty manager with default bounds.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty manager with the given bounds.
    pub fn with_config(config: LedgerConfig) -> Self {
        Self {
            config,
            measures: DashMap::new(),
        }
    }

    /// Bounds applied to every call.
    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }

    /// Measure tokens with any drip history, sorted.
    pub fn measures(&self) -> Vec<Address> {
        let mut out: Vec<Address> = self.measures.iter().map(|entry| *entry.key()).collect();
        out.sort();
        out
    }

    /// Copy the current state into a single-owner manager.
    ///
    /// Each measure is copied under its own shard lock; measures mutated
    /// concurrently may be captured at different points in time.
    pub fn to_manager(&self) -> DripManager {
        let measures = self.measures.iter().map(|entry| entry.value().clone()).collect();
        DripManager::from_measures(self.config, measures)
    }

    /// Take over the state of a single-owner manager.
    pub fn from_manager(manager: DripManager) -> Self {
        let config = *manager.config();
        let measures = DashMap::new();
        for measure in manager.measures() {
            if let Some(state) = manager.measure(&measure) {
                measures.insert(measure, state.clone());
            }
        }
        Self { config, measures }
    }

    /// See [`DripLedger::activate`].
    pub fn activate(
        &self,
        measure: Address,
        drip: Address,
        period_seconds: u64,
        drip_amount: Amount,
        end_time: Timestamp,
    ) -> Result<(), DripError> {
        match self.measures.entry(measure) {
            Entry::Occupied(mut entry) => {
                entry
                    .get_mut()
                    .activate(&self.config, drip, period_seconds, drip_amount, end_time)
            }
            Entry::Vacant(entry) => {
                let mut state = MeasureDrips::new(measure);
                state.activate(&self.config, drip, period_seconds, drip_amount, end_time)?;
                entry.insert(state);
                Ok(())
            }
        }
    }

    /// See [`DripLedger::deactivate`].
    pub fn deactivate(&self, measure: Address, drip: Address, prev_drip: Address) -> Result<(), DripError> {
        match self.measures.get_mut(&measure) {
            Some(mut state) => state.deactivate(drip, prev_drip),
            None if !drip.is_valid_drip() => Err(DripError::InvalidDripAddress(drip)),
            None => Err(DripError::InvalidPredecessor { prev: prev_drip, drip }),
        }
    }

    /// See [`DripLedger::set`].
    pub fn set(
        &self,
        measure: Address,
        drip: Address,
        period_seconds: u64,
        drip_amount: Amount,
    ) -> Result<(), DripError> {
        self.measures
            .get_mut(&measure)
            .ok_or(DripError::NotActive { measure, drip })?
            .set(&self.config, drip, period_seconds, drip_amount)
    }

    /// See [`DripLedger::is_active`].
    pub fn is_active(&self, measure: Address, drip: Address) -> bool {
        self.measures
            .get(&measure)
            .is_some_and(|state| state.is_active(&drip))
    }

    /// See [`DripLedger::get_drip`].
    pub fn get_drip(&self, measure: Address, drip: Address) -> DripConfig {
        self.measures
            .get(&measure)
            .map(|state| state.get_drip(&drip))
            .unwrap_or_default()
    }

    /// See [`DripLedger::get_period`].
    pub fn get_period(&self, measure: Address, drip: Address, index: PeriodIndex) -> Result<Period, DripError> {
        self.measures
            .get(&measure)
            .ok_or(DripError::PeriodNotFound { index })?
            .get_period(&drip, index)
    }

    /// See [`DripLedger::get_active_volume_drips`].
    pub fn get_active_volume_drips(&self, measure: Address) -> Vec<Address> {
        self.measures
            .get(&measure)
            .map(|state| state.active_drips())
            .unwrap_or_default()
    }

    /// See [`DripLedger::accrue`].
    pub fn accrue(
        &self,
        measure: Address,
        drip: Address,
        participant: Address,
        amount: Amount,
        timestamp: Timestamp,
    ) -> Result<Amount, DripError> {
        self.measures
            .get_mut(&measure)
            .ok_or(DripError::NotActive { measure, drip })?
            .accrue(&self.config, drip, participant, amount, timestamp)
    }

    /// See [`DripLedger::settle`].
    pub fn settle(
        &self,
        measure: Address,
        drip: Address,
        participant: Address,
        timestamp: Timestamp,
    ) -> Result<Amount, DripError> {
        self.measures
            .get_mut(&measure)
            .ok_or(DripError::NotActive { measure, drip })?
            .settle(&self.config, drip, participant, timestamp)
    }

    /// See [`DripLedger::balance_of`].
    pub fn balance_of(
        &self,
        measure: Address,
        drip: Address,
        participant: Address,
        timestamp: Timestamp,
    ) -> Result<Amount, DripError> {
        self.measures
            .get(&measure)
            .ok_or(DripError::NotActive { measure, drip })?
            .balance_of(&drip, &participant, timestamp)
    }

    /// See [`DripLedger::on_measure_minted`].
    ///
    /// The shard lock is released before the sink is called and re-taken
    /// only to park shares the sink refused.
    pub fn on_measure_minted(
        &self,
        measure: Address,
        participant: Address,
        amount: Amount,
        timestamp: Timestamp,
        sink: &mut dyn DripSink,
    ) -> Result<Vec<(Address, Amount)>, VoldripError> {
        let shares = match self.measures.get_mut(&measure) {
            Some(mut state) => state.accrue_all(&self.config, participant, amount, timestamp)?,
            None => Vec::new(),
        };
        if let Err((err, first_unpaid)) = pay_shares(sink, participant, &shares) {
            if let Some(mut state) = self.measures.get_mut(&measure) {
                defer_unpaid(&mut state, participant, &shares[first_unpaid..])?;
            }
            return Err(err);
        }
        Ok(shares)
    }

    /// See [`DripLedger::period_count`].
    pub fn period_count(&self, measure: Address, drip: Address) -> PeriodIndex {
        self.measures
            .get(&measure)
            .map_or(0, |state| state.period_count(&drip))
    }

    /// See [`DripLedger::participant_state`].
    pub fn participant_state(
        &self,
        measure: Address,
        drip: Address,
        participant: Address,
    ) -> Option<ParticipantVolumeState> {
        self.measures
            .get(&measure)?
            .participant_state(&drip, &participant)
    }
}

impl DripLedger for ShardedDripManager {
    fn activate(
        &mut self,
        measure: Address,
        drip: Address,
        period_seconds: u64,
        drip_amount: Amount,
        end_time: Timestamp,
    ) -> Result<(), DripError> {
        ShardedDripManager::activate(self, measure, drip, period_seconds, drip_amount, end_time)
    }

    fn deactivate(&mut self, measure: Address, drip: Address, prev_drip: Address) -> Result<(), DripError> {
        ShardedDripManager::deactivate(self, measure, drip, prev_drip)
    }

    fn set(
        &mut self,
        measure: Address,
        drip: Address,
        period_seconds: u64,
        drip_amount: Amount,
    ) -> Result<(), DripError> {
        ShardedDripManager::set(self, measure, drip, period_seconds, drip_amount)
    }

    fn is_active(&self, measure: Address, drip: Address) -> bool {
        ShardedDripManager::is_active(self, measure, drip)
    }

    fn get_drip(&self, measure: Address, drip: Address) -> DripConfig {
        ShardedDripManager::get_drip(self, measure, drip)
    }

    fn get_period(&self, measure: Address, drip: Address, index: PeriodIndex) -> Result<Period, DripError> {
        ShardedDripManager::get_period(self, measure, drip, index)
    }

    fn get_active_volume_drips(&self, measure: Address) -> Vec<Address> {
        ShardedDripManager::get_active_volume_drips(self, measure)
    }

    fn accrue(
        &mut self,
        measure: Address,
        drip: Address,
        participant: Address,
        amount: Amount,
        timestamp: Timestamp,
    ) -> Result<Amount, DripError> {
        ShardedDripManager::accrue(self, measure, drip, participant, amount, timestamp)
    }

    fn settle(
        &mut self,
        measure: Address,
        drip: Address,
        participant: Address,
        timestamp: Timestamp,
    ) -> Result<Amount, DripError> {
        ShardedDripManager::settle(self, measure, drip, participant, timestamp)
    }

    fn balance_of(
        &self,
        measure: Address,
        drip: Address,
        participant: Address,
        timestamp: Timestamp,
    ) -> Result<Amount, DripError> {
        ShardedDripManager::balance_of(self, measure, drip, participant, timestamp)
    }

    fn on_measure_minted(
        &mut self,
        measure: Address,
        participant: Address,
        amount: Amount,
        timestamp: Timestamp,
        sink: &mut dyn DripSink,
    ) -> Result<Vec<(Address, Amount)>, VoldripError> {
        ShardedDripManager::on_measure_minted(self, measure, participant, amount, timestamp, sink)
    }

    fn period_count(&self, measure: Address, drip: Address) -> PeriodIndex {
        ShardedDripManager::period_count(self, measure, drip)
    }

    fn participant_state(
        &self,
        measure: Address,
        drip: Address,
        participant: Address,
    ) -> Option<ParticipantVolumeState> {
        ShardedDripManager::participant_state(self, measure, drip, participant)
    }
}
