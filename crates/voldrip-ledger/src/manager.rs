//! Single-owner drip manager implementing [`DripLedger`].
//!
//! Routes each call to the [`MeasureDrips`] of its measure token. Holds no
//! state beyond that map and the [`LedgerConfig`] bounds.

use std::collections::HashMap;

use tracing::warn;
use voldrip_core::error::{DripError, VoldripError};
use voldrip_core::traits::{DripLedger, DripSink};
use voldrip_core::types::{Address, Amount, DripConfig, ParticipantVolumeState, Period, PeriodIndex, Timestamp};

use crate::config::LedgerConfig;
use crate::measure::MeasureDrips;

/// Drip accounting for any number of measure tokens, owned by one caller.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DripManager {
    config: LedgerConfig,
    measures: HashMap<Address, MeasureDrips>,
}

impl DripManager {
    /// Create an empty manager with default bounds.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty manager with the given bounds.
    pub fn with_config(config: LedgerConfig) -> Self {
        Self {
            config,
            measures: HashMap::new(),
        }
    }

    /// Bounds applied to every call.
    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }

    /// State of `measure`, if any drip was ever activated for it.
    pub fn measure(&self, measure: &Address) -> Option<&MeasureDrips> {
        self.measures.get(measure)
    }

    /// Measure tokens with state, sorted.
    pub fn measures(&self) -> Vec<Address> {
        let mut measures: Vec<Address> = self.measures.keys().copied().collect();
        measures.sort();
        measures
    }

    pub(crate) fn from_measures(config: LedgerConfig, measures: Vec<MeasureDrips>) -> Self {
        Self {
            config,
            measures: measures.into_iter().map(|m| (m.measure(), m)).collect(),
        }
    }

    fn measure_mut(&mut self, measure: Address, drip: Address) -> Result<&mut MeasureDrips, DripError> {
        self.measures
            .get_mut(&measure)
            .ok_or(DripError::NotActive { measure, drip })
    }
}

impl DripLedger for DripManager {
    fn activate(
        &mut self,
        measure: Address,
        drip: Address,
        period_seconds: u64,
        drip_amount: Amount,
        end_time: Timestamp,
    ) -> Result<(), DripError> {
        let config = self.config;
        let state = self
            .measures
            .entry(measure)
            .or_insert_with(|| MeasureDrips::new(measure));
        let result = state.activate(&config, drip, period_seconds, drip_amount, end_time);
        if state.is_empty() {
            self.measures.remove(&measure);
        }
        result
    }

    fn deactivate(&mut self, measure: Address, drip: Address, prev_drip: Address) -> Result<(), DripError> {
        match self.measures.get_mut(&measure) {
            Some(state) => state.deactivate(drip, prev_drip),
            None if !drip.is_valid_drip() => Err(DripError::InvalidDripAddress(drip)),
            None => Err(DripError::InvalidPredecessor { prev: prev_drip, drip }),
        }
    }

    fn set(
        &mut self,
        measure: Address,
        drip: Address,
        period_seconds: u64,
        drip_amount: Amount,
    ) -> Result<(), DripError> {
        let config = self.config;
        self.measure_mut(measure, drip)?
            .set(&config, drip, period_seconds, drip_amount)
    }

    fn is_active(&self, measure: Address, drip: Address) -> bool {
        self.measures
            .get(&measure)
            .is_some_and(|state| state.is_active(&drip))
    }

    fn get_drip(&self, measure: Address, drip: Address) -> DripConfig {
        self.measures
            .get(&measure)
            .map(|state| state.get_drip(&drip))
            .unwrap_or_default()
    }

    fn get_period(&self, measure: Address, drip: Address, index: PeriodIndex) -> Result<Period, DripError> {
        self.measures
            .get(&measure)
            .ok_or(DripError::PeriodNotFound { index })?
            .get_period(&drip, index)
    }

    fn get_active_volume_drips(&self, measure: Address) -> Vec<Address> {
        self.measures
            .get(&measure)
            .map(MeasureDrips::active_drips)
            .unwrap_or_default()
    }

    fn accrue(
        &mut self,
        measure: Address,
        drip: Address,
        participant: Address,
        amount: Amount,
        timestamp: Timestamp,
    ) -> Result<Amount, DripError> {
        let config = self.config;
        self.measure_mut(measure, drip)?
            .accrue(&config, drip, participant, amount, timestamp)
    }

    fn settle(
        &mut self,
        measure: Address,
        drip: Address,
        participant: Address,
        timestamp: Timestamp,
    ) -> Result<Amount, DripError> {
        let config = self.config;
        self.measure_mut(measure, drip)?
            .settle(&config, drip, participant, timestamp)
    }

    fn balance_of(
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

    fn on_measure_minted(
        &mut self,
        measure: Address,
        participant: Address,
        amount: Amount,
        timestamp: Timestamp,
        sink: &mut dyn DripSink,
    ) -> Result<Vec<(Address, Amount)>, VoldripError> {
        let config = self.config;
        let Some(state) = self.measures.get_mut(&measure) else {
            return Ok(Vec::new());
        };
        let shares = state.accrue_all(&config, participant, amount, timestamp)?;
        if let Err((err, first_unpaid)) = pay_shares(sink, participant, &shares) {
            defer_unpaid(state, participant, &shares[first_unpaid..])?;
            return Err(err);
        }
        Ok(shares)
    }

    fn period_count(&self, measure: Address, drip: Address) -> PeriodIndex {
        self.measures
            .get(&measure)
            .map_or(0, |state| state.period_count(&drip))
    }

    fn participant_state(
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

/// Hand every non-zero share to `sink`, in order.
///
/// On failure returns the sink's error and the position of the first share
/// that was not delivered.
pub(crate) fn pay_shares(
    sink: &mut dyn DripSink,
    participant: Address,
    shares: &[(Address, Amount)],
) -> Result<(), (VoldripError, usize)> {
    for (i, (drip, share)) in shares.iter().enumerate() {
        if *share > 0 {
            sink.credit(*drip, participant, *share).map_err(|e| (e, i))?;
        }
    }
    Ok(())
}

/// Park shares the sink refused so `settle` and `balance_of` still report them.
pub(crate) fn defer_unpaid(
    state: &mut MeasureDrips,
    participant: Address,
    unpaid: &[(Address, Amount)],
) -> Result<(), VoldripError> {
    for (drip, share) in unpaid {
        state.defer(*drip, participant, *share)?;
        if *share > 0 {
            warn!(
                "drip payout deferred: measure={} drip={} participant={} amount={}",
                state.measure(),
                drip,
                participant,
                share
            );
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::MemoryDripSink;
    use voldrip_core::constants::WAD;

    fn addr(seed: u8) -> Address {
        Address::from_bytes([seed; 20])
    }

    const MEASURE: Address = Address([0xEE; 20]);

    #[test]
    fn activate_drip_token() {
        let mut m = DripManager::new();
        m.activate(MEASURE, addr(1), 10, 10 * WAD, 30).unwrap();
        assert!(m.is_active(MEASURE, addr(1)));
        assert_eq!(m.get_drip(MEASURE, addr(1)), DripConfig { period_seconds: 10, drip_amount: 10 * WAD });
        assert_eq!(
            m.get_period(MEASURE, addr(1), 1).unwrap(),
            Period { total_volume: 0, drip_amount: 10 * WAD, end_time: 30 }
        );
    }

    #[test]
    fn multiple_drips_listed_newest_first() {
        let mut m = DripManager::new();
        m.activate(MEASURE, addr(1), 10, 10 * WAD, 30).unwrap();
        m.activate(MEASURE, addr(2), 10, 10 * WAD, 30).unwrap();
        assert!(m.is_active(MEASURE, addr(1)));
        assert!(m.is_active(MEASURE, addr(2)));
        assert_eq!(m.get_active_volume_drips(MEASURE), vec![addr(2), addr(1)]);
    }

    #[test]
    fn failed_first_activation_leaves_no_measure() {
        let mut m = DripManager::new();
        assert!(m.activate(MEASURE, Address::ZERO, 10, WAD, 30).is_err());
        assert!(m.measures().is_empty());
    }

    #[test]
    fn drips_are_scoped_per_measure() {
        let mut m = DripManager::new();
        m.activate(MEASURE, addr(1), 10, WAD, 30).unwrap();
        assert!(!m.is_active(addr(0xDD), addr(1)));
        assert!(m.get_active_volume_drips(addr(0xDD)).is_empty());
        m.activate(addr(0xDD), addr(1), 10, WAD, 30).unwrap();
        assert_eq!(m.measures(), vec![addr(0xDD), MEASURE]);
    }

    #[test]
    fn deactivate_unknown_measure() {
        let mut m = DripManager::new();
        assert_eq!(
            m.deactivate(MEASURE, addr(1), Address::SENTINEL),
            Err(DripError::InvalidPredecessor { prev: Address::SENTINEL, drip: addr(1) })
        );
    }

    #[test]
    fn get_period_unknown_measure() {
        let m = DripManager::new();
        assert_eq!(
            m.get_period(MEASURE, addr(1), 1),
            Err(DripError::PeriodNotFound { index: 1 })
        );
        assert_eq!(m.get_drip(MEASURE, addr(1)), DripConfig::default());
        assert_eq!(m.period_count(MEASURE, addr(1)), 0);
    }

    #[test]
    fn mint_hook_pays_through_sink() {
        let mut m = DripManager::new();
        let mut sink = MemoryDripSink::new();
        m.activate(MEASURE, addr(1), 10, 10 * WAD, 30).unwrap();
        m.activate(MEASURE, addr(2), 10, 4 * WAD, 30).unwrap();

        m.on_measure_minted(MEASURE, addr(8), 3, 5, &mut sink).unwrap();
        m.on_measure_minted(MEASURE, addr(9), 1, 6, &mut sink).unwrap();
        assert_eq!(sink.total_paid(), 0);

        let shares = m.on_measure_minted(MEASURE, addr(8), 1, 31, &mut sink).unwrap();
        assert_eq!(shares, vec![(addr(2), 3 * WAD), (addr(1), 30 * WAD / 4)]);
        assert_eq!(sink.balance(&addr(1), &addr(8)), 30 * WAD / 4);
        assert_eq!(sink.balance(&addr(2), &addr(8)), 3 * WAD);
        assert_eq!(sink.balance(&addr(1), &addr(9)), 0);
    }

    /// Refuses every credit of `refused`; forwards the rest.
    struct RefusingSink {
        refused: Address,
        inner: MemoryDripSink,
    }

    impl DripSink for RefusingSink {
        fn credit(&mut self, drip: Address, participant: Address, amount: Amount) -> Result<(), VoldripError> {
            if drip == self.refused {
                return Err(VoldripError::Sink("transfer rejected".into()));
            }
            self.inner.credit(drip, participant, amount)
        }
    }

    #[test]
    fn refused_payout_stays_claimable() {
        let mut m = DripManager::new();
        let mut sink = MemoryDripSink::new();
        m.activate(MEASURE, addr(1), 10, 10 * WAD, 10).unwrap();
        m.on_measure_minted(MEASURE, addr(8), 5, 1, &mut sink).unwrap();
        assert_eq!(m.balance_of(MEASURE, addr(1), addr(8), 11).unwrap(), 10 * WAD);

        let mut refusing = RefusingSink { refused: addr(1), inner: MemoryDripSink::new() };
        let err = m.on_measure_minted(MEASURE, addr(8), 5, 11, &mut refusing).unwrap_err();
        assert!(matches!(&err, VoldripError::Sink(msg) if msg == "transfer rejected"), "{err}");
        assert_eq!(refusing.inner.total_paid(), 0);

        // The new volume is recorded and the old share is still owed.
        assert_eq!(m.get_period(MEASURE, addr(1), 2).unwrap().total_volume, 5);
        assert_eq!(m.balance_of(MEASURE, addr(1), addr(8), 11).unwrap(), 10 * WAD);
        assert_eq!(m.settle(MEASURE, addr(1), addr(8), 11).unwrap(), 10 * WAD);
        assert_eq!(m.balance_of(MEASURE, addr(1), addr(8), 11).unwrap(), 0);
    }

    #[test]
    fn partially_refused_mint_pays_rest_later() {
        let mut m = DripManager::new();
        let mut sink = MemoryDripSink::new();
        m.activate(MEASURE, addr(1), 10, 10 * WAD, 10).unwrap();
        m.activate(MEASURE, addr(2), 10, 4 * WAD, 10).unwrap();
        m.on_measure_minted(MEASURE, addr(8), 3, 1, &mut sink).unwrap();
        m.on_measure_minted(MEASURE, addr(9), 1, 2, &mut sink).unwrap();

        // Registry order is addr(2) then addr(1); only addr(1) is refused.
        let mut refusing = RefusingSink { refused: addr(1), inner: MemoryDripSink::new() };
        assert!(m.on_measure_minted(MEASURE, addr(8), 0, 11, &mut refusing).is_err());
        assert_eq!(refusing.inner.balance(&addr(2), &addr(8)), 3 * WAD);
        assert_eq!(m.balance_of(MEASURE, addr(2), addr(8), 11).unwrap(), 0);
        assert_eq!(m.balance_of(MEASURE, addr(1), addr(8), 11).unwrap(), 30 * WAD / 4);
        assert_eq!(m.measure(&MEASURE).unwrap().unpaid(&addr(1), &addr(8)), 30 * WAD / 4);

        let shares = m.on_measure_minted(MEASURE, addr(8), 0, 12, &mut sink).unwrap();
        assert_eq!(shares, vec![(addr(2), 0), (addr(1), 30 * WAD / 4)]);
        assert_eq!(sink.balance(&addr(1), &addr(8)), 30 * WAD / 4);
        assert_eq!(m.measure(&MEASURE).unwrap().unpaid(&addr(1), &addr(8)), 0);
    }

    #[test]
    fn unpaid_share_survives_snapshot() {
        let mut m = DripManager::new();
        m.activate(MEASURE, addr(1), 10, 10 * WAD, 10).unwrap();
        m.on_measure_minted(MEASURE, addr(8), 5, 1, &mut MemoryDripSink::new()).unwrap();
        let mut refusing = RefusingSink { refused: addr(1), inner: MemoryDripSink::new() };
        assert!(m.on_measure_minted(MEASURE, addr(8), 0, 11, &mut refusing).is_err());

        let restored = DripManager::restore(&m.snapshot().unwrap()).unwrap();
        assert_eq!(restored, m);
        assert_eq!(restored.balance_of(MEASURE, addr(1), addr(8), 11).unwrap(), 10 * WAD);
    }

    #[test]
    fn mint_hook_without_drips_is_noop() {
        let mut m = DripManager::new();
        let mut sink = MemoryDripSink::new();
        let shares = m.on_measure_minted(MEASURE, addr(8), 3, 5, &mut sink).unwrap();
        assert!(shares.is_empty());
    }

    #[test]
    fn participant_state_tracks_period() {
        let mut m = DripManager::new();
        m.activate(MEASURE, addr(1), 10, WAD, 30).unwrap();
        m.accrue(MEASURE, addr(1), addr(9), 4, 1).unwrap();
        m.accrue(MEASURE, addr(1), addr(9), 6, 41).unwrap();
        assert_eq!(
            m.participant_state(MEASURE, addr(1), addr(9)),
            Some(ParticipantVolumeState { last_period_index_credited: 3, volume_in_current_period: 6 })
        );
    }

    #[test]
    fn usable_as_trait_object() {
        let mut m = DripManager::new();
        let ledger: &mut dyn DripLedger = &mut m;
        ledger.activate(MEASURE, addr(1), 10, WAD, 30).unwrap();
        assert!(ledger.is_active(MEASURE, addr(1)));
    }
}
