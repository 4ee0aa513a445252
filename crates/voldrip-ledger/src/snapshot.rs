//! Ledger snapshots: the persisted state layout.
//!
//! A snapshot is `SNAPSHOT_MAGIC || version (u32 LE) || bincode(LedgerSnapshot)`
//! using bincode's standard config. Collections are sorted by address so the
//! same state always encodes to the same bytes. Restoring rebuilds every
//! registry through [`DripRegistry::push`] and re-checks the invariants that
//! tie registries, ledgers and accumulators together.

use std::collections::{HashMap, HashSet};
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::info;
use voldrip_core::constants::{SNAPSHOT_MAGIC, SNAPSHOT_VERSION};
use voldrip_core::error::SnapshotError;
use voldrip_core::types::{Address, Amount, DripConfig, ParticipantVolumeState, Period};

use crate::config::LedgerConfig;
use crate::manager::DripManager;
use crate::measure::MeasureDrips;
use crate::period::PeriodLedger;
use crate::registry::DripRegistry;

const HEADER_LEN: usize = 8;

/// Period history of one drip.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, bincode::Encode, bincode::Decode)]
pub struct DripLedgerSnapshot {
    pub drip: Address,
    /// `Some` iff the drip is active.
    pub config: Option<DripConfig>,
    pub closed: Vec<Period>,
    pub current: Period,
}

/// One accumulator entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, bincode::Encode, bincode::Decode)]
pub struct ParticipantSnapshot {
    pub drip: Address,
    pub participant: Address,
    pub state: ParticipantVolumeState,
    /// Settled share the payout sink has not yet accepted.
    #[serde(default)]
    pub unpaid: Amount,
}

/// All state of one measure token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, bincode::Encode, bincode::Decode)]
pub struct MeasureSnapshot {
    pub measure: Address,
    /// Registry order, head first.
    pub active_drips: Vec<Address>,
    pub ledgers: Vec<DripLedgerSnapshot>,
    pub participants: Vec<ParticipantSnapshot>,
}

/// Complete state of a [`DripManager`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, bincode::Encode, bincode::Decode)]
pub struct LedgerSnapshot {
    pub config: LedgerConfig,
    pub measures: Vec<MeasureSnapshot>,
}

fn capture_measure(state: &MeasureDrips) -> MeasureSnapshot {
    let mut ledgers: Vec<DripLedgerSnapshot> = state
        .ledgers()
        .map(|(drip, ledger)| {
            let (config, closed, current) = ledger.parts();
            DripLedgerSnapshot {
                drip: *drip,
                config,
                closed: closed.to_vec(),
                current,
            }
        })
        .collect();
    ledgers.sort_by_key(|l| l.drip);

    let mut participants: Vec<ParticipantSnapshot> = state
        .participants()
        .map(|((drip, participant), s)| ParticipantSnapshot {
            drip: *drip,
            participant: *participant,
            state: *s,
            unpaid: state.unpaid(drip, participant),
        })
        .collect();
    participants.sort_by_key(|p| (p.drip, p.participant));

    MeasureSnapshot {
        measure: state.measure(),
        active_drips: state.active_drips(),
        ledgers,
        participants,
    }
}

fn corrupt(msg: String) -> SnapshotError {
    SnapshotError::Corrupt(msg)
}

fn restore_measure(snap: MeasureSnapshot) -> Result<MeasureDrips, SnapshotError> {
    let measure = snap.measure;
    if snap.ledgers.is_empty() {
        return Err(corrupt(format!("measure {measure} has no ledgers")));
    }

    let mut registry = DripRegistry::new();
    for drip in snap.active_drips.iter().rev() {
        if !registry.push(*drip) {
            return Err(corrupt(format!("measure {measure}: bad registry node {drip}")));
        }
    }

    let mut ledgers = HashMap::with_capacity(snap.ledgers.len());
    for entry in snap.ledgers {
        let drip = entry.drip;
        if !drip.is_valid_drip() {
            return Err(corrupt(format!("measure {measure}: invalid drip {drip}")));
        }
        if entry.config.is_some() != registry.contains(&drip) {
            return Err(corrupt(format!("measure {measure}: config/registry mismatch for {drip}")));
        }
        if entry.config.is_some_and(|c| c.period_seconds == 0) {
            return Err(corrupt(format!("measure {measure}: zero period for {drip}")));
        }
        let ledger = PeriodLedger::from_parts(entry.config, entry.closed, entry.current);
        if ledgers.insert(drip, ledger).is_some() {
            return Err(corrupt(format!("measure {measure}: duplicate ledger {drip}")));
        }
    }
    if let Some(orphan) = registry.iter().find(|drip| !ledgers.contains_key(drip)) {
        return Err(corrupt(format!("measure {measure}: active drip {orphan} has no ledger")));
    }

    let mut participants = HashMap::with_capacity(snap.participants.len());
    let mut unpaid = HashMap::new();
    for entry in snap.participants {
        let key = (entry.drip, entry.participant);
        let ledger = ledgers
            .get(&entry.drip)
            .ok_or_else(|| corrupt(format!("measure {measure}: participant of unknown drip {}", entry.drip)))?;
        check_participant(ledger, &entry.state)
            .map_err(|why| corrupt(format!("measure {measure}: participant {}: {why}", entry.participant)))?;
        if participants.insert(key, entry.state).is_some() {
            return Err(corrupt(format!("measure {measure}: duplicate participant {}", entry.participant)));
        }
        if entry.unpaid > 0 {
            unpaid.insert(key, entry.unpaid);
        }
    }

    Ok(MeasureDrips::from_parts(measure, registry, ledgers, participants, unpaid))
}

/// A participant's period must exist (or be the one following a frozen
/// ledger) and hold no more volume than the period's total.
fn check_participant(ledger: &PeriodLedger, state: &ParticipantVolumeState) -> Result<(), &'static str> {
    let index = state.last_period_index_credited;
    let volume = state.volume_in_current_period;
    match ledger.period(index) {
        Ok(period) if volume > period.total_volume => Err("volume exceeds period total"),
        Ok(_) => Ok(()),
        Err(_) if index == ledger.current_index() + 1 && !ledger.is_active() && volume == 0 => Ok(()),
        Err(_) if index == 0 && volume == 0 => Ok(()),
        Err(_) => Err("period out of range"),
    }
}

impl LedgerSnapshot {
    /// Capture the state of `manager`.
    pub fn capture(manager: &DripManager) -> Self {
        let measures = manager
            .measures()
            .iter()
            .filter_map(|m| manager.measure(m))
            .map(capture_measure)
            .collect();
        Self {
            config: *manager.config(),
            measures,
        }
    }

    /// Encode with header.
    pub fn encode(&self) -> Result<Vec<u8>, SnapshotError> {
        let body = bincode::encode_to_vec(self, bincode::config::standard())
            .map_err(|e| SnapshotError::Encode(e.to_string()))?;
        let mut out = Vec::with_capacity(HEADER_LEN + body.len());
        out.extend_from_slice(&SNAPSHOT_MAGIC);
        out.extend_from_slice(&SNAPSHOT_VERSION.to_le_bytes());
        out.extend_from_slice(&body);
        Ok(out)
    }

    /// Decode bytes produced by [`encode`](Self::encode).
    pub fn decode(bytes: &[u8]) -> Result<Self, SnapshotError> {
        if bytes.len() < HEADER_LEN {
            return Err(SnapshotError::Truncated);
        }
        let (header, body) = bytes.split_at(HEADER_LEN);
        if header[..4] != SNAPSHOT_MAGIC {
            return Err(SnapshotError::BadMagic);
        }
        let version = u32::from_le_bytes([header[4], header[5], header[6], header[7]]);
        if version != SNAPSHOT_VERSION {
            return Err(SnapshotError::UnsupportedVersion(version));
        }
        let (snapshot, read) = bincode::decode_from_slice::<Self, _>(body, bincode::config::standard())
            .map_err(|e| SnapshotError::Decode(e.to_string()))?;
        if read != body.len() {
            return Err(SnapshotError::Decode(format!(
                "{} trailing bytes",
                body.len() - read
            )));
        }
        Ok(snapshot)
    }

    /// Rebuild a manager, validating every invariant.
    pub fn into_manager(self) -> Result<DripManager, SnapshotError> {
        let mut seen = HashSet::new();
        let mut measures = Vec::with_capacity(self.measures.len());
        for snap in self.measures {
            if !seen.insert(snap.measure) {
                return Err(corrupt(format!("duplicate measure {}", snap.measure)));
            }
            measures.push(restore_measure(snap)?);
        }
        Ok(DripManager::from_measures(self.config, measures))
    }
}

impl DripManager {
    /// Encode the full state.
    pub fn snapshot(&self) -> Result<Vec<u8>, SnapshotError> {
        LedgerSnapshot::capture(self).encode()
    }

    /// Rebuild a manager from [`snapshot`](Self::snapshot) bytes.
    pub fn restore(bytes: &[u8]) -> Result<Self, SnapshotError> {
        let manager = LedgerSnapshot::decode(bytes)?.into_manager()?;
        info!("snapshot restored: measures={}", manager.measures().len());
        Ok(manager)
    }

    /// Write a snapshot to `path`.
    pub fn save_to_file(&self, path: &Path) -> Result<(), SnapshotError> {
        let bytes = self.snapshot()?;
        std::fs::write(path, &bytes).map_err(|e| SnapshotError::Io(e.to_string()))?;
        info!("snapshot saved: path={} bytes={}", path.display(), bytes.len());
        Ok(())
    }

    /// Read a snapshot from `path`.
    pub fn load_from_file(path: &Path) -> Result<Self, SnapshotError> {
        let bytes = std::fs::read(path).map_err(|e| SnapshotError::Io(e.to_string()))?;
        Self::restore(&bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use voldrip_core::constants::WAD;
    use voldrip_core::traits::DripLedger;

    fn addr(seed: u8) -> Address {
        Address::from_bytes([seed; 20])
    }

    fn populated() -> DripManager {
        let mut m = DripManager::new();
        let measure = addr(0xEE);
        m.activate(measure, addr(1), 10, 10 * WAD, 30).unwrap();
        m.activate(measure, addr(2), 20, 5 * WAD, 40).unwrap();
        m.activate(addr(0xDD), addr(1), 7, WAD, 7).unwrap();
        m.accrue(measure, addr(1), addr(8), 4, 1).unwrap();
        m.accrue(measure, addr(1), addr(9), 6, 2).unwrap();
        m.accrue(measure, addr(2), addr(9), 6, 55).unwrap();
        m.deactivate(measure, addr(2), Address::SENTINEL).unwrap();
        m.settle(measure, addr(2), addr(9), 60).unwrap();
        m
    }

    #[test]
    fn roundtrip_preserves_state() {
        let m = populated();
        let restored = DripManager::restore(&m.snapshot().unwrap()).unwrap();
        assert_eq!(restored, m);
    }

    #[test]
    fn encoding_is_deterministic() {
        let m = populated();
        assert_eq!(m.snapshot().unwrap(), m.clone().snapshot().unwrap());
    }

    #[test]
    fn restored_manager_continues_accounting() {
        let mut m = populated();
        let mut restored = DripManager::restore(&m.snapshot().unwrap()).unwrap();
        let a = m.accrue(addr(0xEE), addr(1), addr(8), 1, 45).unwrap();
        let b = restored.accrue(addr(0xEE), addr(1), addr(8), 1, 45).unwrap();
        assert_eq!(a, 4 * WAD);
        assert_eq!(a, b);
    }

    #[test]
    fn rejects_bad_magic() {
        let mut bytes = populated().snapshot().unwrap();
        bytes[0] = b'X';
        assert_eq!(DripManager::restore(&bytes), Err(SnapshotError::BadMagic));
    }

    #[test]
    fn rejects_future_version() {
        let mut bytes = populated().snapshot().unwrap();
        bytes[4..8].copy_from_slice(&99u32.to_le_bytes());
        assert_eq!(DripManager::restore(&bytes), Err(SnapshotError::UnsupportedVersion(99)));
    }

    #[test]
    fn rejects_truncated() {
        assert_eq!(DripManager::restore(b"VDR"), Err(SnapshotError::Truncated));
        let bytes = populated().snapshot().unwrap();
        assert!(matches!(
            DripManager::restore(&bytes[..bytes.len() - 3]),
            Err(SnapshotError::Decode(_))
        ));
    }

    #[test]
    fn rejects_duplicate_registry_node() {
        let mut snap = LedgerSnapshot::capture(&populated());
        let first = snap.measures[0].active_drips[0];
        snap.measures[0].active_drips.push(first);
        assert!(matches!(snap.into_manager(), Err(SnapshotError::Corrupt(_))));
    }

    #[test]
    fn rejects_config_without_registry_node() {
        let mut snap = LedgerSnapshot::capture(&populated());
        snap.measures[0].active_drips.clear();
        assert!(matches!(snap.into_manager(), Err(SnapshotError::Corrupt(_))));
    }

    #[test]
    fn rejects_inflated_participant_volume() {
        let mut snap = LedgerSnapshot::capture(&populated());
        let measure = snap
            .measures
            .iter_mut()
            .find(|m| m.measure == addr(0xEE))
            .unwrap();
        measure.participants[0].state.volume_in_current_period = u128::MAX;
        assert!(matches!(snap.into_manager(), Err(SnapshotError::Corrupt(_))));
    }

    #[test]
    fn file_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ledger.snap");
        let m = populated();
        m.save_to_file(&path).unwrap();
        assert_eq!(DripManager::load_from_file(&path).unwrap(), m);
    }

    #[test]
    fn missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            DripManager::load_from_file(&dir.path().join("absent")),
            Err(SnapshotError::Io(_))
        ));
    }
}
