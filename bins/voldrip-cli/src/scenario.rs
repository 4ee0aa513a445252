//! Scenario replay.
//!
//! A scenario is a JSON document holding a list of ledger operations. Each
//! operation is applied in order to a [`DripManager`] whose payouts go to a
//! [`MemoryDripSink`]; every step produces an [`Outcome`].
//!
//! ```json
//! {
//!   "start_time": 0,
//!   "ops": [
//!     { "op": "activate", "measure": "0xee..", "drip": "0x11..",
//!       "period_seconds": 60, "drip_amount": "1000000000000000000" },
//!     { "op": "mint", "measure": "0xee..", "participant": "0x01..",
//!       "amount": 5, "at": 10 },
//!     { "op": "advance", "seconds": 60 },
//!     { "op": "settle", "measure": "0xee..", "drip": "0x11..", "participant": "0x01.." }
//!   ]
//! }
//! ```
//!
//! Amounts may be JSON integers or decimal strings; strings are needed for
//! values above `u64::MAX`.

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use voldrip_core::error::{DripError, VoldripError};
use voldrip_core::traits::{DripLedger, DripSink};
use voldrip_core::types::{Address, Amount, DripConfig, ParticipantVolumeState, Period, PeriodIndex, Timestamp};
use voldrip_ledger::{DripManager, MemoryDripSink};

/// A token amount read from JSON.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(try_from = "AmountRepr")]
pub struct TokenAmount(pub Amount);

#[derive(Deserialize)]
#[serde(untagged)]
enum AmountRepr {
    Int(u64),
    Text(String),
}

impl TryFrom<AmountRepr> for TokenAmount {
    type Error = String;

    fn try_from(repr: AmountRepr) -> Result<Self, Self::Error> {
        match repr {
            AmountRepr::Int(n) => Ok(TokenAmount(Amount::from(n))),
            AmountRepr::Text(s) => s
                .trim()
                .parse::<Amount>()
                .map(TokenAmount)
                .map_err(|e| format!("invalid amount {s:?}: {e}")),
        }
    }
}

/// Scenario file contents.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Scenario {
    /// Initial clock. Defaults to the wall clock at replay time.
    #[serde(default)]
    pub start_time: Option<Timestamp>,
    pub ops: Vec<Op>,
}

impl Scenario {
    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }
}

/// One scenario step. Operations taking a timestamp accept an optional
/// `at`; when omitted the scenario clock is used.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Op {
    Activate {
        measure: Address,
        drip: Address,
        period_seconds: u64,
        drip_amount: TokenAmount,
        /// End of the first period. Defaults to clock + `period_seconds`.
        #[serde(default)]
        end_time: Option<Timestamp>,
    },
    Deactivate {
        measure: Address,
        drip: Address,
        /// Looked up in the registry when omitted.
        #[serde(default)]
        prev_drip: Option<Address>,
    },
    Set {
        measure: Address,
        drip: Address,
        period_seconds: u64,
        drip_amount: TokenAmount,
    },
    Accrue {
        measure: Address,
        drip: Address,
        participant: Address,
        amount: TokenAmount,
        #[serde(default)]
        at: Option<Timestamp>,
    },
    Mint {
        measure: Address,
        participant: Address,
        amount: TokenAmount,
        #[serde(default)]
        at: Option<Timestamp>,
    },
    Settle {
        measure: Address,
        drip: Address,
        participant: Address,
        #[serde(default)]
        at: Option<Timestamp>,
    },
    Query {
        measure: Address,
        #[serde(default)]
        drip: Option<Address>,
        #[serde(default)]
        participant: Option<Address>,
        #[serde(default)]
        at: Option<Timestamp>,
    },
    Advance {
        seconds: u64,
    },
}

impl Op {
    pub fn name(&self) -> &'static str {
        match self {
            Op::Activate { .. } => "activate",
            Op::Deactivate { .. } => "deactivate",
            Op::Set { .. } => "set",
            Op::Accrue { .. } => "accrue",
            Op::Mint { .. } => "mint",
            Op::Settle { .. } => "settle",
            Op::Query { .. } => "query",
            Op::Advance { .. } => "advance",
        }
    }
}

/// State of one drip as reported by a `query` step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DripReport {
    pub drip: Address,
    pub active: bool,
    pub config: DripConfig,
    pub period_count: PeriodIndex,
    pub current_period: Option<Period>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub participant: Option<ParticipantVolumeState>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub claimable: Option<Amount>,
}

/// Result payload of a successful step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum Detail {
    Clock { now: Timestamp },
    Share { share: Amount },
    Shares { shares: Vec<(Address, Amount)> },
    Query {
        active_drips: Vec<Address>,
        drips: Vec<DripReport>,
    },
    Done {},
}

/// Result of one step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Outcome {
    pub step: usize,
    pub op: &'static str,
    pub timestamp: Timestamp,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<Detail>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Outcome {
    pub fn is_rejected(&self) -> bool {
        self.error.is_some()
    }
}

/// Applies scenario steps to a ledger.
#[derive(Debug)]
pub struct Runner {
    ledger: DripManager,
    sink: MemoryDripSink,
    now: Timestamp,
}

impl Runner {
    pub fn new(ledger: DripManager, now: Timestamp) -> Self {
        Self {
            ledger,
            sink: MemoryDripSink::new(),
            now,
        }
    }

    pub fn ledger(&self) -> &DripManager {
        &self.ledger
    }

    pub fn sink(&self) -> &MemoryDripSink {
        &self.sink
    }

    pub fn now(&self) -> Timestamp {
        self.now
    }

    /// Replay every step. With `strict`, the first rejected step aborts the
    /// replay; otherwise rejections are reported and replay continues.
    pub fn run(&mut self, ops: &[Op], strict: bool) -> Result<Vec<Outcome>> {
        let mut outcomes = Vec::with_capacity(ops.len());
        for (step, op) in ops.iter().enumerate() {
            let outcome = self.apply(step, op);
            if let Some(error) = &outcome.error {
                warn!("step {} ({}) rejected: {}", step, outcome.op, error);
                if strict {
                    bail!("step {step} ({}) rejected: {error}", outcome.op);
                }
            }
            outcomes.push(outcome);
        }
        Ok(outcomes)
    }

    /// Apply a single step. Rejections are captured in the outcome and leave
    /// the ledger unchanged.
    pub fn apply(&mut self, step: usize, op: &Op) -> Outcome {
        let timestamp = match op {
            Op::Accrue { at, .. } | Op::Mint { at, .. } | Op::Settle { at, .. } | Op::Query { at, .. } => {
                at.unwrap_or(self.now)
            }
            _ => self.now,
        };
        let result = self.execute(op, timestamp);
        if result.is_ok() && timestamp > self.now {
            self.now = timestamp;
        }
        debug!("step {} ({}) at {}: ok={}", step, op.name(), timestamp, result.is_ok());

        let (detail, error) = match result {
            Ok(detail) => (Some(detail), None),
            Err(e) => (None, Some(e.to_string())),
        };
        Outcome {
            step,
            op: op.name(),
            timestamp,
            detail,
            error,
        }
    }

    fn execute(&mut self, op: &Op, timestamp: Timestamp) -> Result<Detail, VoldripError> {
        match op {
            Op::Activate {
                measure,
                drip,
                period_seconds,
                drip_amount,
                end_time,
            } => {
                let end_time = match end_time {
                    Some(t) => *t,
                    None => timestamp
                        .checked_add(*period_seconds)
                        .ok_or(DripError::TimestampOverflow)?,
                };
                self.ledger
                    .activate(*measure, *drip, *period_seconds, drip_amount.0, end_time)?;
                Ok(Detail::Done {})
            }
            Op::Deactivate {
                measure,
                drip,
                prev_drip,
            } => {
                let prev = prev_drip
                    .or_else(|| {
                        self.ledger
                            .measure(measure)
                            .and_then(|m| m.registry().predecessor(drip))
                    })
                    .unwrap_or(Address::SENTINEL);
                self.ledger.deactivate(*measure, *drip, prev)?;
                Ok(Detail::Done {})
            }
            Op::Set {
                measure,
                drip,
                period_seconds,
                drip_amount,
            } => {
                self.ledger
                    .set(*measure, *drip, *period_seconds, drip_amount.0)?;
                Ok(Detail::Done {})
            }
            Op::Accrue {
                measure,
                drip,
                participant,
                amount,
                ..
            } => {
                let share = self
                    .ledger
                    .accrue(*measure, *drip, *participant, amount.0, timestamp)?;
                self.pay(*drip, *participant, share)?;
                Ok(Detail::Share { share })
            }
            Op::Mint {
                measure,
                participant,
                amount,
                ..
            } => {
                let shares = self.ledger.on_measure_minted(
                    *measure,
                    *participant,
                    amount.0,
                    timestamp,
                    &mut self.sink,
                )?;
                Ok(Detail::Shares { shares })
            }
            Op::Settle {
                measure,
                drip,
                participant,
                ..
            } => {
                let share = self.ledger.settle(*measure, *drip, *participant, timestamp)?;
                self.pay(*drip, *participant, share)?;
                Ok(Detail::Share { share })
            }
            Op::Query {
                measure,
                drip,
                participant,
                ..
            } => {
                let active_drips = self.ledger.get_active_volume_drips(*measure);
                let targets = match drip {
                    Some(d) => vec![*d],
                    None => active_drips.clone(),
                };
                let drips = targets
                    .into_iter()
                    .map(|d| self.report(*measure, d, *participant, timestamp))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(Detail::Query { active_drips, drips })
            }
            Op::Advance { seconds } => {
                self.now = self
                    .now
                    .checked_add(*seconds)
                    .ok_or(DripError::TimestampOverflow)?;
                Ok(Detail::Clock { now: self.now })
            }
        }
    }

    fn report(
        &self,
        measure: Address,
        drip: Address,
        participant: Option<Address>,
        timestamp: Timestamp,
    ) -> Result<DripReport, VoldripError> {
        let period_count = self.ledger.period_count(measure, drip);
        let current_period = if period_count == 0 {
            None
        } else {
            Some(self.ledger.get_period(measure, drip, period_count)?)
        };
        let (state, claimable) = match participant {
            Some(p) if period_count > 0 => (
                self.ledger.participant_state(measure, drip, p),
                Some(self.ledger.balance_of(measure, drip, p, timestamp)?),
            ),
            _ => (None, None),
        };
        Ok(DripReport {
            drip,
            active: self.ledger.is_active(measure, drip),
            config: self.ledger.get_drip(measure, drip),
            period_count,
            current_period,
            participant: state,
            claimable,
        })
    }

    fn pay(&mut self, drip: Address, participant: Address, share: Amount) -> Result<(), VoldripError> {
        if share == 0 {
            return Ok(());
        }
        self.sink.credit(drip, participant, share)
    }
}
