//! In-memory [`DripSink`] implementations.
//!
//! [`MemoryDripSink`] records paid shares per (drip, participant) and is
//! suitable for testing and scenario replay; production callers plug in
//! their token-transfer module instead. [`SharedSink`] wraps a
//! `parking_lot::Mutex` around any sink so threads feeding a
//! [`ShardedDripManager`](crate::ShardedDripManager) can share it.

use std::collections::BTreeMap;

use parking_lot::Mutex;
use voldrip_core::error::VoldripError;
use voldrip_core::traits::DripSink;
use voldrip_core::types::{Address, Amount};

/// Records every credited share. Never fails.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MemoryDripSink {
    balances: BTreeMap<(Address, Address), Amount>,
    credits: usize,
}

impl MemoryDripSink {
    /// Create an empty sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Total of `drip` paid to `participant`.
    pub fn balance(&self, drip: &Address, participant: &Address) -> Amount {
        self.balances
            .get(&(*drip, *participant))
            .copied()
            .unwrap_or(0)
    }

    /// Total paid across all drips and participants. Saturates at `Amount::MAX`.
    pub fn total_paid(&self) -> Amount {
        self.balances
            .values()
            .fold(0, |acc: Amount, amount| acc.saturating_add(*amount))
    }

    /// Total of `drip` paid to anyone. Saturates at `Amount::MAX`.
    pub fn total_paid_for(&self, drip: &Address) -> Amount {
        self.balances
            .iter()
            .filter(|((d, _), _)| d == drip)
            .fold(0, |acc: Amount, (_, amount)| acc.saturating_add(*amount))
    }

    /// Number of `credit` calls received.
    pub fn credit_count(&self) -> usize {
        self.credits
    }

    /// All balances as `((drip, participant), amount)`, sorted.
    pub fn balances(&self) -> impl Iterator<Item = (&(Address, Address), &Amount)> {
        self.balances.iter()
    }
}

impl DripSink for MemoryDripSink {
    fn credit(&mut self, drip: Address, participant: Address, amount: Amount) -> Result<(), VoldripError> {
        let balance = self.balances.entry((drip, participant)).or_insert(0);
        *balance = balance
            .checked_add(amount)
            .ok_or_else(|| VoldripError::Sink(format!("balance overflow for {participant}")))?;
        self.credits += 1;
        Ok(())
    }
}

/// A sink behind a shared lock. Each credit holds the lock for that call only.
#[derive(Debug, Clone, Copy)]
pub struct SharedSink<'a, S>(pub &'a Mutex<S>);

impl<S: DripSink> DripSink for SharedSink<'_, S> {
    fn credit(&mut self, drip: Address, participant: Address, amount: Amount) -> Result<(), VoldripError> {
        self.0.lock().credit(drip, participant, amount)
    }
}
