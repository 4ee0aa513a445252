//! Shared test helpers for E2E and integration tests.

use voldrip_core::constants::WAD;
use voldrip_core::types::{Address, Amount};

/// Simple address from a seed byte.
pub fn addr(seed: u8) -> Address {
    Address([seed; 20])
}

/// Whole tokens to base units.
pub fn to_wei(tokens: u128) -> Amount {
    tokens * WAD
}

/// The measure token used throughout the suites.
pub const MEASURE: Address = Address([0xEE; 20]);

/// Default period length used by the suites.
pub const PERIOD_SECONDS: u64 = 10;
