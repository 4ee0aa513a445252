//! Core ledger types: token addresses, drip configs, periods, participant state.
//!
//! All token amounts are 18-decimal fixed-point integers held in `u128`.
//! Timestamps are Unix seconds supplied by the caller.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::constants::SENTINEL_BYTES;
use crate::error::AddressError;

/// Token quantity in base units (18 decimals).
pub type Amount = u128;

/// Unix timestamp in seconds.
pub type Timestamp = u64;

/// 1-based period index. `0` means "no period".
pub type PeriodIndex = u64;

/// A 20-byte account or token address.
///
/// Identifies measure tokens, drip tokens and participants alike.
/// Serialized as a `0x`-prefixed hex string in human-readable formats.
#[derive(
    Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Default,
    bincode::Encode, bincode::Decode,
)]
#[serde(try_from = "String", into = "String")]
pub struct Address(pub [u8; 20]);

impl Address {
    /// The zero address. Never a valid drip.
    pub const ZERO: Self = Self([0u8; 20]);

    /// Registry list terminator. Never a valid drip.
    pub const SENTINEL: Self = Self(SENTINEL_BYTES);

    /// Create an address from raw bytes.
    pub fn from_bytes(bytes: [u8; 20]) -> Self {
        Self(bytes)
    }

    /// Return the underlying bytes.
    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }

    /// Check if this is the zero address.
    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 20]
    }

    /// Check if this is the registry sentinel.
    pub fn is_sentinel(&self) -> bool {
        self.0 == SENTINEL_BYTES
    }

    /// Whether the address may be stored as a registry node.
    pub fn is_valid_drip(&self) -> bool {
        !self.is_zero() && !self.is_sentinel()
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl FromStr for Address {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let digits = s
            .strip_prefix("0x")
            .or_else(|| s.strip_prefix("0X"))
            .unwrap_or(s);
        let bytes = hex::decode(digits).map_err(|e| AddressError::InvalidHex(e.to_string()))?;
        let bytes: [u8; 20] = bytes
            .try_into()
            .map_err(|v: Vec<u8>| AddressError::InvalidLength(v.len()))?;
        Ok(Self(bytes))
    }
}

impl TryFrom<String> for Address {
    type Error = AddressError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<Address> for String {
    fn from(addr: Address) -> Self {
        addr.to_string()
    }
}

impl From<[u8; 20]> for Address {
    fn from(bytes: [u8; 20]) -> Self {
        Self(bytes)
    }
}

impl AsRef<[u8]> for Address {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

/// Drip configuration applied to periods opened from now on.
#[derive(
    Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Default,
    bincode::Encode, bincode::Decode,
)]
pub struct DripConfig {
    /// Length of each period in seconds.
    pub period_seconds: u64,
    /// Amount distributed per period.
    pub drip_amount: Amount,
}

/// One accounting window of a (measure, drip) ledger.
///
/// `drip_amount` is captured when the period opens; later config changes
/// never alter it. `total_volume` grows while the period is open.
#[derive(
    Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Default,
    bincode::Encode, bincode::Decode,
)]
pub struct Period {
    /// Measured volume recorded in this period.
    pub total_volume: Amount,
    /// Amount distributable for this period.
    pub drip_amount: Amount,
    /// First timestamp at which the period counts as over.
    pub end_time: Timestamp,
}

/// A participant's position in a (measure, drip) ledger.
///
/// `volume_in_current_period` always belongs to period
/// `last_period_index_credited`; every earlier period has been settled.
#[derive(
    Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Default,
    bincode::Encode, bincode::Decode,
)]
pub struct ParticipantVolumeState {
    /// Period the recorded volume belongs to. `0` for a fresh participant.
    pub last_period_index_credited: PeriodIndex,
    /// Volume contributed within that period.
    pub volume_in_current_period: Amount,
}
