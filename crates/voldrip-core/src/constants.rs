//! Protocol constants. All token amounts are 18-decimal fixed-point integers.

/// One whole token (10^18 base units).
pub const WAD: u128 = 1_000_000_000_000_000_000;

/// Largest amount a ledger slot may hold (2^112 - 1).
///
/// Volumes, totals and drip amounts share the storage width of the
/// prize-pool ledger this engine is embedded in.
pub const MAX_AMOUNT: u128 = (1u128 << 112) - 1;

/// Raw bytes of the registry list terminator.
///
/// `0x0000000000000000000000000000000000000001`: non-zero so that
/// "end of list" and "no node" stay distinguishable.
pub const SENTINEL_BYTES: [u8; 20] = {
    let mut bytes = [0u8; 20];
    bytes[19] = 1;
    bytes
};

/// Default minimum period length in seconds.
pub const DEFAULT_MIN_PERIOD_SECONDS: u64 = 1;

/// Default cap on periods created by a single roll-forward.
pub const DEFAULT_MAX_PERIODS_PER_CALL: u64 = 1_000_000;

/// Magic bytes prefixed to every encoded ledger snapshot.
pub const SNAPSHOT_MAGIC: [u8; 4] = *b"VDRP";

/// Current snapshot format version.
pub const SNAPSHOT_VERSION: u32 = 1;
