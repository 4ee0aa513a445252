//! Error types for the Voldrip ledger.
use thiserror::Error;

use crate::types::Address;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DripError {
    #[error("drip {drip} already active for measure {measure}")] AlreadyActive { measure: Address, drip: Address },
    #[error("drip {drip} not active for measure {measure}")] NotActive { measure: Address, drip: Address },
    #[error("invalid predecessor {prev} for drip {drip}")] InvalidPredecessor { prev: Address, drip: Address },
    #[error("period not found: {index}")] PeriodNotFound { index: u64 },
    #[error("invalid drip address: {0}")] InvalidDripAddress(Address),
    #[error("period seconds must be non-zero")] ZeroPeriodSeconds,
    #[error("period too short: {got} < {min}")] PeriodTooShort { got: u64, min: u64 },
    #[error("amount too large: {got} > {max}")] AmountTooLarge { got: u128, max: u128 },
    #[error("too many elapsed periods: {elapsed} > {max}")] TooManyElapsedPeriods { elapsed: u64, max: u64 },
    #[error("period end time overflow")] TimestampOverflow,
    #[error("arithmetic overflow")] ArithmeticOverflow,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AddressError {
    #[error("invalid length: {0}")] InvalidLength(usize),
    #[error("invalid hex: {0}")] InvalidHex(String),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SnapshotError {
    #[error("bad magic bytes")] BadMagic,
    #[error("unsupported version: {0}")] UnsupportedVersion(u32),
    #[error("truncated snapshot")] Truncated,
    #[error("encode: {0}")] Encode(String),
    #[error("decode: {0}")] Decode(String),
    #[error("corrupt snapshot: {0}")] Corrupt(String),
    #[error("io: {0}")] Io(String),
}

#[derive(Error, Debug)]
pub enum VoldripError {
    #[error(transparent)] Drip(#[from] DripError),
    #[error(transparent)] Address(#[from] AddressError),
    #[error(transparent)] Snapshot(#[from] SnapshotError),
    #[error("drip sink: {0}")] Sink(String),
}
