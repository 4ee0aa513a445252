//! # voldrip-core
//! Foundation types and traits for the Voldrip drip ledger.

pub mod constants;
pub mod error;
pub mod traits;
pub mod types;
