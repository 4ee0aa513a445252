//! # voldrip-ledger — Drip registry and period ledger.
//!
//! All calculations use integer arithmetic only for determinism.
//!
//! This crate implements volume-proportional drip accounting:
//! - **Registry**: a per-measure singly-linked list of active drips,
//!   terminated by a sentinel, with O(1) insert and predecessor-supplied unlink.
//! - **Period ledger**: fixed-length periods per (measure, drip), rolled
//!   forward lazily so that every elapsed period is represented.
//! - **Accumulator**: per-participant volume, settled on demand into a
//!   pro-rata share of the closed period's drip amount.
//! - **Managers**: [`DripManager`] for single-owner use and
//!   [`ShardedDripManager`] for concurrent access across measure tokens.

pub mod accumulator;
pub mod config;
pub mod manager;
pub mod measure;
pub mod period;
pub mod registry;
pub mod share;
pub mod sharded;
pub mod sink;
pub mod snapshot;

pub use config::LedgerConfig;
pub use manager::DripManager;
pub use measure::MeasureDrips;
pub use period::PeriodLedger;
pub use registry::DripRegistry;
pub use sharded::ShardedDripManager;
pub use sink::{MemoryDripSink, SharedSink};
pub use snapshot::LedgerSnapshot;
