//! Adversarial test suite for Voldrip.
//!
//! This crate contains integration tests that drive the drip ledger through
//! its public contract and check the accounting invariants under randomized
//! and edge-case inputs.

pub mod helpers;
