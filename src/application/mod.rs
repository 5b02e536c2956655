//! Application layer containing the payment orchestration.
//!
//! `ReconciliationEngine` owns the transaction state machine and is the only
//! entry point for initiating, resolving, cancelling and sweeping payments.
//! Reporting and the periodic sweep are built on top of it.

pub mod engine;
pub mod report;
pub mod scheduler;
