//! Omniscan - debounced media library health scanner
//!
//! This library crate exposes the core functionality for integration testing.

pub mod arr;
pub mod coalesce;
pub mod config;
pub mod ledger;
pub mod metrics;
pub mod normalize;
pub mod notifications;
pub mod queue;
pub mod report;
pub mod scheduler;
pub mod server;
pub mod state;
pub mod verify;
pub mod watch;
