//! # chaos-tests
//!
//! Fault-injection scenarios for the murmur sync layer.
//!
//! This crate drives a [`SyncFacade`](murmur_sync_client::SyncFacade) over
//! the mock transport and persistence while injecting faults:
//! - Connection drops, flapping and outages
//! - Lost, late and duplicated echoes
//! - Failing and slow durable writes
//! - Lost presence and typing signals
//!
//! All scenarios run on tokio's paused clock, so backoff and grace
//! windows elapse instantly.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod assertions;
pub mod harness;

pub mod scenarios;
