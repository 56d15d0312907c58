//! Chaos test scenarios for the murmur sync layer.
//!
//! Organized by category:
//!
//! - `connection` - C-FLAP-*, C-OUT-*, C-CANCEL-* - Drops, outages, cancellation
//! - `delivery` - D-ECHO-*, D-DROP-*, D-BURST-*, D-FAIL-*, D-ORDER-* - Send reconciliation
//! - `presence` - P-TYPE-*, P-DISC-*, P-SNAP-* - Presence and typing signals
//!
//! | Module | Tests | Requirements |
//! |--------|-------|--------------|
//! | connection | 4 | MockTransport |
//! | delivery | 7 | MockTransport + MockPersistence |
//! | presence | 4 | MockTransport |

pub mod connection;
pub mod delivery;
pub mod presence;
