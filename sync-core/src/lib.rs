//! # sync-core
//!
//! Pure logic for murmur real-time sync (no I/O, instant tests).
//!
//! This crate implements the state machines and bookkeeping behind the
//! messaging sync layer without any network or timer I/O, enabling fast
//! unit tests.
//!
//! ## Design Philosophy
//!
//! All modules in this crate are **pure** - they take input and produce output
//! without side effects. This enables:
//! - Instant unit tests (no mocks, no async)
//! - Deterministic behavior (same input → same output)
//! - Easy reasoning about state transitions
//!
//! Time-dependent operations take `now` as an argument. The actual I/O
//! (transport, persistence, timers) is performed by `sync-client`, which
//! interprets the actions produced here.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod presence;
pub mod reconcile;
pub mod state;
pub mod typing;

pub use presence::{typing_scope, PresenceTracker};
pub use reconcile::{DurableOutcome, MessageLog, ReceiveOutcome};
pub use state::{Action, ConnectionEvent, ConnectionState, Event, ReconnectPolicy};
pub use typing::{TypingDebounce, TypingSignal};
