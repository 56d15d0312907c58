//! Connection state machine for murmur.
//!
//! This module provides a pure, side-effect-free state machine for managing
//! the event connection lifecycle. The state machine takes events as input
//! and produces a new state plus a list of actions to execute.
//!
//! The actual I/O (opening the transport, sleeping between attempts) is
//! performed by sync-client, not by this module. This enables instant unit
//! testing without network mocks.

use murmur_sync_types::SyncError;
use std::time::Duration;

/// Connection state machine - NO I/O, just state transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    /// No transport.
    Disconnected,
    /// Initial handshake in progress; no automatic retry.
    Connecting,
    /// Transport open and authenticated.
    Connected,
    /// Connection dropped after a successful connect; retrying with backoff.
    Reconnecting {
        /// The reconnection attempt currently scheduled or in progress (1-based).
        attempt: u32,
    },
    /// The initial handshake failed or reconnection gave up.
    Failed,
}

impl ConnectionState {
    /// Create a new state machine in the Disconnected state.
    pub fn new() -> Self {
        Self::Disconnected
    }

    /// Process an event and return the new state plus actions to execute.
    ///
    /// This is a pure function - no side effects. The caller (sync-client)
    /// is responsible for executing the returned actions.
    pub fn on_event(self, event: Event, policy: &ReconnectPolicy) -> (Self, Vec<Action>) {
        match (self, event) {
            // From Disconnected / Failed
            (Self::Disconnected | Self::Failed, Event::ConnectRequested) => {
                (Self::Connecting, vec![Action::OpenTransport])
            }

            // From Connecting
            (Self::Connecting, Event::ConnectSucceeded) => (
                Self::Connected,
                vec![Action::EmitEvent(ConnectionEvent::Connected)],
            ),
            (Self::Connecting, Event::ConnectFailed { error }) => (
                Self::Failed,
                vec![
                    Action::CloseTransport,
                    Action::EmitEvent(ConnectionEvent::ConnectionFailed { error }),
                ],
            ),

            // From Connected
            (Self::Connected, Event::ConnectionLost { reason }) => {
                if policy.max_attempts == 0 {
                    return (
                        Self::Failed,
                        vec![
                            Action::CloseTransport,
                            Action::EmitEvent(ConnectionEvent::ConnectionLost { reason }),
                            Action::EmitEvent(ConnectionEvent::ReconnectExhausted { attempts: 0 }),
                        ],
                    );
                }
                (
                    Self::Reconnecting { attempt: 1 },
                    vec![
                        Action::CloseTransport,
                        Action::EmitEvent(ConnectionEvent::ConnectionLost { reason }),
                        Action::StartReconnectTimer {
                            delay: policy.delay_for(1),
                        },
                    ],
                )
            }

            // From Reconnecting
            (Self::Reconnecting { attempt }, Event::ReconnectTimer) => {
                (Self::Reconnecting { attempt }, vec![Action::OpenTransport])
            }
            (Self::Reconnecting { attempt }, Event::ConnectSucceeded) => (
                Self::Connected,
                vec![Action::EmitEvent(ConnectionEvent::Reconnected { attempts: attempt })],
            ),
            (Self::Reconnecting { attempt }, Event::ConnectFailed { error }) => {
                if attempt >= policy.max_attempts {
                    return (
                        Self::Failed,
                        vec![
                            Action::CloseTransport,
                            Action::EmitEvent(ConnectionEvent::ReconnectFailed { attempt, error }),
                            Action::EmitEvent(ConnectionEvent::ReconnectExhausted { attempts: attempt }),
                        ],
                    );
                }
                let next_attempt = attempt.saturating_add(1);
                (
                    Self::Reconnecting {
                        attempt: next_attempt,
                    },
                    vec![
                        Action::CloseTransport,
                        Action::EmitEvent(ConnectionEvent::ReconnectFailed { attempt, error }),
                        Action::StartReconnectTimer {
                            delay: policy.delay_for(next_attempt),
                        },
                    ],
                )
            }

            // Disconnect is always honoured and idempotent
            (Self::Disconnected, Event::DisconnectRequested) => (Self::Disconnected, vec![]),
            (state, Event::DisconnectRequested) => {
                let mut actions = Vec::with_capacity(3);
                if state.is_connecting() {
                    actions.push(Action::CancelReconnect);
                }
                actions.push(Action::CloseTransport);
                actions.push(Action::EmitEvent(ConnectionEvent::Disconnected));
                (Self::Disconnected, actions)
            }

            // Invalid transitions - stay in current state
            (state, _) => (state, vec![]),
        }
    }

    /// Check if currently connected.
    pub fn is_connected(&self) -> bool {
        matches!(self, Self::Connected)
    }

    /// Check if currently trying to connect.
    pub fn is_connecting(&self) -> bool {
        matches!(self, Self::Connecting | Self::Reconnecting { .. })
    }
}

impl Default for ConnectionState {
    fn default() -> Self {
        Self::new()
    }
}

/// Events that can occur in the connection lifecycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// Caller requested a connection.
    ConnectRequested,
    /// The transport reported an authenticated connection.
    ConnectSucceeded,
    /// Opening the transport failed or timed out.
    ConnectFailed {
        /// Classified failure.
        error: SyncError,
    },
    /// The live transport dropped.
    ConnectionLost {
        /// Reason for the drop.
        reason: String,
    },
    /// Caller requested disconnect.
    DisconnectRequested,
    /// Reconnect timer fired.
    ReconnectTimer,
}

/// Actions to be executed by the sync-client.
///
/// These are instructions, not side effects. The sync-client interprets
/// these and performs the actual I/O.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Open the transport (bounded by the handshake timeout).
    OpenTransport,
    /// Tear the transport down.
    CloseTransport,
    /// Sleep before the next reconnection attempt.
    StartReconnectTimer {
        /// Delay before attempting reconnection.
        delay: Duration,
    },
    /// Cancel any in-flight attempt or pending reconnect timer.
    CancelReconnect,
    /// Emit an event to the application.
    EmitEvent(ConnectionEvent),
}

/// Lifecycle notifications emitted to the application layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionEvent {
    /// Initial connect succeeded.
    Connected,
    /// The initial connect failed.
    ConnectionFailed {
        /// Classified failure.
        error: SyncError,
    },
    /// The live connection dropped.
    ConnectionLost {
        /// Reason for the drop.
        reason: String,
    },
    /// A reconnection attempt failed.
    ReconnectFailed {
        /// Which attempt failed.
        attempt: u32,
        /// Classified failure.
        error: SyncError,
    },
    /// Reconnected after a drop.
    Reconnected {
        /// Attempts it took.
        attempts: u32,
    },
    /// Reconnection gave up; the state is now `Failed`.
    ReconnectExhausted {
        /// Attempts made.
        attempts: u32,
    },
    /// Disconnected on request.
    Disconnected,
}

impl ConnectionEvent {
    /// The error a caller of `connect` should see for this event, if any.
    pub fn failure(&self) -> Option<SyncError> {
        match self {
            Self::ConnectionFailed { error } => Some(error.clone()),
            Self::ReconnectExhausted { attempts } => Some(SyncError::ReconnectExhausted {
                attempts: *attempts,
            }),
            _ => None,
        }
    }
}

/// Bounded exponential backoff for automatic reconnection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    /// Delay before the first attempt.
    pub base_delay: Duration,
    /// Cap on the exponential delay (jitter is added on top).
    pub max_delay: Duration,
    /// Attempts before giving up.
    pub max_attempts: u32,
    /// Upper bound of the random jitter added to each delay.
    pub max_jitter: Duration,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(5),
            max_attempts: 5,
            max_jitter: Duration::from_millis(500),
        }
    }
}

impl ReconnectPolicy {
    /// Calculate reconnection backoff with jitter.
    ///
    /// Jitter spreads reconnects out when many clients lose the same server.
    ///
    /// Formula: min(max_delay, base_delay * 2^(attempt-1)) + random(0..=max_jitter)
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.base_delay_for(attempt) + random_jitter(self.max_jitter)
    }

    /// The exponential part of the delay, without jitter.
    pub fn base_delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31);
        self.base_delay
            .saturating_mul(1u32 << exponent)
            .min(self.max_delay)
    }
}

/// Random jitter between zero and `max`, inclusive.
fn random_jitter(max: Duration) -> Duration {
    let max_ms = max.as_millis() as u64;
    if max_ms == 0 {
        return Duration::ZERO;
    }
    let mut bytes = [0u8; 8];
    if getrandom::getrandom(&mut bytes).is_err() {
        return Duration::ZERO;
    }
    Duration::from_millis(u64::from_le_bytes(bytes) % (max_ms + 1))
}
