//! Error types for murmur.

use std::time::Duration;
use thiserror::Error;

/// Classified errors surfaced by the sync core.
///
/// Cloneable so a single outcome can be handed to every caller that
/// joined the same in-flight operation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SyncError {
    /// The connection handshake did not complete in time.
    #[error("connection timed out after {0:?}")]
    ConnectionTimeout(Duration),

    /// The server refused the credential.
    #[error("authentication rejected: {0}")]
    AuthRejected(String),

    /// The transport failed or dropped.
    #[error("transport lost: {0}")]
    TransportLost(String),

    /// Operation requires a live connection.
    #[error("not connected")]
    NotConnected,

    /// An in-flight connect was cancelled by `disconnect`.
    #[error("connect cancelled")]
    ConnectCancelled,

    /// Automatic reconnection gave up.
    #[error("reconnection exhausted after {attempts} attempts")]
    ReconnectExhausted {
        /// Number of reconnection attempts made.
        attempts: u32,
    },

    /// The durable write of a message failed.
    #[error("durable write failed: {0}")]
    DurableWriteFailed(String),

    /// A durable read failed.
    #[error("durable read failed: {0}")]
    DurableReadFailed(String),

    /// A persistence call exceeded its timeout.
    #[error("request timed out after {0:?}")]
    RequestTimeout(Duration),

    /// Operation needs an active conversation scope.
    #[error("no active conversation scope")]
    NoActiveScope,

    /// Message content is empty after trimming.
    #[error("message is empty")]
    EmptyMessage,

    /// Client configuration could not be loaded or is out of range.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Inbound event payload did not match its schema.
    #[error("invalid {event} payload: {reason}")]
    InvalidEvent {
        /// Event name.
        event: String,
        /// What was wrong with the payload.
        reason: String,
    },

    /// Inbound event name is not part of the protocol.
    #[error("unknown event: {0}")]
    UnknownEvent(String),
}

impl SyncError {
    /// Whether the error came from the connection lifecycle.
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            Self::ConnectionTimeout(_)
                | Self::AuthRejected(_)
                | Self::TransportLost(_)
                | Self::NotConnected
                | Self::ConnectCancelled
                | Self::ReconnectExhausted { .. }
        )
    }
}
