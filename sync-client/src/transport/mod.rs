//! Transport abstraction for murmur.
//!
//! This module provides a pluggable transport layer that abstracts
//! the underlying event channel (WebSocket, mock for testing).
//!
//! # Design
//!
//! The transport trait is async and connection-oriented:
//! - `open()` establishes an authenticated connection
//! - `send()` transmits one event frame
//! - `recv()` receives the next event frame
//! - `close()` tears the connection down
//!
//! A transport never reconnects on its own. The connection manager owns the
//! retry policy and always closes before opening again, so exactly one live
//! connection exists per transport.
//!
//! # Example
//!
//! ```ignore
//! let transport = MockTransport::new();
//! transport.open("ws://localhost:3002", &credential).await?;
//! transport.send(OutboundEvent::JoinGroup(group).to_frame()).await?;
//! let frame = transport.recv().await?;
//! ```

mod mock;
mod ws;

pub use mock::MockTransport;
pub use ws::WsTransport;

use async_trait::async_trait;
use murmur_sync_types::{Credential, RawFrame, SyncError};
use thiserror::Error;

/// Transport errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// Connection failed.
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    /// The server refused the credential during the handshake.
    #[error("authentication rejected: {0}")]
    AuthRejected(String),

    /// Not connected.
    #[error("not connected")]
    NotConnected,

    /// `open` called while a connection is live.
    #[error("transport already open")]
    AlreadyOpen,

    /// Connection closed.
    #[error("connection closed")]
    ConnectionClosed,

    /// Send failed.
    #[error("send failed: {0}")]
    SendFailed(String),

    /// Receive failed.
    #[error("receive failed: {0}")]
    ReceiveFailed(String),

    /// Connection timeout.
    #[error("connection timeout")]
    Timeout,
}

impl From<TransportError> for SyncError {
    fn from(err: TransportError) -> Self {
        match err {
            TransportError::AuthRejected(reason) => SyncError::AuthRejected(reason),
            TransportError::NotConnected => SyncError::NotConnected,
            other => SyncError::TransportLost(other.to_string()),
        }
    }
}

/// Transport trait for the bidirectional event channel.
///
/// Implementations handle the underlying connection mechanism
/// (WebSocket, mock, etc). `send` and `recv` may be called concurrently
/// from different tasks.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Open an authenticated connection to `endpoint`.
    ///
    /// Fails with [`TransportError::AlreadyOpen`] if a connection is live.
    async fn open(&self, endpoint: &str, credential: &Credential) -> Result<(), TransportError>;

    /// Send one frame.
    async fn send(&self, frame: RawFrame) -> Result<(), TransportError>;

    /// Receive the next frame.
    ///
    /// Waits until a frame arrives or the connection closes.
    async fn recv(&self) -> Result<RawFrame, TransportError>;

    /// Check if a connection is live.
    fn is_open(&self) -> bool;

    /// Close the connection. Closing a closed transport is a no-op.
    async fn close(&self) -> Result<(), TransportError>;
}
