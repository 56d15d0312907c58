//! # sync-client
//!
//! Real-time sync client for murmur.
//!
//! This is the library the UI layer talks to. It keeps a live event channel
//! to the messaging server, reconciles optimistic sends with server echoes
//! and durable writes, and tracks who is online and who is typing.
//!
//! ## Features
//!
//! - **Connection lifecycle**: single-flight connect, bounded reconnect with
//!   backoff, cancellable at any point
//! - **Optimistic sends**: messages show immediately and settle exactly once
//! - **Presence and typing**: debounced outgoing signals, self-expiring
//!   incoming ones
//! - **Transport Abstraction**: Pluggable transport layer (WebSocket, mock)
//! - **Pure State Machine**: Uses sync-core for side-effect-free logic
//!
//! ## Example
//!
//! ```ignore
//! use murmur_sync_client::{SyncConfig, SyncFacade, WsTransport};
//! use murmur_sync_types::{Credential, PeerId, Scope};
//!
//! let config = SyncConfig::from_file("murmur.toml")?;
//! let facade = SyncFacade::new(WsTransport::new(), api, config);
//!
//! facade.connect(Credential::new("alice", token)).await?;
//! facade.load_messages(Scope::Direct(PeerId::new("bob"))).await?;
//! facade.send_message("hi").await?;
//!
//! let mut snapshots = facade.subscribe();
//! while snapshots.changed().await.is_ok() {
//!     render(&snapshots.borrow());
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod connection;
pub mod facade;
pub mod persistence;
pub mod reconciler;
pub mod transport;
pub mod typing;

pub use config::{ConfigError, ReconnectConfig, SyncConfig};
pub use connection::{ConnectionManager, ConnectionStatus};
pub use facade::{Snapshot, SyncFacade};
pub use persistence::{MockPersistence, Persistence, PersistenceError};
pub use reconciler::{LoadOutcome, MessageReconciler, PendingSend};
pub use transport::{MockTransport, Transport, TransportError, WsTransport};
pub use typing::TypingCoordinator;
