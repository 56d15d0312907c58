//! Chaos test harness - drives a facade over mock collaborators.
//!
//! Owns one [`SyncFacade`] wired to a [`MockTransport`] and a
//! [`MockPersistence`], both of which stay reachable for fault injection.
//! The local user is always `alice`.

use std::sync::Arc;
use std::time::Duration;

use murmur_sync_client::{
    LoadOutcome, MockPersistence, MockTransport, Snapshot, SyncConfig, SyncFacade,
};
use murmur_sync_core::ConnectionState;
use murmur_sync_types::{Credential, InboundEvent, PeerId, Scope, ServerId, ServerMessage, SyncError};

/// The local user of every harness.
pub const LOCAL_USER: &str = "alice";

/// High-level chaos test orchestrator.
///
/// Provides methods for:
/// - Connecting the local user and opening conversations
/// - Delivering inbound events as the server would
/// - Dropping the connection
/// - Waiting for connection states and collecting snapshots
pub struct ChaosHarness {
    facade: Arc<SyncFacade<MockTransport, MockPersistence>>,
    transport: MockTransport,
    persistence: MockPersistence,
}

impl Default for ChaosHarness {
    fn default() -> Self {
        Self::new()
    }
}

impl ChaosHarness {
    /// Create a harness with default timings and no reconnect jitter.
    pub fn new() -> Self {
        Self::with_config(SyncConfig::new("ws://chaos").with_reconnect_jitter(Duration::ZERO))
    }

    /// Create a harness with a custom configuration.
    pub fn with_config(config: SyncConfig) -> Self {
        let transport = MockTransport::new();
        let persistence = MockPersistence::new();
        let facade = SyncFacade::new(transport.clone(), persistence.clone(), config);
        Self {
            facade: Arc::new(facade),
            transport,
            persistence,
        }
    }

    /// The facade under test.
    pub fn facade(&self) -> &Arc<SyncFacade<MockTransport, MockPersistence>> {
        &self.facade
    }

    /// The mock transport, for fault injection.
    pub fn transport(&self) -> &MockTransport {
        &self.transport
    }

    /// The mock persistence API, for fault injection.
    pub fn persistence(&self) -> &MockPersistence {
        &self.persistence
    }

    /// Connect as the local user and let the session start.
    pub async fn connect(&self) -> Result<(), SyncError> {
        self.facade
            .connect(Credential::new(LOCAL_USER, "chaos-token"))
            .await?;
        self.settle().await;
        Ok(())
    }

    /// Open the direct conversation with `peer`.
    pub async fn open_conversation(&self, peer: &str) -> Result<LoadOutcome, SyncError> {
        self.facade
            .load_messages(Scope::Direct(PeerId::new(peer)))
            .await
    }

    /// Deliver a message as the server would.
    pub fn deliver(&self, message: &ServerMessage) {
        self.transport
            .push_event(&InboundEvent::ReceiveMessage(message.clone()));
    }

    /// Deliver any inbound event.
    pub fn push(&self, event: &InboundEvent) {
        self.transport.push_event(event);
    }

    /// Drop the live connection.
    pub fn drop_connection(&self) {
        tracing::debug!("chaos: dropping connection");
        self.transport.simulate_drop();
    }

    /// Wait until the published connection state satisfies `predicate`.
    ///
    /// Returns `None` if the facade is gone.
    pub async fn wait_for_state(
        &self,
        predicate: impl Fn(&ConnectionState) -> bool,
    ) -> Option<Snapshot> {
        let mut snapshots = self.facade.subscribe();
        let snapshot = snapshots
            .wait_for(|s| predicate(&s.connection_state))
            .await
            .ok()?
            .clone();
        Some(snapshot)
    }

    /// Wait for a drop to be noticed and recovered from.
    pub async fn wait_for_recovery(&self) -> Option<Snapshot> {
        self.wait_for_state(|s| matches!(s, ConnectionState::Reconnecting { .. }))
            .await?;
        self.wait_for_state(|s| *s == ConnectionState::Connected)
            .await
    }

    /// Let spawned tasks run to quiescence.
    pub async fn settle(&self) {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    /// The latest published snapshot.
    pub fn snapshot(&self) -> Snapshot {
        self.facade.snapshot()
    }
}

/// A record of `peer` writing `content` to the local user.
pub fn message_from(peer: &str, id: &str, content: &str) -> ServerMessage {
    ServerMessage {
        id: ServerId::new(id),
        sender_id: PeerId::new(peer),
        receiver_id: Some(PeerId::new(LOCAL_USER)),
        group_id: None,
        content: content.into(),
        created_at: 1_700_000_000_000,
        read: false,
    }
}
