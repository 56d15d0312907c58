//! Persistence API seam.
//!
//! The request/response collaborator that owns durable storage: message
//! writes, scope reads, read receipts and conversation summaries. The sync
//! layer only consumes it; how it talks to the backend is up to the
//! implementation.

use async_trait::async_trait;
use murmur_sync_types::{
    ConversationSummary, OutgoingMessage, PeerId, Scope, ServerId, ServerMessage, SyncError,
};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use thiserror::Error;

/// Persistence API errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PersistenceError {
    /// A write (send, mark read) failed.
    #[error("write failed: {0}")]
    Write(String),

    /// A read (messages, conversations) failed.
    #[error("read failed: {0}")]
    Read(String),
}

impl From<PersistenceError> for SyncError {
    fn from(err: PersistenceError) -> Self {
        match err {
            PersistenceError::Write(reason) => SyncError::DurableWriteFailed(reason),
            PersistenceError::Read(reason) => SyncError::DurableReadFailed(reason),
        }
    }
}

/// Durable storage operations the sync layer depends on.
#[async_trait]
pub trait Persistence: Send + Sync + 'static {
    /// Persist an outgoing message and return the saved record.
    async fn send_message(&self, message: &OutgoingMessage) -> Result<ServerMessage, PersistenceError>;

    /// Fetch every message of `scope` visible to `viewer`.
    async fn fetch_messages(
        &self,
        viewer: &PeerId,
        scope: &Scope,
    ) -> Result<Vec<ServerMessage>, PersistenceError>;

    /// Mark a message as read.
    async fn mark_read(&self, id: &ServerId) -> Result<(), PersistenceError>;

    /// Fetch the conversation summaries of `user`.
    async fn fetch_conversations(
        &self,
        user: &PeerId,
    ) -> Result<Vec<ConversationSummary>, PersistenceError>;
}

/// In-memory persistence for testing.
///
/// Stores sent messages, answers reads from the store, and supports
/// scripted failures and per-call delays. Clones share state.
#[derive(Debug, Default, Clone)]
pub struct MockPersistence {
    inner: Arc<Mutex<MockPersistenceInner>>,
}

#[derive(Debug, Default)]
struct MockPersistenceInner {
    next_id: u64,
    store: Vec<ServerMessage>,
    conversations: Vec<ConversationSummary>,
    send_delay: Duration,
    fetch_delay: Duration,
    conversation_delay: Duration,
    scope_delays: BTreeMap<Scope, Duration>,
    fail_next_send: Option<String>,
    fail_next_fetch: Option<String>,
    send_calls: usize,
    fetch_calls: usize,
    conversation_calls: usize,
    marked_read: Vec<ServerId>,
}

impl MockPersistence {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a record to the store as if another client had sent it.
    pub fn seed(&self, message: ServerMessage) {
        let mut inner = self.inner.lock().unwrap();
        inner.store.push(message);
    }

    /// Set the summaries returned by `fetch_conversations`.
    pub fn set_conversations(&self, conversations: Vec<ConversationSummary>) {
        let mut inner = self.inner.lock().unwrap();
        inner.conversations = conversations;
    }

    /// Delay every `send_message` by `delay`.
    pub fn set_send_delay(&self, delay: Duration) {
        let mut inner = self.inner.lock().unwrap();
        inner.send_delay = delay;
    }

    /// Delay every `fetch_messages` by `delay`.
    pub fn set_fetch_delay(&self, delay: Duration) {
        let mut inner = self.inner.lock().unwrap();
        inner.fetch_delay = delay;
    }

    /// Delay `fetch_messages` for one scope only.
    pub fn set_scope_delay(&self, scope: Scope, delay: Duration) {
        let mut inner = self.inner.lock().unwrap();
        inner.scope_delays.insert(scope, delay);
    }

    /// Delay every `fetch_conversations` by `delay`.
    pub fn set_conversation_delay(&self, delay: Duration) {
        let mut inner = self.inner.lock().unwrap();
        inner.conversation_delay = delay;
    }

    /// Cause the next `send_message` to fail.
    pub fn fail_next_send(&self, reason: &str) {
        let mut inner = self.inner.lock().unwrap();
        inner.fail_next_send = Some(reason.to_string());
    }

    /// Cause the next `fetch_messages` to fail.
    pub fn fail_next_fetch(&self, reason: &str) {
        let mut inner = self.inner.lock().unwrap();
        inner.fail_next_fetch = Some(reason.to_string());
    }

    /// Number of `send_message` calls.
    pub fn send_calls(&self) -> usize {
        self.inner.lock().unwrap().send_calls
    }

    /// Number of `fetch_messages` calls.
    pub fn fetch_calls(&self) -> usize {
        self.inner.lock().unwrap().fetch_calls
    }

    /// Number of `fetch_conversations` calls.
    pub fn conversation_calls(&self) -> usize {
        self.inner.lock().unwrap().conversation_calls
    }

    /// Ids passed to `mark_read`, in order.
    pub fn marked_read(&self) -> Vec<ServerId> {
        self.inner.lock().unwrap().marked_read.clone()
    }

    /// Everything in the store.
    pub fn stored(&self) -> Vec<ServerMessage> {
        self.inner.lock().unwrap().store.clone()
    }
}

#[async_trait]
impl Persistence for MockPersistence {
    async fn send_message(&self, message: &OutgoingMessage) -> Result<ServerMessage, PersistenceError> {
        let delay = {
            let mut inner = self.inner.lock().unwrap();
            inner.send_calls += 1;
            inner.send_delay
        };
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let mut inner = self.inner.lock().unwrap();
        if let Some(reason) = inner.fail_next_send.take() {
            return Err(PersistenceError::Write(reason));
        }

        inner.next_id += 1;
        let saved = ServerMessage {
            id: ServerId::new(format!("srv-{}", inner.next_id)),
            sender_id: message.sender_id.clone(),
            receiver_id: message.scope.receiver_id().cloned(),
            group_id: message.scope.group_id().cloned(),
            content: message.content.clone(),
            created_at: 1_700_000_000_000 + inner.next_id,
            read: false,
        };
        inner.store.push(saved.clone());
        Ok(saved)
    }

    async fn fetch_messages(
        &self,
        viewer: &PeerId,
        scope: &Scope,
    ) -> Result<Vec<ServerMessage>, PersistenceError> {
        let delay = {
            let mut inner = self.inner.lock().unwrap();
            inner.fetch_calls += 1;
            inner
                .scope_delays
                .get(scope)
                .copied()
                .unwrap_or(inner.fetch_delay)
        };
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let mut inner = self.inner.lock().unwrap();
        if let Some(reason) = inner.fail_next_fetch.take() {
            return Err(PersistenceError::Read(reason));
        }

        Ok(inner
            .store
            .iter()
            .filter(|m| m.in_scope(viewer, scope))
            .cloned()
            .collect())
    }

    async fn mark_read(&self, id: &ServerId) -> Result<(), PersistenceError> {
        let mut inner = self.inner.lock().unwrap();
        match inner.store.iter_mut().find(|m| &m.id == id) {
            Some(message) => {
                message.read = true;
                inner.marked_read.push(id.clone());
                Ok(())
            }
            None => Err(PersistenceError::Write(format!("no message {}", id))),
        }
    }

    async fn fetch_conversations(
        &self,
        _user: &PeerId,
    ) -> Result<Vec<ConversationSummary>, PersistenceError> {
        let delay = {
            let mut inner = self.inner.lock().unwrap();
            inner.conversation_calls += 1;
            inner.conversation_delay
        };
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        Ok(self.inner.lock().unwrap().conversations.clone())
    }
}
