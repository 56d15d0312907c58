//! Message records for murmur.
//!
//! [`ServerMessage`] is the shape the server and the persistence API speak.
//! [`Message`] is the local list entry, which exists before the server has
//! confirmed anything and carries its own [`DeliveryState`].

use serde::{Deserialize, Serialize};

use crate::{GroupId, LocalId, PeerId, Scope, ServerId};

/// Delivery state of a local message entry.
///
/// Transitions `Pending -> Confirmed` or `Pending -> Failed` exactly once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DeliveryState {
    /// Shown optimistically, not yet confirmed by the server.
    Pending,
    /// Acknowledged by the server; `server_id` is set and stable.
    Confirmed,
    /// The durable write failed.
    Failed,
}

/// A message record as persisted and echoed by the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerMessage {
    /// Server-assigned id (`_id` is accepted on input).
    #[serde(alias = "_id")]
    pub id: ServerId,
    /// Author of the message.
    pub sender_id: PeerId,
    /// Recipient for direct messages.
    #[serde(default)]
    pub receiver_id: Option<PeerId>,
    /// Group for group messages.
    #[serde(default)]
    pub group_id: Option<GroupId>,
    /// Message body.
    pub content: String,
    /// Creation time, unix milliseconds.
    pub created_at: u64,
    /// Whether the recipient has read it.
    #[serde(default)]
    pub read: bool,
}

impl ServerMessage {
    /// Whether this message belongs to `scope` as seen by `viewer`.
    pub fn in_scope(&self, viewer: &PeerId, scope: &Scope) -> bool {
        match scope {
            Scope::Group(group) => self.group_id.as_ref() == Some(group),
            Scope::Direct(peer) => {
                self.group_id.is_none()
                    && ((&self.sender_id == viewer && self.receiver_id.as_ref() == Some(peer))
                        || (&self.sender_id == peer && self.receiver_id.as_ref() == Some(viewer)))
            }
        }
    }
}

/// A message the local user is sending, before any id is assigned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingMessage {
    /// The local user.
    pub sender_id: PeerId,
    /// Where the message goes.
    pub scope: Scope,
    /// Message body.
    pub content: String,
}

impl OutgoingMessage {
    /// Create an outgoing message.
    pub fn new(sender_id: PeerId, scope: Scope, content: impl Into<String>) -> Self {
        Self {
            sender_id,
            scope,
            content: content.into(),
        }
    }
}

/// An entry in the local message list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    /// Client-generated id; immutable.
    pub local_id: LocalId,
    /// Set once the server acknowledges persistence.
    pub server_id: Option<ServerId>,
    /// Author.
    pub sender_id: PeerId,
    /// Recipient for direct messages.
    pub receiver_id: Option<PeerId>,
    /// Group for group messages.
    pub group_id: Option<GroupId>,
    /// Message body.
    pub content: String,
    /// Creation time, unix milliseconds.
    pub created_at: u64,
    /// Where this entry is in its lifecycle.
    pub delivery: DeliveryState,
}

impl Message {
    /// Create an optimistic entry for an outgoing message.
    pub fn pending(outgoing: &OutgoingMessage, created_at: u64) -> Self {
        Self {
            local_id: LocalId::new(),
            server_id: None,
            sender_id: outgoing.sender_id.clone(),
            receiver_id: outgoing.scope.receiver_id().cloned(),
            group_id: outgoing.scope.group_id().cloned(),
            content: outgoing.content.clone(),
            created_at,
            delivery: DeliveryState::Pending,
        }
    }

    /// Create a confirmed entry from a server record.
    pub fn confirmed(server: ServerMessage) -> Self {
        Self {
            local_id: LocalId::new(),
            server_id: Some(server.id),
            sender_id: server.sender_id,
            receiver_id: server.receiver_id,
            group_id: server.group_id,
            content: server.content,
            created_at: server.created_at,
            delivery: DeliveryState::Confirmed,
        }
    }

    /// Whether the entry is still awaiting confirmation.
    pub fn is_pending(&self) -> bool {
        self.delivery == DeliveryState::Pending
    }

    /// Whether `server` is the echo of this pending entry.
    ///
    /// Matches on author, body and target; the server id is not known yet.
    pub fn matches_echo(&self, server: &ServerMessage) -> bool {
        self.is_pending()
            && self.sender_id == server.sender_id
            && self.content == server.content
            && self.receiver_id == server.receiver_id
            && self.group_id == server.group_id
    }

    /// Take over the server's data, keeping the local id.
    pub fn confirm_with(&mut self, server: ServerMessage) {
        self.server_id = Some(server.id);
        self.receiver_id = server.receiver_id;
        self.group_id = server.group_id;
        self.content = server.content;
        self.created_at = server.created_at;
        self.delivery = DeliveryState::Confirmed;
    }
}

/// Per-conversation summary from the persistence API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationSummary {
    /// The conversation partner.
    pub user_id: PeerId,
    /// Messages from the partner not yet read by the local user.
    #[serde(default)]
    pub unread_count: u32,
    /// Most recent message in the conversation.
    #[serde(default)]
    pub last_message: Option<ServerMessage>,
}
