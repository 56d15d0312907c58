//! Event channel schemas for murmur.
//!
//! A transport carries [`RawFrame`]s: an event name plus a JSON payload.
//! Everything past the transport boundary works with the typed
//! [`InboundEvent`] and [`OutboundEvent`]; loosely shaped payloads are
//! normalized (or rejected) in [`InboundEvent::decode`] and go no further.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::{GroupId, PeerId, Scope, ServerMessage, SyncError};

/// A named event with an untyped payload, as carried by a transport.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawFrame {
    /// Event name, e.g. `receive_message`.
    pub event: String,
    /// Event payload.
    #[serde(default)]
    pub payload: Value,
}

impl RawFrame {
    /// Create a frame.
    pub fn new(event: impl Into<String>, payload: Value) -> Self {
        Self {
            event: event.into(),
            payload,
        }
    }

    /// Serialize to a JSON text frame.
    pub fn to_json(&self) -> Result<String, SyncError> {
        serde_json::to_string(self).map_err(|e| SyncError::InvalidEvent {
            event: self.event.clone(),
            reason: e.to_string(),
        })
    }

    /// Parse a JSON text frame.
    pub fn from_json(text: &str) -> Result<Self, SyncError> {
        serde_json::from_str(text).map_err(|e| SyncError::InvalidEvent {
            event: "<frame>".into(),
            reason: e.to_string(),
        })
    }
}

/// Events the client emits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutboundEvent {
    /// Low-latency peer delivery. The sender is implied by the credential.
    SendMessage {
        /// Where the message goes.
        scope: Scope,
        /// Message body.
        content: String,
    },
    /// The local user started typing in a scope.
    Typing(Scope),
    /// The local user stopped typing in a scope.
    StopTyping(Scope),
    /// Subscribe to a group's events.
    JoinGroup(GroupId),
    /// Unsubscribe from a group's events.
    LeaveGroup(GroupId),
}

impl OutboundEvent {
    /// Event name on the wire.
    pub fn name(&self) -> &'static str {
        match self {
            Self::SendMessage { .. } => "send_message",
            Self::Typing(_) => "typing",
            Self::StopTyping(_) => "stop_typing",
            Self::JoinGroup(_) => "join_group",
            Self::LeaveGroup(_) => "leave_group",
        }
    }

    /// Build the wire frame.
    pub fn to_frame(&self) -> RawFrame {
        let payload = match self {
            Self::SendMessage { scope, content } => json!({
                "receiver_id": scope.receiver_id(),
                "group_id": scope.group_id(),
                "content": content,
            }),
            Self::Typing(scope) | Self::StopTyping(scope) => scope_payload(scope),
            Self::JoinGroup(group) | Self::LeaveGroup(group) => json!({ "group_id": group }),
        };
        RawFrame::new(self.name(), payload)
    }
}

fn scope_payload(scope: &Scope) -> Value {
    match scope {
        Scope::Direct(peer) => json!({ "receiver_id": peer }),
        Scope::Group(group) => json!({ "group_id": group }),
    }
}

/// Events the server delivers, validated against their schemas.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundEvent {
    /// A message was delivered (a peer's message or the echo of our own).
    ReceiveMessage(ServerMessage),
    /// Full presence snapshot.
    OnlineUsers(Vec<PeerId>),
    /// A peer came online.
    UserConnected(PeerId),
    /// A peer went offline.
    UserDisconnected(PeerId),
    /// A peer started typing.
    UserTyping {
        /// The typing peer.
        user_id: PeerId,
        /// Set when typing in a group.
        group_id: Option<GroupId>,
    },
    /// A peer stopped typing.
    UserStoppedTyping {
        /// The peer.
        user_id: PeerId,
        /// Set when typing in a group.
        group_id: Option<GroupId>,
    },
}

impl InboundEvent {
    /// Event name on the wire.
    pub fn name(&self) -> &'static str {
        match self {
            Self::ReceiveMessage(_) => "receive_message",
            Self::OnlineUsers(_) => "online_users",
            Self::UserConnected(_) => "user_connected",
            Self::UserDisconnected(_) => "user_disconnected",
            Self::UserTyping { .. } => "user_typing",
            Self::UserStoppedTyping { .. } => "user_stopped_typing",
        }
    }

    /// Validate and normalize a raw frame.
    pub fn decode(frame: &RawFrame) -> Result<Self, SyncError> {
        let event = frame.event.as_str();
        match event {
            "receive_message" => parse(event, &frame.payload).map(Self::ReceiveMessage),
            "online_users" => {
                let ids = match parse::<OnlineUsersPayload>(event, &frame.payload)? {
                    OnlineUsersPayload::List(ids) | OnlineUsersPayload::Wrapped { user_ids: ids } => {
                        ids
                    }
                };
                ids.into_iter()
                    .map(|peer| peer.validated(event).map(|(id, _)| id))
                    .collect::<Result<Vec<_>, _>>()
                    .map(Self::OnlineUsers)
            }
            "user_connected" => peer_payload(event, &frame.payload).map(|(id, _)| Self::UserConnected(id)),
            "user_disconnected" => {
                peer_payload(event, &frame.payload).map(|(id, _)| Self::UserDisconnected(id))
            }
            "user_typing" => peer_payload(event, &frame.payload)
                .map(|(user_id, group_id)| Self::UserTyping { user_id, group_id }),
            "user_stopped_typing" => peer_payload(event, &frame.payload)
                .map(|(user_id, group_id)| Self::UserStoppedTyping { user_id, group_id }),
            other => Err(SyncError::UnknownEvent(other.to_string())),
        }
    }

    /// Build the wire frame, as a server would send it.
    pub fn to_frame(&self) -> RawFrame {
        let payload = match self {
            Self::ReceiveMessage(message) => json!(message),
            Self::OnlineUsers(ids) => json!(ids),
            Self::UserConnected(id) | Self::UserDisconnected(id) => json!({ "user_id": id }),
            Self::UserTyping { user_id, group_id } | Self::UserStoppedTyping { user_id, group_id } => {
                json!({ "user_id": user_id, "group_id": group_id })
            }
        };
        RawFrame::new(self.name(), payload)
    }
}

/// Peer payloads arrive as a bare id or an object with `user_id`/`userId`.
#[derive(Deserialize)]
#[serde(untagged)]
enum PeerPayload {
    Bare(PeerId),
    Object {
        #[serde(alias = "userId")]
        user_id: PeerId,
        #[serde(default, alias = "groupId")]
        group_id: Option<GroupId>,
    },
}

impl PeerPayload {
    fn validated(self, event: &str) -> Result<(PeerId, Option<GroupId>), SyncError> {
        let (id, group) = match self {
            Self::Bare(id) => (id, None),
            Self::Object { user_id, group_id } => (user_id, group_id),
        };
        if id.as_str().is_empty() {
            return Err(SyncError::InvalidEvent {
                event: event.to_string(),
                reason: "empty user id".into(),
            });
        }
        Ok((id, group.filter(|g| !g.as_str().is_empty())))
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum OnlineUsersPayload {
    List(Vec<PeerPayload>),
    Wrapped {
        #[serde(alias = "userIds")]
        user_ids: Vec<PeerPayload>,
    },
}

fn peer_payload(event: &str, payload: &Value) -> Result<(PeerId, Option<GroupId>), SyncError> {
    parse::<PeerPayload>(event, payload)?.validated(event)
}

fn parse<T: DeserializeOwned>(event: &str, payload: &Value) -> Result<T, SyncError> {
    T::deserialize(payload).map_err(|e| SyncError::InvalidEvent {
        event: event.to_string(),
        reason: e.to_string(),
    })
}
