//! Identity and scoping types for murmur.

use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Create an identifier from any string-like value.
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            /// Borrow the identifier as a string slice.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self::new(value)
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }
    };
}

string_id!(
    /// Identifier of a peer (a user account) as known to the server.
    PeerId
);

string_id!(
    /// Identifier of a group conversation.
    GroupId
);

string_id!(
    /// Server-assigned identifier of a persisted message.
    ///
    /// Stable once assigned; used for duplicate-delivery suppression.
    ServerId
);

/// Client-generated identifier of a message, unique per session.
///
/// UUID v4 format. Exists before any server id does and is used to
/// reconcile an optimistic entry with its confirmation.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LocalId(uuid::Uuid);

impl LocalId {
    /// Create a new random LocalId.
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4())
    }

    /// Get the inner UUID.
    pub fn as_uuid(&self) -> &uuid::Uuid {
        &self.0
    }
}

impl Default for LocalId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for LocalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Debug for LocalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "LocalId({})", self.0)
    }
}

/// The active conversation context: a direct peer or a group.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Scope {
    /// One-to-one conversation with a peer.
    Direct(PeerId),
    /// Group conversation.
    Group(GroupId),
}

impl Scope {
    /// The receiver id for a direct scope.
    pub fn receiver_id(&self) -> Option<&PeerId> {
        match self {
            Self::Direct(peer) => Some(peer),
            Self::Group(_) => None,
        }
    }

    /// The group id for a group scope.
    pub fn group_id(&self) -> Option<&GroupId> {
        match self {
            Self::Direct(_) => None,
            Self::Group(group) => Some(group),
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Direct(peer) => write!(f, "direct:{}", peer),
            Self::Group(group) => write!(f, "group:{}", group),
        }
    }
}

/// Credential supplied by the auth provider.
///
/// The token authenticates the event channel handshake and is never
/// printed by `Debug`.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
    /// The authenticated user this credential belongs to.
    pub user_id: PeerId,
    /// Bearer token.
    pub token: String,
}

impl Credential {
    /// Create a credential for `user_id` with a bearer token.
    pub fn new(user_id: impl Into<PeerId>, token: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            token: token.into(),
        }
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("user_id", &self.user_id)
            .field("token", &"[REDACTED]")
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn peer_id_serializes_transparently() {
        let id = PeerId::new("alice");
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"alice\"");

        let restored: PeerId = serde_json::from_str("\"alice\"").unwrap();
        assert_eq!(restored, id);
    }

    #[test]
    fn id_display_and_debug() {
        let group = GroupId::from("g-1");
        assert_eq!(group.to_string(), "g-1");
        assert_eq!(format!("{:?}", group), "GroupId(g-1)");
    }

    #[test]
    fn local_id_is_uuid_v4() {
        let id = LocalId::new();
        assert_eq!(id.as_uuid().get_version_num(), 4);
    }

    #[test]
    fn local_ids_are_unique() {
        assert_ne!(LocalId::new(), LocalId::new());
    }

    #[test]
    fn scope_accessors() {
        let direct = Scope::Direct(PeerId::new("bob"));
        assert_eq!(direct.receiver_id(), Some(&PeerId::new("bob")));
        assert!(direct.group_id().is_none());

        let group = Scope::Group(GroupId::new("team"));
        assert!(group.receiver_id().is_none());
        assert_eq!(group.group_id(), Some(&GroupId::new("team")));
        assert_eq!(group.to_string(), "group:team");
    }

    #[test]
    fn credential_debug_redacts_token() {
        let credential = Credential::new("alice", "secret-bearer-token");
        let debug = format!("{:?}", credential);
        assert!(debug.contains("[REDACTED]"));
        assert!(
            !debug.contains("secret-bearer-token"),
            "token must not appear in Debug output"
        );
    }
}
