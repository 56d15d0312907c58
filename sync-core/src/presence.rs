//! Presence and typing-indicator state for murmur.
//!
//! Pure data; the caller supplies `now` for every time-dependent operation so
//! tests can drive expiry deterministically.

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use murmur_sync_types::{GroupId, PeerId, Scope};

/// Map an inbound typing notification to the conversation it belongs to.
///
/// Group typing carries the group id; direct typing is keyed by the typist.
pub fn typing_scope(user_id: &PeerId, group_id: Option<&GroupId>) -> Scope {
    match group_id {
        Some(group) => Scope::Group(group.clone()),
        None => Scope::Direct(user_id.clone()),
    }
}

/// Which peers are online, and who is typing where.
#[derive(Debug, Default, Clone)]
pub struct PresenceTracker {
    online: BTreeMap<PeerId, bool>,
    typing: BTreeMap<Scope, BTreeMap<PeerId, Instant>>,
}

impl PresenceTracker {
    /// Create an empty tracker.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the whole online map with an `online_users` snapshot.
    ///
    /// Peers absent from the snapshot are offline afterwards.
    pub fn apply_full_snapshot<I>(&mut self, ids: I)
    where
        I: IntoIterator<Item = PeerId>,
    {
        self.online = ids.into_iter().map(|id| (id, true)).collect();
    }

    /// Mark a peer online.
    pub fn apply_peer_connected(&mut self, id: PeerId) {
        self.online.insert(id, true);
    }

    /// Mark a peer offline and drop any typing indicator it still holds.
    pub fn apply_peer_disconnected(&mut self, id: &PeerId) {
        self.online.insert(id.clone(), false);
        for typists in self.typing.values_mut() {
            typists.remove(id);
        }
        self.typing.retain(|_, typists| !typists.is_empty());
    }

    /// Record that `peer` started (or is still) typing in `scope`.
    pub fn apply_typing_start(&mut self, peer: PeerId, scope: Scope, now: Instant) {
        self.typing.entry(scope).or_default().insert(peer, now);
    }

    /// Record that `peer` stopped typing in `scope`.
    pub fn apply_typing_stop(&mut self, peer: &PeerId, scope: &Scope) {
        if let Some(typists) = self.typing.get_mut(scope) {
            typists.remove(peer);
            if typists.is_empty() {
                self.typing.remove(scope);
            }
        }
    }

    /// Expire typing entries older than `max_age`.
    ///
    /// Returns `true` if anything was removed.
    pub fn sweep(&mut self, now: Instant, max_age: Duration) -> bool {
        let mut changed = false;
        for typists in self.typing.values_mut() {
            let before = typists.len();
            typists.retain(|_, started| now.saturating_duration_since(*started) < max_age);
            changed |= typists.len() != before;
        }
        self.typing.retain(|_, typists| !typists.is_empty());
        changed
    }

    /// Whether `id` is online. Unknown peers are offline.
    pub fn is_online(&self, id: &PeerId) -> bool {
        self.online.get(id).copied().unwrap_or(false)
    }

    /// Every online peer, sorted.
    pub fn online_ids(&self) -> Vec<PeerId> {
        self.online
            .iter()
            .filter(|(_, online)| **online)
            .map(|(id, _)| id.clone())
            .collect()
    }

    /// Peers currently typing in `scope`, sorted.
    pub fn typing_ids(&self, scope: &Scope) -> Vec<PeerId> {
        self.typing
            .get(scope)
            .map(|typists| typists.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Whether any typing entry exists.
    pub fn has_typing(&self) -> bool {
        !self.typing.is_empty()
    }
}
