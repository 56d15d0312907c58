//! Message list reconciliation for murmur.
//!
//! [`MessageLog`] is the single ordered list the UI renders. An outgoing
//! message enters as `Pending` and is settled by whichever completion path
//! gets there first:
//!
//! 1. the server's `receive_message` echo ([`MessageLog::receive`]),
//! 2. the durable-write result after the grace window ([`MessageLog::apply_durable`]),
//! 3. a durable-write failure ([`MessageLog::fail`]).
//!
//! Every path is idempotent after the first application, and the list never
//! holds two entries with the same server id.

use murmur_sync_types::{DeliveryState, LocalId, Message, OutgoingMessage, ServerId, ServerMessage};

/// What [`MessageLog::receive`] did with an inbound record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReceiveOutcome {
    /// New message appended as `Confirmed`.
    Appended,
    /// The record confirmed one of our pending entries (fast path).
    ConfirmedPending(LocalId),
    /// A message with this server id is already in the list.
    Duplicate,
}

/// What [`MessageLog::apply_durable`] did with a durable-write result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DurableOutcome {
    /// The pending entry was replaced in place with the saved record.
    Replaced,
    /// The entry was already confirmed; the result was discarded.
    AlreadySettled,
    /// The saved record was already listed under another entry, so the
    /// pending entry was dropped.
    MergedIntoExisting,
    /// No entry with this local id (e.g. the list was reloaded).
    Missing,
}

/// The ordered local message list.
#[derive(Debug, Default, Clone)]
pub struct MessageLog {
    messages: Vec<Message>,
}

impl MessageLog {
    /// Create an empty log.
    pub fn new() -> Self {
        Self::default()
    }

    /// All entries, in display order.
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    /// Whether the log is empty.
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Look up an entry by local id.
    pub fn get(&self, local_id: &LocalId) -> Option<&Message> {
        self.messages.iter().find(|m| &m.local_id == local_id)
    }

    /// Whether an entry with this server id exists.
    pub fn contains_server_id(&self, server_id: &ServerId) -> bool {
        self.messages
            .iter()
            .any(|m| m.server_id.as_ref() == Some(server_id))
    }

    /// Append an optimistic entry at the end of the list.
    pub fn append_pending(&mut self, outgoing: &OutgoingMessage, created_at: u64) -> LocalId {
        let message = Message::pending(outgoing, created_at);
        let local_id = message.local_id;
        self.messages.push(message);
        local_id
    }

    /// Apply an inbound `receive_message` record.
    ///
    /// Duplicates (same server id) are dropped silently. A record matching a
    /// pending entry of ours confirms it in place; anything else is appended.
    pub fn receive(&mut self, server: ServerMessage) -> ReceiveOutcome {
        if self.contains_server_id(&server.id) {
            return ReceiveOutcome::Duplicate;
        }
        if let Some(entry) = self.messages.iter_mut().find(|m| m.matches_echo(&server)) {
            let local_id = entry.local_id;
            entry.confirm_with(server);
            return ReceiveOutcome::ConfirmedPending(local_id);
        }
        self.messages.push(Message::confirmed(server));
        ReceiveOutcome::Appended
    }

    /// Apply the durable-write result for a pending entry.
    pub fn apply_durable(&mut self, local_id: &LocalId, saved: ServerMessage) -> DurableOutcome {
        let Some(index) = self.position(local_id) else {
            return DurableOutcome::Missing;
        };
        if !self.messages[index].is_pending() {
            return DurableOutcome::AlreadySettled;
        }
        if self.contains_server_id(&saved.id) {
            self.messages.remove(index);
            return DurableOutcome::MergedIntoExisting;
        }
        self.messages[index].confirm_with(saved);
        DurableOutcome::Replaced
    }

    /// Settle a pending entry as failed and drop it from the list.
    ///
    /// Returns the removed entry. Confirmed entries never revert, so this is
    /// a no-op (returning `None`) for anything not pending.
    pub fn fail(&mut self, local_id: &LocalId) -> Option<Message> {
        let index = self.position(local_id)?;
        if !self.messages[index].is_pending() {
            return None;
        }
        let mut removed = self.messages.remove(index);
        removed.delivery = DeliveryState::Failed;
        Some(removed)
    }

    /// Replace the whole list with a durable-read result.
    ///
    /// Sorted ascending by creation time (stable for equal timestamps),
    /// with duplicate server ids collapsed to their first occurrence.
    pub fn replace_all(&mut self, records: Vec<ServerMessage>) {
        let mut messages: Vec<Message> = Vec::with_capacity(records.len());
        for record in records {
            if messages
                .iter()
                .any(|m| m.server_id.as_ref() == Some(&record.id))
            {
                continue;
            }
            messages.push(Message::confirmed(record));
        }
        messages.sort_by_key(|m| m.created_at);
        self.messages = messages;
    }

    /// Drop every entry.
    pub fn clear(&mut self) {
        self.messages.clear();
    }

    fn position(&self, local_id: &LocalId) -> Option<usize> {
        self.messages.iter().position(|m| &m.local_id == local_id)
    }
}
