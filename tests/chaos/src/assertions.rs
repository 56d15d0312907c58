//! Assertion helpers for chaos testing.
//!
//! These are pure functions that verify message list correctness after chaos
//! scenarios complete. They take state as input and return pass/fail.

use std::collections::HashSet;

use murmur_sync_types::{DeliveryState, Message};

/// Result of an assertion check.
#[derive(Debug, Clone)]
pub struct AssertionResult {
    /// Whether the assertion passed
    pub passed: bool,
    /// Description of what was checked
    pub description: String,
    /// Details on failure
    pub failure_details: Option<String>,
}

impl AssertionResult {
    /// Create a passing result.
    pub fn pass(description: &str) -> Self {
        Self {
            passed: true,
            description: description.into(),
            failure_details: None,
        }
    }

    /// Create a failing result.
    pub fn fail(description: &str, details: &str) -> Self {
        Self {
            passed: false,
            description: description.into(),
            failure_details: Some(details.into()),
        }
    }
}

/// Assert that no server id appears twice in the list.
pub fn assert_no_duplicates(messages: &[Message]) -> AssertionResult {
    let mut seen = HashSet::new();
    for message in messages {
        if let Some(id) = &message.server_id {
            if !seen.insert(id) {
                return AssertionResult::fail(
                    "No duplicate messages",
                    &format!("Server id {} is listed more than once", id),
                );
            }
        }
    }
    AssertionResult::pass(&format!("{} messages, no duplicates", messages.len()))
}

/// Assert that every entry has settled as confirmed.
///
/// Pending entries mean a send never resolved; failed entries should have
/// been removed from the list.
pub fn assert_all_confirmed(messages: &[Message]) -> AssertionResult {
    for message in messages {
        if message.delivery != DeliveryState::Confirmed {
            return AssertionResult::fail(
                "All messages confirmed",
                &format!(
                    "Message {} ({:?}) is {:?}",
                    message.local_id, message.content, message.delivery
                ),
            );
        }
        if message.server_id.is_none() {
            return AssertionResult::fail(
                "All messages confirmed",
                &format!("Confirmed message {} has no server id", message.local_id),
            );
        }
    }
    AssertionResult::pass(&format!("All {} messages confirmed", messages.len()))
}

/// Assert that the list holds exactly `expected` bodies, in that order.
pub fn assert_contents(messages: &[Message], expected: &[&str]) -> AssertionResult {
    let actual: Vec<&str> = messages.iter().map(|m| m.content.as_str()).collect();
    if actual == expected {
        AssertionResult::pass(&format!("{} messages in expected order", expected.len()))
    } else {
        AssertionResult::fail(
            "Message contents",
            &format!("Expected {:?}, got {:?}", expected, actual),
        )
    }
}

/// Assert that the list holds exactly the bodies in `expected`, in any order.
pub fn assert_same_contents(messages: &[Message], expected: &[&str]) -> AssertionResult {
    let mut actual: Vec<&str> = messages.iter().map(|m| m.content.as_str()).collect();
    let mut expected = expected.to_vec();
    actual.sort_unstable();
    expected.sort_unstable();
    if actual == expected {
        AssertionResult::pass(&format!("{} expected messages present", expected.len()))
    } else {
        AssertionResult::fail(
            "Message contents",
            &format!("Expected {:?}, got {:?}", expected, actual),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use murmur_sync_types::{OutgoingMessage, PeerId, Scope, ServerId, ServerMessage};

    fn confirmed(id: &str, content: &str) -> Message {
        Message::confirmed(ServerMessage {
            id: ServerId::new(id),
            sender_id: PeerId::new("alice"),
            receiver_id: Some(PeerId::new("bob")),
            group_id: None,
            content: content.into(),
            created_at: 1_000,
            read: false,
        })
    }

    fn pending(content: &str) -> Message {
        let outgoing =
            OutgoingMessage::new(PeerId::new("alice"), Scope::Direct(PeerId::new("bob")), content);
        Message::pending(&outgoing, 1_000)
    }

    #[test]
    fn test_no_duplicates_pass() {
        let messages = vec![confirmed("m-1", "a"), confirmed("m-2", "b"), pending("c")];
        assert!(assert_no_duplicates(&messages).passed);
    }

    #[test]
    fn test_no_duplicates_fail() {
        let messages = vec![confirmed("m-1", "a"), confirmed("m-1", "a")];
        let result = assert_no_duplicates(&messages);
        assert!(!result.passed);
        assert!(result.failure_details.unwrap().contains("m-1"));
    }

    #[test]
    fn test_all_confirmed_fails_on_pending() {
        assert!(assert_all_confirmed(&[confirmed("m-1", "a")]).passed);
        assert!(!assert_all_confirmed(&[confirmed("m-1", "a"), pending("b")]).passed);
    }

    #[test]
    fn test_contents_checks_order() {
        let messages = vec![confirmed("m-1", "a"), confirmed("m-2", "b")];
        assert!(assert_contents(&messages, &["a", "b"]).passed);
        assert!(!assert_contents(&messages, &["b", "a"]).passed);
        assert!(assert_same_contents(&messages, &["b", "a"]).passed);
        assert!(!assert_same_contents(&messages, &["a"]).passed);
    }
}
