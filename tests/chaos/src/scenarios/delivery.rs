//! Delivery chaos scenarios (D-ECHO-*, D-DROP-*, D-BURST-*, D-FAIL-*, D-ORDER-*).
//!
//! Every send must end as exactly one confirmed entry or none at all,
//! whatever happens to its echo and its durable write.

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use murmur_sync_core::ConnectionState;
    use murmur_sync_types::{PeerId, ServerId, ServerMessage, SyncError};
    use tokio::time::Instant;

    use crate::assertions::{
        assert_all_confirmed, assert_contents, assert_no_duplicates, assert_same_contents,
    };
    use crate::harness::{message_from, ChaosHarness, LOCAL_USER};

    fn echo(id: &str, content: &str) -> ServerMessage {
        ServerMessage {
            id: ServerId::new(id),
            sender_id: PeerId::new(LOCAL_USER),
            receiver_id: Some(PeerId::new("bob")),
            group_id: None,
            content: content.into(),
            created_at: 1_700_000_000_001,
            read: false,
        }
    }

    async fn talking_to_bob() -> ChaosHarness {
        let chaos = ChaosHarness::new();
        chaos.connect().await.unwrap();
        chaos.open_conversation("bob").await.unwrap();
        chaos
    }

    // ========================================================================
    // D-ECHO-* Echo Loss and Duplication
    // ========================================================================

    /// D-ECHO-01: Echo never arrives, durable write settles after the grace window.
    #[tokio::test(start_paused = true)]
    async fn d_echo_01_lost_echo_settles_by_durable_write() {
        let chaos = talking_to_bob().await;
        let start = Instant::now();

        let saved = chaos.facade().send_message("hello?").await.unwrap();

        assert!(start.elapsed() >= Duration::from_secs(1));
        chaos.settle().await;
        let messages = chaos.snapshot().messages;
        assert!(assert_all_confirmed(&messages).passed);
        assert!(assert_contents(&messages, &["hello?"]).passed);
        assert_eq!(messages[0].server_id, Some(saved.id));
    }

    /// D-ECHO-02: The echo is delivered five times before the write completes.
    #[tokio::test(start_paused = true)]
    async fn d_echo_02_echo_storm_is_idempotent() {
        let chaos = talking_to_bob().await;
        chaos.persistence().set_send_delay(Duration::from_millis(300));

        let facade = chaos.facade().clone();
        let sending = tokio::spawn(async move { facade.send_message("hi").await });
        chaos.settle().await;
        for _ in 0..5 {
            chaos.deliver(&echo("srv-1", "hi"));
        }
        sending.await.unwrap().unwrap();
        chaos.settle().await;

        let messages = chaos.snapshot().messages;
        assert!(assert_no_duplicates(&messages).passed);
        assert!(assert_all_confirmed(&messages).passed);
        assert_eq!(messages.len(), 1);
    }

    /// D-ECHO-03: Echo arrives only after the durable fallback confirmed the entry.
    #[tokio::test(start_paused = true)]
    async fn d_echo_03_late_echo_is_dropped() {
        let chaos = talking_to_bob().await;

        let saved = chaos.facade().send_message("hi").await.unwrap();
        chaos.deliver(&saved);
        chaos.deliver(&saved);
        chaos.settle().await;

        let messages = chaos.snapshot().messages;
        assert!(assert_no_duplicates(&messages).passed);
        assert_eq!(messages.len(), 1);
    }

    // ========================================================================
    // D-DROP-* Connection Loss During Send
    // ========================================================================

    /// D-DROP-01: Connection drops while the durable write is in flight.
    #[tokio::test(start_paused = true)]
    async fn d_drop_01_drop_mid_send_still_confirms() {
        let chaos = talking_to_bob().await;
        chaos.persistence().set_send_delay(Duration::from_secs(2));

        let facade = chaos.facade().clone();
        let sending = tokio::spawn(async move { facade.send_message("bye").await });
        chaos.settle().await;
        chaos.drop_connection();

        sending.await.unwrap().unwrap();
        chaos
            .wait_for_state(|s| *s == ConnectionState::Connected)
            .await
            .unwrap();
        chaos.settle().await;

        let messages = chaos.snapshot().messages;
        assert!(assert_all_confirmed(&messages).passed);
        assert!(assert_contents(&messages, &["bye"]).passed);
    }

    // ========================================================================
    // D-BURST-* Concurrent Sends
    // ========================================================================

    /// D-BURST-01: Ten concurrent sends across a drop, then every echo replayed late.
    #[tokio::test(start_paused = true)]
    async fn d_burst_01_concurrent_sends_settle_once() {
        let chaos = talking_to_bob().await;
        chaos.persistence().set_send_delay(Duration::from_millis(500));
        let contents: Vec<String> = (0..10).map(|i| format!("burst-{}", i)).collect();

        let handles: Vec<_> = contents
            .iter()
            .cloned()
            .map(|content| {
                let facade = chaos.facade().clone();
                tokio::spawn(async move { facade.send_message(&content).await })
            })
            .collect();
        chaos.settle().await;
        assert_eq!(chaos.snapshot().messages.len(), 10);

        chaos.drop_connection();
        chaos.wait_for_recovery().await.unwrap();
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        for record in chaos.persistence().stored() {
            chaos.deliver(&record);
        }
        chaos.settle().await;

        let messages = chaos.snapshot().messages;
        let expected: Vec<&str> = contents.iter().map(String::as_str).collect();
        assert!(assert_no_duplicates(&messages).passed);
        assert!(assert_all_confirmed(&messages).passed);
        assert!(assert_same_contents(&messages, &expected).passed);
    }

    // ========================================================================
    // D-FAIL-* Durable Write Failure
    // ========================================================================

    /// D-FAIL-01: One failed write among successful ones removes only that entry.
    #[tokio::test(start_paused = true)]
    async fn d_fail_01_failed_write_removes_only_its_entry() {
        let chaos = talking_to_bob().await;
        chaos.persistence().fail_next_send("500 Internal Server Error");

        let first = chaos.facade().send_message("first").await;
        let second = chaos.facade().send_message("second").await;

        assert_eq!(
            first,
            Err(SyncError::DurableWriteFailed("500 Internal Server Error".into()))
        );
        assert!(second.is_ok());
        chaos.settle().await;
        assert!(assert_contents(&chaos.snapshot().messages, &["second"]).passed);
    }

    // ========================================================================
    // D-ORDER-* Inbound Ordering
    // ========================================================================

    /// D-ORDER-01: A burst of inbound messages keeps arrival order.
    #[tokio::test(start_paused = true)]
    async fn d_order_01_inbound_order_preserved() {
        let chaos = talking_to_bob().await;
        let contents: Vec<String> = (0..20).map(|i| format!("n-{}", i)).collect();

        for (i, content) in contents.iter().enumerate() {
            chaos.deliver(&message_from("bob", &format!("m-{}", i), content));
        }
        chaos.settle().await;

        let expected: Vec<&str> = contents.iter().map(String::as_str).collect();
        assert!(assert_contents(&chaos.snapshot().messages, &expected).passed);
    }

    /// D-ORDER-02: A burst larger than the event buffer loses nothing.
    #[tokio::test(start_paused = true)]
    async fn d_order_02_burst_beyond_buffer_is_complete() {
        let chaos = talking_to_bob().await;
        let contents: Vec<String> = (0..400).map(|i| format!("n-{}", i)).collect();

        for (i, content) in contents.iter().enumerate() {
            chaos.deliver(&message_from("bob", &format!("m-{}", i), content));
        }
        chaos.settle().await;

        let messages = chaos.snapshot().messages;
        let expected: Vec<&str> = contents.iter().map(String::as_str).collect();
        assert!(assert_no_duplicates(&messages).passed);
        assert!(assert_contents(&messages, &expected).passed);
    }
}
