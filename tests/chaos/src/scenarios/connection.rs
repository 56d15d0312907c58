//! Connection chaos scenarios (C-FLAP-*, C-OUT-*, C-CANCEL-*).
//!
//! Drops and outages against the reconnect loop.

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use murmur_sync_core::ConnectionState;
    use murmur_sync_types::SyncError;

    use crate::harness::{message_from, ChaosHarness};

    // ========================================================================
    // C-FLAP-* Flapping Connection
    // ========================================================================

    /// C-FLAP-01: Three drops in a row, each recovered, session intact.
    #[tokio::test(start_paused = true)]
    async fn c_flap_01_repeated_drops_recover() {
        let chaos = ChaosHarness::new();
        chaos.connect().await.unwrap();
        chaos.open_conversation("bob").await.unwrap();

        for _ in 0..3 {
            chaos.drop_connection();
            chaos.wait_for_recovery().await.unwrap();
        }
        chaos.deliver(&message_from("bob", "m-1", "still here"));
        chaos.settle().await;

        assert_eq!(chaos.transport().open_calls(), 4);
        let snapshot = chaos.snapshot();
        assert_eq!(snapshot.connection_state, ConnectionState::Connected);
        assert_eq!(snapshot.messages.len(), 1);
    }

    // ========================================================================
    // C-OUT-* Server Outage
    // ========================================================================

    /// C-OUT-01: Outage shorter than the retry budget, reconnects.
    #[tokio::test(start_paused = true)]
    async fn c_out_01_transient_outage_recovers() {
        let chaos = ChaosHarness::new();
        chaos.connect().await.unwrap();
        chaos.transport().fail_connects(3, "connection refused");

        chaos.drop_connection();
        chaos.wait_for_recovery().await.unwrap();

        // 1 initial + 3 refused + 1 successful
        assert_eq!(chaos.transport().open_calls(), 5);
        assert_eq!(chaos.facade().connection().status().error, None);
    }

    /// C-OUT-02: Outage outlasting the retry budget, durable path still works,
    /// explicit connect recovers.
    #[tokio::test(start_paused = true)]
    async fn c_out_02_permanent_outage_fails() {
        let chaos = ChaosHarness::new();
        chaos.connect().await.unwrap();
        chaos.open_conversation("bob").await.unwrap();
        chaos.transport().fail_connects(5, "connection refused");

        chaos.drop_connection();
        chaos
            .wait_for_state(|s| *s == ConnectionState::Failed)
            .await
            .unwrap();

        assert_eq!(
            chaos.facade().connection().status().error,
            Some(SyncError::ReconnectExhausted { attempts: 5 })
        );

        // Live delivery is down; the durable write still lands
        let saved = chaos.facade().send_message("offline").await.unwrap();
        assert_eq!(saved.content, "offline");

        chaos.connect().await.unwrap();
        let snapshot = chaos.snapshot();
        assert_eq!(snapshot.connection_state, ConnectionState::Connected);
        assert_eq!(snapshot.messages.len(), 1);
        assert_eq!(chaos.transport().open_calls(), 7);
    }

    // ========================================================================
    // C-CANCEL-* Cancellation
    // ========================================================================

    /// C-CANCEL-01: Disconnect during an outage stops all retries.
    #[tokio::test(start_paused = true)]
    async fn c_cancel_01_disconnect_during_outage() {
        let chaos = ChaosHarness::new();
        chaos.connect().await.unwrap();
        chaos.transport().fail_connects(10, "connection refused");

        chaos.drop_connection();
        chaos
            .wait_for_state(|s| matches!(s, ConnectionState::Reconnecting { .. }))
            .await
            .unwrap();
        let calls = chaos.transport().open_calls();

        chaos.facade().disconnect().await;
        tokio::time::sleep(Duration::from_secs(60)).await;

        assert_eq!(chaos.transport().open_calls(), calls);
        assert_eq!(
            chaos.snapshot().connection_state,
            ConnectionState::Disconnected
        );
    }
}
