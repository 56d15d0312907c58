//! Presence chaos scenarios (P-TYPE-*, P-DISC-*, P-SNAP-*).
//!
//! Lost and reordered presence and typing signals.

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use murmur_sync_types::{InboundEvent, PeerId};

    use crate::harness::ChaosHarness;

    fn bob_typing() -> InboundEvent {
        InboundEvent::UserTyping {
            user_id: PeerId::new("bob"),
            group_id: None,
        }
    }

    async fn talking_to_bob() -> ChaosHarness {
        let chaos = ChaosHarness::new();
        chaos.connect().await.unwrap();
        chaos.open_conversation("bob").await.unwrap();
        chaos
    }

    // ========================================================================
    // P-TYPE-* Typing Signals
    // ========================================================================

    /// P-TYPE-01: The stop signal is lost, the indicator expires on its own.
    #[tokio::test(start_paused = true)]
    async fn p_type_01_lost_stop_expires() {
        let chaos = talking_to_bob().await;

        chaos.push(&bob_typing());
        chaos.settle().await;
        assert_eq!(chaos.snapshot().typing_ids, vec![PeerId::new("bob")]);

        tokio::time::sleep(Duration::from_secs(4)).await;
        assert!(chaos.snapshot().typing_ids.is_empty());
    }

    /// P-TYPE-02: Repeated typing signals keep the indicator alive past the expiry.
    #[tokio::test(start_paused = true)]
    async fn p_type_02_refreshed_typing_stays_visible() {
        let chaos = talking_to_bob().await;

        for _ in 0..5 {
            chaos.push(&bob_typing());
            tokio::time::sleep(Duration::from_secs(2)).await;
            assert_eq!(chaos.snapshot().typing_ids, vec![PeerId::new("bob")]);
        }

        chaos.push(&InboundEvent::UserStoppedTyping {
            user_id: PeerId::new("bob"),
            group_id: None,
        });
        chaos.settle().await;
        assert!(chaos.snapshot().typing_ids.is_empty());
    }

    // ========================================================================
    // P-DISC-* Peer Disconnect
    // ========================================================================

    /// P-DISC-01: A peer disconnects mid-typing; no stop signal ever arrives.
    #[tokio::test(start_paused = true)]
    async fn p_disc_01_disconnect_clears_typing() {
        let chaos = talking_to_bob().await;
        chaos.push(&InboundEvent::OnlineUsers(vec![
            PeerId::new("bob"),
            PeerId::new("carol"),
        ]));
        chaos.push(&bob_typing());
        chaos.settle().await;

        chaos.push(&InboundEvent::UserDisconnected(PeerId::new("bob")));
        chaos.settle().await;

        let snapshot = chaos.snapshot();
        assert!(snapshot.typing_ids.is_empty());
        assert_eq!(snapshot.online_ids, vec![PeerId::new("carol")]);
    }

    // ========================================================================
    // P-SNAP-* Roster Snapshots
    // ========================================================================

    /// P-SNAP-01: The roster sent after a reconnect replaces the stale one.
    #[tokio::test(start_paused = true)]
    async fn p_snap_01_snapshot_after_reconnect_replaces_roster() {
        let chaos = talking_to_bob().await;
        chaos.push(&InboundEvent::OnlineUsers(vec![
            PeerId::new("bob"),
            PeerId::new("carol"),
        ]));
        chaos.settle().await;

        chaos.drop_connection();
        chaos.wait_for_recovery().await.unwrap();
        chaos.push(&InboundEvent::OnlineUsers(vec![PeerId::new("carol")]));
        chaos.settle().await;

        assert_eq!(chaos.snapshot().online_ids, vec![PeerId::new("carol")]);
    }
}
