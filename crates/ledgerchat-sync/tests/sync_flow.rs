//! End-to-end synchronization flows over the in-memory chain
//!
//! Two session identities share one [`MockChain`]; each runs its own
//! store and controller. These tests exercise the full loop: backfill
//! pagination, live event delivery, optimistic send reconciliation,
//! read receipts, deletion, and subscription lifecycle.

use std::sync::Arc;
use std::time::Duration;

use ledgerchat_core::{DeliveryStatus, PeerAddress, XorCodec};
use ledgerchat_sync::{
    ConversationStore, MockChain, RemoteLedger, SyncConfig, SyncController, SyncError,
};

fn addr(last: u8) -> PeerAddress {
    PeerAddress::parse(&format!("0x{}", hex::encode([last; 20]))).unwrap()
}

fn fast_config() -> SyncConfig {
    SyncConfig {
        page_size: 4,
        call_timeout: Duration::from_millis(500),
        retry_backoff: Duration::from_millis(5),
    }
}

/// Build a store + controller pair for one identity on the chain
fn session(chain: &MockChain, local: PeerAddress) -> Arc<SyncController> {
    let codec = Arc::new(XorCodec::new("integration-key"));
    let store = Arc::new(ConversationStore::new(local.clone(), codec.clone()));
    SyncController::new(
        local.clone(),
        Arc::new(chain.client(local)),
        store,
        codec,
        fast_config(),
    )
}

/// Poll until `check` passes or the deadline expires
async fn wait_until<F: Fn() -> bool>(check: F, what: &str) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while !check() {
        if tokio::time::Instant::now() > deadline {
            panic!("timed out waiting for: {}", what);
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

fn cipher(text: &str) -> String {
    use ledgerchat_core::MessageCodec;
    XorCodec::new("integration-key").encrypt(text)
}

#[tokio::test]
async fn test_bootstrap_paginates_full_history() {
    let chain = MockChain::new();
    let alice = addr(1);
    let bob = addr(2);

    // 11 messages with page_size 4: pages of 4, 4, 3
    for i in 0..11 {
        chain.seed(&bob, &alice, &cipher(&format!("msg {}", i)), 1000 + i);
    }

    let controller = session(&chain, alice.clone());
    let report = controller.bootstrap().await.unwrap();

    assert_eq!(report.inserted, 11);
    assert!(report.failed_peers.is_empty());

    let snap = controller.store().snapshot(&bob).unwrap();
    assert_eq!(snap.len(), 11);
    // Chronological, oldest first
    for pair in snap.windows(2) {
        assert!(pair[0].sort_key() < pair[1].sort_key());
    }
}

#[tokio::test]
async fn test_bootstrap_covers_multiple_partners() {
    let chain = MockChain::new();
    let alice = addr(1);

    chain.seed(&addr(2), &alice, &cipher("from bob"), 10);
    chain.seed(&alice, &addr(3), &cipher("to carol"), 20);
    chain.seed(&addr(4), &addr(5), &cipher("unrelated"), 30);

    let controller = session(&chain, alice);
    let report = controller.bootstrap().await.unwrap();

    assert_eq!(report.inserted, 2);
    let mut partners = controller.store().partners().unwrap();
    partners.sort();
    assert_eq!(partners, vec![addr(2), addr(3)]);
}

#[tokio::test]
async fn test_rebootstrap_is_idempotent() {
    let chain = MockChain::new();
    let alice = addr(1);
    let bob = addr(2);

    for i in 0..6 {
        chain.seed(&bob, &alice, &cipher(&format!("m{}", i)), 100 + i);
    }

    let controller = session(&chain, alice);
    assert_eq!(controller.bootstrap().await.unwrap().inserted, 6);
    // Simulated reconnect: the second pass finds nothing new
    assert_eq!(controller.bootstrap().await.unwrap().inserted, 0);
    assert_eq!(controller.store().snapshot(&bob).unwrap().len(), 6);
}

#[tokio::test]
async fn test_live_events_reach_both_sides() {
    let chain = MockChain::new();
    let alice = session(&chain, addr(1));
    let bob = session(&chain, addr(2));

    alice.subscribe();
    bob.subscribe();

    alice.send(&addr(2), "hello bob").await.unwrap();

    wait_until(
        || !bob.store().snapshot(&addr(1)).unwrap().is_empty(),
        "bob to receive the message",
    )
    .await;

    let received = bob.store().snapshot(&addr(1)).unwrap();
    assert_eq!(received[0].body.as_text(), Some("hello bob"));
    assert_eq!(received[0].sender, addr(1));
    // Inbound and unread on bob's side
    assert_eq!(bob.store().unread_peers().unwrap(), vec![addr(1)]);
}

#[tokio::test]
async fn test_optimistic_send_reconciles_to_one_message() {
    let chain = MockChain::new();
    let alice = session(&chain, addr(1));
    alice.subscribe();

    alice.send(&addr(2), "hello").await.unwrap();

    wait_until(
        || {
            let snap = alice.store().snapshot(&addr(2)).unwrap();
            snap.len() == 1 && snap[0].key.is_confirmed()
        },
        "optimistic entry to reconcile into one confirmed message",
    )
    .await;

    let snap = alice.store().snapshot(&addr(2)).unwrap();
    assert_eq!(snap.len(), 1);
    assert_eq!(snap[0].body.as_text(), Some("hello"));
    assert_eq!(snap[0].status, DeliveryStatus::Sent);
}

#[tokio::test]
async fn test_backfill_and_live_delivery_deduplicate() {
    let chain = MockChain::new();
    let alice = session(&chain, addr(1));
    let bob = session(&chain, addr(2));

    alice.subscribe();

    // Delivered live first...
    bob.send(&addr(1), "both paths").await.unwrap();
    wait_until(
        || !alice.store().snapshot(&addr(2)).unwrap().is_empty(),
        "live delivery",
    )
    .await;

    // ...then again via backfill of the same record
    alice.bootstrap().await.unwrap();
    assert_eq!(alice.store().snapshot(&addr(2)).unwrap().len(), 1);
}

#[tokio::test]
async fn test_send_failure_marks_entry_failed() {
    let chain = MockChain::new();
    let alice = session(&chain, addr(1));

    chain.set_unavailable(true);
    let err = alice.send(&addr(2), "doomed").await.unwrap_err();
    assert!(matches!(err, SyncError::SubmissionFailed(_)));

    let snap = alice.store().snapshot(&addr(2)).unwrap();
    assert_eq!(snap.len(), 1);
    assert_eq!(snap[0].status, DeliveryStatus::Failed);
    assert!(!snap[0].key.is_confirmed());
}

#[tokio::test]
async fn test_retry_after_failure_is_a_fresh_message() {
    let chain = MockChain::new();
    let alice = session(&chain, addr(1));
    alice.subscribe();

    chain.set_unavailable(true);
    let _ = alice.send(&addr(2), "take one").await;
    chain.set_unavailable(false);

    alice.send(&addr(2), "take one").await.unwrap();

    wait_until(
        || {
            alice
                .store()
                .snapshot(&addr(2))
                .unwrap()
                .iter()
                .any(|m| m.key.is_confirmed())
        },
        "retried send to confirm",
    )
    .await;

    // The failed entry is retained alongside the confirmed retry
    let snap = alice.store().snapshot(&addr(2)).unwrap();
    assert_eq!(snap.len(), 2);
    assert!(snap.iter().any(|m| m.status == DeliveryStatus::Failed));
    assert!(snap.iter().any(|m| m.status == DeliveryStatus::Sent));
}

#[tokio::test]
async fn test_empty_message_rejected_before_any_call() {
    let chain = MockChain::new();
    let alice = session(&chain, addr(1));

    assert!(matches!(
        alice.send(&addr(2), "   ").await,
        Err(SyncError::EmptyMessage)
    ));
    assert!(alice.store().snapshot(&addr(2)).unwrap().is_empty());
    assert_eq!(chain.record_count(), 0);
}

#[tokio::test]
async fn test_read_receipt_roundtrip() {
    let chain = MockChain::new();
    let alice = session(&chain, addr(1));
    let bob = session(&chain, addr(2));

    alice.subscribe();
    bob.subscribe();

    alice.send(&addr(2), "read me").await.unwrap();
    wait_until(
        || !bob.store().snapshot(&addr(1)).unwrap().is_empty(),
        "delivery to bob",
    )
    .await;

    let report = bob.mark_read(&addr(1)).await.unwrap();
    assert_eq!(report.acknowledged, 1);
    assert!(report.failed.is_empty());
    assert!(bob.store().unread_peers().unwrap().is_empty());

    // The receipt event flows back to the sender
    wait_until(
        || {
            alice
                .store()
                .snapshot(&addr(2))
                .unwrap()
                .first()
                .is_some_and(|m| m.is_read)
        },
        "read receipt to reach alice",
    )
    .await;
}

#[tokio::test]
async fn test_read_receipt_failures_are_collected() {
    let chain = MockChain::new();
    let alice = session(&chain, addr(1));
    let bob = session(&chain, addr(2));

    alice.send(&addr(2), "one").await.unwrap();
    alice.send(&addr(2), "two").await.unwrap();
    bob.bootstrap().await.unwrap();

    chain.set_unavailable(true);
    let report = bob.mark_read(&addr(1)).await.unwrap();
    assert_eq!(report.acknowledged, 0);
    assert_eq!(report.failed.len(), 2);

    // Best effort: a later pass can still succeed
    chain.set_unavailable(false);
    let report = bob.mark_read(&addr(1)).await.unwrap();
    assert_eq!(report.acknowledged, 2);
}

#[tokio::test]
async fn test_deletion_propagates_and_tombstones() {
    let chain = MockChain::new();
    let alice = session(&chain, addr(1));
    let bob = session(&chain, addr(2));

    alice.subscribe();
    bob.subscribe();

    let id = alice.send(&addr(2), "retract this").await.unwrap();
    wait_until(
        || !bob.store().snapshot(&addr(1)).unwrap().is_empty(),
        "delivery to bob",
    )
    .await;

    chain.client(addr(1)).delete(id).await.unwrap();

    wait_until(
        || bob.store().snapshot(&addr(1)).unwrap().is_empty(),
        "deletion to reach bob",
    )
    .await;

    // A fresh backfill cannot resurrect the tombstoned id
    bob.bootstrap().await.unwrap();
    assert!(bob.store().snapshot(&addr(1)).unwrap().is_empty());
}

#[tokio::test]
async fn test_unsubscribe_stops_delivery() {
    let chain = MockChain::new();
    let alice = session(&chain, addr(1));
    let bob = session(&chain, addr(2));

    alice.subscribe();
    alice.unsubscribe();

    bob.send(&addr(1), "into the void").await.unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(alice.store().snapshot(&addr(2)).unwrap().is_empty());

    // Resubscribing alone recovers the missed message; no manual
    // bootstrap call required
    alice.subscribe();
    wait_until(
        || alice.store().snapshot(&addr(2)).unwrap().len() == 1,
        "resubscription to backfill the missed message",
    )
    .await;
}

#[tokio::test]
async fn test_resubscribe_does_not_duplicate_handlers() {
    let chain = MockChain::new();
    let alice = session(&chain, addr(1));
    let bob = session(&chain, addr(2));

    // Repeated subscription churn must leave exactly one live handler
    for _ in 0..5 {
        alice.subscribe();
    }

    bob.send(&addr(1), "once only").await.unwrap();
    wait_until(
        || !alice.store().snapshot(&addr(2)).unwrap().is_empty(),
        "delivery after resubscribe churn",
    )
    .await;

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(alice.store().snapshot(&addr(2)).unwrap().len(), 1);
}

#[tokio::test]
async fn test_event_stream_overflow_recovers_via_backfill() {
    // Tiny channel: a burst overflows the subscriber before its task
    // runs, dropping the oldest events from the stream
    let chain = MockChain::with_capacity(1);
    let alice = session(&chain, addr(1));
    let bob = session(&chain, addr(2));

    bob.subscribe();

    for i in 0..5 {
        alice.send(&addr(2), &format!("burst {}", i)).await.unwrap();
    }

    // The dropped events are unrecoverable from the stream; only the
    // gap-triggered backfill can deliver the full conversation
    wait_until(
        || bob.store().snapshot(&addr(1)).unwrap().len() == 5,
        "missed messages to arrive via gap-triggered backfill",
    )
    .await;

    let snap = bob.store().snapshot(&addr(1)).unwrap();
    for pair in snap.windows(2) {
        assert!(pair[0].sort_key() < pair[1].sort_key());
    }
}

#[tokio::test]
async fn test_bootstrap_fails_when_chain_down() {
    let chain = MockChain::new();
    let alice = session(&chain, addr(1));

    chain.set_unavailable(true);
    assert!(matches!(
        alice.bootstrap().await,
        Err(SyncError::RemoteUnavailable(_))
    ));

    // The session survives; a later pass succeeds
    chain.set_unavailable(false);
    chain.seed(&addr(2), &addr(1), &cipher("late"), 100);
    assert_eq!(alice.bootstrap().await.unwrap().inserted, 1);
}

#[tokio::test]
async fn test_transient_failure_recovers_via_retry() {
    let chain = MockChain::new();
    let alice = session(&chain, addr(1));
    alice.subscribe();

    // Flip the chain back up mid-send, inside the retry window
    chain.set_unavailable(true);
    let chain2 = chain.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(2)).await;
        chain2.set_unavailable(false);
    });

    alice.send(&addr(2), "eventually").await.unwrap();
    wait_until(
        || {
            let snap = alice.store().snapshot(&addr(2)).unwrap();
            snap.len() == 1 && snap[0].key.is_confirmed()
        },
        "retried send to land",
    )
    .await;
}
