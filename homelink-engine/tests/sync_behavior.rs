//! Conversation synchronizer behavior
//!
//! Drives the sync service through the stub remote store: live snapshots,
//! pull backstop, nudges, duplicate-room collapsing, stale-pass suppression
//! and cancellation.

use homelink_engine::remote::stubs::{stub_pair, StubConversationStore, StubListingApi};
use homelink_engine::{
    ConversationViewItem, IdentityResolver, ListingId, MessageRecord, Role, RoomId, RoomSummary,
    SyncConfig, SyncService, UserId,
};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::timeout;

fn room(room_id: &str, listing: &str, buyer: &str, owner: &str, activity: i64) -> RoomSummary {
    RoomSummary {
        room_id: RoomId::from(room_id),
        listing_id: ListingId::from(listing),
        buyer_id: UserId::from(buyer),
        owner_id: UserId::from(owner),
        owner_role: Role::Seller,
        participant_ids: BTreeSet::from([UserId::from(buyer), UserId::from(owner)]),
        display_names: BTreeMap::new(),
        avatar_urls: BTreeMap::new(),
        last_message_preview: "from summary".to_string(),
        last_activity_at: activity,
        read_status: BTreeMap::new(),
    }
}

fn message(room_id: &str, sender: &str, text: &str, sent_at: i64) -> MessageRecord {
    MessageRecord {
        message_id: format!("m-{}-{}", room_id, sent_at),
        room_id: RoomId::from(room_id),
        sender_id: UserId::from(sender),
        sender_name: None,
        text: text.to_string(),
        sent_at,
    }
}

fn service(
    conversations: &Arc<StubConversationStore>,
    listings: &Arc<StubListingApi>,
) -> SyncService {
    let identity = Arc::new(IdentityResolver::new(
        conversations.clone(),
        listings.clone(),
    ));
    SyncService::new(conversations.clone(), identity, SyncConfig::default())
}

async fn next_view(
    rx: &mut watch::Receiver<Vec<ConversationViewItem>>,
) -> Vec<ConversationViewItem> {
    timeout(Duration::from_secs(2), rx.changed())
        .await
        .expect("view update timed out")
        .expect("view channel closed");
    rx.borrow().clone()
}

#[tokio::test]
async fn duplicate_rooms_collapse_to_freshest_message() {
    let (conversations, listings) = stub_pair();
    let me = UserId::from("me");

    // Two rooms for the same (seller-1, l1) relationship. r1's summary field
    // claims it is newer, but r2's actual latest message is the freshest.
    conversations
        .set_rooms(vec![
            room("r1", "l1", "me", "seller-1", 400),
            room("r2", "l1", "me", "seller-1", 100),
        ])
        .await;
    conversations
        .set_messages(
            RoomId::from("r1"),
            vec![message("r1", "seller-1", "older reply", 300)],
        )
        .await;
    conversations
        .set_messages(
            RoomId::from("r2"),
            vec![message("r2", "seller-1", "newest reply", 900)],
        )
        .await;

    let service = service(&conversations, &listings);
    let handle = service.start(me, Role::Buyer).await.unwrap();
    let mut rx = handle.view();

    let view = next_view(&mut rx).await;
    assert_eq!(view.len(), 1);
    assert_eq!(view[0].room_id.as_str(), "r2");
    assert_eq!(view[0].last_activity_at, 900);
    assert_eq!(view[0].last_message_preview, "newest reply");
    assert_eq!(view[0].unread, 1);
}

#[tokio::test]
async fn live_snapshot_updates_published_view() {
    let (conversations, listings) = stub_pair();
    let service = service(&conversations, &listings);
    let handle = service.start(UserId::from("me"), Role::Buyer).await.unwrap();
    let mut rx = handle.view();

    // Initial pull backstop publishes the empty account.
    let initial = next_view(&mut rx).await;
    assert!(initial.is_empty());

    conversations
        .push_room(room("r1", "l1", "me", "seller-1", 100))
        .await;
    conversations.emit_snapshot().await;

    let view = next_view(&mut rx).await;
    assert_eq!(view.len(), 1);
    assert_eq!(view[0].listing_id.as_str(), "l1");
}

#[tokio::test]
async fn nudge_triggers_a_pull_pass() {
    let (conversations, listings) = stub_pair();
    let service = service(&conversations, &listings);
    let handle = service.start(UserId::from("me"), Role::Buyer).await.unwrap();
    let mut rx = handle.view();
    next_view(&mut rx).await; // initial empty publish

    // The push signal carries no payload; it only kicks a reconciliation.
    conversations
        .push_room(room("r1", "l1", "me", "seller-1", 100))
        .await;
    handle.nudge().await;

    let view = next_view(&mut rx).await;
    assert_eq!(view.len(), 1);
    assert_eq!(view[0].room_id.as_str(), "r1");
}

#[tokio::test]
async fn stale_pass_cannot_overwrite_newer_result() {
    let (conversations, listings) = stub_pair();
    let service = service(&conversations, &listings);
    let handle = service.start(UserId::from("me"), Role::Buyer).await.unwrap();
    let mut rx = handle.view();
    next_view(&mut rx).await; // initial empty publish

    // Pass A sees the slow room and stalls in its latest-message fetch.
    let slow = room("ra", "l1", "me", "seller-1", 100);
    conversations
        .delay_latest_message(RoomId::from("ra"), Duration::from_millis(300))
        .await;
    conversations.set_rooms(vec![slow]).await;
    conversations.emit_snapshot().await;

    // Pass B starts later, finishes first.
    conversations
        .set_rooms(vec![room("rb", "l2", "me", "seller-2", 200)])
        .await;
    conversations.emit_snapshot().await;

    let view = next_view(&mut rx).await;
    assert_eq!(view.len(), 1);
    assert_eq!(view[0].room_id.as_str(), "rb");

    // Pass A completes afterwards and must be discarded.
    tokio::time::sleep(Duration::from_millis(500)).await;
    let current = handle.current();
    assert_eq!(current.len(), 1);
    assert_eq!(current[0].room_id.as_str(), "rb");
}

#[tokio::test]
async fn stop_discards_in_flight_pass() {
    let (conversations, listings) = stub_pair();
    let service = service(&conversations, &listings);
    let handle = service.start(UserId::from("me"), Role::Buyer).await.unwrap();
    let mut rx = handle.view();
    next_view(&mut rx).await; // initial empty publish

    conversations
        .delay_latest_message(RoomId::from("ra"), Duration::from_millis(200))
        .await;
    conversations
        .set_rooms(vec![room("ra", "l1", "me", "seller-1", 100)])
        .await;
    conversations.emit_snapshot().await;

    tokio::time::sleep(Duration::from_millis(50)).await;
    handle.stop();
    handle.stop(); // idempotent

    tokio::time::sleep(Duration::from_millis(400)).await;
    assert!(handle.current().is_empty());
}

#[tokio::test]
async fn seller_sees_rooms_via_participant_fallback() {
    let (conversations, listings) = stub_pair();
    let me = UserId::from("agent-1");

    // The receiver field on this historical room is wrong, but the
    // participant set includes the agent.
    let mut inconsistent = room("r1", "l1", "buyer-1", "someone-else", 100);
    inconsistent.participant_ids.insert(me.clone());
    conversations.set_rooms(vec![inconsistent]).await;

    let service = service(&conversations, &listings);
    let handle = service.start(me, Role::Agent).await.unwrap();
    let mut rx = handle.view();

    let view = next_view(&mut rx).await;
    assert_eq!(view.len(), 1);
    // The counterparty from the agent's side is the buyer.
    assert_eq!(view[0].counterparty.id.as_str(), "buyer-1");
}

#[tokio::test]
async fn restart_serves_the_new_identity_only() {
    let (conversations, listings) = stub_pair();
    conversations
        .set_rooms(vec![
            room("r1", "l1", "user-a", "seller-1", 100),
            room("r2", "l2", "user-b", "seller-2", 200),
        ])
        .await;

    let service = service(&conversations, &listings);
    let handle = service
        .start(UserId::from("user-a"), Role::Buyer)
        .await
        .unwrap();
    let mut rx = handle.view();
    let view = next_view(&mut rx).await;
    assert_eq!(view.len(), 1);
    assert_eq!(view[0].room_id.as_str(), "r1");

    let new_handle = service
        .restart(handle, UserId::from("user-b"), Role::Buyer)
        .await
        .unwrap();
    let mut new_rx = new_handle.view();
    let view = next_view(&mut new_rx).await;
    assert_eq!(view.len(), 1);
    assert_eq!(view[0].room_id.as_str(), "r2");
}

#[tokio::test]
async fn failed_pull_keeps_last_good_view() {
    let (conversations, listings) = stub_pair();
    conversations
        .set_rooms(vec![room("r1", "l1", "me", "seller-1", 100)])
        .await;

    let service = service(&conversations, &listings);
    let handle = service.start(UserId::from("me"), Role::Buyer).await.unwrap();
    let mut rx = handle.view();
    let view = next_view(&mut rx).await;
    assert_eq!(view.len(), 1);

    conversations.fail_pulls(true);
    handle.nudge().await;
    tokio::time::sleep(Duration::from_millis(100)).await;

    // The failed pass must not clear the previously published list.
    assert_eq!(handle.current().len(), 1);
}
