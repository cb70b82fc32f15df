//! In-memory remote fakes
//!
//! Injectable implementations of [`ConversationStore`] and [`ListingApi`]
//! backed by plain collections. Tests drive the live feed by mutating the
//! room set and calling [`StubConversationStore::emit_snapshot`]; call
//! counters let tests assert which tiers of a fallback chain actually ran.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, RwLock};

use crate::error::{EngineError, Result};
use crate::model::{
    InquiryRecord, ListingId, MessageRecord, ReadStatus, RoomId, RoomSummary, UserId,
};
use crate::remote::{ConversationStore, ListingApi};

/// In-memory conversation store
#[derive(Default)]
pub struct StubConversationStore {
    rooms: RwLock<Vec<RoomSummary>>,
    messages: RwLock<HashMap<RoomId, Vec<MessageRecord>>>,
    subscribers: RwLock<Vec<mpsc::Sender<Vec<RoomSummary>>>>,
    /// Artificial latency applied to `latest_message` for specific rooms,
    /// used to interleave reconciliation passes deterministically
    message_delays: RwLock<HashMap<RoomId, Duration>>,
    name_write_backs: RwLock<Vec<(RoomId, UserId, String)>>,
    fetch_room_calls: AtomicUsize,
    fail_pulls: AtomicBool,
}

impl StubConversationStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn set_rooms(&self, rooms: Vec<RoomSummary>) {
        *self.rooms.write().await = rooms;
    }

    pub async fn push_room(&self, room: RoomSummary) {
        self.rooms.write().await.push(room);
    }

    pub async fn set_messages(&self, room: RoomId, mut messages: Vec<MessageRecord>) {
        messages.sort_by(|a, b| b.sent_at.cmp(&a.sent_at));
        self.messages.write().await.insert(room, messages);
    }

    /// Deliver the current room set to every live subscriber
    pub async fn emit_snapshot(&self) {
        let snapshot = self.rooms.read().await.clone();
        let subscribers = self.subscribers.read().await;
        for tx in subscribers.iter() {
            let _ = tx.send(snapshot.clone()).await;
        }
    }

    pub async fn delay_latest_message(&self, room: RoomId, delay: Duration) {
        self.message_delays.write().await.insert(room, delay);
    }

    pub fn fail_pulls(&self, fail: bool) {
        self.fail_pulls.store(fail, Ordering::SeqCst);
    }

    pub fn fetch_room_calls(&self) -> usize {
        self.fetch_room_calls.load(Ordering::SeqCst)
    }

    /// Names written back by the identity resolver, in call order
    pub async fn name_write_backs(&self) -> Vec<(RoomId, UserId, String)> {
        self.name_write_backs.read().await.clone()
    }
}

#[async_trait]
impl ConversationStore for StubConversationStore {
    async fn rooms_for_participant(&self, user: &UserId) -> Result<Vec<RoomSummary>> {
        if self.fail_pulls.load(Ordering::SeqCst) {
            return Err(EngineError::Remote("injected pull failure".to_string()));
        }
        Ok(self
            .rooms
            .read()
            .await
            .iter()
            .filter(|room| room.participant_ids.contains(user))
            .cloned()
            .collect())
    }

    async fn subscribe(&self, _user: &UserId) -> Result<mpsc::Receiver<Vec<RoomSummary>>> {
        let (tx, rx) = mpsc::channel(16);
        self.subscribers.write().await.push(tx);
        Ok(rx)
    }

    async fn fetch_room(&self, room: &RoomId) -> Result<Option<RoomSummary>> {
        self.fetch_room_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .rooms
            .read()
            .await
            .iter()
            .find(|r| r.room_id == *room)
            .cloned())
    }

    async fn latest_message(&self, room: &RoomId) -> Result<Option<MessageRecord>> {
        let delay = self.message_delays.read().await.get(room).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        Ok(self
            .messages
            .read()
            .await
            .get(room)
            .and_then(|msgs| msgs.first().cloned()))
    }

    async fn recent_messages(&self, room: &RoomId, limit: usize) -> Result<Vec<MessageRecord>> {
        Ok(self
            .messages
            .read()
            .await
            .get(room)
            .map(|msgs| msgs.iter().take(limit).cloned().collect())
            .unwrap_or_default())
    }

    async fn write_back_counterparty_name(
        &self,
        room: &RoomId,
        counterparty: &UserId,
        name: &str,
    ) -> Result<()> {
        self.name_write_backs
            .write()
            .await
            .push((room.clone(), counterparty.clone(), name.to_string()));
        let mut rooms = self.rooms.write().await;
        if let Some(record) = rooms.iter_mut().find(|r| r.room_id == *room) {
            record
                .display_names
                .insert(counterparty.clone(), name.to_string());
        }
        Ok(())
    }

    async fn set_read_status(
        &self,
        room: &RoomId,
        user: &UserId,
        status: ReadStatus,
    ) -> Result<()> {
        let mut rooms = self.rooms.write().await;
        let record = rooms
            .iter_mut()
            .find(|r| r.room_id == *room)
            .ok_or_else(|| EngineError::Remote(format!("unknown room {}", room)))?;
        record.read_status.insert(user.clone(), status);
        Ok(())
    }
}

/// In-memory listing/inquiry API
#[derive(Default)]
pub struct StubListingApi {
    inquiries: RwLock<Vec<InquiryRecord>>,
    calls: AtomicUsize,
}

impl StubListingApi {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn set_inquiries(&self, inquiries: Vec<InquiryRecord>) {
        *self.inquiries.write().await = inquiries;
    }

    /// Total inquiry fetches across both endpoints
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ListingApi for StubListingApi {
    async fn inquiries_for_listing(&self, listing: &ListingId) -> Result<Vec<InquiryRecord>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .inquiries
            .read()
            .await
            .iter()
            .filter(|inquiry| inquiry.listing_id == *listing)
            .cloned()
            .collect())
    }

    async fn inquiries(&self) -> Result<Vec<InquiryRecord>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.inquiries.read().await.clone())
    }
}

/// Convenience constructor used across the test suite
pub fn stub_pair() -> (Arc<StubConversationStore>, Arc<StubListingApi>) {
    (
        Arc::new(StubConversationStore::new()),
        Arc::new(StubListingApi::new()),
    )
}
