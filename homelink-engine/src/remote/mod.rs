//! Remote Collaborator Seams
//!
//! The engine talks to two remote systems: the real-time conversation store
//! (a document-per-room collection with per-room message sub-collections and
//! live subscription semantics) and the listing/inquiry REST API. Both are
//! eventually consistent; the engine tolerates serving a slightly stale list
//! between feed emissions.
//!
//! Shipped implementations live in [`stubs`]: injectable in-memory fakes used
//! by the test suite and by the agent binary when no backend is configured.

pub mod stubs;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::Result;
use crate::model::{InquiryRecord, ListingId, MessageRecord, ReadStatus, RoomId, RoomSummary, UserId};

pub use stubs::{StubConversationStore, StubListingApi};

/// Real-time conversation store (consumed)
///
/// The live feed delivers full snapshots of the user's rooms over time rather
/// than deltas; every emission is fed into one reconciliation pipeline
/// together with the one-shot pull fetch.
#[async_trait]
pub trait ConversationStore: Send + Sync {
    /// One-shot pull of every room where `user` is a participant
    async fn rooms_for_participant(&self, user: &UserId) -> Result<Vec<RoomSummary>>;

    /// Live snapshot feed for `user`'s rooms
    async fn subscribe(&self, user: &UserId) -> Result<mpsc::Receiver<Vec<RoomSummary>>>;

    /// Fresh fetch of a single room record
    async fn fetch_room(&self, room: &RoomId) -> Result<Option<RoomSummary>>;

    /// The single most recent message in a room, if any
    async fn latest_message(&self, room: &RoomId) -> Result<Option<MessageRecord>>;

    /// Most recent messages in a room, newest first
    async fn recent_messages(&self, room: &RoomId, limit: usize) -> Result<Vec<MessageRecord>>;

    /// Best-effort write-back of a resolved counterparty display name onto
    /// the room record
    async fn write_back_counterparty_name(
        &self,
        room: &RoomId,
        counterparty: &UserId,
        name: &str,
    ) -> Result<()>;

    /// Write `user`'s read marker on a room
    async fn set_read_status(&self, room: &RoomId, user: &UserId, status: ReadStatus)
        -> Result<()>;
}

/// Listing/inquiry REST API (consumed)
///
/// Inquiry lists are scoped to the authenticated seller/agent; the identity
/// resolver filters them by buyer and listing.
#[async_trait]
pub trait ListingApi: Send + Sync {
    /// Inquiries received for one listing
    async fn inquiries_for_listing(&self, listing: &ListingId) -> Result<Vec<InquiryRecord>>;

    /// All inquiries received by the authenticated user, across listings
    async fn inquiries(&self) -> Result<Vec<InquiryRecord>>;
}
