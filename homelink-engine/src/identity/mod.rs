//! Identity Resolver
//!
//! Resolves a human-readable counterparty name/avatar through an ordered
//! fallback chain, short-circuiting at the first usable hit:
//!
//! 1. process-lifetime cache by counterparty id
//! 2. name embedded in the already-fetched room summary
//! 3. fresh fetch of the remote room record (the feed may have delivered a
//!    stale snapshot before a concurrent writer set the name)
//! 4. the counterparty's inquiry records for the same listing, then any
//!    listing
//! 5. sender display names scanned from the room's message history
//! 6. placeholder label `Counterparty #<id>` — the UI never shows an empty
//!    name
//!
//! Names found at tiers 4–5 are written back onto the room record
//! fire-and-forget so the next resolution hits tier 2 everywhere. Candidate
//! names that look like raw ids or like the placeholder are rejected and the
//! chain continues.
//!
//! Resolution never blocks the room-list render and never fails; exhausting
//! every tier degrades to the placeholder.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

use crate::error::EngineError;
use crate::model::{CounterpartyProfile, InquiryRecord, RoomId, RoomSummary, UserId};
use crate::remote::{ConversationStore, ListingApi};

/// Prefix of the generic fallback label
pub const PLACEHOLDER_PREFIX: &str = "Counterparty #";

/// Longest all-digit string still treated as an id rather than a name
const MAX_NUMERIC_ID_LEN: usize = 16;

/// Multi-tier counterparty name/avatar resolver with a process-lifetime cache
pub struct IdentityResolver {
    conversations: Arc<dyn ConversationStore>,
    listings: Arc<dyn ListingApi>,
    cache: RwLock<HashMap<UserId, CounterpartyProfile>>,
}

impl IdentityResolver {
    pub fn new(conversations: Arc<dyn ConversationStore>, listings: Arc<dyn ListingApi>) -> Self {
        Self {
            conversations,
            listings,
            cache: RwLock::new(HashMap::new()),
        }
    }

    /// Drop every cached profile; called on identity/role change
    pub async fn invalidate(&self) {
        self.cache.write().await.clear();
        debug!("identity cache invalidated");
    }

    /// Resolve the display profile for `counterparty` in the context of `room`
    pub async fn resolve(&self, counterparty: &UserId, room: &RoomSummary) -> CounterpartyProfile {
        if let Some(cached) = self.cache.read().await.get(counterparty) {
            return cached.clone();
        }

        if let Some(name) = room
            .embedded_name(counterparty)
            .filter(|name| is_plausible_name(name))
        {
            let profile = CounterpartyProfile {
                id: counterparty.clone(),
                display_name: name.to_string(),
                avatar_url: room.embedded_avatar(counterparty).map(str::to_string),
            };
            return self.remember(profile).await;
        }

        if let Some(profile) = self.from_fresh_room(counterparty, &room.room_id).await {
            return self.remember(profile).await;
        }

        if let Some(name) = self.from_inquiries(counterparty, room).await {
            self.write_back(&room.room_id, counterparty, &name);
            let profile = CounterpartyProfile {
                id: counterparty.clone(),
                display_name: name,
                avatar_url: None,
            };
            return self.remember(profile).await;
        }

        if let Some(name) = self.from_messages(counterparty, &room.room_id).await {
            self.write_back(&room.room_id, counterparty, &name);
            let profile = CounterpartyProfile {
                id: counterparty.clone(),
                display_name: name,
                avatar_url: None,
            };
            return self.remember(profile).await;
        }

        // Not cached: a later pass may find data a tier above the placeholder.
        let err = EngineError::NotResolvable(counterparty.to_string());
        debug!(%err, "using placeholder label");
        CounterpartyProfile {
            id: counterparty.clone(),
            display_name: format!("{}{}", PLACEHOLDER_PREFIX, counterparty),
            avatar_url: None,
        }
    }

    async fn remember(&self, profile: CounterpartyProfile) -> CounterpartyProfile {
        self.cache
            .write()
            .await
            .insert(profile.id.clone(), profile.clone());
        profile
    }

    /// Tier 3: the summary may predate a concurrent name write
    async fn from_fresh_room(
        &self,
        counterparty: &UserId,
        room: &RoomId,
    ) -> Option<CounterpartyProfile> {
        match self.conversations.fetch_room(room).await {
            Ok(Some(fresh)) => fresh
                .embedded_name(counterparty)
                .filter(|name| is_plausible_name(name))
                .map(|name| CounterpartyProfile {
                    id: counterparty.clone(),
                    display_name: name.to_string(),
                    avatar_url: fresh.embedded_avatar(counterparty).map(str::to_string),
                }),
            Ok(None) => None,
            Err(err) => {
                debug!(%room, %err, "fresh room fetch failed, continuing chain");
                None
            }
        }
    }

    /// Tier 4: inquiry records for the room's listing first, then any listing
    async fn from_inquiries(&self, counterparty: &UserId, room: &RoomSummary) -> Option<String> {
        let same_listing = self
            .listings
            .inquiries_for_listing(&room.listing_id)
            .await
            .unwrap_or_else(|err| {
                debug!(%err, "listing inquiry fetch failed, continuing chain");
                Vec::new()
            });
        if let Some(name) = best_inquiry_name(&same_listing, counterparty) {
            return Some(name);
        }

        let any_listing = self.listings.inquiries().await.unwrap_or_else(|err| {
            debug!(%err, "inquiry list fetch failed, continuing chain");
            Vec::new()
        });
        best_inquiry_name(&any_listing, counterparty)
    }

    /// Tier 5: newest sender-attached display name among the counterparty's
    /// messages
    async fn from_messages(&self, counterparty: &UserId, room: &RoomId) -> Option<String> {
        let messages = self
            .conversations
            .recent_messages(room, 50)
            .await
            .unwrap_or_else(|err| {
                debug!(%room, %err, "message scan failed, continuing chain");
                Vec::new()
            });
        messages
            .iter()
            .filter(|msg| msg.sender_id == *counterparty)
            .filter_map(|msg| msg.sender_name.as_deref())
            .find(|name| is_plausible_name(name))
            .map(str::to_string)
    }

    /// Fire-and-forget write-back so later resolutions hit tier 2
    fn write_back(&self, room: &RoomId, counterparty: &UserId, name: &str) {
        let conversations = Arc::clone(&self.conversations);
        let room = room.clone();
        let counterparty = counterparty.clone();
        let name = name.to_string();
        tokio::spawn(async move {
            if let Err(err) = conversations
                .write_back_counterparty_name(&room, &counterparty, &name)
                .await
            {
                debug!(%room, %err, "name write-back failed");
            }
        });
    }
}

/// Richest usable name among a buyer's inquiry records
fn best_inquiry_name(inquiries: &[InquiryRecord], buyer: &UserId) -> Option<String> {
    let mut records: Vec<&InquiryRecord> = inquiries
        .iter()
        .filter(|inquiry| inquiry.buyer_id == *buyer)
        .collect();
    records.sort_by(|a, b| b.created_at.cmp(&a.created_at));

    records
        .iter()
        .flat_map(|inquiry| [inquiry.full_name.as_deref(), inquiry.display_name.as_deref()])
        .flatten()
        .find(|name| is_plausible_name(name))
        .map(str::to_string)
}

/// Reject low-quality candidates: empty, placeholder-shaped, or id-shaped
fn is_plausible_name(candidate: &str) -> bool {
    let trimmed = candidate.trim();
    if trimmed.is_empty() {
        return false;
    }
    if trimmed.starts_with(PLACEHOLDER_PREFIX) {
        return false;
    }
    if trimmed.len() <= MAX_NUMERIC_ID_LEN && trimmed.chars().all(|c| c.is_ascii_digit()) {
        return false;
    }
    true
}
