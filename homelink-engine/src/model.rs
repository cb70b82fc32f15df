//! Shared value types for the HomeLink engine
//!
//! Everything here is either persisted to the local store, projected from the
//! remote conversation store, or handed to the UI layer, so all types derive
//! serde. Timestamps are UTC milliseconds throughout.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use uuid::Uuid;

/// Current time as UTC milliseconds
pub fn current_timestamp() -> i64 {
    Utc::now().timestamp_millis()
}

macro_rules! id_type {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(
            Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(id: &str) -> Self {
                Self(id.to_string())
            }
        }
    };
}

id_type!(
    /// Identifier of a marketplace user (buyer, seller or agent)
    UserId
);
id_type!(
    /// Identifier of a property listing
    ListingId
);
id_type!(
    /// Identifier of a conversation room
    RoomId
);

/// Side of the marketplace the authenticated user is on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Buyer,
    Seller,
    Agent,
}

impl Role {
    /// Sellers and agents sit on the receiving side of buyer inquiries
    pub fn is_owner_side(&self) -> bool {
        matches!(self, Role::Seller | Role::Agent)
    }
}

/// Per-user read state of a conversation room
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReadStatus {
    New,
    Read,
}

/// Client-side projection of a remote conversation room
///
/// The remote store is the source of truth; this is a read-through snapshot.
/// `last_activity_at` is the room's own "updated" field and may lag behind the
/// newest message, which is why the synchronizer fetches the latest message
/// per room before deduplicating.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoomSummary {
    pub room_id: RoomId,
    pub listing_id: ListingId,
    /// The buyer who initiated the room
    pub buyer_id: UserId,
    /// The seller/agent who received the inquiry
    pub owner_id: UserId,
    pub owner_role: Role,
    /// Authoritative participant set; `owner_id` can be inconsistent with it
    /// on historical rooms
    pub participant_ids: BTreeSet<UserId>,
    /// Display names persisted on the room record, keyed by participant
    #[serde(default)]
    pub display_names: BTreeMap<UserId, String>,
    /// Avatar URLs persisted on the room record, keyed by participant
    #[serde(default)]
    pub avatar_urls: BTreeMap<UserId, String>,
    #[serde(default)]
    pub last_message_preview: String,
    pub last_activity_at: i64,
    /// Per-user read markers; an absent entry means the room is unread
    #[serde(default)]
    pub read_status: BTreeMap<UserId, ReadStatus>,
}

impl RoomSummary {
    /// The other participant relative to `user`
    pub fn counterparty_of(&self, user: &UserId) -> &UserId {
        if self.buyer_id == *user {
            &self.owner_id
        } else {
            &self.buyer_id
        }
    }

    /// Display name embedded on the room record for `user`, if any
    pub fn embedded_name(&self, user: &UserId) -> Option<&str> {
        self.display_names.get(user).map(String::as_str)
    }

    /// Avatar URL embedded on the room record for `user`, if any
    pub fn embedded_avatar(&self, user: &UserId) -> Option<&str> {
        self.avatar_urls.get(user).map(String::as_str)
    }
}

/// A single message inside a room's message sub-collection
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageRecord {
    pub message_id: String,
    pub room_id: RoomId,
    pub sender_id: UserId,
    /// Display name the sender attached to the message, when present
    #[serde(default)]
    pub sender_name: Option<String>,
    pub text: String,
    pub sent_at: i64,
}

/// Resolved counterparty display data; process-lifetime, cached by id
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CounterpartyProfile {
    pub id: UserId,
    pub display_name: String,
    #[serde(default)]
    pub avatar_url: Option<String>,
}

/// Rendering-ready conversation list entry
///
/// One entry per distinct `(counterparty, listing)` pair, carrying the freshest
/// true activity timestamp among all rooms sharing that key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationViewItem {
    pub room_id: RoomId,
    pub listing_id: ListingId,
    pub counterparty: CounterpartyProfile,
    pub last_message_preview: String,
    pub last_activity_at: i64,
    /// 0 or 1; rooms carry a single unread marker per user
    pub unread: u32,
}

/// A buyer's historical inquiry/contact record for a listing
///
/// Field richness varies with the inquiry form the buyer used; the identity
/// resolver picks the richest usable name.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InquiryRecord {
    pub listing_id: ListingId,
    pub buyer_id: UserId,
    #[serde(default)]
    pub full_name: Option<String>,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    pub created_at: i64,
}

/// What the user paid a credit for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnlockAction {
    Chat,
    Contact,
}

/// Append-only history entry written whenever a listing is unlocked
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ViewedPropertyRecord {
    pub id: String,
    pub listing_id: ListingId,
    pub listing_title: String,
    pub owner_name: String,
    #[serde(default)]
    pub owner_phone: Option<String>,
    #[serde(default)]
    pub owner_email: Option<String>,
    pub viewed_at: i64,
    pub action: UnlockAction,
}

impl ViewedPropertyRecord {
    pub fn new(
        listing_id: ListingId,
        listing_title: impl Into<String>,
        owner_name: impl Into<String>,
        action: UnlockAction,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            listing_id,
            listing_title: listing_title.into(),
            owner_name: owner_name.into(),
            owner_phone: None,
            owner_email: None,
            viewed_at: current_timestamp(),
            action,
        }
    }
}

/// Persisted state of the interaction credit ledger
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreditLedgerState {
    pub remaining: u32,
    pub max: u32,
}

impl CreditLedgerState {
    /// Fresh full-quota state, used on first launch and on fail-open recovery
    pub fn full(max: u32) -> Self {
        Self { remaining: max, max }
    }

    pub fn is_exhausted(&self) -> bool {
        self.remaining == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counterparty_is_relative_to_viewer() {
        let room = RoomSummary {
            room_id: RoomId::from("r1"),
            listing_id: ListingId::from("l1"),
            buyer_id: UserId::from("buyer"),
            owner_id: UserId::from("owner"),
            owner_role: Role::Seller,
            participant_ids: [UserId::from("buyer"), UserId::from("owner")].into(),
            display_names: BTreeMap::new(),
            avatar_urls: BTreeMap::new(),
            last_message_preview: String::new(),
            last_activity_at: 0,
            read_status: BTreeMap::new(),
        };

        assert_eq!(room.counterparty_of(&UserId::from("buyer")).as_str(), "owner");
        assert_eq!(room.counterparty_of(&UserId::from("owner")).as_str(), "buyer");
    }

    #[test]
    fn ledger_state_roundtrips_through_json() {
        let state = CreditLedgerState { remaining: 3, max: 5 };
        let raw = serde_json::to_string(&state).unwrap();
        let back: CreditLedgerState = serde_json::from_str(&raw).unwrap();
        assert_eq!(back, state);
        assert!(!back.is_exhausted());
        assert!(CreditLedgerState::full(0).is_exhausted());
    }
}
