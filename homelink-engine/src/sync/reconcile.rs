//! Pure reconciliation functions
//!
//! Every reconciliation pass runs the same pipeline of pure functions over an
//! immutable snapshot: role-based filtering, dedup by `(counterparty,
//! listing)` key, then ordering. Keeping these free of I/O lets the pass
//! logic in [`super`] stay small and lets the invariants be tested without a
//! runtime.

use std::collections::HashMap;

use crate::model::{ListingId, Role, RoomSummary, UserId};

/// Room snapshot enriched with the true last-message timestamp and preview
///
/// The room's own `last_activity_at` can lag behind the newest message, so
/// the pass looks up the most recent message per room before deduplicating.
#[derive(Debug, Clone)]
pub struct EnrichedRoom {
    pub summary: RoomSummary,
    pub last_activity_at: i64,
    pub preview: String,
}

/// Keep only rooms where `user` sits on the side `role` expects
///
/// Buyers see rooms they initiated. Sellers/agents see rooms addressed to
/// them, with a participant-set fallback for historical rooms whose receiver
/// field is inconsistent: being a participant without being the buyer is
/// treated as being the receiver.
pub fn filter_for_role(rooms: Vec<RoomSummary>, user: &UserId, role: Role) -> Vec<RoomSummary> {
    rooms
        .into_iter()
        .filter(|room| match role {
            Role::Buyer => room.buyer_id == *user,
            Role::Seller | Role::Agent => {
                room.owner_id == *user
                    || (room.participant_ids.contains(user) && room.buyer_id != *user)
            }
        })
        .collect()
}

/// Collapse duplicate rooms sharing a `(counterparty, listing)` key
///
/// Historical duplicate room creation leaves several rooms for one
/// relationship; only the one with the most recent true activity survives.
/// Equal timestamps fall back to the lower room id for determinism.
pub fn dedup(rooms: Vec<EnrichedRoom>, user: &UserId) -> Vec<EnrichedRoom> {
    let mut by_key: HashMap<(UserId, ListingId), EnrichedRoom> = HashMap::new();

    for room in rooms {
        let key = (
            room.summary.counterparty_of(user).clone(),
            room.summary.listing_id.clone(),
        );
        match by_key.get(&key) {
            Some(kept) if !supersedes(&room, kept) => {}
            _ => {
                by_key.insert(key, room);
            }
        }
    }

    by_key.into_values().collect()
}

fn supersedes(candidate: &EnrichedRoom, kept: &EnrichedRoom) -> bool {
    match candidate.last_activity_at.cmp(&kept.last_activity_at) {
        std::cmp::Ordering::Greater => true,
        std::cmp::Ordering::Equal => candidate.summary.room_id < kept.summary.room_id,
        std::cmp::Ordering::Less => false,
    }
}

/// Order by true activity descending, room id ascending on ties
pub fn sort(rooms: &mut [EnrichedRoom]) {
    rooms.sort_by(|a, b| {
        b.last_activity_at
            .cmp(&a.last_activity_at)
            .then_with(|| a.summary.room_id.cmp(&b.summary.room_id))
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::{BTreeMap, BTreeSet};

    fn room(room_id: &str, listing: &str, buyer: &str, owner: &str) -> RoomSummary {
        RoomSummary {
            room_id: crate::model::RoomId::from(room_id),
            listing_id: ListingId::from(listing),
            buyer_id: UserId::from(buyer),
            owner_id: UserId::from(owner),
            owner_role: Role::Seller,
            participant_ids: BTreeSet::from([UserId::from(buyer), UserId::from(owner)]),
            display_names: BTreeMap::new(),
            avatar_urls: BTreeMap::new(),
            last_message_preview: String::new(),
            last_activity_at: 0,
            read_status: BTreeMap::new(),
        }
    }

    fn enriched(summary: RoomSummary, ts: i64, preview: &str) -> EnrichedRoom {
        EnrichedRoom {
            summary,
            last_activity_at: ts,
            preview: preview.to_string(),
        }
    }

    #[test]
    fn buyers_see_only_rooms_they_initiated() {
        let rooms = vec![
            room("r1", "l1", "me", "seller-1"),
            room("r2", "l2", "someone-else", "me"),
        ];
        let kept = filter_for_role(rooms, &UserId::from("me"), Role::Buyer);
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].room_id.as_str(), "r1");
    }

    #[test]
    fn sellers_fall_back_to_participant_set() {
        // r2's receiver field points at the wrong user, but the participant
        // set says we are in the room and not the buyer.
        let mut inconsistent = room("r2", "l2", "buyer-2", "stale-owner-id");
        inconsistent.participant_ids.insert(UserId::from("me"));

        let rooms = vec![
            room("r1", "l1", "buyer-1", "me"),
            inconsistent,
            room("r3", "l3", "me", "seller-3"), // we are the buyer here
        ];
        let kept = filter_for_role(rooms, &UserId::from("me"), Role::Seller);
        let ids: Vec<_> = kept.iter().map(|r| r.room_id.as_str()).collect();
        assert_eq!(ids, vec!["r1", "r2"]);
    }

    #[test]
    fn duplicate_rooms_collapse_to_freshest() {
        let me = UserId::from("me");
        let rooms = vec![
            enriched(room("r1", "l1", "me", "seller-1"), 100, "old"),
            enriched(room("r2", "l1", "me", "seller-1"), 300, "new"),
            enriched(room("r3", "l2", "me", "seller-1"), 200, "other listing"),
        ];

        let mut deduped = dedup(rooms, &me);
        sort(&mut deduped);

        assert_eq!(deduped.len(), 2);
        assert_eq!(deduped[0].summary.room_id.as_str(), "r2");
        assert_eq!(deduped[0].preview, "new");
        assert_eq!(deduped[0].last_activity_at, 300);
        assert_eq!(deduped[1].summary.room_id.as_str(), "r3");
    }

    #[test]
    fn equal_timestamps_break_ties_by_room_id() {
        let me = UserId::from("me");
        let rooms = vec![
            enriched(room("r9", "l1", "me", "seller-1"), 100, "a"),
            enriched(room("r1", "l1", "me", "seller-1"), 100, "b"),
        ];
        let deduped = dedup(rooms, &me);
        assert_eq!(deduped.len(), 1);
        assert_eq!(deduped[0].summary.room_id.as_str(), "r1");
    }

    #[test]
    fn ordering_is_activity_desc_then_room_id() {
        let mut rooms = vec![
            enriched(room("rb", "l1", "me", "s1"), 100, ""),
            enriched(room("ra", "l2", "me", "s2"), 100, ""),
            enriched(room("rc", "l3", "me", "s3"), 500, ""),
        ];
        sort(&mut rooms);
        let ids: Vec<_> = rooms.iter().map(|r| r.summary.room_id.as_str()).collect();
        assert_eq!(ids, vec!["rc", "ra", "rb"]);
    }
}
