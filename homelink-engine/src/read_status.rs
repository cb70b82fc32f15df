//! Read-Status Tracker
//!
//! Derives per-room unread indicators from the room's per-user status map and
//! exposes mark-as-read. The derivation is deliberately fail-safe toward
//! over-notifying: an absent entry counts as unread, and a failed mark-read
//! write leaves the room unread on the next load.

use std::sync::Arc;
use tracing::{debug, warn};

use crate::error::Result;
use crate::model::{ReadStatus, RoomId, RoomSummary, UserId};
use crate::remote::ConversationStore;

/// Unread indicator for `user` on `room`: 0 or 1
pub fn unread_count(room: &RoomSummary, user: &UserId) -> u32 {
    match room.read_status.get(user) {
        Some(ReadStatus::Read) => 0,
        Some(ReadStatus::New) | None => 1,
    }
}

/// Write-through mark-as-read against the remote conversation store
pub struct ReadTracker {
    conversations: Arc<dyn ConversationStore>,
}

impl ReadTracker {
    pub fn new(conversations: Arc<dyn ConversationStore>) -> Self {
        Self { conversations }
    }

    /// Mark `room` read for `user`; idempotent
    ///
    /// Called when the user opens a conversation. The error is returned so
    /// the caller may retry, but the conservative outcome of ignoring it is
    /// just an extra unread badge.
    pub async fn mark_read(&self, room: &RoomId, user: &UserId) -> Result<()> {
        match self
            .conversations
            .set_read_status(room, user, ReadStatus::Read)
            .await
        {
            Ok(()) => {
                debug!(%room, %user, "room marked read");
                Ok(())
            }
            Err(err) => {
                warn!(%room, %user, %err, "mark-read failed, room stays unread");
                Err(err)
            }
        }
    }
}
