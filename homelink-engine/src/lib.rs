//! HomeLink Client Engine
//!
//! This library implements the stateful core of the HomeLink property-marketplace
//! client: the interaction credit ledger that rations contact reveals and chat
//! starts, the per-listing unlock registry, the viewed-property history, and the
//! conversation synchronization pipeline (live feed + pull backstop, identity
//! resolution, read-status tracking).
//!
//! Everything presentation-related lives outside this crate; the UI consumes the
//! engine through the watch channels exposed by [`CreditLedger`] and
//! [`SyncHandle`] and through the [`RevealService`] gate.

pub mod credits;
pub mod history;
pub mod identity;
pub mod model;
pub mod read_status;
pub mod remote;
pub mod reveal;
pub mod storage;
pub mod sync;
pub mod unlocks;

mod error;

pub use credits::{CreditLedger, CreditLedgerConfig, DEFAULT_MAX_CREDITS};
pub use error::{EngineError, Result};
pub use history::ViewedHistory;
pub use identity::IdentityResolver;
pub use model::{
    ConversationViewItem, CounterpartyProfile, CreditLedgerState, InquiryRecord, ListingId,
    MessageRecord, ReadStatus, Role, RoomId, RoomSummary, UnlockAction, UserId,
    ViewedPropertyRecord,
};
pub use read_status::ReadTracker;
pub use remote::{ConversationStore, ListingApi};
pub use reveal::{ContactDetails, RevealOutcome, RevealService};
pub use storage::{LocalStore, MemoryStore, SqliteStore};
pub use sync::{SyncConfig, SyncHandle, SyncService};
pub use unlocks::UnlockRegistry;
