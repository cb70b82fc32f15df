//! Contact-Reveal / Chat-Start Gate
//!
//! Facade coordinating the credit ledger, the unlock registry and the
//! viewed-property history. The UI calls [`RevealService::unlock`] when the
//! user taps "reveal contact" or "start chat"; everything else (quota check,
//! idempotence, history entry) happens here.
//!
//! The consume/mark pairing is not transactional: the ledger and the unlock
//! set live under separate store keys. A crash between the two operations
//! loses the flag — the user may be asked to confirm again — but can never
//! regrant the spent credit. The inconsistency is logged and tolerated
//! rather than failing the action the user already paid for.

use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::credits::CreditLedger;
use crate::error::Result;
use crate::history::ViewedHistory;
use crate::model::{ListingId, UnlockAction, ViewedPropertyRecord};
use crate::unlocks::UnlockRegistry;

/// Owner contact data captured into the history entry
#[derive(Debug, Clone)]
pub struct ContactDetails {
    pub listing_title: String,
    pub owner_name: String,
    pub owner_phone: Option<String>,
    pub owner_email: Option<String>,
}

/// Result of an unlock attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RevealOutcome {
    /// Whether a credit was spent by this call
    pub charged: bool,
    /// Credits left after the call
    pub remaining: u32,
}

/// Gate in front of contact-reveal and chat-start actions
pub struct RevealService {
    ledger: Arc<CreditLedger>,
    unlocks: Arc<UnlockRegistry>,
    history: Arc<ViewedHistory>,
    /// Serializes `unlock` calls; without it a double-tap on the same listing
    /// could pass the `is_unlocked` check twice and charge twice
    gate: Mutex<()>,
}

impl RevealService {
    pub fn new(
        ledger: Arc<CreditLedger>,
        unlocks: Arc<UnlockRegistry>,
        history: Arc<ViewedHistory>,
    ) -> Self {
        Self {
            ledger,
            unlocks,
            history,
            gate: Mutex::new(()),
        }
    }

    /// Whether the reveal/chat action for this listing is already paid for
    pub async fn is_unlocked(&self, listing: &ListingId) -> bool {
        self.unlocks.is_unlocked(listing).await
    }

    /// Unlock a listing's contact/chat, charging one credit if needed
    ///
    /// Already-unlocked listings short-circuit without touching the ledger.
    /// Otherwise the order is: consume (may fail with
    /// [`crate::EngineError::CreditsExhausted`]), mark unlocked, append the
    /// history entry. Failures after a successful consume are logged and
    /// tolerated so the user keeps what they paid for.
    ///
    /// Calls are serialized: concurrent unlocks of the same listing see the
    /// first caller's flag and take the free path.
    pub async fn unlock(
        &self,
        listing: &ListingId,
        action: UnlockAction,
        details: ContactDetails,
    ) -> Result<RevealOutcome> {
        let _gate = self.gate.lock().await;

        if self.unlocks.is_unlocked(listing).await {
            debug!(%listing, "already unlocked, no credit charged");
            return Ok(RevealOutcome {
                charged: false,
                remaining: self.ledger.state().await.remaining,
            });
        }

        let state = self.ledger.consume().await?;

        if let Err(err) = self.unlocks.mark_unlocked(listing).await {
            // Credit is durably spent but the flag write failed; the next
            // attempt sees the listing locked and the documented tolerance
            // applies.
            warn!(%listing, %err, "credit spent but unlock flag not persisted");
        }

        let mut record = ViewedPropertyRecord::new(
            listing.clone(),
            details.listing_title,
            details.owner_name,
            action,
        );
        record.owner_phone = details.owner_phone;
        record.owner_email = details.owner_email;
        if let Err(err) = self.history.append(record).await {
            warn!(%listing, %err, "history entry dropped after unlock");
        }

        Ok(RevealOutcome {
            charged: true,
            remaining: state.remaining,
        })
    }
}
