//! Property Unlock Registry
//!
//! Per-listing idempotent flags recording that a credit has already been
//! spent on a listing, so repeated reveals never re-charge. Flags are never
//! unset by the client; the whole set is serialized under one store key.
//!
//! `is_unlocked` is the single gate checked before offering a reveal/chat
//! action. The pairing with the credit spend is deliberately not
//! transactional — see [`crate::reveal`].

use std::collections::BTreeSet;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::error::{EngineError, Result};
use crate::model::ListingId;
use crate::storage::LocalStore;

/// Store key holding the serialized set of unlocked listing ids
const UNLOCKS_KEY: &str = "unlocks/listings";

/// Idempotent per-listing unlock flags
pub struct UnlockRegistry {
    store: Arc<dyn LocalStore>,
    unlocked: RwLock<BTreeSet<ListingId>>,
}

impl UnlockRegistry {
    /// Load persisted flags; an unreadable or unparseable set starts empty
    ///
    /// Starting empty after a lost blob means a user may be asked to confirm
    /// a reveal again; they are only re-charged if the ledger still has the
    /// spend, which is the documented tolerance.
    pub async fn load(store: Arc<dyn LocalStore>) -> Self {
        let unlocked = match store.get(UNLOCKS_KEY).await {
            Ok(Some(raw)) => match serde_json::from_str::<BTreeSet<ListingId>>(&raw) {
                Ok(set) => set,
                Err(err) => {
                    let err = EngineError::Inconsistent(format!("unparseable unlock set: {}", err));
                    warn!(%err, "starting with no unlock flags");
                    BTreeSet::new()
                }
            },
            Ok(None) => BTreeSet::new(),
            Err(err) => {
                warn!(%err, "unlock set read failed, starting empty");
                BTreeSet::new()
            }
        };

        Self {
            store,
            unlocked: RwLock::new(unlocked),
        }
    }

    /// Whether a credit has already been spent on this listing
    pub async fn is_unlocked(&self, listing: &ListingId) -> bool {
        self.unlocked.read().await.contains(listing)
    }

    /// Record that a credit was spent on this listing
    ///
    /// Idempotent: re-marking an unlocked listing touches neither memory nor
    /// disk. On a persist failure the in-memory flag is rolled back so memory
    /// and disk stay consistent and the caller can retry.
    pub async fn mark_unlocked(&self, listing: &ListingId) -> Result<()> {
        let mut unlocked = self.unlocked.write().await;
        if !unlocked.insert(listing.clone()) {
            debug!(%listing, "listing already unlocked");
            return Ok(());
        }

        let raw = serde_json::to_string(&*unlocked)?;
        if let Err(err) = self.store.set(UNLOCKS_KEY, &raw).await {
            unlocked.remove(listing);
            return Err(err);
        }

        debug!(%listing, "listing unlocked");
        Ok(())
    }
}
