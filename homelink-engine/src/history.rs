//! Viewed-Property History
//!
//! Append-only log of unlocked listings, shown to the user as "properties you
//! contacted". Entries are appended by the reveal flow and only ever removed
//! by an explicit bulk clear.

use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::error::Result;
use crate::model::ViewedPropertyRecord;
use crate::storage::LocalStore;

/// Store key holding the serialized history entries
const HISTORY_KEY: &str = "history/viewed";

/// Append-only viewed-property log
pub struct ViewedHistory {
    store: Arc<dyn LocalStore>,
    entries: RwLock<Vec<ViewedPropertyRecord>>,
}

impl ViewedHistory {
    /// Load persisted history; unreadable data starts an empty log
    pub async fn load(store: Arc<dyn LocalStore>) -> Self {
        let entries = match store.get(HISTORY_KEY).await {
            Ok(Some(raw)) => serde_json::from_str(&raw).unwrap_or_else(|err| {
                warn!(%err, "unparseable history blob, starting empty");
                Vec::new()
            }),
            Ok(None) => Vec::new(),
            Err(err) => {
                warn!(%err, "history read failed, starting empty");
                Vec::new()
            }
        };

        Self {
            store,
            entries: RwLock::new(entries),
        }
    }

    /// Append one record, persisting the whole log
    ///
    /// A failed write is retried once; a second failure rolls the entry back
    /// and surfaces the error (callers treat history loss as non-fatal).
    pub async fn append(&self, record: ViewedPropertyRecord) -> Result<()> {
        let mut entries = self.entries.write().await;
        entries.push(record);

        let raw = serde_json::to_string(&*entries)?;
        let result = match self.store.set(HISTORY_KEY, &raw).await {
            Ok(()) => Ok(()),
            Err(first) => {
                warn!(%first, "history write failed, retrying once");
                self.store.set(HISTORY_KEY, &raw).await
            }
        };

        if result.is_err() {
            entries.pop();
        } else {
            debug!(total = entries.len(), "history entry appended");
        }
        result
    }

    /// All entries, newest first
    pub async fn all(&self) -> Vec<ViewedPropertyRecord> {
        let entries = self.entries.read().await;
        let mut out: Vec<_> = entries.iter().cloned().collect();
        out.sort_by(|a, b| b.viewed_at.cmp(&a.viewed_at));
        out
    }

    /// Bulk clear, as offered in the history screen
    pub async fn clear(&self) -> Result<()> {
        let mut entries = self.entries.write().await;
        self.store.set(HISTORY_KEY, "[]").await?;
        entries.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ListingId, UnlockAction};
    use crate::storage::MemoryStore;

    fn record(listing: &str, viewed_at: i64) -> ViewedPropertyRecord {
        let mut r = ViewedPropertyRecord::new(
            ListingId::from(listing),
            "Sunny flat",
            "Alice",
            UnlockAction::Contact,
        );
        r.viewed_at = viewed_at;
        r
    }

    #[tokio::test]
    async fn entries_come_back_newest_first() {
        let store = Arc::new(MemoryStore::new());
        let history = ViewedHistory::load(store as Arc<dyn LocalStore>).await;

        history.append(record("l1", 100)).await.unwrap();
        history.append(record("l2", 300)).await.unwrap();
        history.append(record("l3", 200)).await.unwrap();

        let all = history.all().await;
        let listings: Vec<_> = all.iter().map(|r| r.listing_id.as_str()).collect();
        assert_eq!(listings, vec!["l2", "l3", "l1"]);
    }

    #[tokio::test]
    async fn clear_empties_log_and_store() {
        let store = Arc::new(MemoryStore::new());
        let history = ViewedHistory::load(store.clone() as Arc<dyn LocalStore>).await;

        history.append(record("l1", 100)).await.unwrap();
        history.clear().await.unwrap();
        assert!(history.all().await.is_empty());

        let reloaded = ViewedHistory::load(store as Arc<dyn LocalStore>).await;
        assert!(reloaded.all().await.is_empty());
    }

    #[tokio::test]
    async fn failed_append_rolls_back_entry() {
        let store = Arc::new(MemoryStore::new());
        let history = ViewedHistory::load(store.clone() as Arc<dyn LocalStore>).await;

        store.fail_writes(true);
        assert!(history.append(record("l1", 100)).await.is_err());
        assert!(history.all().await.is_empty());
    }
}
