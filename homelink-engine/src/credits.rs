//! Interaction Credit Ledger
//!
//! Tracks the bounded global quota of "reveal" actions. All mutation goes
//! through [`CreditLedger::consume`], which holds one mutex across the whole
//! read-check-persist-update cycle so that two concurrent callers can never
//! both win the last credit.
//!
//! Durability over throughput: every successful consume is persisted before
//! the caller sees success. A persist failure leaves the in-memory state
//! untouched, so a crash can neither silently regrant a credit nor lose a
//! decrement that was already reported as successful.
//!
//! Failure semantics are asymmetric on purpose: read/parse errors at startup
//! fail open to a fresh full-quota state (the app must never be blocked by a
//! corrupt ledger blob), while write errors fail closed.

use std::sync::Arc;
use tokio::sync::{watch, Mutex};
use tracing::{debug, info, warn};

use crate::error::{EngineError, Result};
use crate::model::CreditLedgerState;
use crate::storage::LocalStore;

/// Store key holding the serialized [`CreditLedgerState`]
const LEDGER_KEY: &str = "credits/ledger";

/// Quota granted on first launch
pub const DEFAULT_MAX_CREDITS: u32 = 5;

/// Credit ledger configuration
#[derive(Debug, Clone)]
pub struct CreditLedgerConfig {
    /// Maximum (and initial) number of interaction credits
    pub max_credits: u32,
}

impl Default for CreditLedgerConfig {
    fn default() -> Self {
        Self {
            max_credits: DEFAULT_MAX_CREDITS,
        }
    }
}

/// Single-owner ledger of interaction credits
pub struct CreditLedger {
    store: Arc<dyn LocalStore>,
    /// Serializes every read-modify-write; also guards the persisted copy
    state: Mutex<CreditLedgerState>,
    publisher: watch::Sender<CreditLedgerState>,
}

impl CreditLedger {
    /// Load the persisted ledger, seeding a full quota on first run
    ///
    /// Never fails: storage read errors and unparseable blobs both fall back
    /// to a fresh full-quota state.
    pub async fn initialize(store: Arc<dyn LocalStore>, config: CreditLedgerConfig) -> Self {
        let state = match store.get(LEDGER_KEY).await {
            Ok(Some(raw)) => match serde_json::from_str::<CreditLedgerState>(&raw) {
                Ok(mut persisted) => {
                    if persisted.remaining > persisted.max {
                        warn!(
                            remaining = persisted.remaining,
                            max = persisted.max,
                            "persisted ledger violates quota invariant, clamping"
                        );
                        persisted.remaining = persisted.max;
                    }
                    persisted
                }
                Err(err) => {
                    warn!(%err, "unparseable ledger blob, falling back to full quota");
                    CreditLedgerState::full(config.max_credits)
                }
            },
            Ok(None) => {
                info!(max = config.max_credits, "first run, seeding credit ledger");
                let fresh = CreditLedgerState::full(config.max_credits);
                if let Ok(raw) = serde_json::to_string(&fresh) {
                    if let Err(err) = store.set(LEDGER_KEY, &raw).await {
                        warn!(%err, "could not persist seeded ledger, will retry on first consume");
                    }
                }
                fresh
            }
            Err(err) => {
                warn!(%err, "ledger read failed, failing open to full quota");
                CreditLedgerState::full(config.max_credits)
            }
        };

        let (publisher, _) = watch::channel(state);
        Self {
            store,
            state: Mutex::new(state),
            publisher,
        }
    }

    /// Atomically spend one credit
    ///
    /// Fails with [`EngineError::CreditsExhausted`] without mutating anything
    /// when the quota is used up. The decrement is persisted before it becomes
    /// visible, so success implies durability.
    pub async fn consume(&self) -> Result<CreditLedgerState> {
        let mut state = self.state.lock().await;
        if state.is_exhausted() {
            debug!("consume refused, quota exhausted");
            return Err(EngineError::CreditsExhausted);
        }

        let next = CreditLedgerState {
            remaining: state.remaining - 1,
            max: state.max,
        };
        let raw = serde_json::to_string(&next)?;
        self.store.set(LEDGER_KEY, &raw).await?;

        *state = next;
        let _ = self.publisher.send(next);
        debug!(remaining = next.remaining, "interaction credit consumed");
        Ok(next)
    }

    /// Current ledger state
    pub async fn state(&self) -> CreditLedgerState {
        *self.state.lock().await
    }

    /// Watch channel the UI registers against for quota updates
    pub fn subscribe(&self) -> watch::Receiver<CreditLedgerState> {
        self.publisher.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;

    async fn fresh_ledger(max: u32) -> (Arc<MemoryStore>, CreditLedger) {
        let store = Arc::new(MemoryStore::new());
        let ledger = CreditLedger::initialize(
            store.clone() as Arc<dyn LocalStore>,
            CreditLedgerConfig { max_credits: max },
        )
        .await;
        (store, ledger)
    }

    #[tokio::test]
    async fn seeds_full_quota_on_first_run() {
        let (_store, ledger) = fresh_ledger(5).await;
        let state = ledger.state().await;
        assert_eq!(state.remaining, 5);
        assert_eq!(state.max, 5);
    }

    #[tokio::test]
    async fn consume_decrements_until_exhausted() {
        let (_store, ledger) = fresh_ledger(3).await;

        for expected in [2, 1, 0] {
            let state = ledger.consume().await.unwrap();
            assert_eq!(state.remaining, expected);
        }

        let err = ledger.consume().await.unwrap_err();
        assert!(matches!(err, EngineError::CreditsExhausted));
        assert_eq!(ledger.state().await.remaining, 0);
    }

    #[tokio::test]
    async fn concurrent_consumers_cannot_both_win_last_credit() {
        let (_store, ledger) = fresh_ledger(1).await;
        let ledger = Arc::new(ledger);

        let mut tasks = Vec::new();
        for _ in 0..8 {
            let ledger = ledger.clone();
            tasks.push(tokio::spawn(async move { ledger.consume().await.is_ok() }));
        }

        let mut successes = 0;
        for task in tasks {
            if task.await.unwrap() {
                successes += 1;
            }
        }
        assert_eq!(successes, 1);
        assert_eq!(ledger.state().await.remaining, 0);
    }

    #[tokio::test]
    async fn persisted_state_survives_reinitialize() {
        let (store, ledger) = fresh_ledger(5).await;
        ledger.consume().await.unwrap();
        ledger.consume().await.unwrap();

        let reloaded =
            CreditLedger::initialize(store as Arc<dyn LocalStore>, CreditLedgerConfig::default())
                .await;
        assert_eq!(reloaded.state().await.remaining, 3);
    }

    #[tokio::test]
    async fn corrupt_blob_fails_open_to_full_quota() {
        let store = Arc::new(MemoryStore::new());
        store.set(LEDGER_KEY, "not json").await.unwrap();

        let ledger = CreditLedger::initialize(
            store as Arc<dyn LocalStore>,
            CreditLedgerConfig { max_credits: 5 },
        )
        .await;
        assert_eq!(ledger.state().await.remaining, 5);
    }

    #[tokio::test]
    async fn read_failure_fails_open_to_full_quota() {
        let store = Arc::new(MemoryStore::new());
        store.fail_reads(true);

        let ledger = CreditLedger::initialize(
            store.clone() as Arc<dyn LocalStore>,
            CreditLedgerConfig { max_credits: 4 },
        )
        .await;
        assert_eq!(ledger.state().await.remaining, 4);
    }

    #[tokio::test]
    async fn write_failure_leaves_state_untouched() {
        let (store, ledger) = fresh_ledger(2).await;

        store.fail_writes(true);
        let err = ledger.consume().await.unwrap_err();
        assert!(err.is_recoverable());
        assert_eq!(ledger.state().await.remaining, 2);

        store.fail_writes(false);
        assert_eq!(ledger.consume().await.unwrap().remaining, 1);
    }

    #[tokio::test]
    async fn subscribers_see_quota_updates() {
        let (_store, ledger) = fresh_ledger(2).await;
        let mut rx = ledger.subscribe();

        ledger.consume().await.unwrap();
        rx.changed().await.unwrap();
        assert_eq!(rx.borrow().remaining, 1);
    }
}
