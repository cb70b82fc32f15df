//! Conversation Synchronizer
//!
//! Reconciles the live room-summary feed, a one-shot pull backstop, and
//! external nudges (the push-notification "something happened" signal) into
//! one deduplicated, correctly-ordered, correctly-labeled conversation list.
//!
//! ## Reconciliation passes
//!
//! Every trigger starts a pass. A pass runs the pure pipeline from
//! [`reconcile`] over an immutable snapshot, enriches each surviving room
//! with its true latest message, the resolved counterparty profile and the
//! unread indicator, and then tries to publish. Passes are tagged with a
//! monotonically increasing sequence number; a pass only publishes if it is
//! still the highest-numbered completed pass and the subscription is still
//! live, so an older pass finishing late can never overwrite a newer result
//! and a stopped subscription never emits.
//!
//! Pass failures keep the last good published view rather than clearing it.

pub mod reconcile;

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch, Mutex};
use tracing::{debug, info, warn};

use crate::identity::IdentityResolver;
use crate::model::{ConversationViewItem, Role, RoomSummary, UserId};
use crate::read_status::unread_count;
use crate::remote::ConversationStore;
use crate::Result;

use reconcile::EnrichedRoom;

/// Synchronizer configuration
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Upper bound on the pull backstop before the pass is abandoned
    pub pull_timeout: Duration,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            pull_timeout: Duration::from_secs(10),
        }
    }
}

/// Conversation synchronization service
///
/// One service instance is shared per process; each `start` call creates an
/// independent subscription bound to an authenticated identity and role.
pub struct SyncService {
    conversations: Arc<dyn ConversationStore>,
    identity: Arc<IdentityResolver>,
    config: SyncConfig,
}

impl SyncService {
    pub fn new(
        conversations: Arc<dyn ConversationStore>,
        identity: Arc<IdentityResolver>,
        config: SyncConfig,
    ) -> Self {
        Self {
            conversations,
            identity,
            config,
        }
    }

    /// Open a live subscription for `user` and kick the pull backstop
    pub async fn start(&self, user: UserId, role: Role) -> Result<SyncHandle> {
        let live_rx = self.conversations.subscribe(&user).await?;
        let (view_tx, view_rx) = watch::channel(Vec::new());
        let (nudge_tx, nudge_rx) = mpsc::channel(8);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let worker = Arc::new(Worker {
            user: user.clone(),
            role,
            conversations: Arc::clone(&self.conversations),
            identity: Arc::clone(&self.identity),
            config: self.config.clone(),
            live: AtomicBool::new(true),
            seq: AtomicU64::new(0),
            published_seq: Mutex::new(0),
            view_tx,
        });

        info!(%user, ?role, "conversation sync started");
        tokio::spawn(run_loop(Arc::clone(&worker), live_rx, nudge_rx, shutdown_rx));

        // Pull backstop: the live feed may stay silent on a quiet account.
        Arc::clone(&worker).spawn_pass(None);

        Ok(SyncHandle {
            worker,
            nudge_tx,
            shutdown_tx,
            view_rx,
        })
    }

    /// Tear down `handle` and start fresh for a new identity/role
    ///
    /// All identity caches are dropped first so nothing resolved for the
    /// previous user can leak into the new list, even transiently.
    pub async fn restart(&self, handle: SyncHandle, user: UserId, role: Role) -> Result<SyncHandle> {
        handle.stop();
        drop(handle);
        self.identity.invalidate().await;
        self.start(user, role).await
    }
}

/// Live subscription returned by [`SyncService::start`]
pub struct SyncHandle {
    worker: Arc<Worker>,
    nudge_tx: mpsc::Sender<()>,
    shutdown_tx: watch::Sender<bool>,
    view_rx: watch::Receiver<Vec<ConversationViewItem>>,
}

impl SyncHandle {
    /// Watch channel carrying every published reconciliation result
    pub fn view(&self) -> watch::Receiver<Vec<ConversationViewItem>> {
        self.view_rx.clone()
    }

    /// The most recently published list
    pub fn current(&self) -> Vec<ConversationViewItem> {
        self.view_rx.borrow().clone()
    }

    /// Trigger a reconciliation pass (push-notification kicker)
    pub async fn nudge(&self) {
        let _ = self.nudge_tx.send(()).await;
    }

    /// Cancel the subscription; safe to call repeatedly and mid-pass
    ///
    /// In-flight passes complete but their results are discarded.
    pub fn stop(&self) {
        if self.worker.live.swap(false, Ordering::SeqCst) {
            debug!(user = %self.worker.user, "sync subscription stopped");
            let _ = self.shutdown_tx.send(true);
        }
    }
}

impl Drop for SyncHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

struct Worker {
    user: UserId,
    role: Role,
    conversations: Arc<dyn ConversationStore>,
    identity: Arc<IdentityResolver>,
    config: SyncConfig,
    /// Cleared by `stop`; checked before any pass result is published
    live: AtomicBool,
    /// Pass sequence counter; each trigger takes the next number
    seq: AtomicU64,
    /// Highest sequence number that has published so far
    published_seq: Mutex<u64>,
    view_tx: watch::Sender<Vec<ConversationViewItem>>,
}

async fn run_loop(
    worker: Arc<Worker>,
    mut live_rx: mpsc::Receiver<Vec<RoomSummary>>,
    mut nudge_rx: mpsc::Receiver<()>,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    let mut live_open = true;
    loop {
        tokio::select! {
            snapshot = live_rx.recv(), if live_open => match snapshot {
                Some(rooms) => Arc::clone(&worker).spawn_pass(Some(rooms)),
                None => {
                    debug!(user = %worker.user, "live feed closed, serving pulls and nudges only");
                    live_open = false;
                }
            },
            nudge = nudge_rx.recv() => match nudge {
                Some(()) => Arc::clone(&worker).spawn_pass(None),
                // Handle dropped: nobody is left to observe results.
                None => break,
            },
            _ = shutdown_rx.changed() => break,
        }
    }
    debug!(user = %worker.user, "sync loop ended");
}

impl Worker {
    /// Run one reconciliation pass concurrently with the loop
    ///
    /// Passes overlap on purpose: a newer trigger must not wait for an older
    /// pass's enrichment fetches; staleness is sorted out at publish time.
    fn spawn_pass(self: Arc<Self>, snapshot: Option<Vec<RoomSummary>>) {
        // The sequence number is taken at trigger time, not when the task
        // first runs: trigger order defines which snapshot is newest.
        let seq = self.seq.fetch_add(1, Ordering::SeqCst) + 1;
        tokio::spawn(async move {
            self.run_pass(seq, snapshot).await;
        });
    }

    async fn run_pass(&self, seq: u64, snapshot: Option<Vec<RoomSummary>>) {
        debug!(seq, "reconciliation pass started");

        let rooms = match snapshot {
            Some(rooms) => rooms,
            None => {
                let pull = tokio::time::timeout(
                    self.config.pull_timeout,
                    self.conversations.rooms_for_participant(&self.user),
                )
                .await;
                match pull {
                    Ok(Ok(rooms)) => rooms,
                    Ok(Err(err)) => {
                        warn!(seq, %err, "pull fetch failed, keeping last good view");
                        return;
                    }
                    Err(_) => {
                        warn!(seq, "pull fetch timed out, keeping last good view");
                        return;
                    }
                }
            }
        };

        let rooms = reconcile::filter_for_role(rooms, &self.user, self.role);

        let mut enriched = Vec::with_capacity(rooms.len());
        for summary in rooms {
            let (last_activity_at, preview) =
                match self.conversations.latest_message(&summary.room_id).await {
                    Ok(Some(message)) => (message.sent_at, message.text),
                    Ok(None) => (summary.last_activity_at, summary.last_message_preview.clone()),
                    Err(err) => {
                        debug!(
                            room = %summary.room_id, %err,
                            "latest-message lookup failed, trusting summary fields"
                        );
                        (summary.last_activity_at, summary.last_message_preview.clone())
                    }
                };
            enriched.push(EnrichedRoom {
                summary,
                last_activity_at,
                preview,
            });
        }

        let mut deduped = reconcile::dedup(enriched, &self.user);
        reconcile::sort(&mut deduped);

        let mut items = Vec::with_capacity(deduped.len());
        for room in deduped {
            let counterparty = room.summary.counterparty_of(&self.user).clone();
            let profile = self.identity.resolve(&counterparty, &room.summary).await;
            items.push(ConversationViewItem {
                room_id: room.summary.room_id.clone(),
                listing_id: room.summary.listing_id.clone(),
                counterparty: profile,
                last_message_preview: room.preview,
                last_activity_at: room.last_activity_at,
                unread: unread_count(&room.summary, &self.user),
            });
        }

        self.publish(seq, items).await;
    }

    async fn publish(&self, seq: u64, items: Vec<ConversationViewItem>) {
        if !self.live.load(Ordering::SeqCst) {
            debug!(seq, "subscription stopped, discarding pass result");
            return;
        }

        let mut published = self.published_seq.lock().await;
        if seq <= *published {
            debug!(seq, published = *published, "superseded by newer pass, discarding");
            return;
        }
        *published = seq;

        let count = items.len();
        let _ = self.view_tx.send(items);
        debug!(seq, count, "reconciliation pass published");
    }
}
