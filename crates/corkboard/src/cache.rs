//! Optimistic snapshot cache over an ordering store
//!
//! The cache is the only component that mutates the board snapshot:
//! - Reads come from the cached snapshot (fast, no store round trip)
//! - Moves mutate the snapshot first, then persist position batches in the
//!   background
//! - Reconciles re-fetch rows and re-apply whatever is still in flight
//!
//! Architecture:
//! - UI hands the cache an intent → snapshot mutated synchronously → batch
//!   persisted fire-and-forget → feed events trigger reconcile → cache
//!   converges on store order

use std::collections::HashSet;
use std::pin::Pin;
use std::sync::Arc;

use tokio::sync::{mpsc, Mutex, RwLock};
use tokio_stream::{wrappers::ReceiverStream, Stream, StreamExt};
use tracing::{debug, instrument, warn};
use uuid::Uuid;

use corkboard_api::{EngineError, EntityKind};
use corkboard_core::{BoardSnapshot, MoveIntent, PreviewMove};

use crate::store::OrderingStore;

/// Which slice of the board a reconcile refreshes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileScope {
    /// Item rows only; the cached container order is kept.
    Items,
    /// Container and item rows both.
    Board,
}

impl ReconcileScope {
    /// Merge two scheduled scopes: a board refresh covers items.
    pub fn merge(self, other: ReconcileScope) -> ReconcileScope {
        if self == ReconcileScope::Board || other == ReconcileScope::Board {
            ReconcileScope::Board
        } else {
            ReconcileScope::Items
        }
    }
}

type RevisionSubscribers = Arc<Mutex<Vec<mpsc::Sender<u64>>>>;

/// A move whose position batch has not come back from the store yet.
/// Re-applied on top of fetched rows so a reconcile never visually reverts
/// the user's own pending action.
#[derive(Debug)]
struct PendingMove {
    id: Uuid,
    intent: MoveIntent,
    /// Containers to mark dirty if the batch fails.
    touched: Vec<String>,
}

#[derive(Debug)]
struct CacheState {
    snapshot: BoardSnapshot,
    /// Bumped on every snapshot change; ticked to subscribers.
    revision: u64,
    pending: Vec<PendingMove>,
    /// Containers whose persisted order may be half-written after a failed
    /// batch. Advisory: cleared by the next successful reconcile.
    dirty: HashSet<String>,
    subscribers: RevisionSubscribers,
    /// Wired by the engine; receives repair requests after failed writes.
    repair: Option<mpsc::Sender<ReconcileScope>>,
}

/// Snapshot cache for one open board view.
pub struct OptimisticCache {
    board_id: String,
    store: Arc<dyn OrderingStore>,
    state: Arc<RwLock<CacheState>>,
}

impl OptimisticCache {
    pub fn new(store: Arc<dyn OrderingStore>, board_id: impl Into<String>) -> Self {
        let board_id = board_id.into();
        let state = CacheState {
            snapshot: BoardSnapshot::empty(board_id.clone()),
            revision: 0,
            pending: Vec::new(),
            dirty: HashSet::new(),
            subscribers: Arc::new(Mutex::new(Vec::new())),
            repair: None,
        };
        Self {
            board_id,
            store,
            state: Arc::new(RwLock::new(state)),
        }
    }

    /// Wire the channel that receives repair requests after failed writes.
    pub async fn set_repair_notifier(&self, notifier: mpsc::Sender<ReconcileScope>) {
        let mut state = self.state.write().await;
        state.repair = Some(notifier);
    }

    /// Cloned read-only view of the board for rendering.
    pub async fn snapshot(&self) -> BoardSnapshot {
        let state = self.state.read().await;
        state.snapshot.clone()
    }

    pub async fn revision(&self) -> u64 {
        let state = self.state.read().await;
        state.revision
    }

    /// Moves still waiting on their position batch.
    pub async fn pending_moves(&self) -> usize {
        let state = self.state.read().await;
        state.pending.len()
    }

    /// Containers marked for repair by failed writes, sorted for
    /// deterministic assertion.
    pub async fn dirty_containers(&self) -> Vec<String> {
        let state = self.state.read().await;
        let mut dirty: Vec<String> = state.dirty.iter().cloned().collect();
        dirty.sort();
        dirty
    }

    /// Subscribe to revision ticks. The current revision is delivered
    /// first, then one tick per subsequent snapshot change.
    pub async fn subscribe_revisions(&self) -> Pin<Box<dyn Stream<Item = u64> + Send>> {
        let (current, subscribers) = {
            let state = self.state.read().await;
            (state.revision, Arc::clone(&state.subscribers))
        }; // Drop read lock before async operation
        let (tx, rx) = mpsc::channel(100);
        let mut subscribers = subscribers.lock().await;
        subscribers.push(tx);

        let replay = tokio_stream::iter(vec![current]);
        Box::pin(replay.chain(ReceiverStream::new(rx)))
    }

    /// Bump the revision and tick every subscriber.
    /// Removes closed channels automatically.
    /// Note: This spawns a task to avoid blocking on the async lock.
    fn notify(state: &mut CacheState) {
        state.revision += 1;
        let revision = state.revision;
        let subscribers = Arc::clone(&state.subscribers);
        tokio::spawn(async move {
            let mut subscribers = subscribers.lock().await;
            subscribers.retain(|sender| match sender.try_send(revision) {
                Ok(()) => true,
                // A full buffer means the subscriber stopped draining;
                // dropping it ends its stream rather than stalling ours.
                Err(mpsc::error::TrySendError::Full(_)) => {
                    warn!("revision subscriber lagging, dropping it");
                    false
                }
                Err(mpsc::error::TrySendError::Closed(_)) => false,
            });
        });
    }

    /// Apply a move to the snapshot synchronously, then persist its
    /// position batch in the background.
    ///
    /// The caller gets immediate feedback: by the time this returns, the
    /// snapshot shows the move and a revision tick is on its way. The write
    /// itself is fire-and-forget; a failed batch logs a warning, marks the
    /// touched containers dirty, and requests a repair reconcile instead of
    /// rolling the snapshot back.
    ///
    /// # Errors
    ///
    /// `StaleMoveIntent` when the subject or target no longer exists in the
    /// snapshot; nothing is mutated or persisted in that case.
    #[instrument(skip(self, intent), fields(subject = %intent.subject_id))]
    pub async fn apply_move_intent(&self, intent: MoveIntent) -> Result<(), EngineError> {
        let mut state = self.state.write().await;

        // Containers to repair if persistence fails: the intent's own ends
        // plus wherever hover previews currently have the subject.
        let mut touched: Vec<String> = intent
            .touched_containers()
            .into_iter()
            .map(String::from)
            .collect();
        if intent.subject_kind == EntityKind::Item {
            if let Some(current) = state.snapshot.container_of_item(&intent.subject_id) {
                let current = current.to_string();
                if !touched.contains(&current) {
                    touched.push(current);
                }
            }
        }

        let updates = state.snapshot.apply_move(&intent)?;
        if updates.is_empty() {
            debug!("move is a no-op, nothing to persist");
            return Ok(());
        }

        let pending_id = Uuid::new_v4();
        let subject_kind = intent.subject_kind;
        state.pending.push(PendingMove {
            id: pending_id,
            intent,
            touched,
        });
        Self::notify(&mut state);

        let store = Arc::clone(&self.store);
        let cache_state = Arc::clone(&self.state);
        tokio::spawn(async move {
            let result = store.apply_positions(&updates).await;

            let mut state = cache_state.write().await;
            let entry = state
                .pending
                .iter()
                .position(|entry| entry.id == pending_id)
                .map(|index| state.pending.remove(index));
            if let Err(error) = result {
                warn!(error = %error, "position batch failed, marking containers for repair");
                if let Some(entry) = entry {
                    for container in entry.touched {
                        state.dirty.insert(container);
                    }
                }
                let scope = match subject_kind {
                    EntityKind::Container => ReconcileScope::Board,
                    EntityKind::Item => ReconcileScope::Items,
                };
                if let Some(repair) = &state.repair {
                    let _ = repair.try_send(scope);
                }
            }
        });

        Ok(())
    }

    /// Apply a hover preview to the snapshot. Returns whether it changed.
    pub async fn apply_preview(&self, preview: &PreviewMove) -> bool {
        let mut state = self.state.write().await;
        let changed = state
            .snapshot
            .preview_reassign(&preview.item_id, &preview.to_container_id);
        if changed {
            Self::notify(&mut state);
        }
        changed
    }

    /// Replace the snapshot wholesale, undoing hover previews after a
    /// cancelled drag.
    pub async fn restore_snapshot(&self, snapshot: BoardSnapshot) {
        let mut state = self.state.write().await;
        if state.snapshot != snapshot {
            state.snapshot = snapshot;
            Self::notify(&mut state);
        }
    }

    /// Discard the cached ordering for `scope` and rebuild it from a fresh
    /// store read, re-applying every still-in-flight move on top so a
    /// concurrent refresh never reverts the user's own pending action.
    /// Once a write has confirmed, its intent is gone from the in-flight
    /// set and the refreshed rows are authoritative.
    ///
    /// Idempotent: reconciling twice with no intervening writes leaves the
    /// snapshot (and revision) unchanged the second time.
    #[instrument(skip(self), fields(board = %self.board_id, scope = ?scope))]
    pub async fn reconcile(&self, scope: ReconcileScope) -> Result<(), EngineError> {
        // Fetch outside the state lock; the rebuild below is quick.
        let (fetched_containers, items) = match scope {
            ReconcileScope::Board => {
                let containers = self.store.list_containers(&self.board_id).await?;
                let ids: Vec<String> = containers.iter().map(|c| c.id.clone()).collect();
                let items = self.store.list_items(&ids).await?;
                (Some(containers), items)
            }
            ReconcileScope::Items => {
                let ids = {
                    let state = self.state.read().await;
                    state.snapshot.container_ids()
                };
                let items = self.store.list_items(&ids).await?;
                (None, items)
            }
        };

        let mut state = self.state.write().await;
        let containers = match fetched_containers {
            Some(containers) => containers,
            // Items scope keeps the cached container order.
            None => state
                .snapshot
                .containers
                .iter()
                .map(|entry| entry.container.clone())
                .collect(),
        };
        let mut fresh = BoardSnapshot::from_parts(self.board_id.clone(), containers, items);

        for entry in &state.pending {
            match fresh.apply_move(&entry.intent) {
                Ok(_) => debug!(subject = %entry.intent.subject_id, "re-applied in-flight move"),
                Err(error) => {
                    // Subject vanished under the pending move; the fetched
                    // rows stand.
                    debug!(
                        subject = %entry.intent.subject_id,
                        error = %error,
                        "in-flight move no longer applies"
                    );
                }
            }
        }

        state.dirty.clear();
        if fresh != state.snapshot {
            state.snapshot = fresh;
            Self::notify(&mut state);
        }
        Ok(())
    }
}
