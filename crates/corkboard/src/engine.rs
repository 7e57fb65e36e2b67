//! Board engine: the facade one open board view talks to
//!
//! Composes the drag controller, the optimistic cache, and the reconcile
//! scheduler behind a single handle. The UI feeds it pointer events and
//! renders from `snapshot()`; everything else (persistence, feed-driven
//! refreshes, repair after failed writes) happens behind the facade.

use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tokio_stream::Stream;
use tracing::{debug, info, warn};

use corkboard_api::{BoardRole, ChangeFeed, EngineError, EntityKind};
use corkboard_core::{
    BoardSnapshot, DragController, DropOutcome, DropTarget, PointerPoint,
    DEFAULT_ACTIVATION_DISTANCE,
};

use crate::cache::{OptimisticCache, ReconcileScope};
use crate::feed::ReconcileScheduler;
use crate::store::OrderingStore;

/// Tunables for one board view.
///
/// Plain struct construction; every field has a serde default so hosts can
/// deserialize a partial config from their own files.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Pointer travel in pixels before a grab becomes a drag.
    pub activation_distance: f64,
    /// Window in which rapid change events coalesce into one reconcile.
    pub reconcile_debounce: Duration,
    /// The current actor's role on the board; gates write paths only.
    pub role: BoardRole,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            activation_distance: DEFAULT_ACTIVATION_DISTANCE,
            reconcile_debounce: Duration::from_millis(30),
            role: BoardRole::Member,
        }
    }
}

impl EngineConfig {
    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }
}

/// One open board view: drag sessions in, ordered snapshots out.
///
/// The engine owns no storage; it reads and writes through the
/// `OrderingStore` handed to `open` and watches the matching `ChangeFeed`.
/// Dropping the engine (or calling `close`) stops the feed task; in-flight
/// position batches may still land but nothing consumes their results.
pub struct BoardEngine {
    board_id: String,
    role: BoardRole,
    cache: Arc<OptimisticCache>,
    drag: Mutex<DragController>,
    scheduler: ReconcileScheduler,
}

impl BoardEngine {
    /// Open a board view: subscribe to the change feed, then load the
    /// initial snapshot.
    ///
    /// Subscription comes first so a write landing between subscribe and
    /// load is replayed to the scheduler instead of lost.
    pub async fn open(
        store: Arc<dyn OrderingStore>,
        feed: Arc<dyn ChangeFeed>,
        board_id: impl Into<String>,
        config: EngineConfig,
    ) -> Result<Self, EngineError> {
        let board_id = board_id.into();
        let cache = Arc::new(OptimisticCache::new(store, board_id.clone()));

        let scheduler = ReconcileScheduler::spawn(
            feed,
            Arc::clone(&cache),
            board_id.clone(),
            config.reconcile_debounce,
        )
        .await?;
        cache.set_repair_notifier(scheduler.request_sender()).await;
        cache.reconcile(ReconcileScope::Board).await?;

        info!(board = %board_id, role = ?config.role, "board view opened");
        Ok(Self {
            board_id,
            role: config.role,
            cache,
            drag: Mutex::new(DragController::new(config.activation_distance)),
            scheduler,
        })
    }

    /// Cloned read-only view of the board for rendering.
    pub async fn snapshot(&self) -> BoardSnapshot {
        self.cache.snapshot().await
    }

    /// Revision ticks, one per snapshot change. The current revision is
    /// delivered first so subscribers can render immediately.
    pub async fn subscribe_snapshot(&self) -> Pin<Box<dyn Stream<Item = u64> + Send>> {
        self.cache.subscribe_revisions().await
    }

    pub async fn revision(&self) -> u64 {
        self.cache.revision().await
    }

    /// Moves whose position batches have not confirmed yet.
    pub async fn pending_moves(&self) -> usize {
        self.cache.pending_moves().await
    }

    /// Containers marked for repair by failed writes.
    pub async fn dirty_containers(&self) -> Vec<String> {
        self.cache.dirty_containers().await
    }

    /// Whether an activated drag session is underway.
    pub async fn is_dragging(&self) -> bool {
        self.drag.lock().await.is_dragging()
    }

    /// Arm a drag session on a grab. Returns false without arming when the
    /// actor's role cannot edit or the subject is not in the snapshot; a
    /// refusal is an expected interaction, not an error.
    pub async fn begin_drag(&self, kind: EntityKind, id: &str, at: PointerPoint) -> bool {
        if !self.role.can_edit() {
            debug!(id, role = ?self.role, "drag refused, read-only role");
            return false;
        }
        let snapshot = self.cache.snapshot().await;
        self.drag.lock().await.begin(kind, id, at, &snapshot)
    }

    /// Feed pointer movement. Returns true on the edge where the armed grab
    /// passes the activation distance and becomes a drag.
    pub async fn pointer_moved(&self, to: PointerPoint) -> bool {
        self.drag.lock().await.pointer_moved(to)
    }

    /// Feed a pointer-over event. A cross-container hover relocates the
    /// dragged item in the snapshot as a preview; returns whether the
    /// snapshot changed.
    pub async fn hover_over(&self, target: DropTarget) -> bool {
        let snapshot = self.cache.snapshot().await;
        let preview = {
            let mut drag = self.drag.lock().await;
            drag.hover(target, &snapshot)
        };
        match preview {
            Some(preview) => self.cache.apply_preview(&preview).await,
            None => false,
        }
    }

    /// Finish the drag session on pointer release.
    ///
    /// Returns `Ok(true)` when a move intent was applied (and its position
    /// batch handed to the store), `Ok(false)` for a grab that never
    /// activated (a plain click). An activated drag that resolves to no
    /// valid move reports `InvalidDropTarget` with the snapshot already
    /// restored; a subject that vanished mid-drag reports `StaleMoveIntent`
    /// and forces a refresh of the affected scope.
    pub async fn drop_on(&self, target: Option<DropTarget>) -> Result<bool, EngineError> {
        let target_id = target.as_ref().map(|t| match t {
            DropTarget::Container(id) | DropTarget::Item(id) => id.clone(),
        });
        let snapshot = self.cache.snapshot().await;
        let (was_dragging, outcome) = {
            let mut drag = self.drag.lock().await;
            let was_dragging = drag.is_dragging();
            (was_dragging, drag.drop_on(target, &snapshot))
        };

        match outcome {
            DropOutcome::Commit(intent) => {
                let scope = match intent.subject_kind {
                    EntityKind::Container => ReconcileScope::Board,
                    EntityKind::Item => ReconcileScope::Items,
                };
                match self.cache.apply_move_intent(intent).await {
                    Ok(()) => Ok(true),
                    Err(error) => {
                        warn!(error = %error, "drop could not be applied, forcing a refresh");
                        self.scheduler.request(scope).await;
                        Err(error)
                    }
                }
            }
            DropOutcome::Cancelled { restore } => {
                if let Some(previous) = restore {
                    self.cache.restore_snapshot(*previous).await;
                }
                if was_dragging {
                    Err(EngineError::InvalidDropTarget { target: target_id })
                } else {
                    Ok(false)
                }
            }
        }
    }

    /// Abort any drag session (escape, focus loss, view switch), undoing
    /// hover previews. Returns whether a session was active.
    pub async fn cancel_drag(&self) -> bool {
        let (was_active, restore) = {
            let mut drag = self.drag.lock().await;
            let was_active = drag.is_active();
            (was_active, drag.cancel())
        };
        if let Some(previous) = restore {
            self.cache.restore_snapshot(*previous).await;
        }
        was_active
    }

    /// Force a reconcile outside the feed path. Shares the debounce window
    /// with feed-driven reconciles.
    pub async fn request_reconcile(&self, scope: ReconcileScope) {
        self.scheduler.request(scope).await;
    }

    /// Tear down the board view. The feed task stops; the snapshot and any
    /// unconfirmed moves are discarded.
    pub async fn close(self) {
        self.scheduler.shutdown().await;
        info!(board = %self.board_id, "board view closed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use corkboard_api::Container;

    async fn open_engine(role: BoardRole) -> (MemoryStore, BoardEngine, Container, Container) {
        let store = MemoryStore::new();
        let backlog = store.insert_container("board-1", "Backlog");
        let doing = store.insert_container("board-1", "Doing");
        store.insert_item(&backlog.id, "a").unwrap();
        store.insert_item(&backlog.id, "b").unwrap();
        store.insert_item(&doing.id, "c").unwrap();

        let engine = BoardEngine::open(
            Arc::new(store.clone()),
            Arc::new(store.clone()),
            "board-1",
            EngineConfig {
                role,
                ..EngineConfig::default()
            },
        )
        .await
        .unwrap();
        (store, engine, backlog, doing)
    }

    fn item_ids(snapshot: &BoardSnapshot, container_id: &str) -> Vec<String> {
        snapshot
            .entry(container_id)
            .map(|entry| entry.items.iter().map(|i| i.id.clone()).collect())
            .unwrap_or_default()
    }

    #[test]
    fn test_config_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.activation_distance, DEFAULT_ACTIVATION_DISTANCE);
        assert_eq!(config.reconcile_debounce, Duration::from_millis(30));
        assert_eq!(config.role, BoardRole::Member);
    }

    #[test]
    fn test_partial_config_parses_with_defaults() {
        let config = EngineConfig::from_json(r#"{"role": "Observer"}"#).unwrap();
        assert_eq!(config.role, BoardRole::Observer);
        assert_eq!(config.activation_distance, DEFAULT_ACTIVATION_DISTANCE);

        let config =
            EngineConfig::from_json(r#"{"reconcile_debounce": {"secs": 0, "nanos": 50000000}}"#)
                .unwrap();
        assert_eq!(config.reconcile_debounce, Duration::from_millis(50));
    }

    #[tokio::test]
    async fn test_observer_cannot_arm_a_drag() {
        let (_store, engine, backlog, _doing) = open_engine(BoardRole::Observer).await;
        let first = item_ids(&engine.snapshot().await, &backlog.id)[0].clone();

        assert!(
            !engine
                .begin_drag(EntityKind::Item, &first, PointerPoint::new(0.0, 0.0))
                .await
        );
        assert!(!engine.is_dragging().await);
        engine.close().await;
    }

    #[tokio::test]
    async fn test_click_without_movement_changes_nothing() {
        let (_store, engine, backlog, _doing) = open_engine(BoardRole::Member).await;
        let before = engine.snapshot().await;
        let first = item_ids(&before, &backlog.id)[0].clone();

        assert!(
            engine
                .begin_drag(EntityKind::Item, &first, PointerPoint::new(10.0, 10.0))
                .await
        );
        // Two pixels of travel: still a click.
        assert!(!engine.pointer_moved(PointerPoint::new(12.0, 10.0)).await);
        let result = engine
            .drop_on(Some(DropTarget::Container(backlog.id.clone())))
            .await;
        assert!(!result.unwrap(), "no intent from a plain click");
        assert_eq!(engine.snapshot().await, before);
        engine.close().await;
    }

    #[tokio::test]
    async fn test_activated_drop_over_nothing_restores_and_reports() {
        let (_store, engine, backlog, doing) = open_engine(BoardRole::Member).await;
        let before = engine.snapshot().await;
        let first = item_ids(&before, &backlog.id)[0].clone();

        engine
            .begin_drag(EntityKind::Item, &first, PointerPoint::new(10.0, 10.0))
            .await;
        assert!(engine.pointer_moved(PointerPoint::new(40.0, 10.0)).await);
        // The hover preview visibly relocates the item.
        assert!(engine.hover_over(DropTarget::Container(doing.id.clone())).await);
        assert_ne!(engine.snapshot().await, before);

        let result = engine.drop_on(None).await;
        match result {
            Err(EngineError::InvalidDropTarget { target: None }) => {}
            other => panic!("expected an invalid-target report, got {:?}", other),
        }
        assert_eq!(
            engine.snapshot().await,
            before,
            "an abandoned drag leaves the board exactly as it found it"
        );
        assert!(!engine.is_dragging().await);
        engine.close().await;
    }

    #[tokio::test]
    async fn test_drag_commit_moves_the_item() {
        let (_store, engine, backlog, doing) = open_engine(BoardRole::Member).await;
        let snapshot = engine.snapshot().await;
        let first = item_ids(&snapshot, &backlog.id)[0].clone();

        engine
            .begin_drag(EntityKind::Item, &first, PointerPoint::new(10.0, 10.0))
            .await;
        engine.pointer_moved(PointerPoint::new(40.0, 10.0)).await;
        let committed = engine
            .drop_on(Some(DropTarget::Container(doing.id.clone())))
            .await
            .unwrap();
        assert!(committed);

        let after = engine.snapshot().await;
        assert_eq!(item_ids(&after, &backlog.id).len(), 1);
        assert_eq!(
            item_ids(&after, &doing.id).last().map(String::as_str),
            Some(first.as_str())
        );
        engine.close().await;
    }

    #[tokio::test]
    async fn test_cancel_mid_hover_restores_the_board() {
        let (_store, engine, backlog, doing) = open_engine(BoardRole::Member).await;
        let before = engine.snapshot().await;
        let first = item_ids(&before, &backlog.id)[0].clone();

        engine
            .begin_drag(EntityKind::Item, &first, PointerPoint::new(10.0, 10.0))
            .await;
        engine.pointer_moved(PointerPoint::new(40.0, 10.0)).await;
        engine.hover_over(DropTarget::Container(doing.id.clone())).await;

        assert!(engine.cancel_drag().await);
        assert_eq!(engine.snapshot().await, before);
        assert!(!engine.cancel_drag().await, "no session left to cancel");
        engine.close().await;
    }
}
