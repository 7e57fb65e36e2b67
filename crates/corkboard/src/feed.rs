//! Change feed watcher and reconcile scheduling
//!
//! One task per open board view subscribes to the store's change feed and
//! folds bursts of coarse events into debounced reconcile passes. The feed
//! carries no payload contract, so events only ever schedule a refresh of
//! the affected scope; a batched move that touches N rows emits N events
//! and still costs one reconcile.

use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};
use tokio_stream::{Stream, StreamExt};
use tracing::{debug, info, warn};

use corkboard_api::{ChangeEvent, ChangeFeed, ChangeScope, EngineError, StreamPosition};

use crate::cache::{OptimisticCache, ReconcileScope};

/// Debounced reconcile driver for one open board view.
///
/// Feed events and forced requests funnel into a single task; everything
/// arriving inside one debounce window coalesces into one reconcile of the
/// widest requested scope.
pub struct ReconcileScheduler {
    requests: mpsc::Sender<ReconcileScope>,
    task: JoinHandle<()>,
}

impl ReconcileScheduler {
    /// Subscribe to the feed from its current version and start scheduling.
    pub async fn spawn(
        feed: Arc<dyn ChangeFeed>,
        cache: Arc<OptimisticCache>,
        board_id: impl Into<String>,
        debounce: Duration,
    ) -> Result<Self, EngineError> {
        let board_id = board_id.into();
        let version = feed.current_version().await?;
        let stream = feed
            .watch_changes_since(StreamPosition::Version(version))
            .await;
        let (requests, requests_rx) = mpsc::channel(32);
        info!(board = %board_id, version, "watching change feed");
        let task = tokio::spawn(run(stream, requests_rx, cache, board_id, debounce));
        Ok(Self { requests, task })
    }

    /// Sender for forced reconcile requests (repair after failed writes).
    pub fn request_sender(&self) -> mpsc::Sender<ReconcileScope> {
        self.requests.clone()
    }

    /// Ask for a reconcile outside the feed path. Coalesces with feed
    /// events like any other trigger.
    pub async fn request(&self, scope: ReconcileScope) {
        if self.requests.send(scope).await.is_err() {
            warn!("scheduler task is gone, reconcile request dropped");
        }
    }

    /// Stop watching. In-flight store calls may complete, but nothing
    /// consumes their results afterwards.
    pub async fn shutdown(self) {
        self.task.abort();
        let _ = self.task.await;
    }
}

/// Scope an event maps to, if it concerns this board's ordering at all.
///
/// Origin is not consulted: an echo of our own write schedules a refresh
/// like any other event, and the refresh finds nothing new. Reconciling
/// unconditionally is simpler than suppressing echoes and costs one read.
fn scope_for_event(event: &ChangeEvent, board_id: &str) -> Option<ReconcileScope> {
    match &event.scope {
        ChangeScope::Containers {
            board_id: event_board,
        } => {
            if event_board == board_id {
                Some(ReconcileScope::Board)
            } else {
                None
            }
        }
        // Item rows are board-unscoped in the feed; refresh and let the
        // rebuild drop anything that is not ours.
        ChangeScope::Items => Some(ReconcileScope::Items),
        // Relation tables carry no ordering payload but render inside
        // items, so their changes refresh item rows.
        ChangeScope::ItemLabels | ChangeScope::Comments => Some(ReconcileScope::Items),
        ChangeScope::Labels {
            board_id: event_board,
        }
        | ChangeScope::Members {
            board_id: event_board,
        } => {
            if event_board == board_id {
                Some(ReconcileScope::Items)
            } else {
                None
            }
        }
    }
}

fn schedule(
    pending: &mut Option<ReconcileScope>,
    deadline: &mut Option<Instant>,
    scope: ReconcileScope,
    debounce: Duration,
) {
    *pending = Some(match *pending {
        Some(existing) => existing.merge(scope),
        None => scope,
    });
    // The window opens on the first trigger; later ones coalesce into it
    // without extending it.
    if deadline.is_none() {
        *deadline = Some(Instant::now() + debounce);
    }
}

async fn run(
    mut stream: Pin<Box<dyn Stream<Item = Result<Vec<ChangeEvent>, EngineError>> + Send>>,
    mut requests: mpsc::Receiver<ReconcileScope>,
    cache: Arc<OptimisticCache>,
    board_id: String,
    debounce: Duration,
) {
    let mut pending: Option<ReconcileScope> = None;
    let mut deadline: Option<Instant> = None;
    let mut feed_open = true;

    loop {
        let wakeup = deadline.unwrap_or_else(Instant::now);
        tokio::select! {
            _ = sleep_until(wakeup), if deadline.is_some() => {
                deadline = None;
                if let Some(scope) = pending.take() {
                    if let Err(error) = cache.reconcile(scope).await {
                        // The store read failed; the next event or forced
                        // request tries again.
                        warn!(error = %error, "reconcile failed, waiting for the next trigger");
                    }
                }
            }
            batch = stream.next(), if feed_open => match batch {
                Some(Ok(events)) => {
                    for event in events {
                        if let Some(scope) = scope_for_event(&event, &board_id) {
                            debug!(
                                scope = ?scope,
                                kind = ?event.kind,
                                origin = ?event.origin,
                                "change event queued"
                            );
                            schedule(&mut pending, &mut deadline, scope, debounce);
                        }
                    }
                }
                Some(Err(error)) => {
                    warn!(error = %error, "change feed error");
                }
                None => {
                    debug!("change feed closed");
                    feed_open = false;
                }
            },
            request = requests.recv() => match request {
                Some(scope) => schedule(&mut pending, &mut deadline, scope, debounce),
                None => break,
            },
            else => break,
        }
    }
}
