use serde::{Deserialize, Serialize};

use async_trait::async_trait;
use std::{pin::Pin, sync::Arc};
use tokio::sync::{mpsc, Mutex};
use tokio_stream::Stream;

use crate::EngineError;

/// Position in the change stream to start watching from.
///
/// Used with `watch_changes_since()` to control whether a subscriber replays
/// missed batches or receives only new ones.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum StreamPosition {
    /// Start from the beginning of the retained event log.
    Beginning,
    /// Stream only batches recorded after this version.
    Version(u64),
}

/// Origin of a change event relative to the subscribing client.
///
/// Feeds echo a client's own writes back to it; `Local` marks those echoes
/// so receivers can distinguish them in logs. The engine reconciles on both
/// origins, since an echoed refresh is harmless and simpler than suppression.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ChangeOrigin {
    /// Change initiated by this client.
    Local,
    /// Change made by another actor.
    Remote,
}

impl ChangeOrigin {
    pub fn is_local(&self) -> bool {
        matches!(self, ChangeOrigin::Local)
    }
}

/// Row-level event kind reported by the feed.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ChangeKind {
    Created,
    Updated,
    Deleted,
}

/// Coarse scope tag naming what changed.
///
/// The feed cannot promise a payload or filtering beyond these tags; in
/// particular item changes arrive board-unscoped because the underlying
/// stream has no board column to filter on. Receivers treat every tag as a
/// cue to refresh the scope, never as a diff to apply.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum ChangeScope {
    /// Containers of one board changed (created, deleted, retitled,
    /// reordered).
    Containers { board_id: String },
    /// Items changed somewhere, board-unscoped.
    Items,
    /// A board's label definitions changed.
    Labels { board_id: String },
    /// Item-label assignments changed, board-unscoped.
    ItemLabels,
    /// Comments on items changed, board-unscoped.
    Comments,
    /// A board's membership changed.
    Members { board_id: String },
}

impl ChangeScope {
    /// Storage table this scope maps to.
    pub fn table(&self) -> &'static str {
        match self {
            ChangeScope::Containers { .. } => "lists",
            ChangeScope::Items => "cards",
            ChangeScope::Labels { .. } => "labels",
            ChangeScope::ItemLabels => "card_labels",
            ChangeScope::Comments => "comments",
            ChangeScope::Members { .. } => "board_members",
        }
    }

    /// Whether a reconcile for this scope must refresh container ordering.
    /// Every other scope only refreshes item data.
    pub fn affects_containers(&self) -> bool {
        matches!(self, ChangeScope::Containers { .. })
    }

    /// The board this scope is filtered to, when the feed can filter at all.
    pub fn board_id(&self) -> Option<&str> {
        match self {
            ChangeScope::Containers { board_id }
            | ChangeScope::Labels { board_id }
            | ChangeScope::Members { board_id } => Some(board_id),
            ChangeScope::Items | ChangeScope::ItemLabels | ChangeScope::Comments => None,
        }
    }
}

/// One change notification.
///
/// Carries no row payload. A single logical edit may emit many of these
/// (a batched move writes N rows); receivers are expected to coalesce.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChangeEvent {
    pub scope: ChangeScope,
    pub kind: ChangeKind,
    pub origin: ChangeOrigin,
}

/// Real-time change notification.
///
/// Streams batches of coarse change events so an open board view can refresh
/// affected scopes as other actors edit. Backends that support realtime
/// updates implement this trait; the stream is vendor-neutral
/// (`tokio_stream::Stream`) and adapts to any delivery transport.
///
/// # Example
///
/// ```rust,no_run
/// use corkboard_api::{ChangeFeed, EngineError, StreamPosition};
/// use tokio_stream::StreamExt;
///
/// async fn example(feed: impl ChangeFeed) -> Result<(), EngineError> {
///     let mut stream = feed.watch_changes_since(StreamPosition::Beginning).await;
///
///     while let Some(batch) = stream.next().await {
///         for event in batch? {
///             println!("{} changed: {:?}", event.scope.table(), event.kind);
///         }
///     }
///
///     // Stream unsubscribes when dropped
///     Ok(())
/// }
/// ```
#[async_trait]
pub trait ChangeFeed: Send + Sync {
    /// Subscribe to change events since a specific position.
    ///
    /// - `StreamPosition::Beginning`: first replays every retained event
    ///   batch, then continues streaming live changes.
    /// - `StreamPosition::Version(v)`: replays only batches recorded after
    ///   version `v`, then continues live.
    ///
    /// # Returns
    ///
    /// A stream yielding `Result<Vec<ChangeEvent>, EngineError>` batches.
    /// Errors are delivered through the stream rather than terminating it.
    /// Dropping the stream unsubscribes; no explicit cleanup call exists.
    async fn watch_changes_since(
        &self,
        position: StreamPosition,
    ) -> Pin<Box<dyn Stream<Item = Result<Vec<ChangeEvent>, EngineError>> + Send>>;

    /// Current version counter of the feed, usable as a resume point.
    async fn current_version(&self) -> Result<u64, EngineError>;
}

/// One registered feed subscriber: the delivery channel plus the actor
/// identity it subscribed as, used to mark each event's origin per receiver.
#[derive(Debug, Clone)]
pub struct FeedSubscriber {
    pub actor_id: String,
    pub sender: mpsc::Sender<Result<Vec<ChangeEvent>, EngineError>>,
}

/// Type alias for change feed subscribers
pub type FeedSubscribers = Arc<Mutex<Vec<FeedSubscriber>>>;
