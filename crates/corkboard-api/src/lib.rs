use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub mod streaming;

// Re-export streaming types
pub use streaming::{
    ChangeEvent, ChangeFeed, ChangeKind, ChangeOrigin, ChangeScope, FeedSubscriber,
    FeedSubscribers, StreamPosition,
};

/// An ordered column on a board (a "list").
///
/// Containers are created and deleted by the CRUD layer; the ordering engine
/// only ever rewrites their `position`. Positions are unique in practice but
/// not enforced, and gaps are tolerated; reads sort by `(position, id)` so
/// ties never produce an ambiguous order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Container {
    pub id: String,
    pub board_id: String,
    pub position: i64,
    pub title: String,
    pub created_at: DateTime<Utc>,
}

/// An ordered card within a container.
///
/// Labels and comments relate to items but are owned by the CRUD layer; the
/// engine sees them only as change-feed scopes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Item {
    pub id: String,
    pub container_id: String,
    pub position: i64,
    pub title: String,
    pub description: Option<String>,
    pub due_date: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Kind of entity a drag subject or position update refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntityKind {
    Container,
    Item,
}

impl EntityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Container => "container",
            EntityKind::Item => "item",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "container" => Some(EntityKind::Container),
            "item" => Some(EntityKind::Item),
            _ => None,
        }
    }
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One row write in a position batch.
///
/// A batch of these is what `apply_positions` persists. The batch is
/// best-effort: each update is an independent row write with no cross-row
/// transaction, so a failure partway through leaves earlier writes in place.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PositionUpdate {
    pub entity: EntityKind,
    pub id: String,
    pub new_position: i64,
    /// Set on the moved item's row, same-container moves included; `None`
    /// on rows that only renumber, keeping the current parent. Always
    /// `None` for containers.
    pub new_container_id: Option<String>,
}

/// Role of the current actor on a board.
///
/// The engine consults this only to gate whether position writes may be
/// issued; all other authorization lives with the membership collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BoardRole {
    Admin,
    Member,
    Observer,
}

impl BoardRole {
    pub fn can_edit(&self) -> bool {
        matches!(self, BoardRole::Admin | BoardRole::Member)
    }
}

/// Structured error types for engine operations.
///
/// All variants are recoverable: the policy for each is a refresh of the
/// affected scope, never a process failure or a blocking dialog.
#[derive(Debug, Clone, Serialize, Deserialize, thiserror::Error)]
pub enum EngineError {
    /// A read or write to the storage collaborator failed
    /// (network/transport/permission). Optimistic local state is not rolled
    /// back; the affected containers are reconciled on next opportunity.
    #[error("Ordering store unavailable: {message}")]
    StoreUnavailable { message: String },

    /// A drop resolved to no valid container or item. The snapshot is left
    /// unchanged and the drag session returns to idle.
    #[error("Invalid drop target: {target:?}")]
    InvalidDropTarget { target: Option<String> },

    /// A move intent's subject no longer exists in the current snapshot,
    /// e.g. it was deleted by another actor mid-drag. The intent is
    /// discarded whole; partial application is never attempted.
    #[error("Stale move intent: {subject} is no longer in the snapshot")]
    StaleMoveIntent { subject: String },
}

impl EngineError {
    pub fn store_unavailable(message: impl Into<String>) -> Self {
        EngineError::StoreUnavailable {
            message: message.into(),
        }
    }

    pub fn stale(subject: impl Into<String>) -> Self {
        EngineError::StaleMoveIntent {
            subject: subject.into(),
        }
    }
}
