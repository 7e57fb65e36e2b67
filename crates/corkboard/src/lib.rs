//! Kanban board ordering and reconciliation engine
//!
//! `BoardEngine` is the entry point: open one per board view, feed it
//! pointer events, render from its snapshot. Under it sit the optimistic
//! cache (`cache`), the debounced feed watcher (`feed`), and the storage
//! trait with its in-memory implementation (`store`). The pure ordering
//! math lives in `corkboard-core`; shared entity and error types in
//! `corkboard-api`.

pub mod cache;
pub mod engine;
pub mod feed;
pub mod store;

pub use cache::{OptimisticCache, ReconcileScope};
pub use engine::{BoardEngine, EngineConfig};
pub use feed::ReconcileScheduler;
pub use store::{MemoryStore, OrderingStore};

// Re-export the api/core types hosts need to drive the engine or implement
// a store of their own
pub use corkboard_api::{
    BoardRole, ChangeEvent, ChangeFeed, ChangeKind, ChangeOrigin, ChangeScope, Container,
    EngineError, EntityKind, Item, PositionUpdate, StreamPosition,
};
pub use corkboard_core::{
    BoardSnapshot, ContainerEntry, DropTarget, MoveIntent, PointerPoint, PreviewMove,
};
