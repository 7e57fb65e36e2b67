//! Ordering store access
//!
//! This module defines the slice of the backing store the engine reads and
//! writes: ordered container/item rows and batched position updates.
//! Backends implement [`OrderingStore`] together with
//! [`corkboard_api::ChangeFeed`] so the cache can both fetch rows and react
//! to rows changed by other actors.

use async_trait::async_trait;
use corkboard_api::{Container, EngineError, Item, PositionUpdate};

pub mod memory;

pub use memory::MemoryStore;

/// Row-level access to container and item ordering.
///
/// Implementations return rows sorted by `(position, id)`. Position values
/// are not unique under concurrent writers, so the id tiebreak is what keeps
/// every client that reads the same rows agreeing on one order.
#[async_trait]
pub trait OrderingStore: Send + Sync {
    /// Fetch every container of a board, sorted by `(position, id)`.
    async fn list_containers(&self, board_id: &str) -> Result<Vec<Container>, EngineError>;

    /// Fetch the items of the given containers, sorted by `(position, id)`
    /// within each container and concatenated in the order the ids were
    /// given. An empty `container_ids` yields `Ok(vec![])` without a store
    /// round trip.
    async fn list_items(&self, container_ids: &[String]) -> Result<Vec<Item>, EngineError>;

    /// Write a batch of position updates, one row at a time.
    ///
    /// The batch is not atomic: rows written before a failure stay written,
    /// and the first failure is reported. Updates naming rows that no longer
    /// exist are skipped, matching an UPDATE that touches zero rows.
    async fn apply_positions(&self, updates: &[PositionUpdate]) -> Result<(), EngineError>;
}
