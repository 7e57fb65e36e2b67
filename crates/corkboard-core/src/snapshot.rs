//! In-memory ordered view of one board
//!
//! The snapshot is the sole mutable state the engine owns: containers in
//! display order, each with its items in display order. It is rebuilt
//! wholesale from a store read on reconcile and patched in place by
//! optimistic moves. Sequence order is authoritative here; the stored
//! `position` fields are kept in sync by renumbering whenever a move is
//! applied.

use corkboard_api::{Container, EngineError, EntityKind, Item, PositionUpdate};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::intent::MoveIntent;
use crate::position::{clamp_index, renumber, Positioned};

/// One container plus its ordered items.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContainerEntry {
    pub container: Container,
    pub items: Vec<Item>,
}

impl Positioned for ContainerEntry {
    fn id(&self) -> &str {
        &self.container.id
    }

    fn position(&self) -> i64 {
        self.container.position
    }

    fn kind() -> EntityKind {
        EntityKind::Container
    }
}

/// The engine's in-memory ordered view of one board.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoardSnapshot {
    pub board_id: String,
    pub containers: Vec<ContainerEntry>,
}

impl BoardSnapshot {
    pub fn empty(board_id: impl Into<String>) -> Self {
        Self {
            board_id: board_id.into(),
            containers: Vec::new(),
        }
    }

    /// Assemble a snapshot from ordered store reads. `containers` must
    /// already be in display order and `items` ordered within each
    /// container; grouping preserves both. Items referencing an unknown
    /// container are dropped (their container was deleted concurrently).
    pub fn from_parts(
        board_id: impl Into<String>,
        containers: Vec<Container>,
        items: Vec<Item>,
    ) -> Self {
        let containers: Vec<ContainerEntry> = containers
            .into_iter()
            .map(|container| {
                let items: Vec<Item> = items
                    .iter()
                    .filter(|item| item.container_id == container.id)
                    .cloned()
                    .collect();
                ContainerEntry { container, items }
            })
            .collect();

        Self {
            board_id: board_id.into(),
            containers,
        }
    }

    pub fn container_index(&self, container_id: &str) -> Option<usize> {
        self.containers
            .iter()
            .position(|entry| entry.container.id == container_id)
    }

    pub fn entry(&self, container_id: &str) -> Option<&ContainerEntry> {
        self.container_index(container_id)
            .map(|ci| &self.containers[ci])
    }

    /// Locate an item as (container index, item index).
    pub fn locate_item(&self, item_id: &str) -> Option<(usize, usize)> {
        for (ci, entry) in self.containers.iter().enumerate() {
            if let Some(ii) = entry.items.iter().position(|item| item.id == item_id) {
                return Some((ci, ii));
            }
        }
        None
    }

    pub fn find_item(&self, item_id: &str) -> Option<&Item> {
        self.locate_item(item_id)
            .map(|(ci, ii)| &self.containers[ci].items[ii])
    }

    /// Container currently holding an item.
    pub fn container_of_item(&self, item_id: &str) -> Option<&str> {
        self.locate_item(item_id)
            .map(|(ci, _)| self.containers[ci].container.id.as_str())
    }

    pub fn container_ids(&self) -> Vec<String> {
        self.containers
            .iter()
            .map(|entry| entry.container.id.clone())
            .collect()
    }

    pub fn total_items(&self) -> usize {
        self.containers.iter().map(|entry| entry.items.len()).sum()
    }

    /// Relocate an item to the end of another container without touching
    /// any position value. Hover previews use this; the move is visual only
    /// until a drop commits an intent. Returns false when nothing changed
    /// (unknown item, unknown target, or the item is already there).
    pub fn preview_reassign(&mut self, item_id: &str, target_container_id: &str) -> bool {
        let target_ci = match self.container_index(target_container_id) {
            Some(ci) => ci,
            None => return false,
        };
        let (current_ci, current_ii) = match self.locate_item(item_id) {
            Some(location) => location,
            None => return false,
        };
        if current_ci == target_ci {
            return false;
        }

        let mut item = self.containers[current_ci].items.remove(current_ii);
        item.container_id = target_container_id.to_string();
        self.containers[target_ci].items.push(item);
        debug!(item_id, target_container_id, "preview reassign");
        true
    }

    /// Apply a move intent: remove the subject from wherever it currently
    /// sits, insert it at the clamped target index, and renumber every
    /// touched container 0..N-1. Returns the full position batch to
    /// persist, or an empty batch when the move changes nothing.
    ///
    /// # Errors
    ///
    /// `StaleMoveIntent` when the subject or the target container is no
    /// longer present; the snapshot is left unmodified in that case.
    pub fn apply_move(&mut self, intent: &MoveIntent) -> Result<Vec<PositionUpdate>, EngineError> {
        match intent.subject_kind {
            EntityKind::Item => self.apply_item_move(intent),
            EntityKind::Container => self.apply_container_move(intent),
        }
    }

    fn apply_item_move(&mut self, intent: &MoveIntent) -> Result<Vec<PositionUpdate>, EngineError> {
        let (current_ci, current_ii) = match self.locate_item(&intent.subject_id) {
            Some(location) => location,
            None => return Err(EngineError::stale(&intent.subject_id)),
        };
        let target_ci = match self.container_index(&intent.target_container_id) {
            Some(ci) => ci,
            None => return Err(EngineError::stale(&intent.target_container_id)),
        };

        // An in-place drop is a no-op: nothing moves, nothing is written.
        // Covers the only-item-in-a-container case.
        if current_ci == target_ci
            && self.containers[current_ci].container.id == intent.source_container_id
        {
            let post_removal_len = self.containers[current_ci].items.len() - 1;
            if clamp_index(intent.target_index, post_removal_len) == current_ii {
                return Ok(Vec::new());
            }
        }

        let mut item = self.containers[current_ci].items.remove(current_ii);
        let resolved = clamp_index(
            intent.target_index,
            self.containers[target_ci].items.len(),
        );
        item.container_id = self.containers[target_ci].container.id.clone();
        self.containers[target_ci].items.insert(resolved, item);

        // Renumber the target, the true source (which a hover preview may
        // already have emptied of the subject), and the container the
        // subject was previewed into, deduplicated.
        let mut touched = vec![target_ci];
        if let Some(source_ci) = self.container_index(&intent.source_container_id) {
            if !touched.contains(&source_ci) {
                touched.push(source_ci);
            }
        }
        if !touched.contains(&current_ci) {
            touched.push(current_ci);
        }

        let mut batch = Vec::new();
        for ci in touched {
            batch.extend(self.renumber_container_items(ci));
        }

        // The moved row always carries its container id so a cross-container
        // move stays a single row write.
        for update in batch.iter_mut() {
            if update.id == intent.subject_id {
                update.new_container_id = Some(intent.target_container_id.clone());
            }
        }

        debug!(
            subject = %intent.subject_id,
            target = %intent.target_container_id,
            index = resolved,
            rows = batch.len(),
            "applied item move"
        );
        Ok(batch)
    }

    fn apply_container_move(
        &mut self,
        intent: &MoveIntent,
    ) -> Result<Vec<PositionUpdate>, EngineError> {
        let current = match self.container_index(&intent.subject_id) {
            Some(ci) => ci,
            None => return Err(EngineError::stale(&intent.subject_id)),
        };

        let post_removal_len = self.containers.len() - 1;
        let resolved = clamp_index(intent.target_index, post_removal_len);
        if resolved == current {
            return Ok(Vec::new());
        }

        let entry = self.containers.remove(current);
        self.containers.insert(resolved, entry);
        for (i, entry) in self.containers.iter_mut().enumerate() {
            entry.container.position = i as i64;
        }

        debug!(
            subject = %intent.subject_id,
            index = resolved,
            rows = self.containers.len(),
            "applied container move"
        );
        Ok(renumber(&self.containers))
    }

    fn renumber_container_items(&mut self, ci: usize) -> Vec<PositionUpdate> {
        for (i, item) in self.containers[ci].items.iter_mut().enumerate() {
            item.position = i as i64;
        }
        renumber(&self.containers[ci].items)
    }
}
