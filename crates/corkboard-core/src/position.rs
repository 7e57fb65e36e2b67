//! Integer position utilities for container ordering
//!
//! Positions are plain integers. Gaps are tolerated on read (reads sort by
//! position, then id), but the baseline write strategy is always-correct
//! full renumbering: after any reorder, every affected container's entities
//! are reassigned 0..N-1 in their new order and all N updates go out as one
//! logical batch.

use corkboard_api::{Container, EntityKind, Item, PositionUpdate};

/// Entities that carry an integer position within an ordered parent.
pub trait Positioned {
    fn id(&self) -> &str;
    fn position(&self) -> i64;
    fn kind() -> EntityKind;
}

impl Positioned for Container {
    fn id(&self) -> &str {
        &self.id
    }

    fn position(&self) -> i64 {
        self.position
    }

    fn kind() -> EntityKind {
        EntityKind::Container
    }
}

impl Positioned for Item {
    fn id(&self) -> &str {
        &self.id
    }

    fn position(&self) -> i64 {
        self.position
    }

    fn kind() -> EntityKind {
        EntityKind::Item
    }
}

/// Clamp a requested insertion index into `[0, len]`.
///
/// Both ends are valid insertion points: −1 clamps to 0, anything past the
/// end clamps to `len`. Out-of-range input is never an error.
pub fn clamp_index(requested: i64, len: usize) -> usize {
    if requested < 0 {
        0
    } else if requested as usize > len {
        len
    } else {
        requested as usize
    }
}

/// Full renumbering batch for one sequence: every entity is assigned its
/// index 0..N-1 in the current order.
///
/// The batch intentionally covers all N rows, not just the ones whose
/// position changed; the caller issues it as one logical write.
pub fn renumber<T: Positioned>(sequence: &[T]) -> Vec<PositionUpdate> {
    sequence
        .iter()
        .enumerate()
        .map(|(index, entity)| PositionUpdate {
            entity: T::kind(),
            id: entity.id().to_string(),
            new_position: index as i64,
            new_container_id: None,
        })
        .collect()
}

/// Creation-time position for a new sibling: one past the current maximum,
/// 0 when the sequence is empty.
pub fn next_position<T: Positioned>(siblings: &[T]) -> i64 {
    siblings
        .iter()
        .map(|s| s.position())
        .max()
        .map_or(0, |max| max + 1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn item(id: &str, position: i64) -> Item {
        Item {
            id: id.to_string(),
            container_id: "list-1".to_string(),
            position,
            title: id.to_string(),
            description: None,
            due_date: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_clamp_negative_to_zero() {
        assert_eq!(clamp_index(-1, 3), 0);
        assert_eq!(clamp_index(-100, 3), 0);
    }

    #[test]
    fn test_clamp_past_end_to_len() {
        assert_eq!(clamp_index(4, 3), 3);
        assert_eq!(clamp_index(1000, 3), 3);
    }

    #[test]
    fn test_clamp_in_range_unchanged() {
        assert_eq!(clamp_index(0, 3), 0);
        assert_eq!(clamp_index(2, 3), 2);
        assert_eq!(clamp_index(3, 3), 3);
        assert_eq!(clamp_index(0, 0), 0);
    }

    #[test]
    fn test_renumber_assigns_dense_positions() {
        // Ragged positions from earlier divergence: renumber flattens them
        let items = vec![item("b", 7), item("c", 7), item("a", 42)];
        let updates = renumber(&items);

        assert_eq!(updates.len(), 3);
        for (i, update) in updates.iter().enumerate() {
            assert_eq!(update.new_position, i as i64);
            assert_eq!(update.entity, EntityKind::Item);
            assert_eq!(update.new_container_id, None);
        }
        assert_eq!(updates[0].id, "b");
        assert_eq!(updates[1].id, "c");
        assert_eq!(updates[2].id, "a");
    }

    #[test]
    fn test_renumber_empty_is_empty() {
        let items: Vec<Item> = vec![];
        assert!(renumber(&items).is_empty());
    }

    #[test]
    fn test_next_position_is_max_plus_one() {
        let items: Vec<Item> = vec![];
        assert_eq!(next_position(&items), 0, "empty sequence starts at 0");

        let items = vec![item("a", 0), item("b", 5)];
        assert_eq!(
            next_position(&items),
            6,
            "gaps are tolerated, next is max + 1"
        );
    }
}
