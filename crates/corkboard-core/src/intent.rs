//! Move intent: the resolved output of a completed drag

use corkboard_api::EntityKind;
use serde::{Deserialize, Serialize};

/// Resolved description of one completed drag, ready for position
/// computation.
///
/// `source_container_id` is the subject's container at drag activation, not
/// after any hover previews; stale checks and reconcile scoping refer to
/// where the subject actually came from. For container reorders both
/// container fields hold the board id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MoveIntent {
    pub subject_kind: EntityKind,
    pub subject_id: String,
    pub source_container_id: String,
    /// Equal to `source_container_id` for a same-container reorder.
    pub target_container_id: String,
    /// Index within the target container's visible ordering, resolved with
    /// the subject still in place and clamped to `[0, len]` at application
    /// time.
    pub target_index: i64,
}

impl MoveIntent {
    /// Whether the move crosses containers (false for a reorder in place).
    pub fn is_cross_container(&self) -> bool {
        self.source_container_id != self.target_container_id
    }

    /// Container ids this intent touches, deduplicated.
    pub fn touched_containers(&self) -> Vec<&str> {
        if self.is_cross_container() {
            vec![
                self.source_container_id.as_str(),
                self.target_container_id.as_str(),
            ]
        } else {
            vec![self.source_container_id.as_str()]
        }
    }
}
