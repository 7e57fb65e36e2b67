//! Drag session state machine
//!
//! Tracks one in-progress pointer drag: arm on grab, activate once the
//! pointer travels past a movement threshold (so plain clicks never become
//! drags), preview cross-container hovers, and resolve a single move intent
//! at drop. The controller only reads the snapshot handed to each call and
//! emits values; every snapshot mutation is funneled through the cache.

use corkboard_api::EntityKind;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::intent::MoveIntent;
use crate::snapshot::BoardSnapshot;

/// Pointer travel in pixels before an armed grab becomes a drag.
pub const DEFAULT_ACTIVATION_DISTANCE: f64 = 5.0;

/// A pointer coordinate in screen space.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PointerPoint {
    pub x: f64,
    pub y: f64,
}

impl PointerPoint {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn distance_to(&self, other: PointerPoint) -> f64 {
        (self.x - other.x).hypot(self.y - other.y)
    }
}

/// What the pointer is over, or was released over.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DropTarget {
    Container(String),
    Item(String),
}

/// Cross-container relocation emitted during hover: container reassignment
/// only, no index commitment and no position writes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreviewMove {
    pub item_id: String,
    pub to_container_id: String,
}

/// What a finished session asks the engine to do.
#[derive(Debug, Clone, PartialEq)]
pub enum DropOutcome {
    /// Persist this intent.
    Commit(MoveIntent),
    /// No intent was produced. `restore` holds the pre-drag snapshot when
    /// hover previews mutated the live one and must be undone.
    Cancelled { restore: Option<Box<BoardSnapshot>> },
}

#[derive(Debug, Clone, PartialEq)]
enum DragPhase {
    Idle,
    /// Pointer is down on the subject but has not travelled far enough.
    Armed { origin: PointerPoint },
    Dragging,
    Hovering { target: DropTarget },
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct DragSubject {
    kind: EntityKind,
    id: String,
    /// Container at drag start; for container subjects, the board id.
    source_container_id: String,
}

/// Client-local drag session controller.
///
/// One session at a time: `begin` arms, pointer movement past the
/// activation distance activates, `hover` may emit cross-container
/// previews, and `drop_on`/`cancel` finish the session and return what the
/// engine should do with the snapshot.
#[derive(Debug, Clone)]
pub struct DragController {
    activation_distance: f64,
    phase: DragPhase,
    subject: Option<DragSubject>,
    /// Stashed at begin; returned for restore when previews were applied.
    pre_drag: Option<Box<BoardSnapshot>>,
    previewed: bool,
}

impl Default for DragController {
    fn default() -> Self {
        Self::new(DEFAULT_ACTIVATION_DISTANCE)
    }
}

impl DragController {
    pub fn new(activation_distance: f64) -> Self {
        Self {
            activation_distance,
            phase: DragPhase::Idle,
            subject: None,
            pre_drag: None,
            previewed: false,
        }
    }

    /// Whether any session is underway, armed or dragging.
    pub fn is_active(&self) -> bool {
        !matches!(self.phase, DragPhase::Idle)
    }

    /// Whether the session has passed the activation distance.
    pub fn is_dragging(&self) -> bool {
        matches!(self.phase, DragPhase::Dragging | DragPhase::Hovering { .. })
    }

    /// Target of the most recent hover, while one is active.
    pub fn hover_target(&self) -> Option<&DropTarget> {
        match &self.phase {
            DragPhase::Hovering { target } => Some(target),
            _ => None,
        }
    }

    /// Arm a session on a grab. Returns false (and stays idle) when the
    /// subject is not present in the snapshot. Any prior session state is
    /// discarded; callers that may have live previews cancel first.
    pub fn begin(
        &mut self,
        kind: EntityKind,
        id: &str,
        at: PointerPoint,
        snapshot: &BoardSnapshot,
    ) -> bool {
        let source_container_id = match kind {
            EntityKind::Item => match snapshot.container_of_item(id) {
                Some(container_id) => container_id.to_string(),
                None => {
                    debug!(id, "grab refused, item not in snapshot");
                    return false;
                }
            },
            EntityKind::Container => {
                if snapshot.container_index(id).is_none() {
                    debug!(id, "grab refused, container not in snapshot");
                    return false;
                }
                snapshot.board_id.clone()
            }
        };

        self.phase = DragPhase::Armed { origin: at };
        self.subject = Some(DragSubject {
            kind,
            id: id.to_string(),
            source_container_id,
        });
        self.pre_drag = Some(Box::new(snapshot.clone()));
        self.previewed = false;
        debug!(id, kind = %kind, "drag armed");
        true
    }

    /// Feed pointer movement. Returns true on the edge where an armed grab
    /// becomes a drag; a motionless (or short) grab stays a click.
    pub fn pointer_moved(&mut self, to: PointerPoint) -> bool {
        let origin = match &self.phase {
            DragPhase::Armed { origin } => *origin,
            _ => return false,
        };
        if origin.distance_to(to) >= self.activation_distance {
            self.phase = DragPhase::Dragging;
            debug!("drag activated");
            return true;
        }
        false
    }

    /// Feed a pointer-over event. While dragging an item over a target in
    /// another container this emits a preview move for the cache to apply;
    /// hovers before activation and container-subject hovers emit nothing.
    pub fn hover(&mut self, target: DropTarget, snapshot: &BoardSnapshot) -> Option<PreviewMove> {
        if !self.is_dragging() {
            return None;
        }
        let subject = match &self.subject {
            Some(subject) => subject.clone(),
            None => return None,
        };

        let preview = if subject.kind == EntityKind::Item {
            let hovered_container = match &target {
                DropTarget::Container(id) => {
                    if snapshot.container_index(id).is_some() {
                        Some(id.clone())
                    } else {
                        None
                    }
                }
                DropTarget::Item(id) => snapshot.container_of_item(id).map(|c| c.to_string()),
            };
            let current_container = snapshot.container_of_item(&subject.id).map(|c| c.to_string());

            match (hovered_container, current_container) {
                (Some(hovered), Some(current)) if hovered != current => {
                    self.previewed = true;
                    Some(PreviewMove {
                        item_id: subject.id.clone(),
                        to_container_id: hovered,
                    })
                }
                _ => None,
            }
        } else {
            None
        };

        self.phase = DragPhase::Hovering { target };
        preview
    }

    /// Finish the session on pointer release.
    ///
    /// An armed-but-never-activated session is a plain click. An
    /// unresolvable target cancels the session, returning the pre-drag
    /// snapshot when previews need undoing. A resolvable target becomes one
    /// move intent computed from the subject's current location (reflecting
    /// previews) and the target.
    pub fn drop_on(&mut self, target: Option<DropTarget>, snapshot: &BoardSnapshot) -> DropOutcome {
        let subject = match &self.subject {
            Some(subject) => subject.clone(),
            None => {
                self.reset();
                return DropOutcome::Cancelled { restore: None };
            }
        };

        if !self.is_dragging() {
            // Plain click, no previews possible.
            self.reset();
            return DropOutcome::Cancelled { restore: None };
        }

        let intent = match target {
            Some(target) => self.resolve_intent(&subject, target, snapshot),
            None => None,
        };

        match intent {
            Some(intent) => {
                debug!(subject = %subject.id, target = %intent.target_container_id, "drop committed");
                self.reset();
                DropOutcome::Commit(intent)
            }
            None => {
                debug!(subject = %subject.id, "drop resolved to nothing, session cancelled");
                let restore = self.finish_cancelled();
                DropOutcome::Cancelled { restore }
            }
        }
    }

    /// Abort the session (escape, view switch). Returns the pre-drag
    /// snapshot to restore when previews mutated the live one.
    pub fn cancel(&mut self) -> Option<Box<BoardSnapshot>> {
        if self.is_active() {
            debug!("drag cancelled");
        }
        self.finish_cancelled()
    }

    fn resolve_intent(
        &self,
        subject: &DragSubject,
        target: DropTarget,
        snapshot: &BoardSnapshot,
    ) -> Option<MoveIntent> {
        match subject.kind {
            EntityKind::Item => {
                let (target_container_id, target_index) = match target {
                    // Dropping on an item takes its index; dropping on the
                    // subject itself resolves to its own current location.
                    DropTarget::Item(over_id) => {
                        let (ci, ii) = snapshot.locate_item(&over_id)?;
                        (snapshot.containers[ci].container.id.clone(), ii as i64)
                    }
                    DropTarget::Container(container_id) => {
                        let entry = snapshot.entry(&container_id)?;
                        (container_id, entry.items.len() as i64)
                    }
                };
                Some(MoveIntent {
                    subject_kind: EntityKind::Item,
                    subject_id: subject.id.clone(),
                    source_container_id: subject.source_container_id.clone(),
                    target_container_id,
                    target_index,
                })
            }
            EntityKind::Container => {
                let over_container = match target {
                    DropTarget::Container(id) => id,
                    // A container dragged over an item targets that item's
                    // container.
                    DropTarget::Item(item_id) => {
                        snapshot.container_of_item(&item_id)?.to_string()
                    }
                };
                let target_index = snapshot.container_index(&over_container)? as i64;
                Some(MoveIntent {
                    subject_kind: EntityKind::Container,
                    subject_id: subject.id.clone(),
                    source_container_id: snapshot.board_id.clone(),
                    target_container_id: snapshot.board_id.clone(),
                    target_index,
                })
            }
        }
    }

    fn finish_cancelled(&mut self) -> Option<Box<BoardSnapshot>> {
        let restore = if self.previewed {
            self.pre_drag.take()
        } else {
            None
        };
        self.reset();
        restore
    }

    fn reset(&mut self) {
        self.phase = DragPhase::Idle;
        self.subject = None;
        self.pre_drag = None;
        self.previewed = false;
    }
}
