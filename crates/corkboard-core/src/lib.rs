//! Pure ordering logic for the board engine
//!
//! This crate provides the I/O-free pieces of the engine:
//! - `position`: integer position math (clamping, 0..N-1 renumbering)
//! - `intent`: the move-intent value a completed drag resolves to
//! - `snapshot`: the in-memory ordered view of one board
//! - `drag`: the drag session state machine
//!
//! Nothing here performs a store round trip; persistence and reconciliation
//! live in the `corkboard` crate.

pub mod drag;
pub mod intent;
pub mod position;
pub mod snapshot;

pub use drag::{
    DragController, DropOutcome, DropTarget, PointerPoint, PreviewMove,
    DEFAULT_ACTIVATION_DISTANCE,
};
pub use intent::MoveIntent;
pub use position::{clamp_index, next_position, renumber, Positioned};
pub use snapshot::{BoardSnapshot, ContainerEntry};
