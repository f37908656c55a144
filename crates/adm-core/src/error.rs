//! Errors returned synchronously from scheduler control operations.
//!
//! Transfer failures never surface here; they end up as a `Failed` item
//! status. Persistence and notifier failures are logged at their boundary.

use crate::item::ItemId;

/// Error from a control operation (`enqueue`, `pause`, `resume`, `cancel`,
/// `remove`). Closed taxonomy; callers can match exhaustively.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ControlError {
    /// `enqueue` with an id already queued or transferring.
    #[error("download '{0}' is already queued or in progress")]
    AlreadyInProgress(ItemId),

    /// Control operation on an id absent from the authoritative set.
    #[error("no download with id '{0}'")]
    NotFound(ItemId),

    /// Operation not valid for the item's current state (e.g. `remove` on a
    /// running download, `pause` on a queued one).
    #[error("operation not valid for download '{id}' while {state}")]
    InvalidTransition { id: ItemId, state: String },
}
