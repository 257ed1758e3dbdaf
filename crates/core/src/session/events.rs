//! Events surfaced by the session loop

use uuid::Uuid;

use crate::store::Celebration;

/// Identifies one player's seat in one game
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionHandle {
    pub game_id: Uuid,
    pub player_id: Uuid,
}

/// What woke the session loop
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// The cached view was rebuilt from the store
    Updated,
    /// Whole seconds left on the running timer
    Countdown(i64),
    /// The running timer reached zero (reported once per run)
    TimerExpired,
    Celebrate(Celebration),
    /// Refetch failed; the previous view is kept
    SyncFailed(String),
    /// No game is being watched any more
    Closed,
}
