//! Permission system for session operations
//!
//! Only two roles exist: the host who created the game and everyone else.
//! These checks run on the client; the store does not enforce them.

/// Actions that can be performed in a game
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionAction {
    // Backlog
    AddStory,
    SelectStory,

    // Voting rounds
    StartVoting,
    CastVote,
    RevealCards,
    ResetVoting,
    FinalizeEstimate,

    // Timer
    ConfigureTimer,
    StartTimer,

    // Sharing
    ShareInvite,
}

impl SessionAction {
    pub fn is_host_only(self) -> bool {
        !matches!(self, SessionAction::CastVote | SessionAction::ShareInvite)
    }

    pub fn label(self) -> &'static str {
        match self {
            SessionAction::AddStory => "add stories",
            SessionAction::SelectStory => "select stories",
            SessionAction::StartVoting => "start voting",
            SessionAction::CastVote => "vote",
            SessionAction::RevealCards => "reveal cards",
            SessionAction::ResetVoting => "reset voting",
            SessionAction::FinalizeEstimate => "finalize estimates",
            SessionAction::ConfigureTimer => "configure the timer",
            SessionAction::StartTimer => "start the timer",
            SessionAction::ShareInvite => "share the invite",
        }
    }
}

/// Permission matrix for session roles
pub struct PermissionMatrix;

impl PermissionMatrix {
    /// Check if a player may perform an action
    pub fn can_perform(is_host: bool, action: SessionAction) -> bool {
        is_host || !action.is_host_only()
    }
}
