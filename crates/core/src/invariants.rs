//! Developer guardrails and invariants
//!
//! Debug assertions for detecting impossible states during development.
//! These checks are compiled out in release builds.

use uuid::Uuid;

use crate::models::{Game, InviteCode, StoryStatus, INVITE_CODE_LEN};

/// Validate that an assembled game snapshot is internally consistent
pub fn assert_game_invariants(game: &Game) {
    let host_count = game.players.iter().filter(|p| p.is_host).count();
    debug_assert!(
        host_count <= 1,
        "Game {} has {} hosts, expected 0 or 1",
        game.id,
        host_count
    );

    debug_assert!(
        game.players.iter().all(|p| p.game_id == game.id),
        "Game {} lists a player from another game",
        game.id
    );

    debug_assert!(
        game.stories.iter().all(|s| s.game_id == game.id),
        "Game {} lists a story from another game",
        game.id
    );

    // Estimates only ever land on completed stories
    for story in &game.stories {
        debug_assert!(
            story.final_estimate.is_none() || story.status == StoryStatus::Completed,
            "Story {} has an estimate but status {}",
            story.id,
            story.status
        );
    }

    assert_invite_code_valid(&game.invite_code);
}

/// Validate the current-story pointer after finalizing `story_id`
pub fn assert_current_story_advanced(game: &Game, story_id: Uuid) {
    debug_assert!(
        game.current_story_id != Some(story_id),
        "Game {} still points at finalized story {}",
        game.id,
        story_id
    );

    if let Some(current) = game.current_story() {
        debug_assert!(
            current.status != StoryStatus::Completed,
            "Game {} current story {} is completed",
            game.id,
            current.id
        );
    }
}

/// Validate the invite code shape
pub fn assert_invite_code_valid(code: &InviteCode) {
    debug_assert!(
        code.as_str().len() == INVITE_CODE_LEN
            && code.as_str().bytes().all(|b| b.is_ascii_uppercase()),
        "Malformed invite code {:?}",
        code
    );
}

/// Validate that a game ID is not nil
pub fn assert_game_id_valid(game_id: Uuid, context: &str) {
    debug_assert!(
        game_id != Uuid::nil(),
        "Nil game_id in context: {}",
        context
    );
}
