//! Local projection of a game as seen by one player

use uuid::Uuid;

use crate::consensus::Consensus;
use crate::models::{CardValue, Game, Player, Story, StoryStatus};

/// Snapshot of a game plus who is looking at it
///
/// Rebuilt wholesale from the store on every change; never patched locally.
#[derive(Debug, Clone, PartialEq)]
pub struct GameView {
    game: Game,
    player_id: Uuid,
}

impl GameView {
    pub fn new(game: Game, player_id: Uuid) -> Self {
        Self { game, player_id }
    }

    pub fn game(&self) -> &Game {
        &self.game
    }

    pub fn player_id(&self) -> Uuid {
        self.player_id
    }

    pub fn current_player(&self) -> Option<&Player> {
        self.game.player(self.player_id)
    }

    pub fn is_host(&self) -> bool {
        self.current_player().is_some_and(|p| p.is_host)
    }

    pub fn current_story(&self) -> Option<&Story> {
        self.game.current_story()
    }

    pub fn is_voting(&self) -> bool {
        self.current_story()
            .is_some_and(|s| s.status == StoryStatus::Voting)
    }

    pub fn is_revealed(&self) -> bool {
        self.current_story()
            .is_some_and(|s| s.status == StoryStatus::Revealed)
    }

    pub fn has_voted(&self) -> bool {
        self.current_player().is_some_and(Player::has_voted)
    }

    /// Every active player has a vote in
    pub fn all_voted(&self) -> bool {
        let mut active = self.game.players.iter().filter(|p| p.is_active).peekable();
        active.peek().is_some() && active.all(Player::has_voted)
    }

    pub fn votes_cast(&self) -> usize {
        self.game.players.iter().filter(|p| p.has_voted()).count()
    }

    /// Agreement over the revealed votes
    pub fn consensus(&self) -> Option<Consensus> {
        if !self.is_revealed() {
            return None;
        }
        Some(Consensus::from_votes(
            self.game.players.iter().map(|p| p.current_vote),
        ))
    }

    /// A player's vote as this viewer may see it: own vote always, others after reveal
    pub fn visible_vote(&self, player: &Player) -> Option<CardValue> {
        if player.id == self.player_id || self.game.reveal_cards {
            player.current_vote
        } else {
            None
        }
    }
}
