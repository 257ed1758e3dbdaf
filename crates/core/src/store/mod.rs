//! Session store contract
//!
//! A store persists games, players and stories, and fans out two kinds of
//! per-game events: "something changed" notifications and ephemeral
//! celebrations. `LocalStore` backs it with SQLite; the network crate
//! provides a remote implementation speaking the same contract over TCP.

mod hub;
mod local;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast::{self, error::RecvError, error::TryRecvError};
use tracing::warn;
use uuid::Uuid;

use crate::consensus::ConsensusLevel;
use crate::error::Result;
use crate::models::{
    CardValue, Estimate, Game, GamePatch, GameRecord, InviteCode, NewGame, NewPlayer, NewStory,
    Player, PlayerPatch, Story, StoryPatch,
};

pub use hub::NotificationHub;
pub use local::LocalStore;

/// Game-scoped tables that emit change notifications
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Table {
    Games,
    Players,
    Stories,
}

/// Ephemeral, non-persisted events shared with everyone viewing a game
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Celebration {
    Consensus {
        story_id: Uuid,
        value: CardValue,
        percentage: u8,
        level: ConsensusLevel,
    },
    EstimateFinalized {
        story_id: Uuid,
        estimate: Option<Estimate>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum StoreEvent {
    /// A row in `table` belonging to the game changed; no payload
    Changed { game_id: Uuid, table: Table },
    Broadcast { game_id: Uuid, event: Celebration },
}

impl StoreEvent {
    pub fn game_id(&self) -> Uuid {
        match self {
            StoreEvent::Changed { game_id, .. } | StoreEvent::Broadcast { game_id, .. } => *game_id,
        }
    }
}

type DropHook = Box<dyn FnOnce() + Send + Sync>;

/// Live feed of one game's events
///
/// Dropping the subscription detaches it from the store.
pub struct Subscription {
    game_id: Uuid,
    rx: broadcast::Receiver<StoreEvent>,
    on_drop: Option<DropHook>,
}

impl Subscription {
    pub fn new(game_id: Uuid, rx: broadcast::Receiver<StoreEvent>) -> Self {
        Self {
            game_id,
            rx,
            on_drop: None,
        }
    }

    /// Run `hook` once when this subscription is dropped
    pub fn with_drop_hook(mut self, hook: impl FnOnce() + Send + Sync + 'static) -> Self {
        self.on_drop = Some(Box::new(hook));
        self
    }

    pub fn game_id(&self) -> Uuid {
        self.game_id
    }

    /// Wait for the next event, `None` once the store side has gone away
    pub async fn recv(&mut self) -> Option<StoreEvent> {
        match self.rx.recv().await {
            Ok(event) => Some(event),
            Err(RecvError::Lagged(skipped)) => Some(self.lagged(skipped)),
            Err(RecvError::Closed) => None,
        }
    }

    /// Take an already-queued event without waiting
    pub fn try_recv(&mut self) -> Option<StoreEvent> {
        match self.rx.try_recv() {
            Ok(event) => Some(event),
            Err(TryRecvError::Lagged(skipped)) => Some(self.lagged(skipped)),
            Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => None,
        }
    }

    // Missed notifications carry no payload, so one refetch covers them all
    fn lagged(&self, skipped: u64) -> StoreEvent {
        warn!(game_id = %self.game_id, skipped, "Subscription lagged, forcing refetch");
        StoreEvent::Changed {
            game_id: self.game_id,
            table: Table::Games,
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(hook) = self.on_drop.take() {
            hook();
        }
    }
}

/// Persistence and fan-out for planning sessions
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Insert a game; `Conflict` when the invite code is already taken
    async fn insert_game(&self, game: &NewGame) -> Result<GameRecord>;

    async fn find_game(&self, game_id: Uuid) -> Result<Option<GameRecord>>;

    /// Look up by an already-normalized invite code
    async fn find_game_by_invite_code(&self, code: &InviteCode) -> Result<Option<GameRecord>>;

    async fn update_game(&self, game_id: Uuid, patch: &GamePatch) -> Result<()>;

    async fn insert_player(&self, player: &NewPlayer) -> Result<Player>;

    async fn update_player(&self, player_id: Uuid, patch: &PlayerPatch) -> Result<Player>;

    /// Null out every player's vote in a game
    async fn clear_votes(&self, game_id: Uuid) -> Result<()>;

    /// Players in join order
    async fn list_players(&self, game_id: Uuid) -> Result<Vec<Player>>;

    async fn insert_story(&self, story: &NewStory) -> Result<Story>;

    async fn update_story(&self, story_id: Uuid, patch: &StoryPatch) -> Result<Story>;

    /// Stories in creation order
    async fn list_stories(&self, game_id: Uuid) -> Result<Vec<Story>>;

    async fn subscribe(&self, game_id: Uuid) -> Result<Subscription>;

    /// Send an ephemeral event to every subscriber of the game
    async fn broadcast(&self, game_id: Uuid, event: Celebration) -> Result<()>;

    /// Assembled snapshot of a game
    async fn load_game(&self, game_id: Uuid) -> Result<Option<Game>> {
        let Some(record) = self.find_game(game_id).await? else {
            return Ok(None);
        };
        let players = self.list_players(game_id).await?;
        let stories = self.list_stories(game_id).await?;
        Ok(Some(Game::assemble(record, players, stories)))
    }
}
