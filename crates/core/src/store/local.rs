//! SQLite-backed session store

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use tracing::{debug, info};
use uuid::Uuid;

use super::{Celebration, NotificationHub, SessionStore, StoreEvent, Subscription, Table};
use crate::error::Result;
use crate::models::{
    Game, GamePatch, GameRecord, InviteCode, NewGame, NewPlayer, NewStory, Player, PlayerPatch,
    Story, StoryPatch,
};
use crate::storage::Database;

/// Store that owns a SQLite database and notifies subscribers after each write
pub struct LocalStore {
    db: Mutex<Database>,
    hub: NotificationHub,
}

impl LocalStore {
    pub fn new(db: Database) -> Self {
        Self {
            db: Mutex::new(db),
            hub: NotificationHub::new(),
        }
    }

    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        info!(path = %path.display(), "Opening session store");
        Ok(Self::new(Database::open(path)?))
    }

    pub fn open_in_memory() -> Result<Self> {
        Ok(Self::new(Database::open_in_memory()?))
    }

    /// Subscribers currently attached to a game
    pub fn subscriber_count(&self, game_id: Uuid) -> usize {
        self.hub.subscriber_count(game_id)
    }

    // The guard is never held across an await point
    fn db(&self) -> MutexGuard<'_, Database> {
        self.db.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn notify(&self, game_id: Uuid, table: Table) {
        let delivered = self.hub.publish(StoreEvent::Changed { game_id, table });
        debug!(game_id = %game_id, ?table, delivered, "Change notification");
    }
}

#[async_trait]
impl SessionStore for LocalStore {
    async fn insert_game(&self, game: &NewGame) -> Result<GameRecord> {
        let record = self.db().games().create(game)?;
        self.notify(record.id, Table::Games);
        Ok(record)
    }

    async fn find_game(&self, game_id: Uuid) -> Result<Option<GameRecord>> {
        self.db().games().find_by_id(game_id)
    }

    async fn find_game_by_invite_code(&self, code: &InviteCode) -> Result<Option<GameRecord>> {
        self.db().games().find_by_invite_code(code)
    }

    async fn update_game(&self, game_id: Uuid, patch: &GamePatch) -> Result<()> {
        if patch.is_empty() {
            return Ok(());
        }
        self.db().games().update(game_id, patch)?;
        self.notify(game_id, Table::Games);
        Ok(())
    }

    async fn insert_player(&self, player: &NewPlayer) -> Result<Player> {
        let created = self.db().players().create(player)?;
        self.notify(created.game_id, Table::Players);
        Ok(created)
    }

    async fn update_player(&self, player_id: Uuid, patch: &PlayerPatch) -> Result<Player> {
        let updated = self.db().players().update(player_id, patch)?;
        self.notify(updated.game_id, Table::Players);
        Ok(updated)
    }

    async fn clear_votes(&self, game_id: Uuid) -> Result<()> {
        let cleared = self.db().players().clear_votes(game_id)?;
        if cleared > 0 {
            self.notify(game_id, Table::Players);
        }
        Ok(())
    }

    async fn list_players(&self, game_id: Uuid) -> Result<Vec<Player>> {
        self.db().players().list_for_game(game_id)
    }

    async fn insert_story(&self, story: &NewStory) -> Result<Story> {
        let created = self.db().stories().create(story)?;
        self.notify(created.game_id, Table::Stories);
        Ok(created)
    }

    async fn update_story(&self, story_id: Uuid, patch: &StoryPatch) -> Result<Story> {
        let updated = self.db().stories().update(story_id, patch)?;
        self.notify(updated.game_id, Table::Stories);
        Ok(updated)
    }

    async fn list_stories(&self, game_id: Uuid) -> Result<Vec<Story>> {
        self.db().stories().list_for_game(game_id)
    }

    async fn subscribe(&self, game_id: Uuid) -> Result<Subscription> {
        debug!(game_id = %game_id, "New subscription");
        Ok(self.hub.subscribe(game_id))
    }

    async fn broadcast(&self, game_id: Uuid, event: Celebration) -> Result<()> {
        self.hub.publish(StoreEvent::Broadcast { game_id, event });
        Ok(())
    }

    // One lock for a consistent snapshot
    async fn load_game(&self, game_id: Uuid) -> Result<Option<Game>> {
        self.db().load_game(game_id)
    }
}
