//! SQLite storage layer for planning sessions

mod games;
mod migrations;
mod parse;
mod players;
mod stories;
mod update;

use rusqlite::Connection;
use std::path::Path;
use tracing::instrument;
use uuid::Uuid;

use crate::error::Result;
use crate::models::Game;

pub use games::GameStore;
pub use players::PlayerStore;
pub use stories::StoryStore;

/// Main database handle
pub struct Database {
    conn: Connection,
}

impl Database {
    /// Open or create database at the given path
    #[instrument(skip(path), fields(path = %path.as_ref().display()))]
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA foreign_keys = ON")?;
        let db = Self { conn };
        db.init()?;
        Ok(db)
    }

    /// Open in-memory database (for testing and throwaway local sessions)
    #[instrument]
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys = ON")?;
        let db = Self { conn };
        db.init()?;
        Ok(db)
    }

    /// Initialize database schema via migrations
    fn init(&self) -> Result<()> {
        migrations::run_migrations(&self.conn)?;
        Ok(())
    }

    /// Get current schema version
    pub fn schema_version(&self) -> u32 {
        self.conn
            .query_row("SELECT MAX(version) FROM schema_migrations", [], |row| {
                row.get(0)
            })
            .unwrap_or(0)
    }

    pub fn games(&self) -> GameStore<'_> {
        GameStore::new(&self.conn)
    }

    pub fn players(&self) -> PlayerStore<'_> {
        PlayerStore::new(&self.conn)
    }

    pub fn stories(&self) -> StoryStore<'_> {
        StoryStore::new(&self.conn)
    }

    /// Assemble a full snapshot: game row, players and stories
    #[instrument(skip(self))]
    pub fn load_game(&self, game_id: Uuid) -> Result<Option<Game>> {
        let Some(record) = self.games().find_by_id(game_id)? else {
            return Ok(None);
        };
        let players = self.players().list_for_game(game_id)?;
        let stories = self.stories().list_for_game(game_id)?;
        Ok(Some(Game::assemble(record, players, stories)))
    }
}
