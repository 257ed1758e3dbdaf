//! Player storage operations

use rusqlite::{params, Connection, Row};
use tracing::instrument;
use uuid::Uuid;

use super::parse::{
    format_datetime, parse_card_opt, parse_datetime, parse_uuid, stored_now, OptionalExt,
};
use super::update::Update;
use crate::error::{Error, Result};
use crate::models::{NewPlayer, Player, PlayerPatch};

const PLAYER_COLUMNS: &str =
    "id, game_id, name, current_vote, is_host, is_active, created_at";

fn player_from_row(row: &Row<'_>) -> rusqlite::Result<Player> {
    Ok(Player {
        id: parse_uuid(&row.get::<_, String>(0)?)?,
        game_id: parse_uuid(&row.get::<_, String>(1)?)?,
        name: row.get(2)?,
        current_vote: parse_card_opt(row.get(3)?)?,
        is_host: row.get::<_, i32>(4)? != 0,
        is_active: row.get::<_, i32>(5)? != 0,
        created_at: parse_datetime(&row.get::<_, String>(6)?)?,
    })
}

pub struct PlayerStore<'a> {
    conn: &'a Connection,
}

impl<'a> PlayerStore<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    /// Add a player to a game
    #[instrument(skip(self, player), fields(game_id = %player.game_id, is_host = player.is_host))]
    pub fn create(&self, player: &NewPlayer) -> Result<Player> {
        let created = Player {
            id: Uuid::new_v4(),
            game_id: player.game_id,
            name: player.name.clone(),
            current_vote: None,
            is_host: player.is_host,
            is_active: true,
            created_at: stored_now(),
        };
        let stamp = format_datetime(created.created_at);

        self.conn.execute(
            "INSERT INTO players (id, game_id, name, current_vote, is_host, is_active, created_at, updated_at)
             VALUES (?1, ?2, ?3, NULL, ?4, 1, ?5, ?5)",
            params![
                created.id.to_string(),
                created.game_id.to_string(),
                created.name,
                created.is_host as i32,
                stamp,
            ],
        )?;

        Ok(created)
    }

    /// Find player by ID
    #[instrument(skip(self))]
    pub fn find_by_id(&self, id: Uuid) -> Result<Option<Player>> {
        let sql = format!("SELECT {} FROM players WHERE id = ?1", PLAYER_COLUMNS);
        let player = self
            .conn
            .query_row(&sql, params![id.to_string()], player_from_row)
            .optional()?;
        Ok(player)
    }

    /// Apply a partial update and return the stored row
    #[instrument(skip(self, patch))]
    pub fn update(&self, id: Uuid, patch: &PlayerPatch) -> Result<Player> {
        let mut update = Update::new("players");
        if let Some(name) = &patch.name {
            update.set("name", name.clone());
        }
        if let Some(vote) = patch.current_vote {
            update.set("current_vote", vote.map(|card| card.as_str().to_string()));
        }
        if let Some(active) = patch.is_active {
            update.set("is_active", active as i64);
        }

        let changed = update.execute_where(self.conn, "id", id.to_string())?;
        if changed == 0 {
            return Err(Error::NotFound(format!("player {}", id)));
        }

        self.find_by_id(id)?
            .ok_or_else(|| Error::NotFound(format!("player {}", id)))
    }

    /// Clear every vote in a game, returning how many players were touched
    #[instrument(skip(self))]
    pub fn clear_votes(&self, game_id: Uuid) -> Result<usize> {
        let mut update = Update::new("players");
        update.set("current_vote", rusqlite::types::Value::Null);
        update.execute_where(self.conn, "game_id", game_id.to_string())
    }

    /// List players in join order
    #[instrument(skip(self))]
    pub fn list_for_game(&self, game_id: Uuid) -> Result<Vec<Player>> {
        let sql = format!(
            "SELECT {} FROM players WHERE game_id = ?1 ORDER BY created_at, rowid",
            PLAYER_COLUMNS
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let players = stmt
            .query_map(params![game_id.to_string()], player_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(players)
    }
}
