//! Game storage operations

use rusqlite::types::Value;
use rusqlite::{params, Connection, ErrorCode, Row};
use tracing::instrument;
use uuid::Uuid;

use super::parse::{
    format_datetime, parse_datetime, parse_invite_code, parse_millis_opt, parse_uuid,
    parse_uuid_opt, stored_now, OptionalExt,
};
use super::update::Update;
use crate::error::{Error, Result};
use crate::models::{GamePatch, GameRecord, InviteCode, NewGame, TimerSettings};

const GAME_COLUMNS: &str = "id, name, invite_code, current_story_id, reveal_cards, \
     timer_enabled, timer_duration, timer_end_time, created_at";

fn game_from_row(row: &Row<'_>) -> rusqlite::Result<GameRecord> {
    Ok(GameRecord {
        id: parse_uuid(&row.get::<_, String>(0)?)?,
        name: row.get(1)?,
        invite_code: parse_invite_code(&row.get::<_, String>(2)?)?,
        current_story_id: parse_uuid_opt(row.get::<_, Option<String>>(3)?)?,
        reveal_cards: row.get::<_, i32>(4)? != 0,
        timer: TimerSettings {
            enabled: row.get::<_, i32>(5)? != 0,
            duration_secs: row.get(6)?,
        },
        timer_end_time: parse_millis_opt(row.get::<_, Option<i64>>(7)?)?,
        created_at: parse_datetime(&row.get::<_, String>(8)?)?,
    })
}

pub struct GameStore<'a> {
    conn: &'a Connection,
}

impl<'a> GameStore<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    /// Create a new game, failing with `Conflict` if the invite code is taken
    #[instrument(skip(self, game), fields(game_name = %game.name, invite_code = %game.invite_code))]
    pub fn create(&self, game: &NewGame) -> Result<GameRecord> {
        let record = GameRecord {
            id: Uuid::new_v4(),
            name: game.name.clone(),
            invite_code: game.invite_code.clone(),
            current_story_id: None,
            reveal_cards: false,
            timer: game.timer,
            timer_end_time: None,
            created_at: stored_now(),
        };
        let stamp = format_datetime(record.created_at);

        let inserted = self.conn.execute(
            "INSERT INTO games (id, name, invite_code, current_story_id, reveal_cards, timer_enabled, timer_duration, timer_end_time, created_at, updated_at)
             VALUES (?1, ?2, ?3, NULL, 0, ?4, ?5, NULL, ?6, ?6)",
            params![
                record.id.to_string(),
                record.name,
                record.invite_code.as_str(),
                record.timer.enabled as i32,
                record.timer.duration_secs,
                stamp,
            ],
        );

        match inserted {
            Ok(_) => Ok(record),
            Err(rusqlite::Error::SqliteFailure(e, _)) if e.code == ErrorCode::ConstraintViolation => {
                Err(Error::Conflict(format!(
                    "invite code {} already in use",
                    record.invite_code
                )))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Find game by ID
    #[instrument(skip(self))]
    pub fn find_by_id(&self, id: Uuid) -> Result<Option<GameRecord>> {
        let sql = format!("SELECT {} FROM games WHERE id = ?1", GAME_COLUMNS);
        let game = self
            .conn
            .query_row(&sql, params![id.to_string()], game_from_row)
            .optional()?;
        Ok(game)
    }

    /// Find game by invite code (expects an already-normalized code)
    #[instrument(skip(self), fields(invite_code = %code))]
    pub fn find_by_invite_code(&self, code: &InviteCode) -> Result<Option<GameRecord>> {
        let sql = format!("SELECT {} FROM games WHERE invite_code = ?1", GAME_COLUMNS);
        let game = self
            .conn
            .query_row(&sql, params![code.as_str()], game_from_row)
            .optional()?;
        Ok(game)
    }

    /// Apply a partial update
    #[instrument(skip(self, patch))]
    pub fn update(&self, id: Uuid, patch: &GamePatch) -> Result<()> {
        let mut update = Update::new("games");
        if let Some(name) = &patch.name {
            update.set("name", name.clone());
        }
        if let Some(current) = patch.current_story_id {
            update.set("current_story_id", current.map(|id| id.to_string()));
        }
        if let Some(reveal) = patch.reveal_cards {
            update.set("reveal_cards", reveal as i64);
        }
        if let Some(enabled) = patch.timer_enabled {
            update.set("timer_enabled", enabled as i64);
        }
        if let Some(duration) = patch.timer_duration {
            update.set("timer_duration", i64::from(duration));
        }
        if let Some(end) = patch.timer_end_time {
            update.set(
                "timer_end_time",
                end.map_or(Value::Null, |t| Value::Integer(t.timestamp_millis())),
            );
        }

        let changed = update.execute_where(self.conn, "id", id.to_string())?;
        if changed == 0 {
            return Err(Error::NotFound(format!("game {}", id)));
        }
        Ok(())
    }
}
