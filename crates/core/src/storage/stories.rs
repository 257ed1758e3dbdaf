//! Story storage operations

use rusqlite::{params, Connection, Row};
use tracing::instrument;
use uuid::Uuid;

use super::parse::{
    format_datetime, parse_datetime, parse_estimate_opt, parse_status, parse_uuid, stored_now,
    OptionalExt,
};
use super::update::Update;
use crate::error::{Error, Result};
use crate::models::{NewStory, Story, StoryPatch, StoryStatus};

const STORY_COLUMNS: &str =
    "id, game_id, title, description, status, final_estimate, created_at";

fn story_from_row(row: &Row<'_>) -> rusqlite::Result<Story> {
    Ok(Story {
        id: parse_uuid(&row.get::<_, String>(0)?)?,
        game_id: parse_uuid(&row.get::<_, String>(1)?)?,
        title: row.get(2)?,
        description: row.get(3)?,
        status: parse_status(&row.get::<_, String>(4)?)?,
        final_estimate: parse_estimate_opt(row.get(5)?),
        created_at: parse_datetime(&row.get::<_, String>(6)?)?,
    })
}

pub struct StoryStore<'a> {
    conn: &'a Connection,
}

impl<'a> StoryStore<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    /// Add a pending story to a game's backlog
    #[instrument(skip(self, story), fields(game_id = %story.game_id))]
    pub fn create(&self, story: &NewStory) -> Result<Story> {
        let created = Story {
            id: Uuid::new_v4(),
            game_id: story.game_id,
            title: story.title.clone(),
            description: story.description.clone(),
            status: StoryStatus::Pending,
            final_estimate: None,
            created_at: stored_now(),
        };
        let stamp = format_datetime(created.created_at);

        self.conn.execute(
            "INSERT INTO stories (id, game_id, title, description, status, final_estimate, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, NULL, ?6, ?6)",
            params![
                created.id.to_string(),
                created.game_id.to_string(),
                created.title,
                created.description,
                created.status.as_str(),
                stamp,
            ],
        )?;

        Ok(created)
    }

    /// Find story by ID
    #[instrument(skip(self))]
    pub fn find_by_id(&self, id: Uuid) -> Result<Option<Story>> {
        let sql = format!("SELECT {} FROM stories WHERE id = ?1", STORY_COLUMNS);
        let story = self
            .conn
            .query_row(&sql, params![id.to_string()], story_from_row)
            .optional()?;
        Ok(story)
    }

    /// Apply a partial update and return the stored row
    #[instrument(skip(self, patch))]
    pub fn update(&self, id: Uuid, patch: &StoryPatch) -> Result<Story> {
        let mut update = Update::new("stories");
        if let Some(title) = &patch.title {
            update.set("title", title.clone());
        }
        if let Some(description) = &patch.description {
            update.set("description", description.clone());
        }
        if let Some(status) = patch.status {
            update.set("status", status.as_str().to_string());
        }
        if let Some(estimate) = &patch.final_estimate {
            update.set("final_estimate", estimate.clone().map(String::from));
        }

        let changed = update.execute_where(self.conn, "id", id.to_string())?;
        if changed == 0 {
            return Err(Error::NotFound(format!("story {}", id)));
        }

        self.find_by_id(id)?
            .ok_or_else(|| Error::NotFound(format!("story {}", id)))
    }

    /// List stories in creation order
    #[instrument(skip(self))]
    pub fn list_for_game(&self, game_id: Uuid) -> Result<Vec<Story>> {
        let sql = format!(
            "SELECT {} FROM stories WHERE game_id = ?1 ORDER BY created_at, rowid",
            STORY_COLUMNS
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let stories = stmt
            .query_map(params![game_id.to_string()], story_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(stories)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CardValue, Estimate, GameRecord, InviteCode, NewGame, TimerSettings};
    use crate::storage::Database;

    fn setup() -> (Database, GameRecord) {
        let db = Database::open_in_memory().unwrap();
        let game = db
            .games()
            .create(&NewGame {
                name: "Sprint 5".to_string(),
                invite_code: InviteCode::parse("STORYS").unwrap(),
                timer: TimerSettings::default(),
            })
            .unwrap();
        (db, game)
    }

    fn add(db: &Database, game_id: Uuid, title: &str) -> Story {
        db.stories()
            .create(&NewStory {
                game_id,
                title: title.to_string(),
                description: None,
            })
            .unwrap()
    }

    #[test]
    fn test_new_story_is_pending() {
        let (db, game) = setup();
        let story = add(&db, game.id, "Login page");
        assert_eq!(story.status, StoryStatus::Pending);
        assert_eq!(story.final_estimate, None);

        let stored = db.stories().find_by_id(story.id).unwrap().unwrap();
        assert_eq!(stored, story);
    }

    #[test]
    fn test_stories_listed_in_creation_order() {
        let (db, game) = setup();
        add(&db, game.id, "A");
        add(&db, game.id, "B");
        add(&db, game.id, "C");

        let titles: Vec<_> = db
            .stories()
            .list_for_game(game.id)
            .unwrap()
            .into_iter()
            .map(|s| s.title)
            .collect();
        assert_eq!(titles, vec!["A", "B", "C"]);
    }

    #[test]
    fn test_complete_with_card_and_custom_estimates() {
        let (db, game) = setup();
        let a = add(&db, game.id, "A");
        let b = add(&db, game.id, "B");

        let done = db
            .stories()
            .update(a.id, &StoryPatch::completed(Some(CardValue::Eight.into())))
            .unwrap();
        assert_eq!(done.status, StoryStatus::Completed);
        assert_eq!(done.final_estimate, Some(Estimate::Card(CardValue::Eight)));

        let custom = db
            .stories()
            .update(
                b.id,
                &StoryPatch::completed(Some(Estimate::Custom("2 days".to_string()))),
            )
            .unwrap();
        assert_eq!(
            custom.final_estimate,
            Some(Estimate::Custom("2 days".to_string()))
        );
    }

    #[test]
    fn test_status_transition() {
        let (db, game) = setup();
        let story = add(&db, game.id, "A");
        let voting = db
            .stories()
            .update(story.id, &StoryPatch::status(StoryStatus::Voting))
            .unwrap();
        assert_eq!(voting.status, StoryStatus::Voting);
    }
}
