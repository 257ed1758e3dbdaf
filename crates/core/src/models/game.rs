//! Game model - one planning poker session

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{InviteCode, Player, Story, StoryStatus};

/// Default countdown length in seconds
pub const DEFAULT_TIMER_SECS: u32 = 45;

/// Shortest countdown the host may configure
pub const MIN_TIMER_SECS: u32 = 5;

/// Longest countdown the host may configure
pub const MAX_TIMER_SECS: u32 = 600;

/// Countdown configuration for voting rounds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimerSettings {
    pub enabled: bool,
    pub duration_secs: u32,
}

impl TimerSettings {
    /// End instant for a run starting at `now`
    pub fn end_from(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now + chrono::Duration::seconds(i64::from(self.duration_secs))
    }

    /// End instant for a run starting at `now`, if the timer is enabled
    pub fn end_if_enabled(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.enabled.then(|| self.end_from(now))
    }
}

impl Default for TimerSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            duration_secs: DEFAULT_TIMER_SECS,
        }
    }
}

/// A persisted game row, without its players and stories
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameRecord {
    pub id: Uuid,
    pub name: String,
    pub invite_code: InviteCode,
    pub current_story_id: Option<Uuid>,
    pub reveal_cards: bool,
    pub timer: TimerSettings,
    pub timer_end_time: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// A full game snapshot as assembled from the store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Game {
    pub id: Uuid,
    pub name: String,
    pub invite_code: InviteCode,
    pub players: Vec<Player>,
    pub stories: Vec<Story>,
    pub current_story_id: Option<Uuid>,
    pub reveal_cards: bool,
    pub timer: TimerSettings,
    pub timer_end_time: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Game {
    pub fn assemble(record: GameRecord, players: Vec<Player>, stories: Vec<Story>) -> Self {
        Self {
            id: record.id,
            name: record.name,
            invite_code: record.invite_code,
            players,
            stories,
            current_story_id: record.current_story_id,
            reveal_cards: record.reveal_cards,
            timer: record.timer,
            timer_end_time: record.timer_end_time,
            created_at: record.created_at,
        }
    }

    pub fn player(&self, player_id: Uuid) -> Option<&Player> {
        self.players.iter().find(|p| p.id == player_id)
    }

    pub fn story(&self, story_id: Uuid) -> Option<&Story> {
        self.stories.iter().find(|s| s.id == story_id)
    }

    pub fn current_story(&self) -> Option<&Story> {
        self.current_story_id.and_then(|id| self.story(id))
    }

    pub fn host(&self) -> Option<&Player> {
        self.players.iter().find(|p| p.is_host)
    }

    /// First pending story in creation order, skipping `except`
    pub fn next_pending_story(&self, except: Uuid) -> Option<&Story> {
        self.stories
            .iter()
            .find(|s| s.id != except && s.status == StoryStatus::Pending)
    }
}
