//! Insert and partial-update payloads for the session store
//!
//! Nullable columns use `Option<Option<T>>`: `None` leaves the field alone,
//! `Some(None)` clears it, `Some(Some(v))` sets it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use uuid::Uuid;

use super::{CardValue, Estimate, InviteCode, StoryStatus, TimerSettings};

/// Fields for a new game row
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewGame {
    pub name: String,
    pub invite_code: InviteCode,
    pub timer: TimerSettings,
}

/// Fields for a new player row
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewPlayer {
    pub game_id: Uuid,
    pub name: String,
    pub is_host: bool,
}

/// Fields for a new story row (always created pending)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewStory {
    pub game_id: Uuid,
    pub title: String,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GamePatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "nullable"
    )]
    pub current_story_id: Option<Option<Uuid>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reveal_cards: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timer_enabled: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timer_duration: Option<u32>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "nullable"
    )]
    pub timer_end_time: Option<Option<DateTime<Utc>>>,
}

impl GamePatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current_story(mut self, story_id: Option<Uuid>) -> Self {
        self.current_story_id = Some(story_id);
        self
    }

    pub fn reveal(mut self, reveal: bool) -> Self {
        self.reveal_cards = Some(reveal);
        self
    }

    pub fn timer_settings(mut self, enabled: bool, duration_secs: u32) -> Self {
        self.timer_enabled = Some(enabled);
        self.timer_duration = Some(duration_secs);
        self
    }

    pub fn timer_end(mut self, end: Option<DateTime<Utc>>) -> Self {
        self.timer_end_time = Some(end);
        self
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PlayerPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "nullable"
    )]
    pub current_vote: Option<Option<CardValue>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_active: Option<bool>,
}

impl PlayerPatch {
    pub fn vote(card: Option<CardValue>) -> Self {
        Self {
            current_vote: Some(card),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StoryPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "nullable"
    )]
    pub description: Option<Option<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<StoryStatus>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "nullable"
    )]
    pub final_estimate: Option<Option<Estimate>>,
}

impl StoryPatch {
    pub fn status(status: StoryStatus) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }

    pub fn completed(estimate: Option<Estimate>) -> Self {
        Self {
            status: Some(StoryStatus::Completed),
            final_estimate: Some(estimate),
            ..Self::default()
        }
    }
}

/// A present JSON `null` means "clear", so wrap whatever was read in `Some`
fn nullable<'de, T, D>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}
