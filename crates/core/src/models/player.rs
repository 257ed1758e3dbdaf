//! Player model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::CardValue;

/// A participant in a Game
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Player {
    pub id: Uuid,
    pub game_id: Uuid,
    pub name: String,
    pub current_vote: Option<CardValue>,
    /// Set once at creation, never reassigned
    pub is_host: bool,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

impl Player {
    pub fn has_voted(&self) -> bool {
        self.current_vote.is_some()
    }
}
