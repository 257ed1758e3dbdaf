//! Story model - a unit of work being estimated

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::Estimate;
use crate::error::Error;

/// Lifecycle of a story: pending -> voting -> revealed -> completed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoryStatus {
    Pending,
    Voting,
    Revealed,
    Completed,
}

impl StoryStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            StoryStatus::Pending => "pending",
            StoryStatus::Voting => "voting",
            StoryStatus::Revealed => "revealed",
            StoryStatus::Completed => "completed",
        }
    }

    pub fn is_terminal(self) -> bool {
        self == StoryStatus::Completed
    }
}

impl fmt::Display for StoryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StoryStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(StoryStatus::Pending),
            "voting" => Ok(StoryStatus::Voting),
            "revealed" => Ok(StoryStatus::Revealed),
            "completed" => Ok(StoryStatus::Completed),
            other => Err(Error::InvalidOperation(format!(
                "unknown story status '{}'",
                other
            ))),
        }
    }
}

/// A work item estimated by the group
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Story {
    pub id: Uuid,
    pub game_id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub status: StoryStatus,
    /// Only set once the story is completed
    pub final_estimate: Option<Estimate>,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_roundtrip() {
        for status in [
            StoryStatus::Pending,
            StoryStatus::Voting,
            StoryStatus::Revealed,
            StoryStatus::Completed,
        ] {
            assert_eq!(status.as_str().parse::<StoryStatus>().unwrap(), status);
        }
        assert!("archived".parse::<StoryStatus>().is_err());
    }

    #[test]
    fn test_only_completed_is_terminal() {
        assert!(StoryStatus::Completed.is_terminal());
        assert!(!StoryStatus::Revealed.is_terminal());
    }
}
