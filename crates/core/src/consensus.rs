//! Consensus calculation over revealed votes
//!
//! The modal card wins; ties go to the card that was encountered first in
//! the input order. Agreement is only reported once at least two votes exist.

use serde::{Deserialize, Serialize};

use crate::models::CardValue;

/// Minimum agreement that counts as strong consensus
pub const STRONG_CONSENSUS_PERCENT: u8 = 75;

/// Strength of agreement among revealed votes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConsensusLevel {
    None,
    Strong,
    Perfect,
}

impl ConsensusLevel {
    pub fn from_percentage(percentage: u8) -> Self {
        if percentage == 100 {
            ConsensusLevel::Perfect
        } else if percentage >= STRONG_CONSENSUS_PERCENT {
            ConsensusLevel::Strong
        } else {
            ConsensusLevel::None
        }
    }

    pub fn is_celebrated(self) -> bool {
        self != ConsensusLevel::None
    }
}

/// Result of tallying a set of votes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Consensus {
    /// Most common card, `None` when nobody voted
    pub value: Option<CardValue>,
    pub count: usize,
    pub total: usize,
    /// 0 when fewer than two votes were cast
    pub percentage: u8,
    pub level: ConsensusLevel,
}

impl Consensus {
    /// Tally votes, ignoring players who have not voted
    pub fn from_votes<I>(votes: I) -> Self
    where
        I: IntoIterator<Item = Option<CardValue>>,
    {
        // Insertion-ordered tally keeps the first-encountered tie-break
        let mut tally: Vec<(CardValue, usize)> = Vec::new();
        let mut total = 0usize;

        for card in votes.into_iter().flatten() {
            total += 1;
            match tally.iter_mut().find(|(c, _)| *c == card) {
                Some((_, n)) => *n += 1,
                None => tally.push((card, 1)),
            }
        }

        let mut value = None;
        let mut count = 0usize;
        for (card, n) in &tally {
            if *n > count {
                count = *n;
                value = Some(*card);
            }
        }

        let percentage = if total >= 2 {
            ((count as f64 / total as f64) * 100.0).round() as u8
        } else {
            0
        };

        Self {
            value,
            count,
            total,
            percentage,
            level: ConsensusLevel::from_percentage(percentage),
        }
    }
}
