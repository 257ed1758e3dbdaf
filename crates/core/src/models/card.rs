//! Card deck and estimate values

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::Error;

/// A card from the estimation deck
///
/// Votes are always one of these; anything else is rejected at parse time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum CardValue {
    Zero,
    One,
    Two,
    Three,
    Five,
    Eight,
    Thirteen,
    TwentyOne,
    ThirtyFour,
    FiftyFive,
    EightyNine,
    /// The "?" card
    Unsure,
}

impl CardValue {
    /// Every card in display order
    pub const DECK: [CardValue; 12] = [
        CardValue::Zero,
        CardValue::One,
        CardValue::Two,
        CardValue::Three,
        CardValue::Five,
        CardValue::Eight,
        CardValue::Thirteen,
        CardValue::TwentyOne,
        CardValue::ThirtyFour,
        CardValue::FiftyFive,
        CardValue::EightyNine,
        CardValue::Unsure,
    ];

    /// Point value, `None` for the "?" card
    pub fn points(self) -> Option<u32> {
        match self {
            CardValue::Zero => Some(0),
            CardValue::One => Some(1),
            CardValue::Two => Some(2),
            CardValue::Three => Some(3),
            CardValue::Five => Some(5),
            CardValue::Eight => Some(8),
            CardValue::Thirteen => Some(13),
            CardValue::TwentyOne => Some(21),
            CardValue::ThirtyFour => Some(34),
            CardValue::FiftyFive => Some(55),
            CardValue::EightyNine => Some(89),
            CardValue::Unsure => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            CardValue::Zero => "0",
            CardValue::One => "1",
            CardValue::Two => "2",
            CardValue::Three => "3",
            CardValue::Five => "5",
            CardValue::Eight => "8",
            CardValue::Thirteen => "13",
            CardValue::TwentyOne => "21",
            CardValue::ThirtyFour => "34",
            CardValue::FiftyFive => "55",
            CardValue::EightyNine => "89",
            CardValue::Unsure => "?",
        }
    }
}

impl fmt::Display for CardValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CardValue {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let token = s.trim();
        CardValue::DECK
            .into_iter()
            .find(|card| card.as_str() == token)
            .ok_or_else(|| Error::InvalidCard(token.to_string()))
    }
}

impl TryFrom<String> for CardValue {
    type Error = Error;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<CardValue> for String {
    fn from(card: CardValue) -> Self {
        card.as_str().to_string()
    }
}

/// Final estimate recorded on a completed story
///
/// Usually the consensus card, but the host may override it with free text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Estimate {
    Card(CardValue),
    Custom(String),
}

impl Estimate {
    /// Parse user input; blank input means "no estimate"
    pub fn parse_opt(s: &str) -> Option<Self> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(Estimate::from(trimmed.to_string()))
        }
    }

    pub fn card(&self) -> Option<CardValue> {
        match self {
            Estimate::Card(card) => Some(*card),
            Estimate::Custom(_) => None,
        }
    }
}

impl From<String> for Estimate {
    fn from(value: String) -> Self {
        match value.parse::<CardValue>() {
            Ok(card) => Estimate::Card(card),
            Err(_) => Estimate::Custom(value),
        }
    }
}

impl From<CardValue> for Estimate {
    fn from(card: CardValue) -> Self {
        Estimate::Card(card)
    }
}

impl From<Estimate> for String {
    fn from(estimate: Estimate) -> Self {
        estimate.to_string()
    }
}

impl fmt::Display for Estimate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Estimate::Card(card) => write!(f, "{}", card),
            Estimate::Custom(text) => f.write_str(text),
        }
    }
}
