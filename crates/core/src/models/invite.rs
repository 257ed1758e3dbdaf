//! Invite code model

use std::fmt;
use std::str::FromStr;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::Error;

/// Number of letters in an invite code
pub const INVITE_CODE_LEN: usize = 6;

/// Short human-shareable code used to join a Game
///
/// Always exactly six ASCII uppercase letters.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct InviteCode(String);

impl InviteCode {
    /// Generate a code uniformly over A-Z
    pub fn generate<R: Rng + ?Sized>(rng: &mut R) -> Self {
        let code = (0..INVITE_CODE_LEN)
            .map(|_| char::from(rng.gen_range(b'A'..=b'Z')))
            .collect();
        Self(code)
    }

    /// Parse user input, case-insensitively
    pub fn parse(s: &str) -> Result<Self, Error> {
        let normalized = s.trim().to_ascii_uppercase();
        if normalized.len() != INVITE_CODE_LEN
            || !normalized.bytes().all(|b| b.is_ascii_uppercase())
        {
            return Err(Error::NotFound(format!("invite code '{}'", s.trim())));
        }
        Ok(Self(normalized))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for InviteCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for InviteCode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for InviteCode {
    type Error = Error;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<InviteCode> for String {
    fn from(code: InviteCode) -> Self {
        code.0
    }
}
