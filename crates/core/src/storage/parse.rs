//! Database value parsing utilities
//!
//! Provides error-safe parsing of stored values.

use chrono::{DateTime, SecondsFormat, SubsecRound, Utc};
use rusqlite::types::Type;
use rusqlite::Error as SqlError;
use uuid::Uuid;

use crate::models::{CardValue, Estimate, InviteCode, StoryStatus};

fn conversion_error<E>(idx: usize, e: E) -> SqlError
where
    E: std::error::Error + Send + Sync + 'static,
{
    SqlError::FromSqlConversionFailure(idx, Type::Text, Box::new(e))
}

/// Parse a UUID from a database string column
pub fn parse_uuid(s: &str) -> Result<Uuid, SqlError> {
    Uuid::parse_str(s).map_err(|e| conversion_error(0, e))
}

/// Parse an optional UUID from a database string column
pub fn parse_uuid_opt(s: Option<String>) -> Result<Option<Uuid>, SqlError> {
    s.map(|s| parse_uuid(&s)).transpose()
}

/// Parse a DateTime from an RFC3339 string
pub fn parse_datetime(s: &str) -> Result<DateTime<Utc>, SqlError> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| conversion_error(0, e))
}

/// Current time at the precision `format_datetime` stores
pub fn stored_now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}

/// Format a DateTime with fixed precision so text ordering matches time ordering
pub fn format_datetime(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Parse an optional epoch-milliseconds column
pub fn parse_millis_opt(ms: Option<i64>) -> Result<Option<DateTime<Utc>>, SqlError> {
    ms.map(|ms| {
        DateTime::from_timestamp_millis(ms).ok_or_else(|| {
            SqlError::IntegralValueOutOfRange(0, ms)
        })
    })
    .transpose()
}

/// Parse the invite code column
pub fn parse_invite_code(s: &str) -> Result<InviteCode, SqlError> {
    InviteCode::parse(s).map_err(|e| conversion_error(0, e))
}

/// Parse an optional vote column
pub fn parse_card_opt(s: Option<String>) -> Result<Option<CardValue>, SqlError> {
    s.map(|s| s.parse::<CardValue>().map_err(|e| conversion_error(0, e)))
        .transpose()
}

/// Parse an optional estimate column; any text is a valid estimate
pub fn parse_estimate_opt(s: Option<String>) -> Option<Estimate> {
    s.and_then(|s| Estimate::parse_opt(&s))
}

/// Parse the story status column
pub fn parse_status(s: &str) -> Result<StoryStatus, SqlError> {
    s.parse::<StoryStatus>().map_err(|e| conversion_error(0, e))
}

/// Extension trait for converting rusqlite Results to Option
pub trait OptionalExt<T> {
    fn optional(self) -> Result<Option<T>, SqlError>;
}

impl<T> OptionalExt<T> for Result<T, SqlError> {
    fn optional(self) -> Result<Option<T>, SqlError> {
        match self {
            Ok(v) => Ok(Some(v)),
            Err(SqlError::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e),
        }
    }
}
