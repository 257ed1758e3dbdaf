//! Error types for Poker Core

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    #[error("Invalid card: {0}")]
    InvalidCard(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Coarse error classes surfaced to the user
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Invite code or record id has no matching record
    NotFound,
    /// Store read/write failed (network, constraint violation)
    Persistence,
    /// Non-host attempted a host-only mutation
    Permission,
    /// Malformed input or an operation not valid in the current state
    Invalid,
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::NotFound(_) => ErrorKind::NotFound,
            Error::PermissionDenied(_) => ErrorKind::Permission,
            Error::InvalidOperation(_) | Error::InvalidCard(_) => ErrorKind::Invalid,
            Error::Database(_)
            | Error::Persistence(_)
            | Error::Conflict(_)
            | Error::Io(_)
            | Error::Serialization(_) => ErrorKind::Persistence,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
