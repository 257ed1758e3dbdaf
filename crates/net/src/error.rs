//! Network error types

use std::io;

/// Network result type
pub type Result<T> = std::result::Result<T, Error>;

/// Network errors
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Connection closed")]
    ConnectionClosed,

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Not connected")]
    NotConnected,

    #[error("Invalid invite: {0}")]
    InvalidInvite(String),
}

impl From<Error> for poker_core::Error {
    fn from(e: Error) -> Self {
        match e {
            Error::InvalidInvite(reason) => poker_core::Error::NotFound(reason),
            other => poker_core::Error::Persistence(other.to_string()),
        }
    }
}
