//! Poker Network Library
//!
//! Shares one session store between several machines over TCP.
//!
//! # Architecture
//!
//! - **Server**: hosts a `LocalStore` and executes store calls for clients
//! - **Client**: `RemoteStore`, a `SessionStore` backed by a server connection
//! - **Protocol**: Length-prefixed JSON messages
//!
//! # Usage
//!
//! ```ignore
//! // One machine serves the store
//! let store = Arc::new(LocalStore::open("poker.db")?);
//! let server = StoreServer::start(DEFAULT_PORT, store).await?;
//!
//! // Players connect and drive a session controller with it
//! let remote = Arc::new(RemoteStore::connect("10.0.0.5:7341").await?);
//! let mut session = SessionController::new(remote);
//! session.join_game("ABCDEF", "Bob").await?;
//! ```

pub mod client;
pub mod error;
mod frame;
pub mod invite;
pub mod protocol;
pub mod server;

pub use client::RemoteStore;
pub use error::{Error, Result};
pub use invite::{InviteTarget, InviteUrl};
pub use protocol::{FailureKind, Message, StoreReply, StoreRequest};
pub use server::StoreServer;

/// Default port for store servers
pub const DEFAULT_PORT: u16 = 7341;
