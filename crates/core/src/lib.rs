//! Poker Core Library
//!
//! Models, consensus and timer logic, permissions, SQLite storage, the
//! session store contract and the session controller for planning poker.

pub mod consensus;
pub mod error;
pub mod invariants;
pub mod models;
pub mod permissions;
pub mod session;
pub mod storage;
pub mod store;
pub mod timer;

pub use consensus::{Consensus, ConsensusLevel, STRONG_CONSENSUS_PERCENT};
pub use error::{Error, ErrorKind, Result};
pub use models::*;
pub use permissions::*;
pub use session::{GameView, SessionController, SessionEvent, SessionHandle};
pub use storage::Database;
pub use store::{Celebration, LocalStore, SessionStore, StoreEvent, Subscription, Table};
pub use timer::{remaining_seconds, TimerController, TimerTick};
