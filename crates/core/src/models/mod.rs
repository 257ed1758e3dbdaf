//! Data models for planning poker

mod card;
mod game;
mod invite;
mod patch;
mod player;
mod story;

pub use card::*;
pub use game::*;
pub use invite::*;
pub use patch::*;
pub use player::*;
pub use story::*;
