//! Network protocol message types
//!
//! All messages are JSON-serialized and length-prefixed on the wire. Store
//! calls travel as `Request`/`Response` pairs matched by id; change
//! notifications and celebrations are pushed for subscribed games.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use poker_core::{
    Celebration, Game, GamePatch, GameRecord, InviteCode, NewGame, NewPlayer, NewStory, Player,
    PlayerPatch, Story, StoryPatch, Table,
};

/// One call against the hosted store
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreRequest {
    InsertGame(NewGame),
    FindGame { game_id: Uuid },
    FindGameByInviteCode { code: InviteCode },
    UpdateGame { game_id: Uuid, patch: GamePatch },
    InsertPlayer(NewPlayer),
    UpdatePlayer { player_id: Uuid, patch: PlayerPatch },
    ClearVotes { game_id: Uuid },
    ListPlayers { game_id: Uuid },
    InsertStory(NewStory),
    UpdateStory { story_id: Uuid, patch: StoryPatch },
    ListStories { game_id: Uuid },
    LoadGame { game_id: Uuid },
    Broadcast { game_id: Uuid, event: Celebration },
}

impl StoreRequest {
    /// Short name for logs
    pub fn name(&self) -> &'static str {
        match self {
            StoreRequest::InsertGame(_) => "insert_game",
            StoreRequest::FindGame { .. } => "find_game",
            StoreRequest::FindGameByInviteCode { .. } => "find_game_by_invite_code",
            StoreRequest::UpdateGame { .. } => "update_game",
            StoreRequest::InsertPlayer(_) => "insert_player",
            StoreRequest::UpdatePlayer { .. } => "update_player",
            StoreRequest::ClearVotes { .. } => "clear_votes",
            StoreRequest::ListPlayers { .. } => "list_players",
            StoreRequest::InsertStory(_) => "insert_story",
            StoreRequest::UpdateStory { .. } => "update_story",
            StoreRequest::ListStories { .. } => "list_stories",
            StoreRequest::LoadGame { .. } => "load_game",
            StoreRequest::Broadcast { .. } => "broadcast",
        }
    }
}

/// Successful result of a `StoreRequest`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreReply {
    Done,
    Record(GameRecord),
    MaybeRecord(Option<GameRecord>),
    Player(Player),
    Players(Vec<Player>),
    Story(Story),
    Stories(Vec<Story>),
    Snapshot(Option<Game>),
}

impl StoreReply {
    pub fn name(&self) -> &'static str {
        match self {
            StoreReply::Done => "done",
            StoreReply::Record(_) => "record",
            StoreReply::MaybeRecord(_) => "maybe_record",
            StoreReply::Player(_) => "player",
            StoreReply::Players(_) => "players",
            StoreReply::Story(_) => "story",
            StoreReply::Stories(_) => "stories",
            StoreReply::Snapshot(_) => "snapshot",
        }
    }
}

/// Error class carried by `Message::Failure`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    NotFound,
    Conflict,
    Persistence,
    Invalid,
}

impl FailureKind {
    pub fn of(error: &poker_core::Error) -> Self {
        use poker_core::Error;
        match error {
            Error::NotFound(_) => FailureKind::NotFound,
            Error::Conflict(_) => FailureKind::Conflict,
            Error::InvalidOperation(_) | Error::InvalidCard(_) | Error::PermissionDenied(_) => {
                FailureKind::Invalid
            }
            Error::Database(_)
            | Error::Persistence(_)
            | Error::Io(_)
            | Error::Serialization(_) => FailureKind::Persistence,
        }
    }

    /// Rebuild a store error on the calling side
    pub fn into_error(self, message: String) -> poker_core::Error {
        use poker_core::Error;
        match self {
            FailureKind::NotFound => Error::NotFound(message),
            FailureKind::Conflict => Error::Conflict(message),
            FailureKind::Persistence => Error::Persistence(message),
            FailureKind::Invalid => Error::InvalidOperation(message),
        }
    }
}

/// Network protocol messages
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Message {
    /// Client asks the server to run a store call
    Request { id: u64, request: StoreRequest },

    /// Server answers a request
    Response { id: u64, reply: StoreReply },

    /// Server reports a failed request
    Failure {
        id: u64,
        kind: FailureKind,
        message: String,
    },

    /// Start receiving events for a game
    Subscribe { game_id: Uuid },

    /// Stop receiving events for a game
    Unsubscribe { game_id: Uuid },

    /// A row of a subscribed game changed
    Changed { game_id: Uuid, table: Table },

    /// Ephemeral event for a subscribed game
    Broadcast { game_id: Uuid, event: Celebration },

    Ping,
    Pong,

    /// Server is going away
    ServerShutdown,
}

impl Message {
    /// Serialize to JSON bytes
    pub fn to_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    /// Deserialize from JSON bytes
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use poker_core::{CardValue, TimerSettings};

    fn decode(msg: &Message) -> Message {
        Message::from_bytes(&msg.to_bytes().unwrap()).unwrap()
    }

    #[test]
    fn test_patch_survives_the_wire() {
        let game_id = Uuid::new_v4();
        let end = chrono::DateTime::from_timestamp_millis(Utc::now().timestamp_millis()).unwrap();
        let msg = Message::Request {
            id: 7,
            request: StoreRequest::UpdateGame {
                game_id,
                patch: GamePatch::new()
                    .current_story(None)
                    .reveal(false)
                    .timer_end(Some(end)),
            },
        };

        match decode(&msg) {
            Message::Request {
                id: 7,
                request: StoreRequest::UpdateGame { game_id: id, patch },
            } => {
                assert_eq!(id, game_id);
                assert_eq!(patch.current_story_id, Some(None));
                assert_eq!(patch.reveal_cards, Some(false));
                assert_eq!(patch.timer_end_time, Some(Some(end)));
                assert_eq!(patch.timer_enabled, None);
            }
            other => panic!("unexpected message {:?}", other),
        }
    }

    #[test]
    fn test_vote_clear_survives_the_wire() {
        let msg = Message::Request {
            id: 1,
            request: StoreRequest::UpdatePlayer {
                player_id: Uuid::new_v4(),
                patch: PlayerPatch::vote(None),
            },
        };
        match decode(&msg) {
            Message::Request {
                request: StoreRequest::UpdatePlayer { patch, .. },
                ..
            } => assert_eq!(patch.current_vote, Some(None)),
            other => panic!("unexpected message {:?}", other),
        }

        let msg = Message::Request {
            id: 2,
            request: StoreRequest::UpdatePlayer {
                player_id: Uuid::new_v4(),
                patch: PlayerPatch::vote(Some(CardValue::Unsure)),
            },
        };
        match decode(&msg) {
            Message::Request {
                request: StoreRequest::UpdatePlayer { patch, .. },
                ..
            } => assert_eq!(patch.current_vote, Some(Some(CardValue::Unsure))),
            other => panic!("unexpected message {:?}", other),
        }
    }

    #[test]
    fn test_message_tagging() {
        let json = String::from_utf8(Message::Ping.to_bytes().unwrap()).unwrap();
        assert_eq!(json, r#"{"type":"Ping"}"#);

        let game_id = Uuid::nil();
        let value = serde_json::to_value(Message::Changed {
            game_id,
            table: Table::Players,
        })
        .unwrap();
        assert_eq!(value["type"], "Changed");
        assert_eq!(value["table"], "players");
    }

    #[test]
    fn test_failure_kinds_map_back() {
        let err = poker_core::Error::Conflict("taken".into());
        let kind = FailureKind::of(&err);
        assert_eq!(kind, FailureKind::Conflict);
        assert!(matches!(
            kind.into_error("taken".into()),
            poker_core::Error::Conflict(_)
        ));
        assert_eq!(
            FailureKind::of(&poker_core::Error::NotFound("x".into())),
            FailureKind::NotFound
        );
    }

    #[test]
    fn test_new_game_request() {
        let msg = Message::Request {
            id: 3,
            request: StoreRequest::InsertGame(NewGame {
                name: "Sprint 5".into(),
                invite_code: InviteCode::parse("ABCDEF").unwrap(),
                timer: TimerSettings::default(),
            }),
        };
        match decode(&msg) {
            Message::Request {
                request: StoreRequest::InsertGame(game),
                ..
            } => assert_eq!(game.invite_code.as_str(), "ABCDEF"),
            other => panic!("unexpected message {:?}", other),
        }
    }
}
