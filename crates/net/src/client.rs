//! TCP client implementing the session store contract against a `StoreServer`

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{ReadHalf, WriteHalf};
use tokio::net::TcpStream;
use tokio::sync::{broadcast, mpsc, oneshot, Notify};
use tracing::{debug, info, warn};
use uuid::Uuid;

use poker_core::{
    Celebration, Game, GamePatch, GameRecord, InviteCode, NewGame, NewPlayer, NewStory, Player,
    PlayerPatch, SessionStore, Story, StoryPatch, StoreEvent, Subscription,
};

use crate::error::{Error, Result};
use crate::frame::{read_frame, write_frame};
use crate::protocol::{FailureKind, Message, StoreReply, StoreRequest};

/// How long a store call may wait for its answer
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Buffered events per subscribed game
const CHANNEL_CAPACITY: usize = 64;

/// Outbound messages buffered before senders wait
const OUTBOUND_CAPACITY: usize = 256;

type Reply = std::result::Result<StoreReply, (FailureKind, String)>;

/// State shared between the handle and the reader task
#[derive(Default)]
struct Shared {
    next_id: AtomicU64,
    pending: Mutex<HashMap<u64, oneshot::Sender<Reply>>>,
    channels: Mutex<HashMap<Uuid, broadcast::Sender<StoreEvent>>>,
    pong: Notify,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

/// Session store reached over one TCP connection
pub struct RemoteStore {
    addr: String,
    outbound: mpsc::Sender<Message>,
    shared: Arc<Shared>,
}

impl RemoteStore {
    /// Connect to a store server (`host:port`)
    pub async fn connect(addr: &str) -> Result<Self> {
        info!(addr = %addr, "Connecting to store server");

        let stream = TcpStream::connect(addr).await?;
        let (reader, writer) = tokio::io::split(stream);
        let (outbound, rx) = mpsc::channel(OUTBOUND_CAPACITY);
        let shared = Arc::new(Shared::default());

        tokio::spawn(writer_task(writer, rx));
        tokio::spawn(reader_task(reader, shared.clone(), outbound.clone()));

        let store = Self {
            addr: addr.to_string(),
            outbound,
            shared,
        };
        store.ping().await?;
        info!(addr = %addr, "Connected to store server");
        Ok(store)
    }

    pub fn addr(&self) -> &str {
        &self.addr
    }

    /// Round-trip a ping to check the server is alive
    pub async fn ping(&self) -> Result<()> {
        let pong = self.shared.pong.notified();
        self.send(Message::Ping).await?;
        tokio::time::timeout(REQUEST_TIMEOUT, pong)
            .await
            .map_err(|_| Error::Protocol("no pong from server".into()))
    }

    async fn send(&self, msg: Message) -> Result<()> {
        self.outbound
            .send(msg)
            .await
            .map_err(|_| Error::NotConnected)
    }

    async fn request(&self, request: StoreRequest) -> poker_core::Result<StoreReply> {
        let id = self.shared.next_id.fetch_add(1, Ordering::Relaxed);
        let name = request.name();
        let (tx, rx) = oneshot::channel();
        lock(&self.shared.pending).insert(id, tx);

        if let Err(e) = self.send(Message::Request { id, request }).await {
            lock(&self.shared.pending).remove(&id);
            return Err(e.into());
        }

        let reply = match tokio::time::timeout(REQUEST_TIMEOUT, rx).await {
            Ok(Ok(reply)) => reply,
            Ok(Err(_)) => return Err(Error::ConnectionClosed.into()),
            Err(_) => {
                lock(&self.shared.pending).remove(&id);
                warn!(id, request = name, "Request timed out");
                return Err(poker_core::Error::Persistence(format!(
                    "{} timed out",
                    name
                )));
            }
        };

        reply.map_err(|(kind, message)| kind.into_error(message))
    }
}

fn unexpected(reply: StoreReply) -> poker_core::Error {
    poker_core::Error::Persistence(format!("unexpected reply '{}'", reply.name()))
}

#[async_trait]
impl SessionStore for RemoteStore {
    async fn insert_game(&self, game: &NewGame) -> poker_core::Result<GameRecord> {
        match self.request(StoreRequest::InsertGame(game.clone())).await? {
            StoreReply::Record(record) => Ok(record),
            other => Err(unexpected(other)),
        }
    }

    async fn find_game(&self, game_id: Uuid) -> poker_core::Result<Option<GameRecord>> {
        match self.request(StoreRequest::FindGame { game_id }).await? {
            StoreReply::MaybeRecord(record) => Ok(record),
            other => Err(unexpected(other)),
        }
    }

    async fn find_game_by_invite_code(
        &self,
        code: &InviteCode,
    ) -> poker_core::Result<Option<GameRecord>> {
        let request = StoreRequest::FindGameByInviteCode { code: code.clone() };
        match self.request(request).await? {
            StoreReply::MaybeRecord(record) => Ok(record),
            other => Err(unexpected(other)),
        }
    }

    async fn update_game(&self, game_id: Uuid, patch: &GamePatch) -> poker_core::Result<()> {
        let request = StoreRequest::UpdateGame {
            game_id,
            patch: patch.clone(),
        };
        match self.request(request).await? {
            StoreReply::Done => Ok(()),
            other => Err(unexpected(other)),
        }
    }

    async fn insert_player(&self, player: &NewPlayer) -> poker_core::Result<Player> {
        match self.request(StoreRequest::InsertPlayer(player.clone())).await? {
            StoreReply::Player(player) => Ok(player),
            other => Err(unexpected(other)),
        }
    }

    async fn update_player(
        &self,
        player_id: Uuid,
        patch: &PlayerPatch,
    ) -> poker_core::Result<Player> {
        let request = StoreRequest::UpdatePlayer {
            player_id,
            patch: patch.clone(),
        };
        match self.request(request).await? {
            StoreReply::Player(player) => Ok(player),
            other => Err(unexpected(other)),
        }
    }

    async fn clear_votes(&self, game_id: Uuid) -> poker_core::Result<()> {
        match self.request(StoreRequest::ClearVotes { game_id }).await? {
            StoreReply::Done => Ok(()),
            other => Err(unexpected(other)),
        }
    }

    async fn list_players(&self, game_id: Uuid) -> poker_core::Result<Vec<Player>> {
        match self.request(StoreRequest::ListPlayers { game_id }).await? {
            StoreReply::Players(players) => Ok(players),
            other => Err(unexpected(other)),
        }
    }

    async fn insert_story(&self, story: &NewStory) -> poker_core::Result<Story> {
        match self.request(StoreRequest::InsertStory(story.clone())).await? {
            StoreReply::Story(story) => Ok(story),
            other => Err(unexpected(other)),
        }
    }

    async fn update_story(&self, story_id: Uuid, patch: &StoryPatch) -> poker_core::Result<Story> {
        let request = StoreRequest::UpdateStory {
            story_id,
            patch: patch.clone(),
        };
        match self.request(request).await? {
            StoreReply::Story(story) => Ok(story),
            other => Err(unexpected(other)),
        }
    }

    async fn list_stories(&self, game_id: Uuid) -> poker_core::Result<Vec<Story>> {
        match self.request(StoreRequest::ListStories { game_id }).await? {
            StoreReply::Stories(stories) => Ok(stories),
            other => Err(unexpected(other)),
        }
    }

    async fn subscribe(&self, game_id: Uuid) -> poker_core::Result<Subscription> {
        let (rx, first) = {
            let mut channels = lock(&self.shared.channels);
            match channels.get(&game_id) {
                Some(tx) => (tx.subscribe(), false),
                None => {
                    let (tx, rx) = broadcast::channel(CHANNEL_CAPACITY);
                    channels.insert(game_id, tx);
                    (rx, true)
                }
            }
        };

        if first {
            debug!(game_id = %game_id, "Subscribing on server");
            self.send(Message::Subscribe { game_id }).await?;
        }

        let shared = self.shared.clone();
        let outbound = self.outbound.clone();
        Ok(Subscription::new(game_id, rx).with_drop_hook(move || {
            release_channel(&shared, &outbound, game_id);
        }))
    }

    async fn broadcast(&self, game_id: Uuid, event: Celebration) -> poker_core::Result<()> {
        match self.request(StoreRequest::Broadcast { game_id, event }).await? {
            StoreReply::Done => Ok(()),
            other => Err(unexpected(other)),
        }
    }

    // The server assembles the snapshot under one lock
    async fn load_game(&self, game_id: Uuid) -> poker_core::Result<Option<Game>> {
        match self.request(StoreRequest::LoadGame { game_id }).await? {
            StoreReply::Snapshot(game) => Ok(game),
            other => Err(unexpected(other)),
        }
    }
}

/// Called while the last local receiver is still attached, hence `<= 1`
fn release_channel(shared: &Shared, outbound: &mpsc::Sender<Message>, game_id: Uuid) {
    let mut channels = lock(&shared.channels);
    let last = channels
        .get(&game_id)
        .is_some_and(|tx| tx.receiver_count() <= 1);
    if last {
        channels.remove(&game_id);
        debug!(game_id = %game_id, "Unsubscribing on server");
        if outbound.try_send(Message::Unsubscribe { game_id }).is_err() {
            debug!(game_id = %game_id, "Could not queue unsubscribe");
        }
    }
}

/// Writer task - sends queued messages to the server
async fn writer_task(mut writer: WriteHalf<TcpStream>, mut rx: mpsc::Receiver<Message>) {
    while let Some(msg) = rx.recv().await {
        if let Err(e) = write_frame(&mut writer, &msg).await {
            debug!(error = %e, "Write failed");
            break;
        }
    }
}

/// Reader task - routes replies and events until the connection ends
async fn reader_task(
    mut reader: ReadHalf<TcpStream>,
    shared: Arc<Shared>,
    outbound: mpsc::Sender<Message>,
) {
    loop {
        match read_frame(&mut reader).await {
            Ok(Message::ServerShutdown) => {
                info!("Server is shutting down");
                break;
            }
            Ok(msg) => handle_server_message(msg, &shared, &outbound).await,
            Err(Error::ConnectionClosed) => {
                debug!("Server closed connection");
                break;
            }
            Err(e) => {
                warn!(error = %e, "Read error");
                break;
            }
        }
    }

    // Fail in-flight calls and end every subscription
    lock(&shared.pending).clear();
    lock(&shared.channels).clear();
}

/// Handle a message from the server
async fn handle_server_message(msg: Message, shared: &Shared, outbound: &mpsc::Sender<Message>) {
    match msg {
        Message::Response { id, reply } => complete(shared, id, Ok(reply)),
        Message::Failure { id, kind, message } => complete(shared, id, Err((kind, message))),
        Message::Changed { game_id, table } => {
            publish(shared, StoreEvent::Changed { game_id, table });
        }
        Message::Broadcast { game_id, event } => {
            publish(shared, StoreEvent::Broadcast { game_id, event });
        }
        Message::Ping => {
            let _ = outbound.send(Message::Pong).await;
        }
        Message::Pong => shared.pong.notify_waiters(),
        other => {
            debug!(message = ?other, "Ignoring unexpected message type");
        }
    }
}

fn complete(shared: &Shared, id: u64, reply: Reply) {
    match lock(&shared.pending).remove(&id) {
        Some(tx) => {
            let _ = tx.send(reply);
        }
        None => debug!(id, "Reply for unknown or expired request"),
    }
}

fn publish(shared: &Shared, event: StoreEvent) {
    let channels = lock(&shared.channels);
    if let Some(tx) = channels.get(&event.game_id()) {
        let _ = tx.send(event);
    }
}
