//! TCP server exposing a session store
//!
//! Every connection gets a reader loop that executes store calls in arrival
//! order, a writer task, and one forwarding task per subscribed game.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::io::WriteHalf;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use poker_core::{SessionStore, StoreEvent, Subscription};

use crate::error::{Error, Result};
use crate::frame::{read_frame, write_frame};
use crate::protocol::{FailureKind, Message, StoreReply, StoreRequest};

/// Outbound messages buffered per connection
const OUTBOUND_CAPACITY: usize = 256;

/// Store server handle
pub struct StoreServer {
    addr: SocketAddr,
    shutdown_tx: broadcast::Sender<()>,
}

impl StoreServer {
    /// Start serving `store` on the given port (0 picks a free one)
    pub async fn start(port: u16, store: Arc<dyn SessionStore>) -> Result<Self> {
        let addr = SocketAddr::from(([0, 0, 0, 0], port));
        let listener = TcpListener::bind(addr).await?;
        let bound_addr = listener.local_addr()?;

        info!(addr = %bound_addr, "Store server started");

        let (shutdown_tx, _) = broadcast::channel(1);
        let shutdown_rx = shutdown_tx.subscribe();
        tokio::spawn(accept_loop(listener, store, shutdown_tx.clone(), shutdown_rx));

        Ok(StoreServer {
            addr: bound_addr,
            shutdown_tx,
        })
    }

    /// Get the server's bound address
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Stop accepting and tell connected clients to go away
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());
        info!("Store server shutdown initiated");
    }
}

impl Drop for StoreServer {
    fn drop(&mut self) {
        let _ = self.shutdown_tx.send(());
    }
}

/// Accept incoming connections
async fn accept_loop(
    listener: TcpListener,
    store: Arc<dyn SessionStore>,
    shutdown_tx: broadcast::Sender<()>,
    mut shutdown_rx: broadcast::Receiver<()>,
) {
    loop {
        tokio::select! {
            result = listener.accept() => {
                match result {
                    Ok((stream, addr)) => {
                        debug!(addr = %addr, "New connection");
                        tokio::spawn(handle_connection(
                            stream,
                            addr,
                            store.clone(),
                            shutdown_tx.subscribe(),
                        ));
                    }
                    Err(e) => {
                        error!(error = %e, "Accept failed");
                    }
                }
            }
            _ = shutdown_rx.recv() => {
                info!("Accept loop shutting down");
                break;
            }
        }
    }
}

/// Handle a single client connection
async fn handle_connection(
    stream: TcpStream,
    addr: SocketAddr,
    store: Arc<dyn SessionStore>,
    mut shutdown_rx: broadcast::Receiver<()>,
) {
    let (mut reader, writer) = tokio::io::split(stream);
    let (tx, rx) = mpsc::channel(OUTBOUND_CAPACITY);
    let writer_handle = tokio::spawn(writer_task(writer, rx));
    let mut forwards: HashMap<Uuid, JoinHandle<()>> = HashMap::new();

    info!(addr = %addr, "Client connected");

    loop {
        tokio::select! {
            result = read_frame(&mut reader) => {
                match result {
                    Ok(msg) => {
                        handle_message(msg, store.as_ref(), &tx, &mut forwards).await;
                    }
                    Err(Error::ConnectionClosed) => {
                        debug!(addr = %addr, "Connection closed");
                        break;
                    }
                    Err(e) => {
                        warn!(addr = %addr, error = %e, "Read error");
                        break;
                    }
                }
            }
            _ = shutdown_rx.recv() => {
                let _ = tx.send(Message::ServerShutdown).await;
                break;
            }
        }
    }

    for (_, forward) in forwards.drain() {
        forward.abort();
    }
    // Let queued replies (and the shutdown notice) drain before closing
    drop(tx);
    let _ = writer_handle.await;

    info!(addr = %addr, "Client disconnected");
}

/// Writer task - sends messages to the client
async fn writer_task(mut writer: WriteHalf<TcpStream>, mut rx: mpsc::Receiver<Message>) {
    while let Some(msg) = rx.recv().await {
        if let Err(e) = write_frame(&mut writer, &msg).await {
            debug!(error = %e, "Write failed");
            break;
        }
    }
}

/// Handle an incoming message
async fn handle_message(
    msg: Message,
    store: &dyn SessionStore,
    tx: &mpsc::Sender<Message>,
    forwards: &mut HashMap<Uuid, JoinHandle<()>>,
) {
    match msg {
        Message::Request { id, request } => {
            let name = request.name();
            let reply = match execute(store, request).await {
                Ok(reply) => Message::Response { id, reply },
                Err(e) => {
                    debug!(id, request = name, error = %e, "Request failed");
                    Message::Failure {
                        id,
                        kind: FailureKind::of(&e),
                        message: e.to_string(),
                    }
                }
            };
            let _ = tx.send(reply).await;
        }
        Message::Subscribe { game_id } => {
            if forwards.contains_key(&game_id) {
                return;
            }
            match store.subscribe(game_id).await {
                Ok(subscription) => {
                    debug!(game_id = %game_id, "Client subscribed");
                    let forward = tokio::spawn(forward_events(subscription, tx.clone()));
                    forwards.insert(game_id, forward);
                }
                Err(e) => warn!(game_id = %game_id, error = %e, "Subscribe failed"),
            }
        }
        Message::Unsubscribe { game_id } => {
            if let Some(forward) = forwards.remove(&game_id) {
                debug!(game_id = %game_id, "Client unsubscribed");
                forward.abort();
            }
        }
        Message::Ping => {
            let _ = tx.send(Message::Pong).await;
        }
        other => {
            debug!(message = ?other, "Ignoring unexpected message type");
        }
    }
}

/// Run one store call
async fn execute(
    store: &dyn SessionStore,
    request: StoreRequest,
) -> poker_core::Result<StoreReply> {
    let reply = match request {
        StoreRequest::InsertGame(game) => StoreReply::Record(store.insert_game(&game).await?),
        StoreRequest::FindGame { game_id } => {
            StoreReply::MaybeRecord(store.find_game(game_id).await?)
        }
        StoreRequest::FindGameByInviteCode { code } => {
            StoreReply::MaybeRecord(store.find_game_by_invite_code(&code).await?)
        }
        StoreRequest::UpdateGame { game_id, patch } => {
            store.update_game(game_id, &patch).await?;
            StoreReply::Done
        }
        StoreRequest::InsertPlayer(player) => {
            StoreReply::Player(store.insert_player(&player).await?)
        }
        StoreRequest::UpdatePlayer { player_id, patch } => {
            StoreReply::Player(store.update_player(player_id, &patch).await?)
        }
        StoreRequest::ClearVotes { game_id } => {
            store.clear_votes(game_id).await?;
            StoreReply::Done
        }
        StoreRequest::ListPlayers { game_id } => {
            StoreReply::Players(store.list_players(game_id).await?)
        }
        StoreRequest::InsertStory(story) => StoreReply::Story(store.insert_story(&story).await?),
        StoreRequest::UpdateStory { story_id, patch } => {
            StoreReply::Story(store.update_story(story_id, &patch).await?)
        }
        StoreRequest::ListStories { game_id } => {
            StoreReply::Stories(store.list_stories(game_id).await?)
        }
        StoreRequest::LoadGame { game_id } => StoreReply::Snapshot(store.load_game(game_id).await?),
        StoreRequest::Broadcast { game_id, event } => {
            store.broadcast(game_id, event).await?;
            StoreReply::Done
        }
    };
    Ok(reply)
}

/// Push a game's events to one client until either side goes away
async fn forward_events(mut subscription: Subscription, tx: mpsc::Sender<Message>) {
    while let Some(event) = subscription.recv().await {
        let msg = match event {
            StoreEvent::Changed { game_id, table } => Message::Changed { game_id, table },
            StoreEvent::Broadcast { game_id, event } => Message::Broadcast { game_id, event },
        };
        if tx.send(msg).await.is_err() {
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use poker_core::LocalStore;
    use tokio::io::ReadHalf;

    #[tokio::test]
    async fn test_server_start() {
        let store: Arc<dyn SessionStore> = Arc::new(LocalStore::open_in_memory().unwrap());
        let server = StoreServer::start(0, store).await.unwrap();
        assert!(server.addr().port() > 0);
        server.shutdown();
    }

    #[tokio::test]
    async fn test_request_and_failure_over_raw_socket() {
        let store: Arc<dyn SessionStore> = Arc::new(LocalStore::open_in_memory().unwrap());
        let server = StoreServer::start(0, store).await.unwrap();
        let addr = SocketAddr::from(([127, 0, 0, 1], server.addr().port()));

        let stream = TcpStream::connect(addr).await.unwrap();
        let (mut reader, mut writer): (ReadHalf<TcpStream>, WriteHalf<TcpStream>) =
            tokio::io::split(stream);

        write_frame(
            &mut writer,
            &Message::Request {
                id: 1,
                request: StoreRequest::UpdateGame {
                    game_id: Uuid::new_v4(),
                    patch: poker_core::GamePatch::new().reveal(true),
                },
            },
        )
        .await
        .unwrap();
        match read_frame(&mut reader).await.unwrap() {
            Message::Failure { id, kind, .. } => {
                assert_eq!(id, 1);
                assert_eq!(kind, FailureKind::NotFound);
            }
            other => panic!("unexpected message {:?}", other),
        }

        write_frame(&mut writer, &Message::Ping).await.unwrap();
        assert!(matches!(read_frame(&mut reader).await.unwrap(), Message::Pong));

        server.shutdown();
        assert!(matches!(
            read_frame(&mut reader).await.unwrap(),
            Message::ServerShutdown
        ));
    }
}
