//! Session controller
//!
//! Owns one player's view of one game: runs the host/player operations
//! against a `SessionStore`, rebuilds the cached view whenever the store
//! reports a change, and drives the voting countdown. Everything happens on
//! the caller's task; `next_event` is meant to be polled from a single
//! cooperative loop alongside user input.

mod events;
mod view;

use std::collections::VecDeque;
use std::sync::Arc;

use chrono::Utc;
use tokio::time::{interval, Interval, MissedTickBehavior};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::consensus::Consensus;
use crate::error::{Error, Result};
use crate::invariants::{assert_game_id_valid, assert_game_invariants};
use crate::models::{
    CardValue, Estimate, GamePatch, InviteCode, NewGame, NewPlayer, NewStory, PlayerPatch, Story,
    StoryPatch, StoryStatus, TimerSettings, MAX_TIMER_SECS, MIN_TIMER_SECS,
};
use crate::permissions::{PermissionMatrix, SessionAction};
use crate::store::{Celebration, SessionStore, StoreEvent, Subscription};
use crate::timer::{TimerController, TimerTick, TICK_INTERVAL};

pub use events::{SessionEvent, SessionHandle};
pub use view::GameView;

/// Invite code generation attempts before giving up on collisions
pub const MAX_INVITE_ATTEMPTS: usize = 5;

/// Subscription and countdown for the game being viewed
struct Watch {
    subscription: Subscription,
    timer: Option<TimerController>,
    ticker: Interval,
}

impl Watch {
    fn new(subscription: Subscription) -> Self {
        let mut ticker = interval(TICK_INTERVAL);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        Self {
            subscription,
            timer: None,
            ticker,
        }
    }

    fn timer_running(&self) -> bool {
        self.timer.as_ref().is_some_and(|t| !t.has_fired())
    }
}

enum Wake {
    Store(Option<StoreEvent>),
    Tick,
}

pub struct SessionController<S: SessionStore + ?Sized> {
    store: Arc<S>,
    handle: Option<SessionHandle>,
    view: Option<GameView>,
    watch: Option<Watch>,
    pending: VecDeque<Celebration>,
    /// A change was seen but the refetch has not completed yet
    stale: bool,
    /// The countdown expired and the host still owes the reveal
    reveal_due: bool,
}

impl<S: SessionStore + ?Sized> SessionController<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self {
            store,
            handle: None,
            view: None,
            watch: None,
            pending: VecDeque::new(),
            stale: false,
            reveal_due: false,
        }
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn handle(&self) -> Option<SessionHandle> {
        self.handle
    }

    pub fn view(&self) -> Option<&GameView> {
        self.view.as_ref()
    }

    /// Seconds left on the running countdown, if any
    pub fn remaining_seconds(&self) -> Option<i64> {
        self.watch
            .as_ref()
            .and_then(|w| w.timer.as_ref())
            .filter(|t| !t.has_fired())
            .map(|t| t.remaining(Utc::now()))
    }

    /// Create a game hosted by `host_name` and enter it
    #[instrument(skip(self))]
    pub async fn create_game(&mut self, name: &str, host_name: &str) -> Result<InviteCode> {
        let mut attempt = 1;
        let game = loop {
            let invite_code = InviteCode::generate(&mut rand::thread_rng());
            let new_game = NewGame {
                name: name.to_string(),
                invite_code,
                timer: TimerSettings::default(),
            };
            match self.store.insert_game(&new_game).await {
                Ok(game) => break game,
                Err(Error::Conflict(reason)) if attempt < MAX_INVITE_ATTEMPTS => {
                    warn!(attempt, %reason, "Invite code collision, retrying");
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        };

        let host = match self
            .store
            .insert_player(&NewPlayer {
                game_id: game.id,
                name: host_name.to_string(),
                is_host: true,
            })
            .await
        {
            Ok(host) => host,
            Err(e) => {
                // The game row stays behind without a host
                warn!(game_id = %game.id, error = %e, "Failed to add host, game left orphaned");
                return Err(e);
            }
        };

        info!(game_id = %game.id, invite_code = %game.invite_code, "Game created");
        self.enter(SessionHandle {
            game_id: game.id,
            player_id: host.id,
        })
        .await?;
        Ok(game.invite_code)
    }

    /// Join the game behind an invite code as a regular player
    #[instrument(skip(self))]
    pub async fn join_game(&mut self, invite_code: &str, player_name: &str) -> Result<SessionHandle> {
        let code = InviteCode::parse(invite_code)?;
        let game = self
            .store
            .find_game_by_invite_code(&code)
            .await?
            .ok_or_else(|| Error::NotFound(format!("no game with invite code {}", code)))?;

        let player = self
            .store
            .insert_player(&NewPlayer {
                game_id: game.id,
                name: player_name.to_string(),
                is_host: false,
            })
            .await?;

        let handle = SessionHandle {
            game_id: game.id,
            player_id: player.id,
        };
        info!(game_id = %game.id, player_id = %player.id, "Joined game");
        self.enter(handle).await?;
        Ok(handle)
    }

    /// Attach to an existing seat: subscribe, then load the first snapshot
    pub async fn enter(&mut self, handle: SessionHandle) -> Result<()> {
        assert_game_id_valid(handle.game_id, "enter");
        self.leave();

        // Subscribe before the first load so no change slips between them
        let subscription = self.store.subscribe(handle.game_id).await?;
        self.watch = Some(Watch::new(subscription));
        self.handle = Some(handle);

        if let Err(e) = self.sync().await {
            self.leave();
            return Err(e);
        }
        Ok(())
    }

    /// Drop the subscription, countdown and cached view
    pub fn leave(&mut self) {
        if let Some(handle) = self.handle.take() {
            debug!(game_id = %handle.game_id, "Leaving game");
        }
        self.watch = None;
        self.view = None;
        self.pending.clear();
        self.stale = false;
        self.reveal_due = false;
    }

    /// Refetch the game and rebuild the view
    pub async fn sync(&mut self) -> Result<()> {
        let handle = self.require_handle()?;
        let game = self
            .store
            .load_game(handle.game_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("game {}", handle.game_id)))?;

        assert_game_invariants(&game);
        let end = game.timer_end_time;
        self.view = Some(GameView::new(game, handle.player_id));
        self.arm_timer(end);
        Ok(())
    }

    /// Wait for the next thing worth showing
    ///
    /// Cancel-safe: a refetch or automatic reveal interrupted by dropping the
    /// future is resumed by the next call.
    pub async fn next_event(&mut self) -> SessionEvent {
        loop {
            if self.reveal_due {
                self.auto_reveal().await;
                return SessionEvent::TimerExpired;
            }
            if self.stale {
                return self.refresh().await;
            }
            if let Some(event) = self.pending.pop_front() {
                return SessionEvent::Celebrate(event);
            }
            let Some(watch) = self.watch.as_mut() else {
                return SessionEvent::Closed;
            };

            let ticking = watch.timer_running();
            let wake = tokio::select! {
                event = watch.subscription.recv() => Wake::Store(event),
                _ = watch.ticker.tick(), if ticking => Wake::Tick,
            };

            match wake {
                Wake::Store(None) => {
                    warn!("Store closed the subscription");
                    self.leave();
                    return SessionEvent::Closed;
                }
                Wake::Store(Some(StoreEvent::Broadcast { event, .. })) => {
                    return SessionEvent::Celebrate(event);
                }
                Wake::Store(Some(StoreEvent::Changed { .. })) => {
                    self.stale = true;
                    self.drain_queued();
                    return self.refresh().await;
                }
                Wake::Tick => {
                    if let Some(event) = self.on_tick().await {
                        return event;
                    }
                }
            }
        }
    }

    pub async fn add_story(&mut self, title: &str, description: Option<&str>) -> Result<Story> {
        let handle = self.require_host(SessionAction::AddStory)?;
        let title = title.trim();
        if title.is_empty() {
            return Err(Error::InvalidOperation("story title is empty".to_string()));
        }

        let story = self
            .store
            .insert_story(&NewStory {
                game_id: handle.game_id,
                title: title.to_string(),
                description: description
                    .map(str::trim)
                    .filter(|d| !d.is_empty())
                    .map(str::to_string),
            })
            .await?;

        let stories = self.store.list_stories(handle.game_id).await?;
        if stories.len() == 1 {
            self.store
                .update_game(handle.game_id, &GamePatch::new().current_story(Some(story.id)))
                .await?;
        }
        debug!(story_id = %story.id, "Story added");
        Ok(story)
    }

    /// Point the game at a story without changing its status
    pub async fn select_story(&mut self, story_id: Uuid) -> Result<()> {
        let handle = self.require_host(SessionAction::SelectStory)?;
        self.require_own_story(handle.game_id, story_id).await?;
        self.store
            .update_game(
                handle.game_id,
                &GamePatch::new()
                    .current_story(Some(story_id))
                    .reveal(false)
                    .timer_end(None),
            )
            .await?;
        self.store.clear_votes(handle.game_id).await
    }

    pub async fn start_voting(&mut self, story_id: Uuid) -> Result<()> {
        let handle = self.require_host(SessionAction::StartVoting)?;
        self.require_own_story(handle.game_id, story_id).await?;
        let timer = self.cached_timer();

        self.store
            .update_story(story_id, &StoryPatch::status(StoryStatus::Voting))
            .await?;
        self.store
            .update_game(
                handle.game_id,
                &GamePatch::new()
                    .current_story(Some(story_id))
                    .reveal(false)
                    .timer_end(timer.end_if_enabled(Utc::now())),
            )
            .await?;
        self.store.clear_votes(handle.game_id).await?;
        info!(story_id = %story_id, "Voting started");
        Ok(())
    }

    /// Set this player's own vote
    pub async fn cast_vote(&mut self, card: CardValue) -> Result<()> {
        let handle = self.require_handle()?;
        self.store
            .update_player(handle.player_id, &PlayerPatch::vote(Some(card)))
            .await?;
        Ok(())
    }

    pub async fn reveal_cards(&mut self) -> Result<()> {
        let handle = self.require_host(SessionAction::RevealCards)?;
        let story_id = self
            .view
            .as_ref()
            .and_then(|v| v.game().current_story_id)
            .ok_or_else(|| Error::InvalidOperation("no story selected".to_string()))?;

        self.store
            .update_game(handle.game_id, &GamePatch::new().reveal(true).timer_end(None))
            .await?;
        self.store
            .update_story(story_id, &StoryPatch::status(StoryStatus::Revealed))
            .await?;

        let players = self.store.list_players(handle.game_id).await?;
        let consensus = Consensus::from_votes(
            players.iter().map(|p| p.current_vote),
        );
        info!(
            story_id = %story_id,
            percentage = consensus.percentage,
            level = ?consensus.level,
            "Cards revealed"
        );

        if let Some(value) = consensus.value.filter(|_| consensus.level.is_celebrated()) {
            let event = Celebration::Consensus {
                story_id,
                value,
                percentage: consensus.percentage,
                level: consensus.level,
            };
            if let Err(e) = self.store.broadcast(handle.game_id, event).await {
                warn!(error = %e, "Failed to broadcast consensus");
            }
        }
        Ok(())
    }

    pub async fn reset_voting(&mut self) -> Result<()> {
        let handle = self.require_host(SessionAction::ResetVoting)?;
        let timer = self.cached_timer();
        let story_id = self.view.as_ref().and_then(|v| v.game().current_story_id);

        self.store.clear_votes(handle.game_id).await?;
        self.store
            .update_game(
                handle.game_id,
                &GamePatch::new()
                    .reveal(false)
                    .timer_end(timer.end_if_enabled(Utc::now())),
            )
            .await?;
        if let Some(story_id) = story_id {
            self.store
                .update_story(story_id, &StoryPatch::status(StoryStatus::Voting))
                .await?;
        }
        Ok(())
    }

    /// Complete a story and, if it was current, move on to the next pending one
    pub async fn finalize_estimate(
        &mut self,
        story_id: Uuid,
        estimate: Option<Estimate>,
    ) -> Result<()> {
        let handle = self.require_host(SessionAction::FinalizeEstimate)?;
        self.require_own_story(handle.game_id, story_id).await?;

        self.store
            .update_story(story_id, &StoryPatch::completed(estimate.clone()))
            .await?;

        let game = self
            .store
            .load_game(handle.game_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("game {}", handle.game_id)))?;

        if game.current_story_id == Some(story_id) {
            let next = game.next_pending_story(story_id).map(|s| s.id);
            self.store
                .update_game(
                    handle.game_id,
                    &GamePatch::new()
                        .current_story(next)
                        .reveal(false)
                        .timer_end(None),
                )
                .await?;
            debug!(story_id = %story_id, next = ?next, "Advanced current story");
        }

        info!(story_id = %story_id, estimate = ?estimate, "Estimate finalized");
        let event = Celebration::EstimateFinalized { story_id, estimate };
        if let Err(e) = self.store.broadcast(handle.game_id, event).await {
            warn!(error = %e, "Failed to broadcast finalized estimate");
        }
        Ok(())
    }

    /// Configure the countdown; keeps the current duration when none is given
    pub async fn set_timer(&mut self, enabled: bool, duration_secs: Option<u32>) -> Result<()> {
        let handle = self.require_host(SessionAction::ConfigureTimer)?;
        let duration = duration_secs.unwrap_or(self.cached_timer().duration_secs);
        if !(MIN_TIMER_SECS..=MAX_TIMER_SECS).contains(&duration) {
            return Err(Error::InvalidOperation(format!(
                "timer duration must be between {} and {} seconds",
                MIN_TIMER_SECS, MAX_TIMER_SECS
            )));
        }

        self.store
            .update_game(
                handle.game_id,
                &GamePatch::new()
                    .timer_settings(enabled, duration)
                    .timer_end(None),
            )
            .await
    }

    pub async fn start_timer(&mut self) -> Result<()> {
        let handle = self.require_host(SessionAction::StartTimer)?;
        let timer = self.cached_timer();
        if !timer.enabled {
            return Err(Error::InvalidOperation("timer is disabled".to_string()));
        }

        self.store
            .update_game(
                handle.game_id,
                &GamePatch::new().timer_end(Some(timer.end_from(Utc::now()))),
            )
            .await
    }

    fn require_handle(&self) -> Result<SessionHandle> {
        self.handle
            .ok_or_else(|| Error::InvalidOperation("not in a game".to_string()))
    }

    fn require_host(&self, action: SessionAction) -> Result<SessionHandle> {
        let handle = self.require_handle()?;
        let is_host = self.view.as_ref().is_some_and(GameView::is_host);
        if !PermissionMatrix::can_perform(is_host, action) {
            return Err(Error::PermissionDenied(format!(
                "only the host can {}",
                action.label()
            )));
        }
        Ok(handle)
    }

    /// `NotFound` unless the story belongs to this session's game
    async fn require_own_story(&self, game_id: Uuid, story_id: Uuid) -> Result<()> {
        let cached = self
            .view
            .as_ref()
            .is_some_and(|v| v.game().story(story_id).is_some());
        if cached {
            return Ok(());
        }

        // Stories added since the last refetch are not cached yet
        let stories = self.store.list_stories(game_id).await?;
        if stories.iter().any(|s| s.id == story_id) {
            Ok(())
        } else {
            Err(Error::NotFound(format!("story {} is not in this game", story_id)))
        }
    }

    fn cached_timer(&self) -> TimerSettings {
        self.view
            .as_ref()
            .map(|v| v.game().timer)
            .unwrap_or_default()
    }

    /// Pull already-queued notifications so a burst costs one refetch
    fn drain_queued(&mut self) {
        let Some(watch) = self.watch.as_mut() else {
            return;
        };
        let mut coalesced = 0usize;
        while let Some(event) = watch.subscription.try_recv() {
            match event {
                StoreEvent::Changed { .. } => coalesced += 1,
                StoreEvent::Broadcast { event, .. } => self.pending.push_back(event),
            }
        }
        if coalesced > 0 {
            debug!(coalesced, "Coalesced change notifications");
        }
    }

    /// Start a new run when the end instant changes; an unchanged end keeps its state
    fn arm_timer(&mut self, end: Option<chrono::DateTime<Utc>>) {
        let Some(watch) = self.watch.as_mut() else {
            return;
        };
        match (end, watch.timer.as_ref()) {
            (None, _) => watch.timer = None,
            (Some(end), Some(current)) if current.end() == end => {}
            (Some(end), _) => {
                debug!(%end, "Timer armed");
                watch.timer = Some(TimerController::new(end));
                watch.ticker.reset_immediately();
            }
        }
    }

    async fn refresh(&mut self) -> SessionEvent {
        match self.sync().await {
            Ok(()) => {
                self.stale = false;
                SessionEvent::Updated
            }
            Err(e) => {
                self.stale = false;
                warn!(error = %e, "Refetch failed");
                SessionEvent::SyncFailed(e.to_string())
            }
        }
    }

    async fn on_tick(&mut self) -> Option<SessionEvent> {
        let tick = self.watch.as_mut()?.timer.as_mut()?.tick(Utc::now());
        match tick {
            TimerTick::Running(secs) => Some(SessionEvent::Countdown(secs)),
            TimerTick::Stopped => None,
            TimerTick::Expired => {
                if self.should_auto_reveal() {
                    self.reveal_due = true;
                    self.auto_reveal().await;
                }
                Some(SessionEvent::TimerExpired)
            }
        }
    }

    async fn auto_reveal(&mut self) {
        info!("Timer expired, revealing cards");
        if let Err(e) = self.reveal_cards().await {
            warn!(error = %e, "Automatic reveal failed");
        }
        self.reveal_due = false;
    }

    fn should_auto_reveal(&self) -> bool {
        self.view.as_ref().is_some_and(|v| {
            v.is_host() && v.current_story().is_some() && !v.game().reveal_cards
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consensus::ConsensusLevel;
    use crate::error::ErrorKind;
    use crate::invariants::assert_current_story_advanced;
    use crate::models::{GameRecord, Player};
    use crate::store::LocalStore;
    use async_trait::async_trait;
    use chrono::Duration as ChronoDuration;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tokio::time::timeout;

    type Controller = SessionController<LocalStore>;

    async fn hosted(store: &Arc<LocalStore>) -> (Controller, InviteCode) {
        let mut alice = SessionController::new(store.clone());
        let code = alice.create_game("Sprint 5", "Alice").await.unwrap();
        (alice, code)
    }

    async fn joined(store: &Arc<LocalStore>, code: &InviteCode, name: &str) -> Controller {
        let mut player = SessionController::new(store.clone());
        player.join_game(code.as_str(), name).await.unwrap();
        player
    }

    fn view(controller: &Controller) -> &GameView {
        controller.view().unwrap()
    }

    async fn wait_for<F>(controller: &mut Controller, mut pred: F) -> SessionEvent
    where
        F: FnMut(&SessionEvent) -> bool,
    {
        timeout(Duration::from_secs(5), async {
            loop {
                let event = controller.next_event().await;
                if pred(&event) {
                    return event;
                }
            }
        })
        .await
        .expect("timed out waiting for session event")
    }

    #[tokio::test]
    async fn test_full_round() {
        let store = Arc::new(LocalStore::open_in_memory().unwrap());
        let (mut alice, code) = hosted(&store).await;
        assert_eq!(code.as_str().len(), 6);
        assert!(view(&alice).is_host());
        assert_eq!(view(&alice).game().players.len(), 1);

        let mut bob = joined(&store, &code, "Bob").await;
        assert!(!view(&bob).is_host());
        let names: Vec<_> = view(&bob)
            .game()
            .players
            .iter()
            .map(|p| p.name.clone())
            .collect();
        assert_eq!(names, vec!["Alice", "Bob"]);

        alice.sync().await.unwrap();
        let story = alice.add_story("Login bug", None).await.unwrap();
        alice.sync().await.unwrap();
        assert_eq!(view(&alice).game().current_story_id, Some(story.id));

        alice.start_voting(story.id).await.unwrap();
        alice.cast_vote(CardValue::Five).await.unwrap();
        bob.cast_vote(CardValue::Five).await.unwrap();
        alice.sync().await.unwrap();
        assert!(view(&alice).is_voting());
        assert!(view(&alice).all_voted());

        alice.reveal_cards().await.unwrap();
        alice.sync().await.unwrap();
        let consensus = view(&alice).consensus().unwrap();
        assert_eq!(consensus.value, Some(CardValue::Five));
        assert_eq!(consensus.percentage, 100);
        assert_eq!(consensus.level, ConsensusLevel::Perfect);

        alice
            .finalize_estimate(story.id, Estimate::parse_opt("5"))
            .await
            .unwrap();
        alice.sync().await.unwrap();
        let game = view(&alice).game();
        let done = game.story(story.id).unwrap();
        assert_eq!(done.status, StoryStatus::Completed);
        assert_eq!(done.final_estimate, Some(Estimate::Card(CardValue::Five)));
        assert_eq!(game.current_story_id, None);
        assert_current_story_advanced(view(&alice).game(), story.id);
    }

    #[tokio::test]
    async fn test_join_with_bad_codes() {
        let store = Arc::new(LocalStore::open_in_memory().unwrap());
        let (_alice, code) = hosted(&store).await;

        let mut bob = SessionController::new(store.clone());
        let lowercase = code.as_str().to_lowercase();
        bob.join_game(&lowercase, "Bob").await.unwrap();

        let mut carol = SessionController::new(store.clone());
        let err = carol.join_game("ZZ", "Carol").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);

        let unused = if code.as_str() == "QQQQQQ" { "WWWWWW" } else { "QQQQQQ" };
        let err = carol.join_game(unused, "Carol").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert!(carol.view().is_none());
    }

    #[tokio::test]
    async fn test_non_host_cannot_mutate() {
        let store = Arc::new(LocalStore::open_in_memory().unwrap());
        let (mut alice, code) = hosted(&store).await;
        let story = alice.add_story("Login bug", None).await.unwrap();
        let mut bob = joined(&store, &code, "Bob").await;

        let err = bob.add_story("Sneaky", None).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Permission);
        let err = bob.start_voting(story.id).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Permission);
        let err = bob.reveal_cards().await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Permission);
        let err = bob.set_timer(true, None).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Permission);

        let game = store.load_game(view(&alice).game().id).await.unwrap().unwrap();
        assert_eq!(game.stories.len(), 1);
        assert_eq!(game.stories[0].status, StoryStatus::Pending);
        assert!(!game.timer.enabled);
    }

    #[tokio::test]
    async fn test_operations_require_a_session() {
        let store = Arc::new(LocalStore::open_in_memory().unwrap());
        let mut idle = SessionController::new(store);
        let err = idle.cast_vote(CardValue::One).await.unwrap_err();
        assert!(matches!(err, Error::InvalidOperation(_)));
        assert_eq!(idle.next_event().await, SessionEvent::Closed);
    }

    #[tokio::test]
    async fn test_start_voting_clears_votes() {
        let store = Arc::new(LocalStore::open_in_memory().unwrap());
        let (mut alice, code) = hosted(&store).await;
        let mut bob = joined(&store, &code, "Bob").await;
        let first = alice.add_story("First", None).await.unwrap();
        let second = alice.add_story("Second", None).await.unwrap();
        alice.sync().await.unwrap();

        alice.start_voting(first.id).await.unwrap();
        alice.cast_vote(CardValue::Three).await.unwrap();
        bob.cast_vote(CardValue::Eight).await.unwrap();

        alice.start_voting(second.id).await.unwrap();
        alice.sync().await.unwrap();
        let game = view(&alice).game();
        assert!(game.players.iter().all(|p| p.current_vote.is_none()));
        assert_eq!(game.current_story_id, Some(second.id));
        assert!(!game.reveal_cards);
        assert_eq!(game.timer_end_time, None);
    }

    #[tokio::test]
    async fn test_select_story_keeps_status() {
        let store = Arc::new(LocalStore::open_in_memory().unwrap());
        let (mut alice, _) = hosted(&store).await;
        let first = alice.add_story("First", None).await.unwrap();
        let second = alice.add_story("Second", Some("  details ")).await.unwrap();
        assert_eq!(second.description.as_deref(), Some("details"));
        alice.sync().await.unwrap();

        alice.start_voting(first.id).await.unwrap();
        alice.cast_vote(CardValue::Two).await.unwrap();
        alice.sync().await.unwrap();

        alice.select_story(second.id).await.unwrap();
        alice.sync().await.unwrap();
        let game = view(&alice).game();
        assert_eq!(game.current_story_id, Some(second.id));
        assert_eq!(game.story(first.id).unwrap().status, StoryStatus::Voting);
        assert_eq!(game.story(second.id).unwrap().status, StoryStatus::Pending);
        assert!(!view(&alice).has_voted());
    }

    #[tokio::test]
    async fn test_finalize_advances_to_next_pending() {
        let store = Arc::new(LocalStore::open_in_memory().unwrap());
        let (mut alice, _) = hosted(&store).await;
        let a = alice.add_story("A", None).await.unwrap();
        let b = alice.add_story("B", None).await.unwrap();
        let c = alice.add_story("C", None).await.unwrap();
        alice.sync().await.unwrap();

        // Finalizing a non-current story leaves the pointer alone
        alice
            .finalize_estimate(b.id, Some(Estimate::Custom("XL".to_string())))
            .await
            .unwrap();
        alice.sync().await.unwrap();
        assert_eq!(view(&alice).game().current_story_id, Some(a.id));

        alice.start_voting(a.id).await.unwrap();
        alice.reveal_cards().await.unwrap();
        alice.sync().await.unwrap();
        alice.finalize_estimate(a.id, None).await.unwrap();
        alice.sync().await.unwrap();

        let game = view(&alice).game();
        assert_eq!(game.current_story_id, Some(c.id));
        assert!(!game.reveal_cards);
        assert_eq!(game.story(a.id).unwrap().final_estimate, None);
        assert_current_story_advanced(view(&alice).game(), a.id);
    }

    #[tokio::test]
    async fn test_reset_voting_reopens_round() {
        let store = Arc::new(LocalStore::open_in_memory().unwrap());
        let (mut alice, _) = hosted(&store).await;
        let story = alice.add_story("A", None).await.unwrap();
        alice.sync().await.unwrap();
        alice.set_timer(true, Some(30)).await.unwrap();
        alice.sync().await.unwrap();

        alice.start_voting(story.id).await.unwrap();
        alice.cast_vote(CardValue::Thirteen).await.unwrap();
        alice.reveal_cards().await.unwrap();
        alice.sync().await.unwrap();
        assert!(view(&alice).is_revealed());
        assert_eq!(view(&alice).game().timer_end_time, None);

        alice.reset_voting().await.unwrap();
        alice.sync().await.unwrap();
        let game = view(&alice).game();
        assert!(!game.reveal_cards);
        assert!(view(&alice).is_voting());
        assert!(game.players.iter().all(|p| p.current_vote.is_none()));
        assert!(game.timer_end_time.is_some());
    }

    #[tokio::test]
    async fn test_timer_configuration() {
        let store = Arc::new(LocalStore::open_in_memory().unwrap());
        let (mut alice, _) = hosted(&store).await;

        let err = alice.start_timer().await.unwrap_err();
        assert!(matches!(err, Error::InvalidOperation(_)));
        let err = alice.set_timer(true, Some(2)).await.unwrap_err();
        assert!(matches!(err, Error::InvalidOperation(_)));
        let err = alice.set_timer(true, Some(601)).await.unwrap_err();
        assert!(matches!(err, Error::InvalidOperation(_)));

        alice.set_timer(true, Some(60)).await.unwrap();
        alice.sync().await.unwrap();
        assert_eq!(
            view(&alice).game().timer,
            TimerSettings {
                enabled: true,
                duration_secs: 60
            }
        );

        alice.start_timer().await.unwrap();
        alice.sync().await.unwrap();
        let remaining = alice.remaining_seconds().unwrap();
        assert!((59..=60).contains(&remaining));

        // Reconfiguring cancels the running countdown but keeps the duration
        alice.set_timer(true, None).await.unwrap();
        alice.sync().await.unwrap();
        assert_eq!(view(&alice).game().timer_end_time, None);
        assert_eq!(view(&alice).game().timer.duration_secs, 60);
        assert_eq!(alice.remaining_seconds(), None);
    }

    #[tokio::test]
    async fn test_remote_change_produces_update() {
        let store = Arc::new(LocalStore::open_in_memory().unwrap());
        let (mut alice, code) = hosted(&store).await;
        let mut bob = joined(&store, &code, "Bob").await;

        bob.cast_vote(CardValue::Eight).await.unwrap();
        let event = wait_for(&mut alice, |e| *e == SessionEvent::Updated).await;
        assert_eq!(event, SessionEvent::Updated);

        let bob_row = view(&alice)
            .game()
            .players
            .iter()
            .find(|p| p.name == "Bob")
            .cloned()
            .unwrap();
        assert!(bob_row.has_voted());
        assert_eq!(view(&alice).visible_vote(&bob_row), None);
    }

    #[tokio::test]
    async fn test_consensus_is_celebrated() {
        let store = Arc::new(LocalStore::open_in_memory().unwrap());
        let (mut alice, code) = hosted(&store).await;
        let mut bob = joined(&store, &code, "Bob").await;
        let story = alice.add_story("Login bug", None).await.unwrap();
        alice.sync().await.unwrap();

        alice.start_voting(story.id).await.unwrap();
        alice.cast_vote(CardValue::Eight).await.unwrap();
        bob.cast_vote(CardValue::Eight).await.unwrap();
        alice.reveal_cards().await.unwrap();

        let event = wait_for(&mut bob, |e| matches!(e, SessionEvent::Celebrate(_))).await;
        assert_eq!(
            event,
            SessionEvent::Celebrate(Celebration::Consensus {
                story_id: story.id,
                value: CardValue::Eight,
                percentage: 100,
                level: ConsensusLevel::Perfect,
            })
        );
    }

    #[tokio::test]
    async fn test_expired_timer_auto_reveals_for_host() {
        let store = Arc::new(LocalStore::open_in_memory().unwrap());
        let (mut alice, _) = hosted(&store).await;
        let story = alice.add_story("A", None).await.unwrap();
        alice.sync().await.unwrap();
        alice.start_voting(story.id).await.unwrap();
        alice.sync().await.unwrap();

        let game_id = alice.handle().unwrap().game_id;
        store
            .update_game(
                game_id,
                &GamePatch::new().timer_end(Some(Utc::now() - ChronoDuration::seconds(1))),
            )
            .await
            .unwrap();

        wait_for(&mut alice, |e| *e == SessionEvent::TimerExpired).await;
        let game = store.load_game(game_id).await.unwrap().unwrap();
        assert!(game.reveal_cards);
        assert_eq!(game.story(story.id).unwrap().status, StoryStatus::Revealed);
        assert_eq!(game.timer_end_time, None);
    }

    #[tokio::test]
    async fn test_leave_stops_events() {
        let store = Arc::new(LocalStore::open_in_memory().unwrap());
        let (mut alice, _) = hosted(&store).await;
        let game_id = alice.handle().unwrap().game_id;
        assert_eq!(store.subscriber_count(game_id), 1);

        alice.leave();
        assert!(alice.view().is_none());
        assert_eq!(store.subscriber_count(game_id), 0);
        assert_eq!(alice.next_event().await, SessionEvent::Closed);
    }

    #[tokio::test]
    async fn test_story_operations_stay_inside_own_game() {
        let store = Arc::new(LocalStore::open_in_memory().unwrap());
        let (mut alice, _) = hosted(&store).await;
        let mut mallory = SessionController::new(store.clone());
        mallory.create_game("Other team", "Mallory").await.unwrap();
        let other_game = mallory.handle().unwrap().game_id;
        let theirs = mallory.add_story("Theirs", None).await.unwrap();

        let selected = alice.select_story(theirs.id).await;
        assert!(matches!(selected, Err(Error::NotFound(_))), "{:?}", selected);
        let started = alice.start_voting(theirs.id).await;
        assert!(matches!(started, Err(Error::NotFound(_))), "{:?}", started);
        let finalized = alice
            .finalize_estimate(theirs.id, Estimate::parse_opt("8"))
            .await;
        assert!(matches!(finalized, Err(Error::NotFound(_))), "{:?}", finalized);

        let untouched = &store.list_stories(other_game).await.unwrap()[0];
        assert_eq!(untouched.status, StoryStatus::Pending);
        assert_eq!(untouched.final_estimate, None);

        alice.sync().await.unwrap();
        assert_eq!(view(&alice).game().current_story_id, None);
    }

    #[tokio::test]
    async fn test_fresh_story_usable_before_refetch() {
        let store = Arc::new(LocalStore::open_in_memory().unwrap());
        let (mut alice, _) = hosted(&store).await;
        let story = alice.add_story("Login bug", None).await.unwrap();
        assert!(view(&alice).game().story(story.id).is_none());

        alice.start_voting(story.id).await.unwrap();
        alice.sync().await.unwrap();
        assert!(view(&alice).is_voting());
    }

    /// Local store that rejects the first `collisions` games and optionally every player
    struct FlakyStore {
        inner: LocalStore,
        collisions: AtomicUsize,
        game_inserts: AtomicUsize,
        reject_players: bool,
    }

    impl FlakyStore {
        fn new(collisions: usize, reject_players: bool) -> Self {
            Self {
                inner: LocalStore::open_in_memory().unwrap(),
                collisions: AtomicUsize::new(collisions),
                game_inserts: AtomicUsize::new(0),
                reject_players,
            }
        }

        fn game_inserts(&self) -> usize {
            self.game_inserts.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl SessionStore for FlakyStore {
        async fn insert_game(&self, game: &NewGame) -> Result<GameRecord> {
            self.game_inserts.fetch_add(1, Ordering::SeqCst);
            let left = self.collisions.load(Ordering::SeqCst);
            if left > 0 {
                self.collisions.store(left - 1, Ordering::SeqCst);
                return Err(Error::Conflict(format!("invite code {} is taken", game.invite_code)));
            }
            self.inner.insert_game(game).await
        }

        async fn find_game(&self, game_id: Uuid) -> Result<Option<GameRecord>> {
            self.inner.find_game(game_id).await
        }

        async fn find_game_by_invite_code(&self, code: &InviteCode) -> Result<Option<GameRecord>> {
            self.inner.find_game_by_invite_code(code).await
        }

        async fn update_game(&self, game_id: Uuid, patch: &GamePatch) -> Result<()> {
            self.inner.update_game(game_id, patch).await
        }

        async fn insert_player(&self, player: &NewPlayer) -> Result<Player> {
            if self.reject_players {
                return Err(Error::Persistence("players table is read-only".to_string()));
            }
            self.inner.insert_player(player).await
        }

        async fn update_player(&self, player_id: Uuid, patch: &PlayerPatch) -> Result<Player> {
            self.inner.update_player(player_id, patch).await
        }

        async fn clear_votes(&self, game_id: Uuid) -> Result<()> {
            self.inner.clear_votes(game_id).await
        }

        async fn list_players(&self, game_id: Uuid) -> Result<Vec<Player>> {
            self.inner.list_players(game_id).await
        }

        async fn insert_story(&self, story: &NewStory) -> Result<Story> {
            self.inner.insert_story(story).await
        }

        async fn update_story(&self, story_id: Uuid, patch: &StoryPatch) -> Result<Story> {
            self.inner.update_story(story_id, patch).await
        }

        async fn list_stories(&self, game_id: Uuid) -> Result<Vec<Story>> {
            self.inner.list_stories(game_id).await
        }

        async fn subscribe(&self, game_id: Uuid) -> Result<Subscription> {
            self.inner.subscribe(game_id).await
        }

        async fn broadcast(&self, game_id: Uuid, event: Celebration) -> Result<()> {
            self.inner.broadcast(game_id, event).await
        }
    }

    #[tokio::test]
    async fn test_invite_collisions_are_retried() {
        let store = Arc::new(FlakyStore::new(MAX_INVITE_ATTEMPTS - 1, false));
        let mut alice = SessionController::new(store.clone());

        let code = alice.create_game("Sprint 5", "Alice").await.unwrap();
        assert_eq!(store.game_inserts(), MAX_INVITE_ATTEMPTS);
        assert!(alice.view().unwrap().is_host());
        assert_eq!(alice.view().unwrap().game().invite_code, code);
    }

    #[tokio::test]
    async fn test_invite_collisions_give_up() {
        let store = Arc::new(FlakyStore::new(MAX_INVITE_ATTEMPTS, false));
        let mut alice = SessionController::new(store.clone());

        let result = alice.create_game("Sprint 5", "Alice").await;
        assert!(matches!(result, Err(Error::Conflict(_))), "{:?}", result);
        assert_eq!(store.game_inserts(), MAX_INVITE_ATTEMPTS);
        assert!(alice.handle().is_none());
    }

    #[tokio::test]
    async fn test_failed_host_insert_is_reported() {
        let store = Arc::new(FlakyStore::new(0, true));
        let mut alice = SessionController::new(store.clone());

        let result = alice.create_game("Sprint 5", "Alice").await;
        assert_eq!(result.unwrap_err().kind(), ErrorKind::Persistence);
        assert!(alice.handle().is_none());
        assert!(alice.view().is_none());
    }
}
