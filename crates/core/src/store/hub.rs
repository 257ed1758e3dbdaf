//! Per-game event fan-out

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::broadcast;
use tracing::debug;
use uuid::Uuid;

use super::{StoreEvent, Subscription};

/// Buffered events per game before a slow subscriber starts lagging
const CHANNEL_CAPACITY: usize = 64;

type Channels = Arc<Mutex<HashMap<Uuid, broadcast::Sender<StoreEvent>>>>;

/// One broadcast channel per game with at least one subscriber
#[derive(Default)]
pub struct NotificationHub {
    channels: Channels,
}

impl NotificationHub {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, game_id: Uuid) -> Subscription {
        let mut channels = self.channels.lock().unwrap_or_else(|e| e.into_inner());
        let rx = channels
            .entry(game_id)
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .subscribe();

        let registry = Arc::clone(&self.channels);
        Subscription::new(game_id, rx).with_drop_hook(move || release(&registry, game_id))
    }

    /// Deliver to the game's subscribers; returns how many received it
    pub fn publish(&self, event: StoreEvent) -> usize {
        let game_id = event.game_id();
        let mut channels = self.channels.lock().unwrap_or_else(|e| e.into_inner());

        let Some(tx) = channels.get(&game_id) else {
            return 0;
        };
        match tx.send(event) {
            Ok(delivered) => delivered,
            Err(_) => {
                debug!(game_id = %game_id, "No subscribers left, dropping channel");
                channels.remove(&game_id);
                0
            }
        }
    }

    /// Number of live subscribers for a game
    pub fn subscriber_count(&self, game_id: Uuid) -> usize {
        let channels = self.channels.lock().unwrap_or_else(|e| e.into_inner());
        channels.get(&game_id).map_or(0, |tx| tx.receiver_count())
    }
}

/// Runs while the departing receiver is still attached
fn release(channels: &Channels, game_id: Uuid) {
    let mut channels = channels.lock().unwrap_or_else(|e| e.into_inner());
    if channels
        .get(&game_id)
        .is_some_and(|tx| tx.receiver_count() <= 1)
    {
        debug!(game_id = %game_id, "Last subscriber left, dropping channel");
        channels.remove(&game_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::Table;

    fn changed(game_id: Uuid) -> StoreEvent {
        StoreEvent::Changed {
            game_id,
            table: Table::Stories,
        }
    }

    #[tokio::test]
    async fn test_events_scoped_to_game() {
        let hub = NotificationHub::new();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let mut sub_a = hub.subscribe(a);
        let mut sub_b = hub.subscribe(b);

        assert_eq!(hub.publish(changed(a)), 1);
        assert_eq!(sub_a.recv().await, Some(changed(a)));
        assert!(sub_b.try_recv().is_none());
    }

    #[test]
    fn test_publish_without_subscribers() {
        let hub = NotificationHub::new();
        assert_eq!(hub.publish(changed(Uuid::new_v4())), 0);
    }

    #[test]
    fn test_dropped_subscribers_are_pruned() {
        let hub = NotificationHub::new();
        let game_id = Uuid::new_v4();
        let sub = hub.subscribe(game_id);
        assert_eq!(hub.subscriber_count(game_id), 1);

        drop(sub);
        assert_eq!(hub.subscriber_count(game_id), 0);
        assert_eq!(hub.publish(changed(game_id)), 0);
    }

    #[test]
    fn test_channel_released_with_last_subscriber() {
        let hub = NotificationHub::new();
        let game_id = Uuid::new_v4();
        let first = hub.subscribe(game_id);
        let second = hub.subscribe(game_id);

        drop(first);
        assert!(hub.channels.lock().unwrap().contains_key(&game_id));
        assert_eq!(hub.subscriber_count(game_id), 1);

        drop(second);
        assert!(!hub.channels.lock().unwrap().contains_key(&game_id));
    }

    #[tokio::test]
    async fn test_resubscribe_after_release() {
        let hub = NotificationHub::new();
        let game_id = Uuid::new_v4();
        drop(hub.subscribe(game_id));

        let mut sub = hub.subscribe(game_id);
        assert_eq!(hub.publish(changed(game_id)), 1);
        assert_eq!(sub.recv().await, Some(changed(game_id)));
    }
}
