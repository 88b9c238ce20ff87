//! In-process fan-out of player events.

use std::sync::{Arc, Mutex};

use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender, unbounded_channel};

use crate::events::PlayerEvent;

/// Fan-out of player events to the (usually single) subscriber.
///
/// Emission never fails the emitting command: dead subscribers are dropped
/// on the next emit, delivery into a live channel preserves per-emitter
/// order.
#[derive(Clone, Default)]
pub struct EventBus {
    subscribers: Arc<Mutex<Vec<UnboundedSender<PlayerEvent>>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self) -> UnboundedReceiver<PlayerEvent> {
        let (tx, rx) = unbounded_channel();
        self.subscribers.lock().unwrap().push(tx);
        rx
    }

    pub fn emit(&self, event: PlayerEvent) {
        let mut subscribers = self.subscribers.lock().unwrap();
        subscribers.retain(|tx| tx.send(event.clone()).is_ok());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::AriEvent;

    fn stop_event(guild_id: u64) -> PlayerEvent {
        PlayerEvent {
            guild_id,
            event: AriEvent::Stop,
        }
    }

    #[tokio::test]
    async fn events_arrive_in_emission_order() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe();

        for guild_id in 1..=3 {
            bus.emit(stop_event(guild_id));
        }

        for guild_id in 1..=3 {
            assert_eq!(rx.recv().await.unwrap().guild_id, guild_id);
        }
    }

    #[tokio::test]
    async fn dropped_subscribers_do_not_fail_emission() {
        let bus = EventBus::new();
        let rx = bus.subscribe();
        drop(rx);

        bus.emit(stop_event(1));

        let mut rx = bus.subscribe();
        bus.emit(stop_event(2));
        assert_eq!(rx.recv().await.unwrap().guild_id, 2);
    }
}
