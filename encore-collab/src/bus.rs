use std::{
    collections::VecDeque,
    pin::Pin,
    sync::{Arc, Weak},
    task::{Context, Poll, Waker},
};

use dashmap::DashMap;
use futures_util::Stream;
use parking_lot::Mutex;

use crate::{Config, QueueEvent};

type SubscriberId = crate::util::Id<Subscriber>;

/// Per-room fan-out of [QueueEvent] signals.
///
/// Delivery is best-effort and at-most-once: nothing is persisted, a
/// subscriber that connects after an event simply missed it, and a publish
/// never fails the mutation that triggered it. Correctness lives in the
/// subscribers' full refetch, not here.
pub struct NotificationBus {
    me: Weak<Self>,
    channels: DashMap<String, Vec<Subscriber>>,
    subscriber_buffer: usize,
}

struct Subscriber {
    id: SubscriberId,
    shared: Arc<Mutex<Shared>>,
}

/// One lock covers both the queue and the waker, so a publish between "queue
/// is empty" and "waker is parked" cannot be lost.
struct Shared {
    pending: VecDeque<QueueEvent>,
    waker: Option<Waker>,
}

/// A subscriber's end of a room channel.
///
/// Yields events until [QueueEvent::RoomClosed], which is terminal: the
/// stream ends after delivering it. Dropping the subscription deregisters it.
pub struct Subscription {
    id: SubscriberId,
    code: String,
    shared: Arc<Mutex<Shared>>,
    bus: Weak<NotificationBus>,
    done: bool,
}

impl NotificationBus {
    pub fn new(config: &Config) -> Arc<Self> {
        Arc::new_cyclic(|me| Self {
            me: me.clone(),
            channels: Default::default(),
            subscriber_buffer: config.subscriber_buffer,
        })
    }

    pub fn subscribe(&self, code: &str) -> Subscription {
        let subscriber = Subscriber {
            id: SubscriberId::new(),
            shared: Arc::new(Mutex::new(Shared {
                pending: VecDeque::new(),
                waker: None,
            })),
        };

        let subscription = Subscription {
            id: subscriber.id,
            code: code.to_string(),
            shared: subscriber.shared.clone(),
            bus: self.me.clone(),
            done: false,
        };

        self.channels
            .entry(code.to_string())
            .or_default()
            .push(subscriber);

        subscription
    }

    /// Delivers an event to the room's current subscribers. A room without
    /// subscribers, or one already torn down, swallows the event.
    pub fn publish(&self, code: &str, event: QueueEvent) {
        if let Some(subscribers) = self.channels.get(code) {
            for subscriber in subscribers.iter() {
                subscriber.push(event, self.subscriber_buffer);
            }
        }
    }

    /// Tears down a room's channel, handing [QueueEvent::RoomClosed] to its
    /// existing subscribers. The entry is removed first, so a new room that
    /// reuses the code gets a fresh channel and its subscribers can never
    /// see the previous occupant's closure notice.
    pub fn close(&self, code: &str) {
        if let Some((_, subscribers)) = self.channels.remove(code) {
            for subscriber in subscribers {
                subscriber.push(QueueEvent::RoomClosed, self.subscriber_buffer);
            }
        }
    }

    /// The number of live subscriptions on a room's channel
    pub fn subscriber_count(&self, code: &str) -> usize {
        self.channels.get(code).map(|s| s.len()).unwrap_or_default()
    }

    fn unsubscribe(&self, code: &str, id: SubscriberId) {
        if let Some(mut subscribers) = self.channels.get_mut(code) {
            subscribers.retain(|s| s.id != id);
        }
    }
}

impl Subscriber {
    fn push(&self, event: QueueEvent, buffer: usize) {
        let mut shared = self.shared.lock();

        // Dropping the oldest signal is harmless, every event triggers the
        // same full refetch
        if shared.pending.len() >= buffer {
            shared.pending.pop_front();
        }

        shared.pending.push_back(event);

        if let Some(waker) = shared.waker.take() {
            waker.wake()
        }
    }
}

impl Stream for Subscription {
    type Item = QueueEvent;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();

        if this.done {
            return Poll::Ready(None);
        }

        let mut shared = this.shared.lock();

        if let Some(event) = shared.pending.pop_front() {
            if event.is_terminal() {
                this.done = true;
            }

            return Poll::Ready(Some(event));
        }

        shared.waker = Some(cx.waker().clone());
        Poll::Pending
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(bus) = self.bus.upgrade() {
            bus.unsubscribe(&self.code, self.id)
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use futures_util::StreamExt;

    fn bus() -> Arc<NotificationBus> {
        NotificationBus::new(&Config::default())
    }

    #[tokio::test]
    async fn events_arrive_in_order() {
        let bus = bus();
        let mut subscription = bus.subscribe("4821");

        bus.publish("4821", QueueEvent::SongRequested);
        bus.publish("4821", QueueEvent::SongVoted);

        assert_eq!(subscription.next().await, Some(QueueEvent::SongRequested));
        assert_eq!(subscription.next().await, Some(QueueEvent::SongVoted));
    }

    #[tokio::test]
    async fn late_subscribers_miss_earlier_events() {
        let bus = bus();

        bus.publish("4821", QueueEvent::SongRequested);

        let mut subscription = bus.subscribe("4821");
        bus.publish("4821", QueueEvent::SongVoted);

        assert_eq!(subscription.next().await, Some(QueueEvent::SongVoted));
    }

    #[tokio::test]
    async fn room_closed_ends_the_stream() {
        let bus = bus();
        let mut subscription = bus.subscribe("4821");

        bus.close("4821");

        assert_eq!(subscription.next().await, Some(QueueEvent::RoomClosed));
        assert_eq!(subscription.next().await, None);
    }

    #[tokio::test]
    async fn publishing_to_a_closed_channel_is_swallowed() {
        let bus = bus();
        let mut subscription = bus.subscribe("4821");

        bus.close("4821");
        bus.publish("4821", QueueEvent::SongVoted);

        assert_eq!(subscription.next().await, Some(QueueEvent::RoomClosed));
        assert_eq!(subscription.next().await, None);
    }

    #[tokio::test]
    async fn full_buffers_drop_the_oldest_event() {
        let config = Config {
            subscriber_buffer: 2,
            ..Default::default()
        };

        let bus = NotificationBus::new(&config);
        let mut subscription = bus.subscribe("4821");

        bus.publish("4821", QueueEvent::SongRequested);
        bus.publish("4821", QueueEvent::SongVoted);
        bus.publish("4821", QueueEvent::SongStatusChanged);

        assert_eq!(subscription.next().await, Some(QueueEvent::SongVoted));
        assert_eq!(
            subscription.next().await,
            Some(QueueEvent::SongStatusChanged)
        );
    }

    #[tokio::test]
    async fn dropping_a_subscription_deregisters_it() {
        let bus = bus();
        let subscription = bus.subscribe("4821");

        assert_eq!(bus.subscriber_count("4821"), 1);
        drop(subscription);
        assert_eq!(bus.subscriber_count("4821"), 0);
    }
}
