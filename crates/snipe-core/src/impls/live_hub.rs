//! LiveUpdateHub - in-process per-task multicast over tokio broadcast channels.
//!
//! # Implementation
//! - One `broadcast::Sender` per task id, created on the first attach
//! - A channel whose receivers are all gone is dropped on the next publish
//!   or attach for any task
//! - Each [`Subscription`] starts with a `connected` greeting and stops
//!   yielding broadcast messages after the first terminal one
//!
//! A subscriber that falls more than `capacity` messages behind loses the
//! oldest ones and sees a single [`SubscriptionEvent::Lagged`] instead; other
//! subscribers are unaffected.

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tokio::sync::broadcast::{self, error::RecvError};

use crate::domain::{LiveUpdate, TaskId};
use crate::ports::LiveUpdateSink;

pub const DEFAULT_CHANNEL_CAPACITY: usize = 256;

type Channels = HashMap<TaskId, broadcast::Sender<LiveUpdate>>;

pub struct LiveUpdateHub {
    channels: Mutex<Channels>,
    capacity: usize,
}

impl LiveUpdateHub {
    pub fn new(capacity: usize) -> Self {
        Self {
            channels: Mutex::new(HashMap::new()),
            capacity: capacity.max(1),
        }
    }

    /// Subscribe to `task_id`. The first event is always `connected`.
    pub fn attach(&self, task_id: TaskId) -> Subscription {
        let rx = {
            let mut channels = self.lock();
            prune(&mut channels);
            channels
                .entry(task_id)
                .or_insert_with(|| broadcast::channel(self.capacity).0)
                .subscribe()
        };
        tracing::debug!(%task_id, subscribers = self.subscriber_count(task_id), "subscriber attached");

        Subscription {
            task_id,
            rx,
            pending: VecDeque::from([LiveUpdate::Connected {
                task_id,
                message: format!("subscribed to task {task_id}"),
            }]),
            finished: false,
        }
    }

    pub fn subscriber_count(&self, task_id: TaskId) -> usize {
        self.lock()
            .get(&task_id)
            .map_or(0, broadcast::Sender::receiver_count)
    }

    pub fn total_subscribers(&self) -> usize {
        self.lock().values().map(broadcast::Sender::receiver_count).sum()
    }

    /// Number of task ids with a live channel.
    pub fn channel_count(&self) -> usize {
        let mut channels = self.lock();
        prune(&mut channels);
        channels.len()
    }

    fn lock(&self) -> MutexGuard<'_, Channels> {
        self.channels.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for LiveUpdateHub {
    fn default() -> Self {
        Self::new(DEFAULT_CHANNEL_CAPACITY)
    }
}

fn prune(channels: &mut Channels) {
    channels.retain(|task_id, tx| {
        let live = tx.receiver_count() > 0;
        if !live {
            tracing::debug!(%task_id, "channel pruned");
        }
        live
    });
}

#[async_trait]
impl LiveUpdateSink for LiveUpdateHub {
    async fn publish(&self, task_id: TaskId, message: LiveUpdate) {
        let mut channels = self.lock();
        let Some(tx) = channels.get(&task_id) else {
            tracing::trace!(%task_id, kind = message.kind(), "no subscribers");
            return;
        };
        if tx.send(message).is_err() {
            // every receiver is gone
            channels.remove(&task_id);
            tracing::debug!(%task_id, "channel pruned");
        }
    }

    fn subscriber_count(&self, task_id: TaskId) -> usize {
        LiveUpdateHub::subscriber_count(self, task_id)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SubscriptionEvent {
    Message(LiveUpdate),
    /// This many messages were dropped because the subscriber fell behind.
    Lagged(u64),
}

/// One subscriber's view of a task's stream. Dropping it detaches.
pub struct Subscription {
    task_id: TaskId,
    rx: broadcast::Receiver<LiveUpdate>,
    pending: VecDeque<LiveUpdate>,
    finished: bool,
}

impl Subscription {
    pub fn task_id(&self) -> TaskId {
        self.task_id
    }

    /// Liveness check; the reply is delivered as the next event.
    pub fn ping(&mut self) {
        self.pending.push_back(LiveUpdate::Pong {
            task_id: self.task_id,
        });
    }

    /// Next event, or `None` once the stream has delivered a terminal message.
    pub async fn recv(&mut self) -> Option<SubscriptionEvent> {
        if let Some(message) = self.pending.pop_front() {
            return Some(SubscriptionEvent::Message(message));
        }
        if self.finished {
            return None;
        }

        match self.rx.recv().await {
            Ok(message) => {
                self.finished = message.is_terminal();
                Some(SubscriptionEvent::Message(message))
            }
            Err(RecvError::Lagged(missed)) => {
                tracing::warn!(task_id = %self.task_id, missed, "subscriber lagged");
                Some(SubscriptionEvent::Lagged(missed))
            }
            Err(RecvError::Closed) => {
                self.finished = true;
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn task_id() -> TaskId {
        TaskId::from_ulid(ulid::Ulid::new())
    }

    fn executing(task_id: TaskId) -> LiveUpdate {
        LiveUpdate::Executing {
            task_id,
            message: "executing".into(),
        }
    }

    async fn next_message(sub: &mut Subscription) -> LiveUpdate {
        match sub.recv().await {
            Some(SubscriptionEvent::Message(message)) => message,
            other => panic!("expected message, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn greets_then_relays_in_order() {
        let hub = LiveUpdateHub::default();
        let id = task_id();
        let mut sub = hub.attach(id);

        hub.publish(id, executing(id)).await;
        hub.publish(id, LiveUpdate::countdown(id, std::time::Duration::from_secs(1)))
            .await;

        assert_eq!(next_message(&mut sub).await.kind(), "connected");
        assert_eq!(next_message(&mut sub).await.kind(), "executing");
        assert_eq!(next_message(&mut sub).await.kind(), "countdown");
    }

    #[tokio::test]
    async fn every_subscriber_of_a_task_receives_each_message() {
        let hub = LiveUpdateHub::default();
        let id = task_id();
        let other = task_id();
        let mut a = hub.attach(id);
        let mut b = hub.attach(id);
        let mut c = hub.attach(other);
        assert_eq!(hub.subscriber_count(id), 2);
        assert_eq!(hub.total_subscribers(), 3);

        hub.publish(id, executing(id)).await;
        hub.publish(other, executing(other)).await;

        for sub in [&mut a, &mut b] {
            next_message(sub).await;
            assert_eq!(next_message(sub).await, executing(id));
        }
        next_message(&mut c).await;
        assert_eq!(next_message(&mut c).await.task_id(), other);
    }

    #[tokio::test]
    async fn publish_without_subscribers_is_a_noop() {
        let hub = LiveUpdateHub::default();
        let id = task_id();
        hub.publish(id, executing(id)).await;
        assert_eq!(hub.subscriber_count(id), 0);
        assert_eq!(hub.channel_count(), 0);
    }

    #[tokio::test]
    async fn dropped_subscribers_are_pruned() {
        let hub = LiveUpdateHub::default();
        let id = task_id();
        let sub = hub.attach(id);
        assert_eq!(hub.channel_count(), 1);

        drop(sub);
        assert_eq!(hub.subscriber_count(id), 0);
        hub.publish(id, executing(id)).await;
        assert_eq!(hub.channel_count(), 0);
    }

    #[tokio::test]
    async fn stream_ends_after_terminal_message() {
        let hub = LiveUpdateHub::default();
        let id = task_id();
        let mut sub = hub.attach(id);

        hub.publish(
            id,
            LiveUpdate::Cancelled {
                task_id: id,
                message: "task cancelled".into(),
            },
        )
        .await;
        hub.publish(id, executing(id)).await;

        next_message(&mut sub).await;
        assert_eq!(next_message(&mut sub).await.kind(), "cancelled");
        assert!(sub.recv().await.is_none());
    }

    #[tokio::test]
    async fn ping_is_answered_with_pong() {
        let hub = LiveUpdateHub::default();
        let id = task_id();
        let mut sub = hub.attach(id);
        next_message(&mut sub).await;

        sub.ping();
        assert_eq!(next_message(&mut sub).await, LiveUpdate::Pong { task_id: id });
    }

    #[tokio::test]
    async fn slow_subscriber_lags_without_blocking_others() {
        let hub = LiveUpdateHub::new(2);
        let id = task_id();
        let mut slow = hub.attach(id);
        let mut fast = hub.attach(id);
        next_message(&mut slow).await;
        next_message(&mut fast).await;

        for n in 0..4 {
            hub.publish(id, LiveUpdate::countdown(id, std::time::Duration::from_secs(n)))
                .await;
            assert_eq!(next_message(&mut fast).await.kind(), "countdown");
        }

        assert_eq!(slow.recv().await, Some(SubscriptionEvent::Lagged(2)));
        assert_eq!(next_message(&mut slow).await.kind(), "countdown");
    }
}
