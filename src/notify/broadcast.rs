use async_trait::async_trait;
use dashmap::DashMap;
use tokio::sync::broadcast;
use tracing::debug;

use super::{CoreEvent, Notifier, NotifyError, Topic};

const LOG_TARGET: &str = "wager_chess::notify::broadcast";
const DEFAULT_CAPACITY: usize = 64;

/// In-process pub/sub with one broadcast channel per topic.
///
/// Topics are created lazily on first subscribe and dropped once the last
/// subscriber goes away. Publishing to a topic with no subscribers is a no-op.
pub struct BroadcastNotifier {
    channels: DashMap<Topic, broadcast::Sender<CoreEvent>>,
    capacity: usize,
}

impl BroadcastNotifier {
    pub fn new(capacity: usize) -> Self {
        Self {
            channels: DashMap::new(),
            capacity: capacity.max(1),
        }
    }

    pub fn subscribe(&self, topic: Topic) -> broadcast::Receiver<CoreEvent> {
        self.channels
            .entry(topic)
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .subscribe()
    }

    pub fn topic_count(&self) -> usize {
        self.channels.len()
    }
}

impl Default for BroadcastNotifier {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

#[async_trait]
impl Notifier for BroadcastNotifier {
    async fn publish(&self, topic: Topic, event: CoreEvent) -> Result<(), NotifyError> {
        let Some(sender) = self.channels.get(&topic).map(|entry| entry.clone()) else {
            return Ok(());
        };
        if sender.send(event).is_err() {
            debug!(target = LOG_TARGET, %topic, "no live subscribers; pruning topic");
            self.channels
                .remove_if(&topic, |_, tx| tx.receiver_count() == 0);
        }
        Ok(())
    }
}
