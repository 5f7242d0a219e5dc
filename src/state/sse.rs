use dashmap::DashMap;
use tokio::sync::broadcast;

use crate::dto::sse::ServerEvent;

/// Lazily created broadcast hubs, one per topic.
pub struct SseTopics {
    hubs: DashMap<String, SseHub>,
    capacity: usize,
}

impl SseTopics {
    /// Build an empty registry whose hubs buffer `capacity` events each.
    pub fn new(capacity: usize) -> Self {
        Self {
            hubs: DashMap::new(),
            capacity: capacity.max(1),
        }
    }

    /// Register a new subscriber on `topic`, creating the hub on first use.
    pub fn subscribe(&self, topic: &str) -> broadcast::Receiver<ServerEvent> {
        self.hubs
            .entry(topic.to_owned())
            .or_insert_with(|| SseHub::new(self.capacity))
            .subscribe()
    }

    /// Publish `event` to every subscriber of `topic`; a topic nobody listens to is a no-op.
    pub fn publish(&self, topic: &str, event: ServerEvent) {
        if let Some(hub) = self.hubs.get(topic) {
            hub.broadcast(event);
        }
    }

    /// Drop the hub for `topic` once its last subscriber has gone.
    pub fn prune(&self, topic: &str) {
        self.hubs
            .remove_if(topic, |_, hub| hub.receiver_count() == 0);
    }
}

/// Simple broadcast hub wrapper used by the SSE services.
pub struct SseHub {
    sender: broadcast::Sender<ServerEvent>,
}

impl SseHub {
    /// Construct a new hub backed by a Tokio broadcast channel with the given capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _receiver) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Register a new subscriber that will receive subsequent events.
    pub fn subscribe(&self) -> broadcast::Receiver<ServerEvent> {
        self.sender.subscribe()
    }

    /// Send an event to all current subscribers, ignoring delivery errors.
    pub fn broadcast(&self, event: ServerEvent) {
        let _ = self.sender.send(event);
    }

    fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscribers_only_receive_their_topic() {
        let topics = SseTopics::new(4);
        let mut first = topics.subscribe("planningPoker:p1");
        let mut second = topics.subscribe("planningPoker:p2");

        topics.publish("planningPoker:p1", ServerEvent::new(Some("ping".into()), "1".into()));

        assert_eq!(first.recv().await.unwrap().data, "1");
        assert!(second.try_recv().is_err());
    }

    #[test]
    fn prune_keeps_hubs_with_subscribers() {
        let topics = SseTopics::new(4);
        let receiver = topics.subscribe("t");
        topics.prune("t");
        assert!(topics.hubs.contains_key("t"));

        drop(receiver);
        topics.prune("t");
        assert!(!topics.hubs.contains_key("t"));
    }
}
