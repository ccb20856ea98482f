use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use dashmap::DashMap;
use kanal::{AsyncReceiver, AsyncSender};
use tracing::{error, info, warn};

use crate::events::{Event, EventFilter, EventType};

const SUBSCRIBER_BUFFER: usize = 16384;

#[async_trait]
pub trait Publisher: Send + Sync {
    async fn publish(&self, event: Event);
}

#[async_trait]
pub trait Subscriber: Send + Sync {
    async fn recv(&self) -> Option<Event>;
}

#[async_trait]
pub trait PubSubTrait: Send + Sync {
    fn subscribe(&self, filter: EventFilter) -> Arc<dyn Subscriber>;
    async fn publish(&self, event: Event);
}

#[derive(Debug, Clone)]
pub struct PubSubSubscriber {
    rx: AsyncReceiver<Event>,
}

#[async_trait]
impl Subscriber for PubSubSubscriber {
    async fn recv(&self) -> Option<Event> {
        match self.rx.recv().await {
            Ok(event) => Some(event),
            Err(e) => {
                error!(target: "pubsub", "failed to receive event: {}", e);
                None
            }
        }
    }
}

/// In-process fan-out between services. Market callbacks must never block,
/// so delivery is `try_send` with a drop counter; a subscriber that falls
/// a full buffer behind loses events rather than stalling ingestion.
pub struct ChannelPubSub {
    next_id: AtomicU64,
    subscribers: DashMap<u64, AsyncSender<Event>>,
    event_subscriptions: DashMap<EventType, Vec<u64>>,
    dropped: AtomicU64,
}

impl ChannelPubSub {
    pub fn new() -> Arc<Self> {
        Self {
            next_id: AtomicU64::new(0),
            subscribers: DashMap::new(),
            event_subscriptions: DashMap::new(),
            dropped: AtomicU64::new(0),
        }
        .into()
    }

    fn get_next_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    pub fn subscribe(&self, filter: EventFilter) -> Arc<PubSubSubscriber> {
        info!(target: "pubsub", "new subscriber");
        let (tx, rx) = kanal::bounded_async(SUBSCRIBER_BUFFER);

        let id = self.get_next_id();
        self.subscribers.insert(id, tx);

        for event_type in filter.event_types() {
            self.event_subscriptions.entry(event_type).or_default().push(id);
        }

        PubSubSubscriber { rx }.into()
    }

    pub async fn publish(&self, event: Event) {
        let event_type = event.event_type();

        let subscriber_ids: Vec<u64> = self
            .event_subscriptions
            .get(&event_type)
            .map(|v| v.value().clone())
            .unwrap_or_default();

        let mut to_remove = Vec::new();
        for id in subscriber_ids {
            if let Some(sender) = self.subscribers.get(&id) {
                match sender.try_send(event.clone()) {
                    Ok(true) => {}
                    Ok(false) => {
                        // Subscriber buffer full, drop for that subscriber.
                        self.dropped.fetch_add(1, Ordering::Relaxed);
                        warn!(target: "pubsub", "subscriber {} buffer full, dropping {}", id, event_type);
                    }
                    Err(_) => {
                        info!(target: "pubsub", "subscriber {} closed, will be removed", id);
                        to_remove.push(id);
                    }
                }
            } else {
                to_remove.push(id);
            }
        }

        if !to_remove.is_empty() {
            for id in to_remove {
                self.subscribers.remove(&id);
                for mut entry in self.event_subscriptions.iter_mut() {
                    let ids = entry.value_mut();
                    if let Some(pos) = ids.iter().position(|&x| x == id) {
                        ids.swap_remove(pos);
                    }
                }
            }
        }
    }

    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl PubSubTrait for ChannelPubSub {
    fn subscribe(&self, filter: EventFilter) -> Arc<dyn Subscriber> {
        self.subscribe(filter)
    }

    async fn publish(&self, event: Event) {
        self.publish(event).await
    }
}
