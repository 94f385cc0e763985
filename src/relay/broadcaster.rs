//! Broadcaster
//!
//! The pub/sub core. Responsible for:
//! - creating subscriber handles and registering them (`join`)
//! - deregistering and closing them (`leave`)
//! - fanning a published message out to every current subscriber
//!
//! Fan-out is a loop of non-blocking enqueues over the channel's members. A
//! subscriber whose queue is full is disconnected on the spot instead of
//! slowing the publisher down; one stalled client never delays the others.
//!
//! The broadcaster is constructed once and shared as `Arc<Broadcaster>` with
//! every connection handler. It holds no I/O resources of its own.

use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info, warn};

use super::message::{Message, Payload};
use super::registry::ChannelRegistry;
use super::subscriber::{Offer, Outbox, Subscriber, SubscriberHandle};
use crate::config::RelaySettings;
use crate::utils::RelayError;

#[derive(Debug)]
pub struct Broadcaster {
    registry: ChannelRegistry,
    sink_capacity: usize,
}

impl Default for Broadcaster {
    fn default() -> Self {
        Self::from_settings(&RelaySettings::default())
    }
}

impl Broadcaster {
    pub fn new(sink_capacity: usize) -> Self {
        Self {
            registry: ChannelRegistry::new(),
            sink_capacity,
        }
    }

    pub fn from_settings(settings: &RelaySettings) -> Self {
        Self::new(settings.sink_capacity)
    }

    pub fn registry(&self) -> &ChannelRegistry {
        &self.registry
    }

    /// Creates a handle with a fresh outbound queue and registers it on
    /// `channel`. The returned `Outbox` is the queue's receiving side.
    pub fn join(&self, channel: &str) -> (SubscriberHandle, Outbox) {
        let (handle, outbox) = Subscriber::new(channel, self.sink_capacity);
        self.registry.subscribe(channel, handle.clone());
        debug!(channel, subscriber = %handle.id(), "joined");
        (handle, outbox)
    }

    /// Deregisters `handle` and closes its queue. Safe to call any number of
    /// times; only the first call has an effect.
    pub fn leave(&self, handle: &SubscriberHandle) {
        self.registry.unsubscribe(handle.channel(), handle);
        if handle.close() {
            debug!(channel = handle.channel(), subscriber = %handle.id(), "left");
        }
    }

    /// Delivers `payload` to every subscriber registered on `channel` at the
    /// time of the call and returns how many queues accepted it. Publishing
    /// to a channel nobody listens on is a no-op.
    ///
    /// Enqueueing happens under the registry lock, so two concurrent publishes
    /// to one channel reach all of its subscribers in the same order.
    /// Evictions run after the lock is released.
    pub fn publish(&self, channel: &str, payload: Payload) -> usize {
        let message = Arc::new(Message::new(channel, payload));
        let mut delivered = 0;
        let mut evicted = Vec::new();

        let visited = self.registry.for_each_subscriber(channel, |subscriber| {
            match subscriber.offer(Arc::clone(&message)) {
                Offer::Queued => delivered += 1,
                rejected => evicted.push((subscriber.clone(), rejected)),
            }
        });
        if visited == 0 {
            debug!(channel, "no subscribers, message discarded");
            return 0;
        }

        for (subscriber, rejected) in &evicted {
            if *rejected == Offer::Full {
                warn!(
                    channel,
                    subscriber = %subscriber.id(),
                    capacity = self.sink_capacity,
                    "outbound queue full, disconnecting slow subscriber"
                );
            }
            // a closed queue means the writer is already gone
            self.leave(subscriber);
        }

        delivered
    }

    /// Publishes `event` as a JSON text frame. Lets server-side producers
    /// inject traffic without holding a connection.
    pub fn publish_event<T: Serialize>(
        &self,
        channel: &str,
        event: &T,
    ) -> Result<usize, RelayError> {
        let text = serde_json::to_string(event)?;
        let delivered = self.publish(channel, Payload::Text(text));
        info!(channel, delivered, "server event published");
        Ok(delivered)
    }

    pub fn subscriber_count(&self, channel: &str) -> usize {
        self.registry.subscriber_count(channel)
    }

    pub fn channel_count(&self) -> usize {
        self.registry.channel_count()
    }
}
