//! Subscriber handles
//!
//! A `Subscriber` is one connection's outbound delivery path: the channel it
//! joined and the sending side of a bounded queue drained by that
//! connection's writer task. The sender lives behind a mutex so that closing
//! the handle and offering a message are mutually exclusive. Once `close`
//! has run, no later `offer` can reach the queue.

use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::Notify;
use tokio::sync::mpsc::{self, Receiver, Sender, error::TrySendError};
use uuid::Uuid;

use super::message::Message;

pub type SubscriberId = String;

pub type SubscriberHandle = Arc<Subscriber>;

/// Outcome of a non-blocking enqueue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Offer {
    Queued,
    Full,
    Closed,
}

#[derive(Debug)]
pub struct Subscriber {
    id: SubscriberId,
    channel: String,
    sender: Mutex<Option<Sender<Arc<Message>>>>,
    closed: Notify,
}

/// Receiving side of a subscriber's queue, owned by the writer task.
#[derive(Debug)]
pub struct Outbox {
    receiver: Receiver<Arc<Message>>,
}

impl Subscriber {
    /// Creates a handle for `channel` with a fresh queue holding at most
    /// `capacity` undelivered messages.
    pub fn new(channel: &str, capacity: usize) -> (SubscriberHandle, Outbox) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        let subscriber = Subscriber {
            id: Uuid::new_v4().to_string(),
            channel: channel.to_string(),
            sender: Mutex::new(Some(sender)),
            closed: Notify::new(),
        };
        (Arc::new(subscriber), Outbox { receiver })
    }

    pub fn id(&self) -> &SubscriberId {
        &self.id
    }

    pub fn channel(&self) -> &str {
        &self.channel
    }

    pub fn is_alive(&self) -> bool {
        self.sender
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// Enqueues without waiting. Never blocks the caller on a slow consumer.
    pub fn offer(&self, message: Arc<Message>) -> Offer {
        let guard = self.sender.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(sender) = guard.as_ref() else {
            return Offer::Closed;
        };
        match sender.try_send(message) {
            Ok(()) => Offer::Queued,
            Err(TrySendError::Full(_)) => Offer::Full,
            Err(TrySendError::Closed(_)) => Offer::Closed,
        }
    }

    /// Drops the sender so the outbox reports end-of-stream once drained.
    /// Returns `true` only for the call that actually closed the handle.
    pub fn close(&self) -> bool {
        let sender = self
            .sender
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if sender.is_some() {
            self.closed.notify_one();
            true
        } else {
            false
        }
    }

    /// Resolves once the handle has been closed.
    pub async fn closed(&self) {
        if !self.is_alive() {
            return;
        }
        self.closed.notified().await;
    }
}

impl Outbox {
    /// Next queued message, or `None` once the handle is closed and drained.
    pub async fn recv(&mut self) -> Option<Arc<Message>> {
        self.receiver.recv().await
    }

    pub fn try_recv(&mut self) -> Option<Arc<Message>> {
        self.receiver.try_recv().ok()
    }

    /// Number of messages waiting to be written.
    pub fn len(&self) -> usize {
        self.receiver.len()
    }

    pub fn is_empty(&self) -> bool {
        self.receiver.is_empty()
    }
}
