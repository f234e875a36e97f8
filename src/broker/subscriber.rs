//! Subscriber queues
//!
//! Every subscriber owns one private, bounded delivery queue. The queue is
//! split in two halves:
//! - `SubscriberQueue` is held by the broker inside its subscriber set and
//!   is the only producer for the queue.
//! - `Subscription` is held by the streaming session and is the only
//!   consumer. Dropping it unregisters the subscriber.
//!
//! The queue is a single-receiver `tokio::sync::broadcast` channel, so a full
//! queue never blocks the publisher: the oldest entry is overwritten and the
//! consumer learns how many messages it skipped. Once the broker drops its
//! half, the consumer still drains what was queued before seeing `Closed`.
//!
//! The channel rounds its capacity up to a power of two. The configured
//! capacity is still the bound that counts: `is_full` checks against it, and
//! `Subscription::recv` skips anything older than the newest `capacity`
//! entries before handing out the next message.

use std::sync::Arc;

use tokio::sync::broadcast;
use tokio::sync::broadcast::error::{RecvError, TryRecvError};
use uuid::Uuid;

use crate::broker::engine::BrokerHandle;
use crate::broker::message::Message;
use crate::config::MAX_QUEUE_CAPACITY;

pub type SubscriberId = String;

/// Broker-side half of a subscriber's delivery queue.
#[derive(Debug)]
pub struct SubscriberQueue {
    id: SubscriberId,
    sender: broadcast::Sender<Arc<Message>>,
    capacity: usize,
}

impl SubscriberQueue {
    /// Create a fresh queue with a new id. The receiver goes to the session.
    pub fn new(capacity: usize) -> (Self, broadcast::Receiver<Arc<Message>>) {
        let capacity = capacity.clamp(1, MAX_QUEUE_CAPACITY);
        let (sender, receiver) = broadcast::channel(capacity);
        let queue = Self {
            id: Uuid::new_v4().to_string(),
            sender,
            capacity,
        };
        (queue, receiver)
    }

    pub fn id(&self) -> &SubscriberId {
        &self.id
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of messages waiting to be drained by the session.
    pub fn backlog(&self) -> usize {
        self.sender.len()
    }

    pub fn is_full(&self) -> bool {
        self.backlog() >= self.capacity
    }

    /// Enqueue without waiting. Returns `false` when the consumer is gone.
    pub fn deliver(&self, message: Arc<Message>) -> bool {
        self.sender.send(message).is_ok()
    }
}

/// Outcome of waiting on a subscription.
#[derive(Debug, Clone, PartialEq)]
pub enum Delivery {
    Message(Arc<Message>),
    /// The queue overflowed and this many of the oldest messages were dropped.
    Skipped(u64),
    /// The broker closed the queue and everything queued has been drained.
    Closed,
}

/// Session-side half of a subscriber's delivery queue.
#[derive(Debug)]
pub struct Subscription {
    id: SubscriberId,
    receiver: broadcast::Receiver<Arc<Message>>,
    capacity: usize,
    broker: BrokerHandle,
}

impl Subscription {
    pub(crate) fn new(
        id: SubscriberId,
        receiver: broadcast::Receiver<Arc<Message>>,
        capacity: usize,
        broker: BrokerHandle,
    ) -> Self {
        Self {
            id,
            receiver,
            capacity: capacity.max(1),
            broker,
        }
    }

    pub fn id(&self) -> &SubscriberId {
        &self.id
    }

    /// Wait for the next message. Cancel safe.
    pub async fn recv(&mut self) -> Delivery {
        let mut skipped = self.trim_to_capacity();
        loop {
            if skipped > 0 {
                return Delivery::Skipped(skipped);
            }
            match self.receiver.recv().await {
                // At least `capacity` newer messages piled up behind this one.
                Ok(_) if self.receiver.len() >= self.capacity => {
                    skipped = 1 + self.trim_to_capacity();
                }
                Ok(message) => return Delivery::Message(message),
                Err(RecvError::Lagged(count)) => skipped = count + self.trim_to_capacity(),
                Err(RecvError::Closed) => return Delivery::Closed,
            }
        }
    }

    /// Drop queued messages beyond the newest `capacity` ones.
    fn trim_to_capacity(&mut self) -> u64 {
        let mut skipped = 0;
        while self.receiver.len() > self.capacity {
            match self.receiver.try_recv() {
                Ok(_) => skipped += 1,
                Err(TryRecvError::Lagged(count)) => skipped += count,
                Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => break,
            }
        }
        skipped
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.broker.unregister(&self.id);
    }
}
