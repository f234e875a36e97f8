//! Broker engine
//!
//! The broker owns the subscriber set and performs fan-out. All state lives
//! in `Broker` and is touched only by its command loop:
//! - `BrokerHandle` is the cloneable front door used by HTTP handlers and
//!   sessions. Each call turns into one `Command` on a single unbounded
//!   channel, so register, unregister and publish share one total order.
//! - `Broker::run` pops commands one at a time and applies them to the
//!   owned state. A publish therefore always fans out over one consistent
//!   view of the subscriber set.
//!
//! Queues are bounded. What happens when a subscriber falls behind is set by
//! `OverflowPolicy`; in no case does a slow subscriber block the loop.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::broker::message::Message;
use crate::broker::subscriber::{SubscriberId, SubscriberQueue, Subscription};
use crate::config::{BrokerSettings, OverflowPolicy};
use crate::utils::HubError;

#[derive(Debug)]
enum Command {
    Register {
        queue: SubscriberQueue,
        ack: oneshot::Sender<Result<(), HubError>>,
    },
    Unregister(SubscriberId),
    Publish(Arc<Message>),
    Count(oneshot::Sender<usize>),
    Shutdown,
}

#[derive(Debug)]
pub struct Broker {
    name: String,
    pub(crate) subscribers: HashMap<SubscriberId, SubscriberQueue>,
    settings: BrokerSettings,
}

impl Default for Broker {
    fn default() -> Self {
        Self::new(BrokerSettings::default())
    }
}

impl Broker {
    pub fn new(settings: BrokerSettings) -> Self {
        Self {
            name: settings.name.clone(),
            subscribers: HashMap::new(),
            settings,
        }
    }

    /// Spawn the command loop and return a handle to it.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(settings: BrokerSettings) -> (BrokerHandle, JoinHandle<()>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let broker = Self::new(settings);
        let handle = BrokerHandle {
            name: Arc::from(broker.name.as_str()),
            queue_capacity: broker.settings.queue_capacity,
            commands: tx,
        };
        let task = tokio::spawn(broker.run(rx));
        (handle, task)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }

    /// Add a queue to the subscriber set.
    pub fn register(&mut self, queue: SubscriberQueue) -> Result<(), HubError> {
        let limit = self.settings.max_subscribers;
        if self.subscribers.len() >= limit {
            warn!(broker = %self.name, limit, "Subscriber limit reached");
            return Err(HubError::SubscriberLimit { limit });
        }
        debug!(broker = %self.name, subscriber = %queue.id(), "Subscriber added");
        self.subscribers.insert(queue.id().clone(), queue);
        Ok(())
    }

    /// Remove a queue from the subscriber set. Unknown ids are ignored.
    pub fn unregister(&mut self, id: &SubscriberId) {
        if self.subscribers.remove(id).is_some() {
            debug!(broker = %self.name, subscriber = %id, "Subscriber removed");
        }
    }

    /// Enqueue `message` on every registered queue.
    pub fn publish(&mut self, message: Arc<Message>) {
        debug!(
            broker = %self.name,
            author = %message.author,
            subscribers = self.subscribers.len(),
            "Pushing message"
        );

        let mut evicted = Vec::new();
        for (id, queue) in &self.subscribers {
            if self.settings.overflow == OverflowPolicy::Disconnect && queue.is_full() {
                evicted.push(id.clone());
                continue;
            }
            if !queue.deliver(message.clone()) {
                // Session already dropped its half; its unregister is on the way.
                debug!(subscriber = %id, "Subscriber gone before delivery");
            }
        }

        for id in evicted {
            warn!(broker = %self.name, subscriber = %id, "Evicting slow subscriber");
            self.subscribers.remove(&id);
        }
    }

    /// Close every subscriber queue. Sessions drain what is queued and end.
    pub fn shutdown(&mut self) {
        let closed = self.subscribers.len();
        self.subscribers.clear();
        info!(broker = %self.name, subscribers = closed, "Channel closed");
    }

    async fn run(mut self, mut commands: mpsc::UnboundedReceiver<Command>) {
        info!(broker = %self.name, "Start channel broker");
        while let Some(command) = commands.recv().await {
            match command {
                Command::Register { queue, ack } => {
                    let result = self.register(queue);
                    // A dropped ack means the caller gave up; its dropped
                    // Subscription has already queued the matching unregister.
                    let _ = ack.send(result);
                }
                Command::Unregister(id) => self.unregister(&id),
                Command::Publish(message) => self.publish(message),
                Command::Count(reply) => {
                    let _ = reply.send(self.subscriber_count());
                }
                Command::Shutdown => {
                    self.shutdown();
                    break;
                }
            }
        }
        // Dropping the subscriber set closes any queue still registered.
        info!(broker = %self.name, "Broker stopped");
    }
}

/// Cloneable handle used to talk to a running broker.
#[derive(Debug, Clone)]
pub struct BrokerHandle {
    name: Arc<str>,
    queue_capacity: usize,
    commands: mpsc::UnboundedSender<Command>,
}

impl BrokerHandle {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Create a fresh queue and add it to the subscriber set.
    ///
    /// Resolves once the broker has applied the registration, so every
    /// message published after this returns is delivered to the
    /// subscription.
    pub async fn register(&self) -> Result<Subscription, HubError> {
        let (queue, receiver) = SubscriberQueue::new(self.queue_capacity);
        let id = queue.id().clone();
        let capacity = queue.capacity();
        let (ack, ack_rx) = oneshot::channel();

        self.commands
            .send(Command::Register { queue, ack })
            .map_err(|_| HubError::BrokerClosed)?;

        // Build the subscription before awaiting so a cancelled caller still
        // unregisters the queue when this future is dropped.
        let subscription = Subscription::new(id, receiver, capacity, self.clone());
        match ack_rx.await {
            Ok(Ok(())) => Ok(subscription),
            Ok(Err(err)) => Err(err),
            Err(_) => Err(HubError::BrokerClosed),
        }
    }

    /// Remove a subscriber. Harmless for unknown ids or a stopped broker.
    pub fn unregister(&self, id: &SubscriberId) {
        let _ = self.commands.send(Command::Unregister(id.clone()));
    }

    /// Hand a message to the broker for fan-out. Never waits on subscribers.
    pub fn publish(&self, message: Message) -> Result<(), HubError> {
        self.commands
            .send(Command::Publish(Arc::new(message)))
            .map_err(|_| HubError::BrokerClosed)
    }

    /// Ask the broker to close all subscriber queues and stop.
    ///
    /// Commands sent before this are still applied first.
    pub fn shutdown(&self) {
        let _ = self.commands.send(Command::Shutdown);
    }

    /// Current size of the subscriber set, as seen by the command loop.
    pub async fn subscriber_count(&self) -> Result<usize, HubError> {
        let (reply, reply_rx) = oneshot::channel();
        self.commands
            .send(Command::Count(reply))
            .map_err(|_| HubError::BrokerClosed)?;
        reply_rx.await.map_err(|_| HubError::BrokerClosed)
    }

    /// Whether the command loop has stopped.
    pub fn is_closed(&self) -> bool {
        self.commands.is_closed()
    }
}
