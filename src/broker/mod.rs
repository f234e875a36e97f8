//! The broker: subscriber set, serialized command loop and fan-out.
//!
//! Public types:
//! - `Broker`: owned state plus the command loop, started with `Broker::start`.
//! - `BrokerHandle`: cloneable handle for register / unregister / publish / shutdown.
//! - `Subscription`: a session's end of its private delivery queue.
//! - `Message`: the immutable value that gets published.

pub mod engine;
pub mod message;
pub mod subscriber;

pub use engine::{Broker, BrokerHandle};
pub use message::Message;
pub use subscriber::{Delivery, SubscriberId, SubscriberQueue, Subscription};

#[cfg(test)]
mod tests;
