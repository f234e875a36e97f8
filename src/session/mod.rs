//! The `session` module bridges one subscriber connection to the broker.
//!
//! A `Session` registers a fresh subscription, relays every delivered
//! message to its `EventSink` (flushing after each one) and ends when the
//! peer disconnects or the broker closes the queue. The subscription
//! unregisters itself when the session is dropped, whatever the reason.

pub mod sink;
pub mod stream;

pub use sink::{ChannelSink, EventSink};
pub use stream::{Session, SessionEnd};
