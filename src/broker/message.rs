use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A message published to the hub.
///
/// Messages are immutable once created and are shared between subscriber
/// queues behind an `Arc`. The same shape is used for the publish request
/// body and for each unit written to an event stream.
///
/// # Fields
///
/// - `content` - The message text.
/// - `author` - Who wrote it.
/// - `time` - When it was written. Filled with the current time when the
///   publisher leaves it out.
///
/// # Example
///
/// ```rust
/// use ssehub::broker::message::Message;
///
/// let msg = Message::new("hello", "ana");
/// assert_eq!(msg.author, "ana");
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub content: String,
    pub author: String,
    #[serde(default = "Utc::now")]
    pub time: DateTime<Utc>,
}

impl Message {
    /// Create a message stamped with the current time.
    pub fn new(content: impl Into<String>, author: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            author: author.into(),
            time: Utc::now(),
        }
    }
}
