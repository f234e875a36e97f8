//! The `error` module defines the single error type used throughout `ssehub`.
//!
//! Request-level failures (bad method, bad JSON, missing streaming support)
//! are handled at the transport boundary and turned into HTTP statuses.
//! None of them ever enters the broker's command loop.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum HubError {
    /// The broker command loop has stopped; no more registrations or publishes.
    #[error("broker is closed")]
    BrokerClosed,

    /// Registration refused because the subscriber set is at capacity.
    #[error("subscriber limit of {limit} reached")]
    SubscriberLimit { limit: usize },

    /// The transport cannot flush incrementally, so a stream cannot start.
    #[error("streaming not supported")]
    StreamingUnsupported,

    /// The peer went away while a unit was being written.
    #[error("transport closed")]
    TransportClosed,

    #[error("{0}")]
    InvalidRequest(String),

    #[error("failed to encode message: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
