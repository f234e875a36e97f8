//! Transport sinks
//!
//! `EventSink` is the capability interface a transport must provide for a
//! streaming session: incremental flushing, ordered unit writes and a
//! disconnect notification.

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::mpsc;

use crate::utils::HubError;

#[async_trait]
pub trait EventSink: Send {
    /// Whether each written unit can be pushed to the peer immediately.
    /// Sessions refuse to start on sinks that cannot.
    fn supports_flush(&self) -> bool;

    /// Write one encoded unit. Fails with `TransportClosed` once the peer is gone.
    async fn write_unit(&mut self, unit: Bytes) -> Result<(), HubError>;

    async fn flush(&mut self) -> Result<(), HubError>;

    /// Resolves when the peer has disconnected. Must be cancel safe.
    async fn disconnected(&mut self);
}

/// Sink backed by a bounded channel whose receiver feeds a streaming body.
///
/// Every unit handed to the channel becomes one body frame, which the HTTP
/// server writes out as soon as it is polled, so `flush` has nothing left to
/// do. The peer is considered gone once the receiver is dropped.
#[derive(Debug)]
pub struct ChannelSink {
    sender: mpsc::Sender<Bytes>,
}

impl ChannelSink {
    pub fn new(buffer: usize) -> (Self, mpsc::Receiver<Bytes>) {
        let (sender, receiver) = mpsc::channel(buffer.max(1));
        (Self { sender }, receiver)
    }
}

#[async_trait]
impl EventSink for ChannelSink {
    fn supports_flush(&self) -> bool {
        true
    }

    async fn write_unit(&mut self, unit: Bytes) -> Result<(), HubError> {
        self.sender
            .send(unit)
            .await
            .map_err(|_| HubError::TransportClosed)
    }

    async fn flush(&mut self) -> Result<(), HubError> {
        if self.sender.is_closed() {
            return Err(HubError::TransportClosed);
        }
        Ok(())
    }

    async fn disconnected(&mut self) {
        self.sender.closed().await
    }
}
