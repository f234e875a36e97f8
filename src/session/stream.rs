use tracing::{debug, info, warn};

use crate::broker::message::Message;
use crate::broker::subscriber::{Delivery, SubscriberId, Subscription};
use crate::broker::BrokerHandle;
use crate::session::sink::EventSink;
use crate::transport::codec::encode_unit;
use crate::utils::HubError;

/// Why a session stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEnd {
    /// The peer went away.
    Disconnected,
    /// The broker closed the queue (shutdown or eviction) and it was drained.
    QueueClosed,
}

/// One subscriber connection, from registration to unregistration.
#[derive(Debug)]
pub struct Session<S> {
    subscription: Subscription,
    sink: S,
}

impl<S: EventSink> Session<S> {
    /// Register a new subscriber for `sink`.
    ///
    /// Refuses sinks that cannot flush before touching the broker, so a
    /// refused session leaves the subscriber set untouched.
    pub async fn open(broker: &BrokerHandle, sink: S) -> Result<Self, HubError> {
        if !sink.supports_flush() {
            return Err(HubError::StreamingUnsupported);
        }
        let subscription = broker.register().await?;
        info!(broker = %broker.name(), subscriber = %subscription.id(), "Client added");
        Ok(Self { subscription, sink })
    }

    pub fn id(&self) -> &SubscriberId {
        self.subscription.id()
    }

    /// Relay messages until the peer disconnects or the queue closes.
    ///
    /// Consumes the session; the subscription unregisters on the way out.
    pub async fn run(mut self) -> SessionEnd {
        let end = loop {
            tokio::select! {
                biased;

                _ = self.sink.disconnected() => break SessionEnd::Disconnected,

                delivery = self.subscription.recv() => match delivery {
                    Delivery::Message(message) => match self.relay(&message).await {
                        Ok(()) => {}
                        Err(HubError::TransportClosed) => break SessionEnd::Disconnected,
                        Err(err) => warn!(error = %err, "Skipping message"),
                    },
                    Delivery::Skipped(count) => {
                        warn!(subscriber = %self.id(), count, "Subscriber lagged, messages dropped");
                    }
                    Delivery::Closed => {
                        let _ = self.sink.flush().await;
                        break SessionEnd::QueueClosed;
                    }
                },
            }
        };

        info!(subscriber = %self.id(), ?end, "Client removed");
        end
    }

    async fn relay(&mut self, message: &Message) -> Result<(), HubError> {
        let unit = encode_unit(message)?;
        self.sink.write_unit(unit).await?;
        self.sink.flush().await?;
        debug!(subscriber = %self.id(), "Relayed message");
        Ok(())
    }
}
