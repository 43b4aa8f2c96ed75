//! Client-side traits every messaging endpoint implements.

use std::time::Duration;

use super::message::{DeliveryOptions, Destination, ReceivedMessage, TextMessage};
use crate::ClientError;

/// Entry point of an endpoint: produces live connections.
pub trait ConnectionFactory: Send + Sync {
    /// Human-readable endpoint name for diagnostics (usually a URL).
    fn endpoint(&self) -> String;

    /// Block until the endpoint accepts a connection or `timeout` elapses.
    ///
    /// An endpoint that is merely unavailable is waited out within the bound
    /// and reported as `ConnectTimeout`; an explicit rejection is returned
    /// immediately as `ConnectionFailure`.
    fn connect(&self, timeout: Duration) -> Result<Box<dyn Connection>, ClientError>;
}

/// A live session with an endpoint, owned by exactly one caller.
pub trait Connection: Send {
    /// Enable delivery to consumers created on this connection.
    fn start(&mut self) -> Result<(), ClientError>;

    /// Open an auto-acknowledge session: a message counts as delivered once
    /// `receive` returns it.
    fn create_session(&mut self) -> Result<Box<dyn Session + '_>, ClientError>;

    /// Release the connection. Calling it again is a no-op.
    fn close(&mut self) -> Result<(), ClientError>;
}

/// Creates producers and consumers bound to one destination each.
pub trait Session {
    fn create_producer(
        &mut self,
        destination: &Destination,
    ) -> Result<Box<dyn MessageProducer + '_>, ClientError>;

    /// Attach a consumer. Once this returns, messages sent to the destination
    /// are routed to the consumer.
    fn create_consumer(
        &mut self,
        destination: &Destination,
    ) -> Result<Box<dyn MessageConsumer + '_>, ClientError>;
}

pub trait MessageProducer {
    /// Transmit one message. Failures are `TransmissionFailure`.
    fn send(&mut self, message: TextMessage, options: &DeliveryOptions) -> Result<(), ClientError>;
}

pub trait MessageConsumer {
    /// Block until the next message arrives. There is no timeout.
    fn receive(&mut self) -> Result<ReceivedMessage, ClientError>;
}

/// Instant `timeout` from now, saturating for bounds too large to represent.
pub(crate) fn deadline_after(timeout: Duration) -> std::time::Instant {
    let now = std::time::Instant::now();
    now.checked_add(timeout)
        .unwrap_or_else(|| now + Duration::from_secs(u32::MAX as u64))
}
