//! Bounded message exchange: connect within a timeout, send N correlated
//! messages, receive exactly N.
//!
//! Every call owns one connection for one producer or one consumer, and
//! closes it before returning, success or failure. Producer and consumer
//! are meant to run on separate threads; `ReceiveConfig::on_ready` is the
//! hook for starting the producer once the consumer is attached.
//!
//! ## Example
//!
//! ```
//! use std::sync::mpsc;
//! use std::thread;
//! use smoketest::bus::{InMemoryBroker, NamingContext};
//! use smoketest::client::{MessagingClient, ReceiveConfig};
//!
//! let context = NamingContext::new()
//!     .bind_factory("messaging", InMemoryBroker::new())
//!     .bind_queue("orders", "orders");
//! let client = MessagingClient::new(context);
//!
//! let (ready_tx, ready_rx) = mpsc::channel();
//! let receiver = client.clone();
//! let handle = thread::spawn(move || {
//!     let config = ReceiveConfig::default().on_ready(move || ready_tx.send(()).unwrap());
//!     receiver.recv_messages_with("orders", 2, config)
//! });
//!
//! ready_rx.recv().unwrap();
//! assert_eq!(client.send_messages("orders", ["a", "b"]).unwrap(), 2);
//! assert_eq!(handle.join().unwrap().unwrap().len(), 2);
//! ```

mod connector;
mod options;
mod receiver;
mod sender;

pub use options::{
    ReadyCallback, ReceiveConfig, SendConfig, DEFAULT_CONNECT_TIMEOUT, DEFAULT_FACTORY_NAME,
};

use std::sync::Arc;

use tracing::info;

use crate::bus::{ConnectionFactory, Context, Destination, ReceivedMessage};
use crate::ClientError;

/// Exchange client over a lookup context.
#[derive(Clone)]
pub struct MessagingClient<C: Context> {
    context: C,
    factory_name: String,
}

impl<C: Context> MessagingClient<C> {
    /// Client that looks up the connection factory named `messaging`.
    pub fn new(context: C) -> Self {
        Self {
            context,
            factory_name: DEFAULT_FACTORY_NAME.to_string(),
        }
    }

    /// Look up a different connection factory name.
    pub fn with_factory_name(mut self, name: impl Into<String>) -> Self {
        self.factory_name = name.into();
        self
    }

    pub fn context(&self) -> &C {
        &self.context
    }

    pub fn factory_name(&self) -> &str {
        &self.factory_name
    }

    /// Send `messages` to `address` with the default connect timeout.
    pub fn send_messages<I, S>(&self, address: &str, messages: I) -> Result<usize, ClientError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.send_messages_with(address, messages, &SendConfig::default())
    }

    /// Send `messages` to `address`, non-persistent, one correlation id per
    /// message starting at 1. Returns the number sent.
    pub fn send_messages_with<I, S>(
        &self,
        address: &str,
        messages: I,
        config: &SendConfig,
    ) -> Result<usize, ClientError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let (factory, destination) = self.resolve(address)?;
        let mut connection = connector::connect(factory.as_ref(), config.connect_timeout)?;
        let result = sender::send_all(connection.as_mut(), &destination, messages);
        let sent = connector::release(connection, result)?;

        info!(destination = %destination, sent, "messages sent");
        Ok(sent)
    }

    /// Receive exactly `count` messages from `address` with default options.
    pub fn recv_messages(&self, address: &str, count: usize) -> Result<Vec<String>, ClientError> {
        self.recv_messages_with(address, count, ReceiveConfig::default())
    }

    /// Receive exactly `count` messages from `address`, as strings in receipt
    /// order. Parse them back with `str::parse::<ReceivedMessage>()`.
    pub fn recv_messages_with(
        &self,
        address: &str,
        count: usize,
        config: ReceiveConfig,
    ) -> Result<Vec<String>, ClientError> {
        let records = self.recv_records_with(address, count, config)?;
        Ok(records.iter().map(ToString::to_string).collect())
    }

    /// Like `recv_messages_with`, keeping the typed messages.
    pub fn recv_records_with(
        &self,
        address: &str,
        count: usize,
        mut config: ReceiveConfig,
    ) -> Result<Vec<ReceivedMessage>, ClientError> {
        let (factory, destination) = self.resolve(address)?;
        let mut connection = connector::connect(factory.as_ref(), config.connect_timeout)?;
        let result = receiver::receive_exactly(
            connection.as_mut(),
            &destination,
            count,
            config.take_on_ready(),
        );
        let received = connector::release(connection, result)?;

        info!(destination = %destination, received = received.len(), "messages received");
        Ok(received)
    }

    fn resolve(
        &self,
        address: &str,
    ) -> Result<(Arc<dyn ConnectionFactory>, Destination), ClientError> {
        let factory = self.context.lookup_factory(&self.factory_name)?;
        let destination = self.context.lookup_destination(address)?;
        Ok((factory, destination))
    }
}
