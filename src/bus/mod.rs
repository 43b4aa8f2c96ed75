//! Messaging client API - the seam between exchange logic and endpoints.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                  Context (name lookup)                      │
//! │  lookup_factory(name) / lookup_destination(name)            │
//! └─────────────────────────────────────────────────────────────┘
//!                            │
//!                            ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │   ConnectionFactory → Connection → Session                  │
//! │   Session: create_producer(dest) / create_consumer(dest)    │
//! │   MessageProducer::send / MessageConsumer::receive          │
//! └─────────────────────────────────────────────────────────────┘
//!          │                                   │
//!          ▼                                   ▼
//! ┌──────────────────┐              ┌──────────────────────────┐
//! │ InMemoryBroker   │              │ MqttConnectionFactory    │
//! │ (included)       │              │ (feature "mqtt")         │
//! └──────────────────┘              └──────────────────────────┘
//! ```

mod connection;
mod context;
mod in_memory;
mod message;

pub(crate) use connection::deadline_after;
pub use connection::{Connection, ConnectionFactory, MessageConsumer, MessageProducer, Session};
pub use context::{Context, NamingContext, DYNAMIC_QUEUE_PREFIX, DYNAMIC_TOPIC_PREFIX};
pub use in_memory::{InMemoryBroker, InMemoryConnection};
pub(crate) use message::now_ms;
pub use message::{
    DeliveryMode, DeliveryOptions, Destination, MessageBody, ReceivedMessage, TextMessage,
    DEFAULT_PRIORITY, MAX_PRIORITY,
};
