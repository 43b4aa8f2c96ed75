//! MQTT endpoint built on `rumqttc`'s blocking client.
//!
//! Queue and topic addresses both map to the MQTT topic of the same name.
//! Non-persistent delivery is QoS 0, persistent delivery QoS 1. Incoming
//! QoS 1 messages are acknowledged by the client as soon as they are read,
//! which is the auto-acknowledge contract of `Connection::create_session`.

mod codec;
mod connection;

pub use connection::{MqttConnection, MqttConnectionFactory, DEFAULT_PORT};
