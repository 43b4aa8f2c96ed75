//! Bounded message exchange for messaging smoke tests.
//!
//! Connect to a named endpoint within a timeout, send N messages tagged with
//! sequential correlation ids, receive exactly N messages, report counts.
//!
//! - [`bus`]: client-side messaging traits, lookup context, in-process broker
//! - [`mqtt`]: MQTT endpoint (feature `mqtt`)
//! - [`client`]: the exchange itself ([`MessagingClient`])
//! - [`config`]: TOML configuration

pub mod bus;
pub mod client;
pub mod config;
mod error;
#[cfg(feature = "mqtt")]
pub mod mqtt;

pub use client::{MessagingClient, ReceiveConfig, SendConfig};
pub use config::Config;
pub use error::ClientError;
