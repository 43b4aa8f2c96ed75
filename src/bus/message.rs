//! Message, destination and delivery types shared by every endpoint.

use std::fmt;
use std::str::FromStr;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

/// Priority assigned when the caller does not choose one.
pub const DEFAULT_PRIORITY: u8 = 4;

/// Highest priority an endpoint accepts.
pub const MAX_PRIORITY: u8 = 9;

/// A named, addressable target for messages.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "address", rename_all = "snake_case")]
pub enum Destination {
    /// Point-to-point: each message is consumed by exactly one consumer.
    Queue(String),
    /// Fan-out: each message reaches every consumer attached when it was sent.
    Topic(String),
}

impl Destination {
    pub fn queue(address: impl Into<String>) -> Self {
        Destination::Queue(address.into())
    }

    pub fn topic(address: impl Into<String>) -> Self {
        Destination::Topic(address.into())
    }

    /// The endpoint-level name of this destination.
    pub fn address(&self) -> &str {
        match self {
            Destination::Queue(address) | Destination::Topic(address) => address,
        }
    }
}

impl fmt::Display for Destination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Destination::Queue(address) => write!(f, "queue://{}", address),
            Destination::Topic(address) => write!(f, "topic://{}", address),
        }
    }
}

/// Whether the endpoint must keep a message across its own restarts.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryMode {
    #[default]
    Persistent,
    /// Best-effort, lost if the endpoint restarts before delivery.
    NonPersistent,
}

/// Per-send delivery parameters.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DeliveryOptions {
    pub delivery_mode: DeliveryMode,
    pub priority: u8,
    /// `None` means the message never expires.
    pub time_to_live: Option<Duration>,
}

impl Default for DeliveryOptions {
    fn default() -> Self {
        Self {
            delivery_mode: DeliveryMode::Persistent,
            priority: DEFAULT_PRIORITY,
            time_to_live: None,
        }
    }
}

impl DeliveryOptions {
    /// Non-persistent delivery with default priority and no expiry.
    pub fn non_persistent() -> Self {
        Self {
            delivery_mode: DeliveryMode::NonPersistent,
            ..Self::default()
        }
    }

    pub fn with_priority(mut self, priority: u8) -> Self {
        self.priority = priority.min(MAX_PRIORITY);
        self
    }

    pub fn with_time_to_live(mut self, ttl: Duration) -> Self {
        self.time_to_live = Some(ttl);
        self
    }

    /// Absolute expiry in milliseconds since the epoch, relative to `sent_at_ms`.
    pub fn expires_at_ms(&self, sent_at_ms: u64) -> Option<u64> {
        self.time_to_live
            .map(|ttl| sent_at_ms.saturating_add(ttl.as_millis() as u64))
    }
}

/// An outgoing text message.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TextMessage {
    pub body: String,
    pub correlation_id: Option<String>,
}

impl TextMessage {
    pub fn new(body: impl Into<String>) -> Self {
        Self {
            body: body.into(),
            correlation_id: None,
        }
    }

    pub fn with_correlation_id(mut self, correlation_id: impl Into<String>) -> Self {
        self.correlation_id = Some(correlation_id.into());
        self
    }
}

/// Body of a received message.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum MessageBody {
    Text(String),
    Bytes(#[serde(with = "base64_bytes")] Vec<u8>),
}

impl MessageBody {
    /// Text body, or `None` for binary bodies.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            MessageBody::Text(text) => Some(text),
            MessageBody::Bytes(_) => None,
        }
    }

    /// Text if the bytes are UTF-8, otherwise binary.
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        match String::from_utf8(bytes) {
            Ok(text) => MessageBody::Text(text),
            Err(err) => MessageBody::Bytes(err.into_bytes()),
        }
    }
}

mod base64_bytes {
    use base64::{engine::general_purpose::STANDARD, Engine};
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S>(bytes: &Vec<u8>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        STANDARD.encode(bytes).serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<u8>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s: String = String::deserialize(deserializer)?;
        STANDARD.decode(&s).map_err(serde::de::Error::custom)
    }
}

/// A message as delivered to a consumer.
///
/// The string form (`Display`) is a single-line JSON document; parse it back
/// with `str::parse::<ReceivedMessage>()`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReceivedMessage {
    pub message_id: Option<String>,
    pub correlation_id: Option<String>,
    pub destination: String,
    pub delivery_mode: DeliveryMode,
    pub priority: u8,
    pub timestamp_ms: Option<u64>,
    pub body: MessageBody,
}

impl ReceivedMessage {
    /// Text body, if any.
    pub fn text(&self) -> Option<&str> {
        self.body.as_text()
    }
}

impl fmt::Display for ReceivedMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let json = serde_json::to_string(self).map_err(|_| fmt::Error)?;
        f.write_str(&json)
    }
}

impl FromStr for ReceivedMessage {
    type Err = serde_json::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        serde_json::from_str(s)
    }
}

/// Milliseconds since the Unix epoch.
pub(crate) fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
