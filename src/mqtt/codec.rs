//! Wire envelope for messages carried over MQTT.
//!
//! MQTT 3.1.1 has no message properties, so message id, correlation id,
//! delivery mode, priority and expiry travel inside the payload: the magic
//! bytes `SMK1` followed by a bitcode record. Payloads without the magic
//! come from other publishers and are delivered as-is.

use serde::{Deserialize, Serialize};

use crate::bus::{
    DeliveryMode, DeliveryOptions, Destination, MessageBody, ReceivedMessage, TextMessage,
    DEFAULT_PRIORITY,
};

const MAGIC: &[u8; 4] = b"SMK1";

#[derive(Serialize, Deserialize)]
struct Envelope {
    message_id: String,
    correlation_id: Option<String>,
    body: String,
    delivery_mode: DeliveryMode,
    priority: u8,
    timestamp_ms: u64,
    expires_at_ms: Option<u64>,
}

/// A decoded payload plus its absolute expiry, if any.
pub(crate) struct Decoded {
    pub message: ReceivedMessage,
    pub expires_at_ms: Option<u64>,
}

impl Decoded {
    pub fn is_expired(&self, now_ms: u64) -> bool {
        self.expires_at_ms.is_some_and(|expiry| expiry <= now_ms)
    }
}

pub(crate) fn encode(
    message: &TextMessage,
    options: &DeliveryOptions,
    message_id: &str,
    sent_at_ms: u64,
) -> Result<Vec<u8>, bitcode::Error> {
    let envelope = Envelope {
        message_id: message_id.to_string(),
        correlation_id: message.correlation_id.clone(),
        body: message.body.clone(),
        delivery_mode: options.delivery_mode,
        priority: options.priority,
        timestamp_ms: sent_at_ms,
        expires_at_ms: options.expires_at_ms(sent_at_ms),
    };
    let mut payload = MAGIC.to_vec();
    payload.extend(bitcode::serialize(&envelope)?);
    Ok(payload)
}

/// Decode a payload received on `destination`. `fallback_mode` describes
/// foreign payloads (derived from the MQTT QoS they arrived with).
pub(crate) fn decode(
    destination: &Destination,
    payload: &[u8],
    fallback_mode: DeliveryMode,
) -> Decoded {
    let envelope = payload
        .strip_prefix(MAGIC.as_slice())
        .and_then(|record| bitcode::deserialize::<Envelope>(record).ok());

    match envelope {
        Some(envelope) => Decoded {
            message: ReceivedMessage {
                message_id: Some(envelope.message_id),
                correlation_id: envelope.correlation_id,
                destination: destination.to_string(),
                delivery_mode: envelope.delivery_mode,
                priority: envelope.priority,
                timestamp_ms: Some(envelope.timestamp_ms),
                body: MessageBody::Text(envelope.body),
            },
            expires_at_ms: envelope.expires_at_ms,
        },
        None => Decoded {
            message: ReceivedMessage {
                message_id: None,
                correlation_id: None,
                destination: destination.to_string(),
                delivery_mode: fallback_mode,
                priority: DEFAULT_PRIORITY,
                timestamp_ms: None,
                body: MessageBody::from_bytes(payload.to_vec()),
            },
            expires_at_ms: None,
        },
    }
}
