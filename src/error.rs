use std::time::Duration;

use thiserror::Error;

/// Errors surfaced by the exchange client and the endpoints it talks to.
///
/// Nothing in this crate retries: every variant reaches the immediate caller.
#[derive(Debug, Error)]
pub enum ClientError {
    /// A connection factory or destination name is not bound in the lookup context.
    #[error("lookup failed: no {kind} bound to '{name}'")]
    LookupFailure { kind: &'static str, name: String },

    /// The endpoint did not accept a connection within the bound.
    #[error("timed out after {timeout:?} connecting to {endpoint}")]
    ConnectTimeout { endpoint: String, timeout: Duration },

    /// The endpoint actively rejected or dropped the connection.
    #[error("connection to {endpoint} failed: {reason}")]
    ConnectionFailure { endpoint: String, reason: String },

    /// A send call failed; the remaining messages are not sent.
    #[error("failed to send message {correlation_id:?} to {destination}: {reason}")]
    TransmissionFailure {
        destination: String,
        correlation_id: Option<String>,
        reason: String,
    },

    /// A receive call failed.
    #[error("failed to receive from {destination}: {reason}")]
    ReceiveFailure { destination: String, reason: String },

    /// The connection was used after `close()`.
    #[error("connection to {0} is closed")]
    Closed(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("broker state poisoned during {0}")]
    LockPoisoned(&'static str),
}

impl ClientError {
    pub(crate) fn lookup(kind: &'static str, name: impl Into<String>) -> Self {
        ClientError::LookupFailure {
            kind,
            name: name.into(),
        }
    }

    pub(crate) fn transmission(
        destination: impl ToString,
        correlation_id: Option<&str>,
        reason: impl ToString,
    ) -> Self {
        ClientError::TransmissionFailure {
            destination: destination.to_string(),
            correlation_id: correlation_id.map(str::to_string),
            reason: reason.to_string(),
        }
    }

    pub(crate) fn receive(destination: impl ToString, reason: impl ToString) -> Self {
        ClientError::ReceiveFailure {
            destination: destination.to_string(),
            reason: reason.to_string(),
        }
    }

    /// True for `ConnectTimeout`.
    pub fn is_timeout(&self) -> bool {
        matches!(self, ClientError::ConnectTimeout { .. })
    }

    /// True for `LookupFailure`.
    pub fn is_lookup(&self) -> bool {
        matches!(self, ClientError::LookupFailure { .. })
    }
}
