use std::fmt;
use std::time::Duration;

/// Connect bound used when the caller does not pick one.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(300);

/// Lookup name of the connection factory used when none is configured.
pub const DEFAULT_FACTORY_NAME: &str = "messaging";

/// Options for `MessagingClient::send_messages_with`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SendConfig {
    /// Bounds the connect phase only, never the sends.
    pub connect_timeout: Duration,
}

impl Default for SendConfig {
    fn default() -> Self {
        Self {
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }
}

impl SendConfig {
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }
}

/// Callback run once the consumer is attached, before the first receive.
pub type ReadyCallback = Box<dyn FnOnce() + Send>;

/// Options for `MessagingClient::recv_messages_with`.
///
/// ```
/// use std::sync::mpsc;
/// use std::time::Duration;
/// use smoketest::client::ReceiveConfig;
///
/// let (ready_tx, ready_rx) = mpsc::channel();
/// let config = ReceiveConfig::default()
///     .connect_timeout(Duration::from_secs(10))
///     .on_ready(move || ready_tx.send(()).unwrap());
/// # drop(config);
/// # drop(ready_rx);
/// ```
pub struct ReceiveConfig {
    /// Bounds the connect phase only; receives block without limit.
    pub connect_timeout: Duration,
    on_ready: Option<ReadyCallback>,
}

impl Default for ReceiveConfig {
    fn default() -> Self {
        Self {
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            on_ready: None,
        }
    }
}

impl ReceiveConfig {
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn on_ready(mut self, callback: impl FnOnce() + Send + 'static) -> Self {
        self.on_ready = Some(Box::new(callback));
        self
    }

    pub(crate) fn take_on_ready(&mut self) -> Option<ReadyCallback> {
        self.on_ready.take()
    }
}

impl fmt::Debug for ReceiveConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReceiveConfig")
            .field("connect_timeout", &self.connect_timeout)
            .field("on_ready", &self.on_ready.is_some())
            .finish()
    }
}
