//! In-process broker for tests and single-process scenarios.
//!
//! `InMemoryBroker` is both the broker and its `ConnectionFactory`. Clones
//! share state, so one clone can be bound in a `NamingContext` while a test
//! keeps another to inspect queues or flip availability.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use tracing::debug;

use super::connection::{
    deadline_after, Connection, ConnectionFactory, MessageConsumer, MessageProducer, Session,
};
use super::message::{
    now_ms, DeliveryMode, DeliveryOptions, Destination, MessageBody, ReceivedMessage, TextMessage,
};
use crate::ClientError;

/// In-process broker.
///
/// Features:
/// - Thread-safe (share across threads via `Clone`)
/// - Queues are FIFO with competing consumers
/// - Topics fan out to every consumer attached when the message is sent
/// - `receive` blocks on a condition variable, without timeout
/// - Expired messages (time-to-live) are never delivered
/// - `restart()` drops non-persistent messages
///
/// ## Example
///
/// ```
/// use std::time::Duration;
/// use smoketest::bus::{ConnectionFactory, DeliveryOptions, Destination, InMemoryBroker, TextMessage};
///
/// let broker = InMemoryBroker::new();
/// let orders = Destination::queue("orders");
///
/// let mut connection = broker.connect(Duration::from_secs(1)).unwrap();
/// connection.start().unwrap();
/// {
///     let mut session = connection.create_session().unwrap();
///     let mut producer = session.create_producer(&orders).unwrap();
///     producer.send(TextMessage::new("hello"), &DeliveryOptions::default()).unwrap();
/// }
/// assert_eq!(broker.depth("orders"), 1);
/// connection.close().unwrap();
/// ```
#[derive(Clone)]
pub struct InMemoryBroker {
    name: String,
    shared: Arc<Shared>,
}

struct Shared {
    state: Mutex<BrokerState>,
    /// Signalled on every publish, availability change and close.
    changed: Condvar,
}

struct BrokerState {
    available: bool,
    queues: HashMap<String, VecDeque<StoredMessage>>,
    subscriptions: HashMap<u64, Subscription>,
    next_message_id: u64,
    next_subscription_id: u64,
    next_connection_id: u64,
    connections_opened: usize,
    connections_closed: usize,
}

struct Subscription {
    topic: String,
    connection_id: u64,
    pending: VecDeque<StoredMessage>,
}

#[derive(Clone)]
struct StoredMessage {
    message: ReceivedMessage,
    expires_at_ms: Option<u64>,
}

impl StoredMessage {
    fn is_live(&self, now: u64) -> bool {
        self.expires_at_ms.map_or(true, |expiry| expiry > now)
    }
}

fn pop_live(queue: &mut VecDeque<StoredMessage>, now: u64) -> Option<ReceivedMessage> {
    while let Some(stored) = queue.pop_front() {
        if stored.is_live(now) {
            return Some(stored.message);
        }
    }
    None
}

impl Shared {
    fn lock(&self, operation: &'static str) -> Result<MutexGuard<'_, BrokerState>, ClientError> {
        self.state
            .lock()
            .map_err(|_| ClientError::LockPoisoned(operation))
    }

    /// Lock for read-only introspection, recovering from poisoning.
    fn peek(&self) -> MutexGuard<'_, BrokerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for InMemoryBroker {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryBroker {
    /// Create an available broker named `local`.
    pub fn new() -> Self {
        Self::named("local")
    }

    /// Create an available broker; the name only shows up in `endpoint()`.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            shared: Arc::new(Shared {
                state: Mutex::new(BrokerState {
                    available: true,
                    queues: HashMap::new(),
                    subscriptions: HashMap::new(),
                    next_message_id: 0,
                    next_subscription_id: 0,
                    next_connection_id: 0,
                    connections_opened: 0,
                    connections_closed: 0,
                }),
                changed: Condvar::new(),
            }),
        }
    }

    /// Accept (`true`) or hold off (`false`) new connections. Pending
    /// `connect` calls wake up when the broker becomes available.
    pub fn set_available(&self, available: bool) -> Result<(), ClientError> {
        self.shared.lock("set_available")?.available = available;
        self.shared.changed.notify_all();
        Ok(())
    }

    /// Simulate a broker restart: non-persistent messages are lost.
    pub fn restart(&self) -> Result<usize, ClientError> {
        let mut state = self.shared.lock("restart")?;
        let state = &mut *state;
        let mut dropped = 0;
        let pending = state
            .queues
            .values_mut()
            .chain(state.subscriptions.values_mut().map(|s| &mut s.pending));
        for queue in pending {
            let before = queue.len();
            queue.retain(|m| m.message.delivery_mode == DeliveryMode::Persistent);
            dropped += before - queue.len();
        }
        debug!(broker = %self.name, dropped, "broker restarted");
        Ok(dropped)
    }

    /// Number of undelivered, unexpired messages on a queue.
    pub fn depth(&self, queue: &str) -> usize {
        let now = now_ms();
        self.shared
            .peek()
            .queues
            .get(queue)
            .map_or(0, |q| q.iter().filter(|m| m.is_live(now)).count())
    }

    /// Number of consumers currently attached to a topic.
    pub fn subscriber_count(&self, topic: &str) -> usize {
        self.shared
            .peek()
            .subscriptions
            .values()
            .filter(|s| s.topic == topic)
            .count()
    }

    pub fn connections_opened(&self) -> usize {
        self.shared.peek().connections_opened
    }

    pub fn connections_closed(&self) -> usize {
        self.shared.peek().connections_closed
    }

    pub fn open_connections(&self) -> usize {
        let state = self.shared.peek();
        state.connections_opened - state.connections_closed
    }
}

impl ConnectionFactory for InMemoryBroker {
    fn endpoint(&self) -> String {
        format!("memory://{}", self.name)
    }

    fn connect(&self, timeout: Duration) -> Result<Box<dyn Connection>, ClientError> {
        let deadline = deadline_after(timeout);
        let mut state = self.shared.lock("connect")?;
        while !state.available {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(ClientError::ConnectTimeout {
                    endpoint: self.endpoint(),
                    timeout,
                });
            }
            let (guard, _) = self
                .shared
                .changed
                .wait_timeout(state, remaining)
                .map_err(|_| ClientError::LockPoisoned("connect"))?;
            state = guard;
        }

        state.next_connection_id += 1;
        state.connections_opened += 1;
        let id = state.next_connection_id;
        drop(state);

        debug!(endpoint = %self.endpoint(), connection_id = id, "connection accepted");
        Ok(Box::new(InMemoryConnection {
            broker: self.clone(),
            id,
            started: false,
            closed: false,
        }))
    }
}

/// Connection to an `InMemoryBroker`.
pub struct InMemoryConnection {
    broker: InMemoryBroker,
    id: u64,
    started: bool,
    closed: bool,
}

impl InMemoryConnection {
    fn ensure_open(&self) -> Result<(), ClientError> {
        if self.closed {
            return Err(ClientError::Closed(self.broker.endpoint()));
        }
        Ok(())
    }
}

impl Connection for InMemoryConnection {
    fn start(&mut self) -> Result<(), ClientError> {
        self.ensure_open()?;
        self.started = true;
        Ok(())
    }

    fn create_session(&mut self) -> Result<Box<dyn Session + '_>, ClientError> {
        self.ensure_open()?;
        Ok(Box::new(InMemorySession { connection: self }))
    }

    fn close(&mut self) -> Result<(), ClientError> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;

        let mut state = self.broker.shared.lock("close")?;
        let id = self.id;
        state.subscriptions.retain(|_, s| s.connection_id != id);
        state.connections_closed += 1;
        drop(state);
        self.broker.shared.changed.notify_all();

        debug!(endpoint = %self.broker.endpoint(), connection_id = id, "connection closed");
        Ok(())
    }
}

impl Drop for InMemoryConnection {
    fn drop(&mut self) {
        let _ = self.close();
    }
}

struct InMemorySession<'a> {
    connection: &'a mut InMemoryConnection,
}

impl Session for InMemorySession<'_> {
    fn create_producer(
        &mut self,
        destination: &Destination,
    ) -> Result<Box<dyn MessageProducer + '_>, ClientError> {
        self.connection.ensure_open()?;
        Ok(Box::new(InMemoryProducer {
            connection: &*self.connection,
            destination: destination.clone(),
        }))
    }

    fn create_consumer(
        &mut self,
        destination: &Destination,
    ) -> Result<Box<dyn MessageConsumer + '_>, ClientError> {
        self.connection.ensure_open()?;
        let shared = &self.connection.broker.shared;
        let mut state = shared.lock("create_consumer")?;

        let source = match destination {
            Destination::Queue(address) => {
                state.queues.entry(address.clone()).or_default();
                Source::Queue(address.clone())
            }
            Destination::Topic(address) => {
                state.next_subscription_id += 1;
                let id = state.next_subscription_id;
                state.subscriptions.insert(
                    id,
                    Subscription {
                        topic: address.clone(),
                        connection_id: self.connection.id,
                        pending: VecDeque::new(),
                    },
                );
                Source::Subscription(id)
            }
        };
        drop(state);

        Ok(Box::new(InMemoryConsumer {
            connection: &*self.connection,
            destination: destination.clone(),
            source,
        }))
    }
}

struct InMemoryProducer<'a> {
    connection: &'a InMemoryConnection,
    destination: Destination,
}

impl MessageProducer for InMemoryProducer<'_> {
    fn send(&mut self, message: TextMessage, options: &DeliveryOptions) -> Result<(), ClientError> {
        let correlation_id = message.correlation_id.as_deref();
        if self.connection.closed {
            return Err(ClientError::transmission(
                &self.destination,
                correlation_id,
                "connection closed",
            ));
        }

        let shared = &self.connection.broker.shared;
        let mut state = shared.lock("send")?;
        state.next_message_id += 1;
        let sent_at = now_ms();
        let stored = StoredMessage {
            message: ReceivedMessage {
                message_id: Some(format!("ID:memory-{}", state.next_message_id)),
                correlation_id: message.correlation_id,
                destination: self.destination.to_string(),
                delivery_mode: options.delivery_mode,
                priority: options.priority,
                timestamp_ms: Some(sent_at),
                body: MessageBody::Text(message.body),
            },
            expires_at_ms: options.expires_at_ms(sent_at),
        };

        match &self.destination {
            Destination::Queue(address) => {
                state
                    .queues
                    .entry(address.clone())
                    .or_default()
                    .push_back(stored);
            }
            Destination::Topic(address) => {
                for subscription in state
                    .subscriptions
                    .values_mut()
                    .filter(|s| &s.topic == address)
                {
                    subscription.pending.push_back(stored.clone());
                }
            }
        }
        drop(state);
        shared.changed.notify_all();
        Ok(())
    }
}

enum Source {
    Queue(String),
    Subscription(u64),
}

struct InMemoryConsumer<'a> {
    connection: &'a InMemoryConnection,
    destination: Destination,
    source: Source,
}

impl MessageConsumer for InMemoryConsumer<'_> {
    fn receive(&mut self) -> Result<ReceivedMessage, ClientError> {
        if !self.connection.started {
            return Err(ClientError::receive(
                &self.destination,
                "connection not started",
            ));
        }

        let shared = &self.connection.broker.shared;
        let mut state = shared.lock("receive")?;
        loop {
            let now = now_ms();
            let next = match &self.source {
                Source::Queue(address) => {
                    let queue = state.queues.get_mut(address);
                    queue.and_then(|q| pop_live(q, now))
                }
                Source::Subscription(id) => {
                    let subscription = state.subscriptions.get_mut(id);
                    subscription.and_then(|s| pop_live(&mut s.pending, now))
                }
            };
            if let Some(message) = next {
                return Ok(message);
            }
            state = shared
                .changed
                .wait(state)
                .map_err(|_| ClientError::LockPoisoned("receive"))?;
        }
    }
}

impl Drop for InMemoryConsumer<'_> {
    fn drop(&mut self) {
        if let Source::Subscription(id) = self.source {
            if let Ok(mut state) = self.connection.broker.shared.lock("drop consumer") {
                state.subscriptions.remove(&id);
            }
        }
    }
}
