use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use rumqttc::{
    Client, ConnectReturnCode, ConnectionError, Event, MqttOptions, Outgoing, Packet, QoS,
    SubscribeReasonCode,
};
use tracing::{debug, info};

use super::codec;
use crate::bus::{
    deadline_after, now_ms, Connection, ConnectionFactory, DeliveryMode, DeliveryOptions,
    Destination, MessageConsumer, MessageProducer, ReceivedMessage, Session, TextMessage,
};
use crate::ClientError;

/// Default MQTT port.
pub const DEFAULT_PORT: u16 = 1883;

/// Pause between attempts while the broker is unreachable.
const RETRY_BACKOFF: Duration = Duration::from_millis(100);

/// How long `close` waits for the DISCONNECT to be flushed.
const DISCONNECT_GRACE: Duration = Duration::from_secs(2);

static NEXT_CLIENT: AtomicU64 = AtomicU64::new(1);

fn qos_for(mode: DeliveryMode) -> QoS {
    match mode {
        DeliveryMode::NonPersistent => QoS::AtMostOnce,
        DeliveryMode::Persistent => QoS::AtLeastOnce,
    }
}

fn mode_for(qos: QoS) -> DeliveryMode {
    match qos {
        QoS::AtMostOnce => DeliveryMode::NonPersistent,
        _ => DeliveryMode::Persistent,
    }
}

/// Split `mqtt://host[:port]` (or `tcp://`, or a bare `host[:port]`).
pub(crate) fn parse_url(url: &str) -> Result<(String, u16), ClientError> {
    let rest = match url.split_once("://") {
        Some(("mqtt" | "tcp", rest)) => rest,
        Some((scheme, _)) => {
            return Err(ClientError::Config(format!(
                "unsupported scheme '{}' in {}",
                scheme, url
            )))
        }
        None => url,
    };
    let rest = rest.trim_end_matches('/');

    let (host, port) = match rest.rsplit_once(':') {
        Some((host, port)) => {
            let port = port
                .parse()
                .map_err(|_| ClientError::Config(format!("invalid port in {}", url)))?;
            (host, port)
        }
        None => (rest, DEFAULT_PORT),
    };
    if host.is_empty() {
        return Err(ClientError::Config(format!("missing host in {}", url)));
    }
    Ok((host.to_string(), port))
}

/// Connection factory for an MQTT 3.1.1 broker.
///
/// Every `connect` opens a fresh clean session with a unique client id.
#[derive(Clone, Debug)]
pub struct MqttConnectionFactory {
    host: String,
    port: u16,
    username: Option<String>,
    password: Option<String>,
    keep_alive: Duration,
    capacity: usize,
    client_prefix: String,
}

impl MqttConnectionFactory {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            username: None,
            password: None,
            keep_alive: Duration::from_secs(5),
            capacity: 64,
            client_prefix: "smoketest".to_string(),
        }
    }

    /// Build from `mqtt://host[:port]`.
    pub fn from_url(url: &str) -> Result<Self, ClientError> {
        let (host, port) = parse_url(url)?;
        Ok(Self::new(host, port))
    }

    pub fn with_credentials(
        mut self,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        self.username = Some(username.into());
        self.password = Some(password.into());
        self
    }

    /// Keep-alive interval; values under 5 seconds are raised to 5.
    pub fn with_keep_alive(mut self, keep_alive: Duration) -> Self {
        self.keep_alive = keep_alive.max(Duration::from_secs(5));
        self
    }

    pub fn with_client_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.client_prefix = prefix.into();
        self
    }

    fn next_client_id(&self) -> String {
        format!(
            "{}-{}-{}",
            self.client_prefix,
            std::process::id(),
            NEXT_CLIENT.fetch_add(1, Ordering::Relaxed)
        )
    }
}

impl ConnectionFactory for MqttConnectionFactory {
    fn endpoint(&self) -> String {
        format!("mqtt://{}:{}", self.host, self.port)
    }

    fn connect(&self, timeout: Duration) -> Result<Box<dyn Connection>, ClientError> {
        let endpoint = self.endpoint();
        let client_id = self.next_client_id();

        let mut options = MqttOptions::new(client_id.clone(), self.host.clone(), self.port);
        options
            .set_keep_alive(self.keep_alive)
            .set_clean_session(true);
        if let Some(username) = &self.username {
            options.set_credentials(username.clone(), self.password.clone().unwrap_or_default());
        }
        let (client, mut events) = Client::new(options, self.capacity);

        let deadline = deadline_after(timeout);
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(ClientError::ConnectTimeout { endpoint, timeout });
            }

            match events.recv_timeout(remaining) {
                Ok(Ok(Event::Incoming(Packet::ConnAck(ack)))) => {
                    if ack.code != ConnectReturnCode::Success {
                        return Err(ClientError::ConnectionFailure {
                            endpoint,
                            reason: format!("connection refused: {:?}", ack.code),
                        });
                    }
                    info!(endpoint = %endpoint, client_id = %client_id, "connected");
                    return Ok(Box::new(MqttConnection {
                        endpoint,
                        client_id,
                        client,
                        events,
                        attach_timeout: timeout,
                        next_message: 0,
                        started: false,
                        closed: false,
                    }));
                }
                Ok(Ok(_)) => {}
                Ok(Err(ConnectionError::ConnectionRefused(code))) => {
                    return Err(ClientError::ConnectionFailure {
                        endpoint,
                        reason: format!("connection refused: {:?}", code),
                    });
                }
                Ok(Err(err)) => {
                    debug!(endpoint = %endpoint, error = %err, "endpoint not reachable yet");
                    let remaining = deadline.saturating_duration_since(Instant::now());
                    thread::sleep(RETRY_BACKOFF.min(remaining));
                }
                // slice elapsed; the deadline check above decides
                Err(_) => {}
            }
        }
    }
}

/// A live MQTT session. The event loop is driven inline by whichever
/// producer or consumer is currently using the connection.
pub struct MqttConnection {
    endpoint: String,
    client_id: String,
    client: Client,
    events: rumqttc::Connection,
    attach_timeout: Duration,
    next_message: u64,
    started: bool,
    closed: bool,
}

impl MqttConnection {
    fn ensure_open(&self) -> Result<(), ClientError> {
        if self.closed {
            return Err(ClientError::Closed(self.endpoint.clone()));
        }
        Ok(())
    }

    fn next_event(&mut self) -> Option<Result<Event, ConnectionError>> {
        self.events.iter().next()
    }
}

impl Connection for MqttConnection {
    fn start(&mut self) -> Result<(), ClientError> {
        self.ensure_open()?;
        self.started = true;
        Ok(())
    }

    fn create_session(&mut self) -> Result<Box<dyn Session + '_>, ClientError> {
        self.ensure_open()?;
        Ok(Box::new(MqttSession { connection: self }))
    }

    fn close(&mut self) -> Result<(), ClientError> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;

        self.client
            .disconnect()
            .map_err(|err| ClientError::ConnectionFailure {
                endpoint: self.endpoint.clone(),
                reason: err.to_string(),
            })?;

        let deadline = Instant::now() + DISCONNECT_GRACE;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                break;
            }
            match self.events.recv_timeout(remaining) {
                Ok(Ok(Event::Outgoing(Outgoing::Disconnect))) | Ok(Err(_)) | Err(_) => break,
                Ok(Ok(_)) => {}
            }
        }
        debug!(endpoint = %self.endpoint, client_id = %self.client_id, "disconnected");
        Ok(())
    }
}

impl Drop for MqttConnection {
    fn drop(&mut self) {
        let _ = self.close();
    }
}

struct MqttSession<'a> {
    connection: &'a mut MqttConnection,
}

impl Session for MqttSession<'_> {
    fn create_producer(
        &mut self,
        destination: &Destination,
    ) -> Result<Box<dyn MessageProducer + '_>, ClientError> {
        self.connection.ensure_open()?;
        Ok(Box::new(MqttProducer {
            connection: &mut *self.connection,
            destination: destination.clone(),
        }))
    }

    fn create_consumer(
        &mut self,
        destination: &Destination,
    ) -> Result<Box<dyn MessageConsumer + '_>, ClientError> {
        let connection = &mut *self.connection;
        connection.ensure_open()?;

        connection
            .client
            .subscribe(destination.address(), QoS::AtLeastOnce)
            .map_err(|err| ClientError::receive(destination, err))?;

        // Hold the ready signal until the broker confirms the subscription.
        let mut early = VecDeque::new();
        let deadline = deadline_after(connection.attach_timeout);
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(ClientError::receive(
                    destination,
                    "subscription not acknowledged in time",
                ));
            }
            match connection.events.recv_timeout(remaining) {
                Ok(Ok(Event::Incoming(Packet::SubAck(ack)))) => {
                    if ack
                        .return_codes
                        .iter()
                        .any(|code| matches!(code, SubscribeReasonCode::Failure))
                    {
                        return Err(ClientError::receive(destination, "subscription rejected"));
                    }
                    break;
                }
                Ok(Ok(Event::Incoming(Packet::Publish(publish)))) => early.push_back(publish),
                Ok(Ok(_)) => {}
                Ok(Err(err)) => return Err(ClientError::receive(destination, err)),
                Err(_) => {}
            }
        }
        debug!(destination = %destination, "subscription active");

        Ok(Box::new(MqttConsumer {
            connection,
            destination: destination.clone(),
            early,
        }))
    }
}

struct MqttProducer<'a> {
    connection: &'a mut MqttConnection,
    destination: Destination,
}

impl MessageProducer for MqttProducer<'_> {
    fn send(&mut self, message: TextMessage, options: &DeliveryOptions) -> Result<(), ClientError> {
        let correlation_id = message.correlation_id.clone();
        let fail = |reason: String| {
            ClientError::transmission(&self.destination, correlation_id.as_deref(), reason)
        };

        let connection = &mut *self.connection;
        if connection.closed {
            return Err(fail("connection closed".to_string()));
        }
        connection.next_message += 1;
        let message_id = format!("ID:{}-{}", connection.client_id, connection.next_message);
        let payload = codec::encode(&message, options, &message_id, now_ms())
            .map_err(|err| fail(err.to_string()))?;

        let qos = qos_for(options.delivery_mode);
        connection
            .client
            .publish(self.destination.address(), qos, false, payload)
            .map_err(|err| fail(err.to_string()))?;

        // QoS 0 is done once written, QoS 1 once the broker acknowledges.
        loop {
            match connection.next_event() {
                Some(Ok(Event::Outgoing(Outgoing::Publish(_)))) if qos == QoS::AtMostOnce => {
                    return Ok(())
                }
                Some(Ok(Event::Incoming(Packet::PubAck(_)))) if qos == QoS::AtLeastOnce => {
                    return Ok(())
                }
                Some(Ok(_)) => {}
                Some(Err(err)) => return Err(fail(err.to_string())),
                None => return Err(fail("event loop stopped".to_string())),
            }
        }
    }
}

struct MqttConsumer<'a> {
    connection: &'a mut MqttConnection,
    destination: Destination,
    early: VecDeque<rumqttc::Publish>,
}

impl MqttConsumer<'_> {
    fn next_publish(&mut self) -> Result<rumqttc::Publish, ClientError> {
        if let Some(publish) = self.early.pop_front() {
            return Ok(publish);
        }
        loop {
            match self.connection.next_event() {
                Some(Ok(Event::Incoming(Packet::Publish(publish)))) => return Ok(publish),
                Some(Ok(_)) => {}
                Some(Err(err)) => return Err(ClientError::receive(&self.destination, err)),
                None => {
                    return Err(ClientError::receive(
                        &self.destination,
                        "event loop stopped",
                    ))
                }
            }
        }
    }
}

impl MessageConsumer for MqttConsumer<'_> {
    fn receive(&mut self) -> Result<ReceivedMessage, ClientError> {
        if !self.connection.started {
            return Err(ClientError::receive(
                &self.destination,
                "connection not started",
            ));
        }
        loop {
            let publish = self.next_publish()?;
            let decoded = codec::decode(&self.destination, &publish.payload, mode_for(publish.qos));
            if decoded.is_expired(now_ms()) {
                debug!(destination = %self.destination, "dropping expired message");
                continue;
            }
            return Ok(decoded.message);
        }
    }
}
