//! Test doubles: a connection factory that records every call it sees and
//! can inject failures, wrapped around an `InMemoryBroker`.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use smoketest::bus::{
    Connection, ConnectionFactory, DeliveryOptions, Destination, InMemoryBroker, MessageConsumer,
    MessageProducer, NamingContext, ReceivedMessage, Session, TextMessage,
};
use smoketest::{ClientError, MessagingClient};

/// Everything the recording factory observed, in order.
#[derive(Clone, Debug, Default)]
pub struct Record {
    pub connects: usize,
    pub closes: usize,
    pub events: Vec<String>,
    pub sent: Vec<(TextMessage, DeliveryOptions)>,
}

#[derive(Clone, Default)]
pub struct Recorder {
    record: Arc<Mutex<Record>>,
}

impl Recorder {
    pub fn log(&self, event: impl Into<String>) {
        self.record.lock().unwrap().events.push(event.into());
    }

    pub fn snapshot(&self) -> Record {
        self.record.lock().unwrap().clone()
    }

    /// Position of the first event equal to `event`.
    pub fn position(&self, event: &str) -> Option<usize> {
        self.snapshot().events.iter().position(|e| e == event)
    }

    pub fn count(&self, event: &str) -> usize {
        self.snapshot().events.iter().filter(|e| *e == event).count()
    }

    fn with<R>(&self, f: impl FnOnce(&mut Record) -> R) -> R {
        f(&mut self.record.lock().unwrap())
    }
}

/// Failures to inject. Message indexes are 1-based.
#[derive(Clone, Debug, Default)]
pub struct Faults {
    pub fail_start: bool,
    pub fail_send_at: Option<usize>,
    pub fail_receive_at: Option<usize>,
    pub fail_close: bool,
}

#[derive(Clone)]
pub struct RecordingFactory {
    pub broker: InMemoryBroker,
    pub recorder: Recorder,
    pub faults: Faults,
}

impl RecordingFactory {
    pub fn new(broker: InMemoryBroker) -> Self {
        Self {
            broker,
            recorder: Recorder::default(),
            faults: Faults::default(),
        }
    }

    pub fn with_faults(mut self, faults: Faults) -> Self {
        self.faults = faults;
        self
    }
}

impl ConnectionFactory for RecordingFactory {
    fn endpoint(&self) -> String {
        format!("recording+{}", self.broker.endpoint())
    }

    fn connect(&self, timeout: Duration) -> Result<Box<dyn Connection>, ClientError> {
        self.recorder.with(|r| r.connects += 1);
        self.recorder.log("connect");
        let inner = self.broker.connect(timeout)?;
        Ok(Box::new(RecordingConnection {
            inner,
            recorder: self.recorder.clone(),
            faults: self.faults.clone(),
        }))
    }
}

struct RecordingConnection {
    inner: Box<dyn Connection>,
    recorder: Recorder,
    faults: Faults,
}

impl Connection for RecordingConnection {
    fn start(&mut self) -> Result<(), ClientError> {
        self.recorder.log("start");
        if self.faults.fail_start {
            return Err(ClientError::ConnectionFailure {
                endpoint: "recording".into(),
                reason: "start refused".into(),
            });
        }
        self.inner.start()
    }

    fn create_session(&mut self) -> Result<Box<dyn Session + '_>, ClientError> {
        self.recorder.log("session");
        let inner = self.inner.create_session()?;
        Ok(Box::new(RecordingSession {
            inner,
            recorder: self.recorder.clone(),
            faults: self.faults.clone(),
        }))
    }

    fn close(&mut self) -> Result<(), ClientError> {
        self.recorder.with(|r| r.closes += 1);
        self.recorder.log("close");
        self.inner.close()?;
        if self.faults.fail_close {
            return Err(ClientError::ConnectionFailure {
                endpoint: "recording".into(),
                reason: "close failed".into(),
            });
        }
        Ok(())
    }
}

struct RecordingSession<'a> {
    inner: Box<dyn Session + 'a>,
    recorder: Recorder,
    faults: Faults,
}

impl Session for RecordingSession<'_> {
    fn create_producer(
        &mut self,
        destination: &Destination,
    ) -> Result<Box<dyn MessageProducer + '_>, ClientError> {
        self.recorder.log("producer");
        let inner = self.inner.create_producer(destination)?;
        Ok(Box::new(RecordingProducer {
            inner,
            recorder: self.recorder.clone(),
            fail_at: self.faults.fail_send_at,
            calls: 0,
        }))
    }

    fn create_consumer(
        &mut self,
        destination: &Destination,
    ) -> Result<Box<dyn MessageConsumer + '_>, ClientError> {
        let inner = self.inner.create_consumer(destination)?;
        self.recorder.log("consumer");
        Ok(Box::new(RecordingConsumer {
            inner,
            recorder: self.recorder.clone(),
            fail_at: self.faults.fail_receive_at,
            calls: 0,
        }))
    }
}

struct RecordingProducer<'a> {
    inner: Box<dyn MessageProducer + 'a>,
    recorder: Recorder,
    fail_at: Option<usize>,
    calls: usize,
}

impl MessageProducer for RecordingProducer<'_> {
    fn send(&mut self, message: TextMessage, options: &DeliveryOptions) -> Result<(), ClientError> {
        self.calls += 1;
        self.recorder.log(format!("send:{}", self.calls));
        if self.fail_at == Some(self.calls) {
            return Err(ClientError::TransmissionFailure {
                destination: "recording".into(),
                correlation_id: message.correlation_id,
                reason: "injected".into(),
            });
        }
        self.recorder
            .with(|r| r.sent.push((message.clone(), options.clone())));
        self.inner.send(message, options)
    }
}

struct RecordingConsumer<'a> {
    inner: Box<dyn MessageConsumer + 'a>,
    recorder: Recorder,
    fail_at: Option<usize>,
    calls: usize,
}

impl MessageConsumer for RecordingConsumer<'_> {
    fn receive(&mut self) -> Result<ReceivedMessage, ClientError> {
        self.calls += 1;
        self.recorder.log(format!("receive:{}", self.calls));
        if self.fail_at == Some(self.calls) {
            return Err(ClientError::ReceiveFailure {
                destination: "recording".into(),
                reason: "injected".into(),
            });
        }
        self.inner.receive()
    }
}

/// A client over a recording factory bound as `messaging`, with queue
/// `orders` and topic `events`.
pub fn recording_client(
    factory: RecordingFactory,
) -> MessagingClient<NamingContext> {
    MessagingClient::new(
        NamingContext::new()
            .bind_factory("messaging", factory)
            .bind_queue("orders", "orders")
            .bind_topic("events", "events"),
    )
}

/// A plain client over `broker`, same bindings as `recording_client`.
pub fn broker_client(broker: &InMemoryBroker) -> MessagingClient<NamingContext> {
    MessagingClient::new(
        NamingContext::new()
            .bind_factory("messaging", broker.clone())
            .bind_queue("orders", "orders")
            .bind_topic("events", "events"),
    )
}

/// Text bodies of stringified received messages.
pub fn bodies(received: &[String]) -> Vec<String> {
    received
        .iter()
        .map(|s| {
            s.parse::<ReceivedMessage>()
                .unwrap()
                .text()
                .unwrap()
                .to_string()
        })
        .collect()
}
