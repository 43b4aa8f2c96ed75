use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use smoketest::bus::{InMemoryBroker, ReceivedMessage};
use smoketest::{ClientError, ReceiveConfig};

use crate::support::{bodies, broker_client, recording_client, Faults, RecordingFactory};

#[test]
fn returns_exactly_the_expected_count_in_order() {
    let broker = InMemoryBroker::new();
    let client = broker_client(&broker);
    client.send_messages("orders", ["a", "b", "c", "d"]).unwrap();

    let received = client.recv_messages("orders", 3).unwrap();

    assert_eq!(received.len(), 3);
    assert_eq!(bodies(&received), vec!["a", "b", "c"]);
    // the fourth stays queued
    assert_eq!(broker.depth("orders"), 1);
}

#[test]
fn strings_parse_back_into_messages() {
    let broker = InMemoryBroker::new();
    let client = broker_client(&broker);
    client.send_messages("orders", ["hello"]).unwrap();

    let received = client.recv_messages("orders", 1).unwrap();
    let message: ReceivedMessage = received[0].parse().unwrap();

    assert_eq!(message.text(), Some("hello"));
    assert_eq!(message.correlation_id.as_deref(), Some("1"));
    assert_eq!(message.destination, "queue://orders");
    assert!(message.message_id.is_some());
}

#[test]
fn zero_count_returns_immediately_after_ready() {
    let broker = InMemoryBroker::new();
    let client = broker_client(&broker);
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);

    let started = Instant::now();
    let received = client
        .recv_messages_with(
            "orders",
            0,
            ReceiveConfig::default().on_ready(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            }),
        )
        .unwrap();

    assert!(received.is_empty());
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert!(started.elapsed() < Duration::from_secs(1));
    assert_eq!(broker.open_connections(), 0);
}

#[test]
fn ready_fires_once_after_attach_and_before_first_receive() {
    let broker = InMemoryBroker::new();
    let factory = RecordingFactory::new(broker);
    let recorder = factory.recorder.clone();
    let client = recording_client(factory);
    client.send_messages("orders", ["a", "b"]).unwrap();

    let marker = recorder.clone();
    client
        .recv_messages_with(
            "orders",
            2,
            ReceiveConfig::default().on_ready(move || marker.log("ready")),
        )
        .unwrap();

    assert_eq!(recorder.count("ready"), 1);
    let consumer = recorder.position("consumer").unwrap();
    let ready = recorder.position("ready").unwrap();
    let first_receive = recorder.position("receive:1").unwrap();
    assert!(consumer < ready);
    assert!(ready < first_receive);
    assert_eq!(recorder.count("receive:2"), 1);
    assert_eq!(recorder.count("receive:3"), 0);
}

#[test]
fn topic_consumer_sees_messages_sent_after_ready() {
    let broker = InMemoryBroker::new();
    let client = broker_client(&broker);
    let sender = client.clone();

    let received = client
        .recv_messages_with(
            "events",
            2,
            ReceiveConfig::default().on_ready(move || {
                sender.send_messages("events", ["x", "y"]).unwrap();
            }),
        )
        .unwrap();

    assert_eq!(bodies(&received), vec!["x", "y"]);
    assert_eq!(broker.subscriber_count("events"), 0);
}

#[test]
fn receive_failure_propagates() {
    let broker = InMemoryBroker::new();
    let factory = RecordingFactory::new(broker).with_faults(Faults {
        fail_receive_at: Some(2),
        ..Default::default()
    });
    let client = recording_client(factory);
    client.send_messages("orders", ["a", "b", "c"]).unwrap();

    let err = client.recv_messages("orders", 3).unwrap_err();

    assert!(matches!(err, ClientError::ReceiveFailure { .. }));
}

#[test]
fn huge_count_keeps_blocking_in_receive() {
    let broker = InMemoryBroker::new();
    let client = broker_client(&broker);
    client.send_messages("orders", ["a"]).unwrap();

    let receiver = client.clone();
    let handle = thread::spawn(move || receiver.recv_messages("orders", usize::MAX / 2));
    thread::sleep(Duration::from_millis(300));

    // one message delivered, still blocked on the second
    assert!(!handle.is_finished());
    assert_eq!(broker.depth("orders"), 0);
}

#[test]
fn ready_is_not_invoked_when_lookup_fails() {
    let broker = InMemoryBroker::new();
    let client = broker_client(&broker);
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);

    let err = client
        .recv_messages_with(
            "missing",
            1,
            ReceiveConfig::default().on_ready(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            }),
        )
        .unwrap_err();

    assert!(err.is_lookup());
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}
