//! Exactly one close per call, on every exit path that opened a connection.

use std::time::Duration;

use smoketest::bus::InMemoryBroker;
use smoketest::{ClientError, SendConfig};

use crate::support::{recording_client, Faults, RecordingFactory};

fn recording(faults: Faults) -> (RecordingFactory, InMemoryBroker) {
    let broker = InMemoryBroker::new();
    (RecordingFactory::new(broker.clone()).with_faults(faults), broker)
}

#[test]
fn successful_send_closes_once() {
    let (factory, _) = recording(Faults::default());
    let recorder = factory.recorder.clone();
    let client = recording_client(factory);

    client.send_messages("orders", ["a", "b"]).unwrap();

    let record = recorder.snapshot();
    assert_eq!(record.connects, 1);
    assert_eq!(record.closes, 1);
    assert_eq!(record.events.last().map(String::as_str), Some("close"));
}

#[test]
fn successful_receive_closes_once() {
    let (factory, broker) = recording(Faults::default());
    let recorder = factory.recorder.clone();
    let client = recording_client(factory);
    client.send_messages("orders", ["a"]).unwrap();

    client.recv_messages("orders", 1).unwrap();

    let record = recorder.snapshot();
    assert_eq!(record.connects, 2);
    assert_eq!(record.closes, 2);
    assert_eq!(broker.open_connections(), 0);
}

#[test]
fn failed_send_closes_once() {
    let (factory, broker) = recording(Faults {
        fail_send_at: Some(1),
        ..Default::default()
    });
    let recorder = factory.recorder.clone();
    let client = recording_client(factory);

    assert!(client.send_messages("orders", ["a", "b"]).is_err());

    assert_eq!(recorder.snapshot().closes, 1);
    assert_eq!(broker.open_connections(), 0);
}

#[test]
fn failed_receive_closes_once() {
    let (factory, broker) = recording(Faults {
        fail_receive_at: Some(1),
        ..Default::default()
    });
    let recorder = factory.recorder.clone();
    let client = recording_client(factory);

    assert!(client.recv_messages("orders", 1).is_err());

    assert_eq!(recorder.snapshot().closes, 1);
    assert_eq!(broker.open_connections(), 0);
}

#[test]
fn failed_start_closes_once() {
    let (factory, _) = recording(Faults {
        fail_start: true,
        ..Default::default()
    });
    let recorder = factory.recorder.clone();
    let client = recording_client(factory);

    let err = client.send_messages("orders", ["a"]).unwrap_err();

    assert!(matches!(err, ClientError::ConnectionFailure { .. }));
    assert_eq!(recorder.snapshot().closes, 1);
    assert_eq!(recorder.count("producer"), 0);
}

#[test]
fn no_close_without_a_connection() {
    let (factory, broker) = recording(Faults::default());
    broker.set_available(false).unwrap();
    let recorder = factory.recorder.clone();
    let client = recording_client(factory);

    let err = client
        .send_messages_with(
            "orders",
            ["a"],
            &SendConfig::default().connect_timeout(Duration::from_millis(50)),
        )
        .unwrap_err();
    assert!(err.is_timeout());
    assert!(client.send_messages("missing", ["a"]).unwrap_err().is_lookup());

    let record = recorder.snapshot();
    assert_eq!(record.connects, 1);
    assert_eq!(record.closes, 0);
}

#[test]
fn close_failure_after_success_is_reported() {
    let (factory, _) = recording(Faults {
        fail_close: true,
        ..Default::default()
    });
    let client = recording_client(factory);

    let err = client.send_messages("orders", ["a"]).unwrap_err();

    assert!(matches!(err, ClientError::ConnectionFailure { .. }));
}

#[test]
fn operation_error_wins_over_close_error() {
    let (factory, _) = recording(Faults {
        fail_send_at: Some(1),
        fail_close: true,
        ..Default::default()
    });
    let recorder = factory.recorder.clone();
    let client = recording_client(factory);

    let err = client.send_messages("orders", ["a"]).unwrap_err();

    assert!(matches!(err, ClientError::TransmissionFailure { .. }));
    assert_eq!(recorder.snapshot().closes, 1);
}
