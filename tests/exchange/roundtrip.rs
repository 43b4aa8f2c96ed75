use std::sync::mpsc;
use std::thread;

use smoketest::bus::InMemoryBroker;
use smoketest::ReceiveConfig;

use crate::support::{bodies, broker_client};

fn concurrent_exchange(address: &str, messages: &[&str]) -> (usize, Vec<String>, InMemoryBroker) {
    let broker = InMemoryBroker::new();
    let client = broker_client(&broker);
    let (ready_tx, ready_rx) = mpsc::channel();

    let receiver = client.clone();
    let recv_address = address.to_string();
    let expected = messages.len();
    let handle = thread::spawn(move || {
        receiver.recv_messages_with(
            &recv_address,
            expected,
            ReceiveConfig::default().on_ready(move || ready_tx.send(()).unwrap()),
        )
    });

    ready_rx.recv().unwrap();
    let sent = client
        .send_messages(address, messages.iter().copied())
        .unwrap();
    let received = handle.join().unwrap().unwrap();
    (sent, received, broker)
}

#[test]
fn queue_round_trip_preserves_order() {
    let (sent, received, broker) = concurrent_exchange("orders", &["a", "b", "c"]);

    assert_eq!(sent, 3);
    assert_eq!(received.len(), 3);
    assert_eq!(bodies(&received), vec!["a", "b", "c"]);
    assert_eq!(broker.depth("orders"), 0);
    assert_eq!(broker.open_connections(), 0);
}

#[test]
fn topic_round_trip_preserves_order() {
    let (sent, received, _) = concurrent_exchange("events", &["a", "b", "c"]);

    assert_eq!(sent, 3);
    assert_eq!(bodies(&received), vec!["a", "b", "c"]);
}

#[test]
fn larger_batch_round_trip() {
    let messages: Vec<String> = (1..=200).map(|i| format!("payload-{}", i)).collect();
    let refs: Vec<&str> = messages.iter().map(String::as_str).collect();

    let (sent, received, broker) = concurrent_exchange("orders", &refs);

    assert_eq!(sent, 200);
    assert_eq!(bodies(&received), messages);
    assert_eq!(broker.connections_opened(), 2);
    assert_eq!(broker.connections_closed(), 2);
}

#[test]
fn sequential_send_then_receive() {
    let broker = InMemoryBroker::new();
    let client = broker_client(&broker);

    assert_eq!(client.send_messages("orders", ["a", "b", "c"]).unwrap(), 3);
    let received = client.recv_messages("orders", 3).unwrap();

    assert_eq!(bodies(&received), vec!["a", "b", "c"]);
}
