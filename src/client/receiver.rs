use tracing::debug;

use super::options::ReadyCallback;
use crate::bus::{Connection, Destination, ReceivedMessage};
use crate::ClientError;

/// Attach one consumer, signal readiness, then block for exactly `count`
/// messages. `count == 0` returns right after the callback.
pub(crate) fn receive_exactly(
    connection: &mut dyn Connection,
    destination: &Destination,
    count: usize,
    on_ready: Option<ReadyCallback>,
) -> Result<Vec<ReceivedMessage>, ClientError> {
    let mut session = connection.create_session()?;
    let mut consumer = session.create_consumer(destination)?;

    debug!(destination = %destination, "consumer attached, invoking ready callback");
    if let Some(on_ready) = on_ready {
        on_ready();
    }

    // grows with arrivals; `count` is caller-supplied and may be huge
    let mut received = Vec::new();
    for _ in 0..count {
        received.push(consumer.receive()?);
        debug!(
            destination = %destination,
            received = received.len(),
            expected = count,
            "message received"
        );
    }
    Ok(received)
}
