use tracing::info;

use crate::bus::{Connection, DeliveryOptions, Destination, TextMessage};
use crate::ClientError;

/// Send `messages` in order on one producer, tagging each with its 1-based
/// position as correlation id. Stops at the first failure.
pub(crate) fn send_all<I, S>(
    connection: &mut dyn Connection,
    destination: &Destination,
    messages: I,
) -> Result<usize, ClientError>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let mut session = connection.create_session()?;
    let mut producer = session.create_producer(destination)?;
    let options = DeliveryOptions::non_persistent();

    let mut sent = 0usize;
    for body in messages {
        let correlation_id = (sent + 1).to_string();
        info!(destination = %destination, correlation_id = %correlation_id, "sending message");
        producer.send(
            TextMessage::new(body).with_correlation_id(correlation_id),
            &options,
        )?;
        sent += 1;
    }
    Ok(sent)
}
