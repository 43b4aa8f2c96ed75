//! Connect within a bound, and release on every exit path.

use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::bus::{Connection, ConnectionFactory};
use crate::ClientError;

/// Open a connection within `timeout` and start it.
///
/// No retry beyond what the factory does within the bound: lookup, connect
/// and start failures reach the caller as-is.
pub(crate) fn connect(
    factory: &dyn ConnectionFactory,
    timeout: Duration,
) -> Result<Box<dyn Connection>, ClientError> {
    let endpoint = factory.endpoint();
    info!(endpoint = %endpoint, ?timeout, "creating connection");

    let started_at = Instant::now();
    let mut connection = factory.connect(timeout)?;
    match connection.start() {
        Ok(()) => {
            debug!(endpoint = %endpoint, elapsed = ?started_at.elapsed(), "connection started");
            Ok(connection)
        }
        Err(err) => release(connection, Err(err)),
    }
}

/// Close `connection`, then hand back `result`.
///
/// If both the operation and the close fail, the operation error wins and
/// the close error is logged.
pub(crate) fn release<T>(
    mut connection: Box<dyn Connection>,
    result: Result<T, ClientError>,
) -> Result<T, ClientError> {
    let closed = connection.close();
    match (result, closed) {
        (Ok(value), Ok(())) => Ok(value),
        (Ok(_), Err(close_err)) => Err(close_err),
        (Err(err), Ok(())) => Err(err),
        (Err(err), Err(close_err)) => {
            warn!(error = %close_err, "closing connection after failure also failed");
            Err(err)
        }
    }
}
