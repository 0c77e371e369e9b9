//! AlertSink port.

use crate::domain::FailureRecord;

/// Receives a record once it has exhausted its retries.
///
/// Fire-and-forget: implementations must not block for long and must never
/// panic back into the tracker. Delivery failures are the sink's problem.
pub trait AlertSink: Send + Sync {
    fn send_alert(&self, record: &FailureRecord);
}
