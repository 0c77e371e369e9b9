//! Alert sinks for records that ran out of retries.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{error, warn};

use crate::domain::FailureRecord;
use crate::ports::AlertSink;

/// Body of an outbound alert (e.g. a chat webhook message).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlertPayload {
    pub text: String,
    pub resource_key: String,
    pub attempts: u32,
    pub last_error: String,
    pub last_attempt_at: DateTime<Utc>,
}

impl AlertPayload {
    pub fn from_record(record: &FailureRecord) -> Self {
        Self {
            text: format!(
                "{} failed {} times; giving up automatic retries. Last error: {}",
                record.resource_key, record.attempts, record.last_error.message
            ),
            resource_key: record.resource_key.clone(),
            attempts: record.attempts,
            last_error: record.last_error.message.clone(),
            last_attempt_at: record.last_attempt_at,
        }
    }
}

/// Logs alerts at error level.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingAlertSink;

impl AlertSink for TracingAlertSink {
    fn send_alert(&self, record: &FailureRecord) {
        error!(
            resource_key = %record.resource_key,
            attempts = record.attempts,
            last_error = %record.last_error.message,
            "retry ceiling reached"
        );
    }
}

/// Hands alerts to a consumer task that owns the real transport.
///
/// Uses `try_send`, so a full or closed channel drops the alert (with a
/// warning) instead of stalling the tracker.
#[derive(Debug, Clone)]
pub struct ChannelAlertSink {
    tx: mpsc::Sender<AlertPayload>,
}

impl ChannelAlertSink {
    pub fn new(tx: mpsc::Sender<AlertPayload>) -> Self {
        Self { tx }
    }

    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<AlertPayload>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self::new(tx), rx)
    }
}

impl AlertSink for ChannelAlertSink {
    fn send_alert(&self, record: &FailureRecord) {
        if let Err(err) = self.tx.try_send(AlertPayload::from_record(record)) {
            warn!(resource_key = %record.resource_key, error = %err, "alert dropped");
        }
    }
}
