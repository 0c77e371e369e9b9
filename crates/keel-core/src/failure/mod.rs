//! Failure tracker: standing registry of failed operations.
//!
//! One [`FailureRecord`] per resource key. Each failure bumps `attempts` and
//! pushes `next_retry_at` out by `base_delay * 2^(attempts - 1)`. A retry
//! cycle re-drives every due record through a caller-supplied publish
//! function; success drops the record, failure tracks it again. The alert
//! sink hears about a key exactly once, when its attempts reach the ceiling.
//!
//! The record map is expected to have a single writer (one scheduling loop).
//! `track_failure` reads then replaces, so two writers on one key may lose
//! an increment.

mod retry_loop;

pub use self::retry_loop::RetryLoop;

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::domain::{FailureRecord, LastError, Retryable, StoreError};
use crate::impls::{InMemoryFailureStore, TracingAlertSink};
use crate::ports::{AlertSink, Clock, FailureStore, SystemClock, deadline};
use crate::retry::backoff;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FailureTrackerConfig {
    /// Attempts at which a key stops being re-driven and is alerted.
    pub max_retries: u32,
    pub base_delay_ms: u64,
}

impl Default for FailureTrackerConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay_ms: 60_000,
        }
    }
}

impl FailureTrackerConfig {
    pub fn new(max_retries: u32, base_delay: Duration) -> Self {
        Self {
            max_retries,
            base_delay_ms: base_delay.as_millis() as u64,
        }
    }

    pub fn base_delay(&self) -> Duration {
        Duration::from_millis(self.base_delay_ms)
    }

    /// Wait after the `attempts`-th failure.
    pub fn delay_after(&self, attempts: u32) -> Duration {
        backoff(self.base_delay(), attempts.saturating_sub(1))
    }
}

/// Outcome of one [`FailureTracker::run_retry_cycle`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryCycleReport {
    pub attempted: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub alerted: usize,
}

pub struct FailureTracker {
    store: Arc<dyn FailureStore>,
    alerts: Arc<dyn AlertSink>,
    clock: Arc<dyn Clock>,
    config: FailureTrackerConfig,
}

impl FailureTracker {
    pub fn new(
        store: Arc<dyn FailureStore>,
        alerts: Arc<dyn AlertSink>,
        clock: Arc<dyn Clock>,
        config: FailureTrackerConfig,
    ) -> Self {
        Self {
            store,
            alerts,
            clock,
            config,
        }
    }

    /// In-memory records, alerts to the log, wall clock.
    pub fn in_memory(config: FailureTrackerConfig) -> Self {
        Self::new(
            Arc::new(InMemoryFailureStore::new()),
            Arc::new(TracingAlertSink),
            Arc::new(SystemClock),
            config,
        )
    }

    pub fn config(&self) -> &FailureTrackerConfig {
        &self.config
    }

    /// Record a failure for `resource_key` and return the updated record.
    pub async fn track_failure(
        &self,
        resource_key: &str,
        error: impl Into<LastError>,
    ) -> Result<FailureRecord, StoreError> {
        let (record, _) = self.record_failure(resource_key, error.into()).await?;
        Ok(record)
    }

    async fn record_failure(
        &self,
        resource_key: &str,
        last_error: LastError,
    ) -> Result<(FailureRecord, bool), StoreError> {
        let attempts = match self.store.get(resource_key).await? {
            Some(previous) => previous.attempts.saturating_add(1),
            None => 1,
        };
        // attempts は減らない / next_retry_at は常にここで導出する
        let now = self.clock.now();
        let record = FailureRecord {
            resource_key: resource_key.to_string(),
            attempts,
            last_error,
            last_attempt_at: now,
            next_retry_at: deadline(now, self.config.delay_after(attempts)),
        };
        self.store.put(record.clone()).await?;

        debug!(
            resource_key,
            attempts,
            next_retry_at = %record.next_retry_at,
            "failure tracked"
        );

        let alerted = attempts == self.config.max_retries;
        if alerted {
            self.alerts.send_alert(&record);
        }
        Ok((record, alerted))
    }

    /// Records that are retryable, under the ceiling, and due at `now`.
    pub async fn retry_eligible(&self, now: DateTime<Utc>) -> Result<Vec<FailureRecord>, StoreError> {
        let max = self.config.max_retries;
        Ok(self
            .store
            .list()
            .await?
            .into_iter()
            .filter(|r| r.last_error.retryable && r.attempts < max && r.is_due(now))
            .collect())
    }

    /// Re-drive every eligible record through `publish`.
    ///
    /// A store failure aborts the cycle; records handled before it keep
    /// their new state.
    pub async fn run_retry_cycle<F, Fut, E>(&self, mut publish: F) -> Result<RetryCycleReport, StoreError>
    where
        F: FnMut(FailureRecord) -> Fut,
        Fut: Future<Output = Result<(), E>>,
        E: Retryable + fmt::Display,
    {
        let mut report = RetryCycleReport::default();
        for record in self.retry_eligible(self.clock.now()).await? {
            report.attempted += 1;
            let key = record.resource_key.clone();
            match publish(record).await {
                Ok(()) => {
                    self.store.remove(&key).await?;
                    report.succeeded += 1;
                    info!(resource_key = %key, "retry succeeded");
                }
                Err(err) => {
                    report.failed += 1;
                    let last_error = LastError::new(err.to_string(), err.is_retryable());
                    let (record, alerted) = self.record_failure(&key, last_error).await?;
                    if alerted {
                        report.alerted += 1;
                    }
                    warn!(
                        resource_key = %key,
                        attempts = record.attempts,
                        error = %err,
                        "retry failed"
                    );
                }
            }
        }
        Ok(report)
    }

    /// Drop the record for `resource_key` after an out-of-band success.
    pub async fn resolve(&self, resource_key: &str) -> Result<Option<FailureRecord>, StoreError> {
        self.store.remove(resource_key).await
    }

    pub async fn get(&self, resource_key: &str) -> Result<Option<FailureRecord>, StoreError> {
        self.store.get(resource_key).await
    }

    pub async fn len(&self) -> Result<usize, StoreError> {
        Ok(self.store.list().await?.len())
    }

    pub async fn clear(&self) -> Result<(), StoreError> {
        self.store.clear().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::CallError;
    use crate::ports::ManualClock;
    use chrono::TimeZone;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingSink {
        alerts: Mutex<Vec<FailureRecord>>,
    }

    impl RecordingSink {
        fn keys(&self) -> Vec<String> {
            self.alerts
                .lock()
                .unwrap()
                .iter()
                .map(|r| r.resource_key.clone())
                .collect()
        }
    }

    impl AlertSink for RecordingSink {
        fn send_alert(&self, record: &FailureRecord) {
            self.alerts.lock().unwrap().push(record.clone());
        }
    }

    struct Fixture {
        tracker: FailureTracker,
        clock: Arc<ManualClock>,
        sink: Arc<RecordingSink>,
    }

    fn fixture() -> Fixture {
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap(),
        ));
        let sink = Arc::new(RecordingSink::default());
        let tracker = FailureTracker::new(
            Arc::new(InMemoryFailureStore::new()),
            sink.clone(),
            clock.clone(),
            FailureTrackerConfig::new(3, Duration::from_secs(60)),
        );
        Fixture {
            tracker,
            clock,
            sink,
        }
    }

    fn transient() -> CallError {
        CallError::from_status(503, "upstream unavailable")
    }

    #[tokio::test]
    async fn backoff_doubles_from_each_attempt() {
        let f = fixture();
        let mut previous = None;
        for n in 1..=5u32 {
            let record = f.tracker.track_failure("x:1", transient()).await.unwrap();
            assert_eq!(record.attempts, n);
            let wait = record.next_retry_at - record.last_attempt_at;
            assert_eq!(wait.num_seconds(), 60 * 2i64.pow(n - 1));
            if let Some(prev) = previous {
                assert!(record.next_retry_at > prev);
            }
            previous = Some(record.next_retry_at);
            f.clock.advance(Duration::from_secs(1));
        }
        assert_eq!(f.tracker.len().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn alert_fires_once_at_ceiling() {
        let f = fixture();
        f.tracker.track_failure("x:1", transient()).await.unwrap();
        f.tracker.track_failure("x:1", transient()).await.unwrap();
        assert!(f.sink.keys().is_empty());

        f.tracker.track_failure("x:1", transient()).await.unwrap();
        assert_eq!(f.sink.keys(), vec!["x:1"]);

        f.tracker.track_failure("x:1", transient()).await.unwrap();
        assert_eq!(f.sink.keys().len(), 1);
    }

    #[tokio::test]
    async fn eligibility_filters() {
        let f = fixture();
        f.tracker.track_failure("due", transient()).await.unwrap();
        f.tracker
            .track_failure("fatal", CallError::from_status(400, "bad request"))
            .await
            .unwrap();
        for _ in 0..3 {
            f.tracker.track_failure("spent", transient()).await.unwrap();
        }

        let now = f.clock.now();
        assert!(f.tracker.retry_eligible(now).await.unwrap().is_empty());

        let later = deadline(now, Duration::from_secs(60));
        let keys: Vec<String> = f
            .tracker
            .retry_eligible(later)
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.resource_key)
            .collect();
        assert_eq!(keys, vec!["due"]);
    }

    #[tokio::test]
    async fn successful_retry_removes_record() {
        let f = fixture();
        f.tracker.track_failure("x:1", transient()).await.unwrap();
        f.clock.advance(Duration::from_secs(60));

        let report = f
            .tracker
            .run_retry_cycle(|_| async { Ok::<(), CallError>(()) })
            .await
            .unwrap();

        assert_eq!(report.attempted, 1);
        assert_eq!(report.succeeded, 1);
        assert!(f.tracker.get("x:1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn failed_retries_climb_to_alert() {
        let f = fixture();
        f.tracker.track_failure("x:1", transient()).await.unwrap();

        f.clock.advance(Duration::from_secs(60));
        let first = f
            .tracker
            .run_retry_cycle(|_| async { Err::<(), _>(transient()) })
            .await
            .unwrap();
        assert_eq!(first.failed, 1);
        assert_eq!(first.alerted, 0);
        assert_eq!(f.tracker.get("x:1").await.unwrap().unwrap().attempts, 2);

        f.clock.advance(Duration::from_secs(120));
        let second = f
            .tracker
            .run_retry_cycle(|_| async { Err::<(), _>(transient()) })
            .await
            .unwrap();
        assert_eq!(second.alerted, 1);
        assert_eq!(f.sink.keys(), vec!["x:1"]);

        f.clock.advance(Duration::from_secs(3600));
        let third = f
            .tracker
            .run_retry_cycle(|_| async { Err::<(), _>(transient()) })
            .await
            .unwrap();
        assert_eq!(third.attempted, 0);
        assert_eq!(f.sink.keys().len(), 1);
    }

    #[tokio::test]
    async fn not_due_records_are_left_alone() {
        let f = fixture();
        f.tracker.track_failure("x:1", transient()).await.unwrap();
        f.clock.advance(Duration::from_secs(59));

        let mut calls = 0;
        let report = f
            .tracker
            .run_retry_cycle(|_| {
                calls += 1;
                async { Ok::<(), CallError>(()) }
            })
            .await
            .unwrap();

        assert_eq!(calls, 0);
        assert_eq!(report, RetryCycleReport::default());
    }

    #[tokio::test]
    async fn resolve_and_clear() {
        let f = fixture();
        f.tracker.track_failure("a", transient()).await.unwrap();
        f.tracker.track_failure("b", transient()).await.unwrap();

        let resolved = f.tracker.resolve("a").await.unwrap().unwrap();
        assert_eq!(resolved.resource_key, "a");
        assert_eq!(f.tracker.len().await.unwrap(), 1);

        f.tracker.clear().await.unwrap();
        assert_eq!(f.tracker.len().await.unwrap(), 0);

        let fresh = f.tracker.track_failure("b", transient()).await.unwrap();
        assert_eq!(fresh.attempts, 1);
    }

    #[test]
    fn config_deserializes_with_defaults() {
        let c: FailureTrackerConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(c, FailureTrackerConfig::default());
        assert_eq!(c.delay_after(3), Duration::from_secs(240));
    }
}
