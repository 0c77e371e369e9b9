use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use super::FailureTracker;
use crate::domain::{FailureRecord, Retryable};

/// Background loop running [`FailureTracker::run_retry_cycle`] on a fixed
/// interval.
/// - the first cycle runs immediately
/// - `request_shutdown` stops it between cycles; an in-flight cycle finishes
/// - 実行中の publish は強制キャンセルしない（cycle の途中で止めると attempts がずれる）
pub struct RetryLoop {
    shutdown_tx: watch::Sender<bool>,
    join: JoinHandle<()>,
}

impl RetryLoop {
    pub fn spawn<F, Fut, E>(tracker: Arc<FailureTracker>, interval: Duration, publish: F) -> Self
    where
        F: FnMut(FailureRecord) -> Fut + Send + 'static,
        Fut: Future<Output = Result<(), E>> + Send + 'static,
        E: Retryable + fmt::Display + Send + 'static,
    {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let join = tokio::spawn(retry_loop(tracker, interval, publish, shutdown_rx));
        Self { shutdown_tx, join }
    }

    pub fn request_shutdown(&self) {
        // receiver may already be gone if the loop exited
        let _ = self.shutdown_tx.send(true);
    }

    pub async fn shutdown_and_join(self) {
        self.request_shutdown();
        if let Err(err) = self.join.await {
            warn!(error = %err, "retry loop ended abnormally");
        }
    }
}

async fn retry_loop<F, Fut, E>(
    tracker: Arc<FailureTracker>,
    interval: Duration,
    mut publish: F,
    mut shutdown_rx: watch::Receiver<bool>,
) where
    F: FnMut(FailureRecord) -> Fut + Send + 'static,
    Fut: Future<Output = Result<(), E>> + Send + 'static,
    E: Retryable + fmt::Display + Send + 'static,
{
    let mut ticker = tokio::time::interval(interval.max(Duration::from_millis(1)));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        if *shutdown_rx.borrow() {
            break;
        }

        // tick 待ちは shutdown と競合させる
        tokio::select! {
            changed = shutdown_rx.changed() => {
                if changed.is_err() {
                    // sender dropped with the handle
                    break;
                }
                continue;
            }
            _ = ticker.tick() => {}
        }

        match tracker.run_retry_cycle(&mut publish).await {
            Ok(report) if report.attempted > 0 => info!(
                attempted = report.attempted,
                succeeded = report.succeeded,
                failed = report.failed,
                alerted = report.alerted,
                "retry cycle finished"
            ),
            Ok(_) => debug!("retry cycle found nothing due"),
            Err(err) => warn!(error = %err, "retry cycle aborted"),
        }
    }
    debug!("retry loop stopped");
}
