//! Task runner: single-flight execution of one unit of work.
//!
//! Lifecycle of `run()`:
//! 1. lock `task:<id>` for this invocation; on contention record `failed` and
//!    return `LOCK_CONTENTION` without touching the body
//! 2. record `running`
//! 3. execute the body; a returned error and a panic both become a
//!    `TaskError`
//! 4. release the lock, whatever happened in 3
//! 5. record the terminal status
//!
//! Status writes are best-effort: failures are logged and dropped, and the
//! runner works with no store at all.

mod unit;

pub use self::unit::{FnUnit, UnitOfWork, unit_fn};

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use serde::{Deserialize, Serialize};
use tracing::{Instrument, debug, error, info, warn};

use crate::domain::{RunId, RunnerId, StoreError, Task, TaskError, TaskId, TaskPatch};
use crate::lock::{LockError, LockManager};
use crate::observability::{RunnerCounters, RunnerStats};
use crate::ports::{Clock, IdGenerator, SystemClock, TaskStore, UlidGenerator};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunnerConfig {
    /// How long a task lock lives if its holder never releases it.
    pub lock_ttl_ms: u64,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            lock_ttl_ms: 300_000,
        }
    }
}

impl RunnerConfig {
    pub fn with_lock_ttl(mut self, ttl: Duration) -> Self {
        self.lock_ttl_ms = ttl.as_millis() as u64;
        self
    }

    pub fn lock_ttl(&self) -> Duration {
        Duration::from_millis(self.lock_ttl_ms)
    }
}

pub struct TaskRunner {
    runner_id: RunnerId,
    locks: LockManager,
    store: Option<Arc<dyn TaskStore>>,
    clock: Arc<dyn Clock>,
    ids: Arc<dyn IdGenerator>,
    config: RunnerConfig,
    counters: RunnerCounters,
}

impl TaskRunner {
    /// Runner with no persistence, the wall clock and ULID ids.
    pub fn new(locks: LockManager) -> Self {
        Self::with_ids(locks, Arc::new(UlidGenerator::new(SystemClock)))
    }

    pub fn with_ids(locks: LockManager, ids: Arc<dyn IdGenerator>) -> Self {
        Self {
            runner_id: ids.generate_runner_id(),
            locks,
            store: None,
            clock: Arc::new(SystemClock),
            ids,
            config: RunnerConfig::default(),
            counters: RunnerCounters::default(),
        }
    }

    pub fn with_store(mut self, store: Arc<dyn TaskStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_config(mut self, config: RunnerConfig) -> Self {
        self.config = config;
        self
    }

    pub fn runner_id(&self) -> RunnerId {
        self.runner_id
    }

    pub fn stats(&self) -> RunnerStats {
        self.counters.snapshot()
    }

    /// Run `unit` against `task` at most once concurrently per task id.
    ///
    /// Never panics and never propagates a panic from the body: every
    /// failure comes back as a [`TaskError`].
    pub async fn run<U>(&self, unit: &U, task: &Task<U::Payload>) -> Result<U::Output, TaskError>
    where
        U: UnitOfWork + ?Sized,
        U::Output: Serialize,
    {
        let run_id = self.ids.generate_run_id();
        let span = tracing::info_span!(
            "task_run",
            task_id = %task.id,
            agent = unit.name(),
            run_id = %run_id,
        );
        self.run_inner(unit, task, run_id).instrument(span).await
    }

    async fn run_inner<U>(
        &self,
        unit: &U,
        task: &Task<U::Payload>,
        run_id: RunId,
    ) -> Result<U::Output, TaskError>
    where
        U: UnitOfWork + ?Sized,
        U::Output: Serialize,
    {
        self.counters.record_run();
        let key = task.id.lock_key();
        // owner is per invocation, so concurrent runs on one runner contend too
        let owner = format!("{}/{}", self.runner_id, run_id);

        if let Err(err) = self.locks.acquire(&key, &owner, self.config.lock_ttl()).await {
            let message = match &err {
                LockError::AlreadyLocked { holder, .. } => {
                    format!("task {} is already running (held by {holder})", task.id)
                }
                other => format!("could not lock task {}: {other}", task.id),
            };
            debug!(lock = %key, code = err.code(), "task lock not acquired");
            self.counters.record_contention();
            self.persist(&task.id, TaskPatch::failed(self.clock.now(), message.clone()))
                .await;
            return Err(TaskError::lock_contention(unit.name(), message));
        }

        self.persist(&task.id, TaskPatch::running(self.clock.now()))
            .await;

        let outcome = AssertUnwindSafe(unit.execute(&task.payload))
            .catch_unwind()
            .await
            .map_err(|panic| panic_message(&*panic));

        self.locks.release(&key, &owner).await;

        let result = match outcome {
            Ok(Ok(output)) => {
                self.counters.record_completed();
                info!("task completed");
                Ok(output)
            }
            Ok(Err(body)) => {
                self.counters.record_failed();
                info!(error = %body, retryable = body.retryable, "task failed");
                Err(TaskError::body(unit.name(), body))
            }
            Err(panic) => {
                self.counters.record_failed();
                self.counters.record_panic();
                error!(panic = %panic, "task body panicked");
                Err(TaskError::unexpected(unit.name(), panic))
            }
        };

        let now = self.clock.now();
        let patch = match &result {
            Ok(output) => {
                let value = serde_json::to_value(output)
                    .inspect_err(|err| {
                        warn!(error = %err, "task output not serializable, stored without output")
                    })
                    .ok();
                TaskPatch::completed(now, value)
            }
            Err(err) => TaskPatch::failed(now, err.message.clone()),
        };
        self.persist(&task.id, patch).await;

        result
    }

    // 書き込み失敗はログだけ残して握りつぶす（実行結果には影響させない）
    async fn persist(&self, task_id: &TaskId, patch: TaskPatch) {
        let Some(store) = &self.store else {
            return;
        };
        match store.update(task_id, patch).await {
            Ok(()) => {}
            Err(StoreError::NotFound(_)) => {
                debug!(task_id = %task_id, "no task record to update");
            }
            Err(err) => {
                warn!(task_id = %task_id, error = %err, "task status write failed");
            }
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unit of work panicked".to_string()
    }
}
