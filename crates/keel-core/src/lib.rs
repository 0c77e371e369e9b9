//! keel-core
//!
//! Resilient task execution core: keyed single-flight execution, retries
//! with exponential backoff, submit-then-poll for long-running external jobs,
//! and a standing registry of failures to re-drive later.
//!
//! # Modules
//! - **domain**: data model (task, lock, failure record, ids, error taxonomy)
//! - **ports**: injected collaborators (LockStore, TaskStore, FailureStore, AlertSink, Clock, IdGenerator)
//! - **impls**: in-process implementations of the ports
//! - **lock**: `LockManager`
//! - **retry**: `RetryPolicy`, `call_with_retry`
//! - **poll**: `submit_and_poll`, `GenerationProvider`
//! - **runner**: `TaskRunner`, `UnitOfWork`
//! - **failure**: `FailureTracker`, `RetryLoop`
//! - **config**: `CoreConfig`
//! - **observability**: runner counters

pub mod config;
pub mod domain;
pub mod failure;
pub mod impls;
pub mod lock;
pub mod observability;
pub mod poll;
pub mod ports;
pub mod retry;
pub mod runner;

pub use config::{ConfigError, CoreConfig};
pub use domain::{BodyError, CallError, ErrorKind, Retryable, Task, TaskError, TaskId, TaskStatus};
pub use failure::{FailureTracker, FailureTrackerConfig, RetryCycleReport, RetryLoop};
pub use lock::{LockError, LockManager};
pub use observability::RunnerStats;
pub use poll::{ExternalJobId, GenerationProvider, JobStatus, PollConfig, run_provider, submit_and_poll};
pub use retry::{RetryPolicy, call_with_retry};
pub use runner::{RunnerConfig, TaskRunner, UnitOfWork, unit_fn};
