//! Impls - in-process implementations of the ports.
//!
//! Enough to run a single instance and to test against. A deployment with
//! several instances plugs a shared store (Redis, Postgres) into the same
//! ports instead.

pub mod alert;
pub mod inmem_failure_store;
pub mod inmem_lock;
pub mod inmem_task_store;

pub use self::alert::{AlertPayload, ChannelAlertSink, TracingAlertSink};
pub use self::inmem_failure_store::InMemoryFailureStore;
pub use self::inmem_lock::InMemoryLockStore;
pub use self::inmem_task_store::{InMemoryTaskStore, NoopTaskStore};
