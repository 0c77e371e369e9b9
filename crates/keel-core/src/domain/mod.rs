//! Domain model: ids, task records, locks, failure records and errors.

pub mod errors;
pub mod failure;
pub mod ids;
pub mod lock;
pub mod task;

pub use self::errors::{BodyError, CallError, ErrorKind, Retryable, StoreError, TaskError};
pub use self::failure::{FailureRecord, LastError};
pub use self::ids::{RunId, RunnerId};
pub use self::lock::Lock;
pub use self::task::{Task, TaskId, TaskPatch, TaskRecord, TaskStatus};
