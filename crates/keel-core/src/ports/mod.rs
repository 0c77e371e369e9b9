//! Ports - collaborator interfaces injected into the core.
//!
//! The lock manager, task runner and failure tracker never own global state;
//! they are handed one of these and work the same against an in-memory map
//! or a shared external store.

pub mod alert_sink;
pub mod clock;
pub mod failure_store;
pub mod id_generator;
pub mod lock_store;
pub mod task_store;

pub use self::alert_sink::AlertSink;
pub use self::clock::{Clock, ManualClock, SystemClock, deadline};
pub use self::failure_store::FailureStore;
pub use self::id_generator::{IdGenerator, UlidGenerator};
pub use self::lock_store::{CasOutcome, LockStore};
pub use self::task_store::TaskStore;
