//! Strongly-typed identifiers.
//!
//! Runner and run identities are ULIDs behind a phantom-typed `Id<T>`, so a
//! `RunnerId` can never be passed where a `RunId` is expected. Task
//! identities are caller-chosen strings and live in [`super::task::TaskId`].

use serde::{Deserialize, Serialize};
use std::fmt;
use std::marker::PhantomData;
use ulid::Ulid;

/// Marker trait providing the display prefix of an id type.
pub trait IdMarker: Send + Sync + 'static {
    fn prefix() -> &'static str;
}

#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Id<T: IdMarker> {
    ulid: Ulid,
    #[serde(skip)]
    _marker: PhantomData<T>,
}

impl<T: IdMarker> Id<T> {
    pub fn from_ulid(ulid: Ulid) -> Self {
        Self {
            ulid,
            _marker: PhantomData,
        }
    }

    pub fn as_ulid(&self) -> Ulid {
        self.ulid
    }
}

impl<T: IdMarker> From<Ulid> for Id<T> {
    fn from(ulid: Ulid) -> Self {
        Self::from_ulid(ulid)
    }
}

impl<T: IdMarker> fmt::Display for Id<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", T::prefix(), self.ulid)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Runner {}

impl IdMarker for Runner {
    fn prefix() -> &'static str {
        "runner-"
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Run {}

impl IdMarker for Run {
    fn prefix() -> &'static str {
        "run-"
    }
}

/// Identity of a task runner; prefixes the lock owner of each run.
pub type RunnerId = Id<Runner>;

/// Identity of one `run()` invocation, for log correlation.
pub type RunId = Id<Run>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_uses_type_prefix() {
        let runner = RunnerId::from_ulid(Ulid::new());
        let run = RunId::from_ulid(Ulid::new());

        assert!(runner.to_string().starts_with("runner-"));
        assert!(run.to_string().starts_with("run-"));
    }

    #[test]
    fn ids_serialize_as_plain_ulid() {
        let ulid = Ulid::new();
        let runner: RunnerId = ulid.into();

        let s = serde_json::to_string(&runner).unwrap();
        let back: RunnerId = serde_json::from_str(&s).unwrap();

        assert_eq!(back, runner);
        assert_eq!(back.as_ulid(), ulid);
    }

    #[test]
    fn phantom_marker_is_zero_sized() {
        assert_eq!(std::mem::size_of::<RunnerId>(), std::mem::size_of::<Ulid>());
    }
}
