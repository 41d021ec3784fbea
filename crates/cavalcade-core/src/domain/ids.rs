//! Strongly-typed identifiers.
//!
//! Every id wraps a ULID, so ids sort by creation time and can be generated
//! from any thread without coordination. The marker type parameter keeps a
//! `TaskId` from being mixed up with a `ManagerId` at compile time.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::marker::PhantomData;
use ulid::Ulid;

/// Marker trait for id kinds. Provides the display prefix.
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
    /// Fresh id from the current time and random bits.
    pub fn generate() -> Self {
        Self::from_ulid(Ulid::new())
    }

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
pub enum TaskMarker {}

impl IdMarker for TaskMarker {
    fn prefix() -> &'static str {
        "task-"
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ManagerMarker {}

impl IdMarker for ManagerMarker {
    fn prefix() -> &'static str {
        "manager-"
    }
}

/// Identity of a task (and of the graph node built around it).
pub type TaskId = Id<TaskMarker>;

/// Identity of a manager.
pub type ManagerId = Id<ManagerMarker>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_uses_kind_prefix() {
        let task = TaskId::generate();
        let manager = ManagerId::generate();

        assert!(task.to_string().starts_with("task-"));
        assert!(manager.to_string().starts_with("manager-"));
    }

    #[test]
    fn generated_ids_are_unique() {
        let a = TaskId::generate();
        let b = TaskId::generate();
        assert_ne!(a, b);
    }

    #[test]
    fn id_is_the_size_of_a_ulid() {
        use std::mem::size_of;
        assert_eq!(size_of::<TaskId>(), size_of::<Ulid>());
        assert_eq!(size_of::<ManagerId>(), 16);
    }

    #[test]
    fn ids_survive_json() {
        let id = TaskId::generate();
        let s = serde_json::to_string(&id).unwrap();
        let back: TaskId = serde_json::from_str(&s).unwrap();
        assert_eq!(id, back);
    }
}
