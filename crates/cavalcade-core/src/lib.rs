//! cavalcade-core
//!
//! Deferred execution for in-process work: wrap a callable in a [`Task`],
//! submit it to a [`Manager`], and observe the result through a
//! [`ResultHandle`].
//!
//! # Modules
//! - **domain**: plain data (ids, args, state, outcome, errors)
//! - **callable**: the `Callable` trait and closure adapters
//! - **task**: `Task`, its builder and its `ResultHandle`
//! - **manager**: the single-consumer worker loop and the shared instance
//! - **graph**: dependency nodes and the `Graph` registry

pub mod callable;
pub mod domain;
pub mod graph;
pub mod manager;
pub mod task;

pub use self::callable::Callable;
pub use self::domain::{
    Args, CavalcadeError, Failure, LoopState, ManagerId, Outcome, TaskId, TaskState,
};
pub use self::graph::{Graph, Input, Node, NodeBuilder};
pub use self::manager::{FailurePolicy, Manager, ManagerConfig};
pub use self::task::{ResultHandle, Task, TaskBuilder, event};
