//! Domain model (ids, arguments, state, outcomes, errors).
//!
//! Nothing in here knows about threads or queues; the manager and task
//! modules build on these types.

pub mod args;
pub mod errors;
pub mod ids;
pub mod outcome;
pub mod state;

pub use self::args::Args;
pub use self::errors::CavalcadeError;
pub use self::ids::{ManagerId, TaskId};
pub use self::outcome::{Failure, Outcome};
pub use self::state::{LoopState, TaskState};
