//! State machines for tasks and worker loops.

use serde::{Deserialize, Serialize};

/// Task state.
///
/// Transitions (per submission):
/// - NotStarted -> Processing -> Completed
/// - NotStarted -> Processing -> Failed
///
/// A resubmitted task goes back to Processing when the loop picks it up again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    #[default]
    NotStarted,
    Processing,
    Completed,
    Failed,
}

impl TaskState {
    /// Completed or Failed: waiters can stop waiting.
    pub fn is_settled(self) -> bool {
        matches!(self, TaskState::Completed | TaskState::Failed)
    }
}

/// Worker loop state.
///
/// Idle -> Running -> Stopping -> Drained
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoopState {
    /// Not started yet.
    Idle,

    /// Loop thread is taking submissions.
    Running,

    /// Stop was requested; the loop is draining what is queued.
    Stopping,

    /// Loop thread has returned.
    Drained,
}
