//! What a result handle reports.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::ids::TaskId;

/// Record of a failed execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Failure {
    pub task_id: TaskId,
    pub task: String,
    pub reason: String,

    /// The callable panicked instead of returning an error.
    #[serde(default)]
    pub panicked: bool,
}

impl Failure {
    pub fn new(task_id: TaskId, task: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            task_id,
            task: task.into(),
            reason: reason.into(),
            panicked: false,
        }
    }

    pub fn panicked(mut self) -> Self {
        self.panicked = true;
        self
    }
}

impl std::fmt::Display for Failure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.panicked {
            write!(f, "{} ({}) panicked: {}", self.task, self.task_id, self.reason)
        } else {
            write!(f, "{} ({}) failed: {}", self.task, self.task_id, self.reason)
        }
    }
}

/// Non-blocking view of a task's result.
///
/// `Pending` is its own variant, so a legitimately null or falsy result
/// (`Completed(Value::Null)`) is never mistaken for "not ready".
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Pending,
    Completed(Value),
    Failed(Failure),
}

impl Outcome {
    pub fn is_pending(&self) -> bool {
        matches!(self, Outcome::Pending)
    }

    /// The completed value, if any.
    pub fn completed(self) -> Option<Value> {
        match self {
            Outcome::Completed(v) => Some(v),
            _ => None,
        }
    }
}
