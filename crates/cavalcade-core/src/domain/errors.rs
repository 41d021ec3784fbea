use thiserror::Error;

use super::ids::TaskId;
use super::outcome::Failure;

#[derive(Debug, Error)]
pub enum CavalcadeError {
    /// A dependency node was built without a graph.
    #[error("graph cannot be None: a node needs a graph to register into")]
    MissingGraph,

    #[error("manager {0} is already started")]
    AlreadyStarted(String),

    #[error("the shared manager is already installed")]
    SharedAlreadyInstalled,

    #[error("argument {slot}: {reason}")]
    Argument { slot: String, reason: String },

    #[error("{0}")]
    TaskFailed(Failure),

    /// A callback failed after its task completed.
    #[error("callback of {task} ({task_id}) failed: {reason}")]
    CallbackFailed {
        task_id: TaskId,
        task: String,
        reason: String,
    },

    #[error("{task} ({task_id}) was never run: the worker loop terminated")]
    Abandoned { task_id: TaskId, task: String },

    #[error("{task} ({task_id}) was submitted after the worker loop exited")]
    ManagerStopped { task_id: TaskId, task: String },

    #[error("input {input} of node {node} has not completed")]
    InputPending { node: TaskId, input: TaskId },

    #[error("invalid manager config: {0}")]
    Config(#[from] serde_json::Error),

    #[error("invalid manager config: {0}")]
    InvalidConfig(String),

    #[error("worker runtime: {0}")]
    Runtime(#[from] std::io::Error),

    #[error("worker loop thread panicked")]
    LoopPanicked,
}
