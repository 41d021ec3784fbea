//! Task - a unit of deferred work.
//!
//! A [`Task`] binds a callable to arguments, an optional completion callback
//! and the [`Manager`] that will run it. Submitting a task enqueues it and
//! hands back the task's single [`ResultHandle`].
//!
//! Resubmitting the same task reuses its state: the latest run overwrites
//! the previous result. Do not rely on a handle staying meaningful while the
//! same task is queued again.

mod builder;
mod completion;
mod handle;

pub use self::builder::{TaskBuilder, event};
pub use self::handle::ResultHandle;

use std::any::Any;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::callable::Callable;
use crate::domain::{Args, CavalcadeError, Failure, TaskId, TaskState};
use crate::manager::Manager;

use self::completion::Completion;

/// Completion callback with its own bound arguments.
#[derive(Clone)]
pub(crate) struct Callback {
    pub(crate) callable: Arc<dyn Callable>,
    pub(crate) args: Args,
}

pub(crate) struct TaskInner {
    id: TaskId,
    name: String,
    callable: Arc<dyn Callable>,
    bound: Args,
    callback: Option<Callback>,
    manager: Manager,
    completion: Completion,
}

/// Cheap-to-clone handle; clones share identity and state.
#[derive(Clone)]
pub struct Task {
    inner: Arc<TaskInner>,
}

impl Task {
    pub const DEFAULT_NAME: &'static str = "Task";

    pub fn builder(callable: Arc<dyn Callable>) -> TaskBuilder {
        TaskBuilder::new(callable)
    }

    pub(crate) fn from_parts(
        name: String,
        callable: Arc<dyn Callable>,
        bound: Args,
        callback: Option<Callback>,
        manager: Manager,
    ) -> Self {
        Self {
            inner: Arc::new(TaskInner {
                id: TaskId::generate(),
                name,
                callable,
                bound,
                callback,
                manager,
                completion: Completion::default(),
            }),
        }
    }

    pub fn id(&self) -> TaskId {
        self.inner.id
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn manager(&self) -> &Manager {
        &self.inner.manager
    }

    /// Arguments bound at construction.
    pub fn bound_args(&self) -> &Args {
        &self.inner.bound
    }

    pub(crate) fn callable(&self) -> &Arc<dyn Callable> {
        &self.inner.callable
    }

    pub(crate) fn callback(&self) -> Option<&Callback> {
        self.inner.callback.as_ref()
    }

    /// Enqueue this task on its manager. Never blocks.
    ///
    /// `args` are appended after the bound positional arguments; bound
    /// keyword arguments win over submitted ones with the same name.
    pub fn submit(&self, args: Args) -> ResultHandle {
        self.inner.manager.enqueue(self.clone(), args);
        self.handle()
    }

    /// Submit with no extra arguments.
    pub fn call(&self) -> ResultHandle {
        self.submit(Args::new())
    }

    /// The task's result handle. Always the same handle for a given task.
    pub fn handle(&self) -> ResultHandle {
        ResultHandle::new(self.clone())
    }

    pub fn state(&self) -> TaskState {
        self.inner.completion.state()
    }

    pub fn is_processing(&self) -> bool {
        self.state() == TaskState::Processing
    }

    pub fn is_completed(&self) -> bool {
        self.state() == TaskState::Completed
    }

    pub fn is_failed(&self) -> bool {
        self.state() == TaskState::Failed
    }

    /// How many times the worker loop has started this task.
    pub fn runs(&self) -> u64 {
        self.inner.completion.lock().runs
    }

    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.inner.completion.lock().started_at
    }

    pub fn finished_at(&self) -> Option<DateTime<Utc>> {
        self.inner.completion.lock().finished_at
    }

    /// Block the calling thread until the task completes or fails.
    ///
    /// Never call this from the manager's own loop thread: the loop would
    /// wait on itself.
    pub fn block_until_done(&self) {
        let _ = self.inner.completion.wait_blocking();
    }

    /// Like [`Task::block_until_done`] with an upper bound. Returns whether
    /// the task settled in time.
    pub fn block_until_done_timeout(&self, timeout: Duration) -> bool {
        self.inner
            .completion
            .wait_blocking_timeout(timeout)
            .is_some()
    }

    pub(crate) fn completion(&self) -> &Completion {
        &self.inner.completion
    }

    /// Mark the task failed without running it.
    pub(crate) fn reject(&self, reason: &CavalcadeError) {
        let failure = Failure::new(self.id(), self.name(), reason.to_string());
        self.inner.completion.fail(failure);
    }

    /// Run the task once. Only the worker loop calls this.
    ///
    /// The task stays processing while its callback runs and completes once
    /// the callback returns. A failing callback is reported but still leaves
    /// the task completed with the callable's result.
    pub(crate) async fn execute(&self, args: Args) -> Result<(), CavalcadeError> {
        let merged = Args::merge(&self.inner.bound, args);
        let completion = &self.inner.completion;
        completion.begin();

        let value = match run_contained(Arc::clone(&self.inner.callable), merged).await {
            Ok(value) => value,
            Err((reason, panicked)) => {
                let mut failure = Failure::new(self.id(), self.name(), reason);
                if panicked {
                    failure = failure.panicked();
                }
                completion.fail(failure.clone());
                return Err(CavalcadeError::TaskFailed(failure));
            }
        };

        let callback = match &self.inner.callback {
            Some(callback) => {
                run_contained(Arc::clone(&callback.callable), callback.args.clone()).await
            }
            None => Ok(Value::Null),
        };
        completion.complete(value);

        callback
            .map(|_| ())
            .map_err(|(reason, _)| CavalcadeError::CallbackFailed {
                task_id: self.id(),
                task: self.name().to_string(),
                reason,
            })
    }
}

/// Run a callable on its own tokio task so a panic is caught instead of
/// taking the worker loop down. The caller awaits it immediately, so tasks
/// of one loop still never overlap.
async fn run_contained(
    callable: Arc<dyn Callable>,
    args: Args,
) -> Result<Value, (String, bool)> {
    let joined = tokio::spawn(async move { callable.call(args).await }).await;
    match joined {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(err)) => Err((format!("{err:#}"), false)),
        Err(join_err) if join_err.is_panic() => Err((panic_message(join_err.into_panic()), true)),
        Err(join_err) => Err((join_err.to_string(), false)),
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

impl PartialEq for Task {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for Task {}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("id", &self.inner.id)
            .field("name", &self.inner.name)
            .field("state", &self.state())
            .field("manager", &self.inner.manager.name())
            .finish()
    }
}
