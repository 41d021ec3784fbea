//! ResultHandle - the caller's view of a task's eventual result.

use std::fmt;
use std::time::Duration;

use serde_json::Value;

use super::Task;
use super::completion::Settled;
use crate::domain::{CavalcadeError, Outcome};

/// Handle to the result of a [`Task`].
///
/// Every task has exactly one handle identity; `Task::handle` and
/// `Task::submit` always return (clones of) the same one.
///
/// Waiting methods must be called from a thread other than the loop that
/// runs the task.
#[derive(Clone)]
pub struct ResultHandle {
    task: Task,
}

impl ResultHandle {
    pub(crate) fn new(task: Task) -> Self {
        Self { task }
    }

    /// The task that owns this handle.
    pub fn task(&self) -> &Task {
        &self.task
    }

    /// Non-blocking check. `Outcome::Pending` until the task settles.
    pub fn poll(&self) -> Outcome {
        self.task.completion().outcome()
    }

    pub fn is_pending(&self) -> bool {
        self.poll().is_pending()
    }

    /// Wait for the result without blocking the thread.
    pub async fn wait(&self) -> Result<Value, CavalcadeError> {
        settle(self.task.completion().wait().await)
    }

    /// Block the calling thread until the result is available.
    pub fn resolve(&self) -> Result<Value, CavalcadeError> {
        settle(self.task.completion().wait_blocking())
    }

    /// Like [`ResultHandle::resolve`]; `None` if the task did not settle in time.
    pub fn resolve_timeout(&self, timeout: Duration) -> Option<Result<Value, CavalcadeError>> {
        self.task
            .completion()
            .wait_blocking_timeout(timeout)
            .map(settle)
    }

    /// Drive [`ResultHandle::wait`] to completion on `runtime`.
    ///
    /// `runtime` must not be the manager's own runtime, and this must not
    /// be called from inside an async context.
    pub fn resolve_on(
        &self,
        runtime: &tokio::runtime::Runtime,
    ) -> Result<Value, CavalcadeError> {
        runtime.block_on(self.wait())
    }

    /// Last stored raw result, whatever the current state.
    ///
    /// `None` before the first completion. Unlike [`ResultHandle::poll`],
    /// this cannot tell a stale result from a fresh one.
    pub fn value(&self) -> Option<Value> {
        self.task.completion().lock().output.clone()
    }
}

fn settle(settled: Settled) -> Result<Value, CavalcadeError> {
    settled.map_err(CavalcadeError::TaskFailed)
}

impl PartialEq for ResultHandle {
    fn eq(&self, other: &Self) -> bool {
        self.task == other.task
    }
}

impl Eq for ResultHandle {}

impl fmt::Debug for ResultHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResultHandle")
            .field("task", &self.task.id())
            .field("outcome", &self.poll())
            .finish()
    }
}

impl fmt::Display for ResultHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let task = &self.task;
        match self.poll() {
            Outcome::Pending => write!(f, "<{} ({}) is still pending completion>", task.name(), task.id()),
            Outcome::Completed(v) => write!(f, "<{} ({}) output {}>", task.name(), task.id(), v),
            Outcome::Failed(failure) => write!(f, "<{}>", failure),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::callable;
    use crate::domain::Args;
    use crate::manager::{Manager, ManagerConfig};
    use serde_json::json;

    fn task_returning(value: Value) -> Task {
        Task::builder(callable::constant(value))
            .name("answer")
            .manager(&Manager::new(ManagerConfig::default()))
            .build()
    }

    #[test]
    fn pending_before_execution() {
        let task = task_returning(json!(0));
        let handle = task.handle();

        assert!(handle.is_pending());
        assert_eq!(handle.value(), None);
        assert!(handle.resolve_timeout(Duration::from_millis(10)).is_none());
        assert!(handle.to_string().contains("still pending completion"));
    }

    #[tokio::test]
    async fn falsy_result_is_not_pending() {
        let task = task_returning(json!(false));
        task.execute(Args::new()).await.unwrap();

        let handle = task.handle();
        assert_eq!(handle.poll(), Outcome::Completed(json!(false)));
        assert_eq!(handle.wait().await.unwrap(), json!(false));
        assert!(handle.to_string().contains("output false"));
    }

    #[test]
    fn resolve_on_caller_runtime() {
        let task = task_returning(json!("hi"));
        let worker = {
            let task = task.clone();
            std::thread::spawn(move || {
                let rt = tokio::runtime::Builder::new_current_thread()
                    .enable_all()
                    .build()
                    .unwrap();
                rt.block_on(task.execute(Args::new())).unwrap();
            })
        };

        let caller = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        assert_eq!(task.handle().resolve_on(&caller).unwrap(), json!("hi"));
        worker.join().unwrap();
    }

    #[tokio::test]
    async fn wait_surfaces_failure() {
        let task = Task::builder(callable::from_fn(|_| anyhow::bail!("nope")))
            .manager(&Manager::new(ManagerConfig::default()))
            .build();
        let _ = task.execute(Args::new()).await;

        let err = task.handle().wait().await.unwrap_err();
        assert!(matches!(err, CavalcadeError::TaskFailed(_)));
        assert!(task.handle().resolve().is_err());
    }
}
