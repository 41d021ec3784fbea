//! Completion cell shared between a task and its result handle.
//!
//! Blocking waiters park on the condvar, async waiters on the `Notify`.
//! Both are woken whenever the task settles.

use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde_json::Value;
use tokio::sync::Notify;

use crate::domain::{Failure, Outcome, TaskState};

#[derive(Debug, Default)]
pub(crate) struct Record {
    pub(crate) state: TaskState,
    pub(crate) output: Option<Value>,
    pub(crate) failure: Option<Failure>,
    pub(crate) runs: u64,
    pub(crate) started_at: Option<DateTime<Utc>>,
    pub(crate) finished_at: Option<DateTime<Utc>>,
}

impl Record {
    pub(crate) fn outcome(&self) -> Outcome {
        match self.state {
            TaskState::Completed => Outcome::Completed(self.output.clone().unwrap_or(Value::Null)),
            TaskState::Failed => match &self.failure {
                Some(f) => Outcome::Failed(f.clone()),
                None => Outcome::Pending,
            },
            TaskState::NotStarted | TaskState::Processing => Outcome::Pending,
        }
    }

    /// `None` while the task has not settled.
    pub(crate) fn settled(&self) -> Option<Settled> {
        match self.outcome() {
            Outcome::Completed(value) => Some(Ok(value)),
            Outcome::Failed(failure) => Some(Err(failure)),
            Outcome::Pending => None,
        }
    }
}

/// Result of a finished run: the output or the failure record.
pub(crate) type Settled = Result<Value, Failure>;

#[derive(Debug, Default)]
pub(crate) struct Completion {
    record: Mutex<Record>,
    settled: Condvar,
    notify: Notify,
}

impl Completion {
    pub(crate) fn lock(&self) -> MutexGuard<'_, Record> {
        self.record.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Processing starts. The previous output stays readable through
    /// `value()` until it is overwritten.
    pub(crate) fn begin(&self) {
        let mut record = self.lock();
        record.state = TaskState::Processing;
        record.failure = None;
        record.runs += 1;
        record.started_at = Some(Utc::now());
        record.finished_at = None;
    }

    pub(crate) fn complete(&self, output: Value) {
        {
            let mut record = self.lock();
            record.state = TaskState::Completed;
            record.output = Some(output);
            record.finished_at = Some(Utc::now());
        }
        self.wake();
    }

    pub(crate) fn fail(&self, failure: Failure) {
        {
            let mut record = self.lock();
            record.state = TaskState::Failed;
            record.failure = Some(failure);
            record.finished_at = Some(Utc::now());
        }
        self.wake();
    }

    fn wake(&self) {
        self.settled.notify_all();
        self.notify.notify_waiters();
    }

    pub(crate) fn state(&self) -> TaskState {
        self.lock().state
    }

    pub(crate) fn outcome(&self) -> Outcome {
        self.lock().outcome()
    }

    /// Block the current thread until the task settles.
    pub(crate) fn wait_blocking(&self) -> Settled {
        let mut record = self.lock();
        loop {
            if let Some(settled) = record.settled() {
                return settled;
            }
            record = self
                .settled
                .wait(record)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// Like `wait_blocking`, giving up after `timeout`.
    pub(crate) fn wait_blocking_timeout(&self, timeout: Duration) -> Option<Settled> {
        let deadline = Instant::now() + timeout;
        let mut record = self.lock();
        loop {
            if let Some(settled) = record.settled() {
                return Some(settled);
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return None;
            }
            record = self
                .settled
                .wait_timeout(record, remaining)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
    }

    /// Wait without blocking the thread.
    pub(crate) async fn wait(&self) -> Settled {
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            // register before checking, so a wake between check and await is not lost
            notified.as_mut().enable();

            let settled = self.lock().settled();
            if let Some(settled) = settled {
                return settled;
            }
            notified.await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::TaskId;
    use serde_json::json;
    use std::sync::Arc;

    #[test]
    fn begin_then_complete() {
        let c = Completion::default();
        assert_eq!(c.state(), TaskState::NotStarted);

        c.begin();
        assert_eq!(c.state(), TaskState::Processing);
        assert!(c.outcome().is_pending());

        c.complete(json!(42));
        assert_eq!(c.outcome(), Outcome::Completed(json!(42)));
        assert_eq!(c.lock().runs, 1);
    }

    #[test]
    fn settled_is_none_until_the_task_finishes() {
        let c = Completion::default();
        assert!(c.lock().settled().is_none());

        c.begin();
        assert!(c.lock().settled().is_none());

        c.complete(Value::Null);
        assert_eq!(c.lock().settled(), Some(Ok(Value::Null)));
    }

    #[test]
    fn blocking_wait_wakes_on_complete() {
        let c = Arc::new(Completion::default());
        let waiter = {
            let c = Arc::clone(&c);
            std::thread::spawn(move || c.wait_blocking())
        };

        std::thread::sleep(Duration::from_millis(20));
        c.begin();
        c.complete(json!("done"));

        assert_eq!(waiter.join().unwrap(), Ok(json!("done")));
    }

    #[test]
    fn blocking_wait_times_out_while_pending() {
        let c = Completion::default();
        assert!(c.wait_blocking_timeout(Duration::from_millis(20)).is_none());
    }

    #[tokio::test]
    async fn async_wait_wakes_on_fail() {
        let c = Arc::new(Completion::default());
        let waiter = {
            let c = Arc::clone(&c);
            tokio::spawn(async move { c.wait().await })
        };

        tokio::task::yield_now().await;
        let failure = Failure::new(TaskId::generate(), "t", "boom");
        c.fail(failure.clone());

        assert_eq!(waiter.await.unwrap(), Err(failure));
    }
}
