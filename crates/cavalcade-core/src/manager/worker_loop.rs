//! WorkerLoop - the single consumer of a manager's queue.
//!
//! # Flow
//! 1. Wait for the next submission, a stop request, or an interrupt
//! 2. Run the submission to completion (tasks never overlap)
//! 3. Apply the failure policy to whatever the task returned
//! 4. Once stopping, close the queue and drain what is left

use std::future::{Future, pending};
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::Ordering;

use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, warn};

use super::{FailurePolicy, ManagerShared, Submission};
use crate::domain::CavalcadeError;

type Interrupt = Pin<Box<dyn Future<Output = ()> + Send>>;

/// What one `step` did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Step {
    /// Ran one submission.
    Processed,

    /// Woken by a stop request or an interrupt.
    Signalled,

    /// Nothing can arrive anymore.
    Closed,
}

pub(crate) struct WorkerLoop {
    shared: Arc<ManagerShared>,
    rx: mpsc::UnboundedReceiver<Submission>,
    stop_rx: watch::Receiver<bool>,
    interrupt: Interrupt,
}

impl WorkerLoop {
    pub(crate) fn new(shared: Arc<ManagerShared>, rx: mpsc::UnboundedReceiver<Submission>) -> Self {
        let stop_rx = shared.subscribe_stop();
        let interrupt: Interrupt = if shared.config.handle_interrupt {
            Box::pin(async {
                if let Err(err) = tokio::signal::ctrl_c().await {
                    warn!(error = %err, "cannot listen for interrupts");
                    pending::<()>().await;
                }
            })
        } else {
            Box::pin(pending())
        };

        Self {
            shared,
            rx,
            stop_rx,
            interrupt,
        }
    }

    /// Thread entry point: build the loop's own scheduler and run on it.
    pub(crate) fn run_blocking(mut self) -> Result<(), CavalcadeError> {
        let shared = Arc::clone(&self.shared);
        let runtime = match tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
        {
            Ok(runtime) => runtime,
            Err(err) => {
                error!(manager = %shared.config.name, error = %err, "cannot build worker runtime");
                self.abandon_remaining();
                shared.mark_drained();
                return Err(err.into());
            }
        };

        let result = runtime.block_on(self.run());
        shared.mark_drained();
        result
    }

    async fn run(mut self) -> Result<(), CavalcadeError> {
        info!(
            manager = %self.shared.config.name,
            manager_id = %self.shared.id,
            "worker loop started"
        );

        while !self.is_stopping() {
            match self.step().await {
                Ok(Step::Closed) => break,
                Ok(Step::Processed | Step::Signalled) => {}
                Err(err) => {
                    self.abandon_remaining();
                    return Err(err);
                }
            }
        }

        info!(
            manager = %self.shared.config.name,
            queued = self.shared.queued.load(Ordering::SeqCst),
            "stop requested, draining"
        );

        // closing first means nothing slips in after the last try_recv
        self.rx.close();
        while let Ok(submission) = self.rx.try_recv() {
            if let Err(err) = self.process(submission).await {
                self.abandon_remaining();
                return Err(err);
            }
        }

        info!(manager = %self.shared.config.name, "worker loop drained");
        Ok(())
    }

    fn is_stopping(&self) -> bool {
        *self.stop_rx.borrow()
    }

    /// Wait for one event and handle it. Idle time is spent parked on the
    /// channel, not spinning.
    pub(crate) async fn step(&mut self) -> Result<Step, CavalcadeError> {
        tokio::select! {
            biased;

            () = &mut self.interrupt => {
                info!(manager = %self.shared.config.name, "interrupt received, stopping");
                self.interrupt = Box::pin(pending());
                self.shared.request_stop();
                Ok(Step::Signalled)
            }
            changed = self.stop_rx.changed() => {
                if changed.is_ok() {
                    Ok(Step::Signalled)
                } else {
                    Ok(Step::Closed)
                }
            }
            next = self.rx.recv() => match next {
                Some(submission) => {
                    self.process(submission).await?;
                    Ok(Step::Processed)
                }
                None => Ok(Step::Closed),
            },
        }
    }

    async fn process(&self, submission: Submission) -> Result<(), CavalcadeError> {
        self.shared.queued.fetch_sub(1, Ordering::SeqCst);
        let Submission { task, args } = submission;
        let manager = &self.shared.config.name;
        debug!(manager = %manager, task = %task.name(), task_id = %task.id(), "executing task");

        let Err(err) = task.execute(args).await else {
            return Ok(());
        };

        match self.shared.config.failure_policy {
            FailurePolicy::Report => {
                error!(
                    manager = %manager,
                    task = %task.name(),
                    task_id = %task.id(),
                    error = %err,
                    "task failed"
                );
                Ok(())
            }
            FailurePolicy::Propagate => {
                error!(
                    manager = %manager,
                    task = %task.name(),
                    task_id = %task.id(),
                    error = %err,
                    "task failed, terminating worker loop"
                );
                Err(err)
            }
        }
    }

    /// Fail everything still queued so nobody waits on work that will never run.
    fn abandon_remaining(&mut self) {
        self.rx.close();
        while let Ok(Submission { task, .. }) = self.rx.try_recv() {
            self.shared.queued.fetch_sub(1, Ordering::SeqCst);
            let err = CavalcadeError::Abandoned {
                task_id: task.id(),
                task: task.name().to_string(),
            };
            warn!(manager = %self.shared.config.name, task_id = %task.id(), "{err}");
            task.reject(&err);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::callable;
    use crate::domain::{Args, Outcome};
    use crate::manager::{Manager, ManagerConfig};
    use crate::task::Task;
    use serde_json::json;

    fn detached(config: ManagerConfig) -> (Manager, WorkerLoop) {
        let manager = Manager::new(config);
        let rx = manager
            .shared
            .rx
            .lock()
            .unwrap()
            .take()
            .unwrap();
        let worker = WorkerLoop::new(Arc::clone(&manager.shared), rx);
        (manager, worker)
    }

    #[tokio::test]
    async fn step_processes_one_submission() {
        let (manager, mut worker) = detached(ManagerConfig::default());
        let a = Task::builder(callable::constant("a")).manager(&manager).build();
        let b = Task::builder(callable::constant("b")).manager(&manager).build();
        let ha = a.call();
        let hb = b.call();

        assert_eq!(worker.step().await.unwrap(), Step::Processed);
        assert_eq!(ha.poll(), Outcome::Completed(json!("a")));
        assert!(hb.is_pending());
        assert_eq!(manager.queued(), 1);
    }

    #[tokio::test]
    async fn step_wakes_on_stop() {
        let (manager, mut worker) = detached(ManagerConfig::default());
        manager.stop();
        assert_eq!(worker.step().await.unwrap(), Step::Signalled);
        assert!(worker.is_stopping());
    }

    #[tokio::test]
    async fn step_returns_error_under_propagate() {
        let (manager, mut worker) = detached(
            ManagerConfig::default().with_failure_policy(FailurePolicy::Propagate),
        );
        let bad = Task::builder(callable::from_fn(|_| anyhow::bail!("no")))
            .manager(&manager)
            .build();
        bad.submit(Args::new());

        assert!(worker.step().await.is_err());
    }

    #[tokio::test]
    async fn abandon_fails_queued_tasks() {
        let (manager, mut worker) = detached(ManagerConfig::default());
        let t = Task::builder(callable::constant(1)).manager(&manager).build();
        let h = t.call();

        worker.abandon_remaining();

        assert!(matches!(h.poll(), Outcome::Failed(_)));
        assert_eq!(manager.queued(), 0);
    }
}
