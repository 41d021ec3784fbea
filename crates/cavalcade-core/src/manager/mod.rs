//! Manager - owns one worker loop and its submission queue.
//!
//! # Flow
//! 1. `Task::submit` pushes `(task, args)` onto the manager's channel
//! 2. `start()` spawns a dedicated thread running a current-thread runtime
//! 3. The loop pulls submissions in FIFO order and runs them one at a time
//! 4. `stop()` asks the loop to finish: everything already queued still runs
//!
//! ## Single consumer
//! The submission channel is an unbounded `mpsc` with exactly one receiver.
//! The receiver sits in the manager until the loop thread takes it, and
//! `start()` refuses to run twice, so at most one loop ever drains a
//! manager's queue. Any thread may submit.
//!
//! ## Cooperative scheduling
//! The loop thread drives a current-thread tokio runtime. An async callable
//! may await other work, but the loop awaits each task to the end before
//! taking the next one, so tasks of one manager never overlap.
//!
//! ## Stopping
//! `stop()` flips a `watch` flag. The loop wakes on the flag as well as on
//! new submissions, closes the channel and runs whatever is left.
//! Submissions that arrive after the channel closed fail with
//! [`CavalcadeError::ManagerStopped`] instead of waiting forever.
//!
//! ## Lifecycle
//! `Idle -> Running -> Stopping -> Drained`, see [`LoopState`].
//! A failed `start()` leaves the manager `Idle` with its queue intact.
//!
//! ## Shared instance
//! [`Manager::shared`] hands out one process-wide manager, built on first
//! use. [`Manager::install_shared`] picks its config explicitly, and only
//! works before anything touched the shared manager.

mod config;
mod worker_loop;

pub use self::config::{FailurePolicy, ManagerConfig};

use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError};
use std::thread::JoinHandle;

use tokio::sync::{mpsc, watch};
use tracing::warn;

use self::worker_loop::WorkerLoop;
use crate::domain::{Args, CavalcadeError, LoopState, ManagerId};
use crate::task::Task;

static SHARED: OnceLock<Manager> = OnceLock::new();

/// One queued submission.
pub(crate) struct Submission {
    pub(crate) task: Task,
    pub(crate) args: Args,
}

pub(crate) struct ManagerShared {
    pub(crate) id: ManagerId,
    pub(crate) config: ManagerConfig,
    tx: mpsc::UnboundedSender<Submission>,
    rx: Mutex<Option<mpsc::UnboundedReceiver<Submission>>>,
    stop_tx: watch::Sender<bool>,
    pub(crate) queued: AtomicUsize,
    state: Mutex<LoopState>,
    thread: Mutex<Option<JoinHandle<Result<(), CavalcadeError>>>>,
}

impl ManagerShared {
    pub(crate) fn subscribe_stop(&self) -> watch::Receiver<bool> {
        self.stop_tx.subscribe()
    }

    pub(crate) fn request_stop(&self) {
        let mut state = lock(&self.state);
        self.stop_tx.send_replace(true);
        if *state == LoopState::Running {
            *state = LoopState::Stopping;
        }
    }

    pub(crate) fn mark_drained(&self) {
        *lock(&self.state) = LoopState::Drained;
    }
}

/// Handle to a manager. Clones share the same queue and loop.
#[derive(Clone)]
pub struct Manager {
    shared: Arc<ManagerShared>,
}

impl Manager {
    pub fn new(config: ManagerConfig) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let (stop_tx, _) = watch::channel(false);
        Self {
            shared: Arc::new(ManagerShared {
                id: ManagerId::generate(),
                config,
                tx,
                rx: Mutex::new(Some(rx)),
                stop_tx,
                queued: AtomicUsize::new(0),
                state: Mutex::new(LoopState::Idle),
                thread: Mutex::new(None),
            }),
        }
    }

    /// The process-wide manager, created with the default config on first use.
    pub fn shared() -> Manager {
        SHARED
            .get_or_init(|| Manager::new(ManagerConfig::default()))
            .clone()
    }

    /// Create the process-wide manager from `config`.
    ///
    /// Fails once the shared manager exists, whether it came from an earlier
    /// install or from [`Manager::shared`].
    pub fn install_shared(config: ManagerConfig) -> Result<Manager, CavalcadeError> {
        let manager = Manager::new(config);
        SHARED
            .set(manager.clone())
            .map_err(|_| CavalcadeError::SharedAlreadyInstalled)?;
        Ok(manager)
    }

    pub fn id(&self) -> ManagerId {
        self.shared.id
    }

    pub fn name(&self) -> &str {
        &self.shared.config.name
    }

    pub fn config(&self) -> &ManagerConfig {
        &self.shared.config
    }

    /// Spawn the loop thread. Submissions made before this are kept and run
    /// first. A manager can be started once.
    ///
    /// If the thread cannot be spawned the manager stays `Idle` with its
    /// queue intact, so `start` can be retried.
    pub fn start(&self) -> Result<(), CavalcadeError> {
        self.shared.config.validate()?;

        let mut state = lock(&self.shared.state);
        if *state != LoopState::Idle || lock(&self.shared.rx).is_none() {
            return Err(CavalcadeError::AlreadyStarted(self.name().to_string()));
        }

        let shared = Arc::clone(&self.shared);
        let handle = std::thread::Builder::new()
            .name(self.shared.config.name.clone())
            .spawn(move || {
                let Some(rx) = lock(&shared.rx).take() else {
                    shared.mark_drained();
                    return Ok(());
                };
                WorkerLoop::new(shared, rx).run_blocking()
            })?;

        *state = if *self.shared.stop_tx.borrow() {
            LoopState::Stopping
        } else {
            LoopState::Running
        };
        *lock(&self.shared.thread) = Some(handle);
        Ok(())
    }

    /// Ask the loop to stop once the queue is empty. Does not block and does
    /// not interrupt a running task.
    pub fn stop(&self) {
        self.shared.request_stop();
    }

    pub fn is_stopping(&self) -> bool {
        *self.shared.stop_tx.borrow()
    }

    /// True while the loop thread exists and has not returned.
    pub fn is_alive(&self) -> bool {
        lock(&self.shared.thread)
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    pub fn state(&self) -> LoopState {
        *lock(&self.shared.state)
    }

    /// Submissions accepted but not yet picked up by the loop.
    pub fn queued(&self) -> usize {
        self.shared.queued.load(Ordering::SeqCst)
    }

    /// Wait for the loop thread to return and hand back its result.
    ///
    /// `Err` means the loop ended early: a task failed under
    /// [`FailurePolicy::Propagate`], or the loop could not run at all.
    /// Returns `Ok(())` if the loop was never started or was already joined.
    pub fn join(&self) -> Result<(), CavalcadeError> {
        let handle = lock(&self.shared.thread).take();
        match handle {
            Some(handle) => handle.join().map_err(|_| CavalcadeError::LoopPanicked)?,
            None => Ok(()),
        }
    }

    /// Push a submission. If the loop has already exited, the task is marked
    /// failed instead so its waiters do not hang.
    pub(crate) fn enqueue(&self, task: Task, args: Args) {
        let shared = &self.shared;
        shared.queued.fetch_add(1, Ordering::SeqCst);

        if let Err(mpsc::error::SendError(rejected)) = shared.tx.send(Submission { task, args }) {
            shared.queued.fetch_sub(1, Ordering::SeqCst);
            let task = rejected.task;
            let err = CavalcadeError::ManagerStopped {
                task_id: task.id(),
                task: task.name().to_string(),
            };
            warn!(manager = %shared.config.name, task_id = %task.id(), "{err}");
            task.reject(&err);
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl PartialEq for Manager {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.shared, &other.shared)
    }
}

impl Eq for Manager {}

impl fmt::Debug for Manager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Manager")
            .field("id", &self.shared.id)
            .field("name", &self.shared.config.name)
            .field("state", &self.state())
            .field("queued", &self.queued())
            .finish()
    }
}
