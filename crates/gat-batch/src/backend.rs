//! Execution backends.
//!
//! A backend takes an [`ExecutionTask`] and hands back a [`TaskHandle`]
//! right away; the task's result arrives on the handle when it finishes.
//! [`ExecutionBackend::execute_into`] instead reports every result on one
//! shared channel, so a caller can block on whichever task finishes first.

use crate::task::{ExecutionTask, TaskArtifacts};
use gat_core::{GatError, GatResult};
use rayon::{ThreadPool, ThreadPoolBuilder};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::mpsc::{self, Receiver, Sender, TryRecvError};
use std::sync::Arc;
use std::thread;

/// Runs one partition to completion.
pub trait TaskRunner: Send + Sync {
    fn run(&self, task: ExecutionTask) -> GatResult<TaskArtifacts>;
}

/// A finished task, tagged with the caller's index for it.
pub type Completion = (usize, GatResult<TaskArtifacts>);

pub trait ExecutionBackend {
    fn execute(&self, task: ExecutionTask) -> TaskHandle;

    /// Run `task` and send its result, tagged with `index`, on `done`.
    ///
    /// The default waits on the [`TaskHandle`] from a helper thread.
    fn execute_into(&self, task: ExecutionTask, index: usize, done: Sender<Completion>) {
        let handle = self.execute(task);
        let spawned = thread::Builder::new()
            .name(format!("gat-wait-{}", handle.task_id()))
            .spawn(move || {
                let _ = done.send((index, handle.wait()));
            });
        if let Err(e) = spawned {
            // the sender went down with the closure, the caller sees the task as lost
            tracing::warn!(error = %e, "could not start a waiter thread");
        }
    }
}

/// Pending result of a dispatched task.
#[derive(Debug)]
pub struct TaskHandle {
    task_id: String,
    receiver: Receiver<GatResult<TaskArtifacts>>,
    taken: bool,
}

impl TaskHandle {
    pub fn new(task_id: impl Into<String>, receiver: Receiver<GatResult<TaskArtifacts>>) -> Self {
        Self {
            task_id: task_id.into(),
            receiver,
            taken: false,
        }
    }

    pub fn task_id(&self) -> &str {
        &self.task_id
    }

    /// Block until the task finishes.
    pub fn wait(mut self) -> GatResult<TaskArtifacts> {
        if self.taken {
            return Err(self.already_taken());
        }
        self.taken = true;
        self.receiver.recv().map_err(|_| self.lost())?
    }

    /// `None` while the task is still running. Returns the result once.
    pub fn poll(&mut self) -> Option<GatResult<TaskArtifacts>> {
        if self.taken {
            return None;
        }
        let result = match self.receiver.try_recv() {
            Ok(result) => result,
            Err(TryRecvError::Empty) => return None,
            Err(TryRecvError::Disconnected) => Err(self.lost()),
        };
        self.taken = true;
        Some(result)
    }

    pub fn is_taken(&self) -> bool {
        self.taken
    }

    fn lost(&self) -> GatError {
        GatError::Other(format!("task {} ended without reporting a result", self.task_id))
    }

    fn already_taken(&self) -> GatError {
        GatError::Other(format!("result of task {} was already taken", self.task_id))
    }
}

/// In-process backend on a dedicated rayon pool.
pub struct ThreadPoolBackend {
    pool: ThreadPool,
    runner: Arc<dyn TaskRunner>,
}

impl ThreadPoolBackend {
    /// `threads == 0` uses one thread per CPU.
    pub fn new(threads: usize, runner: Arc<dyn TaskRunner>) -> GatResult<Self> {
        let thread_count = if threads == 0 { num_cpus::get() } else { threads };
        let pool = ThreadPoolBuilder::new()
            .num_threads(thread_count)
            .thread_name(|i| format!("gat-batch-{i}"))
            .build()
            .map_err(|e| GatError::Config(format!("building thread pool for batch tasks: {e}")))?;
        tracing::debug!(threads = thread_count, "batch thread pool ready");
        Ok(Self { pool, runner })
    }

    pub fn threads(&self) -> usize {
        self.pool.current_num_threads()
    }

    fn spawn<F>(&self, task: ExecutionTask, reply: F)
    where
        F: FnOnce(GatResult<TaskArtifacts>) + Send + 'static,
    {
        let runner = Arc::clone(&self.runner);
        let id = task.id().to_string();
        self.pool.spawn(move || {
            tracing::debug!(task = %id, "task started");
            let result = catch_unwind(AssertUnwindSafe(|| runner.run(task))).unwrap_or_else(|panic| {
                let message = panic
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".to_string());
                Err(GatError::Other(format!("task {id} panicked: {message}")))
            });
            if let Err(e) = &result {
                tracing::warn!(task = %id, error = %e, "task failed");
            }
            reply(result);
        });
    }
}

impl ExecutionBackend for ThreadPoolBackend {
    fn execute(&self, task: ExecutionTask) -> TaskHandle {
        let (tx, rx) = mpsc::channel();
        let task_id = task.id().to_string();
        self.spawn(task, move |result| {
            // the handle may have been dropped
            let _ = tx.send(result);
        });
        TaskHandle::new(task_id, rx)
    }

    fn execute_into(&self, task: ExecutionTask, index: usize, done: Sender<Completion>) {
        self.spawn(task, move |result| {
            let _ = done.send((index, result));
        });
    }
}
