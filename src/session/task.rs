use crate::engine::PassOutcome;
use parking_lot::{Condvar, Mutex};
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    Pending,
    Running,
    Succeeded,
    Failed,
    Cancelled,
}

impl TaskState {
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskState::Succeeded | TaskState::Failed | TaskState::Cancelled)
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            TaskState::Pending => "pending",
            TaskState::Running => "running",
            TaskState::Succeeded => "succeeded",
            TaskState::Failed => "failed",
            TaskState::Cancelled => "cancelled",
        };
        f.write_str(label)
    }
}

struct TaskCell {
    state: Mutex<TaskState>,
    changed: Condvar,
}

/// One render pass request. Clones share state, so the worker and the scheduler see the same task.
#[derive(Clone)]
pub struct RenderTask {
    id: u64,
    generation: u64,
    cell: Arc<TaskCell>,
}

impl RenderTask {
    pub(crate) fn new(id: u64, generation: u64) -> Self {
        Self { id, generation, cell: Arc::new(TaskCell { state: Mutex::new(TaskState::Pending), changed: Condvar::new() }) }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    /// Session generation captured at submission.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn state(&self) -> TaskState {
        *self.cell.state.lock()
    }

    pub fn is_terminal(&self) -> bool {
        self.state().is_terminal()
    }

    /// `Pending -> Running`. Returns false if the task already left `Pending`.
    pub(crate) fn start(&self) -> bool {
        let mut state = self.cell.state.lock();
        if *state != TaskState::Pending {
            return false;
        }
        *state = TaskState::Running;
        true
    }

    /// Moves to a terminal state. A task that already finished keeps its first outcome.
    pub(crate) fn finish(&self, outcome: TaskState) {
        debug_assert!(outcome.is_terminal());
        let mut state = self.cell.state.lock();
        if state.is_terminal() {
            return;
        }
        *state = outcome;
        self.cell.changed.notify_all();
    }

    /// Blocks until the task is terminal or `timeout` elapses. Returns whether it finished.
    pub fn wait_terminal(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut state = self.cell.state.lock();
        while !state.is_terminal() {
            if self.cell.changed.wait_until(&mut state, deadline).timed_out() {
                return state.is_terminal();
            }
        }
        true
    }
}

impl fmt::Debug for RenderTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RenderTask")
            .field("id", &self.id)
            .field("generation", &self.generation)
            .field("state", &self.state())
            .finish()
    }
}

/// What a worker reports back through the session's completion channel.
pub(crate) struct TaskCompletion {
    pub(crate) task_id: u64,
    pub(crate) generation: u64,
    pub(crate) outcome: PassOutcome,
}

impl PassOutcome {
    pub(crate) fn task_state(&self) -> TaskState {
        match self {
            PassOutcome::Completed(_) => TaskState::Succeeded,
            PassOutcome::Cancelled => TaskState::Cancelled,
            PassOutcome::Failed(_) => TaskState::Failed,
        }
    }
}
