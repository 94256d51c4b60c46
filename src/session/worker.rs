use super::task::{RenderTask, TaskCompletion, TaskState};
use crate::engine::{CancelToken, EngineHandle, PassOutcome};
use crate::scene::Scene;
use parking_lot::{Condvar, Mutex};
use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};
use std::sync::mpsc;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

pub(crate) struct RenderJob {
    pub(crate) session: u64,
    pub(crate) task: RenderTask,
    pub(crate) engine: EngineHandle,
    pub(crate) scene: Arc<Scene>,
    pub(crate) token: CancelToken,
    pub(crate) reply: mpsc::Sender<TaskCompletion>,
}

#[derive(Default)]
struct ActiveJobs {
    count: Mutex<usize>,
    idle: Condvar,
}

impl ActiveJobs {
    fn enter(&self) {
        *self.count.lock() += 1;
    }

    fn leave(&self) {
        let mut count = self.count.lock();
        *count = count.saturating_sub(1);
        if *count == 0 {
            self.idle.notify_all();
        }
    }
}

/// Fixed set of named render threads, each fed by a bounded queue. Submission never blocks: a
/// job that no queue can take is handed back to the caller.
pub struct RenderWorkerPool {
    senders: Vec<mpsc::SyncSender<RenderJob>>,
    next_sender: AtomicUsize,
    active: Arc<ActiveJobs>,
}

impl RenderWorkerPool {
    pub fn new(worker_count: usize, queue_depth: usize) -> Self {
        let worker_count = worker_count.max(1);
        let active = Arc::new(ActiveJobs::default());
        let mut senders = Vec::with_capacity(worker_count);
        for index in 0..worker_count {
            let (tx, rx) = mpsc::sync_channel::<RenderJob>(queue_depth.max(1));
            let thread_active = active.clone();
            let name = format!("render-worker-{index}");
            match thread::Builder::new().name(name).spawn(move || {
                while let Ok(job) = rx.recv() {
                    run_render_job(job);
                    thread_active.leave();
                }
            }) {
                Ok(_) => senders.push(tx),
                Err(err) => tracing::error!(worker = index, error = %err, "failed to spawn render worker thread"),
            }
        }
        tracing::debug!(workers = senders.len(), queue_depth, "render worker pool started");
        Self { senders, next_sender: AtomicUsize::new(0), active }
    }

    pub fn worker_count(&self) -> usize {
        self.senders.len()
    }

    /// Jobs queued or running across all workers.
    pub fn active_jobs(&self) -> usize {
        *self.active.count.lock()
    }

    pub(crate) fn submit(&self, job: RenderJob) -> Result<(), RenderJob> {
        if self.senders.is_empty() {
            return Err(job);
        }
        let len = self.senders.len();
        let mut job = job;
        let start = self.next_sender.fetch_add(1, AtomicOrdering::Relaxed) % len;
        self.active.enter();
        for offset in 0..len {
            let idx = (start + offset) % len;
            match self.senders[idx].try_send(job) {
                Ok(()) => return Ok(()),
                Err(mpsc::TrySendError::Full(returned)) | Err(mpsc::TrySendError::Disconnected(returned)) => {
                    job = returned;
                }
            }
        }
        self.active.leave();
        Err(job)
    }

    /// Waits until every submitted job has finished. Returns false on timeout.
    pub fn wait_idle(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut count = self.active.count.lock();
        while *count > 0 {
            if self.active.idle.wait_until(&mut count, deadline).timed_out() {
                return *count == 0;
            }
        }
        true
    }
}

fn run_render_job(job: RenderJob) {
    let RenderJob { session, task, engine, scene, token, reply } = job;
    if token.is_cancelled() || !task.start() {
        tracing::trace!(session, task = task.id(), "render job cancelled before start");
        task.finish(TaskState::Cancelled);
        let _ = reply.send(TaskCompletion {
            task_id: task.id(),
            generation: task.generation(),
            outcome: PassOutcome::Cancelled,
        });
        return;
    }
    let outcome = engine.execute_pass(&scene, &token);
    let state = outcome.task_state();
    if let PassOutcome::Failed(err) = &outcome {
        tracing::warn!(session, task = task.id(), error = %err, "render pass failed");
    }
    // Completion goes out before the state flips, so a terminal task always has its result queued.
    let _ = reply.send(TaskCompletion { task_id: task.id(), generation: task.generation(), outcome });
    task.finish(state);
}
