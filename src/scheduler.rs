//! Per-view orchestration: decides on every UI tick whether the engine keeps refining, resets or
//! waits, and applies finished passes to the display.

use crate::camera::{CameraMotion, FreeflyController};
use crate::config::{CameraConfig, SchedulerConfig};
use crate::engine::PassOutcome;
use crate::error::SessionError;
use crate::session::{DirtyFlags, MutationKind, RenderSession, RenderTask, RenderWorkerPool, TaskCompletion};
use crate::time::{Clock, Time};
use std::sync::Arc;
use std::time::{Duration, Instant};
use winit::dpi::PhysicalSize;

/// Counters describing what a view's ticks have done so far.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SchedulerStats {
    pub ticks: u64,
    pub submitted: u64,
    pub applied: u64,
    pub discarded: u64,
    pub cancelled: u64,
    pub failures: u64,
    pub resets: u64,
    pub busy_ticks: u64,
    pub debounced_ticks: u64,
    pub saturated: u64,
}

#[derive(Debug, Clone, Copy)]
struct PendingResize {
    at: Instant,
    size: PhysicalSize<u32>,
}

#[derive(Debug, Clone, Copy)]
struct AppliedFrame {
    pass_count: u32,
    generation: u64,
}

pub struct RenderScheduler {
    session: RenderSession,
    pool: Arc<RenderWorkerPool>,
    clock: Arc<dyn Clock>,
    time: Time,
    config: SchedulerConfig,
    camera: CameraConfig,
    viewport: PhysicalSize<u32>,
    pending_resize: Option<PendingResize>,
    last_applied: Option<AppliedFrame>,
    stats: SchedulerStats,
}

impl RenderScheduler {
    pub fn new(
        session: RenderSession,
        pool: Arc<RenderWorkerPool>,
        clock: Arc<dyn Clock>,
        config: SchedulerConfig,
        camera: CameraConfig,
    ) -> Self {
        let viewport = session.display().size();
        Self {
            session,
            pool,
            time: Time::new(clock.clone()),
            clock,
            config,
            camera,
            viewport,
            pending_resize: None,
            last_applied: None,
            stats: SchedulerStats::default(),
        }
    }

    pub fn session(&self) -> &RenderSession {
        &self.session
    }

    pub fn session_mut(&mut self) -> &mut RenderSession {
        &mut self.session
    }

    pub fn viewport(&self) -> PhysicalSize<u32> {
        self.viewport
    }

    pub fn stats(&self) -> SchedulerStats {
        let mut stats = self.stats;
        stats.resets += self.session.topology_resets();
        stats
    }

    /// Passes behind the frame on screen, or 0 once the view has been reset since it was rendered.
    pub fn pass_count(&self) -> u32 {
        match self.last_applied {
            Some(frame) if frame.generation == self.session.generation() => frame.pass_count,
            _ => 0,
        }
    }

    pub fn elapsed_time(&self) -> Duration {
        self.session.engine().elapsed_time()
    }

    pub fn on_scene_mutated(&self, kind: MutationKind) {
        self.session.on_scene_mutated(kind);
    }

    /// Records a new target size. The engine only sees it once resizing has settled.
    pub fn on_resize(&mut self, width: u32, height: u32) {
        let size = PhysicalSize::new(width, height);
        tracing::debug!(session = self.session.id(), width, height, "resize requested");
        self.pending_resize = Some(PendingResize { at: self.clock.now(), size });
    }

    pub fn on_tick(&mut self) {
        self.time.tick();
        self.stats.ticks += 1;
        if self.session.is_disposed() {
            return;
        }
        self.apply_completions();
        self.session.apply_inspector_effects();

        self.apply_camera_movement();

        if let Some(pending) = self.pending_resize {
            if self.clock.now() < pending.at + self.config.resize_debounce() {
                self.reset();
                self.stats.debounced_ticks += 1;
                return;
            }
            self.pending_resize = None;
            self.viewport = pending.size;
            let engine = self.session.engine();
            engine.set_image(pending.size);
            engine.queue_camera(self.session.scene().camera().rig(pending.size));
            self.reset();
            tracing::debug!(
                session = self.session.id(),
                width = pending.size.width,
                height = pending.size.height,
                "resize applied"
            );
        }

        let dirty = self.session.dirty().take();
        if !dirty.is_empty() {
            let engine = self.session.engine();
            if dirty.contains(DirtyFlags::CAMERA) {
                engine.queue_camera(self.session.scene().camera().rig(self.viewport));
            }
            if dirty.contains(DirtyFlags::TRANSFORM) {
                engine.queue_geometry_refresh();
            }
            self.reset();
        }

        if self.session.current_task().is_some_and(|task| !task.is_terminal()) {
            self.stats.busy_ticks += 1;
            return;
        }

        match self.session.submit(&self.pool) {
            Ok(Some(task)) => {
                self.stats.submitted += 1;
                tracing::trace!(session = self.session.id(), task = task.id(), generation = task.generation(), "pass submitted");
            }
            Ok(None) => self.stats.busy_ticks += 1,
            Err(SessionError::WorkerPoolSaturated) => {
                self.stats.saturated += 1;
                tracing::debug!(session = self.session.id(), "worker pool saturated; retrying next tick");
            }
            Err(err) => tracing::warn!(session = self.session.id(), error = %err, "pass submission refused"),
        }
    }

    /// Blocks until the held task is terminal. Intended for headless drivers and tests.
    pub fn wait_for_task(&self, timeout: Duration) -> bool {
        match self.session.current_task() {
            Some(task) => task.wait_terminal(timeout),
            None => true,
        }
    }

    pub fn current_task(&self) -> Option<&RenderTask> {
        self.session.current_task()
    }

    pub fn dispose(&mut self, timeout: Duration) -> Result<(), SessionError> {
        self.session.dispose(timeout)
    }

    fn reset(&mut self) {
        let engine = self.session.engine();
        engine.shutdown_in_progress();
        engine.clear_accumulation();
        self.stats.resets += 1;
    }

    fn apply_camera_movement(&mut self) {
        let dt = self.time.delta_seconds();
        let input = self.session.display_mut().input_mut();
        let motion = CameraMotion::from_input(input, dt, &self.camera);
        let refresh = input.take_refresh_pressed();
        input.clear_frame();
        if refresh {
            tracing::debug!(session = self.session.id(), "refresh requested");
            self.reset();
        }
        if motion.is_idle() {
            return;
        }
        self.session.scene().update_camera(|camera| {
            let mut controller = FreeflyController::from_camera(camera);
            controller.apply(&motion);
            controller.write_to(camera);
        });
    }

    fn apply_completions(&mut self) {
        for completion in self.session.drain_completions() {
            self.apply_completion(completion);
        }
    }

    fn apply_completion(&mut self, completion: TaskCompletion) {
        let session = self.session.id();
        let TaskCompletion { task_id, generation, outcome } = completion;
        match outcome {
            PassOutcome::Completed(frame) => {
                let is_current = self.session.current_task().is_some_and(|task| task.id() == task_id);
                if !is_current || frame.generation != self.session.generation() {
                    self.stats.discarded += 1;
                    tracing::trace!(session, task = task_id, generation, "stale pass discarded");
                    return;
                }
                self.session.display_mut().blit(&frame);
                self.last_applied = Some(AppliedFrame { pass_count: frame.pass_count, generation: frame.generation });
                self.stats.applied += 1;
            }
            PassOutcome::Cancelled => self.stats.cancelled += 1,
            PassOutcome::Failed(err) => {
                self.stats.failures += 1;
                tracing::error!(session, task = task_id, generation, error = %err, "render pass failed; retrying next tick");
            }
        }
    }
}
