//! One render view: an engine bound to a scene and a display, plus the observer plumbing that
//! keeps the engine's accumulation honest while the scene is edited from any thread.

mod dirty;
mod observer;
mod task;
mod worker;

pub use dirty::{DirtyFlags, DirtyState};
pub use observer::MutationKind;
pub use task::{RenderTask, TaskState};
pub use worker::RenderWorkerPool;

pub(crate) use task::TaskCompletion;

use crate::display::DisplaySurface;
use crate::engine::{EngineFactory, EngineHandle};
use crate::error::SessionError;
use crate::inspector::{InspectorEffect, InspectorModel};
use crate::scene::{ObserverId, Scene};
use anyhow::{Context, Result};
use observer::{SessionObserver, SessionShared};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc;
use std::sync::Arc;
use std::time::{Duration, Instant};
use worker::RenderJob;

static NEXT_SESSION_ID: AtomicU64 = AtomicU64::new(1);

pub struct RenderSession {
    id: u64,
    scene: Arc<Scene>,
    engine: EngineHandle,
    display: Box<dyn DisplaySurface>,
    shared: Arc<SessionShared>,
    scene_observer: Option<ObserverId>,
    effects: mpsc::Receiver<InspectorEffect>,
    inspector: InspectorModel,
    completion_tx: mpsc::Sender<TaskCompletion>,
    completion_rx: mpsc::Receiver<TaskCompletion>,
    current_task: Option<RenderTask>,
    next_task_id: u64,
    shutdown_timeout: Duration,
    disposed: bool,
}

impl RenderSession {
    /// Binds a fresh engine sized to `display` to `scene`. Primitives already in the scene get
    /// their transform observers and inspector rows immediately.
    pub fn new(
        scene: Arc<Scene>,
        display: Box<dyn DisplaySurface>,
        factory: &dyn EngineFactory,
        shutdown_timeout: Duration,
    ) -> Self {
        let id = NEXT_SESSION_ID.fetch_add(1, Ordering::Relaxed);
        let engine = EngineHandle::new(factory.create(display.size()));
        let (effect_tx, effects) = mpsc::channel();
        let (completion_tx, completion_rx) = mpsc::channel();
        let shared = SessionShared::new(id, engine.clone(), effect_tx);
        let scene_observer = scene.register_observer(SessionObserver::new(shared.clone()));
        let mut session = Self {
            id,
            scene,
            engine,
            display,
            shared,
            scene_observer: Some(scene_observer),
            effects,
            inspector: InspectorModel::new(),
            completion_tx,
            completion_rx,
            current_task: None,
            next_task_id: 0,
            shutdown_timeout,
            disposed: false,
        };
        session.apply_inspector_effects();
        tracing::info!(session = id, primitives = session.scene.len(), "render session opened");
        session
    }

    /// Opens a session on a scene document.
    pub fn open(
        path: impl AsRef<Path>,
        display: Box<dyn DisplaySurface>,
        factory: &dyn EngineFactory,
        shutdown_timeout: Duration,
    ) -> Result<Self> {
        let path = path.as_ref();
        let scene = Scene::load(path).with_context(|| format!("Failed to open scene {}", path.display()))?;
        Ok(Self::new(Arc::new(scene), display, factory, shutdown_timeout))
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn scene(&self) -> &Arc<Scene> {
        &self.scene
    }

    pub fn engine(&self) -> &EngineHandle {
        &self.engine
    }

    pub fn display(&self) -> &dyn DisplaySurface {
        &*self.display
    }

    pub fn display_mut(&mut self) -> &mut dyn DisplaySurface {
        &mut *self.display
    }

    pub fn dirty(&self) -> &DirtyState {
        &self.shared.dirty
    }

    pub fn inspector(&self) -> &InspectorModel {
        &self.inspector
    }

    pub fn current_task(&self) -> Option<&RenderTask> {
        self.current_task.as_ref()
    }

    pub fn generation(&self) -> u64 {
        self.engine.control().generation()
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed
    }

    /// Primitives whose transforms this session currently observes.
    pub fn observed_primitives(&self) -> usize {
        self.shared.bound_primitives()
    }

    pub fn observer_inconsistencies(&self) -> u64 {
        self.shared.inconsistencies()
    }

    pub(crate) fn topology_resets(&self) -> u64 {
        self.shared.topology_resets()
    }

    /// Reacts to a scene mutation. Safe to call from any thread holding a reference.
    pub fn on_scene_mutated(&self, kind: MutationKind) {
        self.shared.on_scene_mutated(kind);
    }

    /// Applies queued inspector effects in mutation order.
    pub(crate) fn apply_inspector_effects(&mut self) -> usize {
        let mut applied = 0;
        while let Ok(effect) = self.effects.try_recv() {
            self.inspector.apply(effect);
            applied += 1;
        }
        applied
    }

    pub(crate) fn drain_completions(&mut self) -> Vec<TaskCompletion> {
        let mut completions = Vec::new();
        while let Ok(completion) = self.completion_rx.try_recv() {
            completions.push(completion);
        }
        completions
    }

    /// Hands a new pass to `pool`. Returns `Ok(None)` while the held task is still pending or
    /// running.
    pub(crate) fn submit(&mut self, pool: &RenderWorkerPool) -> Result<Option<RenderTask>, SessionError> {
        if self.disposed {
            return Err(SessionError::AlreadyReleased(self.id));
        }
        if self.current_task.as_ref().is_some_and(|task| !task.is_terminal()) {
            return Ok(None);
        }
        let token = self.engine.control().token();
        self.next_task_id += 1;
        let task = RenderTask::new(self.next_task_id, token.generation());
        let job = RenderJob {
            session: self.id,
            task: task.clone(),
            engine: self.engine.clone(),
            scene: self.scene.clone(),
            token,
            reply: self.completion_tx.clone(),
        };
        match pool.submit(job) {
            Ok(()) => {
                self.current_task = Some(task.clone());
                Ok(Some(task))
            }
            Err(job) => {
                job.task.finish(TaskState::Cancelled);
                Err(SessionError::WorkerPoolSaturated)
            }
        }
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        self.scene.save(path).with_context(|| format!("Failed to save session {} to {}", self.id, path.display()))
    }

    /// Stops rendering, waits up to `timeout` for the pass in flight, detaches every observer and
    /// releases the engine. Resources are released even when the wait times out.
    pub fn dispose(&mut self, timeout: Duration) -> Result<(), SessionError> {
        if self.disposed {
            tracing::warn!(session = self.id, "render session disposed twice");
            return Err(SessionError::AlreadyReleased(self.id));
        }
        self.disposed = true;
        let deadline = Instant::now() + timeout;
        let generation = self.engine.shutdown_in_progress();
        let mut outcome = Ok(());
        if let Some(task) = &self.current_task {
            if !task.wait_terminal(timeout) {
                tracing::warn!(session = self.id, task = task.id(), ?timeout, "render pass still running at dispose");
                outcome = Err(SessionError::EngineShutdownTimeout { timeout });
            }
        }
        self.detach();
        self.engine.release(deadline.saturating_duration_since(Instant::now()));
        tracing::info!(session = self.id, generation, "render session disposed");
        outcome
    }

    fn detach(&mut self) {
        if let Some(observer) = self.scene_observer.take() {
            if let Err(err) = self.scene.unregister_observer(observer) {
                self.shared.report(err);
            }
        }
        self.shared.unbind_all();
    }
}

impl Drop for RenderSession {
    fn drop(&mut self) {
        if self.disposed {
            return;
        }
        if let Err(err) = self.dispose(self.shutdown_timeout) {
            tracing::warn!(session = self.id, error = %err, "render session dropped without a clean dispose");
        }
    }
}
