//! Engine boundary: the integrator trait plus the lock-free control block the scheduler uses to
//! cancel, reset and reconfigure it while a pass may be running on a worker.

pub mod tracer;

use crate::camera::CameraRig;
use crate::error::RenderPassFailure;
use crate::scene::{Scene, SceneSnapshot};
use image::RgbaImage;
use parking_lot::Mutex;
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use winit::dpi::PhysicalSize;

pub use tracer::{Tracer, TracerFactory};

/// A progressive integrator. Implementations own their accumulation buffer.
pub trait RenderEngine: Send {
    /// Runs one pass. `Ok(false)` means the pass stopped early because `cancel` fired; nothing from
    /// an aborted pass may be blended into the accumulation.
    fn render_pass(&mut self, scene: &SceneSnapshot, cancel: &CancelToken) -> Result<bool, RenderPassFailure>;

    fn clear_accumulation(&mut self);

    /// Reallocates the output image. Implies a cleared accumulation.
    fn set_image(&mut self, size: PhysicalSize<u32>);

    fn update_camera(&mut self, _rig: &CameraRig) {}

    fn refresh_geometry(&mut self) {}

    fn pass_count(&self) -> u32;

    fn elapsed_time(&self) -> Duration;

    /// Displayable copy of the current accumulation.
    fn resolve(&self) -> RgbaImage;
}

pub trait EngineFactory: Send + Sync {
    fn create(&self, size: PhysicalSize<u32>) -> Box<dyn RenderEngine>;
}

impl<F> EngineFactory for F
where
    F: Fn(PhysicalSize<u32>) -> Box<dyn RenderEngine> + Send + Sync,
{
    fn create(&self, size: PhysicalSize<u32>) -> Box<dyn RenderEngine> {
        self(size)
    }
}

/// Image produced by a completed pass, tagged with the generation it was rendered for.
#[derive(Debug, Clone)]
pub struct Frame {
    pub image: Arc<RgbaImage>,
    pub pass_count: u32,
    pub elapsed: Duration,
    pub generation: u64,
}

#[derive(Default)]
struct PendingUpdates {
    size: Option<PhysicalSize<u32>>,
    camera: Option<CameraRig>,
    refresh_geometry: bool,
}

/// Shared between the scheduler, mutation observers and the worker running the current pass.
///
/// Accumulated samples belong to exactly one generation: a pass started with a token from a newer
/// generation clears the engine first. A reset therefore only has to move the generation on, and
/// any order of the reset steps seen by another thread still yields a clean buffer.
pub struct RenderControl {
    generation: AtomicU64,
    released: AtomicBool,
    published_passes: AtomicU32,
    published_elapsed_us: AtomicU64,
    pending: Mutex<PendingUpdates>,
}

impl RenderControl {
    pub fn new() -> Self {
        Self {
            generation: AtomicU64::new(0),
            released: AtomicBool::new(false),
            published_passes: AtomicU32::new(0),
            published_elapsed_us: AtomicU64::new(0),
            pending: Mutex::new(PendingUpdates::default()),
        }
    }

    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    pub fn token(self: &Arc<Self>) -> CancelToken {
        CancelToken { generation: self.generation(), control: Some(self.clone()) }
    }

    pub fn is_released(&self) -> bool {
        self.released.load(Ordering::Acquire)
    }

    fn bump_generation(&self) -> u64 {
        self.generation.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Bump first, then zero: a worker publishing concurrently re-checks its token after storing,
    /// so whichever side writes last leaves zero behind.
    fn request_clear(&self) -> u64 {
        let generation = self.bump_generation();
        self.zero_published();
        generation
    }

    fn zero_published(&self) {
        self.published_passes.store(0, Ordering::SeqCst);
        self.published_elapsed_us.store(0, Ordering::SeqCst);
    }

    /// Applies queued reconfiguration; runs on the worker holding the engine lock.
    fn apply_pending(&self, engine: &mut dyn RenderEngine) {
        let pending = std::mem::take(&mut *self.pending.lock());
        if let Some(size) = pending.size {
            engine.set_image(size);
        }
        if let Some(rig) = pending.camera {
            engine.update_camera(&rig);
        }
        if pending.refresh_geometry {
            engine.refresh_geometry();
        }
    }

    fn publish(&self, engine: &dyn RenderEngine, token: &CancelToken) {
        if token.is_cancelled() {
            return;
        }
        self.published_passes.store(engine.pass_count(), Ordering::SeqCst);
        let micros = u64::try_from(engine.elapsed_time().as_micros()).unwrap_or(u64::MAX);
        self.published_elapsed_us.store(micros, Ordering::SeqCst);
        if token.is_cancelled() {
            self.zero_published();
        }
    }
}

impl Default for RenderControl {
    fn default() -> Self {
        Self::new()
    }
}

/// Captured at submission; fires once the session generation moves on or the engine is released.
#[derive(Clone)]
pub struct CancelToken {
    generation: u64,
    control: Option<Arc<RenderControl>>,
}

impl CancelToken {
    /// Token that never fires. Used by throwaway preview renders.
    pub fn never() -> Self {
        Self { generation: 0, control: None }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn is_cancelled(&self) -> bool {
        match &self.control {
            Some(control) => control.is_released() || control.generation() != self.generation,
            None => false,
        }
    }
}

pub(crate) enum PassOutcome {
    Completed(Frame),
    Cancelled,
    Failed(RenderPassFailure),
}

/// Engine plus the generation its accumulation was built for. Only the worker running a pass
/// (or the final release) takes this lock.
struct EngineSlot {
    engine: Option<Box<dyn RenderEngine>>,
    accumulated_for: u64,
}

/// The scheduler-facing side of an engine: the trait object behind a lock only the worker takes,
/// plus the control block everyone else talks to.
#[derive(Clone)]
pub struct EngineHandle {
    slot: Arc<Mutex<EngineSlot>>,
    control: Arc<RenderControl>,
}

impl EngineHandle {
    pub fn new(engine: Box<dyn RenderEngine>) -> Self {
        let control = Arc::new(RenderControl::new());
        let slot = EngineSlot { engine: Some(engine), accumulated_for: control.generation() };
        Self { slot: Arc::new(Mutex::new(slot)), control }
    }

    pub fn control(&self) -> &Arc<RenderControl> {
        &self.control
    }

    /// Best-effort stop of the pass in flight. Returns the new generation.
    pub fn shutdown_in_progress(&self) -> u64 {
        self.control.bump_generation()
    }

    /// Drops all accumulated samples: every pass submitted from now on starts from an empty
    /// buffer. Returns the new generation.
    pub fn clear_accumulation(&self) -> u64 {
        self.control.request_clear()
    }

    pub fn set_image(&self, size: PhysicalSize<u32>) {
        self.control.pending.lock().size = Some(size);
    }

    pub fn queue_camera(&self, rig: CameraRig) {
        self.control.pending.lock().camera = Some(rig);
    }

    pub fn queue_geometry_refresh(&self) {
        self.control.pending.lock().refresh_geometry = true;
    }

    /// Passes accumulated as of the last completed pass, 0 once a clear has been requested.
    pub fn pass_count(&self) -> u32 {
        self.control.published_passes.load(Ordering::SeqCst)
    }

    pub fn elapsed_time(&self) -> Duration {
        Duration::from_micros(self.control.published_elapsed_us.load(Ordering::SeqCst))
    }

    pub fn is_released(&self) -> bool {
        self.control.is_released()
    }

    /// Releases the engine at most once. Returns `false` if it had already been released.
    /// If a pass still holds the engine after `wait`, it is dropped with the last handle instead.
    pub fn release(&self, wait: Duration) -> bool {
        if self.control.released.swap(true, Ordering::AcqRel) {
            return false;
        }
        self.control.bump_generation();
        match self.slot.try_lock_for(wait) {
            Some(mut slot) => {
                slot.engine.take();
            }
            None => tracing::warn!(?wait, "engine still busy at release; it will be dropped with its last handle"),
        }
        true
    }

    pub(crate) fn execute_pass(&self, scene: &Scene, token: &CancelToken) -> PassOutcome {
        let mut guard = self.slot.lock();
        let slot = &mut *guard;
        if self.control.is_released() {
            slot.engine.take();
            return PassOutcome::Cancelled;
        }
        let Some(engine) = slot.engine.as_mut() else {
            return PassOutcome::Cancelled;
        };
        self.control.apply_pending(&mut **engine);
        if token.is_cancelled() {
            return PassOutcome::Cancelled;
        }
        if slot.accumulated_for != token.generation() {
            engine.clear_accumulation();
            slot.accumulated_for = token.generation();
            tracing::trace!(generation = token.generation(), "accumulation cleared for new generation");
        }
        let snapshot = scene.snapshot();
        let result = panic::catch_unwind(AssertUnwindSafe(|| engine.render_pass(&snapshot, token)));
        match result {
            Ok(Ok(true)) => {
                self.control.publish(&**engine, token);
                PassOutcome::Completed(Frame {
                    image: Arc::new(engine.resolve()),
                    pass_count: engine.pass_count(),
                    elapsed: engine.elapsed_time(),
                    generation: token.generation(),
                })
            }
            Ok(Ok(false)) => PassOutcome::Cancelled,
            Ok(Err(err)) => PassOutcome::Failed(err),
            Err(payload) => PassOutcome::Failed(RenderPassFailure::new(panic_message(payload.as_ref()))),
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        format!("engine panicked: {message}")
    } else if let Some(message) = payload.downcast_ref::<String>() {
        format!("engine panicked: {message}")
    } else {
        "engine panicked".to_string()
    }
}
