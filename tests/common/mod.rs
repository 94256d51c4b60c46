#![allow(dead_code)]

use glam::Vec3;
use image::{Rgba, RgbaImage};
use lumen_editor::camera::CameraRig;
use lumen_editor::config::{CameraConfig, SchedulerConfig};
use lumen_editor::display::{BlitLog, HeadlessSurface};
use lumen_editor::engine::{CancelToken, EngineFactory, RenderEngine};
use lumen_editor::error::RenderPassFailure;
use lumen_editor::scene::{Material, Primitive, Scene, SceneSnapshot, Shape, Transform};
use lumen_editor::session::{RenderSession, RenderWorkerPool};
use lumen_editor::time::{Clock, ManualClock};
use lumen_editor::RenderScheduler;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use winit::dpi::PhysicalSize;

pub const WAIT: Duration = Duration::from_secs(5);

/// Shared knobs and counters for every [`FakeEngine`] built by one factory.
#[derive(Default)]
pub struct EngineRig {
    pub passes_run: AtomicU32,
    pub clears: AtomicU32,
    pub camera_updates: AtomicU32,
    pub geometry_refreshes: AtomicU32,
    pub fail_next: AtomicU32,
    pub panic_next: AtomicBool,
    pub ignore_cancel: AtomicBool,
    pub hold_next: AtomicBool,
    pub holding: AtomicBool,
    pub active: AtomicUsize,
    pub max_active: AtomicUsize,
    pub sizes: Mutex<Vec<PhysicalSize<u32>>>,
    pub delay: Mutex<Duration>,
}

impl EngineRig {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn with_delay(delay: Duration) -> Arc<Self> {
        let rig = Self::new();
        rig.set_delay(delay);
        rig
    }

    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock() = delay;
    }

    pub fn fail_next(&self, count: u32) {
        self.fail_next.store(count, Ordering::SeqCst);
    }

    /// The next pass to start parks inside the engine until [`EngineRig::release_held`].
    pub fn hold_next_pass(&self) {
        self.hold_next.store(true, Ordering::SeqCst);
    }

    pub fn wait_until_held(&self, timeout: Duration) -> bool {
        let started = Instant::now();
        while !self.holding.load(Ordering::SeqCst) {
            if started.elapsed() > timeout {
                return false;
            }
            std::thread::sleep(Duration::from_millis(1));
        }
        true
    }

    pub fn release_held(&self) {
        self.holding.store(false, Ordering::SeqCst);
    }

    pub fn sizes(&self) -> Vec<PhysicalSize<u32>> {
        self.sizes.lock().clone()
    }

    pub fn max_active(&self) -> usize {
        self.max_active.load(Ordering::SeqCst)
    }

    pub fn factory(self: &Arc<Self>) -> Arc<dyn EngineFactory> {
        let rig = self.clone();
        Arc::new(move |size: PhysicalSize<u32>| -> Box<dyn RenderEngine> {
            Box::new(FakeEngine { rig: rig.clone(), passes: 0, elapsed: Duration::ZERO, size })
        })
    }
}

struct ActiveGuard<'a>(&'a EngineRig);

impl<'a> ActiveGuard<'a> {
    fn enter(rig: &'a EngineRig) -> Self {
        let now = rig.active.fetch_add(1, Ordering::SeqCst) + 1;
        rig.max_active.fetch_max(now, Ordering::SeqCst);
        Self(rig)
    }
}

impl Drop for ActiveGuard<'_> {
    fn drop(&mut self) {
        self.0.active.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Engine that only counts: its image encodes the pass count in the red channel.
pub struct FakeEngine {
    rig: Arc<EngineRig>,
    passes: u32,
    elapsed: Duration,
    size: PhysicalSize<u32>,
}

impl RenderEngine for FakeEngine {
    fn render_pass(&mut self, _scene: &SceneSnapshot, cancel: &CancelToken) -> Result<bool, RenderPassFailure> {
        let _active = ActiveGuard::enter(&self.rig);
        if self.rig.hold_next.swap(false, Ordering::SeqCst) {
            self.rig.holding.store(true, Ordering::SeqCst);
            while self.rig.holding.load(Ordering::SeqCst) {
                std::thread::sleep(Duration::from_millis(1));
            }
        }
        let delay = *self.rig.delay.lock();
        let started = Instant::now();
        while started.elapsed() < delay {
            if cancel.is_cancelled() && !self.rig.ignore_cancel.load(Ordering::SeqCst) {
                return Ok(false);
            }
            std::thread::sleep(Duration::from_millis(1));
        }
        if self.rig.panic_next.swap(false, Ordering::SeqCst) {
            panic!("fake engine blew up");
        }
        let failing = self.rig.fail_next.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
        if failing.is_ok() {
            return Err(RenderPassFailure::new("scripted failure"));
        }
        self.passes += 1;
        self.elapsed += started.elapsed();
        self.rig.passes_run.fetch_add(1, Ordering::SeqCst);
        Ok(true)
    }

    fn clear_accumulation(&mut self) {
        self.passes = 0;
        self.elapsed = Duration::ZERO;
        self.rig.clears.fetch_add(1, Ordering::SeqCst);
    }

    fn set_image(&mut self, size: PhysicalSize<u32>) {
        self.size = size;
        self.rig.sizes.lock().push(size);
        self.clear_accumulation();
    }

    fn update_camera(&mut self, _rig: &CameraRig) {
        self.rig.camera_updates.fetch_add(1, Ordering::SeqCst);
    }

    fn refresh_geometry(&mut self) {
        self.rig.geometry_refreshes.fetch_add(1, Ordering::SeqCst);
    }

    fn pass_count(&self) -> u32 {
        self.passes
    }

    fn elapsed_time(&self) -> Duration {
        self.elapsed
    }

    fn resolve(&self) -> RgbaImage {
        let red = self.passes.min(255) as u8;
        RgbaImage::from_pixel(self.size.width, self.size.height, Rgba([red, 0, 0, 255]))
    }
}

pub fn ball(name: &str, position: Vec3) -> Primitive {
    Primitive::new(name, Shape::sphere(0.5), Material::diffuse(name, Vec3::splat(0.5)), Transform::at(position))
}

pub fn scene_with_balls(count: usize) -> Scene {
    let scene = Scene::new();
    for i in 0..count {
        scene.add_primitive(ball(&format!("ball {i}"), Vec3::new(i as f32, 0.5, 0.0)));
    }
    scene
}

pub fn surface_size() -> PhysicalSize<u32> {
    PhysicalSize::new(16, 9)
}

/// One render view wired to a fake engine, a manual clock and a recording surface.
pub struct Harness {
    pub scheduler: RenderScheduler,
    pub clock: ManualClock,
    pub rig: Arc<EngineRig>,
    pub frames: BlitLog,
    pub scene: Arc<Scene>,
    pub pool: Arc<RenderWorkerPool>,
}

impl Harness {
    pub fn new(scene: Scene) -> Self {
        Self::with_rig(scene, EngineRig::new())
    }

    pub fn with_rig(scene: Scene, rig: Arc<EngineRig>) -> Self {
        let scene = Arc::new(scene);
        let clock = ManualClock::new();
        let surface = HeadlessSurface::new(surface_size());
        let frames = surface.log();
        let factory = rig.factory();
        let session = RenderSession::new(scene.clone(), Box::new(surface), &*factory, WAIT);
        let pool = Arc::new(RenderWorkerPool::new(2, 2));
        let shared_clock: Arc<dyn Clock> = Arc::new(clock.clone());
        let scheduler = RenderScheduler::new(
            session,
            pool.clone(),
            shared_clock,
            SchedulerConfig::default(),
            CameraConfig::default(),
        );
        Self { scheduler, clock, rig, frames, scene, pool }
    }

    pub fn tick(&mut self) {
        self.scheduler.on_tick();
    }

    /// Ticks, then blocks until whatever got submitted has finished.
    pub fn tick_and_wait(&mut self) {
        self.scheduler.on_tick();
        assert!(self.scheduler.wait_for_task(WAIT), "render task did not finish in time");
    }
}
