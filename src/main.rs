use std::sync::Arc;
use std::thread;

use anyhow::{Context, Result};
use glam::Vec3;
use lumen_editor::cli::CliOverrides;
use lumen_editor::config::AppConfig;
use lumen_editor::display::HeadlessSurface;
use lumen_editor::engine::{EngineFactory, TracerFactory};
use lumen_editor::input::Input;
use lumen_editor::scene::{Material, MaterialKind, Primitive, Scene, Shape, ShapeKind, Transform};
use lumen_editor::time::{Clock, SystemClock};
use lumen_editor::Studio;
use tracing_subscriber::EnvFilter;
use winit::dpi::PhysicalSize;

const DEFAULT_TICKS: u32 = 120;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();
    let cli = match CliOverrides::parse_from_env() {
        Ok(parsed) => parsed,
        Err(err) => {
            tracing::error!("{err:#}");
            std::process::exit(2);
        }
    };
    if let Err(err) = run(cli) {
        tracing::error!("Application error: {err:?}");
        std::process::exit(1);
    }
}

fn run(cli: CliOverrides) -> Result<()> {
    let mut config = match &cli.config {
        Some(path) => AppConfig::load(path)?,
        None => AppConfig::load_or_default("config/app.json"),
    };
    let overrides = cli.config_overrides();
    if !overrides.is_empty() {
        tracing::info!(fields = ?overrides.applied_fields(), "applying command line overrides");
        config.apply_overrides(&overrides);
    }

    let factory: Arc<dyn EngineFactory> = Arc::new(TracerFactory::new(config.tracer.clone()));
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let mut studio = Studio::new(config.clone(), factory, clock);

    let size = PhysicalSize::new(config.window.width, config.window.height);
    let surface = HeadlessSurface::with_input(size, Input::from_config("config/input.json"));
    let frames = surface.log();
    let session = match &cli.scene {
        Some(path) => studio.open_file(path, Box::new(surface))?,
        None => studio.open_session(Arc::new(demo_scene()), Box::new(surface)),
    };
    let scene = studio.view(session).context("session vanished right after opening")?.session().scene().clone();

    let script = match &cli.script {
        Some(path) => start_script(path, scene)?,
        None => None,
    };

    let interval = config.scheduler.tick_interval();
    for _ in 0..cli.ticks.unwrap_or(DEFAULT_TICKS) {
        studio.tick_all();
        thread::sleep(interval);
    }

    if let Some(handle) = script {
        match handle.join() {
            Ok(Ok(lines)) => tracing::info!(lines = lines.len(), "script finished"),
            Ok(Err(err)) => tracing::warn!("script failed: {err:#}"),
            Err(_) => tracing::warn!("script thread panicked"),
        }
    }

    if let Some(view) = studio.view(session) {
        let stats = view.stats();
        tracing::info!(
            passes = view.pass_count(),
            elapsed = ?view.elapsed_time(),
            applied = stats.applied,
            resets = stats.resets,
            failures = stats.failures,
            "render finished"
        );
    }
    if let Some(output) = &cli.output {
        frames.save_last_png(output)?;
        tracing::info!(path = %output.display(), "frame written");
    }

    let report = studio.shutdown(config.scheduler.shutdown_timeout());
    if !report.is_clean() {
        tracing::warn!(timed_out = report.timed_out, "some sessions did not stop in time");
    }
    Ok(())
}

#[cfg(feature = "scripting")]
fn start_script(
    path: &std::path::Path,
    scene: Arc<Scene>,
) -> Result<Option<thread::JoinHandle<Result<Vec<String>>>>> {
    let source = std::fs::read_to_string(path).with_context(|| format!("Reading {}", path.display()))?;
    lumen_editor::scripts::spawn_script(source, scene).map(Some)
}

#[cfg(not(feature = "scripting"))]
fn start_script(
    path: &std::path::Path,
    _scene: Arc<Scene>,
) -> Result<Option<thread::JoinHandle<Result<Vec<String>>>>> {
    tracing::warn!(path = %path.display(), "built without scripting; ignoring --script");
    Ok(None)
}

fn demo_scene() -> Scene {
    let scene = Scene::new();
    scene.add_primitive(Primitive::new(
        "Floor",
        Shape::new("Floor", ShapeKind::Plane),
        Material::diffuse("Concrete", Vec3::splat(0.6)),
        Transform::default(),
    ));
    scene.add_primitive(Primitive::new(
        "Ball",
        Shape::sphere(0.5),
        Material::diffuse("Clay", Vec3::new(0.8, 0.35, 0.25)),
        Transform::at(Vec3::new(-0.7, 0.5, 0.0)),
    ));
    scene.add_primitive(Primitive::new(
        "Mirror ball",
        Shape::sphere(0.5),
        Material::new("Chrome", MaterialKind::Metal { albedo: Vec3::splat(0.9), roughness: 0.05 }),
        Transform::at(Vec3::new(0.7, 0.5, 0.0)),
    ));
    scene.add_primitive(Primitive::new(
        "Crate",
        Shape::new("Crate", ShapeKind::Cuboid { half_extents: Vec3::splat(0.3) }),
        Material::new("Lamp", MaterialKind::Emissive { color: Vec3::new(1.0, 0.85, 0.6), strength: 2.0 }),
        Transform::at(Vec3::new(0.0, 0.3, -1.2)),
    ));
    scene
}
